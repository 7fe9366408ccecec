//! Extended query protocol backend messages.
//!
//! ParseComplete, BindComplete, NoData and PortalSuspended carry no payload;
//! the state machine matches on their type byte alone.

use crate::error::Result;
use crate::protocol::codec::read_u32;
use crate::protocol::types::Oid;

use super::query::parse_count;

/// ParameterDescription message - describes parameters for a prepared statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterDescription {
    /// Parameter type OIDs
    param_oids: Vec<Oid>,
}

impl ParameterDescription {
    /// Parse a ParameterDescription message from payload bytes.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let (num_params, mut data) = parse_count(payload, "ParameterDescription")?;
        let mut param_oids = Vec::with_capacity(num_params);

        for _ in 0..num_params {
            let (oid, rest) = read_u32(data)?;
            param_oids.push(oid);
            data = rest;
        }

        Ok(Self { param_oids })
    }

    /// Get parameter type OIDs.
    pub fn oids(&self) -> &[Oid] {
        &self.param_oids
    }

    /// Take the parameter type OIDs.
    pub fn into_oids(self) -> Vec<Oid> {
        self.param_oids
    }
}
