//! Parameter lists bound to extended-protocol statements.

use crate::error::{Error, Result};
use crate::protocol::frontend::extended::MAX_COUNT;
use crate::protocol::types::{FormatCode, Oid};

use super::ToWireValue;

/// Encoded parameters ready for Parse and Bind.
///
/// Holds one OID and one format code per parameter, plus the concatenated
/// length-prefixed values exactly as Bind carries them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoundParams {
    oids: Vec<Oid>,
    formats: Vec<FormatCode>,
    values: Vec<u8>,
}

impl BoundParams {
    /// Create an empty parameter list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode every parameter of `params`.
    pub fn from_params<P: ToParams + ?Sized>(params: &P) -> Result<Self> {
        let mut bound = Self {
            oids: Vec::with_capacity(params.param_count()),
            formats: Vec::with_capacity(params.param_count()),
            values: Vec::new(),
        };
        params.bind_into(&mut bound)?;
        Ok(bound)
    }

    /// Append one parameter.
    ///
    /// On error the list is left as it was before the call.
    pub fn push<T: ToWireValue + ?Sized>(&mut self, value: &T) -> Result<()> {
        if self.oids.len() >= MAX_COUNT {
            return Err(Error::InvalidUsage(format!(
                "a statement takes at most {} parameters",
                MAX_COUNT
            )));
        }
        let mark = self.values.len();
        if let Err(e) = value.encode(&mut self.values) {
            self.values.truncate(mark);
            return Err(e);
        }
        self.oids.push(value.natural_oid());
        self.formats.push(value.format());
        Ok(())
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.oids.len()
    }

    /// True when there are no parameters.
    pub fn is_empty(&self) -> bool {
        self.oids.is_empty()
    }

    /// Parameter type OIDs, sent in Parse.
    pub fn oids(&self) -> &[Oid] {
        &self.oids
    }

    /// Parameter format codes, sent in Bind.
    pub fn formats(&self) -> &[FormatCode] {
        &self.formats
    }

    /// Length-prefixed parameter values, sent in Bind.
    pub fn values(&self) -> &[u8] {
        &self.values
    }
}

/// Trait for encoding multiple parameters.
pub trait ToParams {
    /// Number of parameters.
    fn param_count(&self) -> usize;

    /// Encode every parameter into `params`.
    fn bind_into(&self, params: &mut BoundParams) -> Result<()>;
}

impl ToParams for () {
    fn param_count(&self) -> usize {
        0
    }

    fn bind_into(&self, _params: &mut BoundParams) -> Result<()> {
        Ok(())
    }
}

impl<T: ToParams + ?Sized> ToParams for &T {
    fn param_count(&self) -> usize {
        (*self).param_count()
    }

    fn bind_into(&self, params: &mut BoundParams) -> Result<()> {
        (*self).bind_into(params)
    }
}

impl ToParams for [&dyn ToWireValue] {
    fn param_count(&self) -> usize {
        self.len()
    }

    fn bind_into(&self, params: &mut BoundParams) -> Result<()> {
        self.iter().try_for_each(|value| params.push(*value))
    }
}

impl<const N: usize> ToParams for [&dyn ToWireValue; N] {
    fn param_count(&self) -> usize {
        N
    }

    fn bind_into(&self, params: &mut BoundParams) -> Result<()> {
        self[..].bind_into(params)
    }
}

impl ToParams for BoundParams {
    fn param_count(&self) -> usize {
        self.len()
    }

    fn bind_into(&self, params: &mut BoundParams) -> Result<()> {
        params.oids.extend_from_slice(&self.oids);
        params.formats.extend_from_slice(&self.formats);
        params.values.extend_from_slice(&self.values);
        Ok(())
    }
}

// Tuple implementations via macro
macro_rules! impl_to_params {
    ($count:expr, $($idx:tt: $T:ident),+) => {
        impl<$($T: ToWireValue),+> ToParams for ($($T,)+) {
            fn param_count(&self) -> usize {
                $count
            }

            fn bind_into(&self, params: &mut BoundParams) -> Result<()> {
                $(params.push(&self.$idx)?;)+
                Ok(())
            }
        }
    };
}

impl_to_params!(1, 0: T0);
impl_to_params!(2, 0: T0, 1: T1);
impl_to_params!(3, 0: T0, 1: T1, 2: T2);
impl_to_params!(4, 0: T0, 1: T1, 2: T2, 3: T3);
impl_to_params!(5, 0: T0, 1: T1, 2: T2, 3: T3, 4: T4);
impl_to_params!(6, 0: T0, 1: T1, 2: T2, 3: T3, 4: T4, 5: T5);
impl_to_params!(7, 0: T0, 1: T1, 2: T2, 3: T3, 4: T4, 5: T5, 6: T6);
impl_to_params!(8, 0: T0, 1: T1, 2: T2, 3: T3, 4: T4, 5: T5, 6: T6, 7: T7);
impl_to_params!(9, 0: T0, 1: T1, 2: T2, 3: T3, 4: T4, 5: T5, 6: T6, 7: T7, 8: T8);
impl_to_params!(10, 0: T0, 1: T1, 2: T2, 3: T3, 4: T4, 5: T5, 6: T6, 7: T7, 8: T8, 9: T9);
impl_to_params!(11, 0: T0, 1: T1, 2: T2, 3: T3, 4: T4, 5: T5, 6: T6, 7: T7, 8: T8, 9: T9, 10: T10);
impl_to_params!(12, 0: T0, 1: T1, 2: T2, 3: T3, 4: T4, 5: T5, 6: T6, 7: T7, 8: T8, 9: T9, 10: T10, 11: T11);
