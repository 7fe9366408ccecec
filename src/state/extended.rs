//! Extended query protocol states.
//!
//! [`ExtendedQuery`] drives three children, each ending in its own Sync:
//!
//! 1. [`ParseStep`]: Parse + Describe(S), skipped when the statement is cached
//! 2. [`BindStep`]: Bind into the unnamed portal
//! 3. [`ExecuteStep`]: Describe(P), then Execute and row fetching

use std::sync::Arc;

use md5::{Digest, Md5};
use tracing::debug;

use crate::error::{Error, Result};
use crate::protocol::backend::{
    ErrorResponse, ParameterDescription, RawMessage, RowDescription, msg_type,
};
use crate::protocol::frontend::{
    write_bind, write_describe_portal, write_describe_statement, write_execute, write_parse,
    write_sync,
};
use crate::protocol::types::{FormatCode, Oid};
use crate::result::{FieldDescription, columns_of};
use crate::types::BoundParams;

use super::fetch::Fetch;
use super::{
    Context, OpId, Outcome, Output, PreparedStatement, State, Transition, unexpected,
};

/// Server-side name for `sql` prepared with parameter types `param_oids`.
///
/// `s_` followed by the hex MD5 of the SQL, a zero byte and the big-endian OIDs.
pub fn statement_name(sql: &str, param_oids: &[Oid]) -> String {
    let mut hasher = Md5::new();
    hasher.update(sql.as_bytes());
    hasher.update([0u8]);
    for oid in param_oids {
        hasher.update(oid.to_be_bytes());
    }
    format!("s_{:x}", hasher.finalize())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Parse,
    Bind,
    Execute,
}

/// Parent of the Parse, Bind and Execute steps of one parameterized query.
#[derive(Debug)]
pub(crate) struct ExtendedQuery {
    op: OpId,
    sql: String,
    params: Option<BoundParams>,
    statement: String,
    step: Step,
}

impl ExtendedQuery {
    pub fn new(op: OpId, sql: String, params: BoundParams) -> Self {
        let statement = statement_name(&sql, params.oids());
        Self {
            op,
            sql,
            params: Some(params),
            statement,
            step: Step::Parse,
        }
    }

    pub fn op(&self) -> OpId {
        self.op
    }

    pub fn enter(&mut self, ctx: &mut Context<'_>) -> Result<Transition> {
        if ctx.session.prepared.contains_key(&self.statement) {
            debug!(op = self.op, statement = %self.statement, "prepared statement cache hit");
            return self.bind();
        }
        debug!(op = self.op, statement = %self.statement, sql = %self.sql, "preparing statement");
        self.step = Step::Parse;
        let oids = self
            .params
            .as_ref()
            .map(|params| params.oids().to_vec())
            .unwrap_or_default();
        Ok(Transition::Push(State::Parse(ParseStep::new(
            self.statement.clone(),
            std::mem::take(&mut self.sql),
            oids,
        ))))
    }

    fn bind(&mut self) -> Result<Transition> {
        let params = self
            .params
            .take()
            .ok_or_else(|| Error::Protocol("parameters already bound".into()))?;
        self.step = Step::Bind;
        Ok(Transition::Push(State::Bind(BindStep::new(
            self.statement.clone(),
            params,
        ))))
    }

    pub fn resume(&mut self, outcome: Outcome, ctx: &mut Context<'_>) -> Result<Transition> {
        if let Outcome::Failed(error) = outcome {
            ctx.emit(Output::Failed {
                op: self.op,
                error: error.clone(),
            });
            return Ok(Transition::Pop(Outcome::Failed(error)));
        }
        match self.step {
            Step::Parse => self.bind(),
            Step::Bind => {
                self.step = Step::Execute;
                Ok(Transition::Push(State::Execute(ExecuteStep::new(
                    self.op,
                    ctx.session.batch_rows,
                ))))
            }
            Step::Execute => {
                ctx.emit(Output::Completed { op: self.op });
                Ok(Transition::Pop(Outcome::Success))
            }
        }
    }
}

/// Parse + Describe(S) + Sync.
#[derive(Debug)]
pub(crate) struct ParseStep {
    statement: String,
    sql: String,
    param_oids: Vec<Oid>,
    columns: Option<Arc<[FieldDescription]>>,
    error: Option<Error>,
}

impl ParseStep {
    fn new(statement: String, sql: String, param_oids: Vec<Oid>) -> Self {
        Self {
            statement,
            sql,
            param_oids,
            columns: None,
            error: None,
        }
    }

    pub fn enter(&mut self, ctx: &mut Context<'_>) -> Result<Transition> {
        if let Err(error) = write_parse(ctx.out, &self.statement, &self.sql, &self.param_oids) {
            return Ok(Transition::Pop(Outcome::Failed(error)));
        }
        write_describe_statement(ctx.out, &self.statement);
        write_sync(ctx.out);
        Ok(Transition::Stay)
    }

    pub fn handle(&mut self, msg: RawMessage<'_>, ctx: &mut Context<'_>) -> Result<Transition> {
        match msg.type_byte {
            msg_type::PARSE_COMPLETE | msg_type::NO_DATA => {}
            msg_type::PARAMETER_DESCRIPTION => {
                self.param_oids = ParameterDescription::parse(msg.payload)?.into_oids();
            }
            msg_type::ROW_DESCRIPTION => {
                let desc = RowDescription::parse(msg.payload)?;
                self.columns = Some(columns_of(&desc));
            }
            msg_type::ERROR_RESPONSE => {
                let error = ErrorResponse::parse(msg.payload)?.into_error();
                self.error.get_or_insert(error);
            }
            msg_type::READY_FOR_QUERY => {
                if let Some(error) = self.error.take() {
                    return Ok(Transition::Pop(Outcome::Failed(error)));
                }
                let name = std::mem::take(&mut self.statement);
                ctx.session.prepared.insert(
                    name.clone(),
                    PreparedStatement {
                        name,
                        param_oids: std::mem::take(&mut self.param_oids),
                        columns: self.columns.take(),
                    },
                );
                return Ok(Transition::Pop(Outcome::Success));
            }
            _ => return Err(unexpected(msg, "Parse")),
        }
        Ok(Transition::Stay)
    }
}

/// Bind into the unnamed portal + Sync.
#[derive(Debug)]
pub(crate) struct BindStep {
    statement: String,
    params: BoundParams,
    error: Option<Error>,
}

impl BindStep {
    fn new(statement: String, params: BoundParams) -> Self {
        Self {
            statement,
            params,
            error: None,
        }
    }

    pub fn enter(&mut self, ctx: &mut Context<'_>) -> Result<Transition> {
        let prepared = ctx.session.prepared.get(&self.statement).ok_or_else(|| {
            Error::Protocol(format!("statement {} is not prepared", self.statement))
        })?;
        let registry = &ctx.session.registry;
        let result_formats: Vec<FormatCode> = prepared
            .columns
            .iter()
            .flat_map(|columns| columns.iter())
            .map(|column| registry.result_format(column.type_oid))
            .collect();
        let written = write_bind(ctx.out, "", &self.statement, &self.params, &result_formats);
        if let Err(error) = written {
            return Ok(Transition::Pop(Outcome::Failed(error)));
        }
        write_sync(ctx.out);
        Ok(Transition::Stay)
    }

    pub fn handle(&mut self, msg: RawMessage<'_>, _ctx: &mut Context<'_>) -> Result<Transition> {
        match msg.type_byte {
            msg_type::BIND_COMPLETE => Ok(Transition::Stay),
            msg_type::ERROR_RESPONSE => {
                let error = ErrorResponse::parse(msg.payload)?.into_error();
                self.error.get_or_insert(error);
                Ok(Transition::Stay)
            }
            msg_type::READY_FOR_QUERY => Ok(Transition::Pop(match self.error.take() {
                Some(error) => Outcome::Failed(error),
                None => Outcome::Success,
            })),
            _ => Err(unexpected(msg, "Bind")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExecutePhase {
    Describing,
    Fetching { suspended: bool },
}

/// Describe(P) + Sync, then Execute + Sync until the portal is exhausted.
#[derive(Debug)]
pub(crate) struct ExecuteStep {
    phase: ExecutePhase,
    fetch: Fetch,
    error: Option<Error>,
}

impl ExecuteStep {
    fn new(op: OpId, batch_rows: usize) -> Self {
        Self {
            phase: ExecutePhase::Describing,
            fetch: Fetch::new(op, batch_rows),
            error: None,
        }
    }

    pub fn enter(&mut self, ctx: &mut Context<'_>) -> Result<Transition> {
        write_describe_portal(ctx.out, "");
        write_sync(ctx.out);
        Ok(Transition::Stay)
    }

    fn execute(ctx: &mut Context<'_>) {
        write_execute(ctx.out, "", 0);
        write_sync(ctx.out);
    }

    pub fn handle(&mut self, msg: RawMessage<'_>, ctx: &mut Context<'_>) -> Result<Transition> {
        match (msg.type_byte, self.phase) {
            (msg_type::ERROR_RESPONSE, _) => {
                let error = ErrorResponse::parse(msg.payload)?.into_error();
                self.fetch.reset();
                self.error.get_or_insert(error);
            }
            (msg_type::ROW_DESCRIPTION, ExecutePhase::Describing) => {
                self.fetch.describe(msg.payload)?;
            }
            (msg_type::NO_DATA, ExecutePhase::Describing) => {}
            (msg_type::READY_FOR_QUERY, ExecutePhase::Describing) => {
                if let Some(error) = self.error.take() {
                    return Ok(Transition::Pop(Outcome::Failed(error)));
                }
                Self::execute(ctx);
                self.phase = ExecutePhase::Fetching { suspended: false };
            }
            (msg_type::DATA_ROW, ExecutePhase::Fetching { .. }) => {
                self.fetch.data_row(msg.payload, ctx)?;
            }
            (msg_type::COMMAND_COMPLETE, ExecutePhase::Fetching { .. }) => {
                self.fetch.command_complete(msg.payload, ctx)?;
            }
            (msg_type::EMPTY_QUERY_RESPONSE, ExecutePhase::Fetching { .. }) => {
                self.fetch.empty_query(ctx);
            }
            (msg_type::PORTAL_SUSPENDED, ExecutePhase::Fetching { .. }) => {
                self.phase = ExecutePhase::Fetching { suspended: true };
            }
            (msg_type::READY_FOR_QUERY, ExecutePhase::Fetching { suspended }) => {
                if let Some(error) = self.error.take() {
                    return Ok(Transition::Pop(Outcome::Failed(error)));
                }
                if !suspended {
                    return Ok(Transition::Pop(Outcome::Success));
                }
                Self::execute(ctx);
                self.phase = ExecutePhase::Fetching { suspended: false };
            }
            _ if msg.is_copy_response() => {
                return Err(Error::Unsupported("COPY is not supported".into()));
            }
            _ => return Err(unexpected(msg, "Execute")),
        }
        Ok(Transition::Stay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::oid;

    #[test]
    fn test_statement_name() {
        let a = statement_name("SELECT $1", &[oid::INT4]);
        assert!(a.starts_with("s_"));
        assert_eq!(a.len(), 2 + 32);
        assert_eq!(a, statement_name("SELECT $1", &[oid::INT4]));
        assert_ne!(a, statement_name("SELECT $1", &[oid::INT8]));
        assert_ne!(a, statement_name("SELECT $1 ", &[oid::INT4]));
    }
}
