//! Simple query protocol state.

use tracing::debug;

use crate::error::{Error, Result};
use crate::protocol::backend::{ErrorResponse, RawMessage, msg_type};
use crate::protocol::frontend::write_query;

use super::fetch::Fetch;
use super::{Context, OpId, Outcome, Output, Transition, unexpected};

/// Runs one Query message, which may hold several statements.
#[derive(Debug)]
pub(crate) struct SimpleQuery {
    op: OpId,
    sql: String,
    fetch: Fetch,
    error: Option<Error>,
}

impl SimpleQuery {
    pub fn new(op: OpId, sql: String, batch_rows: usize) -> Self {
        Self {
            op,
            sql,
            fetch: Fetch::new(op, batch_rows),
            error: None,
        }
    }

    pub fn op(&self) -> OpId {
        self.op
    }

    pub fn enter(&mut self, ctx: &mut Context<'_>) -> Result<Transition> {
        debug!(op = self.op, sql = %self.sql, "simple query");
        write_query(ctx.out, &self.sql);
        Ok(Transition::Stay)
    }

    pub fn handle(&mut self, msg: RawMessage<'_>, ctx: &mut Context<'_>) -> Result<Transition> {
        match msg.type_byte {
            msg_type::ROW_DESCRIPTION => self.fetch.describe(msg.payload)?,
            msg_type::DATA_ROW => self.fetch.data_row(msg.payload, ctx)?,
            msg_type::COMMAND_COMPLETE => self.fetch.command_complete(msg.payload, ctx)?,
            msg_type::EMPTY_QUERY_RESPONSE => self.fetch.empty_query(ctx),
            msg_type::ERROR_RESPONSE => {
                let error = ErrorResponse::parse(msg.payload)?.into_error();
                debug!(op = self.op, %error, "simple query failed");
                self.fetch.reset();
                self.error.get_or_insert(error);
            }
            msg_type::READY_FOR_QUERY => {
                return Ok(match self.error.take() {
                    Some(error) => {
                        ctx.emit(Output::Failed {
                            op: self.op,
                            error: error.clone(),
                        });
                        Transition::Pop(Outcome::Failed(error))
                    }
                    None => {
                        ctx.emit(Output::Completed { op: self.op });
                        Transition::Pop(Outcome::Success)
                    }
                });
            }
            _ if msg.is_copy_response() => {
                return Err(Error::Unsupported("COPY is not supported".into()));
            }
            _ => return Err(unexpected(msg, "SimpleQuery")),
        }
        Ok(Transition::Stay)
    }
}
