//! Transaction block state.

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::protocol::backend::{CommandComplete, ErrorResponse, RawMessage, msg_type};
use crate::protocol::frontend::write_query;

use super::extended::ExtendedQuery;
use super::simple_query::SimpleQuery;
use super::{
    Context, OpId, Outcome, Output, Request, State, TransactionOptions, Transition, unexpected,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// BEGIN sent
    Beginning { op: OpId },
    /// Waiting for requests
    Open,
    /// COMMIT or ROLLBACK sent. `op` is `None` for a dirty exit.
    Finishing { op: Option<OpId>, commit: bool },
}

/// A BEGIN ... COMMIT/ROLLBACK block.
#[derive(Debug)]
pub(crate) struct TransactionBlock {
    options: TransactionOptions,
    phase: Phase,
    error: Option<Error>,
}

impl TransactionBlock {
    pub fn new(op: OpId, options: TransactionOptions) -> Self {
        Self {
            options,
            phase: Phase::Beginning { op },
            error: None,
        }
    }

    pub fn op(&self) -> Option<OpId> {
        match self.phase {
            Phase::Beginning { op } => Some(op),
            Phase::Finishing { op, .. } => op,
            Phase::Open => None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.phase == Phase::Open
    }

    pub fn enter(&mut self, ctx: &mut Context<'_>) -> Result<Transition> {
        let sql = self.options.begin_sql();
        debug!(op = ?self.op(), %sql, "begin transaction");
        write_query(ctx.out, &sql);
        Ok(Transition::Stay)
    }

    pub fn request(&mut self, request: Request, ctx: &mut Context<'_>) -> Result<Transition> {
        match request {
            Request::Begin { op, .. } => {
                ctx.emit(Output::Failed {
                    op,
                    error: Error::InvalidUsage("a transaction is already in progress".into()),
                });
                Ok(Transition::Stay)
            }
            Request::Execute {
                op,
                sql,
                params: None,
            } => Ok(Transition::Push(State::SimpleQuery(SimpleQuery::new(
                op,
                sql,
                ctx.session.batch_rows,
            )))),
            Request::Execute {
                op,
                sql,
                params: Some(params),
            } => Ok(Transition::Push(State::ExtendedQuery(ExtendedQuery::new(
                op, sql, params,
            )))),
            Request::Commit { op } => {
                self.finish(Some(op), true, ctx);
                Ok(Transition::Stay)
            }
            Request::Rollback { op } => {
                self.finish(Some(op), false, ctx);
                Ok(Transition::Stay)
            }
        }
    }

    /// Close a transaction whose owner let go of it while it was open.
    ///
    /// Commits with `autocommit`, rolls back otherwise.
    pub fn abandon(&mut self, ctx: &mut Context<'_>) {
        if !self.is_open() {
            return;
        }
        let commit = self.options.autocommit;
        warn!(
            commit,
            "transaction abandoned while open, closing it on the owner's behalf"
        );
        self.finish(None, commit, ctx);
    }

    fn finish(&mut self, op: Option<OpId>, commit: bool, ctx: &mut Context<'_>) {
        write_query(ctx.out, if commit { "COMMIT" } else { "ROLLBACK" });
        self.phase = Phase::Finishing { op, commit };
    }

    pub fn handle(&mut self, msg: RawMessage<'_>, ctx: &mut Context<'_>) -> Result<Transition> {
        match (msg.type_byte, self.phase) {
            (msg_type::ERROR_RESPONSE, Phase::Beginning { .. } | Phase::Finishing { .. }) => {
                let error = ErrorResponse::parse(msg.payload)?.into_error();
                self.error.get_or_insert(error);
                Ok(Transition::Stay)
            }
            (msg_type::COMMAND_COMPLETE, Phase::Beginning { .. }) => Ok(Transition::Stay),
            (msg_type::COMMAND_COMPLETE, Phase::Finishing { commit, .. }) => {
                // COMMIT of a failed transaction reports ROLLBACK
                let complete = CommandComplete::parse(msg.payload)?;
                if commit && complete.tag == "ROLLBACK" {
                    self.error.get_or_insert(Error::TransactionRolledBack);
                }
                Ok(Transition::Stay)
            }
            (msg_type::READY_FOR_QUERY, Phase::Beginning { op }) => Ok(match self.error.take() {
                Some(error) => {
                    ctx.emit(Output::Failed {
                        op,
                        error: error.clone(),
                    });
                    Transition::Pop(Outcome::Failed(error))
                }
                None => {
                    ctx.emit(Output::Completed { op });
                    self.phase = Phase::Open;
                    Transition::Stay
                }
            }),
            (msg_type::READY_FOR_QUERY, Phase::Finishing { op, commit }) => {
                let error = self.error.take();
                match op {
                    Some(op) => match &error {
                        Some(error) => ctx.emit(Output::Failed {
                            op,
                            error: error.clone(),
                        }),
                        None => ctx.emit(Output::Completed { op }),
                    },
                    None if !commit => ctx.emit(Output::Abandoned {
                        error: Error::TransactionRolledBack,
                    }),
                    None => {
                        if let Some(error) = &error {
                            ctx.emit(Output::Abandoned {
                                error: error.clone(),
                            });
                        }
                    }
                }
                debug!(commit, failed = error.is_some(), "transaction finished");
                Ok(Transition::Pop(match error {
                    Some(error) => Outcome::Failed(error),
                    None => Outcome::Success,
                }))
            }
            _ => Err(unexpected(msg, "Transaction")),
        }
    }
}
