//! Sans-I/O connection state machine for the PostgreSQL protocol.
//!
//! The machine never performs I/O. Inbound messages and commands go in,
//! frontend bytes are appended to a caller-provided buffer and [`Output`]
//! events are queued for the caller to drain with
//! [`ConnectionMachine::poll_output`].
//!
//! Protocol phases are kept on an explicit stack of [`State`]s. Only the top
//! state sees messages and requests; a finished child pops and its parent
//! resumes with the child's [`Outcome`].

pub mod action;
mod extended;
mod fetch;
mod machine;
mod simple_query;
mod startup;
mod transaction;

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::opts::ConnectionOptions;
use crate::protocol::backend::RawMessage;
use crate::protocol::types::{Oid, TransactionStatus};
use crate::result::FieldDescription;
use crate::types::TypeRegistry;

pub use action::{
    AccessMode, AsyncMessage, IsolationLevel, LockToken, OpId, Output, Request,
    TransactionOptions,
};
pub use extended::statement_name;
pub use machine::ConnectionMachine;

use extended::{BindStep, ExecuteStep, ExtendedQuery, ParseStep};
use simple_query::SimpleQuery;
use startup::Startup;
use transaction::TransactionBlock;

/// A statement prepared on one connection.
#[derive(Debug, Clone)]
pub struct PreparedStatement {
    /// Server-side statement name
    pub name: String,
    /// Parameter types reported by ParameterDescription
    pub param_oids: Vec<Oid>,
    /// Result columns, `None` when the statement returns no rows
    pub columns: Option<Arc<[FieldDescription]>>,
}

/// Connection-wide data shared by every state.
#[derive(Debug)]
pub(crate) struct Session {
    pub options: Arc<ConnectionOptions>,
    pub registry: Arc<TypeRegistry>,
    pub batch_rows: usize,
    pub outputs: VecDeque<Output>,
    pub prepared: HashMap<String, PreparedStatement>,
    pub transaction_status: TransactionStatus,
    pub server_params: Vec<(String, String)>,
    pub backend_key: Option<(u32, u32)>,
}

/// What a state hook hands to the state.
pub(crate) struct Context<'a> {
    pub out: &'a mut Vec<u8>,
    pub session: &'a mut Session,
}

impl Context<'_> {
    pub fn emit(&mut self, output: Output) {
        self.session.outputs.push_back(output);
    }
}

/// Result of a child state, handed to its parent.
#[derive(Debug, Clone)]
pub(crate) enum Outcome {
    Success,
    Failed(Error),
}

/// What the machine does after a hook returns.
#[derive(Debug)]
pub(crate) enum Transition {
    Stay,
    Push(State),
    Pop(Outcome),
    Replace(State),
}

/// One protocol phase on the stack.
#[derive(Debug)]
pub(crate) enum State {
    Startup(Startup),
    Idle,
    Transaction(TransactionBlock),
    SimpleQuery(SimpleQuery),
    ExtendedQuery(ExtendedQuery),
    Parse(ParseStep),
    Bind(BindStep),
    Execute(ExecuteStep),
    Terminated,
}

impl State {
    pub fn name(&self) -> &'static str {
        match self {
            State::Startup(_) => "Startup",
            State::Idle => "Idle",
            State::Transaction(_) => "Transaction",
            State::SimpleQuery(_) => "SimpleQuery",
            State::ExtendedQuery(_) => "ExtendedQuery",
            State::Parse(_) => "Parse",
            State::Bind(_) => "Bind",
            State::Execute(_) => "Execute",
            State::Terminated => "Terminated",
        }
    }

    /// The operation this state reports to, if it owns one.
    pub fn op(&self) -> Option<OpId> {
        match self {
            State::Transaction(tx) => tx.op(),
            State::SimpleQuery(query) => Some(query.op()),
            State::ExtendedQuery(query) => Some(query.op()),
            _ => None,
        }
    }

    /// True when the state waits for a request rather than for the server.
    pub fn at_rest(&self) -> bool {
        match self {
            State::Idle => true,
            State::Transaction(tx) => tx.is_open(),
            _ => false,
        }
    }

    pub fn enter(&mut self, ctx: &mut Context<'_>) -> Result<Transition> {
        match self {
            State::Startup(startup) => startup.enter(ctx),
            State::Transaction(tx) => tx.enter(ctx),
            State::SimpleQuery(query) => query.enter(ctx),
            State::ExtendedQuery(query) => query.enter(ctx),
            State::Parse(step) => step.enter(ctx),
            State::Bind(step) => step.enter(ctx),
            State::Execute(step) => step.enter(ctx),
            State::Idle | State::Terminated => Ok(Transition::Stay),
        }
    }

    pub fn handle(&mut self, msg: RawMessage<'_>, ctx: &mut Context<'_>) -> Result<Transition> {
        match self {
            State::Startup(startup) => startup.handle(msg, ctx),
            State::Transaction(tx) => tx.handle(msg, ctx),
            State::SimpleQuery(query) => query.handle(msg, ctx),
            State::Parse(step) => step.handle(msg, ctx),
            State::Bind(step) => step.handle(msg, ctx),
            State::Execute(step) => step.handle(msg, ctx),
            State::Terminated => Ok(Transition::Stay),
            State::Idle | State::ExtendedQuery(_) => Err(unexpected(msg, self.name())),
        }
    }

    pub fn request(&mut self, request: Request, ctx: &mut Context<'_>) -> Result<Transition> {
        match self {
            State::Idle => idle_request(request, ctx),
            State::Transaction(tx) if tx.is_open() => tx.request(request, ctx),
            State::Terminated => {
                ctx.emit(Output::Failed {
                    op: request.op(),
                    error: Error::ConnectionClosed,
                });
                Ok(Transition::Stay)
            }
            _ => {
                ctx.emit(Output::Failed {
                    op: request.op(),
                    error: Error::InvalidUsage(format!(
                        "connection is busy in state {}",
                        self.name()
                    )),
                });
                Ok(Transition::Stay)
            }
        }
    }

    pub fn resume(&mut self, outcome: Outcome, ctx: &mut Context<'_>) -> Result<Transition> {
        match self {
            State::ExtendedQuery(query) => query.resume(outcome, ctx),
            // Children report to their own op
            State::Idle | State::Transaction(_) => Ok(Transition::Stay),
            _ => Err(Error::Protocol(format!(
                "state {} cannot resume a child",
                self.name()
            ))),
        }
    }
}

fn idle_request(request: Request, ctx: &mut Context<'_>) -> Result<Transition> {
    match request {
        Request::Begin { op, options } => Ok(Transition::Push(State::Transaction(
            TransactionBlock::new(op, options),
        ))),
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
            params: Some(_),
            ..
        } => {
            ctx.emit(Output::Failed {
                op,
                error: Error::InvalidUsage(
                    "parameterized queries require a transaction".into(),
                ),
            });
            Ok(Transition::Stay)
        }
        Request::Commit { op } | Request::Rollback { op } => {
            ctx.emit(Output::Failed {
                op,
                error: Error::InvalidUsage("no transaction in progress".into()),
            });
            Ok(Transition::Stay)
        }
    }
}

/// Protocol error for a message the current state does not expect.
pub(crate) fn unexpected(msg: RawMessage<'_>, state: &str) -> Error {
    Error::Protocol(format!(
        "unexpected message '{}' in state {}",
        msg.type_byte as char, state
    ))
}
