//! Connection actor.
//!
//! Each connection is one tokio task that owns a [`ConnectionMachine`], its
//! transport and its buffers. Everything else talks to it through a
//! [`ConnectionHandle`]:
//!
//! - commands are queued in arrival order and fed to the machine only while
//!   it is at rest (idle, or inside an idle transaction block);
//! - `Terminate` skips the queue;
//! - lifecycle changes are reported to the owning pool as [`PoolEvent`]s.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::buffer_pool::{GLOBAL_BUFFER_POOL, PooledBufferSet};
use crate::buffer_set::BufferSet;
use crate::error::{Error, Result};
use crate::opts::ConnectionOptions;
use crate::protocol::codec::decode_frame;
use crate::result::Resultset;
use crate::state::{
    AsyncMessage, ConnectionMachine, LockToken, OpId, Output, Request, TransactionOptions,
};
use crate::types::{BoundParams, TypeRegistry};

use super::stream::Stream;

/// Identifier of a connection inside its pool.
pub type ConnectionId = u64;

/// Receives each batch of rows and whether it completes its statement.
pub type RowSink = Box<dyn FnMut(Resultset, bool) + Send>;

/// Receives the error of a failed operation.
pub type ErrorCallback = Box<dyn FnOnce(Error) + Send>;

const READ_CHUNK: usize = 8192;

/// How the result of a command is delivered.
pub enum Done {
    Channel(oneshot::Sender<Result<()>>),
    Callback(Box<dyn FnOnce(Result<()>) + Send>),
}

impl Done {
    pub fn complete(self, result: Result<()>) {
        match self {
            Done::Channel(tx) => {
                let _ = tx.send(result);
            }
            Done::Callback(callback) => callback(result),
        }
    }
}

/// Command sent to a connection actor.
pub enum Command {
    /// Take exclusive use of the idle connection.
    Lock { token: LockToken, done: Done },
    /// Release it. `on_abandoned` receives the outcome of a dirty exit.
    Unlock {
        token: LockToken,
        on_abandoned: Option<ErrorCallback>,
    },
    Begin {
        token: LockToken,
        op: OpId,
        options: TransactionOptions,
        done: Done,
    },
    Execute {
        token: LockToken,
        op: OpId,
        sql: String,
        params: Option<BoundParams>,
        rows: RowSink,
        done: Done,
    },
    Commit {
        token: LockToken,
        op: OpId,
        done: Done,
    },
    Rollback {
        token: LockToken,
        op: OpId,
        done: Done,
    },
    /// Close the connection, failing whatever is pending.
    Terminate,
}

impl Command {
    /// Complete the command with `error` without running it.
    pub fn fail(self, error: Error) {
        match self {
            Command::Lock { done, .. }
            | Command::Begin { done, .. }
            | Command::Execute { done, .. }
            | Command::Commit { done, .. }
            | Command::Rollback { done, .. } => done.complete(Err(error)),
            Command::Unlock { .. } | Command::Terminate => {}
        }
    }
}

/// Lifecycle report from a connection to its pool.
#[derive(Debug)]
pub enum PoolEvent {
    /// Idle and unlocked; can be handed out.
    Ready(ConnectionId),
    /// Failed fatally. `Terminated` follows.
    Error(ConnectionId, Error),
    /// Gone. Sent exactly once.
    Terminated(ConnectionId),
}

/// Sending side of a connection actor.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    commands: mpsc::UnboundedSender<Command>,
}

impl ConnectionHandle {
    /// Spawn the actor on `runtime` and return at once.
    ///
    /// The actor connects, runs startup and reports [`PoolEvent::Ready`].
    pub fn spawn(
        id: ConnectionId,
        options: Arc<ConnectionOptions>,
        batch_rows: usize,
        registry: Arc<TypeRegistry>,
        events: mpsc::UnboundedSender<PoolEvent>,
        runtime: &Handle,
    ) -> Self {
        let (commands, receiver) = mpsc::unbounded_channel();
        let actor = Actor {
            id,
            machine: ConnectionMachine::new(Arc::clone(&options), registry, batch_rows),
            buffers: GLOBAL_BUFFER_POOL.get_buffer_set(),
            commands: receiver,
            queue: VecDeque::new(),
            pending: BTreeMap::new(),
            abandoned: None,
            events,
        };
        runtime.spawn(actor.run(options));
        Self { id, commands }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queue a command. If the actor is gone the command fails with
    /// `ConnectionClosed`.
    pub fn send(&self, command: Command) {
        if let Err(mpsc::error::SendError(command)) = self.commands.send(command) {
            command.fail(Error::ConnectionClosed);
        }
    }
}

struct Pending {
    rows: Option<RowSink>,
    done: Done,
}

struct Actor {
    id: ConnectionId,
    machine: ConnectionMachine,
    buffers: PooledBufferSet,
    commands: mpsc::UnboundedReceiver<Command>,
    queue: VecDeque<Command>,
    pending: BTreeMap<OpId, Pending>,
    abandoned: Option<ErrorCallback>,
    events: mpsc::UnboundedSender<PoolEvent>,
}

impl Actor {
    async fn run(mut self, options: Arc<ConnectionOptions>) {
        let result = self.serve(&options).await;
        if let Err(error) = &result {
            self.machine.fail(error);
        }
        self.drain_outputs();

        let error = result.err();
        let closing = error.clone().unwrap_or(Error::ConnectionClosed);
        for pending in std::mem::take(&mut self.pending).into_values() {
            pending.done.complete(Err(closing.clone()));
        }
        self.commands.close();
        while let Ok(command) = self.commands.try_recv() {
            self.queue.push_back(command);
        }
        for command in self.queue.drain(..) {
            command.fail(closing.clone());
        }

        if let Some(error) = error {
            let _ = self.events.send(PoolEvent::Error(self.id, error));
        }
        let _ = self.events.send(PoolEvent::Terminated(self.id));
    }

    async fn serve(&mut self, options: &ConnectionOptions) -> Result<()> {
        let mut stream = Stream::connect(options).await?;
        info!(id = self.id, alias = %options.alias, "connection opened");
        self.machine.start(&mut self.buffers.write_buffer)?;

        loop {
            self.step()?;
            if !self.buffers.write_buffer.is_empty() {
                stream.write_all(&self.buffers.write_buffer).await?;
                stream.flush().await?;
                self.buffers.write_buffer.clear();
            }
            if self.machine.is_terminated() {
                return Ok(());
            }

            let buffers: &mut BufferSet = &mut self.buffers;
            buffers.read_buffer.reserve(READ_CHUNK);
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Terminate) | None => {
                        self.machine.terminate(&mut buffers.write_buffer);
                    }
                    Some(command) => self.queue.push_back(command),
                },
                read = stream.read_buf(&mut buffers.read_buffer) => {
                    read?;
                    process_frames(&mut self.machine, buffers)?;
                }
            }
        }
    }

    /// Deliver outputs and feed queued commands until the machine is busy
    /// or the queue is empty.
    fn step(&mut self) -> Result<()> {
        loop {
            self.drain_outputs();
            if self.machine.is_terminated() || !self.machine.is_at_rest() {
                return Ok(());
            }
            let Some(command) = self.queue.pop_front() else {
                return Ok(());
            };
            self.apply(command)?;
        }
    }

    fn apply(&mut self, command: Command) -> Result<()> {
        let out = &mut self.buffers.write_buffer;
        match command {
            Command::Lock { token, done } => done.complete(self.machine.lock(token)),
            Command::Unlock {
                token,
                on_abandoned,
            } => {
                if on_abandoned.is_some() {
                    self.abandoned = on_abandoned;
                }
                if let Err(error) = self.machine.unlock(token, out) {
                    debug!(id = self.id, %error, "ignoring unlock");
                }
            }
            Command::Begin {
                token,
                op,
                options,
                done,
            } => {
                self.pending.insert(op, Pending { rows: None, done });
                self.machine
                    .request(token, Request::Begin { op, options }, out)?;
            }
            Command::Execute {
                token,
                op,
                sql,
                params,
                rows,
                done,
            } => {
                self.pending.insert(
                    op,
                    Pending {
                        rows: Some(rows),
                        done,
                    },
                );
                self.machine
                    .request(token, Request::Execute { op, sql, params }, out)?;
            }
            Command::Commit { token, op, done } => {
                self.pending.insert(op, Pending { rows: None, done });
                self.machine.request(token, Request::Commit { op }, out)?;
            }
            Command::Rollback { token, op, done } => {
                self.pending.insert(op, Pending { rows: None, done });
                self.machine.request(token, Request::Rollback { op }, out)?;
            }
            Command::Terminate => self.machine.terminate(out),
        }
        Ok(())
    }

    fn drain_outputs(&mut self) {
        while let Some(output) = self.machine.poll_output() {
            match output {
                Output::Ready => {
                    self.abandoned = None;
                    let _ = self.events.send(PoolEvent::Ready(self.id));
                }
                Output::Completed { op } => {
                    if let Some(pending) = self.pending.remove(&op) {
                        pending.done.complete(Ok(()));
                    }
                }
                Output::Failed { op, error } => {
                    if let Some(pending) = self.pending.remove(&op) {
                        pending.done.complete(Err(error));
                    }
                }
                Output::Rows {
                    op,
                    result,
                    complete,
                } => {
                    if let Some(rows) = self.pending.get_mut(&op).and_then(|p| p.rows.as_mut()) {
                        rows(result, complete);
                    }
                }
                Output::Abandoned { error } => match self.abandoned.take() {
                    Some(callback) => callback(error),
                    None => debug!(id = self.id, %error, "abandoned transaction closed"),
                },
                Output::Async(AsyncMessage::Notification {
                    pid,
                    channel,
                    payload,
                }) => {
                    info!(id = self.id, pid, %channel, %payload, "notification");
                }
                Output::Async(AsyncMessage::ParameterChanged { name, value }) => {
                    debug!(id = self.id, %name, %value, "server parameter changed");
                }
                Output::Async(AsyncMessage::Notice(_)) => {}
                Output::Terminated => debug!(id = self.id, "connection terminated"),
            }
        }
    }
}

/// Decode every complete frame in the read buffer.
fn process_frames(machine: &mut ConnectionMachine, buffers: &mut BufferSet) -> Result<()> {
    let mut consumed = 0;
    loop {
        let (msg, len) = match decode_frame(&buffers.read_buffer[consumed..]) {
            Ok(frame) => frame,
            Err(Error::TruncatedFrame { .. }) => break,
            Err(error) => return Err(error),
        };
        machine.handle_message(msg, &mut buffers.write_buffer)?;
        consumed += len;
    }
    buffers.consume(consumed);
    Ok(())
}
