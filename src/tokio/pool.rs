//! Connection pool for one alias.
//!
//! Bookkeeping lives behind a `std::sync::Mutex`; connection actors report
//! to the pool through a channel drained by a per-pool task. Callbacks never
//! run while the mutex is held.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::opts::ConnectionOptions;
use crate::state::{LockToken, TransactionOptions};
use crate::types::TypeRegistry;

use super::conn::{Command, ConnectionHandle, ConnectionId, Done, ErrorCallback, PoolEvent};
use super::next_id;
use super::transaction::Transaction;

/// Where a transaction, or the reason there is none, is delivered.
pub(crate) enum Reply {
    Callback {
        on_ready: Box<dyn FnOnce(Transaction) + Send>,
        on_error: ErrorCallback,
    },
    Channel(oneshot::Sender<Result<Transaction>>),
}

impl Reply {
    fn fail(self, error: Error) {
        match self {
            Reply::Callback { on_error, .. } => on_error(error),
            Reply::Channel(tx) => {
                let _ = tx.send(Err(error));
            }
        }
    }

    fn ready(self, handle: ConnectionHandle, token: LockToken) {
        match self {
            Reply::Callback { on_ready, on_error } => {
                on_ready(Transaction::new(handle, token, Some(on_error)));
            }
            // A receiver that gave up drops the transaction, which unlocks
            Reply::Channel(tx) => {
                let _ = tx.send(Ok(Transaction::new(handle, token, None)));
            }
        }
    }
}

pub(crate) struct Waiter {
    pub options: TransactionOptions,
    pub reply: Reply,
}

/// Snapshot of a pool's bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Live or connecting connections
    pub connections: usize,
    /// Connections waiting for a caller
    pub idle: usize,
    /// Callers waiting for a connection
    pub waiters: usize,
    /// Set once the pool is closing
    pub closed: bool,
}

struct Entry {
    handle: ConnectionHandle,
    ever_ready: bool,
}

#[derive(Default)]
struct PoolState {
    connections: BTreeMap<ConnectionId, Entry>,
    idle: VecDeque<ConnectionId>,
    waiters: VecDeque<Waiter>,
    closed: bool,
}

struct PoolShared {
    options: Arc<ConnectionOptions>,
    pool_size: usize,
    batch_rows: usize,
    registry: Arc<TypeRegistry>,
    runtime: Handle,
    state: Mutex<PoolState>,
    events: mpsc::UnboundedSender<PoolEvent>,
    closed: watch::Sender<bool>,
}

/// Pool of connections sharing one set of [`ConnectionOptions`].
#[derive(Clone)]
pub(crate) struct ConnectionPool {
    shared: Arc<PoolShared>,
}

impl ConnectionPool {
    /// Create the pool and open its first connection.
    pub fn new(
        options: Arc<ConnectionOptions>,
        pool_size: usize,
        batch_rows: usize,
        registry: Arc<TypeRegistry>,
        runtime: Handle,
    ) -> Self {
        let (events, mut receiver) = mpsc::unbounded_channel();
        let (closed, _) = watch::channel(false);
        let shared = Arc::new(PoolShared {
            options,
            pool_size,
            batch_rows,
            registry,
            runtime,
            state: Mutex::new(PoolState::default()),
            events,
            closed,
        });

        let weak: Weak<PoolShared> = Arc::downgrade(&shared);
        shared.runtime.spawn(async move {
            while let Some(event) = receiver.recv().await {
                let Some(shared) = weak.upgrade() else {
                    break;
                };
                shared.on_event(event);
            }
        });

        shared.open_connection(&mut shared.lock());
        Self { shared }
    }

    pub fn options(&self) -> &ConnectionOptions {
        &self.shared.options
    }

    pub fn pool_size(&self) -> usize {
        self.shared.pool_size
    }

    /// Hand a transaction to `waiter` as soon as a connection is free.
    pub fn acquire(&self, waiter: Waiter) {
        self.shared.admit(waiter, false);
    }

    /// Fail waiters with `PoolClosed` and terminate every connection.
    pub fn close(&self) {
        self.shared.close();
    }

    /// Resolves once every connection of a closed pool has terminated.
    pub fn closed(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.shared.closed.subscribe();
        async move {
            let _ = rx.wait_for(|closed| *closed).await;
        }
    }

    pub fn status(&self) -> PoolStatus {
        let state = self.shared.lock();
        PoolStatus {
            connections: state.connections.len(),
            idle: state.idle.len(),
            waiters: state.waiters.len(),
            closed: state.closed,
        }
    }
}

impl PoolShared {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn open_connection(&self, state: &mut PoolState) {
        let id = next_id();
        info!(alias = %self.options.alias, id, "opening connection");
        let handle = ConnectionHandle::spawn(
            id,
            Arc::clone(&self.options),
            self.batch_rows,
            Arc::clone(&self.registry),
            self.events.clone(),
            &self.runtime,
        );
        state.connections.insert(
            id,
            Entry {
                handle,
                ever_ready: false,
            },
        );
    }

    /// Serve `waiter` from an idle connection, or queue it.
    ///
    /// `front` puts it back at the head of the queue.
    fn admit(self: &Arc<Self>, waiter: Waiter, front: bool) {
        let mut state = self.lock();
        if state.closed {
            drop(state);
            self.fail_waiters(vec![waiter], Error::PoolClosed);
            return;
        }
        let idle = state.idle.pop_front().and_then(|id| {
            state
                .connections
                .get(&id)
                .map(|entry| entry.handle.clone())
        });
        if let Some(handle) = idle {
            drop(state);
            self.serve(handle, waiter);
            return;
        }
        if front {
            state.waiters.push_front(waiter);
        } else {
            state.waiters.push_back(waiter);
        }
        self.grow(&mut state);
    }

    /// Open a connection when queued waiters outnumber the connections
    /// still starting up and the pool has room.
    fn grow(&self, state: &mut PoolState) {
        let connecting = state
            .connections
            .values()
            .filter(|entry| !entry.ever_ready)
            .count();
        if !state.closed
            && state.waiters.len() > connecting
            && state.connections.len() < self.pool_size
        {
            self.open_connection(state);
        }
    }

    /// Lock `handle` and BEGIN on behalf of `waiter`.
    fn serve(self: &Arc<Self>, handle: ConnectionHandle, waiter: Waiter) {
        let shared = Arc::clone(self);
        self.runtime.spawn(async move {
            let token = next_id();
            let (tx, rx) = oneshot::channel();
            handle.send(Command::Lock {
                token,
                done: Done::Channel(tx),
            });
            if let Err(error) = completion(rx).await {
                // Died between Ready and Lock; try another connection
                debug!(id = handle.id(), %error, "lock failed, re-admitting caller");
                if error.is_connection_broken() {
                    shared.admit(waiter, true);
                } else {
                    waiter.reply.fail(error);
                }
                return;
            }

            let (tx, rx) = oneshot::channel();
            handle.send(Command::Begin {
                token,
                op: next_id(),
                options: waiter.options,
                done: Done::Channel(tx),
            });
            match completion(rx).await {
                Ok(()) => waiter.reply.ready(handle, token),
                Err(error) => {
                    handle.send(Command::Unlock {
                        token,
                        on_abandoned: None,
                    });
                    waiter.reply.fail(error);
                }
            }
        });
    }

    fn on_event(self: &Arc<Self>, event: PoolEvent) {
        match event {
            PoolEvent::Ready(id) => self.on_ready(id),
            PoolEvent::Error(id, error) => self.on_error(id, error),
            PoolEvent::Terminated(id) => self.on_terminated(id),
        }
    }

    fn on_ready(self: &Arc<Self>, id: ConnectionId) {
        let mut state = self.lock();
        let Some(entry) = state.connections.get_mut(&id) else {
            return;
        };
        entry.ever_ready = true;
        let handle = entry.handle.clone();
        if state.closed {
            drop(state);
            handle.send(Command::Terminate);
            return;
        }
        match state.waiters.pop_front() {
            Some(waiter) => {
                drop(state);
                self.serve(handle, waiter);
            }
            None => {
                debug!(alias = %self.options.alias, id, "connection idle");
                state.idle.push_back(id);
            }
        }
    }

    /// Evict a failed connection and fail every queued waiter with its
    /// error.
    fn on_error(self: &Arc<Self>, id: ConnectionId, error: Error) {
        let mut state = self.lock();
        if state.connections.remove(&id).is_none() {
            return;
        }
        state.idle.retain(|idle| *idle != id);
        warn!(alias = %self.options.alias, id, %error, "evicting connection");

        let drained: Vec<Waiter> = state.waiters.drain(..).collect();
        let closed = state.closed && state.connections.is_empty();
        drop(state);

        self.fail_waiters(drained, error);
        if closed {
            self.closed.send_replace(true);
        }
    }

    fn on_terminated(self: &Arc<Self>, id: ConnectionId) {
        let mut state = self.lock();
        if state.connections.remove(&id).is_some() {
            state.idle.retain(|idle| *idle != id);
            debug!(alias = %self.options.alias, id, "connection removed");
            self.grow(&mut state);
        }
        let closed = state.closed && state.connections.is_empty();
        drop(state);
        if closed {
            self.closed.send_replace(true);
        }
    }

    fn close(&self) {
        let mut state = self.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        state.idle.clear();
        let waiters: Vec<Waiter> = state.waiters.drain(..).collect();
        let handles: Vec<ConnectionHandle> = state
            .connections
            .values()
            .map(|entry| entry.handle.clone())
            .collect();
        let empty = state.connections.is_empty();
        drop(state);

        info!(alias = %self.options.alias, connections = handles.len(), "closing pool");
        self.fail_waiters(waiters, Error::PoolClosed);
        for handle in handles {
            handle.send(Command::Terminate);
        }
        if empty {
            self.closed.send_replace(true);
        }
    }

    /// Deliver `error` to `waiters` from a runtime task.
    fn fail_waiters(&self, waiters: Vec<Waiter>, error: Error) {
        if waiters.is_empty() {
            return;
        }
        self.runtime.spawn(async move {
            for waiter in waiters {
                waiter.reply.fail(error.clone());
            }
        });
    }
}

async fn completion(rx: oneshot::Receiver<Result<()>>) -> Result<()> {
    rx.await.unwrap_or(Err(Error::ConnectionClosed))
}
