//! Transactions handed out by the pool.

use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::{mpsc, oneshot};

use crate::error::{Error, Result};
use crate::query::Query;
use crate::result::Resultset;
use crate::state::LockToken;
use crate::types::ToParams;

use super::conn::{Command, ConnectionHandle, ConnectionId, Done, ErrorCallback, RowSink};
use super::next_id;

/// An open transaction block on a locked pooled connection.
///
/// Statements are queued on the connection in call order; each returns
/// without waiting for the previous one.
///
/// Dropping a transaction that was neither committed nor rolled back
/// releases the connection, which closes the block on the server: rolled
/// back, or committed when it was begun with
/// [`TransactionOptions::autocommit`](crate::TransactionOptions::autocommit).
/// The outcome goes to the `on_error` given to `begin`.
pub struct Transaction {
    handle: ConnectionHandle,
    token: LockToken,
    on_abandoned: Option<ErrorCallback>,
    finished: bool,
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("connection", &self.handle.id())
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl Transaction {
    pub(crate) fn new(
        handle: ConnectionHandle,
        token: LockToken,
        on_abandoned: Option<ErrorCallback>,
    ) -> Self {
        Self {
            handle,
            token,
            on_abandoned,
            finished: false,
        }
    }

    /// Id of the pooled connection running this transaction.
    pub fn connection_id(&self) -> ConnectionId {
        self.handle.id()
    }

    /// Run `sql` and deliver its rows to `on_rows` batch by batch.
    ///
    /// `on_rows` receives every batch with a flag set on the last batch of
    /// each statement. Without parameters the simple protocol is used and
    /// `sql` may hold several statements. With parameters the statement is
    /// prepared once per connection and reused.
    ///
    /// `on_error` is called at most once. A parameter that fails to encode
    /// is reported right away, before anything is sent.
    pub fn execute<P, R, E>(&self, sql: &str, params: &P, on_rows: R, on_error: E)
    where
        P: ToParams + ?Sized,
        R: FnMut(Resultset, bool) + Send + 'static,
        E: FnOnce(Error) + Send + 'static,
    {
        self.run(Query::with_params(sql, params), on_rows, on_error);
    }

    /// [`execute`](Self::execute) with a prebuilt [`Query`].
    pub fn run<R, E>(&self, query: Query, on_rows: R, on_error: E)
    where
        R: FnMut(Resultset, bool) + Send + 'static,
        E: FnOnce(Error) + Send + 'static,
    {
        let (sql, params) = match query.into_parts() {
            Ok(parts) => parts,
            Err(e) => {
                on_error(e);
                return;
            }
        };
        self.handle.send(Command::Execute {
            token: self.token,
            op: next_id(),
            sql,
            params,
            rows: Box::new(on_rows),
            done: Done::Callback(Box::new(move |result| {
                if let Err(e) = result {
                    on_error(e);
                }
            })),
        });
    }

    /// Run `sql` and stream its rows.
    pub fn stream<P: ToParams + ?Sized>(&self, sql: &str, params: &P) -> RowStream {
        self.fetch(Query::with_params(sql, params))
    }

    /// [`stream`](Self::stream) with a prebuilt [`Query`].
    pub fn fetch(&self, query: Query) -> RowStream {
        let (sql, params) = match query.into_parts() {
            Ok(parts) => parts,
            Err(e) => return RowStream::failed(e),
        };
        let (rows_tx, rows_rx) = mpsc::unbounded_channel();
        let (done_tx, done_rx) = oneshot::channel();
        let rows: RowSink = Box::new(move |result, complete| {
            let _ = rows_tx.send(Batch { result, complete });
        });
        self.handle.send(Command::Execute {
            token: self.token,
            op: next_id(),
            sql,
            params,
            rows,
            done: Done::Channel(done_tx),
        });
        RowStream {
            rows: Some(rows_rx),
            done: Some(done_rx),
            error: None,
        }
    }

    /// Run `sql` and collect the rows of its last statement.
    ///
    /// ```no_run
    /// # async fn demo(tx: &pg_async::Transaction) -> pg_async::Result<()> {
    /// let result = tx.query("SELECT id, name FROM users WHERE id = $1", &(7i32,)).await?;
    /// for (id, name) in result.decode::<(i32, String)>()? {
    ///     println!("{} {}", id, name);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub fn query<P: ToParams + ?Sized>(&self, sql: &str, params: &P) -> RowStream {
        self.stream(sql, params)
    }

    /// Commit. The command is sent immediately.
    pub fn commit(mut self) -> Completion {
        self.finish(true)
    }

    /// Roll back. The command is sent immediately.
    pub fn rollback(mut self) -> Completion {
        self.finish(false)
    }

    fn finish(&mut self, commit: bool) -> Completion {
        let (tx, rx) = oneshot::channel();
        let token = self.token;
        let op = next_id();
        let done = Done::Channel(tx);
        self.handle.send(if commit {
            Command::Commit { token, op, done }
        } else {
            Command::Rollback { token, op, done }
        });
        self.finished = true;
        Completion { rx }
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        let on_abandoned = if self.finished {
            None
        } else {
            self.on_abandoned.take()
        };
        self.handle.send(Command::Unlock {
            token: self.token,
            on_abandoned,
        });
    }
}

/// One batch of rows.
#[derive(Debug, Clone)]
pub struct Batch {
    /// The rows
    pub result: Resultset,
    /// True on the last batch of a statement
    pub complete: bool,
}

/// Rows of one submitted query, delivered in batches.
///
/// Awaiting the stream collects it like [`collect`](Self::collect).
#[derive(Debug)]
pub struct RowStream {
    rows: Option<mpsc::UnboundedReceiver<Batch>>,
    done: Option<oneshot::Receiver<Result<()>>>,
    error: Option<Error>,
}

impl RowStream {
    fn failed(error: Error) -> Self {
        Self {
            rows: None,
            done: None,
            error: Some(error),
        }
    }

    /// Next batch, or `None` once the query has completed.
    pub async fn next(&mut self) -> Result<Option<Batch>> {
        if let Some(error) = self.error.take() {
            return Err(error);
        }
        if let Some(rows) = &mut self.rows {
            if let Some(batch) = rows.recv().await {
                return Ok(Some(batch));
            }
            self.rows = None;
        }
        match self.done.take() {
            Some(done) => match done.await {
                Ok(result) => result.map(|()| None),
                Err(_) => Err(Error::ConnectionClosed),
            },
            None => Ok(None),
        }
    }

    /// Merge the batches of the last statement.
    ///
    /// Commands without rows yield an empty result carrying their tag.
    pub async fn collect(mut self) -> Result<Resultset> {
        let mut current: Option<Resultset> = None;
        let mut statement_done = false;
        while let Some(batch) = self.next().await? {
            if statement_done {
                current = None;
            }
            match &mut current {
                Some(result) => result.append(batch.result),
                None => current = Some(batch.result),
            }
            statement_done = batch.complete;
        }
        Ok(current.unwrap_or_default())
    }

    /// One merged result per statement.
    pub async fn collect_all(mut self) -> Result<Vec<Resultset>> {
        let mut results = Vec::new();
        let mut current: Option<Resultset> = None;
        while let Some(batch) = self.next().await? {
            match &mut current {
                Some(result) => result.append(batch.result),
                None => current = Some(batch.result),
            }
            if batch.complete {
                results.extend(current.take());
            }
        }
        results.extend(current);
        Ok(results)
    }
}

impl IntoFuture for RowStream {
    type Output = Result<Resultset>;
    type IntoFuture = Pin<Box<dyn Future<Output = Result<Resultset>> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.collect())
    }
}

/// Result of a commit or rollback.
#[derive(Debug)]
pub struct Completion {
    rx: oneshot::Receiver<Result<()>>,
}

impl Future for Completion {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<()>> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(Error::ConnectionClosed)))
    }
}
