//! Transactions, queries and dirty exits over the wire.

mod common;

use common::{MockConfig, MockServer, within};
use pg_async::{DatabaseService, Error, Query, ServiceConfig, TransactionOptions};
use tokio::sync::oneshot;

async fn service(server: &MockServer, config: ServiceConfig) -> DatabaseService {
    let service = DatabaseService::new(config).unwrap();
    service.add_connection(&server.url("db")).unwrap();
    service
}

#[tokio::test]
async fn test_abandoned_transaction_rolls_back() {
    let server = MockServer::start(MockConfig::default()).await;
    let service = service(
        &server,
        ServiceConfig {
            pool_size: 1,
            ..Default::default()
        },
    )
    .await;

    let (ready_tx, ready_rx) = oneshot::channel();
    let (error_tx, error_rx) = oneshot::channel();
    service.begin(
        "db",
        move |tx| {
            let _ = ready_tx.send(tx);
        },
        move |error| {
            let _ = error_tx.send(error);
        },
    );
    let tx = within(ready_rx).await.unwrap();
    let result = within(tx.query("SELECT 2", &())).await.unwrap();
    assert_eq!(result.len(), 2);
    drop(tx);

    let error = within(error_rx).await.unwrap();
    assert!(matches!(error, Error::TransactionRolledBack));
    assert_eq!(
        server.journal().statements,
        vec!["BEGIN", "SELECT 2", "ROLLBACK"]
    );

    // The connection is back in the pool
    let tx = within(service.begin_async("db")).await.unwrap();
    within(tx.commit()).await.unwrap();
    assert_eq!(server.journal().connections, 1);
}

#[tokio::test]
async fn test_autocommit_abandon_commits() {
    let server = MockServer::start(MockConfig::default()).await;
    let service = service(&server, ServiceConfig::default()).await;

    let (error_tx, error_rx) = oneshot::channel::<Error>();
    service.begin_with(
        "db",
        TransactionOptions::autocommit(),
        |tx| {
            tx.execute("INSERT INTO t VALUES (1)", &(), |_, _| {}, |_| {});
        },
        move |error| {
            let _ = error_tx.send(error);
        },
    );

    // A clean commit drops the error callback without calling it
    assert!(within(error_rx).await.is_err());
    assert_eq!(
        server.journal().statements,
        vec!["BEGIN", "INSERT INTO t VALUES (1)", "COMMIT"]
    );
}

#[tokio::test]
async fn test_prepared_statement_cache() {
    let server = MockServer::start(MockConfig::default()).await;
    let service = service(&server, ServiceConfig::default()).await;

    let tx = within(service.begin_async("db")).await.unwrap();
    for _ in 0..2 {
        let result = within(tx.query("SELECT $1", &(3i32,))).await.unwrap();
        let rows: Vec<(i32,)> = result.decode().unwrap();
        assert_eq!(rows, vec![(1,), (2,), (3,)]);
    }
    // Different parameter types need their own statement
    let result = within(tx.fetch(Query::new("SELECT $1").bind(2i64)))
        .await
        .unwrap();
    assert_eq!(result.len(), 2);
    within(tx.commit()).await.unwrap();

    assert_eq!(server.journal().parses, vec!["SELECT $1", "SELECT $1"]);
}

#[tokio::test]
async fn test_streaming_batches() {
    let server = MockServer::start(MockConfig::default()).await;
    let service = service(
        &server,
        ServiceConfig {
            batch_rows: 2,
            ..Default::default()
        },
    )
    .await;

    let tx = within(service.begin_async("db")).await.unwrap();
    let mut stream = tx.stream("SELECT 5", &());
    let mut batches = Vec::new();
    while let Some(batch) = within(stream.next()).await.unwrap() {
        batches.push((batch.result.len(), batch.complete));
    }
    assert_eq!(batches, vec![(2, false), (2, false), (1, true)]);

    let merged = within(tx.query("SELECT 5", &())).await.unwrap();
    assert_eq!(merged.len(), 5);
    assert_eq!(merged.tag(), Some("SELECT 5"));
    let values: Vec<i32> = merged.iter().map(|row| row.get(0).unwrap()).collect();
    assert_eq!(values, vec![1, 2, 3, 4, 5]);

    let all = within(tx.stream("SELECT 3; SELECT 1", &()).collect_all())
        .await
        .unwrap();
    assert_eq!(all.iter().map(|r| r.len()).collect::<Vec<_>>(), vec![3, 1]);
    let last = within(tx.query("SELECT 3; SELECT 1", &())).await.unwrap();
    assert_eq!(last.len(), 1);

    within(tx.commit()).await.unwrap();
}

#[tokio::test]
async fn test_query_error_keeps_connection_usable() {
    let server = MockServer::start(MockConfig::default()).await;
    let service = service(
        &server,
        ServiceConfig {
            pool_size: 1,
            ..Default::default()
        },
    )
    .await;

    let error = within(service.query("db", "ERROR boom")).await.unwrap_err();
    assert_eq!(error.sqlstate(), Some("42601"));
    assert!(!error.is_connection_broken());

    let result = within(service.query("db", "SELECT 2")).await.unwrap();
    assert_eq!(result.len(), 2);
    assert_eq!(server.journal().connections, 1);
}

#[tokio::test]
async fn test_commit_after_error_reports_rollback() {
    let server = MockServer::start(MockConfig::default()).await;
    let service = service(&server, ServiceConfig::default()).await;

    let tx = within(service.begin_async("db")).await.unwrap();
    let result = within(tx.query("SELECT $1", &(Some(1i32),))).await.unwrap();
    assert_eq!(result.len(), 1);

    let error = within(tx.query("ERROR here", &(1i32,))).await.unwrap_err();
    assert_eq!(error.sqlstate(), Some("42601"));
    let error = within(tx.query("SELECT 1", &())).await.unwrap_err();
    assert_eq!(error.sqlstate(), Some("25P02"));

    assert!(matches!(
        within(tx.commit()).await,
        Err(Error::TransactionRolledBack)
    ));
}
