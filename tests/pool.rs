//! Pool admission, failure and shutdown.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{MockConfig, MockServer, unused_port, within};
use pg_async::{DatabaseService, Error, ServiceConfig};
use tokio::sync::mpsc;

async fn wait_for_waiters(service: &DatabaseService, alias: &str, waiters: usize) {
    within(async {
        while service.pool_status(alias).unwrap().waiters != waiters {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
}

#[tokio::test]
async fn test_fifo_admission() {
    let server = MockServer::start(MockConfig::default()).await;
    let service = DatabaseService::new(ServiceConfig {
        pool_size: 2,
        ..Default::default()
    })
    .unwrap();
    service.add_connection(&server.url("db")).unwrap();

    let first = within(service.begin_async("db")).await.unwrap();
    let second = within(service.begin_async("db")).await.unwrap();
    assert_ne!(first.connection_id(), second.connection_id());

    let (sender, mut receiver) = mpsc::unbounded_channel();
    for caller in 0..2 {
        let sender = sender.clone();
        service.begin(
            "db",
            move |tx| {
                let _ = sender.send((caller, tx));
            },
            |_| {},
        );
    }
    wait_for_waiters(&service, "db", 2).await;
    assert_eq!(service.pool_status("db").unwrap().connections, 2);

    let first_id = first.connection_id();
    within(first.commit()).await.unwrap();
    let (caller, third) = within(receiver.recv()).await.unwrap();
    assert_eq!(caller, 0);
    assert_eq!(third.connection_id(), first_id);

    within(second.rollback()).await.unwrap();
    let (caller, fourth) = within(receiver.recv()).await.unwrap();
    assert_eq!(caller, 1);

    within(third.commit()).await.unwrap();
    within(fourth.commit()).await.unwrap();
    assert_eq!(server.journal().connections, 2);
    within(service.shutdown()).await;
}

#[tokio::test]
async fn test_caller_waits_for_connecting_connection() {
    let server = MockServer::start(MockConfig::default()).await;
    let service = DatabaseService::new(ServiceConfig {
        pool_size: 4,
        ..Default::default()
    })
    .unwrap();
    service.add_connection(&server.url("db")).unwrap();

    let tx = within(service.begin_async("db")).await.unwrap();
    assert_eq!(service.pool_status("db").unwrap().connections, 1);
    within(tx.commit()).await.unwrap();
    assert_eq!(server.journal().connections, 1);
    within(service.shutdown()).await;
}

#[tokio::test]
async fn test_lost_connection_fails_waiters() {
    let server = MockServer::start(MockConfig::default()).await;
    let service = Arc::new(
        DatabaseService::new(ServiceConfig {
            pool_size: 2,
            ..Default::default()
        })
        .unwrap(),
    );
    service.add_connection(&server.url("db")).unwrap();

    let kept = within(service.begin_async("db")).await.unwrap();
    let lost = within(service.begin_async("db")).await.unwrap();
    let waiting = {
        let service = Arc::clone(&service);
        tokio::spawn(async move { service.begin_async("db").await })
    };
    wait_for_waiters(&service, "db", 1).await;

    // In flight and queued behind it on the same connection
    let pending = lost.query("DISCONNECT", &());
    let queued = lost.query("SELECT 1", &());
    let error = within(pending).await.unwrap_err();
    assert!(matches!(error, Error::Connection(_)), "unexpected error {}", error);
    let error = within(queued).await.unwrap_err();
    assert!(matches!(error, Error::Connection(_)), "unexpected error {}", error);

    let error = within(waiting).await.unwrap().unwrap_err();
    assert!(error.is_connection_broken(), "unexpected error {}", error);
    let status = service.pool_status("db").unwrap();
    assert_eq!((status.connections, status.waiters), (1, 0));
    assert_eq!(server.journal().connections, 2);

    drop(lost);
    within(kept.commit()).await.unwrap();
    within(service.shutdown()).await;
}

#[tokio::test]
async fn test_connect_failure_drains_waiters() {
    let port = unused_port().await;
    let service = DatabaseService::new(ServiceConfig::default()).unwrap();
    service
        .add_connection(&format!("down=tcp://alice@127.0.0.1:{}/app", port))
        .unwrap();

    let (a, b, c) = within(async {
        tokio::join!(
            service.begin_async("down"),
            service.begin_async("down"),
            service.begin_async("down"),
        )
    })
    .await;
    for result in [a, b, c] {
        let error = result.unwrap_err();
        assert!(error.is_connection_broken(), "unexpected error {}", error);
    }

    within(async {
        while service.pool_status("down").unwrap().connections > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert_eq!(service.pool_status("down").unwrap().waiters, 0);
}

#[tokio::test]
async fn test_stop_and_run() {
    let server = MockServer::start(MockConfig::default()).await;
    let service = Arc::new(
        DatabaseService::new(ServiceConfig {
            pool_size: 1,
            ..Default::default()
        })
        .unwrap(),
    );
    service.add_connection(&server.url("db")).unwrap();

    let held = within(service.begin_async("db")).await.unwrap();
    let waiting = {
        let service = Arc::clone(&service);
        tokio::spawn(async move { service.begin_async("db").await })
    };
    wait_for_waiters(&service, "db", 1).await;

    let runner = {
        let service = Arc::clone(&service);
        tokio::spawn(async move { service.run().await })
    };
    tokio::task::yield_now().await;
    assert!(!runner.is_finished());

    service.stop();
    assert!(matches!(
        within(waiting).await.unwrap(),
        Err(Error::PoolClosed)
    ));
    within(runner).await.unwrap();
    assert!(service.pool_status("db").unwrap().closed);

    assert!(within(held.query("SELECT 1", &())).await.is_err());
    server.wait_for(|journal| journal.terminated == 1).await;
    assert!(matches!(
        within(service.begin_async("db")).await,
        Err(Error::PoolClosed)
    ));
}
