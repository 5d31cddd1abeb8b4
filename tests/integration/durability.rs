use crate::*;

use bridge_core::request::{encode, Transport};
use bridge_core::Response;
use serde_json::json;

// ══════════════════════════════════════════════════════════════════════════════
//  SQLite-backed queues shared by separate broker handles
// ══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_signup_and_login_over_sqlite() -> Result<()> {
    let queues = TempQueueStore::new("roundtrip");
    let bridge = Bridge::start(
        Arc::new(queues.open()?),
        MemoryConnector::new(MemoryCredentialStore::new()),
        &["db"],
        1,
    )
    .await?;

    // The caller opens its own handle, as a separate process would.
    let gateway = Gateway::connect(Arc::new(queues.open()?), REQUEST_QUEUE, patient_policy()).await?;
    assert!(gateway.signup("Ann", "a@x.com", "secret123").await.is_success());
    let resp = gateway.login("a@x.com", "secret123").await;
    assert!(resp.is_success(), "{resp:?}");
    assert_eq!(resp.data.context("user data")?["email"], "a@x.com");

    gateway.close().await?;
    bridge.stop().await
}

#[tokio::test]
async fn test_queued_request_survives_broker_restart() -> Result<()> {
    let queues = TempQueueStore::new("restart");
    {
        let broker = queues.open()?;
        broker
            .declare_queue(REQUEST_QUEUE, Durability::Durable)
            .await?;
        broker
            .declare_queue("reply.restart", Durability::Transient)
            .await?;
        let body = encode(
            "signup",
            fields(json!({ "name": "Ann", "email": "a@x.com", "password": "secret123" })),
            &Transport::new("c-restart", "reply.restart"),
        );
        broker.publish(REQUEST_QUEUE, body).await?;
        assert_eq!(broker.pending(REQUEST_QUEUE).await?, 1);
    }

    let bridge = Bridge::start(
        Arc::new(queues.open()?),
        MemoryConnector::new(MemoryCredentialStore::new()),
        &["db"],
        1,
    )
    .await?;

    let reply = bridge
        .broker
        .consume("reply.restart", Duration::from_secs(15))
        .await?
        .context("reply after restart")?;
    let reply = Response::from_bytes(&reply)?;
    assert_eq!(reply.correlation_id, "c-restart");
    assert!(reply.is_success());
    assert_eq!(bridge.store().len(), 1);

    bridge.stop().await
}

#[tokio::test]
async fn test_competing_workers_process_each_request_once() -> Result<()> {
    let queues = TempQueueStore::new("compete");
    let store = MemoryCredentialStore::new();

    // Two workers, each with its own handle on the same file.
    let first = Bridge::start(
        Arc::new(queues.open()?),
        MemoryConnector::new(store.clone()),
        &["db"],
        1,
    )
    .await?;
    let second = Bridge::start(
        Arc::new(queues.open()?),
        MemoryConnector::new(store.clone()),
        &["db"],
        1,
    )
    .await?;

    let gateway = Arc::new(
        Gateway::connect(Arc::new(queues.open()?), REQUEST_QUEUE, patient_policy()).await?,
    );
    let mut tasks = Vec::new();
    for i in 0..8 {
        let gateway = gateway.clone();
        tasks.push(tokio::spawn(async move {
            gateway
                .signup(&format!("User {i}"), &format!("user{i}@x.com"), "pw")
                .await
        }));
    }
    for task in tasks {
        let resp = task.await?;
        assert!(resp.is_success(), "{resp:?}");
    }
    assert_eq!(store.len(), 8);

    // One store connection per request across both workers.
    let attempts = first.connector.attempts().len() + second.connector.attempts().len();
    assert_eq!(attempts, 8);
    assert_eq!(queues.open()?.pending(REQUEST_QUEUE).await?, 0);

    first.stop().await?;
    second.stop().await
}
