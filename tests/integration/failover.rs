use crate::*;

use bridge_core::{ErrorCode, Status};

// ══════════════════════════════════════════════════════════════════════════════
//  Store host failover seen from the caller
// ══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_second_host_serves_when_primary_is_down() -> Result<()> {
    let connector =
        MemoryConnector::new(MemoryCredentialStore::new()).with_reachable(["db-b", "db-c"]);
    let bridge = Bridge::start(
        Arc::new(MemoryBroker::new()),
        connector,
        &["db-a", "db-b", "db-c"],
        1,
    )
    .await?;
    let gateway = bridge.gateway(patient_policy()).await?;

    let resp = gateway.signup("Ann", "a@x.com", "secret123").await;
    assert!(resp.is_success(), "{resp:?}");
    assert_eq!(bridge.connector.attempts(), vec!["db-a", "db-b"]);

    gateway.close().await?;
    bridge.stop().await
}

#[tokio::test]
async fn test_all_hosts_down_is_reported_not_retried() -> Result<()> {
    let connector =
        MemoryConnector::new(MemoryCredentialStore::new()).with_reachable(Vec::<String>::new());
    let bridge = Bridge::start(
        Arc::new(MemoryBroker::new()),
        connector,
        &["db-a", "db-b"],
        1,
    )
    .await?;
    let gateway = bridge.gateway(patient_policy()).await?;

    let resp = gateway.signup("Ann", "a@x.com", "secret123").await;
    assert_eq!(resp.status, Status::Error);
    assert_eq!(resp.code, Some(ErrorCode::AllNodesFailed));
    assert_eq!(resp.message, "All DB nodes failed. Cannot process request.");
    assert!(bridge.store().is_empty());
    // A delivered error reply ends the invocation: one request, one pass
    // over the host list.
    assert_eq!(bridge.connector.attempts(), vec!["db-a", "db-b"]);

    gateway.close().await?;
    bridge.stop().await
}

#[tokio::test]
async fn test_stalled_primary_costs_one_connect_timeout() -> Result<()> {
    let connector = MemoryConnector::new(MemoryCredentialStore::new()).with_stalled(["db-a"]);
    let bridge = Bridge::start(
        Arc::new(MemoryBroker::new()),
        connector,
        &["db-a", "db-b"],
        1,
    )
    .await?;
    let gateway = bridge.gateway(patient_policy()).await?;

    let started = tokio::time::Instant::now();
    let resp = gateway.login("a@x.com", "secret123").await;
    assert_eq!(resp.code, Some(ErrorCode::InvalidCredentials));
    // connect_timeout_secs = 1 in the harness
    assert!(started.elapsed() >= Duration::from_secs(1));
    assert_eq!(bridge.connector.attempts(), vec!["db-a", "db-b"]);

    gateway.close().await?;
    bridge.stop().await
}

#[tokio::test]
async fn test_dead_store_outranks_incomplete_signup() -> Result<()> {
    let connector =
        MemoryConnector::new(MemoryCredentialStore::new()).with_reachable(Vec::<String>::new());
    let bridge = Bridge::start(
        Arc::new(MemoryBroker::new()),
        connector,
        &["db-a", "db-b"],
        1,
    )
    .await?;
    let gateway = bridge.gateway(patient_policy()).await?;

    let resp = gateway
        .invoke(
            "signup",
            fields(serde_json::json!({ "email": "a@x.com", "password": "secret123" })),
        )
        .await;
    assert_eq!(resp.code, Some(ErrorCode::AllNodesFailed));
    assert_eq!(bridge.connector.attempts(), vec!["db-a", "db-b"]);

    gateway.close().await?;
    bridge.stop().await
}
