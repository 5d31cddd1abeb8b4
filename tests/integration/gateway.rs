use crate::*;

use bridge_core::request::Inbound;
use bridge_core::{ErrorCode, Response, Status};

// ══════════════════════════════════════════════════════════════════════════════
//  Gateway retries, correlation and reply routing
// ══════════════════════════════════════════════════════════════════════════════

/// Request queue exists but no worker consumes it.
async fn unattended() -> Result<(Arc<dyn Broker>, Gateway)> {
    let broker: Arc<dyn Broker> = Arc::new(MemoryBroker::new());
    broker
        .declare_queue(REQUEST_QUEUE, Durability::Durable)
        .await?;
    let gateway = Gateway::connect(broker.clone(), REQUEST_QUEUE, impatient_policy()).await?;
    Ok((broker, gateway))
}

async fn drain(broker: &Arc<dyn Broker>) -> Result<Vec<Inbound>> {
    let mut requests = Vec::new();
    while let Some(body) = broker.consume(REQUEST_QUEUE, Duration::ZERO).await? {
        requests.push(Inbound::parse(&body)?);
    }
    Ok(requests)
}

#[tokio::test]
async fn test_no_worker_exhausts_attempts_then_synthesizes_error() -> Result<()> {
    let (broker, gateway) = unattended().await?;

    let started = tokio::time::Instant::now();
    let resp = gateway.login("a@x.com", "secret123").await;
    let elapsed = started.elapsed();

    assert_eq!(resp.status, Status::Error);
    assert_eq!(resp.code, Some(ErrorCode::ServiceUnavailable));
    assert!(resp.message.starts_with("Service unavailable: "), "{}", resp.message);
    // 100 + 20 + 150 + 40 + 200 ms
    assert!(elapsed >= Duration::from_millis(510), "{elapsed:?}");

    let requests = drain(&broker).await?;
    assert_eq!(requests.len(), 3);
    for request in &requests {
        assert_eq!(request.request.action(), "login");
        assert_eq!(
            request.transport.correlation_id.as_deref(),
            Some(resp.correlation_id.as_str())
        );
        assert_eq!(request.transport.reply_to.as_deref(), Some(gateway.reply_queue()));
    }
    assert_eq!(gateway.in_flight(), 0);

    gateway.close().await?;
    Ok(())
}

#[tokio::test]
async fn test_each_invocation_uses_a_fresh_correlation_id() -> Result<()> {
    let (broker, gateway) = unattended().await?;

    let a = gateway.invoke("ping", Map::new()).await;
    let b = gateway.invoke("ping", Map::new()).await;
    assert_ne!(a.correlation_id, b.correlation_id);

    let requests = drain(&broker).await?;
    assert_eq!(requests.len(), 6);
    let for_a = requests
        .iter()
        .filter(|r| r.transport.correlation_id.as_deref() == Some(a.correlation_id.as_str()))
        .count();
    assert_eq!(for_a, 3);

    gateway.close().await?;
    Ok(())
}

#[tokio::test]
async fn test_stray_reply_does_not_disturb_in_flight_invocation() -> Result<()> {
    let broker: Arc<dyn Broker> = Arc::new(MemoryBroker::new());
    broker
        .declare_queue(REQUEST_QUEUE, Durability::Durable)
        .await?;
    let single_patient_attempt = RetryPolicy {
        max_attempts: 1,
        base_timeout: Duration::from_secs(5),
        ..impatient_policy()
    };
    let gateway = Gateway::connect(broker.clone(), REQUEST_QUEUE, single_patient_attempt).await?;
    let reply_queue = gateway.reply_queue().to_string();

    // Hand-rolled worker: inject noise, then answer the real request.
    let responder = {
        let broker = broker.clone();
        tokio::spawn(async move {
            let body = broker
                .consume(REQUEST_QUEUE, Duration::from_secs(5))
                .await?
                .context("request arrived")?;
            let inbound = Inbound::parse(&body)?;
            let correlation_id = inbound
                .transport
                .correlation_id
                .context("correlation id present")?;

            let stray = Response::success("Login successful").with_correlation_id("someone-else");
            broker.publish(&reply_queue, stray.to_bytes()?).await?;
            broker.publish(&reply_queue, b"\x00\x01".to_vec()).await?;
            let real = Response::error(ErrorCode::InvalidCredentials, "Invalid credentials")
                .with_correlation_id(correlation_id);
            broker.publish(&reply_queue, real.to_bytes()?).await?;
            anyhow::Ok(())
        })
    };

    let resp = gateway.login("a@x.com", "wrong").await;
    responder.await??;

    assert_eq!(resp.code, Some(ErrorCode::InvalidCredentials));
    assert_eq!(resp.message, "Invalid credentials");
    assert_eq!(gateway.in_flight(), 0);

    gateway.close().await?;
    Ok(())
}

#[tokio::test]
async fn test_late_reply_after_exhaustion_is_discarded() -> Result<()> {
    let (broker, gateway) = unattended().await?;

    let resp = gateway.invoke("login", Map::new()).await;
    assert_eq!(resp.code, Some(ErrorCode::ServiceUnavailable));

    let late = Response::success("Login successful").with_correlation_id(resp.correlation_id);
    broker.publish(gateway.reply_queue(), late.to_bytes()?).await?;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(gateway.in_flight(), 0);

    gateway.close().await?;
    Ok(())
}

#[tokio::test]
async fn test_worker_started_late_still_answers() -> Result<()> {
    let broker: Arc<dyn Broker> = Arc::new(MemoryBroker::new());
    broker
        .declare_queue(REQUEST_QUEUE, Durability::Durable)
        .await?;
    let gateway = Gateway::connect(broker.clone(), REQUEST_QUEUE, patient_policy()).await?;

    let invocation = tokio::spawn(async move {
        let resp = gateway.signup("Ann", "a@x.com", "secret123").await;
        gateway.close().await?;
        anyhow::Ok(resp)
    });
    tokio::time::sleep(Duration::from_millis(200)).await;

    let bridge = Bridge::start(
        broker,
        MemoryConnector::new(MemoryCredentialStore::new()),
        &["db"],
        1,
    )
    .await?;
    let resp = invocation.await??;
    assert!(resp.is_success(), "{resp:?}");
    assert_eq!(bridge.store().len(), 1);

    bridge.stop().await
}
