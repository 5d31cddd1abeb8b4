use crate::*;

use bridge_core::request::{encode, Transport};
use bridge_core::{ErrorCode, Response};
use serde_json::json;

// ══════════════════════════════════════════════════════════════════════════════
//  Raw envelopes published straight onto the request queue
// ══════════════════════════════════════════════════════════════════════════════

const REPLY_QUEUE: &str = "reply.raw";

async fn raw_bridge() -> Result<Bridge> {
    let bridge = Bridge::memory().await?;
    bridge
        .broker
        .declare_queue(REPLY_QUEUE, Durability::Transient)
        .await?;
    Ok(bridge)
}

async fn next_reply(bridge: &Bridge, wait: Duration) -> Result<Option<Response>> {
    match bridge.broker.consume(REPLY_QUEUE, wait).await? {
        Some(body) => Ok(Some(Response::from_bytes(&body)?)),
        None => Ok(None),
    }
}

#[tokio::test]
async fn test_missing_action_gets_no_reply() -> Result<()> {
    let bridge = raw_bridge().await?;

    let body = json!({
        "email": "a@x.com",
        "password": "secret123",
        "_transport": { "correlation_id": "c-drop", "reply_to": REPLY_QUEUE },
    });
    bridge
        .broker
        .publish(REQUEST_QUEUE, body.to_string().into_bytes())
        .await?;
    bridge
        .broker
        .publish(REQUEST_QUEUE, b"{ not json".to_vec())
        .await?;

    // A well-formed request behind the dropped ones proves the worker moved on.
    let probe = encode(
        "nope",
        Map::new(),
        &Transport::new("c-probe", REPLY_QUEUE),
    );
    bridge.broker.publish(REQUEST_QUEUE, probe).await?;

    let reply = next_reply(&bridge, Duration::from_secs(10))
        .await?
        .context("probe reply")?;
    assert_eq!(reply.correlation_id, "c-probe");
    assert_eq!(next_reply(&bridge, Duration::from_millis(200)).await?, None);
    assert!(bridge.store().is_empty());
    assert!(bridge.connector.attempts().is_empty());

    bridge.stop().await
}

#[tokio::test]
async fn test_unknown_action_is_answered_by_name() -> Result<()> {
    let bridge = raw_bridge().await?;

    let body = encode(
        "searchProperties",
        fields(json!({ "city": "Newark" })),
        &Transport::new("c-unknown", REPLY_QUEUE),
    );
    bridge.broker.publish(REQUEST_QUEUE, body).await?;

    let reply = next_reply(&bridge, Duration::from_secs(10))
        .await?
        .context("reply to unknown action")?;
    assert_eq!(reply.correlation_id, "c-unknown");
    assert_eq!(reply.code, Some(ErrorCode::UnknownAction));
    assert_eq!(reply.message, "Unknown action: searchProperties");
    assert!(bridge.connector.attempts().is_empty());

    bridge.stop().await
}

#[tokio::test]
async fn test_request_without_reply_address_is_still_processed() -> Result<()> {
    let bridge = raw_bridge().await?;

    let body = json!({
        "action": "signup",
        "name": "Ann",
        "email": "a@x.com",
        "password": "secret123",
        "_transport": { "correlation_id": "c-silent" },
    });
    bridge
        .broker
        .publish(REQUEST_QUEUE, body.to_string().into_bytes())
        .await?;

    let store = bridge.store().clone();
    wait_for(Duration::from_secs(10), || store.len() == 1).await?;
    assert_eq!(next_reply(&bridge, Duration::from_millis(200)).await?, None);

    bridge.stop().await
}

#[tokio::test]
async fn test_missing_fields_are_answered_without_writing_the_store() -> Result<()> {
    let bridge = raw_bridge().await?;

    let body = encode(
        "signup",
        fields(json!({ "name": "Ann", "email": "", "password": "secret123" })),
        &Transport::new("c-fields", REPLY_QUEUE),
    );
    bridge.broker.publish(REQUEST_QUEUE, body).await?;

    let reply = next_reply(&bridge, Duration::from_secs(10))
        .await?
        .context("reply to incomplete signup")?;
    assert_eq!(reply.correlation_id, "c-fields");
    assert_eq!(reply.code, Some(ErrorCode::MissingFields));
    assert_eq!(reply.message, "Missing signup fields");
    assert!(bridge.store().is_empty());

    bridge.stop().await
}
