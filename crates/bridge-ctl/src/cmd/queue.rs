//! Queue inspection.

use anyhow::{Context, Result};

use bridge_core::config::BridgeConfig;

use super::client::open_broker;

pub async fn pending(config: &BridgeConfig) -> Result<()> {
    let broker = open_broker(config)?;
    let queue = &config.broker.request_queue;
    let count = broker
        .pending(queue)
        .await
        .with_context(|| format!("failed to count messages on {queue}"))?;

    println!("  Queue store : {}", broker.path().display());
    println!("  Queue       : {queue}");
    println!("  Pending     : {count}");
    Ok(())
}
