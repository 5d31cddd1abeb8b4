//! Shared broker and gateway setup for CLI commands.

use std::sync::Arc;

use anyhow::{Context, Result};

use bridge_core::config::BridgeConfig;
use bridge_core::Response;
use bridge_services::{Gateway, RetryPolicy, SqliteBroker};

pub fn open_broker(config: &BridgeConfig) -> Result<SqliteBroker> {
    let broker = SqliteBroker::open(&config.broker.path, config.broker.poll_interval())
        .with_context(|| {
            format!(
                "failed to open queue store {}, has bridged been started?",
                config.broker.path.display()
            )
        })?;
    Ok(broker.with_transient_ttl(config.broker.transient_ttl()))
}

pub async fn connect(config: &BridgeConfig) -> Result<Gateway> {
    let broker = open_broker(config)?;
    Gateway::connect(
        Arc::new(broker),
        config.broker.request_queue.clone(),
        RetryPolicy::from(&config.gateway),
    )
    .await
    .context("failed to declare reply queue")
}

/// Print the response and close the gateway. A failed request is still a
/// successful command; the exit code follows the response status.
pub async fn finish(gateway: Gateway, response: Response) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(&response).context("failed to render response")?
    );
    gateway.close().await.context("failed to delete reply queue")?;
    if !response.is_success() {
        std::process::exit(2);
    }
    Ok(())
}
