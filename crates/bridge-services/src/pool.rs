//! Host failover: ordered connection attempts across candidate store hosts.
//!
//! Every acquisition starts at the front of the list so the canonical
//! primary is always preferred. The first host that answers within the
//! per-host timeout wins; later hosts are not tried. Nothing is cached
//! between acquisitions.

use std::sync::Arc;

use bridge_core::config::StoreConfig;

use crate::store::{StoreConnection, StoreConnector};

/// Why one host was skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostFailure {
    pub host: String,
    pub reason: String,
}

#[derive(Debug, thiserror::Error)]
pub enum AcquireError {
    #[error("all {} store hosts unreachable", .0.len())]
    AllHostsUnreachable(Vec<HostFailure>),
}

pub struct HostFailoverPool {
    config: StoreConfig,
    connector: Arc<dyn StoreConnector>,
}

impl HostFailoverPool {
    pub fn new(config: StoreConfig, connector: Arc<dyn StoreConnector>) -> Self {
        Self { config, connector }
    }

    pub fn hosts(&self) -> &[String] {
        &self.config.hosts
    }

    /// Connect to the first reachable host in list order.
    pub async fn acquire(&self) -> Result<Box<dyn StoreConnection>, AcquireError> {
        let timeout = self.config.connect_timeout();
        let mut failures = Vec::with_capacity(self.config.hosts.len());

        for host in &self.config.hosts {
            tracing::debug!(host = %host, port = self.config.port, "connecting to store");
            let attempt =
                tokio::time::timeout(timeout, self.connector.connect(host, &self.config)).await;
            let reason = match attempt {
                Ok(Ok(conn)) => {
                    tracing::info!(host = %host, "store connection established");
                    return Ok(conn);
                }
                Ok(Err(e)) => e.to_string(),
                Err(_) => format!("timed out after {}s", timeout.as_secs_f32()),
            };
            tracing::warn!(host = %host, reason = %reason, "store host unreachable");
            failures.push(HostFailure {
                host: host.clone(),
                reason,
            });
        }

        Err(AcquireError::AllHostsUnreachable(failures))
    }
}
