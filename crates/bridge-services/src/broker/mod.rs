//! Message broker abstraction: named FIFO queues of opaque bodies.
//!
//! Every message is handed to exactly one consumer, so any number of
//! workers can compete on one queue. Consumption acknowledges the message.
//! Publishing to a queue nobody declared drops the message, the way the
//! default exchange of an AMQP broker does.

mod memory;
mod sqlite;

pub use memory::MemoryBroker;
pub use sqlite::SqliteBroker;

use std::time::Duration;

use async_trait::async_trait;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Durability {
    /// Messages survive a restart of every consumer.
    Durable,
    /// Caller-scoped queue, deleted by its owner when it goes away. If the
    /// owner vanishes without deleting it, the queue is purged once nobody
    /// has consumed from it for the broker's transient TTL.
    Transient,
}

/// Idle time after which an abandoned transient queue is purged.
pub const DEFAULT_TRANSIENT_TTL: Duration = Duration::from_secs(600);

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("queue storage error: {0}")]
    Storage(#[from] rusqlite::Error),
    #[error("broker task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("broker unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait Broker: Send + Sync {
    /// Create `queue` if it does not exist. Idempotent. Also purges
    /// transient queues that have outlived the TTL.
    async fn declare_queue(&self, queue: &str, durability: Durability) -> Result<(), BrokerError>;

    /// Remove `queue` and any messages still in it.
    async fn delete_queue(&self, queue: &str) -> Result<(), BrokerError>;

    /// Append `body` to `queue`. Returns once the broker holds the message;
    /// there is no delivery acknowledgment.
    async fn publish(&self, queue: &str, body: Vec<u8>) -> Result<(), BrokerError>;

    /// Take the oldest message from `queue`, waiting up to `wait` for one
    /// to arrive. `Ok(None)` means the wait elapsed.
    async fn consume(&self, queue: &str, wait: Duration) -> Result<Option<Vec<u8>>, BrokerError>;
}
