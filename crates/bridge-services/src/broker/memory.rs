//! In-process broker. Queues live as long as the broker value, except
//! transient ones left unconsumed past the TTL.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;

use super::{Broker, BrokerError, Durability, DEFAULT_TRANSIENT_TTL};

struct Queue {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    // One consumer at a time holds the receiver, so each message has
    // exactly one taker.
    rx: Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    durability: Durability,
    last_seen: std::sync::Mutex<Instant>,
}

impl Queue {
    fn touch(&self) {
        if let Ok(mut seen) = self.last_seen.lock() {
            *seen = Instant::now();
        }
    }

    fn idle_for(&self, now: Instant) -> Duration {
        self.last_seen
            .lock()
            .map(|seen| now.saturating_duration_since(*seen))
            .unwrap_or_default()
    }
}

#[derive(Clone)]
pub struct MemoryBroker {
    queues: Arc<DashMap<String, Arc<Queue>>>,
    transient_ttl: Duration,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self {
            queues: Arc::new(DashMap::new()),
            transient_ttl: DEFAULT_TRANSIENT_TTL,
        }
    }
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_transient_ttl(mut self, ttl: Duration) -> Self {
        self.transient_ttl = ttl;
        self
    }

    fn queue(&self, name: &str) -> Option<Arc<Queue>> {
        self.queues.get(name).map(|q| q.value().clone())
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn declare_queue(&self, queue: &str, durability: Durability) -> Result<(), BrokerError> {
        let now = Instant::now();
        let before = self.queues.len();
        self.queues.retain(|_, q| {
            q.durability == Durability::Durable || q.idle_for(now) <= self.transient_ttl
        });
        let purged = before.saturating_sub(self.queues.len());
        if purged > 0 {
            tracing::info!(purged, "abandoned transient queues purged");
        }

        self.queues
            .entry(queue.to_string())
            .or_insert_with(|| {
                let (tx, rx) = mpsc::unbounded_channel();
                Arc::new(Queue {
                    tx,
                    rx: Mutex::new(rx),
                    durability,
                    last_seen: std::sync::Mutex::new(now),
                })
            })
            .touch();
        Ok(())
    }

    async fn delete_queue(&self, queue: &str) -> Result<(), BrokerError> {
        self.queues.remove(queue);
        Ok(())
    }

    async fn publish(&self, queue: &str, body: Vec<u8>) -> Result<(), BrokerError> {
        match self.queue(queue) {
            Some(q) => {
                // The receiver lives inside the same `Queue`, so send cannot fail.
                let _ = q.tx.send(body);
            }
            None => tracing::debug!(queue, "publish to undeclared queue dropped"),
        }
        Ok(())
    }

    async fn consume(&self, queue: &str, wait: Duration) -> Result<Option<Vec<u8>>, BrokerError> {
        let Some(q) = self.queue(queue) else {
            tokio::time::sleep(wait).await;
            return Ok(None);
        };
        q.touch();
        let next = tokio::time::timeout(wait, async {
            let mut rx = q.rx.lock().await;
            rx.recv().await
        })
        .await;
        Ok(next.ok().flatten())
    }
}
