//! Request gateway: the caller side of the bridge.
//!
//! A `Gateway` owns one transient reply queue. Every `invoke` publishes to
//! the request queue with a fresh correlation id and parks a oneshot sender
//! in `pending` until it returns; a single reader task drains the reply
//! queue and completes whichever waiter the reply's correlation id names. Attempts that time
//! out are retried with linear backoff and a growing per-attempt timeout.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde_json::{Map, Value};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;

use bridge_core::config::GatewayConfig;
use bridge_core::request::{self, actions, new_correlation_id};
use bridge_core::{ErrorCode, Response, Transport};

use crate::broker::{Broker, BrokerError, Durability};

/// How long the reader blocks on one consume before rechecking shutdown.
const REPLY_WAIT: Duration = Duration::from_millis(500);

type Pending = Arc<DashMap<String, oneshot::Sender<Response>>>;

enum Attempt {
    Replied(Response),
    Failed(String),
    /// The waiter was dropped by `close`.
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub base_timeout: Duration,
    pub timeout_increment: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&GatewayConfig::default())
    }
}

impl From<&GatewayConfig> for RetryPolicy {
    fn from(config: &GatewayConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_millis(config.base_delay_ms),
            base_timeout: Duration::from_millis(config.base_timeout_ms),
            timeout_increment: Duration::from_millis(config.timeout_increment_ms),
        }
    }
}

impl RetryPolicy {
    /// Reply deadline for 0-based `attempt`.
    pub fn attempt_timeout(&self, attempt: u32) -> Duration {
        self.base_timeout + self.timeout_increment * attempt
    }

    /// Pause after 0-based `attempt` failed.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay * (attempt + 1)
    }
}

pub struct Gateway {
    broker: Arc<dyn Broker>,
    request_queue: String,
    reply_queue: String,
    policy: RetryPolicy,
    pending: Pending,
    shutdown_tx: broadcast::Sender<()>,
    reader: JoinHandle<()>,
}

impl Gateway {
    /// Declare a private reply queue and start the reply reader.
    pub async fn connect(
        broker: Arc<dyn Broker>,
        request_queue: impl Into<String>,
        policy: RetryPolicy,
    ) -> Result<Self, BrokerError> {
        let reply_queue = format!("reply.{}", uuid::Uuid::new_v4());
        broker
            .declare_queue(&reply_queue, Durability::Transient)
            .await?;

        let pending: Pending = Arc::new(DashMap::new());
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let reader = tokio::spawn(read_replies(
            broker.clone(),
            reply_queue.clone(),
            pending.clone(),
            shutdown_rx,
        ));

        tracing::debug!(reply_queue = %reply_queue, "gateway connected");
        Ok(Self {
            broker,
            request_queue: request_queue.into(),
            reply_queue,
            policy,
            pending,
            shutdown_tx,
            reader,
        })
    }

    pub fn reply_queue(&self) -> &str {
        &self.reply_queue
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Number of invocations currently waiting for a reply.
    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }

    /// Send `action` with `fields` and wait for the reply, retrying per the
    /// policy. Always yields a `Response`; when every attempt fails it is a
    /// local `service_unavailable` error.
    ///
    /// One waiter is registered for the whole call, so a reply to an earlier
    /// attempt that lands during a later attempt or a backoff still counts.
    pub async fn invoke(&self, action: &str, fields: Map<String, Value>) -> Response {
        let correlation_id = new_correlation_id();
        let transport = Transport::new(correlation_id.clone(), self.reply_queue.clone());
        let body = request::encode(action, fields, &transport);

        let (tx, mut rx) = oneshot::channel();
        self.pending.insert(correlation_id.clone(), tx);
        let mut last_failure = String::from("no attempts configured");

        for attempt in 0..self.policy.max_attempts {
            match self.attempt(&body, &mut rx, attempt).await {
                Attempt::Replied(response) => return response,
                Attempt::Closed => {
                    last_failure = "gateway closed".to_string();
                    break;
                }
                Attempt::Failed(reason) => {
                    tracing::warn!(
                        action,
                        correlation_id = %correlation_id,
                        attempt = attempt + 1,
                        max_attempts = self.policy.max_attempts,
                        reason = %reason,
                        "request attempt failed"
                    );
                    last_failure = reason;
                }
            }
            if attempt + 1 < self.policy.max_attempts {
                tokio::select! {
                    _ = tokio::time::sleep(self.policy.backoff(attempt)) => {}
                    reply = &mut rx => match reply {
                        Ok(response) => return response,
                        Err(_) => {
                            last_failure = "gateway closed".to_string();
                            break;
                        }
                    },
                }
            }
        }

        self.pending.remove(&correlation_id);
        Response::error(
            ErrorCode::ServiceUnavailable,
            format!("Service unavailable: {last_failure}"),
        )
        .with_correlation_id(correlation_id)
    }

    async fn attempt(
        &self,
        body: &[u8],
        rx: &mut oneshot::Receiver<Response>,
        attempt: u32,
    ) -> Attempt {
        if let Err(e) = self.broker.publish(&self.request_queue, body.to_vec()).await {
            return Attempt::Failed(format!("publish failed: {e}"));
        }
        let deadline = self.policy.attempt_timeout(attempt);
        match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(response)) => Attempt::Replied(response),
            Ok(Err(_)) => Attempt::Closed,
            Err(_) => Attempt::Failed(format!("no reply within {}ms", deadline.as_millis())),
        }
    }

    /// Register a user. Empty fields are rejected locally.
    pub async fn signup(&self, name: &str, email: &str, password: &str) -> Response {
        if [name, email, password].iter().any(|v| v.trim().is_empty()) {
            return Response::error(
                ErrorCode::MissingFields,
                "Name, email, and password are required",
            );
        }
        let mut fields = Map::new();
        fields.insert("name".into(), name.into());
        fields.insert("email".into(), email.into());
        fields.insert("password".into(), password.into());
        self.invoke(actions::SIGNUP, fields).await
    }

    /// Authenticate a user. Empty fields are rejected locally.
    pub async fn login(&self, email: &str, password: &str) -> Response {
        if [email, password].iter().any(|v| v.trim().is_empty()) {
            return Response::error(ErrorCode::MissingFields, "Email and password are required");
        }
        let mut fields = Map::new();
        fields.insert("email".into(), email.into());
        fields.insert("password".into(), password.into());
        self.invoke(actions::LOGIN, fields).await
    }

    /// Stop the reader and delete the reply queue. Invocations still
    /// waiting fail their current attempt.
    pub async fn close(self) -> Result<(), BrokerError> {
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.reader.await {
            tracing::warn!(error = %e, "reply reader ended abnormally");
        }
        self.pending.clear();
        self.broker.delete_queue(&self.reply_queue).await?;
        tracing::debug!(reply_queue = %self.reply_queue, "gateway closed");
        Ok(())
    }
}

async fn read_replies(
    broker: Arc<dyn Broker>,
    reply_queue: String,
    pending: Pending,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        let next = tokio::select! {
            biased;
            _ = shutdown.recv() => return,
            next = broker.consume(&reply_queue, REPLY_WAIT) => next,
        };

        let body = match next {
            Ok(Some(body)) => body,
            Ok(None) => continue,
            Err(e) => {
                tracing::warn!(reply_queue = %reply_queue, error = %e, "reply consume failed");
                tokio::time::sleep(REPLY_WAIT).await;
                continue;
            }
        };

        let response = match Response::from_bytes(&body) {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!(error = %e, "unparseable reply discarded");
                continue;
            }
        };

        match pending.remove(&response.correlation_id) {
            Some((_, waiter)) => {
                // The waiter may have timed out between remove and send.
                let _ = waiter.send(response);
            }
            None => tracing::debug!(
                correlation_id = %response.correlation_id,
                "reply for unknown correlation id discarded"
            ),
        }
    }
}
