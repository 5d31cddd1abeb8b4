//! Reply routing. A response goes to the caller's reply queue stamped with
//! the caller's correlation id, or nowhere.

use std::sync::Arc;

use bridge_core::{Response, Transport};

use crate::broker::Broker;

#[derive(Clone)]
pub struct ReplyRouter {
    broker: Arc<dyn Broker>,
}

impl ReplyRouter {
    pub fn new(broker: Arc<dyn Broker>) -> Self {
        Self { broker }
    }

    /// Publish `response` to the reply queue named in `transport`. Returns
    /// whether a reply was published. Without a complete reply address the
    /// response is discarded. Publish failures are logged, not retried;
    /// the caller's own timeout covers the loss.
    pub async fn send(&self, response: Response, transport: &Transport) -> bool {
        let Some((correlation_id, reply_to)) = transport.reply_address() else {
            tracing::debug!("request carried no reply address, response discarded");
            return false;
        };

        let response = response.with_correlation_id(correlation_id);
        let body = match response.to_bytes() {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(error = %e, "failed to encode response");
                return false;
            }
        };

        match self.broker.publish(reply_to, body).await {
            Ok(()) => {
                tracing::debug!(reply_to, correlation_id, "reply published");
                true
            }
            Err(e) => {
                tracing::warn!(reply_to, correlation_id, error = %e, "reply publish failed");
                false
            }
        }
    }
}
