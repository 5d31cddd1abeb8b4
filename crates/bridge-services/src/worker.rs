//! Worker loop: pulls requests off the request queue one at a time,
//! dispatches them, and routes the response back.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::{self, error::TryRecvError};

use bridge_core::request::Inbound;
use bridge_core::{Response, Transport};

use crate::broker::Broker;
use crate::dispatch::Dispatcher;
use crate::reply::ReplyRouter;

pub struct Worker {
    broker: Arc<dyn Broker>,
    queue: String,
    dispatcher: Arc<Dispatcher>,
    router: ReplyRouter,
    poll_wait: Duration,
    shutdown: broadcast::Receiver<()>,
}

impl Worker {
    pub fn new(
        broker: Arc<dyn Broker>,
        queue: impl Into<String>,
        dispatcher: Arc<Dispatcher>,
        poll_wait: Duration,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        let router = ReplyRouter::new(broker.clone());
        Self {
            broker,
            queue: queue.into(),
            dispatcher,
            router,
            poll_wait,
            shutdown,
        }
    }

    /// Consume until shutdown. A message that has been taken off the queue is
    /// always processed to completion, so shutdown is only observed between
    /// messages and at most one poll interval late.
    pub async fn run(mut self) -> anyhow::Result<()> {
        tracing::info!(queue = %self.queue, "worker started");
        loop {
            match self.shutdown.try_recv() {
                Err(TryRecvError::Empty) => {}
                _ => {
                    tracing::info!(queue = %self.queue, "worker shutting down");
                    return Ok(());
                }
            }

            match self.broker.consume(&self.queue, self.poll_wait).await {
                Ok(Some(body)) => self.handle(&body).await,
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(queue = %self.queue, error = %e, "consume failed");
                    tokio::time::sleep(self.poll_wait).await;
                }
            }
        }
    }

    /// Process one body and publish the reply, if any.
    pub async fn handle(&self, body: &[u8]) {
        if let Some((transport, response)) = self.process(body).await {
            self.router.send(response, &transport).await;
        }
    }

    /// Turn a raw request body into the response owed to the caller.
    /// `None` means the body was not a dispatchable request and nobody is
    /// answered, not even a caller that supplied a reply address.
    pub async fn process(&self, body: &[u8]) -> Option<(Transport, Response)> {
        let inbound = match Inbound::parse(body) {
            Ok(inbound) => inbound,
            Err(e) => {
                tracing::warn!(error = %e, len = body.len(), "malformed request dropped");
                return None;
            }
        };

        tracing::debug!(
            action = inbound.request.action(),
            correlation_id = inbound.transport.correlation_id.as_deref().unwrap_or(""),
            "request received"
        );
        let response = self.dispatcher.dispatch(inbound.request).await;
        Some((inbound.transport, response))
    }
}
