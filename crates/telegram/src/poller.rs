use std::{sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::events::{
    default_dispatcher, DispatchError, EventContext, EventDispatcher, HandlerResult,
    OutboundMessage, UpdateEnvelope,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport failed to connect: {0}")]
    Connect(String),
    #[error("transport read failed: {0}")]
    Receive(String),
    #[error("transport confirm failed: {0}")]
    Confirm(String),
    #[error("transport send failed: {0}")]
    Send(String),
    #[error("transport disconnect failed: {0}")]
    Disconnect(String),
}

#[derive(Debug, Error)]
pub enum PollerError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_retries: 5, base_delay_ms: 250, max_delay_ms: 5_000 }
    }
}

impl ReconnectPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

/// Bot API surface the runner needs: receive updates, confirm them so they
/// stop being redelivered, and send replies.
#[async_trait]
pub trait UpdateTransport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;
    async fn next_update(&self) -> Result<Option<UpdateEnvelope>, TransportError>;
    async fn confirm(&self, update_id: i64) -> Result<(), TransportError>;
    async fn send_message(&self, message: &OutboundMessage) -> Result<(), TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;
}

#[derive(Default)]
pub struct NoopUpdateTransport;

#[async_trait]
impl UpdateTransport for NoopUpdateTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn next_update(&self) -> Result<Option<UpdateEnvelope>, TransportError> {
        Ok(None)
    }

    async fn confirm(&self, _update_id: i64) -> Result<(), TransportError> {
        Ok(())
    }

    async fn send_message(&self, _message: &OutboundMessage) -> Result<(), TransportError> {
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Pumps one update at a time: confirm, dispatch, send the reply if any.
/// There is no overlap between completion calls for the same session because
/// the pump itself is strictly sequential.
pub struct LongPollRunner {
    transport: Arc<dyn UpdateTransport>,
    dispatcher: EventDispatcher,
    reconnect_policy: ReconnectPolicy,
}

impl Default for LongPollRunner {
    fn default() -> Self {
        Self {
            transport: Arc::new(NoopUpdateTransport),
            dispatcher: default_dispatcher(),
            reconnect_policy: ReconnectPolicy::default(),
        }
    }
}

impl LongPollRunner {
    pub fn new(
        transport: Arc<dyn UpdateTransport>,
        dispatcher: EventDispatcher,
        reconnect_policy: ReconnectPolicy,
    ) -> Self {
        Self { transport, dispatcher, reconnect_policy }
    }

    pub async fn start(&self) -> Result<()> {
        for attempt in 0..=self.reconnect_policy.max_retries {
            match self.connect_and_pump(attempt).await {
                Ok(()) => return Ok(()),
                Err(transport_error) => {
                    warn!(
                        attempt,
                        max_retries = self.reconnect_policy.max_retries,
                        error = %transport_error,
                        "long poll transport failed"
                    );

                    if attempt >= self.reconnect_policy.max_retries {
                        warn!(
                            max_retries = self.reconnect_policy.max_retries,
                            "long poll retries exhausted; continuing process without crash"
                        );
                        return Ok(());
                    }

                    let delay = self.reconnect_policy.backoff(attempt);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Ok(())
    }

    async fn connect_and_pump(&self, attempt: u32) -> Result<(), TransportError> {
        info!(attempt, "opening telegram long-poll connection");
        self.transport.connect().await?;
        info!(attempt, "telegram long-poll connected");

        loop {
            let Some(envelope) = self.transport.next_update().await? else {
                info!(attempt, "telegram update stream closed");
                self.transport.disconnect().await?;
                return Ok(());
            };
            let correlation_id = format!("upd-{}", envelope.update_id);
            let chat_id = envelope.event.chat_id();

            info!(
                event_name = "ingress.telegram.update_received",
                update_id = envelope.update_id,
                event_type = ?envelope.event.event_type(),
                correlation_id = %correlation_id,
                chat_id = chat_id.unwrap_or_default(),
                "received telegram update"
            );

            if let Err(error) = self.transport.confirm(envelope.update_id).await {
                warn!(
                    event_name = "ingress.telegram.confirm_failed",
                    update_id = envelope.update_id,
                    correlation_id = %correlation_id,
                    error = %error,
                    "failed to confirm telegram update"
                );
            } else {
                debug!(
                    event_name = "ingress.telegram.confirmed",
                    update_id = envelope.update_id,
                    correlation_id = %correlation_id,
                    "confirmed telegram update"
                );
            }

            let context = EventContext { correlation_id: correlation_id.clone() };
            match self.dispatcher.dispatch(&envelope, &context).await {
                Ok(HandlerResult::Replied(outbound)) => {
                    if let Err(error) = self.transport.send_message(&outbound).await {
                        warn!(
                            event_name = "egress.telegram.send_failed",
                            update_id = envelope.update_id,
                            correlation_id = %correlation_id,
                            chat_id = outbound.chat_id,
                            error = %error,
                            "failed to deliver reply; continuing poll loop"
                        );
                    }
                }
                Ok(HandlerResult::Processed | HandlerResult::Ignored) => {}
                Err(error) => {
                    warn!(
                        update_id = envelope.update_id,
                        correlation_id = %correlation_id,
                        chat_id = chat_id.unwrap_or_default(),
                        error = %error,
                        "event dispatch failed; continuing poll loop"
                    );
                }
            }
        }
    }
}
