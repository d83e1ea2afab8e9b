//! `handleError`: classifies a handler failure and redrives, dead-letters, or
//! requeues the delivery accordingly.

use crate::channel::{ChannelLike, Delivery, PublishProperties};
use crate::error::{HandlerError, TechnicalError};
use crate::model::{Consumer, RetryPolicy};
use crate::retry::headers;
use rand::Rng;
use std::sync::Arc;
use tracing::warn;

/// Dispatches failed deliveries to the broker per a consumer's queue's
/// [`RetryPolicy`], over the same channel the worker consumes on (acks and
/// nacks are delivery-tag indexed per channel).
pub struct RetryEngine {
    channel: Arc<dyn ChannelLike>,
}

impl RetryEngine {
    /// Builds a retry engine over `channel`.
    pub fn new(channel: Arc<dyn ChannelLike>) -> Self {
        Self { channel }
    }

    /// Classifies `error` and carries out the corresponding broker
    /// operations. `body` is the bytes to republish on a ttl-backoff redrive:
    /// the decompressed payload if the original message was compressed, the
    /// raw buffer otherwise — never compressed again.
    pub async fn handle_error(
        &self,
        error: &HandlerError,
        delivery: &Delivery,
        body: &[u8],
        consumer: &Consumer,
    ) -> Result<(), TechnicalError> {
        if error.is_non_retryable() {
            return self.send_to_dlq(delivery, consumer).await;
        }

        match consumer.queue().retry() {
            RetryPolicy::QuorumNative => self.handle_quorum_native(delivery, consumer).await,
            RetryPolicy::TtlBackoff {
                max_retries,
                initial_delay_ms,
                max_delay_ms,
                backoff_multiplier,
                jitter,
            } => {
                self.handle_ttl_backoff(
                    error,
                    delivery,
                    body,
                    consumer,
                    *max_retries,
                    *initial_delay_ms,
                    *max_delay_ms,
                    *backoff_multiplier,
                    *jitter,
                )
                .await
            }
        }
    }

    async fn send_to_dlq(&self, delivery: &Delivery, consumer: &Consumer) -> Result<(), TechnicalError> {
        if consumer.queue().dead_letter().is_none() {
            warn!(
                consumer = consumer.name(),
                queue = consumer.queue().name(),
                "no dead-letter exchange configured, message will be lost",
            );
        }

        self.channel.nack(delivery.delivery_tag, false).await
    }

    async fn handle_quorum_native(&self, delivery: &Delivery, consumer: &Consumer) -> Result<(), TechnicalError> {
        if let (Some(delivery_count), Some(delivery_limit)) = (delivery.delivery_count, consumer.queue().delivery_limit()) {
            if delivery_limit > 0 && delivery_count == delivery_limit as u64 - 1 {
                warn!(
                    consumer = consumer.name(),
                    delivery_count, delivery_limit, "final delivery attempt before the broker dead-letters this message",
                );
            }
        }

        self.channel.nack(delivery.delivery_tag, true).await
    }

    #[allow(clippy::too_many_arguments)]
    async fn handle_ttl_backoff(
        &self,
        error: &HandlerError,
        delivery: &Delivery,
        body: &[u8],
        consumer: &Consumer,
        max_retries: u32,
        initial_delay_ms: u64,
        max_delay_ms: u64,
        backoff_multiplier: f64,
        jitter: bool,
    ) -> Result<(), TechnicalError> {
        let retry_count = headers::retry_count(&delivery.headers);

        if retry_count >= max_retries {
            return self.send_to_dlq(delivery, consumer).await;
        }

        let dead_letter = consumer
            .queue()
            .dead_letter()
            .ok_or_else(|| TechnicalError::new("ttl-backoff queue has no dead-letter exchange configured"))?;

        let delay_ms = compute_delay(retry_count, initial_delay_ms, max_delay_ms, backoff_multiplier, jitter);
        let redriven_headers = headers::redrive_headers(&delivery.headers, retry_count + 1, &error.to_string());
        let wait_routing_key = format!("{}-wait", consumer.queue().name());

        let properties = PublishProperties {
            content_type: delivery.content_type.clone(),
            headers: redriven_headers,
            expiration_ms: Some(delay_ms),
            ..Default::default()
        };

        match self.channel.publish(dead_letter.exchange(), &wait_routing_key, body, properties).await {
            Ok(()) => self.channel.ack(delivery.delivery_tag).await,
            Err(publish_error) => {
                warn!(
                    consumer = consumer.name(),
                    error = %publish_error,
                    "failed to publish retry to the dead-letter exchange, falling back to requeue",
                );
                self.channel.nack(delivery.delivery_tag, true).await
            }
        }
    }
}

/// `delayMs = min(initialDelayMs * backoffMultiplier^retryCount, maxDelayMs)`,
/// optionally scaled by a uniform `[0.5, 1.0]` jitter factor.
pub fn compute_delay(retry_count: u32, initial_delay_ms: u64, max_delay_ms: u64, backoff_multiplier: f64, jitter: bool) -> u64 {
    let base = (initial_delay_ms as f64) * backoff_multiplier.powi(retry_count as i32);
    let capped = base.min(max_delay_ms as f64);

    let delayed = if jitter {
        let factor = rand::rng().random_range(0.5..=1.0);
        capped * factor
    } else {
        capped
    };

    delayed.floor() as u64
}
