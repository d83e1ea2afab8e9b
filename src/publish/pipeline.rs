//! The publish pipeline: `publish(publisherName, payload, options) → Result<(), PublishError>`.

use crate::channel::{ChannelLike, PublishProperties};
use crate::connection::Gateway;
use crate::error::{MessageValidationError, PublishError, TechnicalError};
use crate::model::Contract;
use crate::publish::compression::Compression;
use crate::telemetry::{SpanAttributes, TelemetryProvider};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard};

/// Per-call options for [`Publishers::publish`].
#[derive(Debug, Clone, Default)]
pub struct PublishOptions {
    /// When set, the JSON-serialized payload is compressed and
    /// `contentEncoding` is set to the algorithm name.
    pub compression: Option<Compression>,
    /// Extra message headers, merged under the publisher's own routing
    /// metadata.
    pub headers: serde_json::Map<String, serde_json::Value>,
    /// Message priority, meaningful only when the destination queue has
    /// `x-max-priority` set.
    pub priority: Option<u8>,
}

/// The publish-side client: resolves publishers by name against a
/// [`Contract`] and drives the publish pipeline over one shared channel,
/// acquired lazily and re-acquired only if a publish attempt fails on it.
pub struct Publishers {
    contract: Arc<Contract>,
    gateway: Gateway,
    channel: AsyncMutex<Option<Arc<dyn ChannelLike>>>,
    telemetry: Arc<dyn TelemetryProvider>,
}

impl Publishers {
    /// Builds a publish-side client against an already-acquired [`Gateway`].
    pub fn new(contract: Arc<Contract>, gateway: Gateway, telemetry: Arc<dyn TelemetryProvider>) -> Self {
        Self {
            contract,
            gateway,
            channel: AsyncMutex::new(None),
            telemetry,
        }
    }

    /// Publishes `payload` through the publisher named `publisher_name`.
    pub async fn publish(
        &self,
        publisher_name: &str,
        payload: serde_json::Value,
        options: PublishOptions,
    ) -> Result<(), PublishError> {
        let publisher = self.contract.publisher(publisher_name).ok_or_else(|| {
            PublishError::Technical(TechnicalError::new(format!("publisher '{publisher_name}' not found")))
        })?;

        let span = self.telemetry.start_span(SpanAttributes {
            system: "rabbitmq",
            destination: publisher.exchange().name().to_string(),
            destination_kind: "exchange",
            operation: "publish",
            routing_key: publisher.routing_key().map(str::to_string),
        });

        let started_at = Instant::now();
        let outcome = self.publish_validated(publisher, payload, options).await;
        let latency = started_at.elapsed();
        let routing_key = publisher.routing_key().unwrap_or("");

        match &outcome {
            Ok(()) => {
                span.end_ok();
                self.telemetry.record_publish(publisher.exchange().name(), routing_key, true, latency);
            }
            Err(error) => {
                span.end_err(&error.to_string());
                self.telemetry.record_publish(publisher.exchange().name(), routing_key, false, latency);
            }
        }

        outcome
    }

    async fn publish_validated(
        &self,
        publisher: &crate::model::Publisher,
        payload: serde_json::Value,
        options: PublishOptions,
    ) -> Result<(), PublishError> {
        let validated = publisher.message().payload_validator().validate(payload).await.map_err(|issues| {
            MessageValidationError {
                which: format!("{}.payload", publisher.name()),
                issues,
            }
        })?;

        let mut body = serde_json::to_vec(&validated)
            .map_err(|error| PublishError::Technical(TechnicalError::wrap("failed to serialize payload", error)))?;

        let mut properties = PublishProperties {
            content_type: Some("application/json".to_string()),
            delivery_mode: Some(2),
            headers: options.headers,
            priority: options.priority,
            ..Default::default()
        };

        if let Some(compression) = options.compression {
            body = compression
                .compress(&body)
                .map_err(|error| PublishError::Technical(TechnicalError::wrap("failed to compress payload", error)))?;
            properties.content_encoding = Some(compression.as_wire_str().to_string());
        }

        let (mut channel_guard, channel) = self.grab_channel().await.map_err(PublishError::Technical)?;

        let result = channel
            .publish(
                publisher.exchange().name(),
                publisher.routing_key().unwrap_or(""),
                &body,
                properties,
            )
            .await;

        // Keep the channel for the next publish only if this one succeeded;
        // otherwise let it drop so the next call acquires a fresh one.
        *channel_guard = result.is_ok().then_some(channel);
        drop(channel_guard);

        result.map_err(PublishError::Technical)
    }

    /// Obtains the cached channel under lock, fetching a fresh one from the
    /// gateway if none is cached.
    async fn grab_channel(&self) -> Result<(MutexGuard<'_, Option<Arc<dyn ChannelLike>>>, Arc<dyn ChannelLike>), TechnicalError> {
        let mut channel_guard = self.channel.lock().await;

        let channel = match channel_guard.take() {
            Some(channel) => channel,
            None => self.gateway.channel().await?,
        };

        Ok((channel_guard, channel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{define_contract, define_event_publisher};
    use crate::channel::mock::MockChannel;
    use crate::channel::ChannelLike;
    use crate::model::{Exchange, ExchangeKind, MessageSchema};
    use crate::telemetry::TracingTelemetryProvider;
    use crate::validator::NoopValidator;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::{mpsc, oneshot};

    fn contract_with_publisher() -> Arc<Contract> {
        let publisher = define_event_publisher(
            "orderCreated",
            Exchange::builder("orders", ExchangeKind::Topic).build(),
            MessageSchema::new(NoopValidator).build(),
            Some("order.created".into()),
        );

        Arc::new(define_contract().with_event_publisher(publisher).unwrap().assemble().unwrap())
    }

    /// Serves `channel` for every request, and counts how many times a
    /// channel was actually requested - used to prove a single acquisition
    /// is reused across calls rather than one being requested per publish.
    fn gateway_serving(channel: Arc<MockChannel>) -> (Gateway, Arc<AtomicUsize>) {
        let (tx, mut rx) = mpsc::channel::<oneshot::Sender<Result<Arc<dyn ChannelLike>, TechnicalError>>>(8);
        let requests = Arc::new(AtomicUsize::new(0));
        let counted = requests.clone();

        tokio::spawn(async move {
            while let Some(reply) = rx.recv().await {
                counted.fetch_add(1, Ordering::SeqCst);
                let _ = reply.send(Ok(channel.clone() as Arc<dyn ChannelLike>));
            }
        });

        (Gateway::from_sender_for_test(tx), requests)
    }

    #[tokio::test]
    async fn publish_sends_through_the_channel_with_json_content_type() {
        // Given
        let contract = contract_with_publisher();
        let channel = Arc::new(MockChannel::default());
        let (gateway, _requests) = gateway_serving(channel.clone());
        let publishers = Publishers::new(contract, gateway, Arc::new(TracingTelemetryProvider));

        // When
        publishers
            .publish("orderCreated", serde_json::json!({"orderId": "O1"}), PublishOptions::default())
            .await
            .unwrap();

        // Then
        let published = channel.published.lock();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "orders");
        assert_eq!(published[0].1, "order.created");
    }

    #[tokio::test]
    async fn publish_compresses_body_and_sets_content_encoding() {
        // Given
        let contract = contract_with_publisher();
        let channel = Arc::new(MockChannel::default());
        let (gateway, _requests) = gateway_serving(channel.clone());
        let publishers = Publishers::new(contract, gateway, Arc::new(TracingTelemetryProvider));

        // When
        publishers
            .publish(
                "orderCreated",
                serde_json::json!({"orderId": "O1"}),
                PublishOptions {
                    compression: Some(Compression::Gzip),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        // Then
        let published = channel.published.lock();
        assert_eq!(published[0].3.content_encoding, Some("gzip".to_string()));
    }

    #[tokio::test]
    async fn publish_rejects_unknown_publisher() {
        // Given
        let contract = contract_with_publisher();
        let channel = Arc::new(MockChannel::default());
        let (gateway, _requests) = gateway_serving(channel);
        let publishers = Publishers::new(contract, gateway, Arc::new(TracingTelemetryProvider));

        // When
        let actual = publishers.publish("doesNotExist", serde_json::json!({}), PublishOptions::default()).await;

        // Then
        assert!(matches!(actual, Err(PublishError::Technical(_))));
    }

    #[tokio::test]
    async fn publish_reuses_one_channel_across_multiple_calls() {
        // Given
        let contract = contract_with_publisher();
        let channel = Arc::new(MockChannel::default());
        let (gateway, requests) = gateway_serving(channel.clone());
        let publishers = Publishers::new(contract, gateway, Arc::new(TracingTelemetryProvider));

        // When
        for _ in 0..5 {
            publishers
                .publish("orderCreated", serde_json::json!({"orderId": "O1"}), PublishOptions::default())
                .await
                .unwrap();
        }

        // Then
        assert_eq!(channel.published.lock().len(), 5);
        assert_eq!(requests.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn publish_re_requests_a_channel_after_a_failed_publish() {
        // Given
        let contract = contract_with_publisher();
        let channel = Arc::new(MockChannel::default());
        let (gateway, requests) = gateway_serving(channel.clone());
        let publishers = Publishers::new(contract, gateway, Arc::new(TracingTelemetryProvider));

        // When
        *channel.fail_publish.lock() = true;
        let first = publishers.publish("orderCreated", serde_json::json!({"orderId": "O1"}), PublishOptions::default()).await;
        *channel.fail_publish.lock() = false;
        let second = publishers.publish("orderCreated", serde_json::json!({"orderId": "O1"}), PublishOptions::default()).await;

        // Then
        assert!(first.is_err());
        assert!(second.is_ok());
        assert_eq!(requests.load(Ordering::SeqCst), 2);
    }
}
