//! The [`ChannelLike`] capability: the boundary between this crate's logic
//! and the raw AMQP 0-9-1 wire protocol. The default implementation wraps
//! [`lapin::Channel`]; tests exercise a fully in-memory [`MockChannel`]
//! instead of a live broker.

use crate::error::TechnicalError;
use crate::model::{Binding, Exchange, ExchangeKind, Queue, QueueKind};
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use std::collections::BTreeMap;

/// Delivery handed to a worker, independent of the transport that produced
/// it.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// The opaque delivery tag used to ack/nack this specific delivery.
    pub delivery_tag: u64,
    /// The raw message body.
    pub body: Vec<u8>,
    /// `properties.contentType`.
    pub content_type: Option<String>,
    /// `properties.contentEncoding`; one of the recognized compression names
    /// when the body is compressed.
    pub content_encoding: Option<String>,
    /// Message headers, as a flat JSON object.
    pub headers: serde_json::Map<String, serde_json::Value>,
    /// `x-delivery-count`, set by the broker on quorum queues.
    pub delivery_count: Option<u64>,
}

/// Properties attached to a published message.
#[derive(Debug, Clone, Default)]
pub struct PublishProperties {
    /// `contentType`; the publish pipeline always sets `application/json`.
    pub content_type: Option<String>,
    /// `contentEncoding`; set to the compression algorithm name when the
    /// body is compressed.
    pub content_encoding: Option<String>,
    /// `deliveryMode`; `2` for persistent delivery.
    pub delivery_mode: Option<u8>,
    /// Per-message TTL in milliseconds (`expiration`), used by the
    /// TTL-backoff retry engine to schedule a redrive.
    pub expiration_ms: Option<u64>,
    /// Message headers.
    pub headers: serde_json::Map<String, serde_json::Value>,
    /// Message priority, when the destination queue has `x-max-priority`.
    pub priority: Option<u8>,
}

/// The capability this crate consumes for raw broker operations. A concrete
/// implementation need not be `lapin`-backed, but the crate ships exactly
/// one: [`LapinChannel`].
#[async_trait]
pub trait ChannelLike: Send + Sync {
    /// `exchange.declare`, idempotent.
    async fn assert_exchange(&self, exchange: &Exchange) -> Result<(), TechnicalError>;

    /// `queue.declare`, idempotent.
    async fn assert_queue(&self, queue: &Queue) -> Result<(), TechnicalError>;

    /// `queue.bind` or `exchange.bind`, idempotent.
    async fn assert_binding(&self, binding: &Binding) -> Result<(), TechnicalError>;

    /// `basic.publish`.
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
        properties: PublishProperties,
    ) -> Result<(), TechnicalError>;

    /// `basic.qos {prefetch_count}`.
    async fn set_prefetch(&self, prefetch: u16) -> Result<(), TechnicalError>;

    /// `basic.consume`, returning a stream of deliveries (and, per item, any
    /// broker-level delivery error) rather than a bare consumer tag — the
    /// tag itself is the one the caller supplied, used later for
    /// [`cancel`](Self::cancel).
    async fn consume(
        &self,
        queue: &str,
        consumer_tag: &str,
    ) -> Result<BoxStream<'static, Result<Delivery, TechnicalError>>, TechnicalError>;

    /// `basic.cancel`.
    async fn cancel(&self, consumer_tag: &str) -> Result<(), TechnicalError>;

    /// `basic.ack {deliveryTag, multiple=false}`.
    async fn ack(&self, delivery_tag: u64) -> Result<(), TechnicalError>;

    /// `basic.nack {deliveryTag, multiple=false, requeue}`.
    async fn nack(&self, delivery_tag: u64, requeue: bool) -> Result<(), TechnicalError>;
}

/// Merges an exchange/queue's derived `x-*` arguments with its user-supplied
/// `arguments`, user-supplied values last (so users can override a derived
/// argument if they really want to).
pub(crate) fn queue_declare_arguments(queue: &Queue) -> BTreeMap<String, serde_json::Value> {
    let mut arguments = BTreeMap::new();

    arguments.insert(
        "x-queue-type".to_string(),
        serde_json::Value::String(
            match queue.kind() {
                QueueKind::Classic => "classic",
                QueueKind::Quorum => "quorum",
            }
            .to_string(),
        ),
    );

    if let Some(max_priority) = queue.max_priority() {
        arguments.insert("x-max-priority".to_string(), serde_json::json!(max_priority));
    }

    if let Some(delivery_limit) = queue.delivery_limit() {
        arguments.insert("x-delivery-limit".to_string(), serde_json::json!(delivery_limit));
    }

    if let Some(dead_letter) = queue.dead_letter() {
        arguments.insert(
            "x-dead-letter-exchange".to_string(),
            serde_json::Value::String(dead_letter.exchange().to_string()),
        );

        if let Some(routing_key) = dead_letter.routing_key() {
            arguments.insert(
                "x-dead-letter-routing-key".to_string(),
                serde_json::Value::String(routing_key.to_string()),
            );
        }
    }

    for (key, value) in queue.arguments() {
        arguments.insert(key.clone(), value.clone());
    }

    arguments
}

fn json_map_to_field_table(map: &BTreeMap<String, serde_json::Value>) -> lapin::types::FieldTable {
    let mut table = lapin::types::FieldTable::default();
    for (key, value) in map {
        if let Some(amqp_value) = json_to_amqp_value(value) {
            table.insert(key.as_str().into(), amqp_value);
        }
    }
    table
}

fn json_to_amqp_value(value: &serde_json::Value) -> Option<lapin::types::AMQPValue> {
    use lapin::types::AMQPValue;

    match value {
        serde_json::Value::Bool(b) => Some(AMQPValue::Boolean(*b)),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(AMQPValue::LongLongInt(i))
            } else {
                n.as_f64().map(AMQPValue::Double)
            }
        }
        serde_json::Value::String(s) => Some(AMQPValue::LongString(s.as_str().into())),
        _ => None,
    }
}

fn field_table_to_json_map(table: &lapin::types::FieldTable) -> serde_json::Map<String, serde_json::Value> {
    table
        .inner()
        .iter()
        .filter_map(|(key, value)| amqp_value_to_json(value).map(|value| (key.to_string(), value)))
        .collect()
}

fn amqp_value_to_json(value: &lapin::types::AMQPValue) -> Option<serde_json::Value> {
    use lapin::types::AMQPValue;

    match value {
        AMQPValue::Boolean(b) => Some(serde_json::Value::Bool(*b)),
        AMQPValue::LongLongInt(i) => Some(serde_json::json!(i)),
        AMQPValue::LongInt(i) => Some(serde_json::json!(i)),
        AMQPValue::ShortInt(i) => Some(serde_json::json!(i)),
        AMQPValue::Double(d) => Some(serde_json::json!(d)),
        AMQPValue::Float(f) => Some(serde_json::json!(f)),
        AMQPValue::LongString(s) => Some(serde_json::Value::String(s.to_string())),
        AMQPValue::ShortString(s) => Some(serde_json::Value::String(s.to_string())),
        _ => None,
    }
}

fn lapin_delivery_to_delivery(delivery: lapin::message::Delivery) -> Delivery {
    let headers = delivery
        .properties
        .headers()
        .as_ref()
        .map(field_table_to_json_map)
        .unwrap_or_default();

    let delivery_count = delivery
        .properties
        .headers()
        .as_ref()
        .and_then(|headers| headers.inner().get("x-delivery-count"))
        .and_then(|value| amqp_value_to_json(value))
        .and_then(|value| value.as_u64());

    Delivery {
        delivery_tag: delivery.delivery_tag,
        body: delivery.data,
        content_type: delivery.properties.content_type().as_ref().map(|s| s.to_string()),
        content_encoding: delivery.properties.content_encoding().as_ref().map(|s| s.to_string()),
        headers,
        delivery_count,
    }
}

/// A [`ChannelLike`] backed by a real [`lapin::Channel`].
pub struct LapinChannel {
    inner: lapin::Channel,
}

impl LapinChannel {
    /// Wraps an already-open `lapin` channel.
    pub fn new(inner: lapin::Channel) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl ChannelLike for LapinChannel {
    async fn assert_exchange(&self, exchange: &Exchange) -> Result<(), TechnicalError> {
        use lapin::options::ExchangeDeclareOptions;
        use lapin::ExchangeKind as LapinExchangeKind;

        let kind = match exchange.kind() {
            ExchangeKind::Fanout => LapinExchangeKind::Fanout,
            ExchangeKind::Direct => LapinExchangeKind::Direct,
            ExchangeKind::Topic => LapinExchangeKind::Topic,
        };

        self.inner
            .exchange_declare(
                exchange.name(),
                kind,
                ExchangeDeclareOptions {
                    durable: exchange.durable(),
                    auto_delete: exchange.auto_delete(),
                    internal: exchange.internal(),
                    ..Default::default()
                },
                json_map_to_field_table(exchange.arguments()),
            )
            .await
            .map_err(|error| TechnicalError::wrap(format!("failed to declare exchange '{}'", exchange.name()), error))
    }

    async fn assert_queue(&self, queue: &Queue) -> Result<(), TechnicalError> {
        use lapin::options::QueueDeclareOptions;

        self.inner
            .queue_declare(
                queue.name(),
                QueueDeclareOptions {
                    durable: queue.durable(),
                    exclusive: queue.exclusive(),
                    auto_delete: queue.auto_delete(),
                    ..Default::default()
                },
                json_map_to_field_table(&queue_declare_arguments(queue)),
            )
            .await
            .map(|_| ())
            .map_err(|error| TechnicalError::wrap(format!("failed to declare queue '{}'", queue.name()), error))
    }

    async fn assert_binding(&self, binding: &Binding) -> Result<(), TechnicalError> {
        use lapin::options::{ExchangeBindOptions, QueueBindOptions};

        match binding {
            Binding::QueueBinding {
                queue,
                exchange,
                routing_key,
                arguments,
            } => self
                .inner
                .queue_bind(
                    queue,
                    exchange,
                    routing_key.as_deref().unwrap_or(""),
                    QueueBindOptions::default(),
                    json_map_to_field_table(arguments),
                )
                .await
                .map_err(|error| TechnicalError::wrap(format!("failed to bind queue '{queue}' to '{exchange}'"), error)),
            Binding::ExchangeBinding {
                source,
                destination,
                routing_key,
                arguments,
            } => self
                .inner
                .exchange_bind(
                    destination,
                    source,
                    routing_key.as_deref().unwrap_or(""),
                    ExchangeBindOptions::default(),
                    json_map_to_field_table(arguments),
                )
                .await
                .map_err(|error| {
                    TechnicalError::wrap(format!("failed to bind exchange '{source}' to '{destination}'"), error)
                }),
        }
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
        properties: PublishProperties,
    ) -> Result<(), TechnicalError> {
        use lapin::options::BasicPublishOptions;
        use lapin::BasicProperties;

        let mut amqp_properties = BasicProperties::default();

        if let Some(content_type) = &properties.content_type {
            amqp_properties = amqp_properties.with_content_type(content_type.as_str().into());
        }
        if let Some(content_encoding) = &properties.content_encoding {
            amqp_properties = amqp_properties.with_content_encoding(content_encoding.as_str().into());
        }
        if let Some(delivery_mode) = properties.delivery_mode {
            amqp_properties = amqp_properties.with_delivery_mode(delivery_mode);
        }
        if let Some(expiration_ms) = properties.expiration_ms {
            amqp_properties = amqp_properties.with_expiration(expiration_ms.to_string().as_str().into());
        }
        if let Some(priority) = properties.priority {
            amqp_properties = amqp_properties.with_priority(priority);
        }
        if !properties.headers.is_empty() {
            let headers: BTreeMap<String, serde_json::Value> = properties.headers.into_iter().collect();
            amqp_properties = amqp_properties.with_headers(json_map_to_field_table(&headers));
        }

        self.inner
            .basic_publish(exchange, routing_key, BasicPublishOptions::default(), body, amqp_properties)
            .await
            .map_err(|error| TechnicalError::wrap("channel rejected publish", error))?
            .await
            .map_err(|error| TechnicalError::wrap("publish confirm failed", error))?;

        Ok(())
    }

    async fn set_prefetch(&self, prefetch: u16) -> Result<(), TechnicalError> {
        self.inner
            .basic_qos(prefetch, lapin::options::BasicQosOptions::default())
            .await
            .map_err(|error| TechnicalError::wrap("failed to set prefetch", error))
    }

    async fn consume(
        &self,
        queue: &str,
        consumer_tag: &str,
    ) -> Result<BoxStream<'static, Result<Delivery, TechnicalError>>, TechnicalError> {
        let consumer = self
            .inner
            .basic_consume(
                queue,
                consumer_tag,
                lapin::options::BasicConsumeOptions {
                    no_ack: false,
                    ..Default::default()
                },
                lapin::types::FieldTable::default(),
            )
            .await
            .map_err(|error| TechnicalError::wrap(format!("failed to consume from queue '{queue}'"), error))?;

        let stream = consumer.map(|item| match item {
            Ok(delivery) => Ok(lapin_delivery_to_delivery(delivery)),
            Err(error) => Err(TechnicalError::wrap("delivery stream error", error)),
        });

        Ok(Box::pin(stream))
    }

    async fn cancel(&self, consumer_tag: &str) -> Result<(), TechnicalError> {
        self.inner
            .basic_cancel(consumer_tag, lapin::options::BasicCancelOptions::default())
            .await
            .map_err(|error| TechnicalError::wrap(format!("failed to cancel consumer '{consumer_tag}'"), error))
    }

    async fn ack(&self, delivery_tag: u64) -> Result<(), TechnicalError> {
        self.inner
            .basic_ack(delivery_tag, lapin::options::BasicAckOptions { multiple: false })
            .await
            .map_err(|error| TechnicalError::wrap("failed to ack delivery", error))
    }

    async fn nack(&self, delivery_tag: u64, requeue: bool) -> Result<(), TechnicalError> {
        self.inner
            .basic_nack(
                delivery_tag,
                lapin::options::BasicNackOptions {
                    multiple: false,
                    requeue,
                },
            )
            .await
            .map_err(|error| TechnicalError::wrap("failed to nack delivery", error))
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashSet;

    /// An in-memory broker double: tracks declared exchanges/queues/bindings
    /// and published messages, without ever touching a real socket. Used to
    /// exercise topology synthesis, the publish pipeline, and the retry
    /// engine deterministically.
    #[derive(Default)]
    pub struct MockChannel {
        pub declared_exchanges: Mutex<HashSet<String>>,
        pub declared_queues: Mutex<HashSet<String>>,
        pub declared_bindings: Mutex<HashSet<(&'static str, String, String, String)>>,
        pub published: Mutex<Vec<(String, String, Vec<u8>, PublishProperties)>>,
        pub acked: Mutex<Vec<u64>>,
        pub nacked: Mutex<Vec<(u64, bool)>>,
        pub prefetch: Mutex<Option<u16>>,
        pub fail_publish: Mutex<bool>,
        consumer_senders: Mutex<std::collections::HashMap<String, tokio::sync::mpsc::UnboundedSender<Result<Delivery, TechnicalError>>>>,
    }

    impl MockChannel {
        /// Pushes a delivery to whichever consumer last called
        /// [`ChannelLike::consume`] against `queue`; silently dropped if
        /// nothing is consuming yet.
        pub fn enqueue_delivery(&self, queue: &str, delivery: Delivery) {
            if let Some(sender) = self.consumer_senders.lock().get(queue) {
                let _ = sender.send(Ok(delivery));
            }
        }

        /// Drops whichever consumer is registered against `queue`, ending its
        /// delivery stream with `None` - simulates the broker cancelling a
        /// consumer out from under it.
        pub fn end_consumer(&self, queue: &str) {
            self.consumer_senders.lock().remove(queue);
        }
    }

    #[async_trait]
    impl ChannelLike for MockChannel {
        async fn assert_exchange(&self, exchange: &Exchange) -> Result<(), TechnicalError> {
            self.declared_exchanges.lock().insert(exchange.name().to_string());
            Ok(())
        }

        async fn assert_queue(&self, queue: &Queue) -> Result<(), TechnicalError> {
            self.declared_queues.lock().insert(queue.name().to_string());
            Ok(())
        }

        async fn assert_binding(&self, binding: &Binding) -> Result<(), TechnicalError> {
            let key = match binding {
                Binding::QueueBinding {
                    queue,
                    exchange,
                    routing_key,
                    ..
                } => (
                    "queue",
                    exchange.clone(),
                    queue.clone(),
                    routing_key.clone().unwrap_or_default(),
                ),
                Binding::ExchangeBinding {
                    source,
                    destination,
                    routing_key,
                    ..
                } => (
                    "exchange",
                    source.clone(),
                    destination.clone(),
                    routing_key.clone().unwrap_or_default(),
                ),
            };
            self.declared_bindings.lock().insert(key);
            Ok(())
        }

        async fn publish(
            &self,
            exchange: &str,
            routing_key: &str,
            body: &[u8],
            properties: PublishProperties,
        ) -> Result<(), TechnicalError> {
            if *self.fail_publish.lock() {
                return Err(TechnicalError::new("channel rejected"));
            }

            self.published
                .lock()
                .push((exchange.to_string(), routing_key.to_string(), body.to_vec(), properties));
            Ok(())
        }

        async fn set_prefetch(&self, prefetch: u16) -> Result<(), TechnicalError> {
            *self.prefetch.lock() = Some(prefetch);
            Ok(())
        }

        async fn consume(
            &self,
            queue: &str,
            _consumer_tag: &str,
        ) -> Result<BoxStream<'static, Result<Delivery, TechnicalError>>, TechnicalError> {
            let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
            self.consumer_senders.lock().insert(queue.to_string(), tx);
            Ok(Box::pin(futures::stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|item| (item, rx))
            })))
        }

        async fn cancel(&self, _consumer_tag: &str) -> Result<(), TechnicalError> {
            Ok(())
        }

        async fn ack(&self, delivery_tag: u64) -> Result<(), TechnicalError> {
            self.acked.lock().push(delivery_tag);
            Ok(())
        }

        async fn nack(&self, delivery_tag: u64, requeue: bool) -> Result<(), TechnicalError> {
            self.nacked.lock().push((delivery_tag, requeue));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockChannel;
    use super::*;
    use crate::model::{DeadLetter, Queue};
    use pretty_assertions::assert_eq;

    #[test]
    fn queue_declare_arguments_include_derived_and_user_supplied() {
        // Given
        let queue = Queue::builder("order-processing")
            .with_dead_letter(DeadLetter::new("dlx"))
            .with_max_priority(5)
            .with_argument("x-custom", "value")
            .build();

        // When
        let arguments = queue_declare_arguments(&queue);

        // Then
        assert_eq!(arguments.get("x-queue-type").unwrap(), "quorum");
        assert_eq!(arguments.get("x-max-priority").unwrap(), &serde_json::json!(5));
        assert_eq!(arguments.get("x-dead-letter-exchange").unwrap(), "dlx");
        assert_eq!(arguments.get("x-custom").unwrap(), "value");
    }

    #[tokio::test]
    async fn mock_channel_records_published_messages() {
        // Given
        let channel = MockChannel::default();

        // When
        channel
            .publish("orders", "order.created", b"{}", PublishProperties::default())
            .await
            .unwrap();

        // Then
        assert_eq!(channel.published.lock().len(), 1);
    }

    #[tokio::test]
    async fn mock_channel_delivers_enqueued_messages_to_its_consumer_stream() {
        // Given
        let channel = MockChannel::default();
        let mut stream = channel.consume("order-processing", "tag-1").await.unwrap();
        channel.enqueue_delivery(
            "order-processing",
            Delivery {
                delivery_tag: 1,
                body: b"{}".to_vec(),
                content_type: Some("application/json".into()),
                content_encoding: None,
                headers: serde_json::Map::new(),
                delivery_count: None,
            },
        );

        // When
        let delivered = stream.next().await.unwrap().unwrap();

        // Then
        assert_eq!(delivered.delivery_tag, 1);
    }

    #[tokio::test]
    async fn mock_channel_can_be_made_to_fail_publish() {
        // Given
        let channel = MockChannel::default();
        *channel.fail_publish.lock() = true;

        // When
        let actual = channel
            .publish("orders", "order.created", b"{}", PublishProperties::default())
            .await;

        // Then
        assert!(actual.is_err());
    }
}
