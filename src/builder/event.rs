//! `defineEventPublisher` / `defineEventConsumer`: the pub/sub half of the
//! builder algebra, plus the event-side bridging transformation.

use crate::builder::bridge::check_bridge_compatible;
use crate::error::ContractValidationError;
use crate::model::{Binding, Consumer, Exchange, MessageSchema, Publisher, Queue};

/// An event publisher bundle: just the [`Publisher`] itself, since an event
/// publisher's exchange is already embedded in it and needs no extra
/// bindings.
#[derive(Debug, Clone)]
pub struct EventPublisherBundle {
    /// The publisher a [`crate::publish`] client looks up by name.
    pub publisher: Publisher,
}

/// Defines a publisher tagged as an event (fanout pub/sub, or direct/topic
/// with a concrete routing key).
pub fn define_event_publisher(
    name: impl Into<String>,
    exchange: Exchange,
    message: MessageSchema,
    routing_key: Option<String>,
) -> EventPublisherBundle {
    EventPublisherBundle {
        publisher: Publisher::new(name, exchange, message, routing_key),
    }
}

/// An event consumer bundle: the consumer, the queue-binding that wires it
/// to its source, and — only for bridged subscriptions — the exchange-
/// binding that fans events from the original exchange into the bridge.
#[derive(Debug, Clone)]
pub struct EventConsumerBundle {
    /// The consumer a worker dispatches deliveries to.
    pub consumer: Consumer,
    /// Binds `consumer`'s queue to its source (or bridge) exchange.
    pub queue_binding: Binding,
    /// Present only when `bridge_exchange` was supplied: fans the event from
    /// its original exchange into the bridge.
    pub exchange_binding: Option<Binding>,
    /// The bridge exchange itself, when bridging; the caller still owns
    /// registering it (typically via [`crate::builder::define_contract`]'s
    /// auto-extraction, through `queue_binding`/`exchange_binding` naming
    /// the bridge, not through a separate field requiring manual wiring).
    pub bridge_exchange: Option<Exchange>,
}

/// Options for [`define_event_consumer`].
#[derive(Debug, Clone, Default)]
pub struct EventConsumerOptions {
    /// The routing key this consumer wants to match (a pattern is allowed
    /// when the source exchange is `topic`).
    pub routing_key: Option<String>,
    /// When the event's source exchange belongs to another domain, routes
    /// the subscription through this local exchange instead of binding the
    /// queue directly to the source.
    pub bridge_exchange: Option<Exchange>,
}

/// Defines a consumer tagged as subscribing to an event published via
/// `event_publisher`, wiring up the queue-binding (and, when
/// `opts.bridge_exchange` is set, the bridging exchange-binding) that
/// connects it.
pub fn define_event_consumer(
    name: impl Into<String>,
    event_publisher: &EventPublisherBundle,
    queue: Queue,
    message: MessageSchema,
    opts: EventConsumerOptions,
) -> Result<EventConsumerBundle, ContractValidationError> {
    let name = name.into();
    let source = &event_publisher.publisher.exchange;

    let (binding_target, exchange_binding, bridge_exchange) = match opts.bridge_exchange {
        Some(bridge) => {
            check_bridge_compatible(source, &bridge)?;
            let exchange_binding = Binding::exchange_binding(source.name(), bridge.name(), opts.routing_key.clone());
            (bridge.name().to_string(), Some(exchange_binding), Some(bridge))
        }
        None => (source.name().to_string(), None, None),
    };

    let queue_binding = Binding::queue_binding(queue.name(), binding_target, opts.routing_key);
    let consumer = Consumer::new(name, queue, message);

    Ok(EventConsumerBundle {
        consumer,
        queue_binding,
        exchange_binding,
        bridge_exchange,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ExchangeKind;
    use crate::validator::NoopValidator;
    use pretty_assertions::assert_eq;

    fn message() -> MessageSchema {
        MessageSchema::new(NoopValidator).build()
    }

    #[test]
    fn plain_event_consumer_binds_directly_to_source() {
        // Given
        let publisher = define_event_publisher(
            "orderCreated",
            Exchange::builder("orders", ExchangeKind::Topic).build(),
            message(),
            Some("order.created".into()),
        );
        let queue = Queue::builder("order-processing").with_dead_letter(crate::model::DeadLetter::new("dlx")).build();

        // When
        let bundle = define_event_consumer(
            "orderProcessing",
            &publisher,
            queue,
            message(),
            EventConsumerOptions {
                routing_key: Some("order.created".into()),
                bridge_exchange: None,
            },
        )
        .unwrap();

        // Then
        assert_eq!(
            bundle.queue_binding,
            Binding::queue_binding("order-processing", "orders", Some("order.created".into()))
        );
        assert!(bundle.exchange_binding.is_none());
    }

    #[test]
    fn bridged_event_consumer_binds_queue_to_bridge_and_emits_exchange_binding() {
        // Given
        let publisher = define_event_publisher(
            "orderCreated",
            Exchange::builder("orders", ExchangeKind::Topic).build(),
            message(),
            Some("order.created".into()),
        );
        let queue = Queue::builder("order-processing").with_dead_letter(crate::model::DeadLetter::new("dlx")).build();
        let bridge = Exchange::builder("local-orders", ExchangeKind::Topic).build();

        // When
        let bundle = define_event_consumer(
            "orderProcessing",
            &publisher,
            queue,
            message(),
            EventConsumerOptions {
                routing_key: Some("order.created".into()),
                bridge_exchange: Some(bridge),
            },
        )
        .unwrap();

        // Then
        assert_eq!(
            bundle.queue_binding,
            Binding::queue_binding("order-processing", "local-orders", Some("order.created".into()))
        );
        assert_eq!(
            bundle.exchange_binding,
            Some(Binding::exchange_binding("orders", "local-orders", Some("order.created".into())))
        );
    }

    #[test]
    fn incompatible_bridge_kind_is_rejected() {
        // Given
        let publisher = define_event_publisher(
            "broadcast",
            Exchange::builder("announcements", ExchangeKind::Fanout).build(),
            message(),
            None,
        );
        let queue = Queue::builder("notifications").with_dead_letter(crate::model::DeadLetter::new("dlx")).build();
        let bridge = Exchange::builder("local-announcements", ExchangeKind::Direct).build();

        // When
        let actual = define_event_consumer(
            "notifications",
            &publisher,
            queue,
            message(),
            EventConsumerOptions {
                routing_key: None,
                bridge_exchange: Some(bridge),
            },
        );

        // Then
        assert!(matches!(actual, Err(ContractValidationError::IncompatibleBridgeKind { .. })));
    }
}
