//! `defineCommandConsumer` / `defineCommandPublisher`: the 1-of-N command
//! half of the builder algebra, plus the publisher-side bridging
//! transformation.

use crate::builder::bridge::check_bridge_compatible;
use crate::error::ContractValidationError;
use crate::model::{Binding, Consumer, Exchange, MessageSchema, Publisher, Queue};

/// A command consumer bundle: the consumer plus the queue-binding that wires
/// its queue to the command exchange.
#[derive(Debug, Clone)]
pub struct CommandConsumerBundle {
    /// The consumer a worker dispatches deliveries to.
    pub consumer: Consumer,
    /// Binds `consumer`'s queue to `exchange` with the command's routing key.
    pub queue_binding: Binding,
}

/// Defines a consumer tagged as a command handler: unlike an event consumer,
/// the consumer itself owns the routing key (1-of-N dispatch, not pub/sub).
pub fn define_command_consumer(
    name: impl Into<String>,
    queue: Queue,
    exchange: &Exchange,
    message: MessageSchema,
    routing_key: Option<String>,
) -> CommandConsumerBundle {
    let queue_binding = Binding::queue_binding(queue.name(), exchange.name(), routing_key);
    let consumer = Consumer::new(name, queue, message);

    CommandConsumerBundle { consumer, queue_binding }
}

/// The exchange, message schema, and routing key a command publisher
/// targets — the intent `defineCommandPublisher` turns into a `Publisher`.
#[derive(Debug, Clone)]
pub struct CommandConfig {
    /// The command's home exchange.
    pub exchange: Exchange,
    /// The command payload's schema.
    pub message: MessageSchema,
    /// Required unless `exchange` is `fanout`.
    pub routing_key: Option<String>,
}

/// A command publisher bundle: the publisher, plus — only when bridged —
/// the exchange-binding that fans messages from the bridge back to the
/// command's home exchange.
#[derive(Debug, Clone)]
pub struct CommandPublisherBundle {
    /// The publisher a [`crate::publish`] client looks up by name.
    pub publisher: Publisher,
    /// Present only when `bridge_exchange` was supplied: fans messages from
    /// the bridge into the command's home exchange.
    pub exchange_binding: Option<Binding>,
}

/// Defines a publisher for `command`, optionally routed through a local
/// bridge exchange instead of publishing directly to the command's home
/// exchange.
pub fn define_command_publisher(
    name: impl Into<String>,
    command: CommandConfig,
    bridge_exchange: Option<Exchange>,
) -> Result<CommandPublisherBundle, ContractValidationError> {
    match bridge_exchange {
        Some(bridge) => {
            check_bridge_compatible(&command.exchange, &bridge)?;
            let exchange_binding =
                Binding::exchange_binding(bridge.name(), command.exchange.name(), command.routing_key.clone());
            let publisher = Publisher::new(name, bridge, command.message, command.routing_key);

            Ok(CommandPublisherBundle {
                publisher,
                exchange_binding: Some(exchange_binding),
            })
        }
        None => {
            let publisher = Publisher::new(name, command.exchange, command.message, command.routing_key);
            Ok(CommandPublisherBundle {
                publisher,
                exchange_binding: None,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DeadLetter, ExchangeKind};
    use crate::validator::NoopValidator;
    use pretty_assertions::assert_eq;

    fn message() -> MessageSchema {
        MessageSchema::new(NoopValidator).build()
    }

    #[test]
    fn plain_command_consumer_binds_to_command_exchange() {
        // Given
        let exchange = Exchange::builder("commands", ExchangeKind::Direct).build();
        let queue = Queue::builder("process-order").with_dead_letter(DeadLetter::new("dlx")).build();

        // When
        let bundle = define_command_consumer("processOrder", queue, &exchange, message(), Some("process-order".into()));

        // Then
        assert_eq!(
            bundle.queue_binding,
            Binding::queue_binding("process-order", "commands", Some("process-order".into()))
        );
    }

    #[test]
    fn bridged_command_publisher_publishes_to_bridge_and_binds_back_to_command_exchange() {
        // Given
        let command = CommandConfig {
            exchange: Exchange::builder("commands", ExchangeKind::Direct).build(),
            message: message(),
            routing_key: Some("process-order".into()),
        };
        let bridge = Exchange::builder("local-commands", ExchangeKind::Direct).build();

        // When
        let bundle = define_command_publisher("processOrder", command, Some(bridge)).unwrap();

        // Then
        assert_eq!(bundle.publisher.exchange().name(), "local-commands");
        assert_eq!(
            bundle.exchange_binding,
            Some(Binding::exchange_binding("local-commands", "commands", Some("process-order".into())))
        );
    }

    #[test]
    fn unbridged_command_publisher_publishes_directly() {
        // Given
        let command = CommandConfig {
            exchange: Exchange::builder("commands", ExchangeKind::Direct).build(),
            message: message(),
            routing_key: Some("process-order".into()),
        };

        // When
        let bundle = define_command_publisher("processOrder", command, None).unwrap();

        // Then
        assert_eq!(bundle.publisher.exchange().name(), "commands");
        assert!(bundle.exchange_binding.is_none());
    }
}
