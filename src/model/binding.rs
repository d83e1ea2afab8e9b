//! Bindings: the routing edges between exchanges and queues, or between two
//! exchanges (bridging).

use std::collections::BTreeMap;

/// A binding between a queue and an exchange, or between two exchanges.
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    /// `queue.bind {queue, exchange, routingKey, arguments}`.
    QueueBinding {
        /// The bound queue's name.
        queue: String,
        /// The source exchange's name.
        exchange: String,
        /// Required unless `exchange`'s kind is `fanout`.
        routing_key: Option<String>,
        /// User-supplied `queue.bind` arguments.
        arguments: BTreeMap<String, serde_json::Value>,
    },
    /// `exchange.bind {destination, source, routingKey, arguments}`.
    ExchangeBinding {
        /// The upstream exchange's name.
        source: String,
        /// The downstream exchange's name.
        destination: String,
        /// Required unless `source`'s kind is `fanout`.
        routing_key: Option<String>,
        /// User-supplied `exchange.bind` arguments.
        arguments: BTreeMap<String, serde_json::Value>,
    },
}

impl Binding {
    /// A plain queue-binding with no extra arguments.
    pub fn queue_binding(
        queue: impl Into<String>,
        exchange: impl Into<String>,
        routing_key: Option<String>,
    ) -> Self {
        Binding::QueueBinding {
            queue: queue.into(),
            exchange: exchange.into(),
            routing_key,
            arguments: BTreeMap::new(),
        }
    }

    /// A plain exchange-binding with no extra arguments.
    pub fn exchange_binding(
        source: impl Into<String>,
        destination: impl Into<String>,
        routing_key: Option<String>,
    ) -> Self {
        Binding::ExchangeBinding {
            source: source.into(),
            destination: destination.into(),
            routing_key,
            arguments: BTreeMap::new(),
        }
    }

    /// The binding's routing key, common to both variants.
    pub fn routing_key(&self) -> Option<&str> {
        match self {
            Binding::QueueBinding { routing_key, .. } => routing_key.as_deref(),
            Binding::ExchangeBinding { routing_key, .. } => routing_key.as_deref(),
        }
    }

    /// A `(kind, endpoint_a, endpoint_b, routing_key)` tuple identifying this
    /// binding's destination, used to detect duplicate bindings at assembly
    /// time.
    pub fn destination_key(&self) -> (&'static str, &str, &str, &str) {
        match self {
            Binding::QueueBinding {
                queue,
                exchange,
                routing_key,
                ..
            } => ("queue", exchange.as_str(), queue.as_str(), routing_key.as_deref().unwrap_or("")),
            Binding::ExchangeBinding {
                source,
                destination,
                routing_key,
                ..
            } => (
                "exchange",
                source.as_str(),
                destination.as_str(),
                routing_key.as_deref().unwrap_or(""),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn queue_binding_destination_key_is_stable() {
        // Given
        let binding = Binding::queue_binding("order-processing", "orders", Some("order.created".into()));

        // When
        let actual = binding.destination_key();

        // Then
        assert_eq!(actual, ("queue", "orders", "order-processing", "order.created"));
    }

    #[test]
    fn exchange_binding_routing_key_defaults_to_none() {
        // Given
        let binding = Binding::exchange_binding("orders", "local-bridge", None);

        // When / Then
        assert_eq!(binding.routing_key(), None);
    }
}
