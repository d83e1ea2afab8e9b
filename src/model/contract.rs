//! The immutable contract: the closed graph of exchanges, queues, bindings,
//! publishers, and consumers every client and worker is built from.

use crate::error::ContractValidationError;
use crate::model::queue::{DeadLetter, RetryPolicy};
use crate::model::{Binding, Consumer, Exchange, ExchangeKind, Publisher, Queue};
use std::collections::BTreeMap;

/// The assembled, immutable contract.
///
/// Construct one via [`ContractAssembler`]; there is no public constructor
/// that skips invariant checking.
#[derive(Debug, Clone, Default)]
pub struct Contract {
    exchanges: BTreeMap<String, Exchange>,
    queues: BTreeMap<String, Queue>,
    bindings: BTreeMap<String, Binding>,
    publishers: BTreeMap<String, Publisher>,
    consumers: BTreeMap<String, Consumer>,
}

impl Contract {
    /// Starts assembling a new contract.
    pub fn builder() -> ContractAssembler {
        ContractAssembler::new()
    }

    /// Looks up an exchange by name.
    pub fn exchange(&self, name: &str) -> Option<&Exchange> {
        self.exchanges.get(name)
    }

    /// Looks up a queue by name.
    pub fn queue(&self, name: &str) -> Option<&Queue> {
        self.queues.get(name)
    }

    /// Looks up a binding by its contract key.
    pub fn binding(&self, key: &str) -> Option<&Binding> {
        self.bindings.get(key)
    }

    /// Looks up a publisher by its contract key.
    pub fn publisher(&self, name: &str) -> Option<&Publisher> {
        self.publishers.get(name)
    }

    /// Looks up a consumer by its contract key.
    pub fn consumer(&self, name: &str) -> Option<&Consumer> {
        self.consumers.get(name)
    }

    /// Iterates over every exchange.
    pub fn exchanges(&self) -> impl Iterator<Item = &Exchange> {
        self.exchanges.values()
    }

    /// Iterates over every queue.
    pub fn queues(&self) -> impl Iterator<Item = &Queue> {
        self.queues.values()
    }

    /// Iterates over every binding.
    pub fn bindings(&self) -> impl Iterator<Item = &Binding> {
        self.bindings.values()
    }

    /// Iterates over every publisher.
    pub fn publishers(&self) -> impl Iterator<Item = &Publisher> {
        self.publishers.values()
    }

    /// Iterates over every consumer.
    pub fn consumers(&self) -> impl Iterator<Item = &Consumer> {
        self.consumers.values()
    }

    /// Merges `self` with `other`, with `other`'s entries overriding `self`'s
    /// under colliding keys (`mergeContracts`). Unlike within-one-contract
    /// assembly, cross-contract collisions are not an error — last writer
    /// wins, matching the ordering contract merge is documented to have.
    pub fn merged_with(mut self, other: Contract) -> Contract {
        self.exchanges.extend(other.exchanges);
        self.queues.extend(other.queues);
        self.bindings.extend(other.bindings);
        self.publishers.extend(other.publishers);
        self.consumers.extend(other.consumers);
        self
    }
}

/// Assembles a [`Contract`], enforcing every invariant in this crate's data
/// model as resources are added, and auto-extracting/synthesizing derived
/// resources (wait queues, DLX bindings) along the way.
#[derive(Debug, Default)]
pub struct ContractAssembler {
    exchanges: BTreeMap<String, Exchange>,
    queues: BTreeMap<String, Queue>,
    bindings: BTreeMap<String, Binding>,
    publishers: BTreeMap<String, Publisher>,
    consumers: BTreeMap<String, Consumer>,
}

impl ContractAssembler {
    /// Starts a new, empty assembler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a standalone exchange (invariant 8: no duplicate key with a
    /// conflicting definition).
    pub fn with_exchange(mut self, exchange: Exchange) -> Result<Self, ContractValidationError> {
        self.register_exchange(exchange)?;
        Ok(self)
    }

    /// Registers a standalone queue (invariants 5, 6, 7, 8), synthesizing
    /// TTL-backoff wait-queue infrastructure as needed.
    pub fn with_queue(mut self, queue: Queue) -> Result<Self, ContractValidationError> {
        self.register_queue(queue)?;
        Ok(self)
    }

    /// Registers an explicit binding under `key` (invariants 3, 4, 8).
    pub fn with_binding(
        mut self,
        key: impl Into<String>,
        binding: Binding,
    ) -> Result<Self, ContractValidationError> {
        self.register_binding(key.into(), binding)?;
        Ok(self)
    }

    /// Registers a publisher, auto-extracting its exchange (invariants 1, 8).
    pub fn with_publisher(mut self, publisher: Publisher) -> Result<Self, ContractValidationError> {
        self.register_publisher(publisher)?;
        Ok(self)
    }

    /// Registers a consumer, auto-extracting its queue (invariants 2, 8),
    /// plus the queue-level invariants 5, 6, 7 for that queue.
    pub fn with_consumer(mut self, consumer: Consumer) -> Result<Self, ContractValidationError> {
        self.register_consumer(consumer)?;
        Ok(self)
    }

    /// Finishes assembly, returning the immutable [`Contract`].
    pub fn assemble(self) -> Result<Contract, ContractValidationError> {
        Ok(Contract {
            exchanges: self.exchanges,
            queues: self.queues,
            bindings: self.bindings,
            publishers: self.publishers,
            consumers: self.consumers,
        })
    }

    // --- internal, mutable-in-place helpers shared with the builder module ---

    pub(crate) fn register_exchange(&mut self, exchange: Exchange) -> Result<(), ContractValidationError> {
        match self.exchanges.get(&exchange.name) {
            Some(existing) if existing != &exchange => Err(ContractValidationError::DuplicateKey {
                map: "exchanges",
                key: exchange.name.clone(),
            }),
            _ => {
                self.exchanges.insert(exchange.name.clone(), exchange);
                Ok(())
            }
        }
    }

    pub(crate) fn register_queue(&mut self, queue: Queue) -> Result<(), ContractValidationError> {
        if let Some(max_priority) = queue.max_priority {
            if !(1..=255).contains(&max_priority) {
                return Err(ContractValidationError::InvalidMaxPriority {
                    queue: queue.name.clone(),
                    value: max_priority,
                });
            }
        }

        match &queue.retry {
            RetryPolicy::QuorumNative => {
                if queue.kind != crate::model::QueueKind::Quorum {
                    return Err(ContractValidationError::QuorumNativeRequiresQuorumType {
                        queue: queue.name.clone(),
                    });
                }

                match queue.delivery_limit {
                    Some(limit) if limit > 0 => {}
                    _ => {
                        return Err(ContractValidationError::QuorumNativeRequiresDeliveryLimit {
                            queue: queue.name.clone(),
                        });
                    }
                }
            }
            RetryPolicy::TtlBackoff { .. } => {
                if queue.dead_letter.is_none() {
                    return Err(ContractValidationError::TtlBackoffRequiresDeadLetter {
                        queue: queue.name.clone(),
                    });
                }
            }
        }

        let needs_wait_infrastructure =
            matches!(queue.retry, RetryPolicy::TtlBackoff { .. }) && queue.dead_letter.is_some();

        match self.queues.get(&queue.name) {
            Some(existing) if existing != &queue => {
                return Err(ContractValidationError::DuplicateKey {
                    map: "queues",
                    key: queue.name.clone(),
                });
            }
            _ => {
                self.queues.insert(queue.name.clone(), queue.clone());
            }
        }

        if needs_wait_infrastructure {
            self.synthesize_ttl_backoff_infrastructure(&queue)?;
        }

        Ok(())
    }

    fn synthesize_ttl_backoff_infrastructure(&mut self, queue: &Queue) -> Result<(), ContractValidationError> {
        let dead_letter = queue
            .dead_letter
            .as_ref()
            .expect("checked by caller: ttl-backoff queue has dead_letter set");

        // Ensure the DLX itself exists; synthesize a plain direct exchange
        // when the caller hasn't declared one explicitly.
        if !self.exchanges.contains_key(dead_letter.exchange()) {
            self.register_exchange(Exchange::builder(dead_letter.exchange(), ExchangeKind::Direct).build())?;
        }

        let wait_queue_name = queue.wait_queue_name();

        if !self.queues.contains_key(&wait_queue_name) {
            let wait_queue = Queue::builder(&wait_queue_name)
                .with_kind(queue.kind)
                .with_durable(queue.durable)
                .with_dead_letter(DeadLetter::with_routing_key(dead_letter.exchange(), &queue.name))
                .with_retry(RetryPolicy::QuorumNative)
                .build();

            // The wait queue never itself retries (it only ever holds a
            // message until its TTL expires), so it's registered directly
            // rather than through `register_queue`'s retry-mode checks; its
            // `RetryPolicy::QuorumNative` tag is inert bookkeeping, not an
            // active retry strategy, since nothing ever nacks it.
            self.queues.insert(wait_queue_name.clone(), wait_queue);
        }

        let wait_binding_key = format!("{}WaitBinding", queue.name);
        if !self.bindings.contains_key(&wait_binding_key) {
            self.register_binding(
                wait_binding_key,
                Binding::queue_binding(
                    wait_queue_name.clone(),
                    dead_letter.exchange(),
                    Some(wait_queue_name.clone()),
                ),
            )?;
        }

        let retry_binding_key = format!("{}RetryBinding", queue.name);
        if !self.bindings.contains_key(&retry_binding_key) {
            self.register_binding(
                retry_binding_key,
                Binding::queue_binding(queue.name.clone(), dead_letter.exchange(), Some(queue.name.clone())),
            )?;
        }

        Ok(())
    }

    pub(crate) fn register_binding(
        &mut self,
        key: String,
        binding: Binding,
    ) -> Result<(), ContractValidationError> {
        match &binding {
            Binding::QueueBinding {
                queue,
                exchange,
                routing_key,
                ..
            } => {
                if !self.queues.contains_key(queue) {
                    return Err(ContractValidationError::UnknownQueue {
                        referrer: key.clone(),
                        queue: queue.clone(),
                    });
                }

                let exchange_kind = self
                    .exchanges
                    .get(exchange)
                    .map(|e| e.kind)
                    .ok_or_else(|| ContractValidationError::UnknownExchange {
                        referrer: key.clone(),
                        exchange: exchange.clone(),
                    })?;

                if exchange_kind.requires_routing_key() && routing_key.is_none() {
                    return Err(ContractValidationError::MissingQueueBindingRoutingKey {
                        binding: key.clone(),
                        exchange: exchange.clone(),
                    });
                }
            }
            Binding::ExchangeBinding {
                source,
                destination,
                routing_key,
                ..
            } => {
                let source_kind = self
                    .exchanges
                    .get(source)
                    .map(|e| e.kind)
                    .ok_or_else(|| ContractValidationError::UnknownExchange {
                        referrer: key.clone(),
                        exchange: source.clone(),
                    })?;

                if !self.exchanges.contains_key(destination) {
                    return Err(ContractValidationError::UnknownExchange {
                        referrer: key.clone(),
                        exchange: destination.clone(),
                    });
                }

                if source_kind.requires_routing_key() && routing_key.is_none() {
                    return Err(ContractValidationError::MissingExchangeBindingRoutingKey {
                        binding: key.clone(),
                        source: source.clone(),
                    });
                }
            }
        }

        let destination_key = binding.destination_key();
        for (existing_key, existing_binding) in &self.bindings {
            if existing_key != &key && existing_binding.destination_key() == destination_key {
                let (kind, a, b, routing_key) = destination_key;
                return Err(ContractValidationError::DuplicateBindingDestination {
                    queue: if kind == "queue" { b.to_string() } else { a.to_string() },
                    exchange: if kind == "queue" { a.to_string() } else { b.to_string() },
                    routing_key: routing_key.to_string(),
                });
            }
        }

        match self.bindings.get(&key) {
            Some(existing) if existing != &binding => {
                return Err(ContractValidationError::DuplicateKey {
                    map: "bindings",
                    key,
                });
            }
            _ => {
                self.bindings.insert(key, binding);
            }
        }

        Ok(())
    }

    pub(crate) fn register_publisher(&mut self, publisher: Publisher) -> Result<(), ContractValidationError> {
        if publisher.exchange.kind.requires_routing_key() {
            match &publisher.routing_key {
                None => {
                    return Err(ContractValidationError::MissingRoutingKey {
                        publisher: publisher.name.clone(),
                        exchange: publisher.exchange.name.clone(),
                        kind: publisher.exchange.kind,
                    });
                }
                Some(routing_key) if routing_key.is_empty() || contains_wildcard(routing_key) => {
                    return Err(ContractValidationError::WildcardRoutingKey {
                        context: publisher.name.clone(),
                        routing_key: routing_key.clone(),
                    });
                }
                Some(_) => {}
            }
        }

        self.register_exchange(publisher.exchange.clone())?;

        if self.publishers.contains_key(&publisher.name) {
            return Err(ContractValidationError::DuplicateKey {
                map: "publishers",
                key: publisher.name.clone(),
            });
        }

        self.publishers.insert(publisher.name.clone(), publisher);
        Ok(())
    }

    pub(crate) fn register_consumer(&mut self, consumer: Consumer) -> Result<(), ContractValidationError> {
        self.register_queue(consumer.queue.clone())?;

        if self.consumers.contains_key(&consumer.name) {
            return Err(ContractValidationError::DuplicateKey {
                map: "consumers",
                key: consumer.name.clone(),
            });
        }

        self.consumers.insert(consumer.name.clone(), consumer);
        Ok(())
    }
}

fn contains_wildcard(routing_key: &str) -> bool {
    routing_key.contains('*') || routing_key.contains('#')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DeadLetter, ExchangeKind, MessageSchema, QueueKind};
    use crate::validator::NoopValidator;
    use pretty_assertions::assert_eq;

    fn message() -> MessageSchema {
        MessageSchema::new(NoopValidator).build()
    }

    #[test]
    fn publisher_on_topic_exchange_requires_concrete_routing_key() {
        // Given
        let exchange = Exchange::builder("orders", ExchangeKind::Topic).build();
        let publisher = Publisher::new("orderCreated", exchange, message(), None);

        // When
        let actual = Contract::builder().with_publisher(publisher);

        // Then
        assert!(matches!(
            actual,
            Err(ContractValidationError::MissingRoutingKey { .. })
        ));
    }

    #[test]
    fn publisher_with_wildcard_routing_key_is_rejected() {
        // Given
        let exchange = Exchange::builder("orders", ExchangeKind::Topic).build();
        let publisher = Publisher::new("orderCreated", exchange, message(), Some("order.*".into()));

        // When
        let actual = Contract::builder().with_publisher(publisher);

        // Then
        assert!(matches!(
            actual,
            Err(ContractValidationError::WildcardRoutingKey { .. })
        ));
    }

    #[test]
    fn fanout_publisher_does_not_require_routing_key() {
        // Given
        let exchange = Exchange::builder("broadcast", ExchangeKind::Fanout).build();
        let publisher = Publisher::new("announcement", exchange, message(), None);

        // When
        let actual = Contract::builder().with_publisher(publisher).unwrap().assemble();

        // Then
        assert!(actual.is_ok());
    }

    #[test]
    fn ttl_backoff_queue_without_dead_letter_is_rejected() {
        // Given
        let queue = Queue::builder("order-processing").build();

        // When
        let actual = Contract::builder().with_queue(queue);

        // Then
        assert!(matches!(
            actual,
            Err(ContractValidationError::TtlBackoffRequiresDeadLetter { .. })
        ));
    }

    #[test]
    fn ttl_backoff_queue_synthesizes_wait_queue_and_bindings() {
        // Given
        let queue = Queue::builder("order-processing")
            .with_dead_letter(DeadLetter::new("order-processing-dlx"))
            .build();

        // When
        let contract = Contract::builder().with_queue(queue).unwrap().assemble().unwrap();

        // Then
        assert!(contract.queue("order-processing-wait").is_some());
        assert!(contract.exchange("order-processing-dlx").is_some());
        assert!(contract.binding("order-processingWaitBinding").is_some());
        assert!(contract.binding("order-processingRetryBinding").is_some());
    }

    #[test]
    fn quorum_native_queue_requires_quorum_type_and_delivery_limit() {
        // Given
        let queue = Queue::builder("commands")
            .with_kind(QueueKind::Classic)
            .with_retry(RetryPolicy::QuorumNative)
            .with_delivery_limit(5)
            .build();

        // When
        let actual = Contract::builder().with_queue(queue);

        // Then
        assert!(matches!(
            actual,
            Err(ContractValidationError::QuorumNativeRequiresQuorumType { .. })
        ));
    }

    #[test]
    fn quorum_native_queue_without_delivery_limit_is_rejected() {
        // Given
        let queue = Queue::builder("commands")
            .with_kind(QueueKind::Quorum)
            .with_retry(RetryPolicy::QuorumNative)
            .build();

        // When
        let actual = Contract::builder().with_queue(queue);

        // Then
        assert!(matches!(
            actual,
            Err(ContractValidationError::QuorumNativeRequiresDeliveryLimit { .. })
        ));
    }

    #[test]
    fn out_of_range_max_priority_is_rejected() {
        // Given
        let queue = Queue::builder("priority-queue")
            .with_dead_letter(DeadLetter::new("dlx"))
            .with_max_priority(0)
            .build();

        // When
        let actual = Contract::builder().with_queue(queue);

        // Then
        assert!(matches!(
            actual,
            Err(ContractValidationError::InvalidMaxPriority { .. })
        ));
    }

    #[test]
    fn duplicate_exchange_key_with_conflicting_definition_is_rejected() {
        // Given
        let assembler = Contract::builder()
            .with_exchange(Exchange::builder("orders", ExchangeKind::Topic).build())
            .unwrap();

        // When
        let actual = assembler.with_exchange(Exchange::builder("orders", ExchangeKind::Direct).build());

        // Then
        assert!(matches!(
            actual,
            Err(ContractValidationError::DuplicateKey { map: "exchanges", .. })
        ));
    }

    #[test]
    fn duplicate_binding_destination_is_rejected() {
        // Given
        let assembler = Contract::builder()
            .with_exchange(Exchange::builder("orders", ExchangeKind::Topic).build())
            .unwrap()
            .with_queue(Queue::builder("order-processing").with_dead_letter(DeadLetter::new("dlx")).build())
            .unwrap()
            .with_binding(
                "orderCreatedBinding",
                Binding::queue_binding("order-processing", "orders", Some("order.created".into())),
            )
            .unwrap();

        // When
        let actual = assembler.with_binding(
            "duplicateBinding",
            Binding::queue_binding("order-processing", "orders", Some("order.created".into())),
        );

        // Then
        assert!(matches!(
            actual,
            Err(ContractValidationError::DuplicateBindingDestination { .. })
        ));
    }

    #[test]
    fn binding_to_unknown_queue_is_rejected() {
        // Given
        let assembler = Contract::builder()
            .with_exchange(Exchange::builder("orders", ExchangeKind::Topic).build())
            .unwrap();

        // When
        let actual = assembler.with_binding(
            "orderCreatedBinding",
            Binding::queue_binding("does-not-exist", "orders", Some("order.created".into())),
        );

        // Then
        assert!(matches!(actual, Err(ContractValidationError::UnknownQueue { .. })));
    }

    #[test]
    fn merge_lets_later_contract_override_earlier_one() {
        // Given
        let exchange_v1 = Exchange::builder("orders", ExchangeKind::Topic).build();
        let exchange_v2 = Exchange::builder("orders", ExchangeKind::Topic)
            .with_auto_delete(true)
            .build();
        let first = Contract::builder().with_exchange(exchange_v1).unwrap().assemble().unwrap();
        let second = Contract::builder().with_exchange(exchange_v2.clone()).unwrap().assemble().unwrap();

        // When
        let merged = first.merged_with(second);

        // Then
        assert_eq!(merged.exchange("orders"), Some(&exchange_v2));
    }
}
