//! Queues and their retry policy.

use std::collections::BTreeMap;

/// The AMQP 0-9-1 queue types this framework supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueKind {
    /// The original, non-replicated queue type.
    Classic,
    /// The Raft-replicated queue type; required for `quorum-native` retry.
    Quorum,
}

impl QueueKind {
    /// The literal `x-queue-type` argument value.
    pub fn as_wire_str(&self) -> &'static str {
        match self {
            QueueKind::Classic => "classic",
            QueueKind::Quorum => "quorum",
        }
    }
}

/// Dead-letter routing for a queue: where rejected/expired messages go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetter {
    pub(crate) exchange: String,
    pub(crate) routing_key: Option<String>,
}

impl DeadLetter {
    /// Dead-letters to `exchange`, with no routing key override (the
    /// original routing key is reused).
    pub fn new(exchange: impl Into<String>) -> Self {
        Self {
            exchange: exchange.into(),
            routing_key: None,
        }
    }

    /// Dead-letters to `exchange` using `routing_key` instead of the
    /// original.
    pub fn with_routing_key(exchange: impl Into<String>, routing_key: impl Into<String>) -> Self {
        Self {
            exchange: exchange.into(),
            routing_key: Some(routing_key.into()),
        }
    }

    /// The dead-letter exchange name.
    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    /// The dead-letter routing key override, if any.
    pub fn routing_key(&self) -> Option<&str> {
        self.routing_key.as_deref()
    }
}

/// A queue's retry policy: how a failed delivery is redriven.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RetryPolicy {
    /// Relies on RabbitMQ's own `x-delivery-count`/`x-delivery-limit`
    /// machinery on a quorum queue.
    QuorumNative,
    /// Redrives failed deliveries through a synthesized wait queue with an
    /// exponential-backoff-with-jitter delay.
    TtlBackoff {
        /// Maximum number of redrives before a message goes to the DLQ.
        max_retries: u32,
        /// The delay before the first redrive, in milliseconds.
        initial_delay_ms: u64,
        /// The ceiling any computed delay is clamped to, in milliseconds.
        max_delay_ms: u64,
        /// The growth factor applied per retry count.
        backoff_multiplier: f64,
        /// Whether to multiply the computed delay by a uniform `[0.5, 1.0]`
        /// jitter factor.
        jitter: bool,
    },
}

impl RetryPolicy {
    /// The framework's default `ttl-backoff` policy, used by
    /// [`define_queue`](crate::builder::define_queue) when no retry override
    /// is supplied.
    pub fn default_ttl_backoff() -> Self {
        RetryPolicy::TtlBackoff {
            max_retries: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// A declared queue.
#[derive(Debug, Clone, PartialEq)]
pub struct Queue {
    pub(crate) name: String,
    pub(crate) kind: QueueKind,
    pub(crate) durable: bool,
    pub(crate) exclusive: bool,
    pub(crate) auto_delete: bool,
    pub(crate) delivery_limit: Option<u32>,
    pub(crate) dead_letter: Option<DeadLetter>,
    pub(crate) retry: RetryPolicy,
    pub(crate) max_priority: Option<u16>,
    pub(crate) arguments: BTreeMap<String, serde_json::Value>,
}

impl Queue {
    /// Starts building a queue named `name`.
    pub fn builder(name: impl Into<String>) -> QueueBuilder {
        QueueBuilder::new(name)
    }

    /// The queue's name; also its identity within a [`Contract`](crate::model::Contract).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The queue's type.
    pub fn kind(&self) -> QueueKind {
        self.kind
    }

    /// Whether the queue survives a broker restart.
    pub fn durable(&self) -> bool {
        self.durable
    }

    /// Whether the queue is restricted to its declaring connection.
    pub fn exclusive(&self) -> bool {
        self.exclusive
    }

    /// Whether the queue is deleted once its last consumer disconnects.
    pub fn auto_delete(&self) -> bool {
        self.auto_delete
    }

    /// The `x-delivery-limit` for `quorum-native` retry, if set.
    pub fn delivery_limit(&self) -> Option<u32> {
        self.delivery_limit
    }

    /// The dead-letter configuration, if set.
    pub fn dead_letter(&self) -> Option<&DeadLetter> {
        self.dead_letter.as_ref()
    }

    /// The retry policy.
    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    /// The `x-max-priority` argument, if set.
    pub fn max_priority(&self) -> Option<u16> {
        self.max_priority
    }

    /// User-supplied `queue.declare` arguments, merged last behind the
    /// framework's own derived arguments.
    pub fn arguments(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.arguments
    }

    /// The name of this queue's synthesized TTL-backoff wait queue.
    pub fn wait_queue_name(&self) -> String {
        format!("{}-wait", self.name)
    }
}

/// Builds a [`Queue`] (`defineQueue`/`defineQuorumQueue`/`defineTtlBackoffQueue`).
#[derive(Debug, Clone)]
pub struct QueueBuilder {
    name: String,
    kind: QueueKind,
    durable: bool,
    exclusive: bool,
    auto_delete: bool,
    delivery_limit: Option<u32>,
    dead_letter: Option<DeadLetter>,
    retry: RetryPolicy,
    max_priority: Option<u16>,
    arguments: BTreeMap<String, serde_json::Value>,
}

impl QueueBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: QueueKind::Quorum,
            durable: true,
            exclusive: false,
            auto_delete: false,
            delivery_limit: None,
            dead_letter: None,
            retry: RetryPolicy::default_ttl_backoff(),
            max_priority: None,
            arguments: BTreeMap::new(),
        }
    }

    /// Overrides the queue type (`quorum` by default).
    pub fn with_kind(self, kind: QueueKind) -> Self {
        Self { kind, ..self }
    }

    /// Overrides durability (`true` by default).
    pub fn with_durable(self, durable: bool) -> Self {
        Self { durable, ..self }
    }

    /// Marks the queue exclusive (`false` by default).
    pub fn with_exclusive(self, exclusive: bool) -> Self {
        Self { exclusive, ..self }
    }

    /// Overrides auto-delete (`false` by default).
    pub fn with_auto_delete(self, auto_delete: bool) -> Self {
        Self { auto_delete, ..self }
    }

    /// Sets the `x-delivery-limit`, required for `quorum-native` retry.
    pub fn with_delivery_limit(self, delivery_limit: u32) -> Self {
        Self {
            delivery_limit: Some(delivery_limit),
            ..self
        }
    }

    /// Sets the dead-letter configuration.
    pub fn with_dead_letter(self, dead_letter: DeadLetter) -> Self {
        Self {
            dead_letter: Some(dead_letter),
            ..self
        }
    }

    /// Overrides the retry policy (`ttl-backoff` with framework defaults by
    /// default).
    pub fn with_retry(self, retry: RetryPolicy) -> Self {
        Self { retry, ..self }
    }

    /// Sets `x-max-priority`; must end up in `[1, 255]`, checked at contract
    /// assembly time.
    pub fn with_max_priority(self, max_priority: u16) -> Self {
        Self {
            max_priority: Some(max_priority),
            ..self
        }
    }

    /// Adds a user-supplied `queue.declare` argument.
    pub fn with_argument(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.arguments.insert(key.into(), value.into());
        self
    }

    /// Builds the [`Queue`].
    pub fn build(self) -> Queue {
        Queue {
            name: self.name,
            kind: self.kind,
            durable: self.durable,
            exclusive: self.exclusive,
            auto_delete: self.auto_delete,
            delivery_limit: self.delivery_limit,
            dead_letter: self.dead_letter,
            retry: self.retry,
            max_priority: self.max_priority,
            arguments: self.arguments,
        }
    }
}
