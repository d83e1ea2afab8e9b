//! Error taxonomy shared across the contract, topology, connection, publish,
//! and worker subsystems. One enum per failure domain, each surfaced at the
//! boundary where its errors actually originate.

use crate::model::ExchangeKind;
use thiserror::Error;

/// Raised when a [`Contract`](crate::model::Contract) is assembled from
/// builder bundles that violate one of the invariants enforced at assembly
/// time (duplicate keys, dangling references, malformed routing keys, …).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContractValidationError {
    /// A binding (or bridged publisher/consumer) refers to an exchange that
    /// was never registered, either directly or by auto-extraction from a
    /// publisher.
    #[error("'{referrer}' refers to unknown exchange '{exchange}'")]
    UnknownExchange {
        /// What referred to the missing exchange (a binding or contract key).
        referrer: String,
        /// The exchange name it referred to.
        exchange: String,
    },

    /// A binding refers to a queue that was never registered, either
    /// directly or by auto-extraction from a consumer.
    #[error("'{referrer}' refers to unknown queue '{queue}'")]
    UnknownQueue {
        /// What referred to the missing queue (a binding or contract key).
        referrer: String,
        /// The queue name it referred to.
        queue: String,
    },

    /// A publisher targets a non-fanout exchange without a concrete routing key.
    #[error(
        "publisher '{publisher}' targets exchange '{exchange}' of kind {kind:?}, which requires a non-empty, wildcard-free routing key"
    )]
    MissingRoutingKey {
        /// The offending publisher's contract key.
        publisher: String,
        /// The exchange name.
        exchange: String,
        /// The exchange kind.
        kind: ExchangeKind,
    },

    /// A routing key for a non-fanout binding contains an AMQP wildcard
    /// (`*` or `#`) where a concrete key is required.
    #[error("routing key '{routing_key}' for '{context}' contains a wildcard but a concrete key is required")]
    WildcardRoutingKey {
        /// Human-readable context (publisher or binding name).
        context: String,
        /// The offending routing key.
        routing_key: String,
    },

    /// A queue-binding is missing a routing key required by its exchange kind.
    #[error("queue-binding '{binding}' requires a routing key because exchange '{exchange}' is not a fanout exchange")]
    MissingQueueBindingRoutingKey {
        /// The binding's contract key.
        binding: String,
        /// The exchange name.
        exchange: String,
    },

    /// An exchange-binding is missing a routing key required by its source kind.
    #[error("exchange-binding '{binding}' requires a routing key because source exchange '{source}' is not a fanout exchange")]
    MissingExchangeBindingRoutingKey {
        /// The binding's contract key.
        binding: String,
        /// The source exchange name.
        source: String,
    },

    /// A `ttl-backoff` queue is missing the dead-letter configuration its
    /// retry mode requires.
    #[error("queue '{queue}' declares ttl-backoff retry but has no dead-letter exchange configured")]
    TtlBackoffRequiresDeadLetter {
        /// The offending queue's name.
        queue: String,
    },

    /// A `quorum-native` queue is not actually a quorum queue.
    #[error("queue '{queue}' declares quorum-native retry but is not a quorum queue")]
    QuorumNativeRequiresQuorumType {
        /// The offending queue's name.
        queue: String,
    },

    /// A `quorum-native` queue is missing the positive delivery limit its
    /// retry mode requires.
    #[error("queue '{queue}' declares quorum-native retry but has no positive delivery limit")]
    QuorumNativeRequiresDeliveryLimit {
        /// The offending queue's name.
        queue: String,
    },

    /// A queue's `maxPriority` falls outside `[1, 255]`.
    #[error("queue '{queue}' has max_priority {value}, expected a value in [1, 255]")]
    InvalidMaxPriority {
        /// The offending queue's name.
        queue: String,
        /// The out-of-range value.
        value: u16,
    },

    /// Two resources were registered under the same contract key.
    #[error("duplicate contract key '{key}' in map '{map}'")]
    DuplicateKey {
        /// The map that saw the collision (`exchanges`, `queues`, `bindings`, …).
        map: &'static str,
        /// The colliding key.
        key: String,
    },

    /// Two bindings were registered for the same (queue, exchange, routing key).
    #[error(
        "duplicate binding: queue '{queue}' is already bound to exchange '{exchange}' with routing key '{routing_key}'"
    )]
    DuplicateBindingDestination {
        /// The queue name.
        queue: String,
        /// The exchange name.
        exchange: String,
        /// The shared routing key (empty string for fanout).
        routing_key: String,
    },

    /// A bridged consumer's bridge exchange kind is incompatible with the
    /// source exchange kind (fanout cannot bridge to non-fanout and vice
    /// versa; direct/topic sources require a direct or topic bridge).
    #[error(
        "bridge exchange '{bridge}' of kind {bridge_kind:?} is incompatible with source exchange '{source}' of kind {source_kind:?}"
    )]
    IncompatibleBridgeKind {
        /// The source exchange name.
        source: String,
        /// The source exchange kind.
        source_kind: ExchangeKind,
        /// The bridge exchange name.
        bridge: String,
        /// The bridge exchange kind.
        bridge_kind: ExchangeKind,
    },
}

/// Raised when [topology synthesis](crate::topology) fails to issue one or
/// more of the idempotent broker declarations for a given phase.
#[derive(Error, Debug)]
#[error("topology synthesis failed in phase '{phase}': {} of {} declarations failed", causes.len(), attempted)]
pub struct TopologyError {
    /// The phase in which the failures occurred (`exchanges`, `queues`,
    /// `queue-bindings`, `exchange-bindings`).
    pub phase: &'static str,
    /// How many declarations were attempted in this phase.
    pub attempted: usize,
    /// The individual failures, one per failed declaration.
    pub causes: Vec<TechnicalError>,
}

/// Catch-all for infrastructural failures: connect, channel close,
/// publish-buffer-full, topology declare, and similar conditions that are not
/// a validation failure.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct TechnicalError {
    /// A human-readable explanation.
    pub message: String,
    /// The underlying cause, if any.
    #[source]
    pub cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl TechnicalError {
    /// Creates a new [`TechnicalError`] with no underlying cause.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            cause: None,
        }
    }

    /// Creates a new [`TechnicalError`] wrapping the given cause.
    pub fn wrap(
        message: impl Into<String>,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            cause: Some(Box::new(cause)),
        }
    }
}

/// The issues reported by a [`Validator`](crate::validator::Validator) when a
/// raw value fails to validate.
pub type Issues = Vec<String>;

/// Raised synchronously by [`publish`](crate::publish::Publishers::publish)
/// when the payload or headers fail validation; surfaced to the caller,
/// never retried, never leaves the process.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("message validation failed for '{which}': {issues:?}")]
pub struct MessageValidationError {
    /// What was being validated (`"payload"` or `"headers"`, prefixed with
    /// the publisher/consumer name).
    pub which: String,
    /// The issues reported by the validator.
    pub issues: Issues,
}

/// The error returned by the [publish pipeline](crate::publish).
#[derive(Error, Debug)]
pub enum PublishError {
    /// The payload or headers failed validation.
    #[error(transparent)]
    Validation(#[from] MessageValidationError),

    /// An infrastructural failure occurred while publishing.
    #[error(transparent)]
    Technical(#[from] TechnicalError),
}

/// Raised at [worker](crate::worker) construction time when the handler map
/// doesn't cover every consumer in the contract, or the contract itself
/// fails validation. These are programmer errors, not delivery-time errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkerBuildError {
    /// A consumer in the contract has no matching handler.
    #[error("no handler registered for consumer '{consumer}'")]
    MissingHandler {
        /// The consumer's contract key.
        consumer: String,
    },

    /// A handler was registered for a name that isn't a consumer in the contract.
    #[error("handler registered for unknown consumer '{consumer}'")]
    UnknownConsumer {
        /// The handler's target name.
        consumer: String,
    },
}

/// The error a handler may return; `NonRetryable` bypasses the retry engine
/// entirely and goes straight to the dead-letter queue.
#[derive(Error, Debug)]
pub enum HandlerError {
    /// The handler determined the message can never succeed; skip retries.
    #[error("non-retryable handler error: {0}")]
    NonRetryable(String),

    /// Any other handler failure; dispatched to the retry engine.
    #[error("handler error: {0}")]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl HandlerError {
    /// Wraps an arbitrary error as a retryable [`HandlerError::Other`].
    pub fn other(cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Other(Box::new(cause))
    }

    /// Reports whether this error is [`NonRetryable`](HandlerError::NonRetryable).
    pub fn is_non_retryable(&self) -> bool {
        matches!(self, Self::NonRetryable(_))
    }
}
