//! `defineQueue`, `defineQuorumQueue`, `defineTtlBackoffQueue`: the intent-
//! level queue constructors. The wait queue and its two DLX bindings that
//! `defineTtlBackoffQueue` is documented as returning a bundle of are not
//! built here — [`ContractAssembler`](crate::model::ContractAssembler)
//! synthesizes them automatically the moment the returned [`Queue`] is
//! registered, so a plain `Queue` is all a caller ever needs to hold.

use crate::model::{DeadLetter, Queue, QueueKind, RetryPolicy};

/// Options shared by the three queue constructors; fields a given
/// constructor doesn't use are simply ignored.
#[derive(Debug, Clone, Default)]
pub struct QueueOptions {
    /// Whether the queue survives a broker restart. Defaults to `true`.
    pub durable: Option<bool>,
    /// Whether the queue is scoped to a single connection.
    pub exclusive: bool,
    /// Whether the queue is deleted once its last consumer cancels.
    pub auto_delete: bool,
    /// `x-max-priority`, must fall in `[1, 255]` once assembled.
    pub max_priority: Option<u16>,
    /// Extra, unvalidated `queue.declare` arguments.
    pub arguments: Vec<(String, serde_json::Value)>,
}

fn apply_common(mut builder: crate::model::QueueBuilder, opts: &QueueOptions) -> crate::model::QueueBuilder {
    if let Some(durable) = opts.durable {
        builder = builder.with_durable(durable);
    }
    builder = builder.with_exclusive(opts.exclusive).with_auto_delete(opts.auto_delete);
    if let Some(max_priority) = opts.max_priority {
        builder = builder.with_max_priority(max_priority);
    }
    for (key, value) in &opts.arguments {
        builder = builder.with_argument(key.clone(), value.clone());
    }
    builder
}

/// Defines a queue with the crate's default retry posture: `quorum` type,
/// `ttl-backoff` retry with the standard defaults. If `dead_letter` is
/// `None`, assembling a contract with this queue fails — `ttl-backoff`
/// requires one.
pub fn define_queue(name: impl Into<String>, dead_letter: Option<DeadLetter>, opts: QueueOptions) -> Queue {
    let mut builder = apply_common(Queue::builder(name), &opts).with_kind(QueueKind::Quorum);

    if let Some(dead_letter) = dead_letter {
        builder = builder.with_dead_letter(dead_letter);
    }

    builder.build()
}

/// Defines a queue that relies on RabbitMQ's native `x-delivery-count` /
/// `x-delivery-limit` retry accounting instead of the wait-queue dance.
/// `delivery_limit` must be positive; assembly rejects zero or an absent
/// value.
pub fn define_quorum_queue(
    name: impl Into<String>,
    dead_letter: DeadLetter,
    delivery_limit: u32,
    opts: QueueOptions,
) -> Queue {
    apply_common(Queue::builder(name), &opts)
        .with_kind(QueueKind::Quorum)
        .with_retry(RetryPolicy::QuorumNative)
        .with_delivery_limit(delivery_limit)
        .with_dead_letter(dead_letter)
        .build()
}

/// Defines a queue using the custom TTL-backoff wait-queue retry strategy,
/// optionally overriding its timing.
pub fn define_ttl_backoff_queue(
    name: impl Into<String>,
    dead_letter: DeadLetter,
    retry: Option<RetryPolicy>,
    opts: QueueOptions,
) -> Queue {
    apply_common(Queue::builder(name), &opts)
        .with_dead_letter(dead_letter)
        .with_retry(retry.unwrap_or_else(RetryPolicy::default_ttl_backoff))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn define_queue_defaults_to_ttl_backoff() {
        // Given / When
        let queue = define_queue("orders", Some(DeadLetter::new("orders-dlx")), QueueOptions::default());

        // Then
        assert!(matches!(queue.retry(), RetryPolicy::TtlBackoff { .. }));
        assert_eq!(queue.kind(), QueueKind::Quorum);
    }

    #[test]
    fn define_quorum_queue_forces_quorum_native() {
        // Given / When
        let queue = define_quorum_queue("orders", DeadLetter::new("orders-dlx"), 5, QueueOptions::default());

        // Then
        assert_eq!(queue.retry(), &RetryPolicy::QuorumNative);
        assert_eq!(queue.delivery_limit(), Some(5));
    }

    #[test]
    fn define_ttl_backoff_queue_honors_retry_override() {
        // Given
        let retry = RetryPolicy::TtlBackoff {
            max_retries: 1,
            initial_delay_ms: 500,
            max_delay_ms: 500,
            backoff_multiplier: 1.0,
            jitter: false,
        };

        // When
        let queue = define_ttl_backoff_queue("orders", DeadLetter::new("orders-dlx"), Some(retry.clone()), QueueOptions::default());

        // Then
        assert_eq!(queue.retry(), &retry);
    }
}
