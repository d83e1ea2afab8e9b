//! Consumers: the handlers a worker dispatches deliveries to.

use crate::model::{MessageSchema, Queue};

/// A consumer: a named binding of a message schema to a queue.
#[derive(Debug, Clone)]
pub struct Consumer {
    pub(crate) name: String,
    pub(crate) queue: Queue,
    pub(crate) message: MessageSchema,
    /// The consumer's desired prefetch; the worker uses the maximum across
    /// all its consumers, since AMQP 0-9-1 prefetch is per-channel.
    pub(crate) prefetch: Option<u16>,
}

impl Consumer {
    /// Defines a plain consumer (`defineConsumer`).
    pub fn new(name: impl Into<String>, queue: Queue, message: MessageSchema) -> Self {
        Self {
            name: name.into(),
            queue,
            message,
            prefetch: None,
        }
    }

    /// Overrides this consumer's desired prefetch.
    pub fn with_prefetch(self, prefetch: u16) -> Self {
        Self {
            prefetch: Some(prefetch),
            ..self
        }
    }

    /// The consumer's contract key.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The queue this consumer reads from.
    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    /// The message schema this consumer validates against.
    pub fn message(&self) -> &MessageSchema {
        &self.message
    }

    /// This consumer's desired prefetch, if set.
    pub fn prefetch(&self) -> Option<u16> {
        self.prefetch
    }
}
