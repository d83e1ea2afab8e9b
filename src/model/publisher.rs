//! Publishers: the typed entry points `publish` accepts a name for.

use crate::model::{Exchange, MessageSchema};

/// A publisher: a named binding of a message schema to an exchange and an
/// (optional, exchange-kind-dependent) routing key.
#[derive(Debug, Clone)]
pub struct Publisher {
    pub(crate) name: String,
    pub(crate) exchange: Exchange,
    pub(crate) message: MessageSchema,
    pub(crate) routing_key: Option<String>,
}

impl Publisher {
    /// Defines a plain publisher (`definePublisher`).
    pub fn new(
        name: impl Into<String>,
        exchange: Exchange,
        message: MessageSchema,
        routing_key: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            exchange,
            message,
            routing_key,
        }
    }

    /// The publisher's contract key.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The exchange this publisher targets.
    pub fn exchange(&self) -> &Exchange {
        &self.exchange
    }

    /// The message schema this publisher validates against.
    pub fn message(&self) -> &MessageSchema {
        &self.message
    }

    /// The routing key, required unless `exchange`'s kind is `fanout`.
    pub fn routing_key(&self) -> Option<&str> {
        self.routing_key.as_deref()
    }
}
