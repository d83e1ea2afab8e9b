//! Exchanges: the routing nodes messages are published into.

use std::collections::BTreeMap;

/// The AMQP 0-9-1 exchange kinds this framework supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExchangeKind {
    /// Routes to every bound queue/exchange, ignoring the routing key.
    Fanout,
    /// Routes to bindings whose routing key exactly matches.
    Direct,
    /// Routes to bindings whose routing key pattern matches (`*`, `#`).
    Topic,
}

impl ExchangeKind {
    /// The literal AMQP exchange type string (`exchange.declare {kind}`).
    pub fn as_wire_str(&self) -> &'static str {
        match self {
            ExchangeKind::Fanout => "fanout",
            ExchangeKind::Direct => "direct",
            ExchangeKind::Topic => "topic",
        }
    }

    /// Whether a routing key is required for bindings against an exchange of
    /// this kind (fanout routing ignores the key entirely).
    pub fn requires_routing_key(&self) -> bool {
        !matches!(self, ExchangeKind::Fanout)
    }
}

/// A declared exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct Exchange {
    pub(crate) name: String,
    pub(crate) kind: ExchangeKind,
    pub(crate) durable: bool,
    pub(crate) auto_delete: bool,
    pub(crate) internal: bool,
    pub(crate) arguments: BTreeMap<String, serde_json::Value>,
}

impl Exchange {
    /// Starts building an exchange named `name` of the given `kind`.
    pub fn builder(name: impl Into<String>, kind: ExchangeKind) -> ExchangeBuilder {
        ExchangeBuilder::new(name, kind)
    }

    /// The exchange's name; also its identity within a [`Contract`](crate::model::Contract).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The exchange's kind.
    pub fn kind(&self) -> ExchangeKind {
        self.kind
    }

    /// Whether the exchange survives a broker restart.
    pub fn durable(&self) -> bool {
        self.durable
    }

    /// Whether the exchange is deleted once its last binding is removed.
    pub fn auto_delete(&self) -> bool {
        self.auto_delete
    }

    /// Whether the exchange only accepts bindings from other exchanges, not
    /// direct `basic.publish` calls.
    pub fn internal(&self) -> bool {
        self.internal
    }

    /// User-supplied `exchange.declare` arguments.
    pub fn arguments(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.arguments
    }
}

/// Builds an [`Exchange`] (`defineExchange`).
#[derive(Debug, Clone)]
pub struct ExchangeBuilder {
    name: String,
    kind: ExchangeKind,
    durable: bool,
    auto_delete: bool,
    internal: bool,
    arguments: BTreeMap<String, serde_json::Value>,
}

impl ExchangeBuilder {
    fn new(name: impl Into<String>, kind: ExchangeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            durable: true,
            auto_delete: false,
            internal: false,
            arguments: BTreeMap::new(),
        }
    }

    /// Overrides durability (`true` by default).
    pub fn with_durable(self, durable: bool) -> Self {
        Self { durable, ..self }
    }

    /// Overrides auto-delete (`false` by default).
    pub fn with_auto_delete(self, auto_delete: bool) -> Self {
        Self { auto_delete, ..self }
    }

    /// Marks the exchange internal (`false` by default).
    pub fn with_internal(self, internal: bool) -> Self {
        Self { internal, ..self }
    }

    /// Adds a user-supplied `exchange.declare` argument.
    pub fn with_argument(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.arguments.insert(key.into(), value.into());
        self
    }

    /// Builds the [`Exchange`].
    pub fn build(self) -> Exchange {
        Exchange {
            name: self.name,
            kind: self.kind,
            durable: self.durable,
            auto_delete: self.auto_delete,
            internal: self.internal,
            arguments: self.arguments,
        }
    }
}
