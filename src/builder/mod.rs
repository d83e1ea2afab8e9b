//! The builder algebra: lets a caller declare *intent* (an event; a command;
//! a queue with retry; a bridged consumer) and produce a [`Contract`] with
//! every derived resource — wait queues, DLX bindings, bridge bindings —
//! filled in automatically.
//!
//! [`define_contract`] is the entry point; the `define_*` free functions in
//! [`queue`], [`event`], and [`command`] build the intent-level bundles it
//! assembles.

mod bridge;
mod command;
mod event;
mod queue;

pub use command::{define_command_consumer, define_command_publisher, CommandConfig, CommandConsumerBundle, CommandPublisherBundle};
pub use event::{define_event_consumer, define_event_publisher, EventConsumerBundle, EventConsumerOptions, EventPublisherBundle};
pub use queue::{define_quorum_queue, define_queue, define_ttl_backoff_queue, QueueOptions};

use crate::error::ContractValidationError;
use crate::model::{Binding, Contract, ContractAssembler, Exchange, Queue};

/// Starts assembling a contract from intent-level bundles (`defineContract`).
pub fn define_contract() -> ContractBuilder {
    ContractBuilder::new()
}

/// Accumulates bundles produced by the `define_*` functions into an
/// assembled [`Contract`], auto-extracting each bundle's embedded resources
/// and naming the bindings it derives the way the bundle-level functions are
/// documented to: `${consumerName}Binding`, `${consumerName}ExchangeBinding`,
/// `${publisherName}ExchangeBinding`.
#[derive(Debug, Default)]
pub struct ContractBuilder {
    assembler: ContractAssembler,
}

impl ContractBuilder {
    /// Starts a new, empty builder.
    pub fn new() -> Self {
        Self {
            assembler: Contract::builder(),
        }
    }

    /// Registers a standalone exchange, e.g. a command's home exchange that
    /// no bundle here owns outright.
    pub fn with_exchange(mut self, exchange: Exchange) -> Result<Self, ContractValidationError> {
        self.assembler = self.assembler.with_exchange(exchange)?;
        Ok(self)
    }

    /// Registers a standalone queue.
    pub fn with_queue(mut self, queue: Queue) -> Result<Self, ContractValidationError> {
        self.assembler = self.assembler.with_queue(queue)?;
        Ok(self)
    }

    /// Registers an explicit binding under `key`.
    pub fn with_binding(mut self, key: impl Into<String>, binding: Binding) -> Result<Self, ContractValidationError> {
        self.assembler = self.assembler.with_binding(key, binding)?;
        Ok(self)
    }

    /// Registers an event publisher bundle.
    pub fn with_event_publisher(mut self, bundle: EventPublisherBundle) -> Result<Self, ContractValidationError> {
        self.assembler = self.assembler.with_publisher(bundle.publisher)?;
        Ok(self)
    }

    /// Registers an event consumer bundle, naming its queue-binding
    /// `${consumerName}Binding` and, when bridged, its exchange-binding
    /// `${consumerName}ExchangeBinding`.
    pub fn with_event_consumer(mut self, bundle: EventConsumerBundle) -> Result<Self, ContractValidationError> {
        let name = bundle.consumer.name().to_string();

        self.assembler = self.assembler.with_consumer(bundle.consumer)?;

        if let Some(bridge_exchange) = bundle.bridge_exchange {
            self.assembler = self.assembler.with_exchange(bridge_exchange)?;
        }

        self.assembler = self.assembler.with_binding(format!("{name}Binding"), bundle.queue_binding)?;

        if let Some(exchange_binding) = bundle.exchange_binding {
            self.assembler = self.assembler.with_binding(format!("{name}ExchangeBinding"), exchange_binding)?;
        }

        Ok(self)
    }

    /// Registers a command consumer bundle, naming its queue-binding
    /// `${consumerName}Binding`. The command's home exchange is not
    /// registered here — register it once via [`Self::with_exchange`],
    /// since multiple command consumers and publishers typically share it.
    pub fn with_command_consumer(mut self, bundle: CommandConsumerBundle) -> Result<Self, ContractValidationError> {
        let name = bundle.consumer.name().to_string();

        self.assembler = self.assembler.with_consumer(bundle.consumer)?;
        self.assembler = self.assembler.with_binding(format!("{name}Binding"), bundle.queue_binding)?;

        Ok(self)
    }

    /// Registers a command publisher bundle, naming its exchange-binding
    /// (when bridged) `${publisherName}ExchangeBinding`. When bridged, the
    /// publisher's bridge exchange is auto-extracted; the command's home
    /// exchange referenced by the exchange-binding is not — register it
    /// once via [`Self::with_exchange`].
    pub fn with_command_publisher(mut self, bundle: CommandPublisherBundle) -> Result<Self, ContractValidationError> {
        let name = bundle.publisher.name().to_string();

        self.assembler = self.assembler.with_publisher(bundle.publisher)?;

        if let Some(exchange_binding) = bundle.exchange_binding {
            self.assembler = self.assembler.with_binding(format!("{name}ExchangeBinding"), exchange_binding)?;
        }

        Ok(self)
    }

    /// Finishes assembly, returning the immutable [`Contract`].
    pub fn assemble(self) -> Result<Contract, ContractValidationError> {
        self.assembler.assemble()
    }
}
