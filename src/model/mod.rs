//! The contract's data model: exchanges, queues, bindings, message schemas,
//! publishers, consumers, and the assembled [`Contract`] itself.

mod binding;
mod consumer;
mod contract;
mod exchange;
mod message;
mod publisher;
mod queue;

pub use binding::Binding;
pub use consumer::Consumer;
pub use contract::{Contract, ContractAssembler};
pub use exchange::{Exchange, ExchangeBuilder, ExchangeKind};
pub use message::{MessageSchema, MessageSchemaBuilder};
pub use publisher::Publisher;
pub use queue::{DeadLetter, Queue, QueueBuilder, QueueKind, RetryPolicy};
