//! The worker side: registers one consumer per contract consumer, validates
//! and dispatches each delivery to a handler, and acks, dead-letters, or
//! redrives the delivery depending on the outcome.

mod handler;
mod pipeline;

pub use handler::{DeliveredMessage, FallibleHandler, Handler};
pub use pipeline::{PrefetchSetupHook, Worker, WorkerBuilder, WorkerStartError};
