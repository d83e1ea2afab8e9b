//! The retry engine: classifies a failed delivery and redrives it through a
//! synthesized wait queue (`ttl-backoff`), lets the broker redrive it
//! natively (`quorum-native`), or dead-letters it outright.

mod engine;
mod headers;

pub use engine::{compute_delay, RetryEngine};
