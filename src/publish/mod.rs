//! The publish side: `publish(publisherName, payload, options) → Result<(), PublishError>`.
//!
//! [`Publishers`] resolves a publisher by name against a [`Contract`](crate::model::Contract),
//! validates the payload, optionally compresses it, and hands it to a
//! [`Gateway`](crate::connection::Gateway)-acquired channel.

mod compression;
mod pipeline;

pub use compression::Compression;
pub use pipeline::{PublishOptions, Publishers};
