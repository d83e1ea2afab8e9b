//! The [`Validator`] capability: the single trait boundary between this
//! crate and whichever schema library the user chooses. The core never
//! depends on a concrete schema runtime — it depends on this trait.

use crate::error::Issues;
use async_trait::async_trait;
use std::fmt::Debug;

/// Given a raw value, either returns the typed value `T` or a list of
/// validation issues. Implementations may be synchronous (wrap the `Ok`/`Err`
/// in a completed future) or perform asynchronous work (e.g. a remote schema
/// registry lookup); both are honored by the publish and worker pipelines.
#[async_trait]
pub trait Validator<T>: Send + Sync {
    /// Validates `raw`, producing either the typed value or a list of
    /// human-readable issues.
    async fn validate(&self, raw: serde_json::Value) -> Result<T, Issues>;
}

/// A [`Validator`] that defers to [`serde_json`]'s own `Deserialize`
/// implementation and reports the single resulting error as one issue.
///
/// This is a convenience implementation for the common case where a plain
/// `#[derive(Deserialize)]` struct is an adequate schema; richer schema
/// runtimes can implement [`Validator`] directly for arbitrarily rich
/// validation.
pub struct SerdeValidator<T> {
    _marker: std::marker::PhantomData<fn() -> T>,
}

impl<T> SerdeValidator<T> {
    /// Creates a new [`SerdeValidator`] for `T`.
    pub fn new() -> Self {
        Self {
            _marker: std::marker::PhantomData,
        }
    }
}

impl<T> Default for SerdeValidator<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T> Validator<T> for SerdeValidator<T>
where
    T: for<'de> serde::Deserialize<'de> + Send + Sync,
{
    async fn validate(&self, raw: serde_json::Value) -> Result<T, Issues> {
        serde_json::from_value(raw).map_err(|error| vec![error.to_string()])
    }
}

/// A [`Validator`] that always succeeds, handing the raw JSON value back
/// unchanged. Useful for untyped headers or as a placeholder in tests.
pub struct NoopValidator;

#[async_trait]
impl Validator<serde_json::Value> for NoopValidator {
    async fn validate(&self, raw: serde_json::Value) -> Result<serde_json::Value, Issues> {
        Ok(raw)
    }
}

impl Debug for NoopValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("NoopValidator")
    }
}
