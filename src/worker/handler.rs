//! Handlers: the per-consumer message-processing capability a worker
//! dispatches deliveries to.

use crate::channel::Delivery;
use crate::error::HandlerError;
use async_trait::async_trait;

/// The validated payload, validated headers, and raw delivery handed to a
/// handler.
#[derive(Debug, Clone)]
pub struct DeliveredMessage {
    /// The payload, after JSON parsing and schema validation.
    pub payload: serde_json::Value,
    /// The headers, after schema validation when the consumer defines one.
    pub headers: serde_json::Map<String, serde_json::Value>,
    /// The raw delivery, for handlers that need broker-level metadata.
    pub delivery: Delivery,
}

/// A "safe" handler: returns `Result<(), HandlerError>` directly, including
/// [`HandlerError::NonRetryable`] when it can determine a message should
/// bypass the retry engine entirely.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Processes one delivery.
    async fn handle(&self, message: DeliveredMessage) -> Result<(), HandlerError>;
}

/// An "unsafe" handler: returns any error type. Wrapped at registration into
/// the safe form via [`HandlerError::other`] — every error this handler
/// returns is retryable; a handler that needs to bypass retries should
/// implement [`Handler`] directly instead.
#[async_trait]
pub trait FallibleHandler: Send + Sync {
    /// Processes one delivery, returning an arbitrary error on failure.
    async fn handle(&self, message: DeliveredMessage) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

pub(crate) struct FallibleHandlerAdapter<H>(pub(crate) H);

#[async_trait]
impl<H: FallibleHandler> Handler for FallibleHandlerAdapter<H> {
    async fn handle(&self, message: DeliveredMessage) -> Result<(), HandlerError> {
        self.0.handle(message).await.map_err(HandlerError::Other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    struct AlwaysFails;

    #[async_trait]
    impl FallibleHandler for AlwaysFails {
        async fn handle(&self, _message: DeliveredMessage) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            Err(Box::new(std::io::Error::other("boom")))
        }
    }

    fn sample_message() -> DeliveredMessage {
        DeliveredMessage {
            payload: serde_json::json!({}),
            headers: serde_json::Map::new(),
            delivery: Delivery {
                delivery_tag: 1,
                body: b"{}".to_vec(),
                content_type: Some("application/json".into()),
                content_encoding: None,
                headers: serde_json::Map::new(),
                delivery_count: None,
            },
        }
    }

    #[tokio::test]
    async fn fallible_handler_adapter_wraps_any_error_as_retryable() {
        // Given
        let adapter = FallibleHandlerAdapter(AlwaysFails);

        // When
        let actual = adapter.handle(sample_message()).await;

        // Then
        assert!(matches!(actual, Err(HandlerError::Other(_))));
    }
}
