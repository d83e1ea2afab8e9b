//! Message schemas: the validation contract attached to a publisher or
//! consumer.
//!
//! Validation happens against [`serde_json::Value`] rather than a
//! caller-chosen Rust type — this crate's contract is a runtime-assembled
//! graph, not a compile-time one, and the wire format is JSON throughout
//! (`contentType = application/json`). Callers who want a typed payload can
//! still get one by decoding the validated `Value` themselves, e.g. with
//! `serde_json::from_value`, after the framework's own validation has
//! already run.

use crate::validator::Validator;
use std::sync::Arc;

/// A payload (and optionally headers) schema, expressed as one or two
/// [`Validator`] capabilities.
#[derive(Clone)]
pub struct MessageSchema {
    pub(crate) payload_validator: Arc<dyn Validator<serde_json::Value>>,
    pub(crate) headers_validator: Option<Arc<dyn Validator<serde_json::Value>>>,
    pub(crate) summary: Option<String>,
    pub(crate) description: Option<String>,
}

impl MessageSchema {
    /// Defines a message schema from a payload validator (`defineMessage`).
    pub fn new(payload_validator: impl Validator<serde_json::Value> + 'static) -> MessageSchemaBuilder {
        MessageSchemaBuilder {
            payload_validator: Arc::new(payload_validator),
            headers_validator: None,
            summary: None,
            description: None,
        }
    }

    /// Validates a raw payload value.
    pub fn payload_validator(&self) -> &Arc<dyn Validator<serde_json::Value>> {
        &self.payload_validator
    }

    /// Validates raw headers, if this schema constrains them.
    pub fn headers_validator(&self) -> Option<&Arc<dyn Validator<serde_json::Value>>> {
        self.headers_validator.as_ref()
    }

    /// A short human-readable summary, surfaced in generated documentation.
    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }

    /// A longer human-readable description, surfaced in generated documentation.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

impl std::fmt::Debug for MessageSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageSchema")
            .field("headers_validator", &self.headers_validator.is_some())
            .field("summary", &self.summary)
            .field("description", &self.description)
            .finish()
    }
}

/// Builds a [`MessageSchema`].
pub struct MessageSchemaBuilder {
    payload_validator: Arc<dyn Validator<serde_json::Value>>,
    headers_validator: Option<Arc<dyn Validator<serde_json::Value>>>,
    summary: Option<String>,
    description: Option<String>,
}

impl MessageSchemaBuilder {
    /// Adds a headers validator.
    pub fn with_headers(mut self, headers_validator: impl Validator<serde_json::Value> + 'static) -> Self {
        self.headers_validator = Some(Arc::new(headers_validator));
        self
    }

    /// Sets the summary.
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Builds the [`MessageSchema`].
    pub fn build(self) -> MessageSchema {
        MessageSchema {
            payload_validator: self.payload_validator,
            headers_validator: self.headers_validator,
            summary: self.summary,
            description: self.description,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::NoopValidator;
    use pretty_assertions::assert_eq;

    #[test]
    fn builder_carries_summary_and_headers() {
        // Given
        let builder = MessageSchema::new(NoopValidator)
            .with_headers(NoopValidator)
            .with_summary("order created");

        // When
        let schema = builder.build();

        // Then
        assert_eq!(schema.summary(), Some("order created"));
        assert_eq!(schema.headers_validator().is_some(), true);
    }
}
