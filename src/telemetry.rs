//! The [`TelemetryProvider`] capability: the boundary between this crate and
//! whichever tracer/metrics backend the application wires up. Mirrors the
//! way the example pack splits a pluggable sink (e.g. a Prometheus exporter)
//! from the core that only depends on a thin trait.

use std::time::Duration;

/// Attributes recorded on a publish or consume span, following the
/// `messaging.*` semantic conventions.
#[derive(Debug, Clone)]
pub struct SpanAttributes {
    /// `messaging.system`, always `"rabbitmq"`.
    pub system: &'static str,
    /// `messaging.destination.name`.
    pub destination: String,
    /// `messaging.destination.kind`, `"exchange"` or `"queue"`.
    pub destination_kind: &'static str,
    /// `messaging.operation`, `"publish"` or `"process"`.
    pub operation: &'static str,
    /// The routing key, when applicable.
    pub routing_key: Option<String>,
}

/// An in-flight span handle. `end_ok`/`end_err` consume it, matching the
/// single-finalization discipline used for [`Acker`](lapin::acker::Acker)
/// finalization.
pub trait Span: Send {
    /// Ends the span successfully.
    fn end_ok(self: Box<Self>);

    /// Ends the span with an error description.
    fn end_err(self: Box<Self>, error: &str);
}

/// The capability this crate consumes for tracing and metrics. A default,
/// `tracing`-backed, metrics-free implementation is provided via
/// [`TracingTelemetryProvider`] so the ambient logging stack is always
/// present even when no metrics backend is configured.
pub trait TelemetryProvider: Send + Sync {
    /// Starts a new span with the given attributes.
    fn start_span(&self, attributes: SpanAttributes) -> Box<dyn Span>;

    /// Records a publish attempt: destination, routing key, success, and
    /// latency.
    fn record_publish(
        &self,
        destination: &str,
        routing_key: &str,
        success: bool,
        latency: Duration,
    );

    /// Records a consume attempt: consumer name, success, and latency.
    fn record_consume(&self, consumer: &str, success: bool, latency: Duration);
}

struct TracingSpan {
    span: tracing::Span,
}

impl Span for TracingSpan {
    fn end_ok(self: Box<Self>) {
        let _guard = self.span.enter();
        tracing::debug!("span completed successfully");
    }

    fn end_err(self: Box<Self>, error: &str) {
        let _guard = self.span.enter();
        tracing::warn!(error, "span completed with an error");
    }
}

/// The default [`TelemetryProvider`]: emits `tracing` spans and events, and
/// records metrics as `tracing` events with structured fields rather than
/// exporting them anywhere (no metrics backend is bundled; see
/// [`TelemetryProvider`] for how to plug one in).
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTelemetryProvider;

impl TelemetryProvider for TracingTelemetryProvider {
    fn start_span(&self, attributes: SpanAttributes) -> Box<dyn Span> {
        let span = tracing::info_span!(
            "amqp_message",
            messaging.system = attributes.system,
            messaging.destination.name = attributes.destination.as_str(),
            messaging.destination.kind = attributes.destination_kind,
            messaging.operation = attributes.operation,
            messaging.routing_key = attributes.routing_key.as_deref().unwrap_or(""),
        );

        Box::new(TracingSpan { span })
    }

    fn record_publish(
        &self,
        destination: &str,
        routing_key: &str,
        success: bool,
        latency: Duration,
    ) {
        tracing::debug!(
            destination,
            routing_key,
            success,
            latency_ms = latency.as_millis() as u64,
            "publish counter + latency histogram",
        );
    }

    fn record_consume(&self, consumer: &str, success: bool, latency: Duration) {
        tracing::debug!(
            consumer,
            success,
            latency_ms = latency.as_millis() as u64,
            "consume counter + latency histogram",
        );
    }
}
