#![doc = include_str!("../README.md")]
#![deny(missing_docs)]
#![cfg_attr(test, deny(warnings))]

/// Exposes runtime configuration loading.
mod config;
pub use self::config::{BrokerEndpoint, ConnectionOptions, RuntimeConfig};

/// Exposes the reconnect backoff wrapper.
mod backoff;
pub use self::backoff::{Backoff, BackoffConfig};

/// Exposes the error taxonomy shared across every subsystem.
mod error;
pub use self::error::{
    ContractValidationError, HandlerError, Issues, MessageValidationError, PublishError, TechnicalError, TopologyError,
    WorkerBuildError,
};

/// Exposes the schema validation trait applied to publishers and consumers.
mod validator;
pub use self::validator::{NoopValidator, SerdeValidator, Validator};

/// Exposes the contract's data model: exchanges, queues, bindings,
/// publishers, and consumers.
pub mod model;

/// Exposes the builder algebra for composing a contract from intent.
pub mod builder;

/// Exposes the channel abstraction every transport operation goes through.
mod channel;
pub use self::channel::{ChannelLike, Delivery, PublishProperties};

/// Exposes telemetry hooks for publish/consume spans and metrics.
mod telemetry;
pub use self::telemetry::{Span, SpanAttributes, TelemetryProvider, TracingTelemetryProvider};

/// Exposes graceful-shutdown coordination.
mod shutdown;
pub use self::shutdown::{listen_for_shutdown_signals, AppContext, AppSpindown, SpindownToken};

/// Exposes the shared, reference-counted connection manager.
pub mod connection;

/// Exposes the topology synthesizer that declares a contract's resources.
pub mod topology;

/// Exposes the publish pipeline: payload validation, compression, and the
/// publisher-name-keyed client applications call.
pub mod publish;

/// Exposes the retry engine: classifies failed deliveries and redrives,
/// dead-letters, or requeues them.
pub mod retry;

/// Exposes the worker: per-consumer registration and the per-delivery
/// processing pipeline.
pub mod worker;
