//! The worker pipeline: setup (acquire connections, register consumers, set
//! prefetch) and per-delivery processing (decompress, parse, validate,
//! dispatch to a handler, ack or hand off to the retry engine).

use crate::backoff::Backoff;
use crate::channel::{ChannelLike, Delivery};
use crate::connection::{ChannelSetupHook, ConnectionHandle, ConnectionManager, Gateway, SharedConnection};
use crate::error::{TechnicalError, WorkerBuildError};
use crate::model::{Consumer, Contract};
use crate::publish::Compression;
use crate::retry::RetryEngine;
use crate::telemetry::{SpanAttributes, TelemetryProvider};
use crate::topology::TopologySetupHook;
use crate::worker::handler::{DeliveredMessage, FallibleHandler, FallibleHandlerAdapter, Handler};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;
use tracing::warn;

type ConsumerStream = BoxStream<'static, Result<Delivery, TechnicalError>>;

/// A [`ChannelSetupHook`] that runs an inner hook (topology declaration, most
/// commonly) and then sets the channel's prefetch. [`WorkerBuilder::build`]
/// composes this itself around a [`TopologySetupHook`] whenever at least one
/// consumer declares a prefetch, so prefetch is re-applied the same way
/// topology is re-declared: every time a fresh channel is acquired, not just
/// once at startup.
pub struct PrefetchSetupHook {
    inner: Arc<dyn ChannelSetupHook>,
    prefetch: u16,
}

impl PrefetchSetupHook {
    /// Wraps `inner`, adding a `basic.qos` call for `prefetch` after it runs.
    pub fn new(inner: Arc<dyn ChannelSetupHook>, prefetch: u16) -> Self {
        Self { inner, prefetch }
    }
}

#[async_trait]
impl ChannelSetupHook for PrefetchSetupHook {
    async fn setup(&self, channel: &dyn ChannelLike) -> Result<(), TechnicalError> {
        self.inner.setup(channel).await?;
        channel.set_prefetch(self.prefetch).await
    }
}

/// The error surfaced by [`WorkerBuilder::build`].
#[derive(Error, Debug)]
pub enum WorkerStartError {
    /// The handler map doesn't cover every contract consumer, or vice versa.
    #[error(transparent)]
    Build(#[from] WorkerBuildError),
}

/// Assembles a [`Worker`] from a contract and a handler registered per
/// consumer name.
pub struct WorkerBuilder {
    contract: Arc<Contract>,
    handlers: HashMap<String, Arc<dyn Handler>>,
}

impl WorkerBuilder {
    /// Starts building a worker over `contract`.
    pub fn new(contract: Arc<Contract>) -> Self {
        Self {
            contract,
            handlers: HashMap::new(),
        }
    }

    /// Registers a safe handler for `consumer_name`.
    pub fn with_handler(mut self, consumer_name: impl Into<String>, handler: impl Handler + 'static) -> Self {
        self.handlers.insert(consumer_name.into(), Arc::new(handler));
        self
    }

    /// Registers an unsafe handler for `consumer_name`, adapted into the safe
    /// form. Every error it returns is treated as retryable.
    pub fn with_fallible_handler(self, consumer_name: impl Into<String>, handler: impl FallibleHandler + 'static) -> Self {
        self.with_handler(consumer_name, FallibleHandlerAdapter(handler))
    }

    /// The maximum prefetch across every registered consumer, `0` if none
    /// declares one. Used by [`build`](Self::build) to decide whether to
    /// compose a [`PrefetchSetupHook`] around the contract's topology hook.
    pub fn max_prefetch(&self) -> u16 {
        self.contract
            .consumers()
            .filter_map(|consumer| consumer.prefetch())
            .max()
            .unwrap_or(0)
    }

    fn validate(&self) -> Result<(), WorkerBuildError> {
        for consumer in self.contract.consumers() {
            if !self.handlers.contains_key(consumer.name()) {
                return Err(WorkerBuildError::MissingHandler {
                    consumer: consumer.name().to_string(),
                });
            }
        }

        for name in self.handlers.keys() {
            if self.contract.consumer(name).is_none() {
                return Err(WorkerBuildError::UnknownConsumer { consumer: name.clone() });
            }
        }

        Ok(())
    }

    /// Validates the handler map against the contract, acquires a connection
    /// for `handle` (composing a [`TopologySetupHook`], wrapped in a
    /// [`PrefetchSetupHook`] when needed, as its setup hook), and spawns one
    /// consumer loop per contract consumer. Each loop acquires its own
    /// channel lazily and re-acquires a fresh one (re-running the setup hook,
    /// and so re-declaring topology and prefetch) whenever its delivery
    /// stream runs dry, rather than holding one channel for the worker's
    /// entire lifetime.
    pub async fn build(self, handle: ConnectionHandle, telemetry: Arc<dyn TelemetryProvider>) -> Result<Worker, WorkerStartError> {
        self.validate()?;

        let max_prefetch = self.max_prefetch();
        let topology_hook: Arc<dyn ChannelSetupHook> = Arc::new(TopologySetupHook::new(self.contract.clone()));
        let setup_hook: Arc<dyn ChannelSetupHook> = if max_prefetch > 0 {
            Arc::new(PrefetchSetupHook::new(topology_hook, max_prefetch))
        } else {
            topology_hook
        };

        let connection = ConnectionManager::acquire(handle, setup_hook);
        let gateway = connection.gateway().clone();
        let shutdown = CancellationToken::new();
        let mut active_consumers = Vec::new();

        for consumer in self.contract.consumers() {
            let handler = self
                .handlers
                .get(consumer.name())
                .expect("validated above: every consumer has a handler")
                .clone();

            let active = Arc::new(AsyncMutex::new(None));
            active_consumers.push(active.clone());

            tokio::spawn(run_consumer_loop(
                gateway.clone(),
                consumer.clone(),
                handler,
                telemetry.clone(),
                shutdown.clone(),
                active,
            ));
        }

        Ok(Worker {
            _connection: connection,
            active_consumers,
            shutdown,
        })
    }
}

fn next_consumer_tag(consumer_name: &str) -> String {
    static COUNTER: AtomicUsize = AtomicUsize::new(0);
    format!("{consumer_name}-{}", COUNTER.fetch_add(1, Ordering::Relaxed))
}

/// A consumer tag registered on a specific, currently-held channel. Recorded
/// so [`Worker::close`] can cancel whatever is actually running, even though
/// the underlying channel changes across reconnects.
struct ActiveConsumer {
    channel: Arc<dyn ChannelLike>,
    tag: String,
}

/// A running set of consumers, dispatching deliveries to registered handlers.
pub struct Worker {
    _connection: SharedConnection,
    active_consumers: Vec<Arc<AsyncMutex<Option<ActiveConsumer>>>>,
    shutdown: CancellationToken,
}

impl Worker {
    /// Stops every consumer loop and cancels whichever consumer tag each one
    /// currently has registered. Tolerates individual cancel failures
    /// (logging them) and lets in-flight handlers finish rather than forcing
    /// them to abort.
    pub async fn close(&self) {
        self.shutdown.cancel();

        for active in &self.active_consumers {
            let active = active.lock().await.take();

            if let Some(active) = active {
                if let Err(error) = active.channel.cancel(&active.tag).await {
                    warn!(%error, consumer_tag = active.tag.as_str(), "failed to cancel consumer tag during shutdown");
                }
            }
        }
    }
}

/// Drives one contract consumer for the life of the worker: acquires a
/// channel, registers a consumer on it, drains its delivery stream, and
/// re-acquires a fresh channel (re-registering the consumer) whenever that
/// stream runs dry, instead of giving up.
async fn run_consumer_loop(
    gateway: Gateway,
    consumer: Consumer,
    handler: Arc<dyn Handler>,
    telemetry: Arc<dyn TelemetryProvider>,
    shutdown: CancellationToken,
    active: Arc<AsyncMutex<Option<ActiveConsumer>>>,
) {
    let consumer = Arc::new(consumer);

    while !shutdown.is_cancelled() {
        let Some((channel, mut stream, retry_engine)) = acquire_consumer(&gateway, &consumer, &shutdown, &active).await else {
            break;
        };

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return,
                item = stream.next() => {
                    let Some(item) = item else {
                        warn!(consumer = consumer.name(), "consumer ran out of messages, re-acquiring a fresh channel");
                        break;
                    };

                    match item {
                        Ok(delivery) => {
                            let consumer = consumer.clone();
                            let channel = channel.clone();
                            let retry_engine = retry_engine.clone();
                            let handler = handler.clone();
                            let telemetry = telemetry.clone();

                            tokio::spawn(async move {
                                process_delivery(delivery, &consumer, channel, retry_engine, handler, telemetry).await;
                            });
                        }
                        Err(error) => {
                            warn!(consumer = consumer.name(), %error, "delivery stream reported an error");
                        }
                    }
                }
            }
        }
    }

    *active.lock().await = None;
}

/// Acquires a fresh channel and registers a consumer on it, retrying with a
/// backoff on failure. Returns `None` only once `shutdown` is cancelled.
async fn acquire_consumer(
    gateway: &Gateway,
    consumer: &Arc<Consumer>,
    shutdown: &CancellationToken,
    active: &AsyncMutex<Option<ActiveConsumer>>,
) -> Option<(Arc<dyn ChannelLike>, ConsumerStream, Arc<RetryEngine>)> {
    let backoff = Backoff::default();

    while !shutdown.is_cancelled() {
        let channel = match gateway.channel().await {
            Ok(channel) => channel,
            Err(error) => {
                warn!(consumer = consumer.name(), %error, "failed to acquire a channel for a consumer");
                backoff.sleep_next().await;
                continue;
            }
        };

        let consumer_tag = next_consumer_tag(consumer.name());

        match channel.consume(consumer.queue().name(), &consumer_tag).await {
            Ok(stream) => {
                *active.lock().await = Some(ActiveConsumer {
                    channel: channel.clone(),
                    tag: consumer_tag,
                });

                let retry_engine = Arc::new(RetryEngine::new(channel.clone()));
                return Some((channel, stream, retry_engine));
            }
            Err(error) => {
                warn!(consumer = consumer.name(), %error, "failed to register a consumer on a freshly acquired channel");
                backoff.sleep_next().await;
            }
        }
    }

    None
}

async fn process_delivery(
    delivery: Delivery,
    consumer: &Consumer,
    channel: Arc<dyn ChannelLike>,
    retry_engine: Arc<RetryEngine>,
    handler: Arc<dyn Handler>,
    telemetry: Arc<dyn TelemetryProvider>,
) {
    let span = telemetry.start_span(SpanAttributes {
        system: "rabbitmq",
        destination: consumer.queue().name().to_string(),
        destination_kind: "queue",
        operation: "process",
        routing_key: None,
    });

    let started_at = Instant::now();
    let outcome = handle_delivery(delivery, consumer, channel.as_ref(), retry_engine.as_ref(), handler.as_ref()).await;
    let latency = started_at.elapsed();

    match &outcome {
        Ok(()) => {
            span.end_ok();
            telemetry.record_consume(consumer.name(), true, latency);
        }
        Err(error) => {
            span.end_err(&error.to_string());
            telemetry.record_consume(consumer.name(), false, latency);
        }
    }
}

async fn handle_delivery(
    delivery: Delivery,
    consumer: &Consumer,
    channel: &dyn ChannelLike,
    retry_engine: &RetryEngine,
    handler: &dyn Handler,
) -> Result<(), TechnicalError> {
    let mut body = delivery.body.clone();

    if let Some(encoding) = delivery.content_encoding.as_deref() {
        if let Some(compression) = Compression::from_wire_str(encoding) {
            match compression.decompress(&body) {
                Ok(decompressed) => body = decompressed,
                Err(error) => {
                    warn!(consumer = consumer.name(), %error, "failed to decompress delivery, treating as poison");
                    let _ = channel.nack(delivery.delivery_tag, false).await;
                    return Err(error);
                }
            }
        }
    }

    let raw_payload: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(error) => {
            warn!(consumer = consumer.name(), %error, "failed to parse delivery body as JSON, treating as poison");
            let _ = channel.nack(delivery.delivery_tag, false).await;
            return Err(TechnicalError::wrap("failed to parse delivery body as JSON", error));
        }
    };

    let payload = match consumer.message().payload_validator().validate(raw_payload).await {
        Ok(value) => value,
        Err(issues) => {
            warn!(consumer = consumer.name(), ?issues, "payload failed validation, treating as poison");
            let _ = channel.nack(delivery.delivery_tag, false).await;
            return Err(TechnicalError::new(format!("payload validation failed: {issues:?}")));
        }
    };

    let headers = match consumer.message().headers_validator() {
        Some(headers_validator) => {
            let raw_headers = serde_json::Value::Object(delivery.headers.clone());
            match headers_validator.validate(raw_headers).await {
                Ok(value) => value.as_object().cloned().unwrap_or_default(),
                Err(issues) => {
                    warn!(consumer = consumer.name(), ?issues, "headers failed validation, treating as poison");
                    let _ = channel.nack(delivery.delivery_tag, false).await;
                    return Err(TechnicalError::new(format!("headers validation failed: {issues:?}")));
                }
            }
        }
        None => delivery.headers.clone(),
    };

    let message = DeliveredMessage {
        payload,
        headers,
        delivery: delivery.clone(),
    };

    match handler.handle(message).await {
        Ok(()) => {
            channel.ack(delivery.delivery_tag).await?;
            Ok(())
        }
        Err(handler_error) => {
            let description = handler_error.to_string();
            retry_engine.handle_error(&handler_error, &delivery, &body, consumer).await?;
            Err(TechnicalError::new(description))
        }
    }
}
