//! [`Connector`]: runs in the background, maintains at most one active
//! [`lapin::Connection`] per [`ConnectionHandle`], and serves fresh
//! [`lapin::Channel`]s to any number of callers through a cheaply cloneable
//! [`Gateway`]. Reconnects transparently with backoff; re-runs the
//! registered setup hook (topology declaration, prefetch) on every
//! (re)connect.

use crate::backoff::Backoff;
use crate::channel::{ChannelLike, LapinChannel};
use crate::connection::handle::ConnectionHandle;
use crate::error::TechnicalError;
use crate::shutdown::{AppContext, AppSpindown, SpindownToken};
use async_trait::async_trait;
use lapin::{Connection, ConnectionProperties};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Invoked on every freshly opened channel, before it is handed to a caller:
/// declares topology (`crate::topology`) and, when a worker needs it, sets
/// the channel's prefetch.
#[async_trait]
pub trait ChannelSetupHook: Send + Sync {
    /// Performs setup on a freshly opened channel.
    async fn setup(&self, channel: &dyn ChannelLike) -> Result<(), TechnicalError>;
}

/// A setup hook that does nothing; used for channels that don't need
/// topology re-declaration (this crate always supplies a real hook in
/// practice).
pub struct NoopSetupHook;

#[async_trait]
impl ChannelSetupHook for NoopSetupHook {
    async fn setup(&self, _channel: &dyn ChannelLike) -> Result<(), TechnicalError> {
        Ok(())
    }
}

type ChannelRequest = oneshot::Sender<Result<Arc<dyn ChannelLike>, TechnicalError>>;

/// A cheaply cloneable handle to a running [`Connector`]'s channel-serving
/// loop.
#[derive(Clone)]
pub struct Gateway {
    requests: mpsc::Sender<ChannelRequest>,
}

impl Gateway {
    /// Requests a fresh channel, waiting indefinitely if the broker is
    /// currently unreachable and the connector is configured to retry.
    pub async fn channel(&self) -> Result<Arc<dyn ChannelLike>, TechnicalError> {
        let (tx, rx) = oneshot::channel();

        self.requests
            .send(tx)
            .await
            .map_err(|_| TechnicalError::new("connector has shut down"))?;

        rx.await.map_err(|_| TechnicalError::new("connector dropped the request"))?
    }

    #[cfg(test)]
    pub(crate) fn from_sender_for_test(requests: mpsc::Sender<ChannelRequest>) -> Self {
        Self { requests }
    }
}

/// Runs the background connect/reconnect/serve loop for one
/// [`ConnectionHandle`].
pub struct Connector {
    name: Arc<str>,
    handle: ConnectionHandle,
    setup: Arc<dyn ChannelSetupHook>,
    backoff: Backoff,
    shutdown: CancellationToken,
    requests: mpsc::Receiver<ChannelRequest>,
    _spindown_token: SpindownToken,
}

impl Connector {
    /// Starts a new connector for `handle` in the background, returning the
    /// [`Gateway`] callers use to request channels, plus the
    /// [`CancellationToken`] the connection manager cancels to tear this
    /// connector down when its reference count reaches zero.
    pub fn start(handle: ConnectionHandle, setup: Arc<dyn ChannelSetupHook>) -> (Gateway, CancellationToken) {
        static COUNTER: AtomicUsize = AtomicUsize::new(0);
        let name: Arc<str> = Arc::from(format!(
            "amqp-contract:connector:{}:{}",
            handle.name(),
            COUNTER.fetch_add(1, Ordering::Relaxed),
        ));

        let (tx, rx) = mpsc::channel(64);
        let shutdown = CancellationToken::new();
        let _spindown_token = AppSpindown::register(name.as_ref());
        let backoff = Backoff::new(handle.backoff().clone());

        let connector = Self {
            name,
            handle,
            setup,
            backoff,
            shutdown: shutdown.clone(),
            requests: rx,
            _spindown_token,
        };

        tokio::spawn(connector.serve());

        (Gateway { requests: tx }, shutdown)
    }

    async fn serve(mut self) {
        let mut connection: Option<Connection> = None;

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                _ = AppContext::terminated() => break,
                request = self.requests.recv() => {
                    let Some(reply) = request else { break };
                    let outcome = self.ensure_channel(&mut connection).await;
                    let _ = reply.send(outcome);
                }
            }
        }

        if let Some(connection) = connection.take() {
            info!(connector = self.name.as_ref(), "closing connection during shutdown");
            let _ = connection.close(200, "shutting down").await;
        }
    }

    async fn ensure_channel(&mut self, connection: &mut Option<Connection>) -> Result<Arc<dyn ChannelLike>, TechnicalError> {
        if connection.as_ref().map(|c| c.status().connected()).unwrap_or(false) {
            if let Some(channel) = self.open_channel(connection.as_ref().unwrap()).await? {
                return Ok(channel);
            }
        }

        *connection = Some(self.connect().await?);
        self.backoff.reset();

        self.open_channel(connection.as_ref().unwrap())
            .await?
            .ok_or_else(|| TechnicalError::new("failed to open channel on freshly established connection"))
    }

    async fn open_channel(&self, connection: &Connection) -> Result<Option<Arc<dyn ChannelLike>>, TechnicalError> {
        let channel = match connection.create_channel().await {
            Ok(channel) => channel,
            Err(error) => {
                warn!(connector = self.name.as_ref(), %error, "failed to open channel on existing connection");
                return Ok(None);
            }
        };

        let channel: Arc<dyn ChannelLike> = Arc::new(LapinChannel::new(channel));
        self.setup.setup(channel.as_ref()).await?;

        Ok(Some(channel))
    }

    async fn connect(&self) -> Result<Connection, TechnicalError> {
        loop {
            for url in self.handle.urls() {
                match Connection::connect(
                    url.unsecure(),
                    ConnectionProperties::default()
                        .with_executor(tokio_executor_trait::Tokio::current())
                        .with_reactor(tokio_reactor_trait::Tokio),
                )
                .await
                {
                    Ok(connection) => {
                        info!(connector = self.name.as_ref(), "connected to broker");
                        return Ok(connection);
                    }
                    Err(error) => {
                        warn!(connector = self.name.as_ref(), %error, "failed to connect to broker");
                    }
                }
            }

            if !self.handle.reconnect() {
                return Err(TechnicalError::new("unable to connect to any configured broker URL"));
            }

            self.backoff.sleep_next().await;
        }
    }
}
