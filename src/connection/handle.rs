//! [`ConnectionHandle`]: the runtime-facing, non-deserializable counterpart
//! to [`BrokerEndpoint`](crate::config::BrokerEndpoint) that the connection
//! manager keys its sharing map on.

use crate::backoff::BackoffConfig;
use crate::config::BrokerEndpoint;
use secure_string::SecureString;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

/// An ordered URL list plus connection tuning, identified by a structural
/// [fingerprint](ConnectionHandle::fingerprint) the connection manager uses
/// to decide whether two acquisitions should share one broker connection.
#[derive(Clone)]
pub struct ConnectionHandle {
    name: Arc<str>,
    urls: Arc<[SecureString]>,
    heartbeat: Duration,
    reconnect: bool,
    backoff: BackoffConfig,
    default_prefetch: u16,
}

impl ConnectionHandle {
    /// Builds a handle from an already-loaded [`BrokerEndpoint`].
    pub fn from_endpoint(endpoint: &BrokerEndpoint) -> Self {
        Self {
            name: Arc::from(endpoint.name.as_str()),
            urls: Arc::from(endpoint.urls.clone().into_boxed_slice()),
            heartbeat: endpoint.options.heartbeat,
            reconnect: endpoint.options.reconnect,
            backoff: endpoint.options.backoff.clone(),
            default_prefetch: endpoint.options.default_prefetch,
        }
    }

    /// This handle's human-readable name, used in logging only.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The ordered connection URLs `lapin` attempts in turn.
    pub fn urls(&self) -> &[SecureString] {
        &self.urls
    }

    /// The negotiated heartbeat interval.
    pub fn heartbeat(&self) -> Duration {
        self.heartbeat
    }

    /// Whether the connection manager retries internally on connect failure.
    pub fn reconnect(&self) -> bool {
        self.reconnect
    }

    /// The backoff tuning used when `reconnect` is `true`.
    pub fn backoff(&self) -> &BackoffConfig {
        &self.backoff
    }

    /// The default channel prefetch for workers that don't override it.
    pub fn default_prefetch(&self) -> u16 {
        self.default_prefetch
    }

    /// The URL-fingerprint this handle resolves to: an ordered hash of the
    /// URLs plus a structural hash of the options that change wire
    /// behavior (heartbeat, reconnect, prefetch — not the backoff tuning,
    /// which doesn't change what the connection manager considers "the same
    /// connection").
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        for url in self.urls.iter() {
            url.unsecure().hash(&mut hasher);
        }
        self.heartbeat.hash(&mut hasher);
        self.reconnect.hash(&mut hasher);
        self.default_prefetch.hash(&mut hasher);
        hasher.finish()
    }
}
