//! A reusable exponential-backoff primitive for the connection manager's
//! reconnect loop. Distinct from the retry engine's `ttl-backoff` delay math
//! (`retry::engine`), which is specified exactly and has its own jitter/cap
//! rules.

use backoff::backoff::Backoff as InnerBackoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use parking_lot::Mutex as SyncMutex;
use std::time::Duration;

/// Tuning parameters for an [exponential backoff](ExponentialBackoff).
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffConfig {
    pub(crate) initial_interval: Duration,
    pub(crate) max_interval: Duration,
    pub(crate) randomization_factor: f64,
    pub(crate) multiplier: f64,
    pub(crate) max_elapsed_time: Option<Duration>,
}

impl BackoffConfig {
    /// The interval before the first retry.
    pub fn initial_interval(&self) -> Duration {
        self.initial_interval
    }

    /// The ceiling any single interval is clamped to.
    pub fn max_interval(&self) -> Duration {
        self.max_interval
    }

    /// The jitter factor applied to each interval.
    pub fn randomization_factor(&self) -> f64 {
        self.randomization_factor
    }

    /// The growth factor applied between intervals.
    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    /// The total time budget after which backing off gives up, if any.
    pub fn max_elapsed_time(&self) -> Option<Duration> {
        self.max_elapsed_time
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(30),
            randomization_factor: 0.5,
            multiplier: 2.0,
            max_elapsed_time: None,
        }
    }
}

impl AsRef<BackoffConfig> for BackoffConfig {
    fn as_ref(&self) -> &BackoffConfig {
        self
    }
}

/// Thin wrapper around [`ExponentialBackoff`] adding interior mutability and
/// a `sleep_next` convenience method, used by the connection manager's
/// reconnect loop.
pub struct Backoff {
    inner: SyncMutex<ExponentialBackoff>,
}

impl Backoff {
    /// Builds a new [`Backoff`] from the given configuration.
    pub fn new(config: impl AsRef<BackoffConfig>) -> Self {
        let config = config.as_ref();
        let inner = ExponentialBackoffBuilder::new()
            .with_initial_interval(config.initial_interval())
            .with_max_interval(config.max_interval())
            .with_randomization_factor(config.randomization_factor())
            .with_multiplier(config.multiplier())
            .with_max_elapsed_time(config.max_elapsed_time())
            .build();

        Self {
            inner: SyncMutex::new(inner),
        }
    }

    /// Returns the next backoff interval, or `None` once `max_elapsed_time`
    /// has been exceeded.
    pub fn next(&self) -> Option<Duration> {
        self.inner.lock().next_backoff()
    }

    /// Sleeps for the next backoff interval; yields once if the budget is
    /// exhausted rather than looping immediately.
    pub async fn sleep_next(&self) {
        match self.next() {
            Some(duration) => tokio::time::sleep(duration).await,
            None => tokio::task::yield_now().await,
        }
    }

    /// Resets this backoff to its initial interval, called after a
    /// successful (re)connect.
    pub fn reset(&self) {
        self.inner.lock().reset();
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(BackoffConfig::default())
    }
}
