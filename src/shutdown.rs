//! Graceful process shutdown: a global cancellation signal ([`AppContext`])
//! plus a registry background tasks check in with before the process exits
//! ([`AppSpindown`]). The connection manager's reconnect loop is the one
//! caller inside this crate; applications may register their own workloads
//! against the same global registry.

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

static CONTEXT_TOKEN: OnceLock<CancellationToken> = OnceLock::new();
static SPINDOWN: OnceLock<SpindownRegistry> = OnceLock::new();
const DEFAULT_SPINDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Facade over the global application context: a single cancellation signal
/// every background task (notably the connection manager's reconnect loop)
/// waits on to know when to stop.
pub struct AppContext;

impl AppContext {
    fn token() -> &'static CancellationToken {
        CONTEXT_TOKEN.get_or_init(CancellationToken::new)
    }

    /// Resolves once the context has been [terminated](Self::terminate).
    pub async fn terminated() {
        Self::token().cancelled().await;
    }

    /// Terminates the global context; idempotent.
    pub fn terminate() {
        info!("terminating application context");
        Self::token().cancel();
    }

    /// Reports whether the context has already been terminated.
    pub fn is_terminated() -> bool {
        Self::token().is_cancelled()
    }
}

/// A token a registered workload uses to signal that it has finished
/// cleaning up. Dropping the token also punches out, so `let _token = ...;`
/// going out of scope is enough for workloads with no distinct cleanup step.
pub struct SpindownToken {
    token: CancellationToken,
}

impl SpindownToken {
    fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    /// Signals that this workload has completed its shutdown procedure.
    pub fn punch_out(&self) {
        self.token.cancel();
    }
}

impl Drop for SpindownToken {
    fn drop(&mut self) {
        self.punch_out();
    }
}

struct Workload {
    name: Arc<str>,
    token: CancellationToken,
}

struct SpindownRegistry {
    workloads: Mutex<Vec<Workload>>,
    timeout: Duration,
}

/// Facade over the global spindown registry: background tasks
/// [register](Self::register) before starting, and the process's shutdown
/// path [awaits](Self::completed) every registration punching out.
pub struct AppSpindown;

impl AppSpindown {
    fn registry() -> &'static SpindownRegistry {
        SPINDOWN.get_or_init(|| SpindownRegistry {
            workloads: Mutex::new(Vec::new()),
            timeout: DEFAULT_SPINDOWN_TIMEOUT,
        })
    }

    /// Registers a workload under `name` (not required to be unique) and
    /// returns the [`SpindownToken`] it must punch out once its cleanup is
    /// done.
    pub fn register(name: impl AsRef<str>) -> SpindownToken {
        let token = CancellationToken::new();
        let workload = Workload {
            name: Arc::from(name.as_ref()),
            token: token.clone(),
        };

        Self::registry().workloads.lock().push(workload);

        SpindownToken::new(token)
    }

    /// Waits, within the registry's timeout, for every currently registered
    /// workload to punch out. Workloads registered while this call is
    /// already waiting are picked up in a subsequent cycle.
    pub async fn completed() {
        let registry = Self::registry();
        info!("spindown initiated");

        let notify_in = Arc::new(Notify::new());
        let notify_out = Arc::clone(&notify_in);
        let timeout = registry.timeout;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            notify_in.notify_one();
        });

        loop {
            let workloads = std::mem::take(&mut *registry.workloads.lock());

            if workloads.is_empty() {
                info!("spindown completed");
                break;
            }

            info!(count = workloads.len(), "waiting for workloads to complete");

            let mut futures: FuturesUnordered<_> = workloads
                .into_iter()
                .map(|workload| async move {
                    workload.token.cancelled().await;
                    workload.name
                })
                .collect();

            let timed_out = tokio::select! {
                biased;
                _ = notify_out.notified() => true,
                _ = async { while futures.next().await.is_some() {} } => false,
            };

            if timed_out {
                warn!(alert = true, "some workloads did not complete gracefully in time");
                break;
            }
        }

        timer.abort();
    }
}

static AUTO_TERMINATE_CALLED: AtomicBool = AtomicBool::new(false);

/// Starts listening for OS shutdown signals (`SIGINT`/`SIGTERM` on Unix,
/// Ctrl-C on Windows), terminating the global context on the first one
/// received. Idempotent; subsequent calls are no-ops.
pub async fn listen_for_shutdown_signals() {
    if AUTO_TERMINATE_CALLED.swap(true, Ordering::Relaxed) {
        return;
    }

    tokio::spawn(async {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            let mut terminate = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            {
                Ok(signal) => signal,
                Err(error) => {
                    error!(%error, "failed to install SIGTERM handler");
                    return;
                }
            };

            tokio::select! {
                _ = ctrl_c => {}
                _ = terminate.recv() => {}
            }
        }

        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
        }

        AppContext::terminate();
    });

    tokio::task::yield_now().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn spindown_token_punches_out_on_drop() {
        // Given
        let registry = SpindownRegistry {
            workloads: Mutex::new(Vec::new()),
            timeout: Duration::from_millis(200),
        };
        let token = CancellationToken::new();
        registry.workloads.lock().push(Workload {
            name: Arc::from("dropped"),
            token: token.clone(),
        });

        // When
        drop(SpindownToken::new(token.clone()));

        // Then
        assert_eq!(token.is_cancelled(), true);
    }

    #[tokio::test]
    async fn app_context_terminated_resolves_after_terminate() {
        // Given
        let token = CancellationToken::new();
        let waiter_token = token.clone();

        // When
        let waiter = tokio::spawn(async move { waiter_token.cancelled().await });
        token.cancel();

        // Then
        waiter.await.unwrap();
        assert_eq!(token.is_cancelled(), true);
    }
}
