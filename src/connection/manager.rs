//! The process-wide, reference-counted connection manager: shares one
//! broker connection across every client/worker that acquires the same
//! [`ConnectionHandle`] fingerprint.

use crate::connection::connector::{ChannelSetupHook, Connector, Gateway};
use crate::connection::handle::ConnectionHandle;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tokio_util::sync::CancellationToken;

struct Entry {
    gateway: Gateway,
    shutdown: CancellationToken,
    ref_count: usize,
}

static REGISTRY: OnceLock<Mutex<HashMap<u64, Entry>>> = OnceLock::new();

fn registry() -> &'static Mutex<HashMap<u64, Entry>> {
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// A shared connection acquired from the [`ConnectionManager`]; releases its
/// reference automatically on drop.
pub struct SharedConnection {
    fingerprint: u64,
    gateway: Gateway,
}

impl SharedConnection {
    /// The [`Gateway`] used to request channels on this connection.
    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    /// The fingerprint this connection is shared under.
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }
}

impl Clone for SharedConnection {
    fn clone(&self) -> Self {
        ConnectionManager::acquire_by_fingerprint(self.fingerprint, || unreachable!("fingerprint already registered"))
    }
}

impl Drop for SharedConnection {
    fn drop(&mut self) {
        ConnectionManager::release(self.fingerprint);
    }
}

/// Facade over the global, fingerprint-keyed connection sharing map.
pub struct ConnectionManager;

impl ConnectionManager {
    /// Acquires a connection for `handle`: increments the reference count of
    /// an existing entry, or starts a new [`Connector`] in the background
    /// and inserts it with `setup` as its channel setup hook.
    pub fn acquire(handle: ConnectionHandle, setup: Arc<dyn ChannelSetupHook>) -> SharedConnection {
        let fingerprint = handle.fingerprint();

        Self::acquire_by_fingerprint(fingerprint, || Connector::start(handle, setup))
    }

    fn acquire_by_fingerprint(
        fingerprint: u64,
        start: impl FnOnce() -> (Gateway, CancellationToken),
    ) -> SharedConnection {
        let mut registry = registry().lock();

        let gateway = match registry.get_mut(&fingerprint) {
            Some(entry) => {
                entry.ref_count += 1;
                entry.gateway.clone()
            }
            None => {
                let (gateway, shutdown) = start();
                registry.insert(
                    fingerprint,
                    Entry {
                        gateway: gateway.clone(),
                        shutdown,
                        ref_count: 1,
                    },
                );
                gateway
            }
        };

        SharedConnection { fingerprint, gateway }
    }

    fn release(fingerprint: u64) {
        let mut registry = registry().lock();

        let should_remove = match registry.get_mut(&fingerprint) {
            Some(entry) => {
                entry.ref_count -= 1;
                entry.ref_count == 0
            }
            None => false,
        };

        if should_remove {
            if let Some(entry) = registry.remove(&fingerprint) {
                entry.shutdown.cancel();
            }
        }
    }

    /// The number of distinct fingerprints currently sharing a connection;
    /// exposed for tests.
    #[cfg(test)]
    pub(crate) fn active_fingerprint_count() -> usize {
        registry().lock().len()
    }

    /// The current reference count for `fingerprint`, or `None` if no
    /// connection is registered under it; exposed for tests.
    #[cfg(test)]
    pub(crate) fn ref_count(fingerprint: u64) -> Option<usize> {
        registry().lock().get(&fingerprint).map(|entry| entry.ref_count)
    }
}
