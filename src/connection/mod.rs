//! The shared connection manager: URL-fingerprint-keyed connection sharing,
//! background reconnect, and topology re-declaration on every (re)connect.

mod connector;
mod handle;
mod manager;

pub use connector::{ChannelSetupHook, Connector, Gateway, NoopSetupHook};
pub use handle::ConnectionHandle;
pub use manager::{ConnectionManager, SharedConnection};
