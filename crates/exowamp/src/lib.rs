//! # ExoWAMP
//!
//! The client engine for a WAMP-style RPC and pub/sub protocol: a [`Peer`]
//! that confirms and correlates every event, a [`Session`] offering publish,
//! call, subscribe and register on top of it, streaming procedures, and a
//! transport supervisor that reconnects and restores the session after
//! recoverable faults.
//!
//! Message shapes and the wire codec live in `neowamp`.

pub mod endpoints;
pub mod entrypoints;
pub mod error;
pub mod interview;
pub mod join;
pub mod mock_transport;
pub mod peer;
pub mod reconnect;
pub mod retry;
pub mod session;
pub mod shared;
pub mod transport;

pub use endpoints::Producer;
pub use endpoints::call_procedure;
pub use endpoints::producer_from_stream;
pub use endpoints::publish_procedure;
pub use endpoints::stream_procedure;
pub use error::ApplicationError;
pub use join::attach;
pub use join::join;
pub use peer::Peer;
pub use reconnect::Reconnectable;
pub use retry::RetryStrategy;
pub use session::CallResult;
pub use session::Procedure;
pub use session::RemoteGenerator;
pub use session::Session;
pub use session::SessionOptions;
pub use transport::Connector;
pub use transport::Transport;

#[cfg(test)]
mod tests;
