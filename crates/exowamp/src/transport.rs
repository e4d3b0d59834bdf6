//! # Transport Abstraction
//!
//! A minimal async interface for moving whole [`Event`]s between this peer and
//! a router.
//!
//! ## Fault classes
//!
//! Every read or write failure is one of:
//!
//! - **Terminal** (`Closed`, `Io`): the connection is gone for good.
//! - **Recoverable** (`Broken`): the link dropped but a fresh one may be
//!   established. Only a supervising transport such as
//!   [`Reconnectable`](crate::reconnect::Reconnectable) acts on this; to
//!   anyone else it is as final as `Closed`.
//! - **Restored**: the supervisor replaced the link underneath the reader.
//!   Nothing was lost from the new link, but anything in flight on the old one
//!   is in an unknown state.
//! - **Decode**: one inbound message was unreadable. The link itself is fine.

use std::fmt;
use std::future::Future;

use neowamp::Event;

#[derive(Debug, Clone)]
pub enum Error {
    /// The connection was closed and will not come back.
    Closed(String),
    /// The connection dropped and may be re-established.
    Broken(String),
    /// The connection was re-established underneath the caller.
    Restored,
    /// One message could not be decoded.
    Decode(neowamp::Error),
    /// Generic I/O failure.
    Io(String),
}

impl Error {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed(_) | Self::Io(_))
    }

    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Broken(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed(msg) => write!(f, "Connection closed: {}", msg),
            Self::Broken(msg) => write!(f, "Connection broken: {}", msg),
            Self::Restored => write!(f, "Connection restored"),
            Self::Decode(e) => write!(f, "Undecodable message: {}", e),
            Self::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<neowamp::Error> for Error {
    fn from(e: neowamp::Error) -> Self {
        Self::Decode(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// A bidirectional, message-oriented link.
///
/// Object-safe; peers hold it as `Arc<dyn Transport>`. Reads and writes may
/// be issued concurrently, but each direction is driven by one task at a time.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn write(&self, event: &Event) -> Result<()>;

    /// Waits for the next inbound event.
    async fn read(&self) -> Result<Event>;

    /// Closes the link. A reader blocked in `read` must observe a terminal
    /// error afterwards.
    async fn close(&self) -> Result<()>;
}

/// Produces fresh transports on demand, for initial connection and recovery.
#[async_trait::async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self) -> Result<Box<dyn Transport>>;
}

#[async_trait::async_trait]
impl<F, Fut> Connector for F
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Box<dyn Transport>>> + Send + 'static,
{
    async fn connect(&self) -> Result<Box<dyn Transport>> {
        (self)().await
    }
}
