//! # Join
//!
//! Wires the pieces together: interview, supervised connection, peer,
//! session.
//!
//! No WebSocket client ships with this crate. The caller supplies a function
//! that turns the ticketed WebSocket URL into a [`Connector`]; [`attach`] can
//! be used directly when admission happens some other way.

use tracing::info;

use crate::interview;
use crate::interview::InterviewOptions;
use crate::peer::Peer;
use crate::reconnect::Reconnectable;
use crate::retry::RetryStrategy;
use crate::session::Session;
use crate::session::SessionOptions;
use crate::transport;
use crate::transport::Connector;

#[derive(Debug)]
pub enum Error {
    Interview(interview::Error),
    Transport(transport::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Interview(e) => write!(f, "Interview failed: {}", e),
            Self::Transport(e) => write!(f, "Connection failed: {}", e),
        }
    }
}

impl std::error::Error for Error {}

impl From<interview::Error> for Error {
    fn from(e: interview::Error) -> Self {
        Self::Interview(e)
    }
}

impl From<transport::Error> for Error {
    fn from(e: transport::Error) -> Self {
        Self::Transport(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone)]
pub struct JoinOptions {
    pub interview: InterviewOptions,
    pub retry: RetryStrategy,
    pub session: SessionOptions,
}

impl JoinOptions {
    pub fn new(interview: InterviewOptions) -> Self {
        Self {
            interview,
            retry: RetryStrategy::default(),
            session: SessionOptions::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryStrategy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_session(mut self, session: SessionOptions) -> Self {
        self.session = session;
        self
    }
}

/// Interviews with the router, then connects and opens a session.
pub async fn join<F, C>(options: JoinOptions, make_connector: F) -> Result<Session>
where
    F: FnOnce(String) -> C,
    C: Connector,
{
    let admission = interview::interview(&options.interview).await?;
    info!(router = %admission.router_id, peer = %admission.your_id, "interview passed");

    let url = options.interview.websocket_url(&admission.ticket);
    attach(admission.your_id, make_connector(url), options.retry, options.session).await
}

/// Connects through `connector` under supervision and opens a session as
/// `peer_id`.
pub async fn attach(
    peer_id: impl Into<String>,
    connector: impl Connector,
    retry: RetryStrategy,
    options: SessionOptions,
) -> Result<Session> {
    let transport = Reconnectable::connect(connector, retry).await?;
    let peer = Peer::spawn(peer_id, Box::new(transport));
    Ok(Session::with_options(peer, options))
}
