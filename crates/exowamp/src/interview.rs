//! # Interview
//!
//! Admission to a router happens over HTTP before any WebSocket is opened:
//! the client POSTs its credentials to `/wamp/v1/interview` and receives the
//! router id, a one-time ticket and the id it will be known by. The ticket is
//! then presented on the WebSocket URL.

use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

/// Default HTTP timeout for the interview request.
pub const DEFAULT_INTERVIEW_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug)]
pub enum Error {
    Http(reqwest::Error),
    /// The router answered with a non-success status.
    Rejected { status: u16, body: String },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http(e) => write!(f, "HTTP error: {}", e),
            Self::Rejected { status, body } => write!(f, "Interview rejected ({}): {}", status, body),
        }
    }
}

impl std::error::Error for Error {}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterviewPayload {
    #[serde(rename = "routerID")]
    pub router_id: String,
    pub ticket: String,
    #[serde(rename = "yourID")]
    pub your_id: String,
}

#[derive(Debug, Clone)]
pub struct InterviewOptions {
    /// `host[:port]` of the router.
    pub address: String,
    pub secure: bool,
    pub credentials: Value,
    pub timeout: Duration,
}

impl InterviewOptions {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            secure: false,
            credentials: Value::Null,
            timeout: DEFAULT_INTERVIEW_TIMEOUT,
        }
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn with_credentials(mut self, credentials: Value) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn interview_url(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{}://{}/wamp/v1/interview", scheme, self.address)
    }

    pub fn websocket_url(&self, ticket: &str) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        format!("{}://{}/wamp/v1/websocket?ticket={}", scheme, self.address, ticket)
    }
}

pub async fn interview(options: &InterviewOptions) -> Result<InterviewPayload> {
    let client = reqwest::Client::builder().timeout(options.timeout).build()?;
    let url = options.interview_url();
    debug!(url = %url, "requesting interview");

    let response = client.post(&url).json(&options.credentials).send().await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::Rejected {
            status: status.as_u16(),
            body,
        });
    }

    Ok(response.json::<InterviewPayload>().await?)
}
