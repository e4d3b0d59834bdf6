//! # Events
//!
//! One struct per message kind, each carrying its own id, typed features and
//! (where the kind has one) a payload. [`Event`] is the closed sum of all of
//! them and is what transports move around.
//!
//! Every constructor draws a fresh id from [`crate::id::new_id`].

use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::id::new_id;
use crate::kind::MessageKind;

/// Error tag marking the natural end of a stream. Not a failure.
pub const GENERATOR_EXIT: &str = "GeneratorExit";

/// Error tag injected into a producer that is being stopped.
pub const GENERATOR_STOP: &str = "GeneratorStop";

/// Opaque tag substituted for unrecognised procedure failures.
pub const APPLICATION_ERROR: &str = "ApplicationError";

// ============================================================================
//  FEATURES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptFeatures {
    #[serde(rename = "sourceID")]
    pub source_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishFeatures {
    #[serde(rename = "URI")]
    pub uri: String,
}

impl PublishFeatures {
    pub fn new(uri: impl Into<String>) -> Self {
        Self { uri: uri.into() }
    }
}

/// Timeouts travel as nanoseconds. They are advisory: the engine carries them
/// but never enforces them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallFeatures {
    #[serde(rename = "URI")]
    pub uri: String,
    pub timeout: u64,
}

impl CallFeatures {
    pub fn new(uri: impl Into<String>, timeout: Duration) -> Self {
        Self {
            uri: uri.into(),
            timeout: duration_to_nanos(timeout),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_nanos(self.timeout)
    }
}

/// Features of every event that answers (or aborts) an earlier one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyFeatures {
    #[serde(rename = "invocationID")]
    pub invocation_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextFeatures {
    #[serde(rename = "generatorID")]
    pub generator_id: String,
    #[serde(rename = "yieldID")]
    pub yield_id: String,
    pub timeout: u64,
}

impl NextFeatures {
    pub fn new(generator_id: impl Into<String>, yield_id: impl Into<String>, timeout: Duration) -> Self {
        Self {
            generator_id: generator_id.into(),
            yield_id: yield_id.into(),
            timeout: duration_to_nanos(timeout),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_nanos(self.timeout)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Older peers send only `message`; decoding then copies it here.
    #[serde(default)]
    pub name: String,
    pub message: String,
}

/// Attached by a router to inbound Publish/Call events. `endpoint_id` names the
/// local subscription or registration that must handle the event.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Route {
    #[serde(rename = "endpointID")]
    pub endpoint_id: String,
    #[serde(rename = "publisherID", default, skip_serializing_if = "Option::is_none")]
    pub publisher_id: Option<String>,
    #[serde(rename = "subscriberID", default, skip_serializing_if = "Option::is_none")]
    pub subscriber_id: Option<String>,
    #[serde(rename = "callerID", default, skip_serializing_if = "Option::is_none")]
    pub caller_id: Option<String>,
    #[serde(rename = "executorID", default, skip_serializing_if = "Option::is_none")]
    pub executor_id: Option<String>,
    #[serde(rename = "visitedRouters", default)]
    pub visited_routers: Vec<String>,
}

impl Route {
    pub fn to_endpoint(endpoint_id: impl Into<String>) -> Self {
        Self {
            endpoint_id: endpoint_id.into(),
            ..Self::default()
        }
    }
}

fn duration_to_nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

// ============================================================================
//  EVENTS
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct AcceptEvent {
    pub id: String,
    pub features: AcceptFeatures,
}

impl AcceptEvent {
    /// Acknowledges delivery of `source_id`.
    pub fn new(source_id: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            features: AcceptFeatures { source_id: source_id.into() },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PublishEvent {
    pub id: String,
    pub features: PublishFeatures,
    pub payload: Value,
    pub route: Option<Route>,
}

impl PublishEvent {
    pub fn new(features: PublishFeatures, payload: Value) -> Self {
        Self {
            id: new_id(),
            features,
            payload,
            route: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallEvent {
    pub id: String,
    pub features: CallFeatures,
    pub payload: Value,
    pub route: Option<Route>,
}

impl CallEvent {
    pub fn new(features: CallFeatures, payload: Value) -> Self {
        Self {
            id: new_id(),
            features,
            payload,
            route: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReplyEvent {
    pub id: String,
    pub features: ReplyFeatures,
    pub payload: Value,
}

impl ReplyEvent {
    pub fn new(invocation_id: impl Into<String>, payload: Value) -> Self {
        Self {
            id: new_id(),
            features: ReplyFeatures { invocation_id: invocation_id.into() },
            payload,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ErrorEvent {
    pub id: String,
    pub features: ReplyFeatures,
    pub payload: ErrorPayload,
}

impl ErrorEvent {
    pub fn new(invocation_id: impl Into<String>, name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            features: ReplyFeatures { invocation_id: invocation_id.into() },
            payload: ErrorPayload {
                name: name.into(),
                message: message.into(),
            },
        }
    }

    /// True if this error only marks the end of a stream.
    pub fn is_generator_exit(&self) -> bool {
        self.payload.name == GENERATOR_EXIT
    }
}

/// Aborts a pending invocation, or (as a Stop) an active stream; in the latter
/// case `invocation_id` is the generator id.
#[derive(Debug, Clone, PartialEq)]
pub struct CancelEvent {
    pub id: String,
    pub features: ReplyFeatures,
}

impl CancelEvent {
    pub fn new(invocation_id: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            features: ReplyFeatures { invocation_id: invocation_id.into() },
        }
    }
}

pub type StopEvent = CancelEvent;

#[derive(Debug, Clone, PartialEq)]
pub struct NextEvent {
    pub id: String,
    pub features: NextFeatures,
}

impl NextEvent {
    pub fn new(features: NextFeatures) -> Self {
        Self {
            id: new_id(),
            features,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct YieldEvent {
    pub id: String,
    pub features: ReplyFeatures,
    pub payload: Value,
}

impl YieldEvent {
    pub fn new(invocation_id: impl Into<String>, payload: Value) -> Self {
        Self {
            id: new_id(),
            features: ReplyFeatures { invocation_id: invocation_id.into() },
            payload,
        }
    }
}

/// Any protocol message.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Accept(AcceptEvent),
    Publish(PublishEvent),
    Call(CallEvent),
    Reply(ReplyEvent),
    Error(ErrorEvent),
    Cancel(CancelEvent),
    Next(NextEvent),
    Yield(YieldEvent),
}

impl Event {
    pub fn id(&self) -> &str {
        match self {
            Self::Accept(e) => &e.id,
            Self::Publish(e) => &e.id,
            Self::Call(e) => &e.id,
            Self::Reply(e) => &e.id,
            Self::Error(e) => &e.id,
            Self::Cancel(e) => &e.id,
            Self::Next(e) => &e.id,
            Self::Yield(e) => &e.id,
        }
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Accept(_) => MessageKind::Accept,
            Self::Publish(_) => MessageKind::Publish,
            Self::Call(_) => MessageKind::Call,
            Self::Reply(_) => MessageKind::Reply,
            Self::Error(_) => MessageKind::Error,
            Self::Cancel(_) => MessageKind::Cancel,
            Self::Next(_) => MessageKind::Next,
            Self::Yield(_) => MessageKind::Yield,
        }
    }

    pub fn route(&self) -> Option<&Route> {
        match self {
            Self::Publish(e) => e.route.as_ref(),
            Self::Call(e) => e.route.as_ref(),
            _ => None,
        }
    }
}

macro_rules! impl_from_event {
    ($($variant:ident => $ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Event {
                fn from(e: $ty) -> Self {
                    Self::$variant(e)
                }
            }
        )*
    };
}

impl_from_event! {
    Accept => AcceptEvent,
    Publish => PublishEvent,
    Call => CallEvent,
    Reply => ReplyEvent,
    Error => ErrorEvent,
    Cancel => CancelEvent,
    Next => NextEvent,
    Yield => YieldEvent,
}
