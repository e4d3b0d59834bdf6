//! # Wire Codec
//!
//! Every event travels as one envelope:
//!
//! ```text
//! { "ID": "...", "kind": 127, "features": {...}, "payload": ..., "route": {...} }
//! ```
//!
//! `payload` is omitted for kinds that have none (Accept, Cancel/Stop, Next),
//! and `route` is omitted unless a router attached one to a Publish or Call.
//!
//! [`Event`] implements `Serialize`/`Deserialize` through this envelope, so any
//! serde format can carry it. [`Serializer`] is the text contract transports
//! consume; [`JsonSerializer`] is the stock implementation.

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::Error;
use crate::error::Result;
use crate::event::*;
use crate::kind::MessageKind;

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    #[serde(rename = "ID")]
    id: String,
    kind: MessageKind,
    features: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    route: Option<Route>,
}

impl Envelope {
    fn seal<F: Serialize>(id: &str, kind: MessageKind, features: &F) -> Result<Self> {
        Ok(Self {
            id: id.to_string(),
            kind,
            features: serde_json::to_value(features)?,
            payload: None,
            route: None,
        })
    }

    fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    fn with_route(mut self, route: Option<&Route>) -> Self {
        self.route = route.cloned();
        self
    }

    fn features<F: DeserializeOwned>(&self) -> Result<F> {
        F::deserialize(&self.features).map_err(|e| {
            Error::Protocol(format!("bad features for {}: {}", self.kind, e))
        })
    }

    /// Absent and `null` payloads are the same value.
    fn payload(&mut self) -> Value {
        self.payload.take().unwrap_or(Value::Null)
    }

    /// Opens the envelope. If the kind-specific parts do not fit, the error
    /// still carries whatever identifies the event.
    fn open(self) -> Result<Event> {
        let id = self.id.clone();
        let kind = self.kind;
        let invocation_id = self
            .features
            .get("invocationID")
            .and_then(Value::as_str)
            .map(str::to_string);

        self.unseal().map_err(|e| Error::Malformed {
            id,
            kind,
            invocation_id,
            reason: e.to_string(),
        })
    }

    fn unseal(mut self) -> Result<Event> {
        let event = match self.kind {
            MessageKind::Accept => Event::Accept(AcceptEvent {
                features: self.features()?,
                id: self.id,
            }),
            MessageKind::Publish => Event::Publish(PublishEvent {
                features: self.features()?,
                payload: self.payload(),
                route: self.route,
                id: self.id,
            }),
            MessageKind::Call => Event::Call(CallEvent {
                features: self.features()?,
                payload: self.payload(),
                route: self.route,
                id: self.id,
            }),
            MessageKind::Reply => Event::Reply(ReplyEvent {
                features: self.features()?,
                payload: self.payload(),
                id: self.id,
            }),
            MessageKind::Error => {
                let features = self.features()?;
                let mut payload = ErrorPayload::deserialize(self.payload()).map_err(|e| {
                    Error::Protocol(format!("bad error payload: {}", e))
                })?;
                if payload.name.is_empty() {
                    payload.name = payload.message.clone();
                }
                Event::Error(ErrorEvent { id: self.id, features, payload })
            }
            MessageKind::Cancel => Event::Cancel(CancelEvent {
                features: self.features()?,
                id: self.id,
            }),
            MessageKind::Next => Event::Next(NextEvent {
                features: self.features()?,
                id: self.id,
            }),
            MessageKind::Yield => Event::Yield(YieldEvent {
                features: self.features()?,
                payload: self.payload(),
                id: self.id,
            }),
        };
        Ok(event)
    }
}

impl TryFrom<&Event> for Envelope {
    type Error = Error;

    fn try_from(event: &Event) -> Result<Self> {
        let kind = event.kind();
        let envelope = match event {
            Event::Accept(e) => Envelope::seal(&e.id, kind, &e.features)?,
            Event::Publish(e) => Envelope::seal(&e.id, kind, &e.features)?
                .with_payload(e.payload.clone())
                .with_route(e.route.as_ref()),
            Event::Call(e) => Envelope::seal(&e.id, kind, &e.features)?
                .with_payload(e.payload.clone())
                .with_route(e.route.as_ref()),
            Event::Reply(e) => Envelope::seal(&e.id, kind, &e.features)?
                .with_payload(e.payload.clone()),
            Event::Error(e) => Envelope::seal(&e.id, kind, &e.features)?
                .with_payload(serde_json::to_value(&e.payload)?),
            Event::Cancel(e) => Envelope::seal(&e.id, kind, &e.features)?,
            Event::Next(e) => Envelope::seal(&e.id, kind, &e.features)?,
            Event::Yield(e) => Envelope::seal(&e.id, kind, &e.features)?
                .with_payload(e.payload.clone()),
        };
        Ok(envelope)
    }
}

impl Serialize for Event {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        Envelope::try_from(self)
            .map_err(serde::ser::Error::custom)?
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Event {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Envelope::deserialize(deserializer)?
            .open()
            .map_err(serde::de::Error::custom)
    }
}

/// Converts events to and from their textual wire form.
pub trait Serializer: Send + Sync + 'static {
    fn encode(&self, event: &Event) -> Result<String>;
    fn decode(&self, message: &str) -> Result<Event>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn encode(&self, event: &Event) -> Result<String> {
        let envelope = Envelope::try_from(event)?;
        Ok(serde_json::to_string(&envelope)?)
    }

    fn decode(&self, message: &str) -> Result<Event> {
        let envelope: Envelope = serde_json::from_str(message)?;
        envelope.open()
    }
}
