//! # Session
//!
//! The user-facing API on top of a [`Peer`]: publish, call, subscribe,
//! register and their inverses.
//!
//! Subscriptions and registrations are created by calling router meta
//! procedures (`wamp.router.subscribe` and friends). Locally each one is kept
//! twice: an [`Entrypoint`] keyed by the router-assigned resource id, which
//! handles inbound events routed to it, and a restore record holding
//! everything needed to re-create it.
//!
//! ## Rejoin
//!
//! When the peer reports a restored transport, every restore record is
//! replayed once and re-keyed under the id the router assigns this time.
//! When the peer closes for good both tables are cleared.

use std::sync::Arc;
use std::sync::Weak;
use std::time::Duration;

use dashmap::DashMap;
use futures::StreamExt;
use futures::stream::BoxStream;
use serde_json::Value;
use serde_json::json;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use neowamp::CallEvent;
use neowamp::CallFeatures;
use neowamp::NewResourcePayload;
use neowamp::NextEvent;
use neowamp::NextFeatures;
use neowamp::PublishEvent;
use neowamp::PublishFeatures;
use neowamp::RegisterOptions;
use neowamp::Registration;
use neowamp::Resource;
use neowamp::StopEvent;
use neowamp::SubscribeOptions;
use neowamp::Subscription;
use neowamp::YieldEvent;
use neowamp::uri;

use crate::endpoints::CallEndpoint;
use crate::endpoints::CallProcedure;
use crate::endpoints::PieceByPieceEndpoint;
use crate::endpoints::PublishEndpoint;
use crate::endpoints::PublishProcedure;
use crate::endpoints::StreamProcedure;
use crate::entrypoints;
use crate::entrypoints::CallEntrypoint;
use crate::entrypoints::Entrypoint;
use crate::entrypoints::Inbound;
use crate::entrypoints::StreamEntrypoint;
use crate::error::ApplicationError;
use crate::peer;
use crate::peer::Peer;
use crate::peer::Response;
use crate::shared::pending_map;

pub const SUBSCRIBE: &str = "wamp.router.subscribe";
pub const UNSUBSCRIBE: &str = "wamp.router.unsubscribe";
pub const REGISTER: &str = "wamp.router.register";
pub const UNREGISTER: &str = "wamp.router.unregister";

/// Timeout attached to calls and stream requests unless overridden.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug)]
pub enum Error {
    /// A URI failed validation before anything was sent.
    Wire(neowamp::Error),
    Peer(peer::Error),
    /// The remote procedure failed.
    Application(ApplicationError),
    /// An answer of the wrong kind arrived.
    Protocol(String),
    /// An answer had the right kind but an unusable payload.
    InvalidPayload(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Wire(e) => write!(f, "{}", e),
            Self::Peer(e) => write!(f, "Peer error: {}", e),
            Self::Application(e) => write!(f, "Application error: {}", e),
            Self::Protocol(msg) => write!(f, "Protocol error: {}", msg),
            Self::InvalidPayload(msg) => write!(f, "Invalid payload: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<neowamp::Error> for Error {
    fn from(e: neowamp::Error) -> Self {
        Self::Wire(e)
    }
}

impl From<peer::Error> for Error {
    fn from(e: peer::Error) -> Self {
        Self::Peer(e)
    }
}

impl From<pending_map::Error> for Error {
    fn from(e: pending_map::Error) -> Self {
        Self::Peer(peer::Error::Pending(e))
    }
}

impl From<ApplicationError> for Error {
    fn from(e: ApplicationError) -> Self {
        Self::Application(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::InvalidPayload(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub default_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            default_timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl SessionOptions {
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }
}

/// A registered procedure: answers once, or streams.
#[derive(Clone)]
pub enum Procedure {
    Call(CallProcedure),
    Stream(StreamProcedure),
}

impl From<CallProcedure> for Procedure {
    fn from(procedure: CallProcedure) -> Self {
        Self::Call(procedure)
    }
}

impl From<StreamProcedure> for Procedure {
    fn from(procedure: StreamProcedure) -> Self {
        Self::Stream(procedure)
    }
}

/// The outcome of [`Session::call`].
#[derive(Debug)]
pub enum CallResult {
    Reply(Value),
    Stream(RemoteGenerator),
}

impl CallResult {
    pub fn into_reply(self) -> Result<Value> {
        match self {
            Self::Reply(value) => Ok(value),
            Self::Stream(_) => Err(Error::Protocol("expected a reply, got a stream".into())),
        }
    }

    pub fn into_stream(self) -> Result<RemoteGenerator> {
        match self {
            Self::Stream(generator) => Ok(generator),
            Self::Reply(_) => Err(Error::Protocol("expected a stream, got a reply".into())),
        }
    }
}

#[derive(Clone)]
enum Restore {
    Subscribe {
        uri: String,
        options: SubscribeOptions,
        procedure: PublishProcedure,
    },
    Register {
        uri: String,
        options: RegisterOptions,
        procedure: Procedure,
    },
}

impl Restore {
    fn meta_uri(&self) -> &'static str {
        match self {
            Self::Subscribe { .. } => SUBSCRIBE,
            Self::Register { .. } => REGISTER,
        }
    }

    fn payload(&self) -> NewResourcePayload {
        let (uri, options) = match self {
            Self::Subscribe { uri, options, .. } => (uri, options),
            Self::Register { uri, options, .. } => (uri, options),
        };
        NewResourcePayload {
            uri: uri.clone(),
            options: options.clone(),
        }
    }

    fn entrypoint(&self, peer: &Peer) -> Entrypoint {
        match self {
            Self::Subscribe { procedure, .. } => Entrypoint::Publish(PublishEndpoint::new(procedure.clone())),
            Self::Register {
                procedure: Procedure::Call(procedure),
                ..
            } => Entrypoint::Call(CallEntrypoint::new(peer.clone(), CallEndpoint::new(procedure.clone()))),
            Self::Register {
                procedure: Procedure::Stream(procedure),
                ..
            } => Entrypoint::Stream(StreamEntrypoint::new(
                peer.clone(),
                PieceByPieceEndpoint::new(procedure.clone()),
            )),
        }
    }
}

struct SessionInner {
    peer: Peer,
    options: SessionOptions,
    entrypoints: DashMap<String, Entrypoint>,
    restores: DashMap<String, Restore>,
    /// Held for the whole of a restore run.
    restoring: tokio::sync::Mutex<()>,
}

#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    pub fn new(peer: Peer) -> Self {
        Self::with_options(peer, SessionOptions::default())
    }

    pub fn with_options(peer: Peer, options: SessionOptions) -> Self {
        let session = Self {
            inner: Arc::new(SessionInner {
                peer,
                options,
                entrypoints: DashMap::new(),
                restores: DashMap::new(),
                restoring: tokio::sync::Mutex::new(()),
            }),
        };
        session.observe_peer();
        session
    }

    fn observe_peer(&self) {
        let peer = &self.inner.peer;

        let weak = Arc::downgrade(&self.inner);
        peer.incoming_publish_events().observe(move |event| {
            if let Some(session) = upgrade(&weak) {
                session.route(Inbound::Publish(event));
            }
        });

        let weak = Arc::downgrade(&self.inner);
        peer.incoming_call_events().observe(move |event| {
            if let Some(session) = upgrade(&weak) {
                session.route(Inbound::Call(event));
            }
        });

        let on_rejoin = Arc::downgrade(&self.inner);
        let on_close = Arc::downgrade(&self.inner);
        peer.rejoin_events().observe_with_complete(
            move |()| {
                if let Some(session) = upgrade(&on_rejoin) {
                    tokio::spawn(async move { session.restore_all().await });
                }
            },
            move || {
                if let Some(session) = upgrade(&on_close) {
                    session.inner.entrypoints.clear();
                    session.inner.restores.clear();
                    debug!(peer = %session.id(), "session closed");
                }
            },
        );
    }

    fn route(&self, inbound: Inbound) {
        let Some(endpoint_id) = inbound.endpoint_id() else {
            warn!("inbound event carries no route, dropping");
            return;
        };
        let Some(entrypoint) = self.inner.entrypoints.get(endpoint_id).map(|e| e.value().clone()) else {
            warn!(endpoint = endpoint_id, "no entrypoint for event, dropping");
            return;
        };
        entrypoints::spawn(entrypoint, inbound);
    }

    /// The id the router assigned to this peer.
    pub fn id(&self) -> &str {
        self.inner.peer.id()
    }

    pub fn peer(&self) -> &Peer {
        &self.inner.peer
    }

    pub fn is_closed(&self) -> bool {
        self.inner.peer.is_closed()
    }

    pub async fn publish(&self, uri: &str, payload: Value) -> Result<()> {
        uri::validate(uri)?;
        let event = PublishEvent::new(PublishFeatures::new(uri), payload);
        self.inner.peer.send(event).await?;
        Ok(())
    }

    /// Calls `uri` with the default timeout.
    pub async fn call(&self, uri: &str, payload: Value) -> Result<CallResult> {
        self.call_with(uri, payload, self.inner.options.default_timeout).await
    }

    pub async fn call_with(&self, uri: &str, payload: Value, timeout: Duration) -> Result<CallResult> {
        uri::validate(uri)?;
        let peer = &self.inner.peer;
        let call = CallEvent::new(CallFeatures::new(uri, timeout), payload);

        let response = peer.pending_reply_events().create(&call.id)?;
        peer.send(call).await?;

        match response.await.map_err(peer::Error::from)? {
            Response::Reply(reply) => Ok(CallResult::Reply(reply.payload)),
            Response::Yield(first) => {
                let generator = RemoteGenerator::open(peer.clone(), first, timeout)?;
                Ok(CallResult::Stream(generator))
            }
            Response::Error(error) => Err(ApplicationError::from(error.payload).into()),
        }
    }

    pub async fn subscribe(
        &self,
        uri: &str,
        options: SubscribeOptions,
        procedure: PublishProcedure,
    ) -> Result<Subscription> {
        uri::validate(uri)?;
        self.establish(Restore::Subscribe {
            uri: uri.to_string(),
            options,
            procedure,
        })
        .await
    }

    pub async fn register(
        &self,
        uri: &str,
        options: RegisterOptions,
        procedure: impl Into<Procedure>,
    ) -> Result<Registration> {
        uri::validate(uri)?;
        self.establish(Restore::Register {
            uri: uri.to_string(),
            options,
            procedure: procedure.into(),
        })
        .await
    }

    /// The local entry is removed even if the router call fails.
    pub async fn unsubscribe(&self, subscription_id: &str) -> Result<()> {
        self.dispose(UNSUBSCRIBE, subscription_id).await
    }

    /// The local entry is removed even if the router call fails.
    pub async fn unregister(&self, registration_id: &str) -> Result<()> {
        self.dispose(UNREGISTER, registration_id).await
    }

    /// Closes the underlying peer.
    pub async fn leave(&self, reason: &str) -> Result<()> {
        info!(peer = %self.id(), reason, "leaving");
        self.inner.peer.close().await?;
        Ok(())
    }

    async fn establish(&self, restore: Restore) -> Result<Resource> {
        let payload = serde_json::to_value(restore.payload())?;
        let reply = self.call(restore.meta_uri(), payload).await?.into_reply()?;
        let resource: Resource = serde_json::from_value(reply)?;

        self.inner
            .entrypoints
            .insert(resource.id.clone(), restore.entrypoint(&self.inner.peer));
        self.inner.restores.insert(resource.id.clone(), restore);
        debug!(uri = %resource.uri, resource = %resource.id, "resource established");
        Ok(resource)
    }

    async fn dispose(&self, meta_uri: &str, resource_id: &str) -> Result<()> {
        let result = self.call(meta_uri, json!(resource_id)).await;
        self.inner.entrypoints.remove(resource_id);
        self.inner.restores.remove(resource_id);
        result.map(|_| ())
    }

    async fn restore_all(&self) {
        // Rejoins in quick succession queue up here.
        let _restoring = self.inner.restoring.lock().await;
        let snapshot: Vec<(String, Restore)> = self
            .inner
            .restores
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        info!(peer = %self.id(), count = snapshot.len(), "restoring resources");

        for (previous_id, restore) in snapshot {
            match self.establish(restore).await {
                Ok(resource) => {
                    if resource.id != previous_id {
                        self.inner.entrypoints.remove(&previous_id);
                        self.inner.restores.remove(&previous_id);
                    }
                    debug!(previous = %previous_id, current = %resource.id, "resource restored");
                }
                Err(e) => error!(resource = %previous_id, "failed to restore resource: {}", e),
            }
        }
    }

    /// Number of live subscriptions and registrations.
    pub fn resource_count(&self) -> usize {
        self.inner.restores.len()
    }

    pub fn has_resource(&self, resource_id: &str) -> bool {
        self.inner.entrypoints.contains_key(resource_id)
    }
}

fn upgrade(weak: &Weak<SessionInner>) -> Option<Session> {
    weak.upgrade().map(|inner| Session { inner })
}

/// Client-side handle of a remote stream.
///
/// Pulls one value per [`advance`](Self::advance). The stream ends when the
/// remote side reports `GeneratorExit`, fails, or is stopped.
#[derive(Debug)]
pub struct RemoteGenerator {
    peer: Peer,
    id: String,
    last_yield_id: String,
    timeout: Duration,
    done: bool,
}

impl RemoteGenerator {
    fn open(peer: Peer, first: YieldEvent, timeout: Duration) -> Result<Self> {
        let id = first
            .payload
            .get("ID")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::InvalidPayload("stream opened without a generator ID".into()))?
            .to_string();
        debug!(generator = %id, "remote stream opened");
        Ok(Self {
            peer,
            id,
            last_yield_id: first.id,
            timeout,
            done: false,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Requests the next value. `Ok(None)` once the stream is over.
    ///
    /// Any error ends the stream; later calls return `Ok(None)`.
    pub async fn advance(&mut self) -> Result<Option<Value>> {
        if self.done {
            return Ok(None);
        }

        let result = self.request_next().await;
        if !matches!(result, Ok(Some(_))) {
            self.done = true;
        }
        result
    }

    async fn request_next(&mut self) -> Result<Option<Value>> {
        let next = NextEvent::new(NextFeatures::new(&self.id, &self.last_yield_id, self.timeout));
        let response = self.peer.pending_reply_events().create(&next.id)?;
        self.peer.send(next).await?;

        match response.await.map_err(peer::Error::from)? {
            Response::Yield(piece) => {
                self.last_yield_id = piece.id;
                Ok(Some(piece.payload))
            }
            Response::Error(error) if error.is_generator_exit() => Ok(None),
            Response::Error(error) => Err(ApplicationError::from(error.payload).into()),
            Response::Reply(_) => Err(Error::Protocol("unexpected Reply inside a stream".into())),
        }
    }

    /// Asks the remote side to stop producing. Idempotent.
    pub async fn stop(&mut self) -> Result<()> {
        if self.done {
            return Ok(());
        }
        self.done = true;
        self.peer.send(StopEvent::new(&self.id)).await?;
        Ok(())
    }

    /// Consumes the handle as a stream of values.
    pub fn into_stream(self) -> BoxStream<'static, Result<Value>> {
        futures::stream::unfold(self, |mut generator| async move {
            match generator.advance().await {
                Ok(Some(value)) => Some((Ok(value), generator)),
                Ok(None) => None,
                Err(e) => Some((Err(e), generator)),
            }
        })
        .boxed()
    }
}
