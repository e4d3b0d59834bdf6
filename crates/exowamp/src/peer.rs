//! # Peer with Receive Loop
//!
//! A `Peer` owns one transport and a background task that reads every inbound
//! event, acknowledges it, and routes it either to a waiting caller (through
//! the pending tables) or to the observables that sessions subscribe to.
//!
//! ## Delivery
//!
//! Every outbound event except an Accept is confirmed: [`Peer::send`] resolves
//! only once the remote side has sent back an Accept whose `source_id` is the
//! event's id. Every inbound event except an Accept is acknowledged the same
//! way before it is routed.
//!
//! ## Routing table
//!
//! | inbound       | resolves                    | keyed by        |
//! |---------------|-----------------------------|-----------------|
//! | Accept        | `pending_accept_events`     | `source_id`     |
//! | Reply / Error / Yield | `pending_reply_events` | `invocation_id` |
//! | Next          | `pending_next_events`       | `yield_id`      |
//! | Cancel / Stop | `pending_cancel_events`     | `invocation_id` |
//! | Publish       | `incoming_publish_events`   | -               |
//! | Call          | `incoming_call_events`      | -               |
//!
//! ## Teardown
//!
//! An event whose envelope is readable but whose body is not is still
//! acknowledged; if it answers an invocation, that wait fails with
//! [`Error::Protocol`].
//!
//! A restored transport cancels every in-flight acknowledgement and announces
//! a rejoin. A terminal fault completes all observables and cancels every wait
//! in every table.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use tracing::debug;
use tracing::info;
use tracing::warn;

use neowamp::AcceptEvent;
use neowamp::CallEvent;
use neowamp::CancelEvent;
use neowamp::ErrorEvent;
use neowamp::Event;
use neowamp::MessageKind;
use neowamp::NextEvent;
use neowamp::PublishEvent;
use neowamp::ReplyEvent;
use neowamp::YieldEvent;

use crate::shared::Cancelled;
use crate::shared::Observable;
use crate::shared::PendingMap;
use crate::shared::pending_map;
use crate::transport;
use crate::transport::Transport;

#[derive(Debug, Clone)]
pub enum Error {
    Transport(transport::Error),
    Pending(pending_map::Error),
    /// The peer stopped before the awaited event arrived.
    ConnectionClosed,
    /// The transport was replaced before the awaited event arrived; the
    /// remote side may or may not have seen the request.
    ConnectionRestored,
    Cancelled(String),
    /// The answer arrived but could not be decoded.
    Protocol(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "Transport error: {}", e),
            Self::Pending(e) => write!(f, "Pending error: {}", e),
            Self::ConnectionClosed => write!(f, "Connection closed"),
            Self::ConnectionRestored => write!(f, "Connection restored"),
            Self::Cancelled(reason) => write!(f, "Cancelled: {}", reason),
            Self::Protocol(reason) => write!(f, "Protocol error: {}", reason),
        }
    }
}

impl std::error::Error for Error {}

impl From<transport::Error> for Error {
    fn from(e: transport::Error) -> Self {
        Self::Transport(e)
    }
}

impl From<pending_map::Error> for Error {
    fn from(e: pending_map::Error) -> Self {
        Self::Pending(e)
    }
}

impl From<Cancelled> for Error {
    fn from(reason: Cancelled) -> Self {
        match reason {
            Cancelled::Closed | Cancelled::Dropped => Self::ConnectionClosed,
            Cancelled::Restored => Self::ConnectionRestored,
            Cancelled::Reason(reason) => Self::Cancelled(reason),
            Cancelled::Malformed(reason) => Self::Protocol(reason),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Anything that answers an invocation: a final Reply, a failure, or one
/// piece of a stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Reply(ReplyEvent),
    Error(ErrorEvent),
    Yield(YieldEvent),
}

impl Response {
    pub fn invocation_id(&self) -> &str {
        match self {
            Self::Reply(e) => &e.features.invocation_id,
            Self::Error(e) => &e.features.invocation_id,
            Self::Yield(e) => &e.features.invocation_id,
        }
    }
}

struct PeerInner {
    id: String,
    transport: Arc<dyn Transport>,
    closed: AtomicBool,

    pending_accept_events: PendingMap<AcceptEvent>,
    pending_reply_events: PendingMap<Response>,
    pending_cancel_events: PendingMap<CancelEvent>,
    pending_next_events: PendingMap<NextEvent>,

    incoming_publish_events: Observable<PublishEvent>,
    incoming_call_events: Observable<CallEvent>,
    rejoin_events: Observable<()>,
}

/// Protocol peer. Cheap to clone; all clones share one transport and one
/// receive loop.
#[derive(Clone)]
pub struct Peer {
    inner: Arc<PeerInner>,
}

impl std::fmt::Debug for Peer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Peer")
            .field("id", &self.inner.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Peer {
    /// Creates a new peer and spawns its receive loop.
    ///
    /// `id` is the identity the router assigned to this peer; it is used for
    /// logging.
    pub fn spawn(id: impl Into<String>, transport: Box<dyn Transport>) -> Self {
        let inner = Arc::new(PeerInner {
            id: id.into(),
            transport: Arc::from(transport),
            closed: AtomicBool::new(false),
            pending_accept_events: PendingMap::new(),
            pending_reply_events: PendingMap::new(),
            pending_cancel_events: PendingMap::new(),
            pending_next_events: PendingMap::new(),
            incoming_publish_events: Observable::new(),
            incoming_call_events: Observable::new(),
            rejoin_events: Observable::new(),
        });

        tokio::spawn(inner.clone().listen());

        Self { inner }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Writes `event` and waits for the remote side to accept it.
    ///
    /// Accept events are written without waiting.
    pub async fn send(&self, event: impl Into<Event>) -> Result<()> {
        let event = event.into();
        if let Event::Accept(_) = event {
            self.inner.transport.write(&event).await?;
            return Ok(());
        }

        let accepted = self.inner.pending_accept_events.create(event.id())?;
        if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }

        debug!(peer = %self.inner.id, kind = %event.kind(), id = event.id(), "sending event");
        self.inner.transport.write(&event).await?;
        accepted.await?;
        Ok(())
    }

    /// Closes the transport. The receive loop ends and tears the peer down.
    pub async fn close(&self) -> Result<()> {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.transport.close().await?;
        Ok(())
    }

    pub fn pending_accept_events(&self) -> &PendingMap<AcceptEvent> {
        &self.inner.pending_accept_events
    }

    pub fn pending_reply_events(&self) -> &PendingMap<Response> {
        &self.inner.pending_reply_events
    }

    pub fn pending_cancel_events(&self) -> &PendingMap<CancelEvent> {
        &self.inner.pending_cancel_events
    }

    pub fn pending_next_events(&self) -> &PendingMap<NextEvent> {
        &self.inner.pending_next_events
    }

    pub fn incoming_publish_events(&self) -> &Observable<PublishEvent> {
        &self.inner.incoming_publish_events
    }

    pub fn incoming_call_events(&self) -> &Observable<CallEvent> {
        &self.inner.incoming_call_events
    }

    /// Fires after every transport restoration.
    pub fn rejoin_events(&self) -> &Observable<()> {
        &self.inner.rejoin_events
    }
}

impl PeerInner {
    async fn listen(self: Arc<Self>) {
        loop {
            match self.transport.read().await {
                Ok(event) => self.dispatch(event).await,
                Err(transport::Error::Restored) => self.restored(),
                Err(transport::Error::Decode(e)) => self.undecodable(e).await,
                Err(e) => {
                    info!(peer = %self.id, "receive loop stopped: {}", e);
                    break;
                }
            }
        }
        self.shutdown();
    }

    async fn dispatch(&self, event: Event) {
        debug!(peer = %self.id, kind = %event.kind(), id = event.id(), "new event");

        if let Event::Accept(accept) = event {
            let source_id = accept.features.source_id.clone();
            settle(&self.pending_accept_events, &source_id, accept);
            return;
        }

        self.acknowledge(event.id()).await;

        match event {
            Event::Accept(_) => {}
            Event::Reply(e) => {
                let key = e.features.invocation_id.clone();
                settle(&self.pending_reply_events, &key, Response::Reply(e));
            }
            Event::Error(e) => {
                let key = e.features.invocation_id.clone();
                settle(&self.pending_reply_events, &key, Response::Error(e));
            }
            Event::Yield(e) => {
                let key = e.features.invocation_id.clone();
                settle(&self.pending_reply_events, &key, Response::Yield(e));
            }
            Event::Next(e) => {
                let key = e.features.yield_id.clone();
                settle(&self.pending_next_events, &key, e);
            }
            Event::Cancel(e) => {
                let key = e.features.invocation_id.clone();
                settle(&self.pending_cancel_events, &key, e);
            }
            Event::Publish(e) => self.incoming_publish_events.next(e),
            Event::Call(e) => self.incoming_call_events.next(e),
        }
    }

    async fn acknowledge(&self, source_id: &str) {
        let accept: Event = AcceptEvent::new(source_id).into();
        if let Err(e) = self.transport.write(&accept).await {
            warn!(peer = %self.id, source_id, "failed to acknowledge event: {}", e);
        }
    }

    /// An undecodable event is dropped. If its envelope was readable it is
    /// still acknowledged, and an answer it carried fails the call waiting
    /// for it.
    async fn undecodable(&self, error: neowamp::Error) {
        warn!(peer = %self.id, "undecodable event: {}", error);
        let neowamp::Error::Malformed { id, kind, invocation_id, reason } = error else {
            return;
        };
        if kind == MessageKind::Accept {
            return;
        }

        self.acknowledge(&id).await;

        let answers = matches!(kind, MessageKind::Reply | MessageKind::Error | MessageKind::Yield);
        if let (true, Some(invocation_id)) = (answers, invocation_id) {
            if let Err(e) = self
                .pending_reply_events
                .cancel(&invocation_id, Cancelled::Malformed(reason))
            {
                warn!("{}", e);
            }
        }
    }

    fn restored(&self) {
        let cancelled = self.pending_accept_events.cancel_all(Cancelled::Restored);
        info!(peer = %self.id, cancelled, "transport restored, rejoining");
        self.rejoin_events.next(());
    }

    fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);

        self.incoming_publish_events.complete();
        self.incoming_call_events.complete();
        self.rejoin_events.complete();

        self.pending_accept_events.cancel_all(Cancelled::Closed);
        self.pending_reply_events.cancel_all(Cancelled::Closed);
        self.pending_cancel_events.cancel_all(Cancelled::Closed);
        self.pending_next_events.cancel_all(Cancelled::Closed);
        info!(peer = %self.id, "peer closed");
    }
}

fn settle<T: Send + 'static>(map: &PendingMap<T>, key: &str, value: T) {
    if let Err(e) = map.complete(key, value) {
        warn!("{}", e);
    }
}
