//! # Pending
//!
//! A one-shot completion cell split into a [`Resolver`] (the writing half) and a
//! [`Pending`] future (the waiting half).
//!
//! Resolving consumes the resolver, so a value can be delivered at most once;
//! a second resolution cannot be expressed. Resolving after the waiter went
//! away is a silent no-op.

use std::future::Future;
use std::pin::Pin;
use std::task::Context;
use std::task::Poll;

use tokio::sync::oneshot;

/// Why a pending value will never arrive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cancelled {
    /// The connection was torn down for good.
    Closed,
    /// The connection was replaced underneath; delivery is unknown.
    Restored,
    /// The resolver was dropped without resolving.
    Dropped,
    /// The answer arrived but could not be read.
    Malformed(String),
    /// Explicit cancellation with a free-form reason.
    Reason(String),
}

impl std::fmt::Display for Cancelled {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "connection closed"),
            Self::Restored => write!(f, "connection restored"),
            Self::Dropped => write!(f, "resolver dropped"),
            Self::Malformed(reason) => write!(f, "malformed answer: {}", reason),
            Self::Reason(reason) => write!(f, "cancelled: {}", reason),
        }
    }
}

impl std::error::Error for Cancelled {}

type Slot<T> = std::result::Result<T, Cancelled>;

/// Creates a linked resolver/pending pair.
pub fn pending<T>() -> (Resolver<T>, Pending<T>) {
    let (tx, rx) = oneshot::channel();
    (Resolver { tx }, Pending { rx, release: None })
}

pub struct Resolver<T> {
    tx: oneshot::Sender<Slot<T>>,
}

impl<T> Resolver<T> {
    /// Returns `false` if nobody was waiting any more.
    pub fn complete(self, value: T) -> bool {
        self.tx.send(Ok(value)).is_ok()
    }

    pub fn cancel(self, reason: Cancelled) -> bool {
        self.tx.send(Err(reason)).is_ok()
    }

    pub fn is_abandoned(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Resolves to the delivered value, or to the reason it never will be.
///
/// Dropping a `Pending` runs its release hook, if any. `PendingMap` uses this
/// to unregister waits that lost a race or were abandoned.
pub struct Pending<T> {
    rx: oneshot::Receiver<Slot<T>>,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl<T> Pending<T> {
    pub(crate) fn on_release(mut self, release: impl FnOnce() + Send + 'static) -> Self {
        self.release = Some(Box::new(release));
        self
    }
}

impl<T> Future for Pending<T> {
    type Output = Slot<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(slot)) => Poll::Ready(slot),
            Poll::Ready(Err(_)) => Poll::Ready(Err(Cancelled::Dropped)),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T> Drop for Pending<T> {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}
