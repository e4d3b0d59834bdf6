//! # Pending Map
//!
//! A keyed registry of [`Pending`] waits, used to correlate inbound events
//! (Accept, Reply/Error/Yield, Next, Cancel/Stop) with whoever awaits them.
//!
//! ## Invariants
//!
//! - At most one wait per key. A second `create` on a live key is rejected.
//! - `complete` removes the entry before resolving it; completing an unknown
//!   key is a protocol-integrity error, not a condition to retry.
//! - Dropping the `Pending` returned by `create` releases the key, unless the
//!   key was already completed or re-created since.

use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::shared::pending::Cancelled;
use crate::shared::pending::Pending;
use crate::shared::pending::Resolver;
use crate::shared::pending::pending;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// No wait is registered under this id.
    PendingNotFound(String),
    /// A wait is already registered under this id.
    AlreadyPending(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PendingNotFound(id) => write!(f, "Pending not found: {}", id),
            Self::AlreadyPending(id) => write!(f, "Already pending: {}", id),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

struct Waiter<T> {
    ticket: u64,
    resolver: Resolver<T>,
}

pub struct PendingMap<T> {
    entries: Arc<DashMap<String, Waiter<T>>>,
    tickets: Arc<AtomicU64>,
}

impl<T> Clone for PendingMap<T> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
            tickets: self.tickets.clone(),
        }
    }
}

impl<T: Send + 'static> Default for PendingMap<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> PendingMap<T> {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            tickets: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Registers a wait under `id` and returns it.
    pub fn create(&self, id: impl Into<String>) -> Result<Pending<T>> {
        let id = id.into();
        let ticket = self.tickets.fetch_add(1, Ordering::Relaxed);
        let (resolver, pending) = pending();

        match self.entries.entry(id.clone()) {
            Entry::Occupied(_) => return Err(Error::AlreadyPending(id)),
            Entry::Vacant(slot) => {
                slot.insert(Waiter { ticket, resolver });
            }
        }

        let entries = Arc::downgrade(&self.entries);
        Ok(pending.on_release(move || {
            if let Some(entries) = entries.upgrade() {
                entries.remove_if(&id, |_, waiter| waiter.ticket == ticket);
            }
        }))
    }

    /// Removes the wait under `id` and hands it `value`.
    pub fn complete(&self, id: &str, value: T) -> Result<()> {
        let (_, waiter) = self
            .entries
            .remove(id)
            .ok_or_else(|| Error::PendingNotFound(id.to_string()))?;
        waiter.resolver.complete(value);
        Ok(())
    }

    /// Removes the wait under `id` and fails it with `reason`.
    pub fn cancel(&self, id: &str, reason: Cancelled) -> Result<()> {
        let (_, waiter) = self
            .entries
            .remove(id)
            .ok_or_else(|| Error::PendingNotFound(id.to_string()))?;
        waiter.resolver.cancel(reason);
        Ok(())
    }

    /// Fails every registered wait with `reason`. Returns how many there were.
    pub fn cancel_all(&self, reason: Cancelled) -> usize {
        let keys: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        let mut cancelled = 0;
        for key in keys {
            if let Some((_, waiter)) = self.entries.remove(&key) {
                waiter.resolver.cancel(reason.clone());
                cancelled += 1;
            }
        }
        cancelled
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use neowamp::new_id;

    use super::*;

    #[tokio::test]
    async fn test_complete_resolves_waiter() {
        let map = PendingMap::<String>::new();
        let id = new_id();
        let pending = map.create(&id).unwrap();

        let completer = map.clone();
        let key = id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            completer.complete(&key, "WAMP".to_string()).unwrap();
        });

        assert_eq!(pending.await, Ok("WAMP".to_string()));
        assert!(map.is_empty());
    }

    #[test]
    fn test_complete_unknown_id_fails() {
        let map = PendingMap::<u32>::new();
        assert_eq!(map.complete("missing", 1), Err(Error::PendingNotFound("missing".into())));
    }

    #[tokio::test]
    async fn test_second_complete_fails() {
        let map = PendingMap::<u32>::new();
        let pending = map.create("a").unwrap();
        map.complete("a", 1).unwrap();
        assert_eq!(map.complete("a", 2), Err(Error::PendingNotFound("a".into())));
        assert_eq!(pending.await, Ok(1));
    }

    #[test]
    fn test_duplicate_create_is_rejected() {
        let map = PendingMap::<u32>::new();
        let _first = map.create("a").unwrap();
        assert!(matches!(map.create("a"), Err(Error::AlreadyPending(id)) if id == "a"));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_dropping_pending_releases_key() {
        let map = PendingMap::<u32>::new();
        let pending = map.create("a").unwrap();
        assert!(map.contains("a"));
        drop(pending);
        assert!(!map.contains("a"));
        assert!(map.create("a").is_ok());
    }

    #[test]
    fn test_stale_release_keeps_new_wait() {
        let map = PendingMap::<u32>::new();
        let first = map.create("a").unwrap();
        map.complete("a", 1).unwrap();
        let _second = map.create("a").unwrap();
        drop(first);
        assert!(map.contains("a"));
    }

    #[tokio::test]
    async fn test_cancel_all_fails_every_waiter() {
        let map = PendingMap::<u32>::new();
        let a = map.create("a").unwrap();
        let b = map.create("b").unwrap();
        assert_eq!(map.cancel_all(Cancelled::Closed), 2);
        assert_eq!(a.await, Err(Cancelled::Closed));
        assert_eq!(b.await, Err(Cancelled::Closed));
        assert!(map.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_single_waiter() {
        let map = PendingMap::<u32>::new();
        let a = map.create("a").unwrap();
        map.cancel("a", Cancelled::Reason("stop".into())).unwrap();
        assert_eq!(a.await, Err(Cancelled::Reason("stop".into())));
        assert!(map.cancel("a", Cancelled::Closed).is_err());
    }
}
