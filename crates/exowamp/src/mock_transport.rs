//! In-memory transports for testing.
//!
//! [`DuplexTransport::pair`] yields two connected ends. Events are encoded to
//! text on `write` and decoded on `read`, so the wire codec is exercised
//! exactly as over a socket. A [`Fault`] handle lets a test break an end from
//! the outside.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use neowamp::Event;
use neowamp::JsonSerializer;
use neowamp::Serializer;

use crate::shared::Queue;
use crate::transport;
use crate::transport::Transport;

type Inbox = Queue<String, transport::Error>;

pub struct DuplexTransport {
    inbox: Arc<Inbox>,
    outbox: Arc<Inbox>,
    serializer: Arc<dyn Serializer>,
    closed: AtomicBool,
}

impl DuplexTransport {
    /// Creates a pair of transports connected to each other.
    ///
    /// Events written on `a` are read by `b` and vice versa.
    pub fn pair() -> (Self, Self) {
        Self::pair_with(Arc::new(JsonSerializer))
    }

    pub fn pair_with(serializer: Arc<dyn Serializer>) -> (Self, Self) {
        let a_to_b = Arc::new(Inbox::new());
        let b_to_a = Arc::new(Inbox::new());

        let a = Self {
            inbox: b_to_a.clone(),
            outbox: a_to_b.clone(),
            serializer: serializer.clone(),
            closed: AtomicBool::new(false),
        };
        let b = Self {
            inbox: a_to_b,
            outbox: b_to_a,
            serializer,
            closed: AtomicBool::new(false),
        };
        (a, b)
    }

    /// A handle that can inject failures into this end's reads.
    pub fn fault(&self) -> Fault {
        Fault {
            inbox: self.inbox.clone(),
        }
    }

    /// Pushes a raw text frame to the other end, bypassing the encoder.
    pub fn write_raw(&self, message: impl Into<String>) {
        self.outbox.put(message.into());
    }
}

#[derive(Clone)]
pub struct Fault {
    inbox: Arc<Inbox>,
}

impl Fault {
    /// The next read on the faulted end returns `error`.
    pub fn inject(&self, error: transport::Error) {
        self.inbox.put_error(error);
    }

    pub fn break_link(&self) {
        self.inject(transport::Error::Broken("link broken".into()));
    }
}

#[async_trait::async_trait]
impl Transport for DuplexTransport {
    async fn write(&self, event: &Event) -> transport::Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(transport::Error::Closed("write on closed transport".into()));
        }
        let message = self
            .serializer
            .encode(event)
            .map_err(|e| transport::Error::Io(e.to_string()))?;
        self.outbox.put(message);
        Ok(())
    }

    async fn read(&self) -> transport::Result<Event> {
        let message = self.inbox.pop().await?;
        Ok(self.serializer.decode(&message)?)
    }

    async fn close(&self) -> transport::Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.inbox.put_error(transport::Error::Closed("closed locally".into()));
            self.outbox.put_error(transport::Error::Closed("closed by remote".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use neowamp::PublishEvent;
    use neowamp::PublishFeatures;

    use super::*;

    #[tokio::test]
    async fn test_pair_moves_events_both_ways() {
        let (a, b) = DuplexTransport::pair();
        let event: Event = PublishEvent::new(PublishFeatures::new("net.example"), json!(1)).into();

        a.write(&event).await.unwrap();
        assert_eq!(b.read().await.unwrap(), event);

        b.write(&event).await.unwrap();
        assert_eq!(a.read().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_close_is_seen_by_both_ends() {
        let (a, b) = DuplexTransport::pair();
        a.close().await.unwrap();
        assert!(a.read().await.unwrap_err().is_terminal());
        assert!(b.read().await.unwrap_err().is_terminal());
        assert!(a.write(&PublishEvent::new(PublishFeatures::new("x"), json!(null)).into()).await.is_err());
    }

    #[tokio::test]
    async fn test_garbage_is_a_decode_error() {
        let (a, b) = DuplexTransport::pair();
        a.write_raw("not json");
        assert!(matches!(b.read().await, Err(transport::Error::Decode(_))));
    }

    #[tokio::test]
    async fn test_fault_injection() {
        let (a, _b) = DuplexTransport::pair();
        a.fault().break_link();
        assert!(a.read().await.unwrap_err().is_recoverable());
    }
}
