//! # Reconnecting Transport
//!
//! [`Reconnectable`] supervises a link produced by a [`Connector`] and hides
//! recoverable faults from its reader.
//!
//! ## Behaviour
//!
//! - A recoverable read fault pauses the link: the writer lock is taken first,
//!   then the reader lock, so no I/O touches the broken link. The supervisor
//!   then waits, reconnects, swaps the fresh link in, reloads the strategy and
//!   resumes. The reader receives a single [`Error::Restored`]; its next read
//!   comes from the fresh link.
//! - Writes issued during recovery wait for it to finish.
//! - A terminal fault, or running out of attempts, closes the supervisor for
//!   good; every later read or write fails with `Closed`.
//! - [`Reconnectable::close`] also interrupts a recovery in progress. A link
//!   that connects after the close is closed again instead of swapped in.

use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::PoisonError;
use std::sync::RwLock;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use tokio::sync::Mutex;
use tokio::sync::Notify;
use tracing::debug;
use tracing::info;
use tracing::warn;

use neowamp::Event;

use crate::retry::RetryStrategy;
use crate::transport::Connector;
use crate::transport::Error;
use crate::transport::Result;
use crate::transport::Transport;

pub struct Reconnectable {
    connector: Box<dyn Connector>,
    strategy: StdMutex<RetryStrategy>,
    current: RwLock<Arc<dyn Transport>>,
    reading: Mutex<()>,
    writing: Mutex<()>,
    shutdown: Shutdown,
}

/// Closed flag that sleeping or connecting tasks can wait on.
#[derive(Default)]
struct Shutdown {
    closed: AtomicBool,
    notify: Notify,
}

impl Shutdown {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    async fn wait(&self) {
        let notified = self.notify.notified();
        if self.is_closed() {
            return;
        }
        notified.await;
    }
}

fn closed() -> Error {
    Error::Closed("supervisor closed".into())
}

impl Reconnectable {
    /// Establishes the first link, consuming attempts from `strategy`.
    pub async fn connect(connector: impl Connector, strategy: RetryStrategy) -> Result<Self> {
        let connector: Box<dyn Connector> = Box::new(connector);
        let strategy = StdMutex::new(strategy);
        let shutdown = Shutdown::default();
        let transport = establish(&*connector, &strategy, &shutdown).await?;
        info!("transport connected");

        Ok(Self {
            connector,
            strategy,
            current: RwLock::new(Arc::from(transport)),
            reading: Mutex::new(()),
            writing: Mutex::new(()),
            shutdown,
        })
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_closed()
    }

    fn current(&self) -> Arc<dyn Transport> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(closed());
        }
        Ok(())
    }

    async fn reconnect(&self) -> Result<()> {
        let _writing = self.writing.lock().await;
        let _reading = self.reading.lock().await;
        debug!("io paused");

        let fresh = match establish(&*self.connector, &self.strategy, &self.shutdown).await {
            Ok(fresh) => fresh,
            Err(e) => {
                self.shutdown.close();
                return Err(e);
            }
        };

        let fresh: Arc<dyn Transport> = Arc::from(fresh);
        let broken = {
            let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *current, fresh.clone())
        };
        if let Err(e) = broken.close().await {
            debug!("closing broken link failed: {}", e);
        }
        if self.is_closed() {
            discard(&*fresh).await;
            return Err(closed());
        }

        info!("transport reconnected");
        Ok(())
    }
}

async fn establish(
    connector: &dyn Connector,
    strategy: &StdMutex<RetryStrategy>,
    shutdown: &Shutdown,
) -> Result<Box<dyn Transport>> {
    loop {
        if shutdown.is_closed() {
            return Err(closed());
        }
        let delay = {
            let mut strategy = strategy.lock().unwrap_or_else(PoisonError::into_inner);
            strategy.next().map_err(|e| Error::Closed(e.to_string()))?
        };
        if !delay.is_zero() {
            debug!("next connection attempt in {:?}", delay);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.wait() => return Err(closed()),
            }
        }

        let attempt = tokio::select! {
            attempt = connector.connect() => attempt,
            _ = shutdown.wait() => return Err(closed()),
        };
        match attempt {
            Ok(transport) if shutdown.is_closed() => {
                discard(&*transport).await;
                return Err(closed());
            }
            Ok(transport) => {
                strategy.lock().unwrap_or_else(PoisonError::into_inner).reset();
                return Ok(transport);
            }
            Err(e) => warn!("connection attempt failed: {}", e),
        }
    }
}

async fn discard(transport: &dyn Transport) {
    if let Err(e) = transport.close().await {
        debug!("closing discarded link failed: {}", e);
    }
}

#[async_trait::async_trait]
impl Transport for Reconnectable {
    async fn write(&self, event: &Event) -> Result<()> {
        let _writing = self.writing.lock().await;
        self.ensure_open()?;
        self.current().write(event).await
    }

    async fn read(&self) -> Result<Event> {
        self.ensure_open()?;
        let result = {
            let _reading = self.reading.lock().await;
            self.current().read().await
        };

        match result {
            Err(e) if e.is_recoverable() => {
                warn!("transport broken, reconnecting: {}", e);
                self.reconnect().await?;
                Err(Error::Restored)
            }
            Err(e) if e.is_terminal() => {
                self.shutdown.close();
                Err(e)
            }
            other => other,
        }
    }

    async fn close(&self) -> Result<()> {
        self.shutdown.close();
        self.current().close().await
    }
}
