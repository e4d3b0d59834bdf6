//! # Endpoints
//!
//! Transport-agnostic wrappers around user procedures. An endpoint turns an
//! inbound event into the event that answers it and never lets a procedure
//! failure escape: errors and panics alike are reported as
//! [`ApplicationError`]s.
//!
//! - [`PublishEndpoint`]: runs a subscriber, nothing is answered.
//! - [`CallEndpoint`]: runs a procedure, answers with a Reply or an Error.
//! - [`PieceByPieceEndpoint`]: opens a [`PieceByPiece`] over a streaming
//!   procedure, which answers each Next with a Yield until the producer is
//!   exhausted.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use futures::Stream;
use futures::StreamExt;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use serde_json::Value;
use tracing::debug;
use tracing::error;

use neowamp::CallEvent;
use neowamp::ErrorEvent;
use neowamp::Event;
use neowamp::GENERATOR_EXIT;
use neowamp::GENERATOR_STOP;
use neowamp::NextEvent;
use neowamp::PublishEvent;
use neowamp::ReplyEvent;
use neowamp::YieldEvent;
use neowamp::new_id;

use crate::error::ApplicationError;

pub type PublishProcedure = Arc<dyn Fn(PublishEvent) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;
pub type CallProcedure = Arc<dyn Fn(CallEvent) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;
pub type StreamProcedure = Arc<dyn Fn(CallEvent) -> Box<dyn Producer> + Send + Sync>;

pub fn publish_procedure<F, Fut>(f: F) -> PublishProcedure
where
    F: Fn(PublishEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |event| -> BoxFuture<'static, anyhow::Result<()>> { Box::pin(f(event)) })
}

pub fn call_procedure<F, Fut>(f: F) -> CallProcedure
where
    F: Fn(CallEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    Arc::new(move |event| -> BoxFuture<'static, anyhow::Result<Value>> { Box::pin(f(event)) })
}

/// Wraps a function returning a stream of values as a streaming procedure.
pub fn stream_procedure<F, S>(f: F) -> StreamProcedure
where
    F: Fn(CallEvent) -> S + Send + Sync + 'static,
    S: Stream<Item = anyhow::Result<Value>> + Send + 'static,
{
    Arc::new(move |event| producer_from_stream(f(event)))
}

/// Signal delivered to a producer that is being stopped before exhaustion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeneratorStop;

impl std::fmt::Display for GeneratorStop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(GENERATOR_STOP)
    }
}

impl std::error::Error for GeneratorStop {}

/// The producing side of a stream.
#[async_trait::async_trait]
pub trait Producer: Send {
    /// Returns the next value, or `None` once exhausted.
    async fn advance(&mut self) -> Option<anyhow::Result<Value>>;

    /// Called once when the consumer stops the stream early. The producer is
    /// dropped afterwards.
    async fn stop(&mut self, _signal: GeneratorStop) {}
}

struct StreamProducer {
    stream: BoxStream<'static, anyhow::Result<Value>>,
}

#[async_trait::async_trait]
impl Producer for StreamProducer {
    async fn advance(&mut self) -> Option<anyhow::Result<Value>> {
        self.stream.next().await
    }
}

pub fn producer_from_stream<S>(stream: S) -> Box<dyn Producer>
where
    S: Stream<Item = anyhow::Result<Value>> + Send + 'static,
{
    Box::new(StreamProducer {
        stream: stream.boxed(),
    })
}

/// Runs a procedure future, turning panics into opaque errors.
async fn guarded<T, F>(future: F) -> anyhow::Result<T>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(result) => result,
        Err(_) => Err(anyhow::Error::new(ApplicationError::opaque())),
    }
}

#[derive(Clone)]
pub struct PublishEndpoint {
    procedure: PublishProcedure,
}

impl PublishEndpoint {
    pub fn new(procedure: PublishProcedure) -> Self {
        Self { procedure }
    }

    pub async fn call(&self, event: PublishEvent) {
        let id = event.id.clone();
        if let Err(e) = guarded((self.procedure)(event)).await {
            error!(event = %id, "subscriber failed: {:#}", e);
        }
    }
}

#[derive(Clone)]
pub struct CallEndpoint {
    procedure: CallProcedure,
}

impl CallEndpoint {
    pub fn new(procedure: CallProcedure) -> Self {
        Self { procedure }
    }

    /// Returns the Reply or Error answering `event`.
    pub async fn call(&self, event: CallEvent) -> Event {
        let invocation_id = event.id.clone();
        match guarded((self.procedure)(event)).await {
            Ok(payload) => ReplyEvent::new(invocation_id, payload).into(),
            Err(e) => {
                error!(invocation = %invocation_id, "procedure failed: {:#}", e);
                let ApplicationError { name, message } = ApplicationError::classify(&e);
                ErrorEvent::new(invocation_id, name, message).into()
            }
        }
    }
}

/// One step of a stream: a value, or the Error that ends it.
#[derive(Debug, Clone, PartialEq)]
pub enum Piece {
    Yield(YieldEvent),
    Error(ErrorEvent),
}

impl From<Piece> for Event {
    fn from(piece: Piece) -> Self {
        match piece {
            Piece::Yield(e) => e.into(),
            Piece::Error(e) => e.into(),
        }
    }
}

/// Server-side handle of one active stream.
///
/// Once it reports anything but a Yield it becomes inactive and answers every
/// further request with `GeneratorExit`.
pub struct PieceByPiece {
    id: String,
    active: bool,
    producer: Option<Box<dyn Producer>>,
}

impl PieceByPiece {
    pub fn new(producer: Box<dyn Producer>) -> Self {
        Self {
            id: new_id(),
            active: true,
            producer: Some(producer),
        }
    }

    /// The generator id the remote side uses to address this stream.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Advances the producer on behalf of `request`.
    pub async fn next(&mut self, request: &NextEvent) -> Piece {
        let exit = || Piece::Error(ErrorEvent::new(&request.id, GENERATOR_EXIT, GENERATOR_EXIT));

        if !self.active {
            return exit();
        }
        let Some(producer) = self.producer.as_mut() else {
            return exit();
        };

        let step = match AssertUnwindSafe(producer.advance()).catch_unwind().await {
            Ok(step) => step,
            Err(_) => Some(Err(anyhow::Error::new(ApplicationError::opaque()))),
        };

        match step {
            Some(Ok(value)) => Piece::Yield(YieldEvent::new(&request.id, value)),
            None => {
                debug!(generator = %self.id, "producer exhausted");
                self.finish();
                exit()
            }
            Some(Err(e)) => {
                error!(generator = %self.id, "producer failed: {:#}", e);
                self.finish();
                let ApplicationError { name, message } = ApplicationError::classify(&e);
                Piece::Error(ErrorEvent::new(&request.id, name, message))
            }
        }
    }

    /// Stops the producer early. Idempotent.
    pub async fn stop(&mut self) {
        self.active = false;
        if let Some(mut producer) = self.producer.take() {
            debug!(generator = %self.id, "stopping producer");
            producer.stop(GeneratorStop).await;
        }
    }

    fn finish(&mut self) {
        self.active = false;
        self.producer = None;
    }
}

#[derive(Clone)]
pub struct PieceByPieceEndpoint {
    procedure: StreamProcedure,
}

impl PieceByPieceEndpoint {
    pub fn new(procedure: StreamProcedure) -> Self {
        Self { procedure }
    }

    pub fn open(&self, event: CallEvent) -> PieceByPiece {
        PieceByPiece::new((self.procedure)(event))
    }
}
