//! # Entrypoints
//!
//! Endpoints bound to a [`Peer`]: an entrypoint receives an inbound Publish or
//! Call, runs the matching endpoint and delivers whatever answers it.
//!
//! ## Streaming
//!
//! A streaming call is answered in rounds:
//!
//! 1. A Yield answering the Call, whose payload `{"ID": <generator id>}` tells
//!    the caller how to address the stream.
//! 2. For every Next the caller sends, a Yield (or the final Error) answering
//!    that Next.
//!
//! A Stop for the generator id can arrive at any point and wins every race it
//! takes part in. At any moment at most one Next wait and one Stop wait are
//! registered for a stream; both are released when the stream ends.

use serde_json::json;
use tracing::debug;
use tracing::warn;

use neowamp::CallEvent;
use neowamp::PublishEvent;
use neowamp::YieldEvent;

use crate::endpoints::CallEndpoint;
use crate::endpoints::PieceByPiece;
use crate::endpoints::PieceByPieceEndpoint;
use crate::endpoints::Piece;
use crate::endpoints::PublishEndpoint;
use crate::peer;
use crate::peer::Peer;
use crate::shared::Either;
use crate::shared::race;

/// An inbound event destined for an entrypoint.
#[derive(Debug, Clone)]
pub enum Inbound {
    Publish(PublishEvent),
    Call(CallEvent),
}

impl Inbound {
    pub fn endpoint_id(&self) -> Option<&str> {
        let route = match self {
            Self::Publish(e) => e.route.as_ref(),
            Self::Call(e) => e.route.as_ref(),
        };
        route.map(|r| r.endpoint_id.as_str())
    }
}

#[derive(Clone)]
pub enum Entrypoint {
    Publish(PublishEndpoint),
    Call(CallEntrypoint),
    Stream(StreamEntrypoint),
}

impl Entrypoint {
    /// Runs the entrypoint to completion. Never fails; problems are logged.
    pub async fn handle(&self, inbound: Inbound) {
        match (self, inbound) {
            (Self::Publish(endpoint), Inbound::Publish(event)) => endpoint.call(event).await,
            (Self::Call(entrypoint), Inbound::Call(event)) => {
                if let Err(e) = entrypoint.run(event).await {
                    warn!("failed to deliver reply: {}", e);
                }
            }
            (Self::Stream(entrypoint), Inbound::Call(event)) => {
                if let Err(e) = entrypoint.run(event).await {
                    warn!("stream aborted: {}", e);
                }
            }
            (_, inbound) => {
                warn!(endpoint = inbound.endpoint_id(), "event does not match its endpoint, dropping");
            }
        }
    }
}

#[derive(Clone)]
pub struct CallEntrypoint {
    peer: Peer,
    endpoint: CallEndpoint,
}

impl CallEntrypoint {
    pub fn new(peer: Peer, endpoint: CallEndpoint) -> Self {
        Self { peer, endpoint }
    }

    pub async fn run(&self, event: CallEvent) -> peer::Result<()> {
        let response = self.endpoint.call(event).await;
        self.peer.send(response).await
    }
}

#[derive(Clone)]
pub struct StreamEntrypoint {
    peer: Peer,
    endpoint: PieceByPieceEndpoint,
}

impl StreamEntrypoint {
    pub fn new(peer: Peer, endpoint: PieceByPieceEndpoint) -> Self {
        Self { peer, endpoint }
    }

    pub async fn run(&self, call: CallEvent) -> peer::Result<()> {
        let call_id = call.id.clone();
        let mut stream = self.endpoint.open(call);
        let result = self.drive(&mut stream, &call_id).await;
        // No-op unless the stream ended early.
        stream.stop().await;
        result
    }

    async fn drive(&self, stream: &mut PieceByPiece, call_id: &str) -> peer::Result<()> {
        let generator_id = stream.id().to_string();
        let mut stop = self.peer.pending_cancel_events().create(&generator_id)?;
        let mut current = YieldEvent::new(call_id, json!({ "ID": generator_id }));
        debug!(generator = %generator_id, "stream opened");

        loop {
            let next = self.peer.pending_next_events().create(&current.id)?;
            self.peer.send(current).await?;

            let request = match race(next, &mut stop).await {
                Either::Left(Ok(request)) => request,
                Either::Left(Err(cancelled)) => return Err(cancelled.into()),
                Either::Right(_) => {
                    debug!(generator = %generator_id, "stream stopped while waiting");
                    return Ok(());
                }
            };

            let piece = {
                let advance = std::pin::pin!(stream.next(&request));
                race(advance, &mut stop).await
            };

            match piece {
                Either::Left(Piece::Yield(answer)) => current = answer,
                Either::Left(Piece::Error(last)) => {
                    self.peer.send(last).await?;
                    debug!(generator = %generator_id, "stream finished");
                    return Ok(());
                }
                Either::Right(_) => {
                    debug!(generator = %generator_id, "stream stopped while producing");
                    return Ok(());
                }
            }
        }
    }
}

/// Runs `entrypoint` on its own task so slow procedures never stall the
/// receive loop.
pub fn spawn(entrypoint: Entrypoint, inbound: Inbound) {
    tokio::spawn(async move {
        entrypoint.handle(inbound).await;
    });
}
