//! First-to-settle selection between two waits. The loser is dropped, which
//! for a [`Pending`](crate::shared::pending::Pending) releases its key. Pass a
//! wait by `&mut` to keep it alive across several races.

use std::future::Future;

pub use futures::future::Either;

pub async fn race<A, B>(first: A, second: B) -> Either<A::Output, B::Output>
where
    A: Future + Unpin,
    B: Future + Unpin,
{
    match futures::future::select(first, second).await {
        Either::Left((output, _loser)) => Either::Left(output),
        Either::Right((output, _loser)) => Either::Right(output),
    }
}
