use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Which side of a [`race`] finished first.
#[derive(Debug, PartialEq, Eq)]
pub enum Winner<A, B> {
    First(A),
    Second(B),
}

/// Waits for whichever of two futures completes first.
///
/// `first` is polled before `second`, so it wins ties. The loser is dropped
/// as soon as a winner is known; for a [`Request`](super::Request) that means
/// leaving the queue, or releasing a slot it was handed in the same instant.
pub fn race<A, B>(first: A, second: B) -> Race<A, B>
where
    A: Future + Unpin,
    B: Future + Unpin,
{
    Race {
        first: Some(first),
        second: Some(second),
    }
}

/// Future returned by [`race`].
#[derive(Debug)]
#[must_use = "futures do nothing unless awaited"]
pub struct Race<A, B> {
    first: Option<A>,
    second: Option<B>,
}

impl<A, B> Future for Race<A, B>
where
    A: Future + Unpin,
    B: Future + Unpin,
{
    type Output = Winner<A::Output, B::Output>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;

        if let Some(first) = this.first.as_mut() {
            if let Poll::Ready(output) = Pin::new(first).poll(cx) {
                this.first = None;
                this.second = None;
                return Poll::Ready(Winner::First(output));
            }
        }

        if let Some(second) = this.second.as_mut() {
            if let Poll::Ready(output) = Pin::new(second).poll(cx) {
                this.second = None;
                this.first = None;
                return Poll::Ready(Winner::Second(output));
            }
        }

        Poll::Pending
    }
}
