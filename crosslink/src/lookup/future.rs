//! LookupFuture: caller side of a correlated lookup.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use super::LookupResult;

/// Resolves to the outcome of one lookup.
///
/// Always terminates: the timeout task guarantees completion, and a
/// dropped sender (node shut down mid-lookup) reads as `NotFound`.
pub struct LookupFuture {
    state: State,
}

enum State {
    Ready(Option<LookupResult>),
    Waiting(oneshot::Receiver<LookupResult>),
}

impl LookupFuture {
    pub(crate) fn ready(result: LookupResult) -> Self {
        Self {
            state: State::Ready(Some(result)),
        }
    }

    pub(crate) fn waiting(rx: oneshot::Receiver<LookupResult>) -> Self {
        Self {
            state: State::Waiting(rx),
        }
    }
}

impl Future for LookupFuture {
    type Output = LookupResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<LookupResult> {
        match &mut self.state {
            State::Ready(result) => Poll::Ready(result.take().unwrap_or(LookupResult::NotFound)),
            State::Waiting(rx) => match Pin::new(rx).poll(cx) {
                Poll::Ready(Ok(result)) => Poll::Ready(result),
                Poll::Ready(Err(_)) => Poll::Ready(LookupResult::NotFound),
                Poll::Pending => Poll::Pending,
            },
        }
    }
}
