use crate::server::{calls::response::Responses, telemetry::increment_messages_sent};
use core::{
    pin::Pin,
    task::{Context, Poll, ready},
};
use tokio_stream::Stream;
use tokio_util::sync::DropGuard;
use tonic::Status;

/// Outbound half of a streaming call.
///
/// Yields whatever the producer task sends, then its terminal status if it
/// failed. When the transport drops it (the caller went away, or the call
/// finished), the drop guard cancels the call's context so the producer stops.
pub struct CallStream<T> {
    inner: Responses<T>,
    operation: &'static str,
    _cancel_on_drop: DropGuard,
}

impl<T> CallStream<T> {
    pub fn new(responses: Responses<T>, operation: &'static str, cancel_on_drop: DropGuard) -> Self {
        Self {
            inner: responses,
            operation,
            _cancel_on_drop: cancel_on_drop,
        }
    }
}

impl<T> Stream for CallStream<T> {
    type Item = Result<T, Status>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let item = ready!(Pin::new(&mut self.inner).poll_next(cx));
        if let Some(Ok(_)) = &item {
            increment_messages_sent(self.operation);
        }
        Poll::Ready(item)
    }
}
