//! Outbound channel of a streaming call.
//!
//! Messages travel through a bounded [`mpsc`] channel, so the producer
//! suspends while `capacity` messages wait for the transport. The terminal
//! status travels separately through a [`oneshot`]: reporting a failure never
//! waits for buffer space, and the reader sees it right after the last
//! buffered message.

use crate::server::context::CallContext;
use calculator_tonic_core::{Error, Result};
use core::{
    pin::Pin,
    task::{Context, Poll, ready},
};
use tokio::sync::{mpsc, oneshot};
use tokio_stream::Stream;
use tonic::Status;

pub fn channel<T>(capacity: usize) -> (Responder<T>, Responses<T>) {
    let (tx, rx) = mpsc::channel(capacity);
    let (terminal_tx, terminal_rx) = oneshot::channel();
    (
        Responder {
            tx,
            terminal: terminal_tx,
        },
        Responses {
            rx,
            terminal: Some(terminal_rx),
        },
    )
}

/// Producer half. Dropping it ends the stream successfully; [`Responder::fail`]
/// ends it with an error.
#[derive(Debug)]
pub struct Responder<T> {
    tx: mpsc::Sender<T>,
    terminal: oneshot::Sender<Status>,
}

impl<T> Responder<T> {
    /// Sends one message, suspending while the buffer is full.
    ///
    /// A dropped reader is reported as cancellation.
    pub async fn send(&self, ctx: &CallContext, message: T) -> Result<()> {
        ctx.check()?;
        ctx.guard(self.tx.send(message))
            .await?
            .map_err(|_| Error::Cancelled)
    }

    /// Closes the stream with `err`. Never blocks.
    pub fn fail(self, err: &Error) {
        if self.terminal.send(err.clone().into()).is_err() {
            tracing::debug!("Response stream dropped before error could be forwarded");
        }
    }
}

/// Reader half: every sent message in order, then the terminal status if the
/// producer failed.
#[derive(Debug)]
pub struct Responses<T> {
    rx: mpsc::Receiver<T>,
    terminal: Option<oneshot::Receiver<Status>>,
}

impl<T> Responses<T> {
    /// Messages sent but not yet read.
    pub fn buffered(&self) -> usize {
        self.rx.len()
    }
}

impl<T> Stream for Responses<T> {
    type Item = core::result::Result<T, Status>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if let Some(message) = ready!(self.rx.poll_recv(cx)) {
            return Poll::Ready(Some(Ok(message)));
        }

        // The data channel only closes once the responder is gone, so the
        // terminal slot is settled by now.
        let Some(terminal) = self.terminal.as_mut() else {
            return Poll::Ready(None);
        };
        let outcome = ready!(Pin::new(terminal).poll(cx));
        self.terminal = None;
        Poll::Ready(outcome.ok().map(Err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::StreamExt;

    #[tokio::test]
    async fn success_ends_without_status() -> Result<()> {
        let ctx = CallContext::new("pnd");
        let (responder, responses) = channel(4);
        responder.send(&ctx, 1).await?;
        responder.send(&ctx, 2).await?;
        drop(responder);

        let items: Vec<_> = responses.map(|item| item.map_err(|s| s.code())).collect().await;
        assert_eq!(items, vec![Ok(1), Ok(2)]);
        Ok(())
    }

    #[tokio::test]
    async fn failing_with_a_full_buffer_does_not_wait_for_the_reader() -> Result<()> {
        let ctx = CallContext::new("pnd");
        let (responder, mut responses) = channel(1);
        responder.send(&ctx, 7).await?;
        assert_eq!(responses.buffered(), 1);

        responder.fail(&Error::DeadlineExceeded);

        assert_eq!(responses.next().await.unwrap().unwrap(), 7);
        let status = responses.next().await.unwrap().unwrap_err();
        assert_eq!(status.code(), tonic::Code::DeadlineExceeded);
        assert!(responses.next().await.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn dropped_reader_is_cancellation() {
        let ctx = CallContext::new("find_max");
        let (responder, responses) = channel(1);
        drop(responses);

        assert_eq!(responder.send(&ctx, 1).await, Err(Error::Cancelled));
        responder.fail(&Error::Cancelled);
    }
}
