use core::time::Duration;
use tokio::{sync::mpsc, time::sleep};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

/// Spawns the sending half of a streaming call.
///
/// The returned stream is handed to tonic as the request body. The sender task
/// pushes `items` into it one at a time, waiting `pace` between two sends, and
/// closes the send direction when it runs out of items. It stops early once
/// `done` is cancelled or the call dropped the stream.
pub fn spawn_sender<T>(items: Vec<T>, pace: Duration, done: CancellationToken) -> ReceiverStream<T>
where
    T: Send + 'static,
{
    let (tx, rx) = mpsc::channel(1);

    tokio::spawn(async move {
        for (i, item) in items.into_iter().enumerate() {
            if i > 0 && !pace.is_zero() {
                tokio::select! {
                    biased;
                    () = done.cancelled() => return,
                    () = sleep(pace) => {}
                }
            }

            tokio::select! {
                biased;
                () = done.cancelled() => return,
                sent = tx.send(item) => {
                    if sent.is_err() {
                        tracing::debug!("Request stream dropped, sender stopping");
                        return;
                    }
                }
            }
        }
        tracing::trace!("All requests sent, closing send direction");
    });

    ReceiverStream::new(rx)
}
