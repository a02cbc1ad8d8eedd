use super::response::Responder;
use crate::server::{context::CallContext, math::RunningMax};
use calculator_tonic_core::{
    Error, Result,
    proto::{MaxRequest, MaxResponse},
};
use futures::{Stream, StreamExt};
use tonic::Status;

/// Answers every inbound sample with the running maximum so far.
///
/// Exactly one response per request, in receipt order. Returns once the
/// caller closes its side (dropping `out` then ends the outbound side too),
/// or with the first error from either direction or the context. Errors close
/// the response stream before being returned.
pub async fn relay_maxima<S>(
    inbound: S,
    ctx: &CallContext,
    out: Responder<MaxResponse>,
) -> Result<usize>
where
    S: Stream<Item = core::result::Result<MaxRequest, Status>> + Unpin,
{
    match relay(inbound, ctx, &out).await {
        Ok(emitted) => Ok(emitted),
        Err(e) => {
            out.fail(&e);
            Err(e)
        }
    }
}

async fn relay<S>(mut inbound: S, ctx: &CallContext, out: &Responder<MaxResponse>) -> Result<usize>
where
    S: Stream<Item = core::result::Result<MaxRequest, Status>> + Unpin,
{
    let mut running = RunningMax::default();
    let mut emitted = 0;

    while let Some(request) = ctx.guard(inbound.next()).await? {
        let num = request.map_err(Error::from)?.num;
        let max = running.observe(num);
        tracing::debug!(num, max, "Received sample");
        out.send(ctx, MaxResponse { max }).await?;
        emitted += 1;
    }

    Ok(emitted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::calls::response;
    use core::time::Duration;
    use tokio::sync::mpsc;
    use tokio_stream::wrappers::ReceiverStream;

    const SAMPLES: [i64; 6] = [625_415, 151_230, 412_341, 123_123, 213_442, 382_748];

    #[tokio::test]
    async fn emits_running_maximum_per_sample() -> Result<()> {
        let ctx = CallContext::new("find_max");
        let inbound = tokio_stream::iter(SAMPLES.map(|num| Ok(MaxRequest { num })));
        let (out, responses) = response::channel(8);

        assert_eq!(relay_maxima(inbound, &ctx, out).await?, SAMPLES.len());

        let maxima: Vec<_> = responses.map(|item| item.unwrap().max).collect().await;
        assert_eq!(maxima, vec![625_415; 6]);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn reads_and_writes_interleave() {
        let ctx = CallContext::new("find_max");
        let (req_tx, req_rx) = mpsc::channel(1);
        let (out, mut responses) = response::channel(1);

        let handler_ctx = ctx.clone();
        let handler = tokio::spawn(async move {
            relay_maxima(ReceiverStream::new(req_rx), &handler_ctx, out).await
        });

        // Each response is observable before the next request is sent.
        for (num, expected) in [(3, 3), (1, 3), (7, 7), (-2, 7)] {
            req_tx.send(Ok(MaxRequest { num })).await.unwrap();
            let resp = responses.next().await.unwrap().unwrap();
            assert_eq!(resp.max, expected);
        }

        drop(req_tx);
        assert_eq!(handler.await.unwrap(), Ok(4));
        assert!(responses.next().await.is_none());
    }

    #[tokio::test]
    async fn inbound_error_terminates_the_call() {
        let ctx = CallContext::new("find_max");
        let inbound = tokio_stream::iter(vec![
            Ok(MaxRequest { num: 5 }),
            Err(Status::internal("broken pipe")),
            Ok(MaxRequest { num: 9 }),
        ]);
        let (out, mut responses) = response::channel(8);

        let err = relay_maxima(inbound, &ctx, out).await.unwrap_err();
        assert!(matches!(err, Error::Internal { .. }), "{err:?}");

        assert_eq!(responses.next().await.unwrap().unwrap().max, 5);
        assert_eq!(
            responses.next().await.unwrap().unwrap_err().code(),
            tonic::Code::Internal
        );
        assert!(responses.next().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_ends_an_idle_call() {
        let ctx = CallContext::new("find_max");
        let (req_tx, req_rx) = mpsc::channel::<core::result::Result<MaxRequest, Status>>(1);
        let (out, _responses) = response::channel(1);

        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            canceller.cancel();
        });

        let result = relay_maxima(ReceiverStream::new(req_rx), &ctx, out).await;
        assert_eq!(result, Err(Error::Cancelled));
        drop(req_tx);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_ends_a_call_blocked_on_an_unread_stream() {
        let ctx = CallContext::new("find_max");
        // Plenty of input, one response slot, and nobody reading responses.
        let inbound = tokio_stream::iter((1..=10).map(|num| Ok(MaxRequest { num })));
        let (out, responses) = response::channel(1);

        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            canceller.cancel();
        });

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            relay_maxima(inbound, &ctx, out),
        )
        .await
        .expect("relay returned after cancellation");
        assert_eq!(result, Err(Error::Cancelled));

        let rest: Vec<_> = responses
            .map(|item| item.map(|r| r.max).map_err(|s| s.code()))
            .collect()
            .await;
        assert_eq!(rest, vec![Ok(1), Err(tonic::Code::Cancelled)]);
    }
}
