//! Prime decomposition streamed one factor per message.
//!
//! The producer runs in its own task and pushes factors into the bounded
//! response channel. Each send may suspend until the transport has room, so at
//! most `stream_buffer_size` unsent factors ever exist. Between emissions the
//! producer consults the call context, and candidate advances that emit
//! nothing are grouped into work units so a large prime cannot starve the
//! cancellation check or the scheduler.

use super::response::Responder;
use crate::server::{
    context::CallContext,
    math::{Division, PrimeFactors},
};
use calculator_tonic_core::{Error, Result, proto::PndResponse};
use core::time::Duration;

/// Non-emitting trial divisions performed between two cancellation checks.
pub const ADVANCES_PER_UNIT: usize = 1024;

/// Rejects inputs that have no prime decomposition.
pub fn validate(number: i64) -> Result<()> {
    if number < 1 {
        return Err(Error::invalid_argument(format!(
            "Number {number} has no prime decomposition"
        )));
    }
    Ok(())
}

/// Streams the prime factors of `number` through `out`.
///
/// Returns the number of factors emitted. On failure the error closes the
/// response stream before being returned; this never waits on the reader.
///
/// # Behavior
///
/// - `number == 1` emits nothing and completes.
/// - Stops within one work unit once the context is cancelled or its deadline
///   passes, including while suspended on a full buffer.
/// - Waits `pacing` between factors, interruptibly.
pub async fn feed_factors(
    number: i64,
    ctx: &CallContext,
    out: Responder<PndResponse>,
    pacing: Duration,
) -> Result<usize> {
    match produce(number, ctx, &out, pacing).await {
        Ok(emitted) => Ok(emitted),
        Err(e) => {
            out.fail(&e);
            Err(e)
        }
    }
}

async fn produce(
    number: i64,
    ctx: &CallContext,
    out: &Responder<PndResponse>,
    pacing: Duration,
) -> Result<usize> {
    validate(number)?;

    let mut factors = PrimeFactors::new(number);
    let mut emitted = 0;
    let mut advances = 0;

    while let Some(division) = factors.step() {
        match division {
            Division::Factor(factor) => {
                out.send(ctx, PndResponse { result: factor }).await?;
                emitted += 1;
                tracing::debug!(factor, "Emitted prime factor");

                if !pacing.is_zero() && !factors.is_exhausted() {
                    ctx.pause(pacing).await?;
                }
            }
            Division::Advance => {
                advances += 1;
                if advances == ADVANCES_PER_UNIT {
                    advances = 0;
                    ctx.check()?;
                    // Yield to the scheduler to avoid hogging the worker.
                    tokio::task::yield_now().await;
                }
            }
        }
    }

    Ok(emitted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::calls::response::{self, Responses};
    use tokio_stream::StreamExt;

    async fn collect(
        responses: Responses<PndResponse>,
    ) -> Vec<core::result::Result<i64, tonic::Code>> {
        responses
            .map(|item| item.map(|r| r.result).map_err(|s| s.code()))
            .collect()
            .await
    }

    #[tokio::test]
    async fn streams_factors_of_120_in_order() -> Result<()> {
        let ctx = CallContext::new("pnd");
        let (out, responses) = response::channel(8);

        let emitted = feed_factors(120, &ctx, out, Duration::ZERO).await?;

        assert_eq!(emitted, 5);
        assert_eq!(
            collect(responses).await,
            vec![Ok(2), Ok(2), Ok(2), Ok(3), Ok(5)]
        );
        Ok(())
    }

    #[tokio::test]
    async fn one_yields_an_empty_stream() -> Result<()> {
        let ctx = CallContext::new("pnd");
        let (out, responses) = response::channel(8);

        assert_eq!(feed_factors(1, &ctx, out, Duration::ZERO).await?, 0);
        assert!(collect(responses).await.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn non_positive_input_is_rejected_on_the_stream() {
        let ctx = CallContext::new("pnd");
        let (out, responses) = response::channel(8);

        let err = feed_factors(0, &ctx, out, Duration::ZERO).await.unwrap_err();

        assert!(matches!(err, Error::InvalidArgument { .. }));
        assert_eq!(
            collect(responses).await,
            vec![Err(tonic::Code::InvalidArgument)]
        );
    }

    #[tokio::test]
    async fn respects_backpressure() {
        let ctx = CallContext::new("pnd");
        // 2^20: twenty factors, but room for only two.
        let (out, mut responses) = response::channel(2);
        let producer_ctx = ctx.clone();
        let producer =
            tokio::spawn(async move { feed_factors(1 << 20, &producer_ctx, out, Duration::ZERO).await });

        // The producer parks on the full buffer.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!producer.is_finished());
        assert_eq!(responses.buffered(), 2);

        let mut received = 0;
        while let Some(item) = responses.next().await {
            assert_eq!(item.unwrap().result, 2);
            received += 1;
        }
        assert_eq!(received, 20);
        assert_eq!(producer.await.unwrap(), Ok(20));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_emission_mid_stream() {
        let ctx = CallContext::new("pnd");
        let (out, mut responses) = response::channel(8);
        let producer_ctx = ctx.clone();
        let producer = tokio::spawn(async move {
            feed_factors(1 << 20, &producer_ctx, out, Duration::from_secs(1)).await
        });

        // First factor goes out immediately, then the producer is pacing.
        assert_eq!(responses.next().await.unwrap().unwrap().result, 2);
        ctx.cancel();

        assert_eq!(producer.await.unwrap(), Err(Error::Cancelled));
        // Only the terminal status follows; no further factors.
        assert_eq!(collect(responses).await, vec![Err(tonic::Code::Cancelled)]);
    }

    #[tokio::test]
    async fn dropped_receiver_is_treated_as_cancellation() {
        let ctx = CallContext::new("pnd");
        let (out, responses) = response::channel(1);
        drop(responses);

        assert_eq!(
            feed_factors(120, &ctx, out, Duration::ZERO).await,
            Err(Error::Cancelled)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_interrupts_pacing() {
        let ctx = CallContext::new("pnd").with_timeout(Duration::from_millis(2500));
        let (out, responses) = response::channel(32);

        let err = feed_factors(1 << 10, &ctx, out, Duration::from_secs(1))
            .await
            .unwrap_err();

        assert_eq!(err, Error::DeadlineExceeded);
        assert_eq!(
            collect(responses).await,
            vec![Ok(2), Ok(2), Ok(2), Err(tonic::Code::DeadlineExceeded)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_ends_a_producer_stuck_on_an_unread_stream() {
        let ctx = CallContext::new("pnd").with_timeout(Duration::from_secs(1));
        // One slot, and nobody reads: the second factor can never be sent.
        let (out, responses) = response::channel(1);

        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            feed_factors(1 << 20, &ctx, out, Duration::ZERO),
        )
        .await
        .expect("producer returned after its deadline");

        assert_eq!(outcome, Err(Error::DeadlineExceeded));
        assert_eq!(
            collect(responses).await,
            vec![Ok(2), Err(tonic::Code::DeadlineExceeded)]
        );
    }
}
