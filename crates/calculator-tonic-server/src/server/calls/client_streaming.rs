use crate::server::{context::CallContext, math::Mean};
use calculator_tonic_core::{
    Error, Result,
    proto::{AverageRequest, AverageResponse},
};
use futures::{Stream, StreamExt};
use tonic::Status;

/// Reads samples until the caller closes its side, then answers with the mean.
///
/// - An empty stream is rejected with `InvalidArgument`; there is no mean of
///   zero samples.
/// - Non-finite samples are rejected, so the answer is always a real number.
/// - `max_samples` caps the stream length (0 disables the cap).
/// - If the inbound stream fails or the call is abandoned before the end of
///   input, the error is returned and no partial mean is produced.
pub async fn average<S>(
    mut inbound: S,
    ctx: &CallContext,
    max_samples: usize,
) -> Result<AverageResponse>
where
    S: Stream<Item = core::result::Result<AverageRequest, Status>> + Unpin,
{
    let mut mean = Mean::default();

    while let Some(request) = ctx.guard(inbound.next()).await? {
        let sample = request.map_err(Error::from)?.num;
        if !sample.is_finite() {
            return Err(Error::invalid_argument(format!(
                "Sample {sample} is not a finite number"
            )));
        }
        if max_samples > 0 && mean.count() == max_samples {
            return Err(Error::invalid_argument(format!(
                "More than {max_samples} samples sent"
            )));
        }
        tracing::debug!(sample, "Received sample");
        mean.push(sample);
    }

    let result = mean
        .value()
        .ok_or_else(|| Error::invalid_argument("Average requires at least one sample"))?;
    tracing::debug!(count = mean.count(), result, "Input closed");
    Ok(AverageResponse { result })
}
