use crate::server::{context::CallContext, math};
use calculator_tonic_core::{
    Result,
    proto::{SquareRequest, SquareResponse, SumRequest, SumResponse},
};
use core::time::Duration;

/// Bounded internal work performed by [`sum_with_deadline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkPlan {
    pub units: u32,
    pub unit: Duration,
}

impl WorkPlan {
    pub fn total(&self) -> Duration {
        self.unit * self.units
    }
}

pub fn sum(request: &SumRequest) -> Result<SumResponse> {
    let result = math::checked_sum(request.num1, request.num2)?;
    Ok(SumResponse { result })
}

/// Sum that performs `plan.units` interruptible work units first.
///
/// The context is checked before every unit and once more before answering,
/// so a caller that gave up mid-flight gets `Cancelled` or `DeadlineExceeded`
/// instead of a late result.
pub async fn sum_with_deadline(
    request: &SumRequest,
    ctx: &CallContext,
    plan: WorkPlan,
) -> Result<SumResponse> {
    for step in 0..plan.units {
        ctx.check()?;
        tracing::trace!(step, "sum work unit");
        ctx.pause(plan.unit).await?;
    }
    ctx.check()?;
    sum(request)
}

pub fn square_root(request: &SquareRequest) -> Result<SquareResponse> {
    let sqrt = math::square_root(request.num)?;
    Ok(SquareResponse { sqrt })
}
