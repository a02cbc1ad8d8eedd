//! gRPC façade for the calculator.
//!
//! [`CalculatorService`] implements the generated [`Calculator`] trait. For
//! every call it:
//!
//! - admits the call through the [`CallTracker`] (refused with `Unavailable`
//!   once shutdown has begun),
//! - opens a [`CallContext`] derived from the shutdown token and the
//!   `grpc-timeout` header,
//! - dispatches to the pattern handler in [`crate::server::calls`],
//! - maps the outcome to a `tonic::Status`, logging and counting failures.
//!
//! Streaming responses are produced by a spawned task writing into a bounded
//! channel, which keeps the producer within `stream_buffer_size` unsent
//! messages of the consumer. Its terminal status bypasses that buffer, so a
//! stalled consumer cannot keep a cancelled producer alive.

use crate::server::{
    calls::{bidi, client_streaming, response, server_streaming, unary},
    config::ServerConfig,
    context::CallContext,
    service::{
        stream::CallStream,
        tracker::{CallGuard, CallTracker},
    },
    telemetry::{increment_call_errors, increment_messages_received},
};
use calculator_tonic_core::{
    Error,
    proto::{
        AverageRequest, AverageResponse, MaxRequest, MaxResponse, PndRequest, PndResponse,
        SquareRequest, SquareResponse, SumRequest, SumResponse,
        calculator_server::{Calculator, CalculatorServer},
    },
};
use futures::TryStreamExt;
use std::sync::Arc;
use tonic::{Request, Response, Status, Streaming, codec::CompressionEncoding};
use tracing::Instrument;

#[derive(Clone)]
pub struct CalculatorService {
    config: ServerConfig,
    tracker: Arc<CallTracker>,
}

impl CalculatorService {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            tracker: Arc::new(CallTracker::default()),
        }
    }

    /// Refuses new calls, drains running ones for up to
    /// `shutdown_timeout`, then cancels the rest.
    pub async fn shutdown(&self) {
        self.tracker.shutdown(self.config.shutdown_timeout).await;
    }

    /// Number of calls currently admitted.
    pub fn inflight(&self) -> usize {
        self.tracker.inflight()
    }

    fn open<T>(
        &self,
        operation: &'static str,
        request: &Request<T>,
    ) -> Result<(CallContext, CallGuard), Status> {
        let guard = self
            .tracker
            .begin(operation)
            .map_err(|e| report(operation, e))?;
        let ctx = CallContext::with_parent(operation, self.tracker.shutdown_token())
            .with_metadata(request.metadata());

        if let Some(deadline) = ctx.deadline() {
            let budget = deadline.saturating_duration_since(tokio::time::Instant::now());
            tracing::debug!(budget_ms = budget.as_millis() as u64, "Call has a deadline");
        }
        Ok((ctx, guard))
    }
}

/// Logs and counts a failed call, then converts the error for the transport.
fn report(operation: &'static str, err: Error) -> Status {
    if err.is_cancellation() {
        tracing::info!(operation, "Call abandoned: {err}");
    } else {
        tracing::warn!(operation, "Call failed: {err}");
    }
    increment_call_errors(operation);
    err.into()
}

fn finish<T>(
    operation: &'static str,
    result: calculator_tonic_core::Result<T>,
) -> Result<T, Status> {
    result.map_err(|e| report(operation, e))
}

#[tonic::async_trait]
impl Calculator for CalculatorService {
    type PrimeNumberDecompositionStream = CallStream<PndResponse>;
    type FindMaxStream = CallStream<MaxResponse>;

    #[tracing::instrument(skip_all, fields(num1 = req.get_ref().num1, num2 = req.get_ref().num2))]
    async fn sum(&self, req: Request<SumRequest>) -> Result<Response<SumResponse>, Status> {
        const OP: &str = "sum";
        let (_ctx, _guard) = self.open(OP, &req)?;
        finish(OP, unary::sum(req.get_ref())).map(Response::new)
    }

    /// Dropping this future (caller disconnect) abandons the work in place.
    #[tracing::instrument(skip_all, fields(num1 = req.get_ref().num1, num2 = req.get_ref().num2))]
    async fn sum_with_deadline(
        &self,
        req: Request<SumRequest>,
    ) -> Result<Response<SumResponse>, Status> {
        const OP: &str = "sum_with_deadline";
        let (ctx, _guard) = self.open(OP, &req)?;
        let result = unary::sum_with_deadline(req.get_ref(), &ctx, self.config.sum_work).await;
        finish(OP, result).map(Response::new)
    }

    #[tracing::instrument(skip_all, fields(number = req.get_ref().number))]
    async fn prime_number_decomposition(
        &self,
        req: Request<PndRequest>,
    ) -> Result<Response<Self::PrimeNumberDecompositionStream>, Status> {
        const OP: &str = "pnd";
        let (ctx, guard) = self.open(OP, &req)?;
        let number = req.get_ref().number;
        finish(OP, server_streaming::validate(number))?;

        let (out, responses) = response::channel(self.config.stream_buffer_size);
        let stream = CallStream::new(responses, OP, ctx.drop_guard());
        let pacing = self.config.factor_delay;

        let fut = async move {
            match server_streaming::feed_factors(number, &ctx, out, pacing).await {
                Ok(emitted) => tracing::debug!(emitted, "Decomposition complete"),
                Err(e) => {
                    report(OP, e);
                }
            }
            drop(guard);
        };
        tokio::spawn(fut.instrument(tracing::info_span!("streaming", operation = OP)));

        Ok(Response::new(stream))
    }

    #[tracing::instrument(skip_all)]
    async fn average(
        &self,
        req: Request<Streaming<AverageRequest>>,
    ) -> Result<Response<AverageResponse>, Status> {
        const OP: &str = "average";
        let (ctx, _guard) = self.open(OP, &req)?;
        let inbound = req
            .into_inner()
            .inspect_ok(|_| increment_messages_received(OP));

        let result = client_streaming::average(inbound, &ctx, self.config.max_samples).await;
        finish(OP, result).map(Response::new)
    }

    #[tracing::instrument(skip_all)]
    async fn find_max(
        &self,
        req: Request<Streaming<MaxRequest>>,
    ) -> Result<Response<Self::FindMaxStream>, Status> {
        const OP: &str = "find_max";
        let (ctx, guard) = self.open(OP, &req)?;
        let inbound = req
            .into_inner()
            .inspect_ok(|_| increment_messages_received(OP));

        let (out, responses) = response::channel(self.config.stream_buffer_size);
        let stream = CallStream::new(responses, OP, ctx.drop_guard());

        let fut = async move {
            match bidi::relay_maxima(inbound, &ctx, out).await {
                Ok(emitted) => tracing::debug!(emitted, "Inbound closed"),
                Err(e) => {
                    report(OP, e);
                }
            }
            drop(guard);
        };
        tokio::spawn(fut.instrument(tracing::info_span!("streaming", operation = OP)));

        Ok(Response::new(stream))
    }

    #[tracing::instrument(skip_all, fields(num = req.get_ref().num))]
    async fn square_root(
        &self,
        req: Request<SquareRequest>,
    ) -> Result<Response<SquareResponse>, Status> {
        const OP: &str = "square_root";
        let (_ctx, _guard) = self.open(OP, &req)?;
        finish(OP, unary::square_root(req.get_ref())).map(Response::new)
    }
}

/// Wraps the service with every compression encoding the server speaks.
pub fn build_calculator_service(service: CalculatorService) -> CalculatorServer<CalculatorService> {
    CalculatorServer::new(service)
        .send_compressed(CompressionEncoding::Zstd)
        .send_compressed(CompressionEncoding::Gzip)
        .send_compressed(CompressionEncoding::Deflate)
        .accept_compressed(CompressionEncoding::Zstd)
        .accept_compressed(CompressionEncoding::Gzip)
        .accept_compressed(CompressionEncoding::Deflate)
}
