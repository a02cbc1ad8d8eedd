//! Typed wrapper over the generated calculator stub.
//!
//! Each method builds one call, drives it to its terminal state and maps the
//! outcome onto [`calculator_tonic_core::Error`]. Methods take `&self` and
//! clone the underlying stub (a cheap handle on the shared channel), so one
//! [`Calculator`] can run many calls concurrently over a single connection.

use super::feed::spawn_sender;
use calculator_tonic_core::{
    Error, Result,
    proto::{
        AverageRequest, MaxRequest, MaxResponse, PndRequest, PndResponse, SquareRequest,
        SumRequest, calculator_client::CalculatorClient,
    },
};
use core::time::Duration;
use tokio::time::{Instant, timeout_at};
use tokio_util::sync::CancellationToken;
use tonic::{
    Request,
    codec::CompressionEncoding,
    transport::{Channel, Endpoint},
};

#[derive(Clone, Debug)]
pub struct Calculator {
    inner: CalculatorClient<Channel>,
}

impl Calculator {
    /// Dials `endpoint`, e.g. `http://127.0.0.1:19110`.
    pub async fn connect(endpoint: impl Into<String>) -> Result<Self> {
        let channel = Endpoint::from_shared(endpoint.into())?.connect().await?;
        Ok(Self::new(channel))
    }

    pub fn new(channel: Channel) -> Self {
        let inner = CalculatorClient::new(channel)
            .accept_compressed(CompressionEncoding::Zstd)
            .accept_compressed(CompressionEncoding::Gzip);
        Self { inner }
    }

    pub async fn sum(&self, num1: i64, num2: i64) -> Result<i64> {
        let resp = self.inner.clone().sum(SumRequest { num1, num2 }).await?;
        Ok(resp.into_inner().result)
    }

    /// `Sum` with a deadline of `timeout` from now.
    ///
    /// The deadline travels to the server as `grpc-timeout` and is also
    /// enforced locally, so this returns [`Error::DeadlineExceeded`] no later
    /// than the deadline even if the server never answers.
    pub async fn sum_with_deadline(&self, num1: i64, num2: i64, timeout: Duration) -> Result<i64> {
        let deadline = Instant::now() + timeout;
        let mut request = Request::new(SumRequest { num1, num2 });
        request.set_timeout(timeout);

        let mut client = self.inner.clone();
        match timeout_at(deadline, client.sum_with_deadline(request)).await {
            Ok(Ok(resp)) => Ok(resp.into_inner().result),
            Ok(Err(status)) => Err(past_deadline(Error::from(status), deadline)),
            Err(_elapsed) => Err(Error::DeadlineExceeded),
        }
    }

    pub async fn square_root(&self, num: i64) -> Result<f64> {
        let resp = self.inner.clone().square_root(SquareRequest { num }).await?;
        Ok(resp.into_inner().sqrt)
    }

    /// Collects the full prime decomposition of `number`.
    pub async fn prime_factors(&self, number: i64) -> Result<Vec<i64>> {
        let mut factors = Vec::new();
        self.prime_factors_with(number, &CancellationToken::new(), |factor| {
            factors.push(factor)
        })
        .await?;
        Ok(factors)
    }

    /// Streams the prime decomposition of `number` into `on_factor`.
    ///
    /// Returns the number of factors received. Cancelling `cancel` drops the
    /// response stream, which the server observes as the caller going away,
    /// and returns [`Error::Cancelled`].
    pub async fn prime_factors_with<F>(
        &self,
        number: i64,
        cancel: &CancellationToken,
        mut on_factor: F,
    ) -> Result<usize>
    where
        F: FnMut(i64),
    {
        let mut client = self.inner.clone();
        let mut stream = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(Error::Cancelled),
            resp = client.prime_number_decomposition(PndRequest { number }) => resp?.into_inner(),
        };

        let mut received = 0;
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    tracing::debug!(received, "Decomposition cancelled by caller");
                    return Err(Error::Cancelled);
                }
                message = stream.message() => match message? {
                    Some(PndResponse { result }) => {
                        on_factor(result);
                        received += 1;
                    }
                    None => return Ok(received),
                },
            }
        }
    }

    /// Streams `samples` to `Average`, `pace` apart, and returns the mean.
    pub async fn average(&self, samples: Vec<f64>, pace: Duration) -> Result<f64> {
        let done = CancellationToken::new();
        let _stop_sender = done.clone().drop_guard();

        let requests = samples
            .into_iter()
            .map(|num| AverageRequest { num })
            .collect();
        let requests = spawn_sender(requests, pace, done);

        let resp = self.inner.clone().average(requests).await?;
        Ok(resp.into_inner().result)
    }

    /// Runs `FindMax` over `samples` and returns every running maximum in
    /// receipt order.
    ///
    /// Sending and receiving run as two independent tasks. The receiver owns
    /// the completion token and cancels it when it finishes for any reason,
    /// which also stops the sender.
    pub async fn find_max(&self, samples: Vec<i64>, pace: Duration) -> Result<Vec<i64>> {
        let done = CancellationToken::new();
        let requests = samples.into_iter().map(|num| MaxRequest { num }).collect();
        let requests = spawn_sender(requests, pace, done.clone());

        let mut client = self.inner.clone();
        let receiver = tokio::spawn(async move {
            let _completion = done.drop_guard();
            let mut inbound = client.find_max(requests).await?.into_inner();

            let mut maxima = Vec::new();
            while let Some(MaxResponse { max }) = inbound.message().await? {
                tracing::debug!(max, "Received running maximum");
                maxima.push(max);
            }
            Ok::<_, Error>(maxima)
        });

        receiver
            .await
            .map_err(|e| Error::internal(format!("FindMax receiver task failed: {e}")))?
    }
}

/// tonic's server answers an expired `grpc-timeout` with `CANCELLED`; once our
/// own deadline has passed that is a deadline failure.
fn past_deadline(err: Error, deadline: Instant) -> Error {
    if err == Error::Cancelled && Instant::now() >= deadline {
        Error::DeadlineExceeded
    } else {
        err
    }
}
