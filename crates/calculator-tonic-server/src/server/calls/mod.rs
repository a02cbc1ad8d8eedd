//! Call handlers, one module per interaction pattern.
//!
//! Handlers are written against generic seams instead of tonic types: inbound
//! messages arrive through any `Stream<Item = Result<T, Status>>` and outbound
//! messages leave through a [`response::Responder`]. The service façade wires
//! them to `tonic::Streaming` and to the response stream; tests drive them
//! directly.
//!
//! - [`unary`] - `Sum`, `SumWithDeadline`, `SquareRoot`.
//! - [`server_streaming`] - `PrimeNumberDecomposition`.
//! - [`client_streaming`] - `Average`.
//! - [`bidi`] - `FindMax`.

pub mod bidi;
pub mod client_streaming;
pub mod response;
pub mod server_streaming;
pub mod unary;
