//! Shared types used by both sides of the calculator service.
//!
//! - [`error`] - Unified error type and its mapping to and from
//!   [`tonic::Status`].
//! - [`proto`] - Generated protobuf messages, server trait and client stub.

pub mod error;
pub use error::{Error, Result};

/// gRPC service and message definitions generated from
/// `proto/calculator.proto`.
///
/// ## Service
///
/// - `Sum`, `SumWithDeadline`, `SquareRoot` - unary.
/// - `PrimeNumberDecomposition` - server streaming.
/// - `Average` - client streaming.
/// - `FindMax` - bidirectional streaming.
pub mod proto {
    tonic::include_proto!("calculator");

    /// Encoded file descriptor set, registered with the reflection service.
    pub const FILE_DESCRIPTOR_SET: &[u8] =
        tonic::include_file_descriptor_set!("calculator_descriptor");
}
