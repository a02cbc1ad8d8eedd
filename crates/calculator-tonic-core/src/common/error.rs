//! Error types for the calculator service.
//!
//! This module defines the central `Error` enum shared by the server and the
//! client. It implements `From<Error>` for `tonic::Status` so handlers can
//! terminate a call with a categorized code, and `From<tonic::Status>` for
//! `Error` so callers get the same taxonomy back.
//!
//! ## Error Cases
//! - `InvalidArgument`: The input is outside the operation's domain.
//! - `NegativeOperand`: A negative value was passed where it is undefined
//!   (square root).
//! - `Cancelled`: The caller, or the service shutting down, aborted the call.
//! - `DeadlineExceeded`: The call's deadline elapsed before work completed.
//! - `Internal`: An unexpected failure inside the service (e.g. a closed
//!   channel between tasks).
//! - `ServiceShutdown`: A call arrived while the service was shutting down.
//! - `Transport`: Any other status surfaced by the transport.
//! - `Connect`: The client could not reach the server.

use tonic::{Code, Status};

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the calculator service.
#[derive(Clone, thiserror::Error, Debug, PartialEq)]
pub enum Error {
    /// The request was outside the operation's valid domain.
    #[error("Invalid argument: {reason}")]
    InvalidArgument { reason: String },

    /// The operand must be non-negative.
    #[error("Invalid number {value} less than 0")]
    NegativeOperand { value: i64 },

    /// The call was aborted before it completed.
    #[error("Request cancelled")]
    Cancelled,

    /// The call's deadline elapsed before work completed.
    #[error("Deadline exceeded")]
    DeadlineExceeded,

    /// Internal failure (e.g., closed channel between tasks).
    #[error("Internal error: {context}")]
    Internal { context: String },

    /// The service is in the process of shutting down.
    #[error("Service is shutting down")]
    ServiceShutdown,

    /// A status that has no dedicated variant.
    #[error("Transport error ({code:?}): {message}")]
    Transport { code: Code, message: String },

    /// The client could not establish a connection.
    #[error("Connection error: {reason}")]
    Connect { reason: String },
}

impl Error {
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }

    pub fn internal(context: impl Into<String>) -> Self {
        Self::Internal {
            context: context.into(),
        }
    }

    /// Returns the gRPC code this error is reported with.
    pub fn code(&self) -> Code {
        match self {
            Error::InvalidArgument { .. } | Error::NegativeOperand { .. } => Code::InvalidArgument,
            Error::Cancelled => Code::Cancelled,
            Error::DeadlineExceeded => Code::DeadlineExceeded,
            Error::Internal { .. } => Code::Internal,
            Error::ServiceShutdown | Error::Connect { .. } => Code::Unavailable,
            Error::Transport { code, .. } => *code,
        }
    }

    /// True for the two terminal states caused by the caller or the clock
    /// rather than by the input.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Error::Cancelled | Error::DeadlineExceeded)
    }
}

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        match err {
            Error::InvalidArgument { reason } => Status::invalid_argument(reason),
            Error::NegativeOperand { value } => {
                Status::invalid_argument(format!("Invalid number {value} less than 0"))
            }
            Error::Cancelled => Status::cancelled("Request was cancelled"),
            Error::DeadlineExceeded => Status::deadline_exceeded("Deadline exceeded"),
            Error::Internal { context } => Status::internal(context),
            Error::ServiceShutdown => Status::unavailable("Service is shutting down"),
            Error::Transport { code, message } => Status::new(code, message),
            Error::Connect { reason } => Status::unavailable(reason),
        }
    }
}

impl From<Status> for Error {
    fn from(status: Status) -> Self {
        let message = status.message().to_string();
        match status.code() {
            Code::InvalidArgument => Error::InvalidArgument { reason: message },
            Code::Cancelled => Error::Cancelled,
            Code::DeadlineExceeded => Error::DeadlineExceeded,
            Code::Internal => Error::Internal { context: message },
            code => Error::Transport { code, message },
        }
    }
}

impl From<tonic::transport::Error> for Error {
    fn from(err: tonic::transport::Error) -> Self {
        Error::Connect {
            reason: err.to_string(),
        }
    }
}
