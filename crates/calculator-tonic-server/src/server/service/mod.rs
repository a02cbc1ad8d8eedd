//! gRPC service façade and call bookkeeping.
//!
//! ## Structure
//!
//! - [`handler`] - `CalculatorService`, the generated trait implementation.
//! - [`tracker`] - admission control, in-flight accounting and drain.
//! - [`stream`] - outbound stream that cancels its call when dropped.

pub mod handler;
pub mod stream;
pub mod tracker;
