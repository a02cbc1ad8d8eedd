//! Client side of the calculator service.
//!
//! - [`calculator`] - `Calculator`, one method per RPC.
//! - [`config`] - command line of the `calculator-tonic-client` binary.
//! - [`feed`] - sender task behind the client-streaming and bidirectional
//!   calls.

pub mod calculator;
pub mod config;
pub mod feed;
