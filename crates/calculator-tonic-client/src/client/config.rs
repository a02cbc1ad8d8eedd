use clap::{Parser, Subcommand};
use core::time::Duration;

/// Command line for the `calculator-tonic-client` binary.
///
/// Flags fall back to environment variables, and a `.env` file is loaded
/// first.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "calculator-tonic-client",
    version,
    about = "Calls the calculator gRPC service"
)]
pub struct CliArgs {
    /// Server URI.
    ///
    /// Environment variable: `CALCULATOR_ENDPOINT`
    #[arg(long, env = "CALCULATOR_ENDPOINT", default_value_t = String::from("http://127.0.0.1:19110"))]
    pub endpoint: String,

    /// Pause between two streamed requests, in milliseconds.
    ///
    /// Environment variable: `PACE_MS`
    #[arg(long, env = "PACE_MS", default_value_t = 0, global = true)]
    pub pace_ms: u64,

    #[command(subcommand)]
    pub command: Command,
}

impl CliArgs {
    pub fn pace(&self) -> Duration {
        Duration::from_millis(self.pace_ms)
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Adds two integers.
    Sum {
        #[arg(allow_negative_numbers = true)]
        num1: i64,
        #[arg(allow_negative_numbers = true)]
        num2: i64,
    },
    /// Adds two integers under a deadline.
    SumDeadline {
        #[arg(allow_negative_numbers = true)]
        num1: i64,
        #[arg(allow_negative_numbers = true)]
        num2: i64,
        /// Deadline for the whole call, in milliseconds.
        #[arg(long, default_value_t = 5000)]
        timeout_ms: u64,
    },
    /// Streams the prime factors of a number (Ctrl+C cancels mid-stream).
    Pnd {
        #[arg(allow_negative_numbers = true)]
        number: i64,
    },
    /// Streams samples and prints their mean.
    Average {
        #[arg(allow_negative_numbers = true)]
        samples: Vec<f64>,
    },
    /// Streams samples and prints the running maximum after each one.
    Max {
        #[arg(allow_negative_numbers = true)]
        samples: Vec<i64>,
    },
    /// Square root of an integer.
    Sqrt {
        #[arg(allow_negative_numbers = true)]
        num: i64,
    },
    /// Runs every operation once against the server.
    Demo,
}
