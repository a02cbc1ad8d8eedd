use crate::server::calls::unary::WorkPlan;
use anyhow::bail;
use clap::Parser;
use core::time::Duration;

/// Runtime configuration for the `calculator-tonic-server` binary.
///
/// These settings control buffering, pacing and shutdown behavior of the
/// calculator service. All values are parsed from CLI arguments or environment
/// variables (a `.env` file is loaded first).
#[derive(Parser, Debug, Clone)]
#[command(
    name = "calculator-tonic-server",
    version,
    about = "A gRPC calculator exercising all four streaming patterns"
)]
pub struct CliArgs {
    /// Address to listen on (TCP or Unix socket path; use --uds for Unix socket).
    ///
    /// Example: "0.0.0.0:19110" or "/tmp/calculator.sock"
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:19110"))]
    pub server_addr: String,

    /// Listen on a Unix socket instead of TCP. If set, `SERVER_ADDR` must be a file path.
    #[arg(short, long, default_value_t = false)]
    pub uds: bool,

    /// Capacity of the outbound buffer of each streaming call.
    ///
    /// A producer suspends once this many responses are waiting for the
    /// transport. Lower values increase backpressure responsiveness.
    ///
    /// Environment variable: `STREAM_BUFFER_SIZE`
    #[arg(long, env = "STREAM_BUFFER_SIZE", default_value_t = 8)]
    pub stream_buffer_size: usize,

    /// Number of work units `SumWithDeadline` performs before answering.
    ///
    /// Environment variable: `DEADLINE_WORK_UNITS`
    #[arg(long, env = "DEADLINE_WORK_UNITS", default_value_t = 3)]
    pub deadline_work_units: u32,

    /// Duration of a single `SumWithDeadline` work unit, in milliseconds.
    ///
    /// Environment variable: `DEADLINE_UNIT_MS`
    #[arg(long, env = "DEADLINE_UNIT_MS", default_value_t = 1000)]
    pub deadline_unit_ms: u64,

    /// Pause between two emitted prime factors, in milliseconds.
    ///
    /// Environment variable: `FACTOR_DELAY_MS`
    #[arg(long, env = "FACTOR_DELAY_MS", default_value_t = 0)]
    pub factor_delay_ms: u64,

    /// Maximum number of samples accepted by one `Average` call (0 = unlimited).
    ///
    /// Environment variable: `MAX_SAMPLES`
    #[arg(long, env = "MAX_SAMPLES", default_value_t = 0)]
    pub max_samples: usize,

    /// Seconds to wait for in-flight calls to drain before cancelling them.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT`
    #[arg(long, env = "SHUTDOWN_TIMEOUT", default_value_t = 3)]
    pub shutdown_timeout: u64,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub server_addr: String,
    pub uds: bool,
    pub stream_buffer_size: usize,
    pub sum_work: WorkPlan,
    pub factor_delay: Duration,
    pub max_samples: usize,
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_addr: String::from("0.0.0.0:19110"),
            uds: false,
            stream_buffer_size: 8,
            sum_work: WorkPlan {
                units: 3,
                unit: Duration::from_secs(1),
            },
            factor_delay: Duration::ZERO,
            max_samples: 0,
            shutdown_timeout: Duration::from_secs(3),
        }
    }
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.stream_buffer_size == 0 {
            bail!("STREAM_BUFFER_SIZE must be greater than 0");
        }

        if args.deadline_work_units > 0 && args.deadline_unit_ms == 0 {
            bail!("DEADLINE_UNIT_MS must be greater than 0 when DEADLINE_WORK_UNITS is set");
        }

        Ok(Self {
            server_addr: args.server_addr,
            uds: args.uds,
            stream_buffer_size: args.stream_buffer_size,
            sum_work: WorkPlan {
                units: args.deadline_work_units,
                unit: Duration::from_millis(args.deadline_unit_ms),
            },
            factor_delay: Duration::from_millis(args.factor_delay_ms),
            max_samples: args.max_samples,
            shutdown_timeout: Duration::from_secs(args.shutdown_timeout),
        })
    }
}
