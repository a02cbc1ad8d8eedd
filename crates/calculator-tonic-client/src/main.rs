use calculator_tonic_client::{
    Calculator,
    client::config::{CliArgs, Command},
};
use calculator_tonic_core::Result;
use clap::Parser;
use core::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339()),
        )
        .init();

    let calculator = Calculator::connect(args.endpoint.clone()).await?;
    let pace = args.pace();

    match args.command {
        Command::Sum { num1, num2 } => {
            println!("{num1} + {num2} = {}", calculator.sum(num1, num2).await?);
        }
        Command::SumDeadline {
            num1,
            num2,
            timeout_ms,
        } => {
            let timeout = Duration::from_millis(timeout_ms);
            let result = calculator.sum_with_deadline(num1, num2, timeout).await?;
            println!("{num1} + {num2} = {result}");
        }
        Command::Pnd { number } => {
            let cancel = CancellationToken::new();
            let on_ctrl_c = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    on_ctrl_c.cancel();
                }
            });

            let count = calculator
                .prime_factors_with(number, &cancel, |factor| println!("{factor}"))
                .await?;
            println!("{number} has {count} prime factors");
        }
        Command::Average { samples } => {
            println!("average = {}", calculator.average(samples, pace).await?);
        }
        Command::Max { samples } => {
            for max in calculator.find_max(samples, pace).await? {
                println!("max = {max}");
            }
        }
        Command::Sqrt { num } => {
            println!("sqrt({num}) = {}", calculator.square_root(num).await?);
        }
        Command::Demo => demo(&calculator, pace).await?,
    }

    Ok(())
}

/// One call of every kind. Expected failures are printed, not returned.
async fn demo(calculator: &Calculator, pace: Duration) -> anyhow::Result<()> {
    println!("== Sum");
    println!("254 + 19 = {}", calculator.sum(254, 19).await?);

    println!("== SumWithDeadline");
    for timeout in [Duration::from_secs(1), Duration::from_secs(5)] {
        print_outcome(
            &format!("deadline {timeout:?}"),
            calculator.sum_with_deadline(254, 19, timeout).await,
        );
    }

    println!("== PrimeNumberDecomposition");
    println!("120 = {:?}", calculator.prime_factors(120).await?);

    println!("== Average");
    let samples = vec![5.0, 10.0, 15.0, 20.0, 25.0, 30.0];
    println!("{samples:?} -> {}", calculator.average(samples.clone(), pace).await?);

    println!("== FindMax");
    let samples = vec![625_415, 151_230, 412_341, 123_123, 213_442, 382_748];
    println!("{samples:?} -> {:?}", calculator.find_max(samples.clone(), pace).await?);

    println!("== SquareRoot");
    for num in [16, -9] {
        print_outcome(&format!("sqrt({num})"), calculator.square_root(num).await);
    }

    Ok(())
}

fn print_outcome<T: core::fmt::Display>(label: &str, outcome: Result<T>) {
    match outcome {
        Ok(value) => println!("{label}: {value}"),
        Err(e) => println!("{label}: {e} ({:?})", e.code()),
    }
}
