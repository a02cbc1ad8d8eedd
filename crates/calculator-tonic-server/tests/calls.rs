use calculator_tonic_client::Calculator;
use calculator_tonic_core::Error;
use calculator_tonic_server::{
    CalculatorService, ServerConfig, build_calculator_service, server::calls::unary::WorkPlan,
};
use core::time::Duration;
use std::sync::{Arc, Mutex};
use tokio::{net::TcpListener, sync::oneshot, time::Instant};
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::{Code, transport::Server};

struct TestServer {
    calculator: Calculator,
    service: CalculatorService,
    _stop: oneshot::Sender<()>,
}

async fn start(config: ServerConfig) -> anyhow::Result<TestServer> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let service = CalculatorService::new(config);
    let (stop, stopped) = oneshot::channel::<()>();

    tokio::spawn(
        Server::builder()
            .add_service(build_calculator_service(service.clone()))
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), async {
                let _ = stopped.await;
            }),
    );

    let calculator = Calculator::connect(format!("http://{addr}")).await?;
    Ok(TestServer {
        calculator,
        service,
        _stop: stop,
    })
}

fn fast_config() -> ServerConfig {
    ServerConfig {
        sum_work: WorkPlan {
            units: 3,
            unit: Duration::from_millis(200),
        },
        shutdown_timeout: Duration::from_millis(200),
        ..ServerConfig::default()
    }
}

async fn wait_until_idle(service: &CalculatorService) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while service.inflight() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("calls drained");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn unary_operations() -> anyhow::Result<()> {
    let server = start(fast_config()).await?;
    let calc = &server.calculator;

    assert_eq!(calc.sum(254, 19).await?, 273);
    assert_eq!(calc.sum(0, 0).await?, 0);
    assert!(matches!(
        calc.sum(i64::MAX, 1).await,
        Err(Error::InvalidArgument { .. })
    ));

    assert_eq!(calc.square_root(16).await?, 4.0);
    match calc.square_root(-9).await {
        Err(Error::InvalidArgument { reason }) => assert!(reason.contains("-9"), "{reason}"),
        other => panic!("unexpected outcome: {other:?}"),
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn deadline_sum_honors_the_callers_deadline() -> anyhow::Result<()> {
    let server = start(fast_config()).await?;
    let calc = &server.calculator;

    let started = Instant::now();
    let outcome = calc
        .sum_with_deadline(254, 19, Duration::from_millis(100))
        .await;
    assert_eq!(outcome, Err(Error::DeadlineExceeded));
    assert!(started.elapsed() < Duration::from_millis(600));
    wait_until_idle(&server.service).await;

    assert_eq!(
        calc.sum_with_deadline(254, 19, Duration::from_secs(5)).await?,
        273
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn prime_decomposition_streams() -> anyhow::Result<()> {
    let server = start(fast_config()).await?;
    let calc = &server.calculator;

    assert_eq!(calc.prime_factors(120).await?, vec![2, 2, 2, 3, 5]);
    assert_eq!(calc.prime_factors(1).await?, Vec::<i64>::new());
    assert_eq!(calc.prime_factors(9_999_991).await?, vec![9_999_991]);
    assert!(matches!(
        calc.prime_factors(0).await,
        Err(Error::InvalidArgument { .. })
    ));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancelling_mid_stream_stops_the_server() -> anyhow::Result<()> {
    let server = start(ServerConfig {
        factor_delay: Duration::from_millis(200),
        ..fast_config()
    })
    .await?;

    let cancel = CancellationToken::new();
    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&received);
    let outcome = server
        .calculator
        .prime_factors_with(1 << 30, &cancel, |factor| {
            sink.lock().unwrap().push(factor);
            cancel.cancel();
        })
        .await;

    assert_eq!(outcome, Err(Error::Cancelled));
    assert_eq!(*received.lock().unwrap(), vec![2]);
    wait_until_idle(&server.service).await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn average_of_streamed_samples() -> anyhow::Result<()> {
    let server = start(fast_config()).await?;
    let calc = &server.calculator;

    let mean = calc
        .average(vec![5.0, 10.0, 15.0, 20.0, 25.0, 30.0], Duration::from_millis(5))
        .await?;
    assert!((mean - 17.5).abs() < 1e-9);

    for _ in 0..2 {
        assert!(matches!(
            calc.average(Vec::new(), Duration::ZERO).await,
            Err(Error::InvalidArgument { .. })
        ));
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn average_respects_sample_cap() -> anyhow::Result<()> {
    let server = start(ServerConfig {
        max_samples: 3,
        ..fast_config()
    })
    .await?;

    assert_eq!(
        server
            .calculator
            .average(vec![1.0, 2.0, 3.0], Duration::ZERO)
            .await?,
        2.0
    );
    assert!(matches!(
        server
            .calculator
            .average(vec![1.0, 2.0, 3.0, 4.0], Duration::ZERO)
            .await,
        Err(Error::InvalidArgument { .. })
    ));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn find_max_emits_running_maxima() -> anyhow::Result<()> {
    let server = start(fast_config()).await?;

    let samples = vec![3, 1, 7, -2, 7, 9, 4];
    let maxima = server
        .calculator
        .find_max(samples, Duration::from_millis(5))
        .await?;
    assert_eq!(maxima, vec![3, 3, 7, 7, 7, 9, 9]);

    assert!(server.calculator.find_max(Vec::new(), Duration::ZERO).await?.is_empty());
    wait_until_idle(&server.service).await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn calls_on_one_connection_are_independent() -> anyhow::Result<()> {
    let server = start(ServerConfig {
        factor_delay: Duration::from_millis(100),
        ..fast_config()
    })
    .await?;
    let calc = server.calculator.clone();

    let slow = tokio::spawn(async move { calc.prime_factors(1 << 8).await });

    // The slow stream needs ~700ms; a unary call on the same channel does not wait.
    let started = Instant::now();
    assert_eq!(server.calculator.sum(2, 2).await?, 4);
    assert!(started.elapsed() < Duration::from_millis(500));

    assert_eq!(slow.await??, vec![2; 8]);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn shutdown_drains_then_cancels() -> anyhow::Result<()> {
    let server = start(ServerConfig {
        factor_delay: Duration::from_secs(10),
        ..fast_config()
    })
    .await?;

    let calc = server.calculator.clone();
    let (first_tx, first_rx) = oneshot::channel();
    let stream = tokio::spawn(async move {
        let mut first = Some(first_tx);
        calc.prime_factors_with(1 << 30, &CancellationToken::new(), |_| {
            if let Some(tx) = first.take() {
                let _ = tx.send(());
            }
        })
        .await
    });
    first_rx.await?;

    server.service.shutdown().await;

    assert_eq!(stream.await?, Err(Error::Cancelled));
    match server.calculator.sum(1, 1).await {
        Err(err) => assert_eq!(err.code(), Code::Unavailable),
        Ok(v) => panic!("call admitted after shutdown: {v}"),
    }
    Ok(())
}
