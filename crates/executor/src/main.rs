use dotenvy::dotenv;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::time;
use tracing::{error, info, warn};

use broker::{AlpacaClient, BrokerGateway};
use common::actors::{ActorType, shutdown_channel, wait_for_shutdown};
use common::config::Settings;
use common::logger;
use common::models::{Signal, StreamStatus};
use executor::actors::supervisor::Supervisor;
use executor::api;
use executor::control::ControlSurface;
use executor::mode::ModeController;
use executor::observations::SignalObservations;
use executor::retry::RetryPolicy;
use executor::services::execution_service::{OrderExecutor, timed};
use executor::services::signal_router::SignalRouter;
use executor::services::status_reporter::StatusReporter;
use signal_stream::SignalGateway;
use storage::{TradeLedger, TradeStore};

const SIGNAL_CHANNEL_CAPACITY: usize = 1_024;
const OBSERVATION_CAPACITY: usize = 200;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let settings = Settings::from_env()?;
    logger::setup_logger(&settings.log_level);
    info!("Starting {} v{}", api::SERVICE_NAME, env!("CARGO_PKG_VERSION"));
    info!("Trading mode: {}", settings.default_mode);

    let ledger = Arc::new(TradeLedger::open(&settings.ledger_path).await?);
    let gateway: Arc<dyn BrokerGateway> = Arc::new(AlpacaClient::from_settings(&settings)?);

    match timed(settings.broker_timeout, gateway.get_account()).await {
        Ok(account) => info!("Connected to Alpaca API. Account status: {}", account.status),
        Err(e) => warn!("Alpaca API not reachable at startup: {}", e),
    }

    let retry_policy = RetryPolicy::with_max_retries(settings.max_retries);
    info!("Order retry schedule: {:?}", retry_policy.schedule());

    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    let mode = Arc::new(ModeController::new(settings.default_mode));
    let executor = Arc::new(OrderExecutor::new(
        gateway,
        ledger.clone(),
        mode.clone(),
        retry_policy,
        settings.broker_timeout,
        settings.default_quantity,
        shutdown_rx.clone(),
    ));
    let observations = Arc::new(SignalObservations::new(OBSERVATION_CAPACITY));

    let (signal_tx, _) = broadcast::channel::<Arc<Signal>>(SIGNAL_CHANNEL_CAPACITY);
    let (status_tx, status_rx) = watch::channel(StreamStatus::default());
    let status_tx = Arc::new(status_tx);

    let mut supervisor = Supervisor::new(settings.shutdown_grace);

    let tx_for_gateway = signal_tx.clone();
    let url = settings.stream_url.clone();
    let client_name = settings.client_name.clone();
    let heartbeat_interval = settings.heartbeat_interval;
    supervisor.register_actor(
        ActorType::SignalStream,
        Box::new(move || {
            Box::new(SignalGateway::new(
                &url,
                &client_name,
                heartbeat_interval,
                tx_for_gateway.clone(),
                status_tx.clone(),
            ))
        }),
    );

    let tx_for_router = signal_tx.clone();
    let executor_for_router = executor.clone();
    let observations_for_router = observations.clone();
    let threshold = settings.confidence_threshold;
    supervisor.register_actor(
        ActorType::SignalRouter,
        Box::new(move || {
            Box::new(SignalRouter::new(
                tx_for_router.subscribe(),
                executor_for_router.clone(),
                observations_for_router.clone(),
                threshold,
            ))
        }),
    );

    let executor_for_status = executor.clone();
    let status_interval = settings.status_interval;
    supervisor.register_actor(
        ActorType::StatusReporter,
        Box::new(move || {
            Box::new(StatusReporter::new(
                executor_for_status.clone(),
                status_interval,
            ))
        }),
    );

    let control = Arc::new(ControlSurface::new(
        mode,
        executor,
        ledger.clone(),
        status_rx,
        observations,
    ));
    let listener = tokio::net::TcpListener::bind(settings.control_addr).await?;
    info!("Control API listening on http://{}", settings.control_addr);

    let mut server_shutdown = shutdown_rx.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, api::router(control))
            .with_graceful_shutdown(async move { wait_for_shutdown(&mut server_shutdown).await })
            .await
    });

    let supervisor_handle = tokio::spawn(async move { supervisor.start(shutdown_rx).await });

    shutdown_requested().await;
    info!("Shutdown signal received, draining...");
    let _ = shutdown_tx.send(true);

    if let Err(e) = supervisor_handle.await {
        error!("Supervisor task failed: {}", e);
    }
    match time::timeout(settings.shutdown_grace, server).await {
        Ok(Ok(Ok(()))) => info!("Control API stopped"),
        Ok(Ok(Err(e))) => error!("Control API error: {}", e),
        Ok(Err(e)) => error!("Control API task failed: {}", e),
        Err(_) => warn!("Control API did not drain within {:?}", settings.shutdown_grace),
    }

    ledger.close().await?;
    info!("Trade history flushed ({} records). Bye.", ledger.all().await.len());
    Ok(())
}

async fn shutdown_requested() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
