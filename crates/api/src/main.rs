//! Order ingestion service entry point.

use std::process::ExitCode;
use std::sync::Arc;

use api::config::{Config, LogFormat};
use api::error::StartupError;
use api::orchestrator::Ingestion;
use api::routes::AppState;
use messaging::{Backend, TracingObserver};
use orders::{InMemoryOrderRepository, OrderCreator, OrderService, PostgresOrderRepository};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(format: LogFormat, default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer().pretty()).init(),
    }
}

async fn order_gateway(config: &Config) -> Result<Arc<dyn OrderCreator>, StartupError> {
    match config.database_config() {
        Some(db) => {
            let repo = PostgresOrderRepository::connect(&db).await?;
            repo.run_migrations().await?;
            Ok(Arc::new(OrderService::new(repo)))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, orders are kept in memory");
            Ok(Arc::new(OrderService::new(InMemoryOrderRepository::new())))
        }
    }
}

async fn run(config: Config) -> Result<(), StartupError> {
    // 1. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| StartupError::Metrics(e.to_string()))?;

    // 2. Order store and creation gateway
    let gateway = order_gateway(&config).await?;

    // 3. Broker adapter, producer and consumer pool
    let backend = Backend::from_kind(config.broker)?;
    tracing::info!(adapter = %backend.kind(), brokers = ?config.brokers, "broker adapter selected");
    let observer = TracingObserver::shared();
    let ingestion = Ingestion::new(
        backend.producer(config.producer_config(), Arc::clone(&observer)),
        backend.consumer(config.consumer_config(), gateway, observer),
        config.consumer_workers,
        config.shutdown_timeout,
    );

    // 4. HTTP trigger
    let state = Arc::new(AppState {
        producer: ingestion.producer(),
    });
    let app = api::create_app(state, metrics_handle);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| StartupError::Bind {
            addr: addr.clone(),
            source,
        })?;

    // 5. Run until SIGINT/SIGTERM, then drain
    ingestion.run(listener, app, shutdown_signal()).await
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::from_env();
    match &config {
        Ok(config) => init_tracing(config.log_format, &config.log_level),
        Err(_) => init_tracing(LogFormat::default(), "info"),
    }

    let result = match config {
        Ok(config) => run(config).await,
        Err(err) => Err(err),
    };

    match result {
        Ok(()) => {
            tracing::info!("server shut down gracefully");
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!(error = %err, "fatal startup error");
            ExitCode::FAILURE
        }
    }
}
