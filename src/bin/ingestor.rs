//! promgres ingestor binary
//!
//! Boots the ingestion engine against the configured store and waits for a
//! shutdown signal. The remote-write HTTP receiver runs as a separate
//! component and hands requests to the engine through [`Ingestor::insert`].

use promgres::config::ComponentFactory;
use promgres::ingestor::{Ingestor, IngestorConfig};

use clap::Parser;
use tokio::signal;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// promgres ingestor
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Acknowledge writes before they are flushed to the store
    #[arg(long, env = "PROMGRES_ASYNC_ACKS")]
    async_acks: bool,

    /// Throughput log interval in seconds (async-ack mode, 0 disables)
    #[arg(long, env = "PROMGRES_REPORT_INTERVAL", default_value = "0")]
    report_interval: u64,

    /// Metric-name cache capacity in entries
    #[arg(long, env = "PROMGRES_METRIC_CACHE_CAPACITY", default_value = "10000")]
    metric_cache_capacity: u64,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let log_level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .json()
        .init();

    info!("starting promgres ingestor");

    let store = ComponentFactory::create_store().await?;
    let config = IngestorConfig {
        async_acks: args.async_acks,
        report_interval: args.report_interval,
        metric_name_cache_capacity: args.metric_cache_capacity,
    };

    let ingestor = Ingestor::new(store, config).await?;
    info!("ingestor ready");

    shutdown_signal().await;

    info!("ingestor shutting down");
    ingestor.close();

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
