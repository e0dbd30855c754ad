//! Ingest Pipeline - CSV to Postgres loader

use anyhow::Result;
use clap::{Parser, Subcommand};
use pipeline_common::logging::{init_logging, LogConfig, LogLevel};
use pipeline_ingest::{
    config::{IngestConfig, StorageBackend},
    loader::TransactionalLoader,
    pipeline::{BatchRunner, IngestPipeline},
    session::PgConnector,
    storage::{LocalObjectStore, ObjectRef, ObjectStore, S3ObjectStore},
    trigger::{trigger_routes, TriggerState},
};
use std::{net::SocketAddr, sync::Arc};
use tokio::signal;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "pipeline-ingest")]
#[command(author, version, about = "Load uploaded CSV objects into Postgres")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest one object and log the batch report
    Run {
        /// Bucket (or local container directory) holding the object
        #[arg(short, long, env = "BUCKET_NAME")]
        bucket: String,

        /// Object name within the bucket
        #[arg(short, long)]
        object: String,
    },

    /// Serve the HTTP trigger endpoint
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    // Environment variables take precedence over the defaults chosen here
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("pipeline-ingest")
        .filter_directives("tower_http=info,sqlx=warn")
        .build()
        .merge_env()?;

    let _log_guard = init_logging(&log_config)?;

    let config = IngestConfig::load()?;
    info!(
        table = %config.qualified_table()?,
        backend = ?config.storage.backend,
        reconnect_delay_ms = config.reconnect_delay_ms,
        "Configuration loaded"
    );

    let store: Arc<dyn ObjectStore> = match config.storage.backend {
        StorageBackend::S3 => Arc::new(S3ObjectStore::new(&config.storage).await),
        StorageBackend::Local => Arc::new(LocalObjectStore::new(&config.storage.local_root)),
    };

    let table = config.qualified_table()?;
    let connector = PgConnector::new(
        config.database.connect_options()?,
        table.clone(),
        config.database.connect_timeout(),
    );
    let loader = TransactionalLoader::new(connector, table, config.reconnect_delay());
    let pipeline = Arc::new(IngestPipeline::new(store, loader));

    match cli.command {
        Command::Run { bucket, object } => {
            // The report is the result; a failed batch is not a process failure
            let outcome = pipeline.run_batch(ObjectRef::new(bucket, object)).await;
            info!(batch_id = %outcome.batch_id, status = ?outcome.status(), "Batch finished");
        },
        Command::Serve => {
            let state = Arc::new(TriggerState::new(pipeline, config.bucket_override.clone()));
            let app = trigger_routes(state);

            let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
            let listener = tokio::net::TcpListener::bind(addr).await?;
            info!("Trigger endpoint listening on {}", addr);

            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;

            info!("Server shut down gracefully");
        },
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, finishing in-flight batch"),
        _ = terminate => info!("Received terminate signal, finishing in-flight batch"),
    }
}
