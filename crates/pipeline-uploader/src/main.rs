//! Pipeline Uploader - signed upload URL service

use anyhow::Result;
use pipeline_common::logging::{init_logging, LogConfig};
use pipeline_uploader::{
    approvals::PgApprovalStore, audit::PgAuditRecorder, identity::HttpIdentityVerifier,
    router, signer::S3UrlSigner, AppState, UploaderConfig,
};
use sqlx::postgres::PgPoolOptions;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::signal;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Environment variables take precedence
    let log_config = LogConfig::builder()
        .log_file_prefix("pipeline-uploader")
        .filter_directives("tower_http=debug,sqlx=warn")
        .build()
        .merge_env()?;

    let _log_guard = init_logging(&log_config)?;

    info!("Starting upload issuance service");

    let config = UploaderConfig::load()?;
    info!(
        bucket = %config.bucket,
        prefix = %config.upload_prefix,
        expiry_min = config.signed_url_exp_min,
        "Configuration loaded"
    );

    let db_pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(Duration::from_secs(10))
        .connect(&config.database_url)
        .await?;
    info!("Database connection pool established");

    sqlx::migrate!("../../migrations")
        .run(&db_pool)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to run migrations: {}", e))?;
    info!("Database migrations completed");

    let state = AppState {
        verifier: Arc::new(HttpIdentityVerifier::new(&config.token_verify_url)?),
        approvals: Arc::new(PgApprovalStore::new(db_pool.clone())),
        signer: Arc::new(S3UrlSigner::new(&config.s3, &config.bucket).await),
        audit: Arc::new(PgAuditRecorder::new(db_pool)),
        upload_prefix: config.upload_prefix.clone(),
        expires_in: config.signed_url_expiry(),
    };

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down gracefully");
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
        _ = ctrl_c => info!("Received Ctrl+C, starting graceful shutdown"),
        _ = terminate => info!("Received terminate signal, starting graceful shutdown"),
    }
}
