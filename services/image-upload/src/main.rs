use anyhow::{anyhow, Context, Result};
use aws_config::retry::RetryConfig;
use aws_config::{BehaviorVersion, Region};
use aws_types::SdkConfig;
use image_upload::api::{start_api_server, AppState};
use image_upload::config::{AwsConfig, Config, Runtime};
use image_upload::lambda::run_lambda;
use image_upload::{EventBridgePublisher, PgMetadataStore, S3Uploader, UploadHandler, UploadSettings};
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config.service.log_level);

    info!(
        service = %config.service.name,
        runtime = ?config.service.runtime,
        "Starting image upload service"
    );

    // Initialize components
    let metadata_store = Arc::new(
        PgMetadataStore::new(&config.database)
            .await
            .context("Failed to initialize metadata store")?,
    );

    // Run migrations if enabled
    if config.database.run_migrations {
        metadata_store
            .run_migrations()
            .await
            .context("Failed to run database migrations")?;
    }

    let sdk_config = load_aws_config(&config.aws).await;
    let s3_uploader = Arc::new(S3Uploader::new(&sdk_config, &config.s3));
    let publisher = Arc::new(EventBridgePublisher::new(&sdk_config, &config.events));

    let handler = UploadHandler::new(
        metadata_store.clone(),
        s3_uploader,
        publisher,
        UploadSettings::from(&config.s3),
    );

    match config.service.runtime {
        Runtime::Lambda => run_lambda(handler)
            .await
            .map_err(|e| anyhow!("Lambda runtime error: {e}"))?,
        Runtime::Http => {
            init_metrics(config.service.metrics_port)?;

            let state = AppState {
                handler,
                metadata_store,
                service_name: config.service.name.clone(),
            };

            start_api_server(state, &config.api, shutdown_signal()).await?;
        }
    }

    info!("Image upload service stopped");

    Ok(())
}

/// Shared AWS SDK configuration for the S3 and EventBridge clients
async fn load_aws_config(config: &AwsConfig) -> SdkConfig {
    aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(config.region.clone()))
        .retry_config(RetryConfig::standard().with_max_attempts(config.max_attempts))
        .load()
        .await
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json())
        .init();
}

/// Initialize Prometheus metrics exporter
fn init_metrics(port: u16) -> Result<()> {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();

    builder
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus metrics exporter")?;

    info!(port = port, "Prometheus metrics exporter started");

    Ok(())
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
