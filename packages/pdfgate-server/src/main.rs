//! pdfgate server binary entry point.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use pdfgate_core::SystemClock;
use pdfgate_server::apikey::{FirestoreStoreAdapter, KeyService, MemoryRepository, Repository};
use pdfgate_server::config::AppConfig;
use pdfgate_server::network::handlers::NullDocumentOpener;
use pdfgate_server::network::NetworkConfig;
use pdfgate_server::NetworkModule;

#[derive(Parser)]
#[command(name = "pdfgate-server")]
#[command(about = "Renders the first page of an uploaded PDF to JPEG behind an API-key gate")]
#[command(version)]
struct Cli {
    /// Log filter, e.g. `info` or `pdfgate_server=debug,tower_http=info`.
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    info!(version = env!("CARGO_PKG_VERSION"), "starting pdfgate-server");

    let config = AppConfig::from_env().context("failed to load configuration")?;

    let metrics_handle = pdfgate_server::metrics::install_recorder()
        .context("failed to install metrics recorder")?;

    let key_service = if config.enable_firestore_keys {
        Some(Arc::new(build_key_service(&config).await?))
    } else {
        info!("ENABLE_FIRESTORE_KEYS=false: temporary-key endpoints are disabled");
        None
    };

    let network_config = NetworkConfig {
        port: config.port,
        ..NetworkConfig::default()
    };

    let mut module = NetworkModule::new(
        network_config,
        config.static_keys.clone(),
        config.master_keys.clone(),
        key_service,
        Arc::new(NullDocumentOpener),
        metrics_handle,
        config.admin_rate_limit_per_minute,
        config.admin_burst,
    );

    let port = module.start().await.context("failed to bind listener")?;
    info!(port, "listening");

    if let Err(err) = module.serve(shutdown_signal()).await {
        error!(%err, "server exited with error");
        return Err(err);
    }

    info!("pdfgate-server stopped");
    Ok(())
}

/// Builds the Firestore-backed [`KeyService`], falling back to an in-memory
/// repository when no project ID is configured (local development).
async fn build_key_service(config: &AppConfig) -> anyhow::Result<KeyService> {
    let repository: Arc<dyn Repository> = match &config.firestore_project_id {
        Some(project_id) => {
            info!(project_id, collection = %config.firestore_collection, "using Firestore key store");
            Arc::new(
                FirestoreStoreAdapter::new(project_id, config.firestore_collection.clone())
                    .await
                    .context("failed to connect to Firestore")?,
            )
        }
        None => {
            warn!("FIRESTORE_PROJECT_ID not set: falling back to an in-memory key store");
            Arc::new(MemoryRepository::new())
        }
    };

    Ok(KeyService::new(repository, Arc::new(SystemClock)))
}

fn init_logging(log_level: &str) {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
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
        () = ctrl_c => {},
        () = terminate => {},
    }
}
