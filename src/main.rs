use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use support_directory::api::{self, metrics, rate_limit};
use support_directory::config::Config;
use support_directory::notifications::EmailNotifier;
use support_directory::AppState;

#[derive(Parser, Debug)]
#[command(name = "support-directory")]
#[command(author, version, about = "Accounts and access control for the disability support directory", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "SUPPORT_DIRECTORY_CONFIG", default_value = "support-directory.toml")]
    config: PathBuf,

    /// Override log level
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(&cli.config)?;

    let log_level = cli
        .log_level
        .as_ref()
        .unwrap_or(&config.logging.level)
        .clone();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting support-directory v{}", env!("CARGO_PKG_VERSION"));

    api::set_expose_internal_errors(config.server.development);

    std::fs::create_dir_all(&config.server.data_dir)?;
    let db = support_directory::db::init(&config.server.data_dir).await?;

    let notifier = EmailNotifier::new(config.email.clone());
    if !notifier.is_enabled() {
        tracing::warn!("SMTP is not configured; account emails will be logged and dropped");
    }

    support_directory::auth::warm_dummy_hash().await?;

    let metrics_handle = metrics::init_metrics()?;
    let state = Arc::new(
        AppState::new(config.clone(), db, Arc::new(notifier)).with_metrics(metrics_handle),
    );

    rate_limit::spawn_cleanup_task(state.rate_limiter.clone(), config.rate_limit.cleanup_interval);

    let app = api::create_router(state);

    let api_addr = format!("{}:{}", config.server.host, config.server.api_port);
    let listener = tokio::net::TcpListener::bind(&api_addr).await?;

    tracing::info!("API server listening on http://{}", api_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
