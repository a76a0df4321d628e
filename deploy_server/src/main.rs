//! Site deployment server.
//!
//! A standalone binary that accepts deployment jobs over HTTP, builds each
//! submitted project in its own workspace and publishes the result behind
//! nginx. Project records live in Postgres when a database is configured,
//! otherwise in memory.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use site_deploy::config::DeployConfig;
use site_deploy::services::deployer::Deployer;
use site_deploy::services::pg_store::PgProjectStore;
use site_deploy::services::project_store::{MemoryProjectStore, ProjectStore};
use site_deploy::{db, metrics, routes};

#[derive(Parser)]
#[command(name = "site-deploy", about = "Site deployment service")]
struct Cli {
    /// Server port
    #[arg(short, long, env = "DEPLOY_PORT", default_value = "3001")]
    port: u16,

    /// PostgreSQL connection URL
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Maximum pooled database connections
    #[arg(long, env = "DATABASE_MAX_CONNECTIONS", default_value = "5")]
    max_connections: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    if log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "info".into()),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "info".into()),
            )
            .init();
    }

    let cli = Cli::parse();

    tracing::info!("Starting site deployment server...");

    let store: Arc<dyn ProjectStore> = match cli.database_url.as_deref() {
        Some(url) => {
            let pool = db::create_pool(url, cli.max_connections)?;
            {
                let mut conn = pool
                    .get()
                    .await
                    .map_err(|e| anyhow::anyhow!("diesel pool: {e}"))?;
                tracing::info!("Running deployment migration...");
                db::run_migration(&mut conn).await?;
                tracing::info!("Deployment migration completed.");
            }
            Arc::new(PgProjectStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set -- project records are kept in memory");
            Arc::new(MemoryProjectStore::new())
        }
    };

    let config = Arc::new(DeployConfig::from_env());
    tracing::info!(
        projects_root = %config.projects_root.display(),
        base_url = %config.public_base_url,
        "Deployment configuration loaded"
    );

    let state = routes::AppState::new(Deployer::new(store, config));
    let app = routes::deploy_router(state);

    // Initialize metrics
    metrics::init_metrics();

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));
    tracing::info!("Site deployment server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
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
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT, shutting down..."),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
    }
}
