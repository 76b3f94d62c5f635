//! welfare_members - membership backend API

use std::net::SocketAddr;
use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use welfare_members::api::{build_router, AppState};
use welfare_members::email::PgOutboxRelay;
use welfare_members::jobs::JobScheduler;
use welfare_members::maintenance::MaintenanceService;
use welfare_members::profile::ProfileService;
use welfare_members::store::{PgProfileMatcher, PgProfileStore, PgSessionStore};
use welfare_members::{db, Config};

/// Initialize tracing/logging. `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "welfare_members=debug,tower_http=debug".into());

    let json = std::env::var("LOG_FORMAT").is_ok_and(|format| format == "json");
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing();

    let config = Config::from_env()?;
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    tracing::info!(environment = %config.environment, "Starting welfare_members server");
    tracing::info!("Connecting to database...");

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await?;
    db::verify_connection(&pool).await?;

    // Verify database schema
    if !db::check_schema(&pool).await? {
        tracing::error!("Database schema is not complete. Please run migrations.");
        return Err(anyhow::anyhow!("Database schema incomplete"));
    }

    tracing::info!("Database connected successfully");

    let profiles = Arc::new(ProfileService::new(
        Arc::new(PgSessionStore::new(pool.clone())),
        Arc::new(PgProfileStore::new(pool.clone())),
        Arc::new(PgProfileMatcher::new(pool.clone())),
        config.fetch_policy(),
    ));
    let maintenance = MaintenanceService::load(pool.clone()).await?;
    if maintenance.is_enabled() {
        tracing::warn!("Maintenance mode is enabled; only admins will be served");
    }

    let scheduler = JobScheduler::new(pool.clone(), profiles.orchestrator().clone())
        .with_config(config.scheduler())
        .with_maintenance(maintenance.clone())
        .start();

    let state = AppState {
        pool: pool.clone(),
        profiles,
        relay: Arc::new(PgOutboxRelay::new(config.email_hourly_limit)),
        maintenance,
        password_reset: config.password_reset(),
    };

    if config.is_production() && config.password_reset_base_url.starts_with("http://localhost") {
        tracing::warn!("PASSWORD_RESET_BASE_URL still points at localhost");
    }

    let app = build_router(state);

    tracing::info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Cleanup
    tracing::info!("Server shutting down...");
    scheduler.abort();
    pool.close().await;
    tracing::info!("Database connections closed. Goodbye!");

    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
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
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}
