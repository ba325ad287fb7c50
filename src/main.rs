//! Unit Ledger - unit cash ledger and automated fee-posting backend
//!
//! Records fees for services rendered by the institution's units, tracks
//! each unit's cash, and settles unit cash into the central treasury.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{middleware, Router};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use unit_ledger::config::{LogFormat, StoreBackend};
use unit_ledger::jobs::{JobScheduler, JobSchedulerConfig};
use unit_ledger::posting::RuleTable;
use unit_ledger::store::{InMemoryLedgerStore, LedgerStore, PgLedgerStore};
use unit_ledger::{api, db, AppState, Config};

/// Initialize tracing/logging
fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "unit_ledger=debug,tower_http=debug".into());

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Build the application router
fn build_router(state: AppState) -> Router {
    // Axum layers run in reverse order: context -> logging -> handler
    let api_router = api::create_router()
        .layer(middleware::from_fn(api::middleware::logging_middleware))
        .layer(middleware::from_fn(api::middleware::context_middleware));

    Router::new()
        .route("/health", axum::routing::get(health_check))
        .nest("/api/v1", api_router)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

/// Load the posting rule table, from file when configured
fn load_rules(config: &Config) -> anyhow::Result<RuleTable> {
    match &config.posting_rules_path {
        Some(path) => {
            let rules = RuleTable::from_json_file(path)?;
            tracing::info!(path = %path, rules = rules.rules().len(), "Posting rules loaded");
            Ok(rules)
        }
        None => Ok(RuleTable::builtin()),
    }
}

/// Open the configured store
async fn open_store(config: &Config) -> anyhow::Result<(Arc<dyn LedgerStore>, Option<PgPool>)> {
    match config.store_backend {
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store; data is lost on shutdown");
            let store: Arc<dyn LedgerStore> = Arc::new(InMemoryLedgerStore::new());
            Ok((store, None))
        }
        StoreBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is required for the postgres backend"))?;

            tracing::info!("Connecting to database...");
            let pool = PgPoolOptions::new()
                .max_connections(config.database_max_connections)
                .connect(url)
                .await?;

            db::verify_connection(&pool).await?;
            if !db::check_schema(&pool).await? {
                tracing::error!("Database schema is not complete. Please run migrations.");
                return Err(anyhow::anyhow!("Database schema incomplete"));
            }

            tracing::info!("Database connected successfully");
            let store: Arc<dyn LedgerStore> = Arc::new(PgLedgerStore::new(pool.clone()));
            Ok((store, Some(pool)))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    init_tracing(config.log_format);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    tracing::info!(
        backend = ?config.store_backend,
        environment = %config.environment,
        "Starting unit ledger server"
    );

    let rules = load_rules(&config)?;
    let (store, pool) = open_store(&config).await?;
    let state = AppState::new(store, &config, rules);

    let scheduler = JobScheduler::with_config(state.outbox.clone(), JobSchedulerConfig::from(&config));
    let scheduler_handle = scheduler.start();

    let app = build_router(state);

    tracing::info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    // Cleanup
    tracing::info!("Server shutting down...");
    scheduler_handle.abort();
    if let Some(pool) = pool {
        pool.close().await;
        tracing::info!("Database connections closed");
    }
    tracing::info!("Goodbye!");

    Ok(())
}

/// Shutdown signal handler for graceful shutdown
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
