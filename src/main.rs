// Define data modules
mod models;   // Data structures (configs, observations, intents, Db)
mod error;    // Error types and HTTP mapping
mod settings; // Runtime configuration (file + env)
mod store;    // Persistent storage (Repository, db.json)
mod policy;   // Usage-threshold / quiet-hours policy engine
mod usage;    // Daily totals and dashboard summary
mod auth;     // Registration and login
mod dispatch; // Notification delivery
mod monitor;  // Periodic usage check
mod state;    // Shared handler state
mod routes_users; // HTTP handlers for accounts
mod routes_apps;  // HTTP handlers for app limits & quiet hours
mod routes_usage; // HTTP handlers for usage, summary, evaluation

use std::{net::SocketAddr, sync::Arc, time::Duration};

// Import axum routing utilities and Router
use axum::{
    Router,
    routing::{get, post},
};
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{EnvFilter, fmt};

use crate::dispatch::TracingDispatcher;
use crate::error::StartupError;
use crate::monitor::Monitor;
use crate::settings::{AppConfig, LoggingConfig};
use crate::state::AppState;
use crate::store::{JsonFileStore, MemoryStore, Repository};

#[tokio::main]
async fn main() {
    let config = match AppConfig::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    init_logging(&config.logging);

    if let Err(e) = run(config).await {
        tracing::error!(error = %e, "server error");
        std::process::exit(1);
    }
}

fn init_logging(cfg: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.level));

    match cfg.format.as_str() {
        "json" => fmt().json().with_env_filter(filter).with_target(true).init(),
        _ => fmt().pretty().with_env_filter(filter).with_target(true).init(),
    }
}

fn build_router(state: AppState) -> Router {
    let api = Router::new()
        // accounts
        .route("/users/register", post(routes_users::register))
        .route("/users/login", post(routes_users::login))
        // app limits
        .route("/users/:user_id/apps", get(routes_apps::list_apps))
        .route(
            "/users/:user_id/apps/:app_id",
            get(routes_apps::get_app)
                .put(routes_apps::put_app)
                .delete(routes_apps::delete_app),
        )
        .route("/users/:user_id/apps/:app_id/evaluate", post(routes_usage::evaluate))
        // quiet hours
        .route(
            "/users/:user_id/quiet-hours",
            get(routes_apps::get_quiet_hours).put(routes_apps::put_quiet_hours),
        )
        // usage
        .route("/users/:user_id/usage", post(routes_usage::record_usage))
        .route("/users/:user_id/summary", get(routes_usage::get_summary));

    Router::new()
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn run(config: AppConfig) -> Result<(), StartupError> {
    let addr: SocketAddr = config.server.addr.parse()?;

    let repo: Arc<dyn Repository> = if config.storage.in_memory {
        tracing::warn!("in-memory storage, nothing will be persisted");
        Arc::new(MemoryStore::new())
    } else {
        let store = JsonFileStore::new(&config.storage.db_path);
        tracing::info!(path = %store.path().display(), "using JSON store");
        Arc::new(store)
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let monitor = if config.monitor.enabled {
        let monitor = Monitor::new(
            repo.clone(),
            Arc::new(TracingDispatcher),
            config.monitor.cooldown_minutes,
        );
        let every = Duration::from_secs(config.monitor.interval_secs.max(1));
        Some(tokio::spawn(monitor.run(every, shutdown_rx)))
    } else {
        None
    };

    let app = build_router(AppState::new(repo));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("Server running at http://{addr}");
    tracing::info!("API base:       http://{addr}/api");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // stop the monitor after the server has drained
    let _ = shutdown_tx.send(true);
    if let Some(handle) = monitor {
        if let Err(e) = handle.await {
            tracing::warn!(error = %e, "monitor task ended abnormally");
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutdown requested"),
        Err(e) => {
            tracing::error!(error = %e, "cannot listen for ctrl-c, running until killed");
            std::future::pending::<()>().await;
        }
    }
}
