mod config;
mod db;
mod errors;
mod models;
mod notify;
mod policy;
mod routes;
mod state;
mod store;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{Config, StoreBackend};
use crate::db::{create_pool, ensure_schema};
use crate::notify::{LogNotifier, NotificationDispatcher, WebhookNotifier};
use crate::policy::service::PolicyService;
use crate::policy::POLICIES_COLLECTION;
use crate::routes::build_router;
use crate::state::AppState;
use crate::store::{DocumentStore, MemoryStore, PgDocumentStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails fast on missing or invalid env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={}",
                env!("CARGO_PKG_NAME").replace('-', "_"),
                &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting policy registry v{}", env!("CARGO_PKG_VERSION"));

    let store = build_store(&config).await?;
    let notifier = build_notifier(&config)?;

    let service = PolicyService::new(
        store,
        notifier,
        config.page_limits(),
        config.store_timeout,
    );
    info!(
        "Paging: default {} / max {} per page, exact has-more: {}",
        config.default_page_size, config.max_page_size, config.exact_has_more
    );

    let state = AppState {
        service,
        config: config.clone(),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

/// Connects the configured document store.
async fn build_store(config: &Config) -> Result<Arc<dyn DocumentStore>> {
    match config.store_backend {
        StoreBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL is required for the postgres store")?;
            let pool = create_pool(url).await?;
            ensure_schema(&pool).await?;
            Ok(Arc::new(PgDocumentStore::new(pool)))
        }
        StoreBackend::Memory => {
            let store = MemoryStore::new();
            if let Some(seed) = &config.seed_file {
                store.load_seed(POLICIES_COLLECTION, seed).await?;
            }
            info!("Using in-memory document store");
            Ok(Arc::new(store))
        }
    }
}

fn build_notifier(config: &Config) -> Result<Arc<dyn NotificationDispatcher>> {
    match &config.notify_webhook_url {
        Some(url) => {
            let notifier = WebhookNotifier::new(url.clone(), config.notify_timeout)
                .context("Failed to build notification client")?;
            info!("Notifications go to webhook {url}");
            Ok(Arc::new(notifier))
        }
        None => {
            info!("No NOTIFY_WEBHOOK_URL set; notifications are logged only");
            Ok(Arc::new(LogNotifier))
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
