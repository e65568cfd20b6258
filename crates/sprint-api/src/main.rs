//! Sprint API Service
//!
//! REST API for running build sprints on sourced leads.

use anyhow::{Context, Result};
use sprint_api::config::{Config, StorageBackend};
use sprint_api::{create_router, AppState};
use sprint_engine::{LogNotifier, MemoryStore, Notifier, RedisStore, SprintEngine, Store, WebhookNotifier};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "sprint_api=debug,sprint_engine=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Sprint API Service");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;

    // Initialize storage
    let store: Arc<dyn Store> = match config.storage_backend {
        StorageBackend::Memory => {
            info!("Using in-memory storage; records are lost on restart");
            Arc::new(MemoryStore::new())
        }
        StorageBackend::Redis => {
            info!("Redis URL: {}", config.redis_url);
            let store = RedisStore::new(&config.redis_url)
                .await
                .context("Failed to initialize storage")?;
            store.ping().await.context("Redis health check failed")?;
            Arc::new(store)
        }
    };

    let notifier: Arc<dyn Notifier> = match &config.notify_webhook_url {
        Some(url) => {
            info!("Nudges will be posted to {}", url);
            Arc::new(WebhookNotifier::new(url.clone()))
        }
        None => {
            info!("NOTIFY_WEBHOOK_URL not set; nudges are only logged");
            Arc::new(LogNotifier)
        }
    };

    let policy = config.policy();
    info!(
        "Checkpoint auto-verify: {}, late finalists: {:?}",
        policy.auto_verify_checkpoints, policy.late_completions
    );

    let engine = SprintEngine::new(store)
        .with_policy(policy)
        .with_notifier(notifier)
        .with_notify_timeout(config.notify_timeout());

    // Create router
    let app = create_router(AppState::new(Arc::new(engine)));

    // Bind and serve
    let addr = config.api_address();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("Sprint API listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
