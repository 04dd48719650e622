//! cq-api: translate free-text cleaning and query instructions into
//! validated operations over a clinical dataset.

use std::sync::Arc;
use std::time::Duration;

use cq_api::config::ApiConfig;
use cq_api::db;
use cq_api::routes;
use cq_api::state::AppState;
use cq_engine::Engine;
use cq_store::{MemoryStore, sample};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

async fn load_store(config: &ApiConfig) -> anyhow::Result<MemoryStore> {
    if let Some(path) = &config.data_path {
        tracing::info!(path = %path, "loading dataset snapshot");
        return Ok(MemoryStore::load_json(path).await?);
    }
    if config.sample_data {
        tracing::info!("loading clinical sample dataset");
        return Ok(sample::clinical_store()?);
    }
    tracing::warn!("no dataset configured; starting empty");
    Ok(MemoryStore::new())
}

/// Periodically drop held plans whose confirmation window has closed.
fn spawn_expiry_sweeper(engine: Arc<Engine>, every: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            match engine.expire_pending().await {
                Ok(expired) if !expired.is_empty() => {
                    tracing::info!(count = expired.len(), "expired pending plans");
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "expiry sweep failed"),
            }
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "cq-api starting");

    let config = ApiConfig::from_env();
    let engine_config = config.load_engine_config()?;
    let store = load_store(&config).await?;

    // Persist the audit log to PostgreSQL if DATABASE_URL is set.
    let state = if let Some(database_url) = &config.database_url {
        tracing::info!("connecting to PostgreSQL");
        let pool = db::connect(database_url).await?;
        AppState::with_pool(pool, engine_config, store).await?
    } else {
        tracing::warn!("DATABASE_URL not set, audit log is in-memory");
        AppState::new(engine_config, store).await?
    };

    spawn_expiry_sweeper(
        state.engine.clone(),
        Duration::from_secs(config.sweep_interval_secs.max(1)),
    );

    let app = routes::build_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "listening");

    axum::serve(listener, app).await?;

    Ok(())
}
