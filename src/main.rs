use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;

use apiwatch::config::CollectorConfig;
use apiwatch::store::{MemoryStore, RecordStore, RedisStore};
use apiwatch::{server, telemetry, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = CollectorConfig::parse();
    telemetry::init(config.log_format);

    // ── 1. Pick the store ────────────────────────────────────────
    let store: Arc<dyn RecordStore> = match &config.redis_url {
        Some(url) => {
            tracing::info!(url = %url, prefix = %config.redis_prefix, "connecting to redis");
            let redis = RedisStore::connect(url, &config.redis_prefix)
                .await
                .with_context(|| format!("cannot connect to redis at {url}"))?;
            Arc::new(redis)
        }
        None => {
            tracing::warn!("no redis url configured, records are kept in memory only");
            Arc::new(MemoryStore::new())
        }
    };

    // ── 2. Build shared state ────────────────────────────────────
    let state = Arc::new(AppState::new(
        store,
        config.api_key.clone(),
        config.store_timeout(),
        config.stream_interval(),
    ));

    if config.recalculate_on_start {
        state.aggregator.recalculate_all().await;
    }

    // ── 3. Bind & serve ──────────────────────────────────────────
    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    tracing::info!(addr = %config.bind, "collector listening");

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown requested");
        }
        signal.cancel();
    });

    axum::serve(listener, server::create_router(state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .context("server exited with error")?;

    Ok(())
}
