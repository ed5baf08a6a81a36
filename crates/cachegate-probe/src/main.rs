//! # cachegate probe
//!
//! Builds the cache client from `REDIS_*` environment variables, pings the
//! server and runs one write/read/delete round trip on a probe key. Exits
//! non-zero on the first failure.

use std::env;
use std::time::Instant;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cachegate::{CacheClient, Expiry};

const DEFAULT_PROBE_KEY: &str = "cachegate:probe";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    tracing::info!(version = cachegate::VERSION, "Starting cachegate probe");

    let cache = CacheClient::from_env().context("failed to initialize cache client")?;

    let started = Instant::now();
    cache.ping().await.context("PING failed")?;
    tracing::info!(
        latency_ms = started.elapsed().as_secs_f64() * 1000.0,
        pool = ?cache.handle().status(),
        "Redis reachable"
    );

    let key = env::var("PROBE_KEY").unwrap_or_else(|_| DEFAULT_PROBE_KEY.to_string());
    round_trip(&cache, &key).await?;

    tracing::info!(%key, "Probe succeeded");
    Ok(())
}

/// Write, read back and delete `key`, as a scalar and then as a list.
async fn round_trip(cache: &CacheClient, key: &str) -> anyhow::Result<()> {
    let stamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis().to_string())
        .unwrap_or_default();

    cache.set_value(key, stamp.as_str(), Expiry::secs(30)).await?;
    let read = cache.get_string(key).await?;
    anyhow::ensure!(read == stamp, "read back {read:?}, wrote {stamp:?}");

    let ttl = cache.ttl(key).await?;
    tracing::debug!(%key, ?ttl, "Scalar round trip ok");

    cache
        .replace_list(key, &["probe", stamp.as_str()], Expiry::secs(30))
        .await?;
    let list = cache.get_list(key).await?;
    tracing::debug!(%key, ?list, "List round trip ok");
    anyhow::ensure!(list.len() == 2, "expected 2 list elements, got {}", list.len());

    cache.delete(key).await?;
    Ok(())
}
