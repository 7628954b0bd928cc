//! Composition-root binary: builds a [`SuggestionEngine`] and spawns its
//! background tasks (flush, rebuild, history pruning, status logging).
//!
//! This binary does not serve HTTP or any other wire protocol; it exists so
//! the engine has a process to live in and background tasks to run inside.
//! Tracing setup mirrors `vestige-mcp::main` (see DESIGN.md): `EnvFilter`
//! from the environment, no ANSI, no target, writing to stderr.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use suggest_core::prelude::*;
use suggest_core::storage::memory_session::InMemorySessionStore;
use suggest_core::storage::sqlite::SqliteLogStore;
use suggest_core::store::{FilterSource, LogStore, SessionStore};
use tracing_subscriber::EnvFilter;

/// Composition root for the autocomplete suggestion engine.
#[derive(Parser, Debug)]
#[command(name = "suggest-daemon")]
struct Args {
    /// Directory holding the SQLite log store. Defaults to the platform
    /// data directory.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Use a transient in-memory log store instead of SQLite. Durability
    /// and the filter blocklist are lost on exit; for local development
    /// only.
    #[arg(long)]
    in_memory: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = Args::parse();
    let config = EngineConfig::from_env();

    let log_store: Arc<SqliteLogStore> = if args.in_memory {
        Arc::new(SqliteLogStore::open_in_memory()?)
    } else if let Some(dir) = &args.data_dir {
        std::fs::create_dir_all(dir)?;
        Arc::new(SqliteLogStore::open(dir.join("suggest.db"))?)
    } else {
        Arc::new(SqliteLogStore::open_default()?)
    };

    let session_store: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new(config.history_max_entries));

    let engine = Arc::new(SuggestionEngine::new(
        config.clone(),
        log_store.clone() as Arc<dyn LogStore>,
        log_store as Arc<dyn FilterSource>,
        session_store,
    )?);

    tracing::info!(k = config.k, rebuild_threshold = config.rebuild_threshold, "suggestion engine ready");

    spawn_flush_task(engine.clone(), config.flush_interval);
    spawn_rebuild_task(engine.clone(), Duration::from_secs(60));
    spawn_history_prune_task(engine.clone(), config.history_max_age);
    spawn_status_task(engine.clone(), Duration::from_secs(30));

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested, flushing pending writes");
    engine.flush();
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false)
        .init();
}

fn spawn_flush_task(engine: Arc<SuggestionEngine>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            engine.flush();
        }
    });
}

fn spawn_rebuild_task(engine: Arc<SuggestionEngine>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match engine.needs_rebuild() {
                Ok(true) => {
                    tracing::info!("durable/index drift crossed threshold, rebuilding");
                    if let Err(err) = engine.rebuild() {
                        tracing::error!(error = %err, "rebuild failed");
                    }
                }
                Ok(false) => {}
                Err(err) => tracing::error!(error = %err, "failed to check rebuild threshold"),
            }
        }
    });
}

fn spawn_history_prune_task(engine: Arc<SuggestionEngine>, max_age: chrono::Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(3600));
        loop {
            ticker.tick().await;
            let cutoff = chrono::Utc::now() - max_age;
            match engine.prune_history(cutoff) {
                Ok(removed) if removed > 0 => tracing::info!(removed, "pruned stale session history"),
                Ok(_) => {}
                Err(err) => tracing::error!(error = %err, "failed to prune session history"),
            }
        }
    });
}

fn spawn_status_task(engine: Arc<SuggestionEngine>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let status = engine.status();
            tracing::info!(
                indexed_phrases = status.indexed_phrases,
                trending_tracked = status.trending_tracked,
                cached_entries = status.cached_entries,
                blocked_phrases = status.blocked_phrases,
                pending_batch = status.aggregator.pending_batch_size,
                degraded = status.aggregator.degraded,
                flush_lag_ms = ?status.aggregator.flush_lag_ms,
                "engine status"
            );
        }
    });
}
