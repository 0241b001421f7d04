//! FlashMetrics — entry point.
//!
//! CLI parse → config load → tracing init → DB pool → schema bootstrap →
//! store components → scrape scheduler → HTTP server, with graceful
//! shutdown draining both the scrape scheduler and the listener.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use flashmetrics::config::{Cli, Config};
use flashmetrics::http::{self, AppState};
use flashmetrics::ingest::IngestPipeline;
use flashmetrics::meta::MetaDirectory;
use flashmetrics::scrape::Scheduler;
use flashmetrics::tsid_cache::TsidCache;
use flashmetrics::{db, schema};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match Config::load(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("flashmetrics={},tower_http=info", config.logs.log_level).into()),
        )
        .json()
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "starting flashmetrics");

    let pool = match db::create_pool(&config.tidb.address).await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!(error = %e, "failed to open TiDB connection pool");
            std::process::exit(1);
        }
    };

    schema::bootstrap(&pool).await?;

    let meta_dir = Arc::new(MetaDirectory::new(pool.clone()));
    let tsid_cache = Arc::new(TsidCache::new());
    let pipeline = Arc::new(IngestPipeline::spawn(pool.clone(), meta_dir.clone(), tsid_cache));

    let mut scheduler = Scheduler::new();
    scheduler.spawn(config.scrape_configs.clone(), pipeline.clone());

    let state = AppState {
        pool: pool.clone(),
        meta_dir,
        pipeline,
    };
    let app = http::router(state);

    let listener = tokio::net::TcpListener::bind(&config.web.address).await?;
    info!(address = %config.web.address, "listening");

    let shutdown_signal = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C signal handler");
        info!("received shutdown signal, draining in-flight work");
    };

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal).await?;

    scheduler.shutdown().await;
    pipeline.shutdown().await;

    if config.cleanup {
        info!("cleanup requested, dropping all tables");
        schema::teardown(&pool).await?;
    }

    info!("shutdown complete");
    Ok(())
}
