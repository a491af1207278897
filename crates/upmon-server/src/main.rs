use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use upmon_engine::stats::DurationStatsEngine;
use upmon_storage::unit_store::SqliteUnitRepository;
use upmon_storage::UnitRepository;

use upmon_server::alert::{AlertEmitter, AlertSink, LogSink, WebhookSink};
use upmon_server::app;
use upmon_server::config::ServerConfig;
use upmon_server::dispatch::EventDispatcher;
use upmon_server::state::AppState;
use upmon_server::sweep::prober::HttpProber;
use upmon_server::sweep::scheduler::SweepScheduler;

#[tokio::main]
async fn main() -> Result<()> {
    upmon_common::id::init(1, 1);

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("upmon=info".parse()?))
        .init();

    let args: Vec<String> = std::env::args().collect();
    let config_path = args
        .get(1)
        .map(|s| s.as_str())
        .unwrap_or("config/server.toml");
    let config = if Path::new(config_path).exists() {
        ServerConfig::load(config_path)?
    } else {
        tracing::warn!(path = config_path, "Config file not found, using defaults");
        ServerConfig::default()
    };

    let repo: Arc<dyn UnitRepository> =
        Arc::new(SqliteUnitRepository::new(Path::new(&config.data_dir))?);
    let stats = Arc::new(DurationStatsEngine::new());

    let mut sinks: Vec<Box<dyn AlertSink>> = vec![Box::new(LogSink)];
    if let Some(url) = &config.alerts.webhook_url {
        sinks.push(Box::new(WebhookSink::new(
            url.clone(),
            config.alerts.webhook_timeout_secs,
        )?));
        tracing::info!(url = %url, "Webhook alert sink configured");
    }
    let emitter = Arc::new(AlertEmitter::new(sinks, stats.clone()));

    let dispatcher = Arc::new(EventDispatcher::new(
        repo.clone(),
        stats.clone(),
        emitter,
        config.sweep.save_attempts,
    ));

    let sweep_handle = if config.sweep.enabled {
        let scheduler = SweepScheduler::new(
            repo.clone(),
            dispatcher.clone(),
            Arc::new(HttpProber::new()?),
            config.sweep.tick_secs,
            config.sweep.max_concurrent_probes,
        );
        Some(tokio::spawn(async move {
            scheduler.run().await;
        }))
    } else {
        tracing::info!("Sweep scheduler disabled");
        None
    };

    let state = AppState {
        repo,
        stats,
        dispatcher,
        start_time: Utc::now(),
    };

    let http_addr: SocketAddr = format!("0.0.0.0:{}", config.http_port).parse()?;
    let listener = tokio::net::TcpListener::bind(http_addr).await?;
    tracing::info!(http = %http_addr, "Server started");

    let server = axum::serve(listener, app::build_http_app(state))
        .with_graceful_shutdown(async {
            signal::ctrl_c().await.ok();
        });
    if let Err(e) = server.await {
        tracing::error!(error = %e, "HTTP server error");
    }

    if let Some(h) = sweep_handle {
        h.abort();
    }
    tracing::info!("Server stopped");

    Ok(())
}
