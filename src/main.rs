mod alert;
mod clock;
mod config;
mod db;
mod error;
mod notify;
mod orchestrator;
mod scorer;
mod screener;
mod state;
mod types;
mod watchlist;
mod worker;
mod api;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::api::health::HealthState;
use crate::api::latency::LatencyStats;
use crate::api::routes::{router, ApiState};
use crate::clock::MarketClock;
use crate::config::{Config, CHANNEL_CAPACITY};
use crate::db::writer::AlertJournal;
use crate::error::Result;
use crate::notify::{Notifier, TelegramNotifier};
use crate::orchestrator::Orchestrator;
use crate::screener::{DataSource, ScreenerClient};
use crate::state::StatusBoard;
use crate::types::Phase;
use crate::worker::{
    GapWatchScanner, MomentumScanner, PremarketStepScanner, ScanWorker, WorkerHandle,
};

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Database setup ---
    let pool = sqlx::SqlitePool::connect(&format!("sqlite:{}?mode=rwc", cfg.db_path)).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database ready at {}", cfg.db_path);

    // --- Market clock ---
    let clock = MarketClock::from_config(&cfg)?;
    info!(
        phase = %clock.current_phase(),
        utc_offset_hours = cfg.market_utc_offset_hours,
        "Market clock ready"
    );

    // --- Screener source and Telegram sink ---
    let screener = Arc::new(ScreenerClient::new(&cfg)?);
    let notifier: Arc<dyn Notifier> = Arc::new(TelegramNotifier::new(&cfg)?);

    // --- Shared state ---
    let health = Arc::new(HealthState::new());
    let latency = Arc::new(LatencyStats::new());
    let board = StatusBoard::new();

    // --- Alert journal (background DB writer) ---
    let (journal_tx, journal_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let journal = AlertJournal::new(pool.clone(), journal_rx, Arc::clone(&health));
    tokio::spawn(async move { journal.run().await });

    // --- Workers ---
    let premarket = WorkerHandle::new(
        PremarketStepScanner::NAME,
        &[Phase::Premarket],
        PremarketStepScanner::new(
            &cfg,
            Arc::clone(&screener) as Arc<dyn DataSource>,
            Arc::clone(&notifier),
            journal_tx.clone(),
            Arc::clone(&board),
        ),
        Arc::clone(&latency),
    );
    let momentum = WorkerHandle::new(
        MomentumScanner::NAME,
        &[Phase::Market],
        MomentumScanner::new(
            &cfg,
            Arc::clone(&screener) as Arc<dyn DataSource>,
            Arc::clone(&notifier),
            journal_tx.clone(),
            Arc::clone(&board),
        ),
        Arc::clone(&latency),
    );
    let gap_watch = WorkerHandle::new(
        GapWatchScanner::NAME,
        &[Phase::Premarket, Phase::Market],
        GapWatchScanner::new(
            &cfg,
            Arc::clone(&screener) as Arc<dyn DataSource>,
            Arc::clone(&notifier),
            journal_tx.clone(),
            Arc::clone(&board),
            clock.clone(),
        ),
        Arc::clone(&latency),
    );

    let workers: Vec<Arc<dyn ScanWorker>> = vec![premarket, momentum, gap_watch];

    // --- Orchestrator ---
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let orchestrator = Orchestrator::new(
        clock,
        workers.clone(),
        Arc::clone(&notifier),
        Arc::clone(&health),
        Duration::from_secs(cfg.orch_poll_secs),
    );
    let orchestrator_task = tokio::spawn(orchestrator.run(shutdown_rx));

    // --- HTTP API server ---
    let api_state = ApiState {
        pool: pool.clone(),
        board,
        workers,
        health,
        latency,
        alert_tx: journal_tx,
    };
    let app = router(api_state);
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Server is down; stop the workers before exiting.
    let _ = shutdown_tx.send(true);
    if let Err(e) = orchestrator_task.await {
        error!("Orchestrator task failed: {e}");
    }
    info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {e}");
    }
    info!("Shutdown signal received");
}
