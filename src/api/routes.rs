use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::api::health::HealthState;
use crate::api::latency::LatencyStats;
use crate::db::models::{AlertRow, TriggerAlertCount, WorkerAlertCount};
use crate::error::AppError;
use crate::state::{StatusBoard, WatchSnapshot};
use crate::types::{AlertEvent, ScoredCandidate};
use crate::worker::ScanWorker;

#[derive(Clone)]
pub struct ApiState {
    pub pool: sqlx::SqlitePool,
    pub board: Arc<StatusBoard>,
    pub workers: Vec<Arc<dyn ScanWorker>>,
    pub health: Arc<HealthState>,
    pub latency: Arc<LatencyStats>,
    /// Kept for the /health queue gauge; never used to send from here.
    pub alert_tx: mpsc::Sender<AlertEvent>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/workers", get(get_workers))
        .route("/movers", get(get_movers))
        .route("/watchlist", get(get_watchlist))
        .route("/alerts/recent", get(get_recent_alerts))
        .route("/alerts/:symbol", get(get_symbol_alerts))
        .route("/stats/summary", get(get_stats_summary))
        .route("/stats/latency", get(get_stats_latency))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Query param structs
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct RecentAlertsQuery {
    pub worker: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Deserialize)]
pub struct SymbolAlertsQuery {
    pub limit: Option<i64>,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub orchestrator_running: bool,
    pub phase: &'static str,
    pub uptime_secs: u64,
    pub alerts_written: u64,
    pub last_alert_at_ms: Option<u64>,
    pub journal_queue_pending: usize,
}

#[derive(Serialize)]
pub struct WorkerResponse {
    pub name: &'static str,
    pub is_running: bool,
    pub is_starting: bool,
    pub cycles: u64,
    pub failed_cycles: u64,
    pub alerts_sent: u64,
    pub last_rows: u64,
    pub last_cycle_at_ms: Option<i64>,
}

#[derive(Serialize)]
pub struct WorkersResponse {
    pub workers: Vec<WorkerResponse>,
    pub board: BoardSummary,
}

/// Condensed status-board view served next to the lifecycle counters.
#[derive(Serialize)]
pub struct BoardSummary {
    pub tracked_steps: usize,
    pub top_gainers: Vec<String>,
    pub top_losers: Vec<String>,
    pub watch_mode: Option<String>,
    pub watchlist_size: usize,
}

#[derive(Serialize)]
pub struct MoverResponse {
    pub symbol: String,
    pub score: f64,
    pub price: Option<f64>,
    pub change_pct: Option<f64>,
    pub rvol_5m: Option<f64>,
    pub volume: Option<f64>,
}

#[derive(Serialize)]
pub struct MoversResponse {
    pub gainers: Vec<MoverResponse>,
    pub losers: Vec<MoverResponse>,
}

#[derive(Serialize)]
pub struct SummaryResponse {
    pub phase: &'static str,
    pub alerts_today: i64,
    pub delivered_today: i64,
    pub by_trigger: Vec<TriggerAlertCount>,
    pub by_worker: Vec<WorkerAlertCount>,
    pub top_gainers: Vec<MoverResponse>,
    pub watchlist_size: usize,
    pub tracked_steps: usize,
}

#[derive(Serialize)]
pub struct LatencyResponse {
    pub samples: u64,
    pub p50_ms: Option<u64>,
    pub p95_ms: Option<u64>,
    pub p99_ms: Option<u64>,
}

fn mover(c: ScoredCandidate) -> MoverResponse {
    MoverResponse {
        symbol: c.symbol,
        score: c.score,
        price: c.row.price,
        change_pct: c.row.change_pct,
        rvol_5m: c.row.rvol_5m,
        volume: c.row.volume,
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_health(State(state): State<ApiState>) -> Json<HealthResponse> {
    let last = state.health.last_alert_at_ms();
    let queued = state
        .alert_tx
        .max_capacity()
        .saturating_sub(state.alert_tx.capacity());
    Json(HealthResponse {
        status: "ok",
        orchestrator_running: state.health.orchestrator_running(),
        phase: state.health.phase().as_str(),
        uptime_secs: state.health.uptime_secs(),
        alerts_written: state.health.alerts_written(),
        last_alert_at_ms: (last != 0).then_some(last),
        journal_queue_pending: queued,
    })
}

async fn get_workers(State(state): State<ApiState>) -> Json<WorkersResponse> {
    let workers = state
        .workers
        .iter()
        .map(|w| {
            let s = w.state();
            WorkerResponse {
                name: w.name(),
                is_running: s.is_running,
                is_starting: s.is_starting,
                cycles: s.cycles,
                failed_cycles: s.failed_cycles,
                alerts_sent: s.alerts_sent,
                last_rows: s.last_rows,
                last_cycle_at_ms: s.last_cycle_at_ms,
            }
        })
        .collect();

    let watch = state.board.watch_snapshot();
    let board = BoardSummary {
        tracked_steps: state.board.step_count(),
        top_gainers: state
            .board
            .top_gainers()
            .into_iter()
            .map(|c| c.symbol)
            .collect(),
        top_losers: state
            .board
            .top_losers()
            .into_iter()
            .map(|c| c.symbol)
            .collect(),
        watchlist_size: watch.tickers.len(),
        watch_mode: watch.mode,
    };

    Json(WorkersResponse { workers, board })
}

async fn get_movers(State(state): State<ApiState>) -> Json<MoversResponse> {
    Json(MoversResponse {
        gainers: state.board.top_gainers().into_iter().map(mover).collect(),
        losers: state.board.top_losers().into_iter().map(mover).collect(),
    })
}

async fn get_watchlist(State(state): State<ApiState>) -> Json<WatchSnapshot> {
    Json(state.board.watch_snapshot())
}

async fn get_recent_alerts(
    State(state): State<ApiState>,
    Query(params): Query<RecentAlertsQuery>,
) -> Result<Json<Vec<AlertRow>>, AppError> {
    let limit = params.limit.unwrap_or(50);

    let alerts: Vec<AlertRow> = if let Some(worker) = &params.worker {
        sqlx::query_as(
            r#"
            SELECT id, worker, symbol, trigger_kind, value, price,
                   message, delivered, sent_at_ms
            FROM alerts
            WHERE worker = ?
            ORDER BY sent_at_ms DESC
            LIMIT ?
            "#,
        )
        .bind(worker)
        .bind(limit)
        .fetch_all(&state.pool)
        .await?
    } else {
        sqlx::query_as(
            r#"
            SELECT id, worker, symbol, trigger_kind, value, price,
                   message, delivered, sent_at_ms
            FROM alerts
            ORDER BY sent_at_ms DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&state.pool)
        .await?
    };

    Ok(Json(alerts))
}

async fn get_symbol_alerts(
    State(state): State<ApiState>,
    Path(symbol): Path<String>,
    Query(params): Query<SymbolAlertsQuery>,
) -> Result<Json<Vec<AlertRow>>, AppError> {
    let limit = params.limit.unwrap_or(100);
    let symbol = symbol.to_uppercase();

    let alerts: Vec<AlertRow> = sqlx::query_as(
        r#"
        SELECT id, worker, symbol, trigger_kind, value, price,
               message, delivered, sent_at_ms
        FROM alerts
        WHERE symbol = ?
        ORDER BY sent_at_ms DESC
        LIMIT ?
        "#,
    )
    .bind(&symbol)
    .bind(limit)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(alerts))
}

async fn get_stats_summary(
    State(state): State<ApiState>,
) -> Result<Json<SummaryResponse>, AppError> {
    // Today as a rolling 24h window, in epoch milliseconds.
    let now_ms = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64;
    let today_start = now_ms - 24 * 3_600 * 1_000;

    let alerts_today: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM alerts WHERE sent_at_ms > ?")
            .bind(today_start)
            .fetch_one(&state.pool)
            .await?;

    let delivered_today: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM alerts WHERE sent_at_ms > ? AND delivered = 1",
    )
    .bind(today_start)
    .fetch_one(&state.pool)
    .await?;

    let by_trigger: Vec<TriggerAlertCount> = sqlx::query_as(
        r#"
        SELECT trigger_kind, COUNT(*) AS total
        FROM alerts
        WHERE sent_at_ms > ?
        GROUP BY trigger_kind
        ORDER BY total DESC
        "#,
    )
    .bind(today_start)
    .fetch_all(&state.pool)
    .await?;

    let by_worker: Vec<WorkerAlertCount> = sqlx::query_as(
        r#"
        SELECT worker, COUNT(*) AS total
        FROM alerts
        WHERE sent_at_ms > ?
        GROUP BY worker
        ORDER BY total DESC
        "#,
    )
    .bind(today_start)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(SummaryResponse {
        phase: state.health.phase().as_str(),
        alerts_today,
        delivered_today,
        by_trigger,
        by_worker,
        top_gainers: state.board.top_gainers().into_iter().map(mover).collect(),
        watchlist_size: state.board.watch_snapshot().tickers.len(),
        tracked_steps: state.board.step_count(),
    }))
}

async fn get_stats_latency(State(state): State<ApiState>) -> Json<LatencyResponse> {
    let (p50, p95, p99) = state.latency.percentiles();
    Json(LatencyResponse {
        samples: state.latency.len(),
        p50_ms: p50,
        p95_ms: p95,
        p99_ms: p99,
    })
}
