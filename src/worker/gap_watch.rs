use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::{journal_event, now_ms, Scanner};
use crate::clock::MarketClock;
use crate::config::{Config, SCAN_ROW_LIMIT};
use crate::error::Result;
use crate::notify::Notifier;
use crate::screener::{DataSource, ScanQuery};
use crate::state::StatusBoard;
use crate::types::{AlertEvent, CycleReport, Phase, TriggerKind};
use crate::watchlist::{WatchMode, WatchTrigger, WatchlistConfig, WatchlistEngine};

/// Gap play scanner spanning the open. Premarket cycles collect heavy gappers
/// into a watchlist; once the market phase begins the same worker flips to
/// monitoring that list for fades and bounces. The flip changes cadence and
/// query, never the collected state.
pub struct GapWatchScanner {
    source: Arc<dyn DataSource>,
    notifier: Arc<dyn Notifier>,
    journal: mpsc::Sender<AlertEvent>,
    board: Arc<StatusBoard>,
    clock: MarketClock,
    engine: WatchlistEngine,
    setup_period: Duration,
    active_period: Duration,
}

impl GapWatchScanner {
    pub const NAME: &'static str = "gap_watch";

    pub fn new(
        cfg: &Config,
        source: Arc<dyn DataSource>,
        notifier: Arc<dyn Notifier>,
        journal: mpsc::Sender<AlertEvent>,
        board: Arc<StatusBoard>,
        clock: MarketClock,
    ) -> Self {
        let engine = WatchlistEngine::new(WatchlistConfig {
            min_gap_pct: cfg.watch_min_gap_pct,
            min_premarket_volume: cfg.watch_min_pm_volume,
            fade_trigger_pct: cfg.fade_trigger_pct,
            bounce_trigger_pct: cfg.bounce_trigger_pct,
        });
        Self {
            source,
            notifier,
            journal,
            board,
            clock,
            engine,
            setup_period: Duration::from_secs(cfg.watch_setup_scan_secs),
            active_period: Duration::from_secs(cfg.watch_active_scan_secs),
        }
    }

    fn mode_for(phase: Phase) -> WatchMode {
        match phase {
            Phase::Market => WatchMode::Active,
            _ => WatchMode::Setup,
        }
    }

    async fn run_setup(&mut self) -> Result<CycleReport> {
        let rows = self
            .source
            .fetch(&ScanQuery::gap_candidates(SCAN_ROW_LIMIT))
            .await?;
        let added = self.engine.build(&rows);
        if added > 0 {
            info!(added, watched = self.engine.len(), "gap watchlist grew");
        }
        self.board
            .set_watch(self.engine.mode().as_str(), self.engine.tickers());
        Ok(CycleReport {
            rows: rows.len(),
            alerts: 0,
        })
    }

    async fn run_active(&mut self) -> Result<CycleReport> {
        let tickers = self.engine.tickers();
        if tickers.is_empty() {
            self.board.set_watch(self.engine.mode().as_str(), tickers);
            return Ok(CycleReport::default());
        }

        let rows = self.source.fetch(&ScanQuery::watch(tickers)).await?;
        let planned = self.engine.monitor(&rows);

        let mut alerts = 0u64;
        for trigger in &planned {
            let message = render_watch(trigger);
            let outcome = self.notifier.send_formatted(&message).await;
            // Journal the plan either way; the triggered set is delivery-gated.
            journal_event(
                &self.journal,
                AlertEvent {
                    worker: Self::NAME,
                    symbol: trigger.symbol.clone(),
                    trigger: trigger.kind,
                    value: trigger.change_pct,
                    price: trigger.price,
                    message,
                    delivered: outcome.success,
                    sent_at_ms: now_ms(),
                },
            );
            if !outcome.success {
                warn!(
                    symbol = %trigger.symbol,
                    error = outcome.error.as_deref().unwrap_or("unknown"),
                    "gap alert delivery failed, replanning next cycle"
                );
                continue;
            }

            self.engine.commit(&trigger.symbol);
            alerts += 1;
            info!(
                symbol = %trigger.symbol,
                kind = %trigger.kind,
                gap = trigger.gap_pct,
                change = trigger.change_pct,
                "gap play alert sent"
            );
        }

        self.board
            .set_watch(self.engine.mode().as_str(), self.engine.tickers());
        Ok(CycleReport {
            rows: rows.len(),
            alerts,
        })
    }
}

#[async_trait]
impl Scanner for GapWatchScanner {
    fn reset(&mut self) {
        self.engine.clear();
        self.board.clear_watch();
    }

    async fn scan(&mut self) -> Result<CycleReport> {
        // The clock, not a restart, flips us from collecting to monitoring.
        self.engine.set_mode(Self::mode_for(self.clock.current_phase()));
        match self.engine.mode() {
            WatchMode::Setup => self.run_setup().await,
            WatchMode::Active => self.run_active().await,
        }
    }

    fn period(&self) -> Duration {
        match self.engine.mode() {
            WatchMode::Setup => self.setup_period,
            WatchMode::Active => self.active_period,
        }
    }

    fn shutdown(&mut self) {
        self.engine.clear();
        self.board.clear_watch();
    }
}

fn render_watch(trigger: &WatchTrigger) -> String {
    let price = trigger
        .price
        .map(|p| format!(" | ${p:.2}"))
        .unwrap_or_default();
    match trigger.kind {
        TriggerKind::GapBounce => format!(
            "💪 <b>{}</b> bouncing: gapped {:+.1}%, now {:+.1}% off the open{}",
            trigger.symbol, trigger.gap_pct, trigger.change_pct, price,
        ),
        _ => format!(
            "🔻 <b>{}</b> fading: gapped {:+.1}%, now {:+.1}% off the open{}",
            trigger.symbol, trigger.gap_pct, trigger.change_pct, price,
        ),
    }
}
