use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::{fmt_volume, journal_event, now_ms, Scanner};
use crate::alert::{StepAlert, StepAlertEngine, StepGates, StepMetric};
use crate::config::{Config, SCAN_ROW_LIMIT};
use crate::error::Result;
use crate::notify::Notifier;
use crate::screener::{DataSource, ScanQuery};
use crate::state::StatusBoard;
use crate::types::{AlertEvent, CycleReport, TriggerKind};

/// Premarket gainer scanner. Tracks premarket change per symbol through a
/// step engine, so a runner alerts on first sighting and then once per step
/// of further growth.
pub struct PremarketStepScanner {
    source: Arc<dyn DataSource>,
    notifier: Arc<dyn Notifier>,
    journal: mpsc::Sender<AlertEvent>,
    board: Arc<StatusBoard>,
    engine: StepAlertEngine,
    period: Duration,
}

impl PremarketStepScanner {
    pub const NAME: &'static str = "premarket_steps";

    pub fn new(
        cfg: &Config,
        source: Arc<dyn DataSource>,
        notifier: Arc<dyn Notifier>,
        journal: mpsc::Sender<AlertEvent>,
        board: Arc<StatusBoard>,
    ) -> Self {
        let gates = StepGates {
            min_volume: cfg.step_min_volume,
            min_price: cfg.step_min_price,
            max_float: cfg.step_max_float,
        };
        Self {
            source,
            notifier,
            journal,
            board,
            engine: StepAlertEngine::new(
                StepMetric::PremarketChange,
                gates,
                cfg.step_size_pct,
                cfg.send_on_startup,
            ),
            period: Duration::from_secs(cfg.premarket_scan_secs),
        }
    }
}

#[async_trait]
impl Scanner for PremarketStepScanner {
    fn reset(&mut self) {
        self.engine.reset();
        self.board.clear_steps();
    }

    async fn scan(&mut self) -> Result<CycleReport> {
        let rows = self
            .source
            .fetch(&ScanQuery::premarket_gainers(SCAN_ROW_LIMIT))
            .await?;
        let planned = self.engine.evaluate(&rows);

        let mut alerts = 0u64;
        for alert in &planned {
            let message = render_step(alert);
            let outcome = self.notifier.send_formatted(&message).await;
            // Planned alerts are journaled whether or not delivery worked;
            // only delivery advances the dedup state.
            journal_event(
                &self.journal,
                AlertEvent {
                    worker: Self::NAME,
                    symbol: alert.symbol.clone(),
                    trigger: alert.trigger,
                    value: alert.value,
                    price: alert.price,
                    message,
                    delivered: outcome.success,
                    sent_at_ms: now_ms(),
                },
            );
            if !outcome.success {
                warn!(
                    symbol = %alert.symbol,
                    error = outcome.error.as_deref().unwrap_or("unknown"),
                    "step alert delivery failed, replanning next cycle"
                );
                continue;
            }

            let repeat = self.engine.commit(alert);
            self.board.record_step(&alert.symbol, alert.value, repeat);
            alerts += 1;
            info!(
                symbol = %alert.symbol,
                value = alert.value,
                repeat,
                "premarket step alert sent"
            );
        }

        Ok(CycleReport {
            rows: rows.len(),
            alerts,
        })
    }

    fn period(&self) -> Duration {
        self.period
    }
}

fn render_step(alert: &StepAlert) -> String {
    let price = alert
        .price
        .map(|p| format!(" | ${p:.2}"))
        .unwrap_or_default();
    let volume = alert
        .volume
        .map(|v| format!(" | vol {}", fmt_volume(v)))
        .unwrap_or_default();

    match alert.trigger {
        TriggerKind::StepGrowth => format!(
            "📈 <b>{}</b> premarket +{:.1}% (alert #{}, last {:+.1}%){}{}",
            alert.symbol,
            alert.value,
            alert.repeat,
            alert.prev_value.unwrap_or(0.0),
            price,
            volume,
        ),
        _ => format!(
            "🚀 <b>{}</b> premarket +{:.1}%{}{}",
            alert.symbol, alert.value, price, volume,
        ),
    }
}
