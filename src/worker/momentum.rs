use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::{journal_event, now_ms, Scanner};
use crate::alert::{CooldownConfig, CooldownDispatcher, TriggerAlert};
use crate::config::{Config, SCAN_ROW_LIMIT, STALE_SEEN_SECS};
use crate::error::Result;
use crate::notify::Notifier;
use crate::scorer::{rank, score_down, score_up};
use crate::screener::{DataSource, ScanQuery};
use crate::state::StatusBoard;
use crate::types::{AlertEvent, CycleReport, TriggerKind};

/// Regular-session momentum scanner. Ranks the tape on both sides each cycle;
/// the long list runs through the cooldown dispatcher for per-symbol alerts,
/// the short list only feeds the status board.
pub struct MomentumScanner {
    source: Arc<dyn DataSource>,
    notifier: Arc<dyn Notifier>,
    journal: mpsc::Sender<AlertEvent>,
    board: Arc<StatusBoard>,
    dispatcher: CooldownDispatcher,
    top_n: usize,
    period: Duration,
}

impl MomentumScanner {
    pub const NAME: &'static str = "momentum";

    pub fn new(
        cfg: &Config,
        source: Arc<dyn DataSource>,
        notifier: Arc<dyn Notifier>,
        journal: mpsc::Sender<AlertEvent>,
        board: Arc<StatusBoard>,
    ) -> Self {
        let dispatcher = CooldownDispatcher::new(CooldownConfig {
            window: Duration::from_secs(cfg.cooldown_secs),
            stale_after: Duration::from_secs(STALE_SEEN_SECS),
            rvol_delta: cfg.rvol_spike_delta,
            dump_threshold_pct: cfg.dump_threshold_pct,
        });
        Self {
            source,
            notifier,
            journal,
            board,
            dispatcher,
            top_n: cfg.momentum_top_n,
            period: Duration::from_secs(cfg.momentum_scan_secs),
        }
    }
}

#[async_trait]
impl Scanner for MomentumScanner {
    fn reset(&mut self) {
        self.dispatcher.reset();
        self.board.clear_movers();
    }

    async fn scan(&mut self) -> Result<CycleReport> {
        let rows = self
            .source
            .fetch(&ScanQuery::market_movers(SCAN_ROW_LIMIT))
            .await?;
        let gainers = rank(&rows, score_up, self.top_n);
        let losers = rank(&rows, score_down, self.top_n);

        let now = Instant::now();
        let planned = self.dispatcher.classify(&gainers, now);

        let mut alerts = 0u64;
        for alert in &planned {
            let message = render_trigger(alert);
            let outcome = self.notifier.send_formatted(&message).await;
            // Journal the plan either way; the cooldown stamp is delivery-gated.
            journal_event(
                &self.journal,
                AlertEvent {
                    worker: Self::NAME,
                    symbol: alert.symbol.clone(),
                    trigger: alert.trigger,
                    value: alert.score,
                    price: alert.price,
                    message,
                    delivered: outcome.success,
                    sent_at_ms: now_ms(),
                },
            );
            if !outcome.success {
                warn!(
                    symbol = %alert.symbol,
                    trigger = %alert.trigger,
                    error = outcome.error.as_deref().unwrap_or("unknown"),
                    "momentum alert delivery failed"
                );
                continue;
            }

            self.dispatcher.commit(&alert.symbol, alert.trigger, now);
            alerts += 1;
            info!(
                symbol = %alert.symbol,
                trigger = %alert.trigger,
                score = alert.score,
                "momentum alert sent"
            );
        }

        self.dispatcher.roll(&gainers, now);
        self.board.set_movers(gainers, losers);

        Ok(CycleReport {
            rows: rows.len(),
            alerts,
        })
    }

    fn period(&self) -> Duration {
        self.period
    }
}

fn render_trigger(alert: &TriggerAlert) -> String {
    let price = alert
        .price
        .map(|p| format!(" | ${p:.2}"))
        .unwrap_or_default();
    let change = alert
        .change_pct
        .map(|c| format!(" | {c:+.1}% today"))
        .unwrap_or_default();

    match alert.trigger {
        TriggerKind::NewEntrant => {
            let rvol = alert
                .rvol
                .map(|r| format!(" | rvol {r:.1}x"))
                .unwrap_or_default();
            format!(
                "🆕 <b>{}</b> entered the movers list (score {:.0}){}{}{}",
                alert.symbol, alert.score, change, rvol, price,
            )
        }
        TriggerKind::MetricSpike => format!(
            "⚡ <b>{}</b> volume spike: rvol {:.1}x → {:.1}x{}{}",
            alert.symbol,
            alert.prev_rvol.unwrap_or(0.0),
            alert.rvol.unwrap_or(0.0),
            change,
            price,
        ),
        _ => format!(
            "📉 <b>{}</b> dumping {:+.1}% since last scan{}{}",
            alert.symbol,
            alert.move_pct.unwrap_or(0.0),
            change,
            price,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SnapshotRow;
    use crate::worker::testutil::{RecordingNotifier, ScriptedSource};

    fn mover(symbol: &str, change: f64, rvol: f64, volume: f64) -> SnapshotRow {
        SnapshotRow {
            symbol: symbol.to_string(),
            ticker: format!("NASDAQ:{symbol}"),
            price: Some(8.0),
            change_pct: Some(change),
            volume: Some(volume),
            rvol_5m: Some(rvol),
            ..Default::default()
        }
    }

    fn make_scanner(
        source: Arc<ScriptedSource>,
        notifier: Arc<RecordingNotifier>,
    ) -> (MomentumScanner, mpsc::Receiver<AlertEvent>) {
        let (tx, rx) = mpsc::channel(16);
        let cfg = Config::for_tests();
        (
            MomentumScanner::new(&cfg, source, notifier, tx, StatusBoard::new()),
            rx,
        )
    }

    #[tokio::test]
    async fn new_entrant_alerts_once_then_goes_quiet() {
        let source = Arc::new(ScriptedSource::new(vec![
            mover("FRSH", 4.0, 6.0, 20_000_000.0),
            mover("DUMP", -3.0, 1.0, 60_000_000.0),
        ]));
        let notifier = Arc::new(RecordingNotifier::default());
        let (mut scanner, mut journal) = make_scanner(Arc::clone(&source), Arc::clone(&notifier));
        scanner.reset();

        let report = scanner.scan().await.unwrap();
        assert_eq!(report.alerts, 1);
        assert!(notifier.sent.lock().unwrap()[0].contains("FRSH"));
        let event = journal.try_recv().unwrap();
        assert_eq!(event.trigger, TriggerKind::NewEntrant);

        // Known symbol, no rvol delta, no dump: nothing new to say.
        assert_eq!(scanner.scan().await.unwrap().alerts, 0);
    }

    #[tokio::test]
    async fn short_side_feeds_the_board_but_never_messages() {
        let source = Arc::new(ScriptedSource::new(vec![mover(
            "DUMP",
            -3.0,
            1.0,
            60_000_000.0,
        )]));
        let notifier = Arc::new(RecordingNotifier::default());
        let (mut scanner, _journal) = make_scanner(Arc::clone(&source), Arc::clone(&notifier));
        scanner.reset();

        let report = scanner.scan().await.unwrap();
        assert_eq!(report.alerts, 0);
        assert_eq!(notifier.sent_count(), 0);

        let losers = scanner.board.top_losers();
        assert_eq!(losers.len(), 1);
        assert_eq!(losers[0].symbol, "DUMP");
        assert!(scanner.board.top_gainers().is_empty());
    }

    #[tokio::test]
    async fn rvol_spike_on_a_known_symbol() {
        let source = Arc::new(ScriptedSource::new(vec![mover(
            "SPKE",
            4.0,
            6.0,
            20_000_000.0,
        )]));
        let notifier = Arc::new(RecordingNotifier::default());
        let (mut scanner, _journal) = make_scanner(Arc::clone(&source), Arc::clone(&notifier));
        scanner.reset();

        assert_eq!(scanner.scan().await.unwrap().alerts, 1);

        source.set_rows(vec![mover("SPKE", 4.5, 12.0, 22_000_000.0)]);
        assert_eq!(scanner.scan().await.unwrap().alerts, 1);
        let sent = notifier.sent.lock().unwrap();
        assert!(sent[1].contains("volume spike"));
        assert!(sent[1].contains("6.0x → 12.0x"));
    }

    #[tokio::test]
    async fn failed_entrant_delivery_drops_with_the_snapshot_roll() {
        let source = Arc::new(ScriptedSource::new(vec![mover(
            "LOST",
            4.0,
            6.0,
            20_000_000.0,
        )]));
        let notifier = Arc::new(RecordingNotifier::default());
        notifier.fail.store(true, std::sync::atomic::Ordering::SeqCst);
        let (mut scanner, mut journal) = make_scanner(Arc::clone(&source), Arc::clone(&notifier));
        scanner.reset();

        assert_eq!(scanner.scan().await.unwrap().alerts, 0);
        let failed = journal.try_recv().unwrap();
        assert!(!failed.delivered);
        assert_eq!(failed.trigger, TriggerKind::NewEntrant);

        // The symbol is in the previous snapshot now, so the retry depends on
        // staleness; within the stale window the entrant alert is gone.
        notifier.fail.store(false, std::sync::atomic::Ordering::SeqCst);
        assert_eq!(scanner.scan().await.unwrap().alerts, 0);
        assert!(journal.try_recv().is_err());
    }
}
