use std::collections::{HashMap, HashSet};

use tracing::{debug, info};

use crate::types::{SnapshotRow, TriggerKind};

// ---------------------------------------------------------------------------
// Modes
// ---------------------------------------------------------------------------

/// What the gap watcher is doing right now. `Setup` collects gappers during
/// the premarket session, `Active` monitors the collected list once the
/// market opens. Switching modes changes the cadence, never the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchMode {
    Setup,
    Active,
}

impl WatchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WatchMode::Setup => "setup",
            WatchMode::Active => "active",
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct WatchlistConfig {
    /// Minimum absolute gap (%) to admit a symbol to the watchlist.
    pub min_gap_pct: f64,
    /// Minimum premarket volume to admit a symbol.
    pub min_premarket_volume: f64,
    /// Fade trigger: a gap-up symbol whose change from open falls to this
    /// level or below fires.
    pub fade_trigger_pct: f64,
    /// Bounce trigger: a gap-down symbol whose change from open rises to
    /// this level or above fires.
    pub bounce_trigger_pct: f64,
}

// ---------------------------------------------------------------------------
// Entries and triggers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct WatchEntry {
    /// Exchange-qualified ticker, kept so the live phase can query exactly
    /// the watched symbols back from the screener.
    ticker: String,
    /// Gap recorded at admission. Later rebuilds never overwrite it.
    gap_pct: f64,
    /// Admission-time interest score, `|gap| * log10(premarket volume)`.
    score: f64,
}

#[derive(Debug, Clone)]
pub struct WatchTrigger {
    pub symbol: String,
    pub kind: TriggerKind,
    /// Gap the symbol was admitted with.
    pub gap_pct: f64,
    /// Change from open at trigger time.
    pub change_pct: f64,
    pub price: Option<f64>,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Two-phase gap watcher. During setup it accumulates symbols that gapped
/// hard on real premarket volume; during the live session it waits for each
/// one to reverse, and fires at most once per symbol for the lifetime of the
/// watchlist. Only an explicit `clear` (worker shutdown) resets anything.
pub struct WatchlistEngine {
    cfg: WatchlistConfig,
    mode: WatchMode,
    watchlist: HashMap<String, WatchEntry>,
    triggered: HashSet<String>,
}

impl WatchlistEngine {
    pub fn new(cfg: WatchlistConfig) -> Self {
        Self {
            cfg,
            mode: WatchMode::Setup,
            watchlist: HashMap::new(),
            triggered: HashSet::new(),
        }
    }

    pub fn mode(&self) -> WatchMode {
        self.mode
    }

    /// Switch modes. Watchlist and fired-trigger state survive untouched, so
    /// a symbol admitted in setup stays armed across the open and a trigger
    /// that already fired stays spent.
    pub fn set_mode(&mut self, mode: WatchMode) {
        if self.mode != mode {
            info!(
                from = self.mode.as_str(),
                to = mode.as_str(),
                watched = self.watchlist.len(),
                "watch mode switched"
            );
            self.mode = mode;
        }
    }

    /// Setup pass: admit every row that gapped at least `min_gap_pct` in
    /// either direction on at least `min_premarket_volume` shares. A symbol
    /// already on the list keeps its original entry. Returns how many
    /// symbols were newly admitted.
    pub fn build(&mut self, rows: &[SnapshotRow]) -> usize {
        let mut added = 0;
        for row in rows {
            let (Some(gap), Some(pm_volume)) = (row.gap_pct, row.premarket_volume) else {
                continue;
            };
            if gap.abs() < self.cfg.min_gap_pct || pm_volume < self.cfg.min_premarket_volume {
                continue;
            }
            self.watchlist.entry(row.symbol.clone()).or_insert_with(|| {
                added += 1;
                debug!(
                    symbol = %row.symbol,
                    gap = gap,
                    premarket_volume = pm_volume,
                    "admitted to gap watchlist"
                );
                WatchEntry {
                    ticker: row.ticker.clone(),
                    gap_pct: gap,
                    score: gap.abs() * pm_volume.log10(),
                }
            });
        }
        added
    }

    /// Live pass: plan fade/bounce triggers for watched symbols that
    /// reversed. Read-only; a planned trigger is spent only when `commit`
    /// confirms its delivery.
    pub fn monitor(&self, rows: &[SnapshotRow]) -> Vec<WatchTrigger> {
        let mut out = Vec::new();
        for row in rows {
            let Some(entry) = self.watchlist.get(&row.symbol) else {
                continue;
            };
            if self.triggered.contains(&row.symbol) {
                continue;
            }
            let Some(change) = row.change_pct else {
                continue;
            };

            // Admission enforced the gap magnitude, so the sign alone tells
            // us which reversal we are waiting for.
            let kind = if entry.gap_pct > 0.0 && change <= self.cfg.fade_trigger_pct {
                TriggerKind::GapFade
            } else if entry.gap_pct < 0.0 && change >= self.cfg.bounce_trigger_pct {
                TriggerKind::GapBounce
            } else {
                continue;
            };

            out.push(WatchTrigger {
                symbol: row.symbol.clone(),
                kind,
                gap_pct: entry.gap_pct,
                change_pct: change,
                price: row.price,
            });
        }
        out
    }

    /// Mark a symbol's trigger as delivered. It will never fire again until
    /// the whole engine is cleared.
    pub fn commit(&mut self, symbol: &str) {
        self.triggered.insert(symbol.to_string());
    }

    /// Drop the watchlist and every spent trigger.
    pub fn clear(&mut self) {
        self.watchlist.clear();
        self.triggered.clear();
    }

    /// Exchange-qualified tickers of every watched symbol, strongest gap
    /// first, for querying the screener back.
    pub fn tickers(&self) -> Vec<String> {
        let mut entries: Vec<&WatchEntry> = self.watchlist.values().collect();
        entries.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        entries.into_iter().map(|e| e.ticker.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.watchlist.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watchlist.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> WatchlistConfig {
        WatchlistConfig {
            min_gap_pct: 7.0,
            min_premarket_volume: 500_000.0,
            fade_trigger_pct: -2.0,
            bounce_trigger_pct: 2.0,
        }
    }

    fn gap_row(symbol: &str, gap: Option<f64>, pm_volume: Option<f64>) -> SnapshotRow {
        SnapshotRow {
            symbol: symbol.to_string(),
            ticker: format!("NASDAQ:{symbol}"),
            gap_pct: gap,
            premarket_volume: pm_volume,
            ..Default::default()
        }
    }

    fn live_row(symbol: &str, change: f64) -> SnapshotRow {
        SnapshotRow {
            symbol: symbol.to_string(),
            ticker: format!("NASDAQ:{symbol}"),
            price: Some(12.5),
            change_pct: Some(change),
            ..Default::default()
        }
    }

    #[test]
    fn build_admits_only_qualifying_rows() {
        let mut engine = WatchlistEngine::new(cfg());
        let rows = vec![
            gap_row("BIGUP", Some(8.0), Some(600_000.0)),
            gap_row("BIGDN", Some(-9.0), Some(700_000.0)),
            gap_row("SMALL", Some(3.0), Some(900_000.0)),
            gap_row("THIN", Some(11.0), Some(100_000.0)),
            gap_row("NOGAP", None, Some(900_000.0)),
        ];
        let added = engine.build(&rows);
        assert_eq!(added, 2);
        assert_eq!(engine.len(), 2);
        let tickers = engine.tickers();
        assert!(tickers.contains(&"NASDAQ:BIGUP".to_string()));
        assert!(tickers.contains(&"NASDAQ:BIGDN".to_string()));
    }

    #[test]
    fn build_never_overwrites_an_existing_entry() {
        let mut engine = WatchlistEngine::new(cfg());
        engine.build(&[gap_row("GAP", Some(8.0), Some(600_000.0))]);
        let added = engine.build(&[gap_row("GAP", Some(12.0), Some(900_000.0))]);
        assert_eq!(added, 0);
        assert_eq!(engine.len(), 1);

        // The original +8 gap still governs: a -2% print is a fade off the
        // original admission, reported with the admission gap.
        let triggers = engine.monitor(&[live_row("GAP", -2.0)]);
        assert_eq!(triggers.len(), 1);
        assert!((triggers[0].gap_pct - 8.0).abs() < 1e-9);
    }

    #[test]
    fn fade_fires_when_a_gap_up_reverses() {
        let mut engine = WatchlistEngine::new(cfg());
        engine.build(&[gap_row("FADER", Some(8.0), Some(600_000.0))]);

        assert!(engine.monitor(&[live_row("FADER", -1.9)]).is_empty());

        let triggers = engine.monitor(&[live_row("FADER", -2.0)]);
        assert_eq!(triggers.len(), 1);
        assert_eq!(triggers[0].kind, TriggerKind::GapFade);
        assert_eq!(triggers[0].symbol, "FADER");
        assert!((triggers[0].change_pct - -2.0).abs() < 1e-9);
    }

    #[test]
    fn bounce_fires_when_a_gap_down_recovers() {
        let mut engine = WatchlistEngine::new(cfg());
        engine.build(&[gap_row("BNC", Some(-9.0), Some(700_000.0))]);

        assert!(engine.monitor(&[live_row("BNC", 1.9)]).is_empty());

        let triggers = engine.monitor(&[live_row("BNC", 2.3)]);
        assert_eq!(triggers.len(), 1);
        assert_eq!(triggers[0].kind, TriggerKind::GapBounce);
    }

    #[test]
    fn continuation_in_the_gap_direction_stays_silent() {
        let mut engine = WatchlistEngine::new(cfg());
        engine.build(&[
            gap_row("UP", Some(8.0), Some(600_000.0)),
            gap_row("DN", Some(-9.0), Some(700_000.0)),
        ]);

        // Gap-up keeps running, gap-down keeps dumping: neither reverses.
        assert!(engine
            .monitor(&[live_row("UP", 5.0), live_row("DN", -4.0)])
            .is_empty());
        // Unwatched symbols never trigger.
        assert!(engine.monitor(&[live_row("OTHER", -8.0)]).is_empty());
    }

    #[test]
    fn committed_trigger_never_fires_again() {
        let mut engine = WatchlistEngine::new(cfg());
        engine.build(&[gap_row("ONCE", Some(8.0), Some(600_000.0))]);

        // Planned but not committed: the next pass plans it again.
        assert_eq!(engine.monitor(&[live_row("ONCE", -2.5)]).len(), 1);
        assert_eq!(engine.monitor(&[live_row("ONCE", -2.5)]).len(), 1);

        engine.commit("ONCE");
        assert!(engine.monitor(&[live_row("ONCE", -2.5)]).is_empty());
        // Even a deeper reversal stays spent.
        assert!(engine.monitor(&[live_row("ONCE", -6.0)]).is_empty());
    }

    #[test]
    fn mode_switch_preserves_watchlist_and_spent_triggers() {
        let mut engine = WatchlistEngine::new(cfg());
        engine.build(&[
            gap_row("KEEP", Some(8.0), Some(600_000.0)),
            gap_row("SPENT", Some(9.0), Some(600_000.0)),
        ]);
        engine.commit("SPENT");

        assert_eq!(engine.mode(), WatchMode::Setup);
        engine.set_mode(WatchMode::Active);
        assert_eq!(engine.mode(), WatchMode::Active);
        engine.set_mode(WatchMode::Setup);

        assert_eq!(engine.len(), 2);
        assert!(engine.monitor(&[live_row("SPENT", -3.0)]).is_empty());
        assert_eq!(engine.monitor(&[live_row("KEEP", -3.0)]).len(), 1);
    }

    #[test]
    fn clear_resets_watchlist_and_triggers() {
        let mut engine = WatchlistEngine::new(cfg());
        engine.build(&[gap_row("GONE", Some(8.0), Some(600_000.0))]);
        engine.commit("GONE");
        engine.clear();

        assert!(engine.is_empty());
        assert!(engine.tickers().is_empty());

        // After a fresh build the symbol may trigger again.
        engine.build(&[gap_row("GONE", Some(8.0), Some(600_000.0))]);
        assert_eq!(engine.monitor(&[live_row("GONE", -2.5)]).len(), 1);
    }

    #[test]
    fn tickers_come_out_strongest_gap_first() {
        let mut engine = WatchlistEngine::new(cfg());
        engine.build(&[
            gap_row("WEAK", Some(7.5), Some(600_000.0)),
            gap_row("STRONG", Some(-15.0), Some(5_000_000.0)),
        ]);
        let tickers = engine.tickers();
        assert_eq!(tickers, vec!["NASDAQ:STRONG", "NASDAQ:WEAK"]);
    }
}
