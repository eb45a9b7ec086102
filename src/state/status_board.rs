use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use serde::Serialize;

use crate::types::ScoredCandidate;

// ---------------------------------------------------------------------------
// StatusBoard
// ---------------------------------------------------------------------------

/// Latest committed step-tracker value for one premarket symbol.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct StepRecord {
    pub value: f64,
    pub repeat: u32,
}

/// Shared read model of what the scanners saw last. Workers publish after
/// each cycle, the HTTP API reads. Nothing here feeds back into alert
/// decisions; the engines keep their own state.
pub struct StatusBoard {
    /// symbol → last committed step alert value.
    steps: DashMap<String, StepRecord>,
    /// Top long-side candidates from the last momentum cycle.
    gainers: Mutex<Vec<ScoredCandidate>>,
    /// Top short-side candidates from the last momentum cycle.
    losers: Mutex<Vec<ScoredCandidate>>,
    /// Gap watcher snapshot: current mode plus watched tickers.
    watch: Mutex<WatchSnapshot>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct WatchSnapshot {
    pub mode: Option<String>,
    pub tickers: Vec<String>,
}

impl StatusBoard {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            steps: DashMap::new(),
            gainers: Mutex::new(Vec::new()),
            losers: Mutex::new(Vec::new()),
            watch: Mutex::new(WatchSnapshot::default()),
        })
    }

    pub fn record_step(&self, symbol: &str, value: f64, repeat: u32) {
        self.steps
            .insert(symbol.to_string(), StepRecord { value, repeat });
    }

    pub fn clear_steps(&self) {
        self.steps.clear();
    }

    pub fn step_symbols(&self) -> Vec<(String, StepRecord)> {
        let mut out: Vec<(String, StepRecord)> = self
            .steps
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect();
        out.sort_by(|a, b| {
            b.1.value
                .partial_cmp(&a.1.value)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        out
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Replace both mover lists wholesale with this cycle's ranking.
    pub fn set_movers(&self, gainers: Vec<ScoredCandidate>, losers: Vec<ScoredCandidate>) {
        if let Ok(mut g) = self.gainers.lock() {
            *g = gainers;
        }
        if let Ok(mut l) = self.losers.lock() {
            *l = losers;
        }
    }

    pub fn clear_movers(&self) {
        self.set_movers(Vec::new(), Vec::new());
    }

    pub fn top_gainers(&self) -> Vec<ScoredCandidate> {
        self.gainers.lock().map(|g| g.clone()).unwrap_or_default()
    }

    pub fn top_losers(&self) -> Vec<ScoredCandidate> {
        self.losers.lock().map(|l| l.clone()).unwrap_or_default()
    }

    pub fn set_watch(&self, mode: &str, tickers: Vec<String>) {
        if let Ok(mut w) = self.watch.lock() {
            w.mode = Some(mode.to_string());
            w.tickers = tickers;
        }
    }

    pub fn clear_watch(&self) {
        if let Ok(mut w) = self.watch.lock() {
            *w = WatchSnapshot::default();
        }
    }

    pub fn watch_snapshot(&self) -> WatchSnapshot {
        self.watch.lock().map(|w| w.clone()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SnapshotRow;

    fn candidate(symbol: &str, score: f64) -> ScoredCandidate {
        ScoredCandidate {
            symbol: symbol.to_string(),
            score,
            row: SnapshotRow {
                symbol: symbol.to_string(),
                ..Default::default()
            },
        }
    }

    #[test]
    fn steps_upsert_and_sort_by_value() {
        let board = StatusBoard::new();
        board.record_step("LOW", 6.0, 1);
        board.record_step("HIGH", 14.0, 3);
        board.record_step("LOW", 7.0, 2);

        let steps = board.step_symbols();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].0, "HIGH");
        assert_eq!(steps[1].0, "LOW");
        assert!((steps[1].1.value - 7.0).abs() < 1e-9);
        assert_eq!(steps[1].1.repeat, 2);

        board.clear_steps();
        assert_eq!(board.step_count(), 0);
    }

    #[test]
    fn movers_replace_wholesale() {
        let board = StatusBoard::new();
        board.set_movers(vec![candidate("A", 10.0)], vec![candidate("B", 5.0)]);
        board.set_movers(vec![candidate("C", 8.0)], Vec::new());

        let gainers = board.top_gainers();
        assert_eq!(gainers.len(), 1);
        assert_eq!(gainers[0].symbol, "C");
        assert!(board.top_losers().is_empty());
    }

    #[test]
    fn watch_snapshot_round_trips() {
        let board = StatusBoard::new();
        assert!(board.watch_snapshot().mode.is_none());

        board.set_watch("setup", vec!["NASDAQ:GAP".to_string()]);
        let snap = board.watch_snapshot();
        assert_eq!(snap.mode.as_deref(), Some("setup"));
        assert_eq!(snap.tickers, vec!["NASDAQ:GAP"]);

        board.clear_watch();
        assert!(board.watch_snapshot().mode.is_none());
        assert!(board.watch_snapshot().tickers.is_empty());
    }
}
