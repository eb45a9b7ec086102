use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::config::PRUNE_WINDOW_FACTOR;
use crate::types::{ScoredCandidate, TriggerKind};

/// Tuning for the momentum dispatcher.
#[derive(Debug, Clone, Copy)]
pub struct CooldownConfig {
    /// Re-alert suppression per (symbol, trigger).
    pub window: Duration,
    /// A symbol unseen for longer than this counts as a fresh entrant again.
    pub stale_after: Duration,
    /// Minimum rvol growth between consecutive scans to flag a spike.
    pub rvol_delta: f64,
    /// Price move vs the previous scan that flags a reversal (negative pct).
    pub dump_threshold_pct: f64,
}

/// What the previous cycle knew about a ranked symbol.
#[derive(Debug, Clone, Copy)]
struct PrevEntry {
    price: Option<f64>,
    rvol: Option<f64>,
    first_seen: Instant,
    last_seen: Instant,
}

/// A planned momentum alert. Committed only after delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerAlert {
    pub symbol: String,
    /// NewEntrant, MetricSpike or Reversal.
    pub trigger: TriggerKind,
    pub score: f64,
    pub price: Option<f64>,
    pub change_pct: Option<f64>,
    pub rvol: Option<f64>,
    /// Rvol at the previous scan (metric spike only).
    pub prev_rvol: Option<f64>,
    /// Percent move vs the previous scan (reversal only).
    pub move_pct: Option<f64>,
}

/// Classifies each cycle's ranked list into momentum triggers against the
/// previous cycle, suppressing repeats per (symbol, trigger) within a
/// cooldown window. The previous-cycle cache is replaced wholesale on `roll`.
pub struct CooldownDispatcher {
    cfg: CooldownConfig,
    prev: HashMap<String, PrevEntry>,
    last_alert: HashMap<(String, TriggerKind), Instant>,
}

impl CooldownDispatcher {
    pub fn new(cfg: CooldownConfig) -> Self {
        Self {
            cfg,
            prev: HashMap::new(),
            last_alert: HashMap::new(),
        }
    }

    pub fn reset(&mut self) {
        self.prev.clear();
        self.last_alert.clear();
    }

    /// Classify the ranked list into zero or more triggers per candidate.
    /// Read-only: cooldown stamps move in `commit`, the cache in `roll`.
    pub fn classify(&self, ranked: &[ScoredCandidate], now: Instant) -> Vec<TriggerAlert> {
        let mut planned = Vec::new();
        for cand in ranked {
            let prev = self.prev.get(&cand.symbol);

            let is_new = match prev {
                None => true,
                Some(entry) => now.duration_since(entry.last_seen) > self.cfg.stale_after,
            };
            if is_new && !self.on_cooldown(&cand.symbol, TriggerKind::NewEntrant, now) {
                planned.push(TriggerAlert {
                    symbol: cand.symbol.clone(),
                    trigger: TriggerKind::NewEntrant,
                    score: cand.score,
                    price: cand.row.price,
                    change_pct: cand.row.change_pct,
                    rvol: cand.row.rvol_5m,
                    prev_rvol: None,
                    move_pct: None,
                });
            }

            let Some(prev) = prev else {
                continue;
            };

            if let (Some(rvol), Some(prev_rvol)) = (cand.row.rvol_5m, prev.rvol) {
                if rvol - prev_rvol >= self.cfg.rvol_delta
                    && !self.on_cooldown(&cand.symbol, TriggerKind::MetricSpike, now)
                {
                    planned.push(TriggerAlert {
                        symbol: cand.symbol.clone(),
                        trigger: TriggerKind::MetricSpike,
                        score: cand.score,
                        price: cand.row.price,
                        change_pct: cand.row.change_pct,
                        rvol: Some(rvol),
                        prev_rvol: Some(prev_rvol),
                        move_pct: None,
                    });
                }
            }

            if let (Some(price), Some(prev_price)) = (cand.row.price, prev.price) {
                if prev_price > 0.0 {
                    let move_pct = (price - prev_price) / prev_price * 100.0;
                    // Reversals are exempt from cooldown.
                    if move_pct <= self.cfg.dump_threshold_pct {
                        planned.push(TriggerAlert {
                            symbol: cand.symbol.clone(),
                            trigger: TriggerKind::Reversal,
                            score: cand.score,
                            price: Some(price),
                            change_pct: cand.row.change_pct,
                            rvol: cand.row.rvol_5m,
                            prev_rvol: None,
                            move_pct: Some(move_pct),
                        });
                    }
                }
            }
        }
        planned
    }

    /// Stamp a delivered alert's cooldown. Reversals stamp nothing.
    pub fn commit(&mut self, symbol: &str, trigger: TriggerKind, now: Instant) {
        if trigger == TriggerKind::Reversal {
            return;
        }
        self.last_alert.insert((symbol.to_string(), trigger), now);
    }

    /// Replace the previous-cycle cache wholesale with this cycle's ranked
    /// list, carrying first_seen forward for symbols still present, and GC
    /// cooldown stamps past twice the window.
    pub fn roll(&mut self, ranked: &[ScoredCandidate], now: Instant) {
        let mut next = HashMap::with_capacity(ranked.len());
        for cand in ranked {
            let first_seen = self
                .prev
                .get(&cand.symbol)
                .map(|entry| entry.first_seen)
                .unwrap_or(now);
            next.insert(
                cand.symbol.clone(),
                PrevEntry {
                    price: cand.row.price,
                    rvol: cand.row.rvol_5m,
                    first_seen,
                    last_seen: now,
                },
            );
        }
        self.prev = next;

        let horizon = self.cfg.window * PRUNE_WINDOW_FACTOR;
        let before = self.last_alert.len();
        self.last_alert
            .retain(|_, stamp| now.duration_since(*stamp) < horizon);
        let pruned = before - self.last_alert.len();
        if pruned > 0 {
            debug!(pruned, "expired cooldown stamps pruned");
        }
    }

    fn on_cooldown(&self, symbol: &str, trigger: TriggerKind, now: Instant) -> bool {
        self.last_alert
            .get(&(symbol.to_string(), trigger))
            .map_or(false, |stamp| now.duration_since(*stamp) < self.cfg.window)
    }
}
