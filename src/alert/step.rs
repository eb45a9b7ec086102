use tracing::debug;

use super::state::AlertState;
use crate::types::{SnapshotRow, TriggerKind};

/// Which row metric a step engine tracks. Also decides which volume column the
/// gate reads, since premarket rows carry premarket volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepMetric {
    PremarketChange,
    ChangeFromOpen,
}

impl StepMetric {
    pub fn value_of(&self, row: &SnapshotRow) -> Option<f64> {
        match self {
            StepMetric::PremarketChange => row.premarket_change_pct,
            StepMetric::ChangeFromOpen => row.change_pct,
        }
    }

    pub fn volume_of(&self, row: &SnapshotRow) -> Option<f64> {
        match self {
            StepMetric::PremarketChange => row.premarket_volume,
            StepMetric::ChangeFromOpen => row.volume,
        }
    }
}

/// Static row filters applied before any step logic runs.
#[derive(Debug, Clone, Copy)]
pub struct StepGates {
    pub min_volume: f64,
    pub min_price: f64,
    pub max_float: f64,
}

/// One planned notification out of `evaluate`. Not yet committed: the caller
/// sends it and reports delivery back through `commit`.
#[derive(Debug, Clone, PartialEq)]
pub struct StepAlert {
    pub symbol: String,
    /// FirstSighting or StepGrowth.
    pub trigger: TriggerKind,
    pub value: f64,
    /// Previously alerted value (step growth only).
    pub prev_value: Option<f64>,
    /// Which notification number this will be for the symbol once committed.
    pub repeat: u32,
    pub price: Option<f64>,
    pub volume: Option<f64>,
}

/// Discretizing rate limiter over a per-symbol growth metric: a symbol alerts
/// when first seen and then once per `step` of forward progress past its last
/// alerted value. Falling back and re-crossing old ground stays silent.
pub struct StepAlertEngine {
    metric: StepMetric,
    gates: StepGates,
    step: f64,
    send_on_startup: bool,
    state: AlertState,
    first_scan_done: bool,
}

impl StepAlertEngine {
    pub fn new(metric: StepMetric, gates: StepGates, step: f64, send_on_startup: bool) -> Self {
        Self {
            metric,
            gates,
            step,
            send_on_startup,
            state: AlertState::new(),
            first_scan_done: false,
        }
    }

    /// Back to a blank slate: no baselines, next scan counts as the first.
    pub fn reset(&mut self) {
        self.state.clear();
        self.first_scan_done = false;
    }

    /// Number of symbols currently baselined.
    pub fn tracked(&self) -> usize {
        self.state.len()
    }

    /// Evaluate one batch of rows against gates and step thresholds.
    ///
    /// On the first scan after a reset with startup sends disabled, eligible
    /// symbols are baselined silently instead of planned; symbols failing the
    /// gates get no baseline at all and will alert on a later first pass.
    pub fn evaluate(&mut self, rows: &[SnapshotRow]) -> Vec<StepAlert> {
        let bootstrap = !self.first_scan_done && !self.send_on_startup;
        self.first_scan_done = true;

        let mut planned = Vec::new();
        for row in rows {
            let Some(value) = self.metric.value_of(row) else {
                continue;
            };
            if !self.passes_gates(row) {
                continue;
            }

            let prev = self.state.get(&row.symbol);
            let eligible = match prev {
                None => true,
                Some(rec) => value >= rec.last_value + self.step,
            };
            if !eligible {
                continue;
            }

            if bootstrap {
                let repeat = self.state.record(&row.symbol, value);
                debug!(symbol = %row.symbol, value, repeat, "startup baseline recorded");
                continue;
            }

            let (trigger, prev_value, repeat) = match prev {
                None => (TriggerKind::FirstSighting, None, 1),
                Some(rec) => (
                    TriggerKind::StepGrowth,
                    Some(rec.last_value),
                    rec.repeat_count + 1,
                ),
            };
            planned.push(StepAlert {
                symbol: row.symbol.clone(),
                trigger,
                value,
                prev_value,
                repeat,
                price: row.price,
                volume: self.metric.volume_of(row),
            });
        }
        planned
    }

    /// Apply a delivered alert to dedup state. Only call once the notifier
    /// reported success; an uncommitted plan is re-planned next cycle.
    pub fn commit(&mut self, alert: &StepAlert) -> u32 {
        self.state.record(&alert.symbol, alert.value)
    }

    fn passes_gates(&self, row: &SnapshotRow) -> bool {
        let Some(volume) = self.metric.volume_of(row) else {
            return false;
        };
        let Some(price) = row.price else {
            return false;
        };
        if volume < self.gates.min_volume || price < self.gates.min_price {
            debug!(symbol = %row.symbol, volume, price, "row below volume/price gates, dropped");
            return false;
        }
        // An unknown float cannot be checked against the ceiling; let it pass.
        if let Some(float) = row.float_shares {
            if float > self.gates.max_float {
                debug!(symbol = %row.symbol, float, "row above float ceiling, dropped");
                return false;
            }
        }
        true
    }
}
