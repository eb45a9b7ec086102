use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Trading-day phases
// ---------------------------------------------------------------------------

/// Operating phase of the trading day, derived from the market-local clock.
/// Weekend wins over time-of-day; every instant maps to exactly one phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    PreOpen,
    Premarket,
    Market,
    Closed,
    Weekend,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::PreOpen => "pre_open",
            Phase::Premarket => "premarket",
            Phase::Market => "market",
            Phase::Closed => "closed",
            Phase::Weekend => "weekend",
        }
    }

    /// Compact encoding for the health endpoint's atomic phase cell.
    pub fn code(&self) -> u8 {
        match self {
            Phase::PreOpen => 0,
            Phase::Premarket => 1,
            Phase::Market => 2,
            Phase::Closed => 3,
            Phase::Weekend => 4,
        }
    }

    pub fn from_code(code: u8) -> Phase {
        match code {
            1 => Phase::Premarket,
            2 => Phase::Market,
            3 => Phase::Closed,
            4 => Phase::Weekend,
            _ => Phase::PreOpen,
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Screener rows and ranked candidates
// ---------------------------------------------------------------------------

/// One screener row after parse-time validation. Metric fields stay optional;
/// a missing field only matters to the engine that requires it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SnapshotRow {
    /// Display symbol ("ABCD").
    pub symbol: String,
    /// Exchange-qualified id as the screener reports it ("NASDAQ:ABCD").
    /// Needed to query the same instrument back by ticker list.
    pub ticker: String,
    /// Last trade price in dollars.
    pub price: Option<f64>,
    /// Change from the session open, percent.
    pub change_pct: Option<f64>,
    /// Premarket change vs the previous close, percent.
    pub premarket_change_pct: Option<f64>,
    /// Opening gap vs the previous close, percent.
    pub gap_pct: Option<f64>,
    /// Session volume, shares.
    pub volume: Option<f64>,
    /// Premarket volume, shares.
    pub premarket_volume: Option<f64>,
    /// 5-minute relative volume.
    pub rvol_5m: Option<f64>,
    /// Free-float shares outstanding.
    pub float_shares: Option<f64>,
}

/// Row plus its momentum score. Ephemeral within one scan cycle.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredCandidate {
    pub symbol: String,
    pub score: f64,
    pub row: SnapshotRow,
}

// ---------------------------------------------------------------------------
// Alerts
// ---------------------------------------------------------------------------

/// What fired an alert. Doubles as the journal `trigger_kind` column and one
/// half of the momentum cooldown key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    FirstSighting,
    StepGrowth,
    NewEntrant,
    MetricSpike,
    Reversal,
    GapFade,
    GapBounce,
}

impl TriggerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerKind::FirstSighting => "first_sighting",
            TriggerKind::StepGrowth => "step_growth",
            TriggerKind::NewEntrant => "new_entrant",
            TriggerKind::MetricSpike => "metric_spike",
            TriggerKind::Reversal => "reversal",
            TriggerKind::GapFade => "gap_fade",
            TriggerKind::GapBounce => "gap_bounce",
        }
    }
}

impl std::fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Journal record for one dispatched (or attempted) alert. Sent over the
/// journal mpsc channel to the SQLite writer task.
#[derive(Debug, Clone)]
pub struct AlertEvent {
    pub worker: &'static str,
    pub symbol: String,
    pub trigger: TriggerKind,
    /// The metric value the trigger fired on (step value, score, drop pct).
    pub value: f64,
    pub price: Option<f64>,
    pub message: String,
    pub delivered: bool,
    /// Millisecond UTC epoch timestamp.
    pub sent_at_ms: i64,
}

// ---------------------------------------------------------------------------
// Worker contracts
// ---------------------------------------------------------------------------

/// Lifecycle flags plus counters, as returned by `ScanWorker::state()`.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerState {
    pub is_running: bool,
    pub is_starting: bool,
    pub cycles: u64,
    pub failed_cycles: u64,
    pub alerts_sent: u64,
    /// Rows the last successful cycle fetched after validation.
    pub last_rows: u64,
    pub last_cycle_at_ms: Option<i64>,
}

/// Totals one scan cycle reports back to the worker loop.
#[derive(Debug, Clone, Copy, Default)]
pub struct CycleReport {
    pub rows: usize,
    pub alerts: u64,
}

/// Outcome of a notifier call. Transport failures fold into `success == false`
/// so callers can gate their dedup-state commits on actual delivery.
#[derive(Debug, Clone, Default)]
pub struct SendOutcome {
    pub success: bool,
    pub message_id: Option<i64>,
    pub error: Option<String>,
}

impl SendOutcome {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            message_id: None,
            error: Some(reason.into()),
        }
    }
}
