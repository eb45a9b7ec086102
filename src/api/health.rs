//! Shared health state for the /health endpoint.
//! Updated by the orchestrator and the alert journal.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::types::Phase;

/// Shared health metrics. Updated by scanner components, read by API.
#[derive(Default)]
pub struct HealthState {
    /// True while the orchestrator poll loop is alive.
    pub orchestrator_running: AtomicBool,
    /// Code of the phase seen on the last orchestrator poll.
    pub phase: AtomicU8,
    /// Millisecond timestamp of the last journaled alert (0 = none).
    pub last_alert_at_ms: AtomicU64,
    /// Alert rows written to the journal since startup.
    pub alerts_written: AtomicU64,
    /// Millisecond timestamp of process start.
    pub started_at_ms: AtomicU64,
}

impl HealthState {
    pub fn new() -> Self {
        let state = Self::default();
        state.started_at_ms.store(now_ms(), Ordering::Relaxed);
        state
    }

    pub fn set_orchestrator_running(&self, v: bool) {
        self.orchestrator_running.store(v, Ordering::Relaxed);
    }

    pub fn orchestrator_running(&self) -> bool {
        self.orchestrator_running.load(Ordering::Relaxed)
    }

    pub fn set_phase(&self, phase: Phase) {
        self.phase.store(phase.code(), Ordering::Relaxed);
    }

    pub fn phase(&self) -> Phase {
        Phase::from_code(self.phase.load(Ordering::Relaxed))
    }

    pub fn set_last_alert_at_ms(&self, ms: u64) {
        self.last_alert_at_ms.store(ms, Ordering::Relaxed);
    }

    pub fn inc_alerts_written(&self) {
        self.alerts_written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn last_alert_at_ms(&self) -> u64 {
        self.last_alert_at_ms.load(Ordering::Relaxed)
    }

    pub fn alerts_written(&self) -> u64 {
        self.alerts_written.load(Ordering::Relaxed)
    }

    pub fn uptime_secs(&self) -> u64 {
        let started = self.started_at_ms.load(Ordering::Relaxed);
        now_ms().saturating_sub(started) / 1000
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
