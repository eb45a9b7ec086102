mod gap_watch;
mod handle;
mod momentum;
mod premarket;

pub use gap_watch::GapWatchScanner;
pub use handle::{ScanWorker, Scanner, WorkerHandle};
pub use momentum::MomentumScanner;
pub use premarket::PremarketStepScanner;

use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::mpsc;
use tracing::warn;

use crate::types::AlertEvent;

/// Queue an alert record for the journal writer without blocking the cycle.
pub(crate) fn journal_event(tx: &mpsc::Sender<AlertEvent>, event: AlertEvent) {
    if let Err(e) = tx.try_send(event) {
        warn!("alert journal queue rejected record: {e}");
    }
}

pub(crate) fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Share-count formatting for alert text ("1.2M", "850K").
pub(crate) fn fmt_volume(v: f64) -> String {
    if v >= 1_000_000_000.0 {
        format!("{:.1}B", v / 1e9)
    } else if v >= 1_000_000.0 {
        format!("{:.1}M", v / 1e6)
    } else if v >= 1_000.0 {
        format!("{:.0}K", v / 1e3)
    } else {
        format!("{v:.0}")
    }
}
