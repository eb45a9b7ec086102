//! Generic scan-worker runtime. A `WorkerHandle` owns the timer loop and
//! lifecycle flags for one `Scanner`; the orchestrator only ever talks to the
//! handle, never to the scanner inside it.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

use super::now_ms;
use crate::api::latency::LatencyStats;
use crate::error::{AppError, Result};
use crate::types::{CycleReport, Phase, WorkerState};

// ---------------------------------------------------------------------------
// Scanner contract
// ---------------------------------------------------------------------------

/// Domain half of a worker: one scan strategy with its engines and dedup
/// state. Implementations never see timers or lifecycle flags; the handle
/// schedules them.
#[async_trait]
pub trait Scanner: Send + 'static {
    /// Wipe per-session state for a fresh run. Called on every start.
    fn reset(&mut self);

    /// One full cycle: fetch, evaluate, dispatch.
    async fn scan(&mut self) -> Result<CycleReport>;

    /// Current cadence. Re-read after every cycle; when it changes the timer
    /// is rebuilt and the next cycle runs immediately.
    fn period(&self) -> Duration;

    /// Final cleanup when the worker stops.
    fn shutdown(&mut self) {}
}

/// Lifecycle surface the orchestrator drives. `start` and `stop` are
/// idempotent; `stop` returns only after any in-flight cycle has finished.
#[async_trait]
pub trait ScanWorker: Send + Sync {
    fn name(&self) -> &'static str;
    fn runs_in(&self, phase: Phase) -> bool;
    async fn start(&self) -> Result<()>;
    async fn stop(&self) -> Result<()>;
    fn state(&self) -> WorkerState;
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

#[derive(Default)]
struct WorkerStats {
    cycles: AtomicU64,
    failed_cycles: AtomicU64,
    alerts_sent: AtomicU64,
    /// Row count of the last successful cycle.
    last_rows: AtomicU64,
    /// Millisecond UTC epoch of the last finished cycle, 0 = never.
    last_cycle_at_ms: AtomicI64,
}

impl WorkerStats {
    fn record_cycle(&self, alerts: u64, rows: usize) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        self.alerts_sent.fetch_add(alerts, Ordering::Relaxed);
        self.last_rows.store(rows as u64, Ordering::Relaxed);
        self.last_cycle_at_ms.store(now_ms(), Ordering::Relaxed);
    }

    fn record_failure(&self) {
        self.failed_cycles.fetch_add(1, Ordering::Relaxed);
        self.last_cycle_at_ms.store(now_ms(), Ordering::Relaxed);
    }
}

struct RunningTask<S> {
    cancel: watch::Sender<bool>,
    handle: JoinHandle<S>,
}

struct Inner<S> {
    /// The scanner between runs. `None` while the loop owns it, and after a
    /// crashed run that never gave it back.
    idle: Option<S>,
    task: Option<RunningTask<S>>,
}

pub struct WorkerHandle<S: Scanner> {
    name: &'static str,
    /// Phases this worker is supposed to run in.
    phases: &'static [Phase],
    is_running: AtomicBool,
    is_starting: AtomicBool,
    stats: Arc<WorkerStats>,
    latency: Arc<LatencyStats>,
    inner: Mutex<Inner<S>>,
}

impl<S: Scanner> WorkerHandle<S> {
    pub fn new(
        name: &'static str,
        phases: &'static [Phase],
        scanner: S,
        latency: Arc<LatencyStats>,
    ) -> Arc<Self> {
        Arc::new(Self {
            name,
            phases,
            is_running: AtomicBool::new(false),
            is_starting: AtomicBool::new(false),
            stats: Arc::new(WorkerStats::default()),
            latency,
            inner: Mutex::new(Inner {
                idle: Some(scanner),
                task: None,
            }),
        })
    }

    /// Reset the scanner and arm its timer. A second call while running or
    /// mid-start is a no-op.
    pub async fn start(&self) -> Result<()> {
        if self.is_running.load(Ordering::SeqCst) {
            debug!(worker = self.name, "start ignored, already running");
            return Ok(());
        }
        if self
            .is_starting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!(worker = self.name, "start ignored, start already in flight");
            return Ok(());
        }

        let result = self.spawn_loop().await;
        self.is_starting.store(false, Ordering::SeqCst);
        result
    }

    async fn spawn_loop(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let Some(mut scanner) = inner.idle.take() else {
            return Err(AppError::Worker(format!(
                "{} has no scanner to run, previous run crashed",
                self.name
            )));
        };
        scanner.reset();

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let handle = tokio::spawn(run_loop(
            scanner,
            cancel_rx,
            Arc::clone(&self.stats),
            Arc::clone(&self.latency),
            self.name,
        ));
        inner.task = Some(RunningTask {
            cancel: cancel_tx,
            handle,
        });
        self.is_running.store(true, Ordering::SeqCst);
        info!(worker = self.name, "worker started");
        Ok(())
    }

    /// Cancel the timer and wait for the loop to hand the scanner back. An
    /// in-flight cycle runs to completion first. A second call is a no-op.
    pub async fn stop(&self) -> Result<()> {
        if !self.is_running.swap(false, Ordering::SeqCst) {
            debug!(worker = self.name, "stop ignored, not running");
            return Ok(());
        }

        let mut inner = self.inner.lock().await;
        let Some(task) = inner.task.take() else {
            return Ok(());
        };
        // A closed channel means the loop already exited; join it either way.
        let _ = task.cancel.send(true);
        match task.handle.await {
            Ok(scanner) => {
                inner.idle = Some(scanner);
                info!(worker = self.name, "worker stopped");
                Ok(())
            }
            Err(e) => Err(AppError::Worker(format!(
                "{} scan loop crashed: {e}",
                self.name
            ))),
        }
    }

    pub fn state(&self) -> WorkerState {
        let last = self.stats.last_cycle_at_ms.load(Ordering::Relaxed);
        WorkerState {
            is_running: self.is_running.load(Ordering::SeqCst),
            is_starting: self.is_starting.load(Ordering::SeqCst),
            cycles: self.stats.cycles.load(Ordering::Relaxed),
            failed_cycles: self.stats.failed_cycles.load(Ordering::Relaxed),
            alerts_sent: self.stats.alerts_sent.load(Ordering::Relaxed),
            last_rows: self.stats.last_rows.load(Ordering::Relaxed),
            last_cycle_at_ms: (last != 0).then_some(last),
        }
    }
}

#[async_trait]
impl<S: Scanner> ScanWorker for WorkerHandle<S> {
    fn name(&self) -> &'static str {
        self.name
    }

    fn runs_in(&self, phase: Phase) -> bool {
        self.phases.contains(&phase)
    }

    async fn start(&self) -> Result<()> {
        WorkerHandle::start(self).await
    }

    async fn stop(&self) -> Result<()> {
        WorkerHandle::stop(self).await
    }

    fn state(&self) -> WorkerState {
        WorkerHandle::state(self)
    }
}

// ---------------------------------------------------------------------------
// Scan loop
// ---------------------------------------------------------------------------

async fn run_loop<S: Scanner>(
    mut scanner: S,
    mut cancel_rx: watch::Receiver<bool>,
    stats: Arc<WorkerStats>,
    latency: Arc<LatencyStats>,
    name: &'static str,
) -> S {
    let mut period = scanner.period();
    // First tick completes immediately, so a freshly started worker scans
    // right away instead of waiting out a full period.
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = cancel_rx.changed() => break,
            _ = ticker.tick() => {
                let cycle_start = Instant::now();
                match scanner.scan().await {
                    Ok(report) => {
                        let elapsed = cycle_start.elapsed();
                        stats.record_cycle(report.alerts, report.rows);
                        latency.record(elapsed);
                        debug!(
                            worker = name,
                            rows = report.rows,
                            alerts = report.alerts,
                            elapsed_ms = elapsed.as_millis() as u64,
                            "scan cycle complete"
                        );
                    }
                    Err(e) => {
                        stats.record_failure();
                        error!("{name} scan cycle failed: {e}");
                    }
                }

                // The cadence can change with scanner mode. Rebuilding the
                // interval makes the next cycle run immediately.
                let next = scanner.period();
                if next != period {
                    debug!(worker = name, period_secs = next.as_secs(), "cadence changed");
                    period = next;
                    ticker = interval(period);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                }
            }
        }
    }

    scanner.shutdown();
    scanner
}
