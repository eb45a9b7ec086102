use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::api::health::HealthState;
use crate::clock::MarketClock;
use crate::notify::Notifier;
use crate::types::Phase;
use crate::worker::ScanWorker;

/// Phase-driven supervisor. Polls the market clock, starts every worker whose
/// phase list covers the current phase and stops the rest. Workers stay black
/// boxes behind `ScanWorker`; one worker failing never takes the others down.
pub struct Orchestrator {
    clock: MarketClock,
    workers: Vec<Arc<dyn ScanWorker>>,
    notifier: Arc<dyn Notifier>,
    health: Arc<HealthState>,
    poll: Duration,
    /// Pinned Telegram status message, created lazily on the first update.
    status_message_id: Option<i64>,
    last_phase: Option<Phase>,
}

impl Orchestrator {
    pub fn new(
        clock: MarketClock,
        workers: Vec<Arc<dyn ScanWorker>>,
        notifier: Arc<dyn Notifier>,
        health: Arc<HealthState>,
        poll: Duration,
    ) -> Self {
        Self {
            clock,
            workers,
            notifier,
            health,
            poll,
            status_message_id: None,
            last_phase: None,
        }
    }

    /// Poll loop. The first tick fires immediately, so workers for the
    /// current phase start right away. When `shutdown` fires, every worker
    /// is stopped before this returns.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        // Ticks are applied inline; a tick that overruns the poll interval
        // must not be followed by a burst of catch-up polls.
        let mut ticker = interval(self.poll);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.health.set_orchestrator_running(true);
        info!(
            poll_secs = self.poll.as_secs(),
            workers = self.workers.len(),
            "orchestrator running"
        );

        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {
                    let phase = self.clock.current_phase();
                    self.apply_phase(phase).await;
                }
            }
        }

        self.stop_all().await;
        self.health.set_orchestrator_running(false);
    }

    /// Reconcile every worker against one phase observation. Idempotent: a
    /// worker already in the right state is left alone.
    async fn apply_phase(&mut self, phase: Phase) {
        let phase_changed = self.last_phase != Some(phase);
        if phase_changed {
            info!(phase = %phase, "phase transition");
        }
        self.last_phase = Some(phase);
        self.health.set_phase(phase);

        let mut start_failures: Vec<&'static str> = Vec::new();
        for worker in &self.workers {
            let state = worker.state();
            if worker.runs_in(phase) {
                if !state.is_running && !state.is_starting {
                    if let Err(e) = worker.start().await {
                        error!("{} failed to start: {e}", worker.name());
                        start_failures.push(worker.name());
                    }
                }
            } else if state.is_running {
                if let Err(e) = worker.stop().await {
                    error!("{} failed to stop: {e}", worker.name());
                }
            }
        }

        if phase_changed || !start_failures.is_empty() {
            self.update_status(phase, &start_failures).await;
        }
    }

    /// Fan the stop out to every worker at once and wait for all of them;
    /// each failure is logged on its own.
    async fn stop_all(&mut self) {
        info!("stopping all workers");
        let results = join_all(self.workers.iter().map(|w| w.stop())).await;
        for (worker, result) in self.workers.iter().zip(results) {
            if let Err(e) = result {
                error!("{} failed to stop: {e}", worker.name());
            }
        }

        if let Some(id) = self.status_message_id {
            let outcome = self
                .notifier
                .edit(id, "🔕 <b>Scanner stopped</b>")
                .await;
            if !outcome.success {
                warn!(
                    error = outcome.error.as_deref().unwrap_or("unknown"),
                    "final status edit failed"
                );
            }
        }
    }

    /// Send or edit the pinned status message. Send failures are logged and
    /// retried implicitly on the next phase change.
    async fn update_status(&mut self, phase: Phase, start_failures: &[&'static str]) {
        let text = self.render_status(phase, start_failures);
        match self.status_message_id {
            Some(id) => {
                let outcome = self.notifier.edit(id, &text).await;
                if !outcome.success {
                    warn!(
                        error = outcome.error.as_deref().unwrap_or("unknown"),
                        "status message edit failed"
                    );
                }
            }
            None => {
                let outcome = self.notifier.send_formatted(&text).await;
                let Some(id) = outcome.message_id.filter(|_| outcome.success) else {
                    warn!(
                        error = outcome.error.as_deref().unwrap_or("unknown"),
                        "status message send failed"
                    );
                    return;
                };
                self.status_message_id = Some(id);
                let pin = self.notifier.pin(id).await;
                if !pin.success {
                    warn!(
                        error = pin.error.as_deref().unwrap_or("unknown"),
                        "status message pin failed"
                    );
                }
            }
        }
    }

    fn render_status(&self, phase: Phase, start_failures: &[&'static str]) -> String {
        let mut text = format!("🔔 <b>Scanner status</b>\nPhase: {phase}\n");
        for worker in &self.workers {
            let state = worker.state();
            if state.is_running {
                text.push_str(&format!(
                    "● {}: running | cycles {} | alerts {}\n",
                    worker.name(),
                    state.cycles,
                    state.alerts_sent,
                ));
            } else {
                text.push_str(&format!("○ {}: idle\n", worker.name()));
            }
        }
        if !start_failures.is_empty() {
            text.push_str(&format!("⚠ start failed: {}\n", start_failures.join(", ")));
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::config::Config;
    use crate::error::{AppError, Result};
    use crate::types::{SendOutcome, WorkerState};

    struct MockWorker {
        name: &'static str,
        phases: &'static [Phase],
        running: AtomicBool,
        starts: AtomicU64,
        stops: AtomicU64,
        fail_start: AtomicBool,
        fail_stop: AtomicBool,
        /// Sleep inside the next start call only, then consumed.
        start_delay_ms: AtomicU64,
    }

    impl MockWorker {
        fn new(name: &'static str, phases: &'static [Phase]) -> Arc<Self> {
            Arc::new(Self {
                name,
                phases,
                running: AtomicBool::new(false),
                starts: AtomicU64::new(0),
                stops: AtomicU64::new(0),
                fail_start: AtomicBool::new(false),
                fail_stop: AtomicBool::new(false),
                start_delay_ms: AtomicU64::new(0),
            })
        }
    }

    #[async_trait]
    impl ScanWorker for MockWorker {
        fn name(&self) -> &'static str {
            self.name
        }

        fn runs_in(&self, phase: Phase) -> bool {
            self.phases.contains(&phase)
        }

        async fn start(&self) -> Result<()> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            let delay = self.start_delay_ms.swap(0, Ordering::SeqCst);
            if delay > 0 {
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            if self.fail_start.load(Ordering::SeqCst) {
                return Err(AppError::Worker("scripted start failure".to_string()));
            }
            self.running.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn stop(&self) -> Result<()> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            self.running.store(false, Ordering::SeqCst);
            if self.fail_stop.load(Ordering::SeqCst) {
                return Err(AppError::Worker("scripted stop failure".to_string()));
            }
            Ok(())
        }

        fn state(&self) -> WorkerState {
            WorkerState {
                is_running: self.running.load(Ordering::SeqCst),
                is_starting: false,
                cycles: 0,
                failed_cycles: 0,
                alerts_sent: 0,
                last_rows: 0,
                last_cycle_at_ms: None,
            }
        }
    }

    /// Notifier that records which call carried which text.
    #[derive(Default)]
    struct StatusNotifier {
        calls: Mutex<Vec<(&'static str, String)>>,
    }

    impl StatusNotifier {
        fn calls(&self) -> Vec<(&'static str, String)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Notifier for StatusNotifier {
        async fn send(&self, text: &str) -> SendOutcome {
            self.calls.lock().unwrap().push(("send", text.to_string()));
            SendOutcome {
                success: true,
                message_id: Some(77),
                error: None,
            }
        }

        async fn send_formatted(&self, html: &str) -> SendOutcome {
            self.calls.lock().unwrap().push(("send", html.to_string()));
            SendOutcome {
                success: true,
                message_id: Some(77),
                error: None,
            }
        }

        async fn edit(&self, _message_id: i64, html: &str) -> SendOutcome {
            self.calls.lock().unwrap().push(("edit", html.to_string()));
            SendOutcome {
                success: true,
                message_id: Some(77),
                error: None,
            }
        }

        async fn pin(&self, _message_id: i64) -> SendOutcome {
            self.calls.lock().unwrap().push(("pin", String::new()));
            SendOutcome {
                success: true,
                message_id: None,
                error: None,
            }
        }
    }

    fn orchestrator(
        workers: Vec<Arc<dyn ScanWorker>>,
        notifier: Arc<StatusNotifier>,
    ) -> Orchestrator {
        let cfg = Config::for_tests();
        Orchestrator::new(
            MarketClock::from_config(&cfg).unwrap(),
            workers,
            notifier,
            Arc::new(HealthState::new()),
            Duration::from_secs(30),
        )
    }

    #[tokio::test]
    async fn phase_sequence_drives_the_right_workers() {
        let pm = MockWorker::new("pm", &[Phase::Premarket]);
        let live = MockWorker::new("live", &[Phase::Market]);
        let span = MockWorker::new("span", &[Phase::Premarket, Phase::Market]);
        let notifier = Arc::new(StatusNotifier::default());
        let mut orch = orchestrator(
            vec![
                Arc::clone(&pm) as Arc<dyn ScanWorker>,
                Arc::clone(&live) as Arc<dyn ScanWorker>,
                Arc::clone(&span) as Arc<dyn ScanWorker>,
            ],
            notifier,
        );

        orch.apply_phase(Phase::Premarket).await;
        assert_eq!(pm.starts.load(Ordering::SeqCst), 1);
        assert_eq!(live.starts.load(Ordering::SeqCst), 0);
        assert_eq!(span.starts.load(Ordering::SeqCst), 1);

        // Over the open: premarket worker stops, the spanning worker is
        // untouched so its state survives the transition.
        orch.apply_phase(Phase::Market).await;
        assert_eq!(pm.stops.load(Ordering::SeqCst), 1);
        assert_eq!(live.starts.load(Ordering::SeqCst), 1);
        assert_eq!(span.starts.load(Ordering::SeqCst), 1);
        assert_eq!(span.stops.load(Ordering::SeqCst), 0);

        orch.apply_phase(Phase::Closed).await;
        assert!(!live.running.load(Ordering::SeqCst));
        assert!(!span.running.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn same_phase_reapply_changes_nothing() {
        let pm = MockWorker::new("pm", &[Phase::Premarket]);
        let notifier = Arc::new(StatusNotifier::default());
        let mut orch = orchestrator(
            vec![Arc::clone(&pm) as Arc<dyn ScanWorker>],
            Arc::clone(&notifier),
        );

        orch.apply_phase(Phase::Premarket).await;
        let updates = notifier.calls().len();
        orch.apply_phase(Phase::Premarket).await;

        assert_eq!(pm.starts.load(Ordering::SeqCst), 1);
        assert_eq!(notifier.calls().len(), updates);
    }

    #[tokio::test]
    async fn start_failure_is_isolated_and_reported() {
        let bad = MockWorker::new("bad", &[Phase::Market]);
        bad.fail_start.store(true, Ordering::SeqCst);
        let good = MockWorker::new("good", &[Phase::Market]);
        let notifier = Arc::new(StatusNotifier::default());
        let mut orch = orchestrator(
            vec![
                Arc::clone(&bad) as Arc<dyn ScanWorker>,
                Arc::clone(&good) as Arc<dyn ScanWorker>,
            ],
            Arc::clone(&notifier),
        );

        orch.apply_phase(Phase::Market).await;
        assert!(good.running.load(Ordering::SeqCst));

        let calls = notifier.calls();
        let status = &calls.iter().find(|(kind, _)| *kind == "send").unwrap().1;
        assert!(status.contains("start failed: bad"));
        assert!(status.contains("● good: running"));
    }

    #[tokio::test]
    async fn first_status_is_pinned_then_edited() {
        let pm = MockWorker::new("pm", &[Phase::Premarket]);
        let notifier = Arc::new(StatusNotifier::default());
        let mut orch = orchestrator(
            vec![Arc::clone(&pm) as Arc<dyn ScanWorker>],
            Arc::clone(&notifier),
        );

        orch.apply_phase(Phase::Premarket).await;
        orch.apply_phase(Phase::Closed).await;

        let kinds: Vec<&'static str> = notifier.calls().iter().map(|(k, _)| *k).collect();
        assert_eq!(kinds, vec!["send", "pin", "edit"]);
    }

    #[tokio::test]
    async fn stop_all_reaches_every_worker_despite_failures() {
        let flaky = MockWorker::new("flaky", &[Phase::Market]);
        flaky.fail_stop.store(true, Ordering::SeqCst);
        let solid = MockWorker::new("solid", &[Phase::Market]);
        let notifier = Arc::new(StatusNotifier::default());
        let mut orch = orchestrator(
            vec![
                Arc::clone(&flaky) as Arc<dyn ScanWorker>,
                Arc::clone(&solid) as Arc<dyn ScanWorker>,
            ],
            Arc::clone(&notifier),
        );

        orch.apply_phase(Phase::Market).await;
        orch.stop_all().await;

        assert_eq!(flaky.stops.load(Ordering::SeqCst), 1);
        assert_eq!(solid.stops.load(Ordering::SeqCst), 1);
        assert!(!solid.running.load(Ordering::SeqCst));

        let (kind, text) = notifier.calls().last().unwrap().clone();
        assert_eq!(kind, "edit");
        assert!(text.contains("stopped"));
    }

    #[tokio::test]
    async fn run_applies_the_current_phase_and_stops_on_shutdown() {
        let all = MockWorker::new(
            "all",
            &[
                Phase::PreOpen,
                Phase::Premarket,
                Phase::Market,
                Phase::Closed,
                Phase::Weekend,
            ],
        );
        let notifier = Arc::new(StatusNotifier::default());
        let orch = orchestrator(
            vec![Arc::clone(&all) as Arc<dyn ScanWorker>],
            Arc::clone(&notifier),
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(orch.run(shutdown_rx));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(all.starts.load(Ordering::SeqCst), 1);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
        assert_eq!(all.stops.load(Ordering::SeqCst), 1);
        assert!(!all.running.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn slow_tick_drops_missed_polls_instead_of_bursting() {
        let lagging = MockWorker::new(
            "lagging",
            &[
                Phase::PreOpen,
                Phase::Premarket,
                Phase::Market,
                Phase::Closed,
                Phase::Weekend,
            ],
        );
        lagging.fail_start.store(true, Ordering::SeqCst);
        lagging.start_delay_ms.store(400, Ordering::SeqCst);
        let notifier = Arc::new(StatusNotifier::default());
        let cfg = Config::for_tests();
        let orch = Orchestrator::new(
            MarketClock::from_config(&cfg).unwrap(),
            vec![Arc::clone(&lagging) as Arc<dyn ScanWorker>],
            notifier,
            Arc::new(HealthState::new()),
            Duration::from_millis(50),
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(orch.run(shutdown_rx));

        // The first start attempt overruns eight poll periods. The missed
        // polls must be dropped, not replayed back-to-back once it returns.
        tokio::time::sleep(Duration::from_millis(420)).await;
        let attempts = lagging.starts.load(Ordering::SeqCst);
        assert!(attempts >= 1);
        assert!(attempts < 5, "missed polls replayed as a burst: {attempts}");

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
