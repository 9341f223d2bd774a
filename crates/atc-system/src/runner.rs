//! Fixed-period task execution with drift absorption.
//!
//! Every periodic component in the kernel (aircraft integrators, radar,
//! separation engine, display, history) is a [`PeriodicTask`] driven by
//! [`spawn_periodic`]. The runner owns the cadence: it measures each
//! cycle, keeps best/worst execution statistics, and schedules the next
//! activation at `exec_start + period` so a single overrun never
//! accumulates lag.

use async_trait::async_trait;
use atc_core::AtcError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Whether the task wants another activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskFlow {
    Continue,
    /// The task is done (e.g. an aircraft left the airspace); the
    /// runner exits after this cycle.
    Stop,
}

/// One periodically-executed component.
///
/// `priority` is advisory: it is carried into logs and stats so the
/// scheduling table stays visible, but correctness never depends on
/// preemption order.
#[async_trait]
pub trait PeriodicTask: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn priority(&self) -> i32;

    async fn execute(&self) -> Result<TaskFlow, AtcError>;
}

/// Shared, mutable period for a running task, in milliseconds.
///
/// Changing it takes effect at the next scheduled activation.
#[derive(Debug)]
pub struct PeriodCell {
    millis: AtomicU64,
}

impl PeriodCell {
    pub fn new(period: Duration) -> Arc<Self> {
        Arc::new(Self {
            millis: AtomicU64::new(period.as_millis() as u64),
        })
    }

    pub fn get(&self) -> Duration {
        Duration::from_millis(self.millis.load(Ordering::Relaxed))
    }

    pub fn set(&self, period: Duration) {
        self.millis
            .store(period.as_millis() as u64, Ordering::Relaxed);
    }
}

/// Running best/worst execution-time statistics, in microseconds.
#[derive(Debug)]
pub struct ExecStats {
    cycles: AtomicU64,
    failures: AtomicU64,
    best_us: AtomicU64,
    worst_us: AtomicU64,
}

impl ExecStats {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            cycles: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            best_us: AtomicU64::new(u64::MAX),
            worst_us: AtomicU64::new(0),
        })
    }

    fn record(&self, elapsed: Duration) {
        // Clamp to 1µs so the "never ran" sentinels stay unambiguous.
        let us = (elapsed.as_micros() as u64).max(1);
        self.cycles.fetch_add(1, Ordering::Relaxed);
        self.best_us.fetch_min(us, Ordering::Relaxed);
        self.worst_us.fetch_max(us, Ordering::Relaxed);
    }

    fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn best(&self) -> Option<Duration> {
        match self.best_us.load(Ordering::Relaxed) {
            u64::MAX => None,
            us => Some(Duration::from_micros(us)),
        }
    }

    pub fn worst(&self) -> Option<Duration> {
        match self.worst_us.load(Ordering::Relaxed) {
            0 => None,
            us => Some(Duration::from_micros(us)),
        }
    }
}

/// Handle to a spawned periodic task.
pub struct PeriodicHandle {
    name: String,
    period: Arc<PeriodCell>,
    stats: Arc<ExecStats>,
    token: CancellationToken,
    join: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl PeriodicHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn period(&self) -> Arc<PeriodCell> {
        Arc::clone(&self.period)
    }

    pub fn stats(&self) -> Arc<ExecStats> {
        Arc::clone(&self.stats)
    }

    /// Request cooperative shutdown and wait for the task to exit.
    ///
    /// The current cycle runs to completion before the task stops.
    pub async fn stop(&self) {
        self.token.cancel();
        let handle = self.join.lock().await.take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                tracing::error!(task = %self.name, "periodic task panicked: {err}");
            }
        }
    }
}

/// Spawn a periodic task with an externally controllable period.
pub fn spawn_periodic_with_cell(
    task: Arc<dyn PeriodicTask>,
    period: Arc<PeriodCell>,
) -> PeriodicHandle {
    let name = task.name().to_string();
    let stats = ExecStats::new();
    let token = CancellationToken::new();

    tracing::info!(
        task = %name,
        priority = task.priority(),
        period_ms = period.get().as_millis() as u64,
        "starting periodic task"
    );

    let join = tokio::spawn(run_loop(
        task,
        Arc::clone(&period),
        Arc::clone(&stats),
        token.clone(),
    ));

    PeriodicHandle {
        name,
        period,
        stats,
        token,
        join: tokio::sync::Mutex::new(Some(join)),
    }
}

/// Spawn a periodic task with a fixed initial period.
pub fn spawn_periodic(task: Arc<dyn PeriodicTask>, period: Duration) -> PeriodicHandle {
    spawn_periodic_with_cell(task, PeriodCell::new(period))
}

async fn run_loop(
    task: Arc<dyn PeriodicTask>,
    period: Arc<PeriodCell>,
    stats: Arc<ExecStats>,
    token: CancellationToken,
) {
    loop {
        let exec_start = Instant::now();

        match task.execute().await {
            Ok(TaskFlow::Continue) => {}
            Ok(TaskFlow::Stop) => {
                tracing::info!(task = task.name(), "periodic task finished");
                break;
            }
            Err(err) => {
                // A failing cycle never terminates the task.
                stats.record_failure();
                tracing::warn!(task = task.name(), "cycle failed: {err}");
            }
        }

        stats.record(exec_start.elapsed());

        // Next activation at exec_start + P. If we overran the period,
        // sleep_until fires immediately and the lag is not carried over.
        let next_activation = exec_start + period.get();
        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep_until(next_activation.into()) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct CountingTask {
        count: AtomicUsize,
        stop_after: Option<usize>,
        fail_on: Option<usize>,
    }

    #[async_trait]
    impl PeriodicTask for CountingTask {
        fn name(&self) -> &str {
            "counting"
        }

        fn priority(&self) -> i32 {
            1
        }

        async fn execute(&self) -> Result<TaskFlow, AtcError> {
            let n = self.count.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_on == Some(n) {
                return Err(AtcError::TransientIo("injected".into()));
            }
            if self.stop_after == Some(n) {
                return Ok(TaskFlow::Stop);
            }
            Ok(TaskFlow::Continue)
        }
    }

    #[tokio::test]
    async fn runs_on_cadence_and_stops() {
        let task = Arc::new(CountingTask {
            count: AtomicUsize::new(0),
            stop_after: None,
            fail_on: None,
        });
        let handle = spawn_periodic(Arc::clone(&task) as Arc<dyn PeriodicTask>, Duration::from_millis(10));

        tokio::time::sleep(Duration::from_millis(55)).await;
        handle.stop().await;
        let ran = task.count.load(Ordering::SeqCst);
        assert!(ran >= 3, "expected several activations, got {ran}");
        assert_eq!(handle.stats().cycles(), ran as u64);

        // No further activations after stop
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(task.count.load(Ordering::SeqCst), ran);
    }

    #[tokio::test]
    async fn failing_cycle_does_not_terminate_the_task() {
        let task = Arc::new(CountingTask {
            count: AtomicUsize::new(0),
            stop_after: None,
            fail_on: Some(1),
        });
        let handle = spawn_periodic(Arc::clone(&task) as Arc<dyn PeriodicTask>, Duration::from_millis(5));

        tokio::time::sleep(Duration::from_millis(40)).await;
        handle.stop().await;

        assert!(task.count.load(Ordering::SeqCst) > 1);
        assert_eq!(handle.stats().failures(), 1);
    }

    #[tokio::test]
    async fn task_flow_stop_ends_the_loop() {
        let task = Arc::new(CountingTask {
            count: AtomicUsize::new(0),
            stop_after: Some(2),
            fail_on: None,
        });
        let handle = spawn_periodic(Arc::clone(&task) as Arc<dyn PeriodicTask>, Duration::from_millis(5));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(task.count.load(Ordering::SeqCst), 2);
        handle.stop().await;
    }

    #[tokio::test]
    async fn period_change_takes_effect_next_activation() {
        let task = Arc::new(CountingTask {
            count: AtomicUsize::new(0),
            stop_after: None,
            fail_on: None,
        });
        let handle = spawn_periodic(Arc::clone(&task) as Arc<dyn PeriodicTask>, Duration::from_millis(200));

        // Let the first cycle run, then shrink the period drastically.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(task.count.load(Ordering::SeqCst), 1);
        handle.period().set(Duration::from_millis(10));

        tokio::time::sleep(Duration::from_millis(300)).await;
        handle.stop().await;
        assert!(task.count.load(Ordering::SeqCst) > 3);
    }

    #[tokio::test]
    async fn stats_track_best_and_worst() {
        struct SleepyTask;

        #[async_trait]
        impl PeriodicTask for SleepyTask {
            fn name(&self) -> &str {
                "sleepy"
            }
            fn priority(&self) -> i32 {
                1
            }
            async fn execute(&self) -> Result<TaskFlow, AtcError> {
                tokio::time::sleep(Duration::from_millis(2)).await;
                Ok(TaskFlow::Continue)
            }
        }

        let handle = spawn_periodic(Arc::new(SleepyTask), Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.stop().await;

        let stats = handle.stats();
        let best = stats.best().expect("at least one cycle");
        let worst = stats.worst().expect("at least one cycle");
        assert!(best <= worst);
        assert!(worst >= Duration::from_millis(2));
    }
}
