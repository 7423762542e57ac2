//! Debounced, per-period report recomputation.
//!
//! Each period key moves through three states:
//!
//! - **Idle**: no timer armed.
//! - **Pending**: a timer is armed. Another trigger for the same key aborts it
//!   and arms a fresh one with the full delay, so a burst keeps pushing the
//!   deadline out.
//! - **Running**: the delay elapsed. The key leaves the pending set before the
//!   job starts, so a trigger that arrives now begins a new Pending cycle
//!   instead of cancelling the run in flight.
//!
//! Runs for the same key are serialized; runs for different keys are
//! independent and may overlap freely.

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::schema::Period;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, error, info};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Work performed when a period's debounce timer expires.
#[async_trait]
pub trait PeriodJob: Send + Sync + 'static {
    async fn run(&self, period: Period) -> Result<()>;
}

struct PendingRun {
    generation: u64,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct TimerRegistry {
    pending: HashMap<Period, PendingRun>,
    run_locks: HashMap<Period, Arc<tokio::sync::Mutex<()>>>,
    next_generation: u64,
}

fn lock(registry: &Mutex<TimerRegistry>) -> MutexGuard<'_, TimerRegistry> {
    registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct ReportScheduler {
    job: Arc<dyn PeriodJob>,
    delay: Duration,
    registry: Arc<Mutex<TimerRegistry>>,
    runtime: Handle,
}

impl ReportScheduler {
    /// Binds to the Tokio runtime of the calling context; panics outside one,
    /// as `tokio::spawn` does. Use [`ReportScheduler::with_runtime`] to
    /// construct from elsewhere.
    pub fn new(job: Arc<dyn PeriodJob>, config: &PipelineConfig) -> Self {
        Self::with_runtime(job, config, Handle::current())
    }

    pub fn with_runtime(job: Arc<dyn PeriodJob>, config: &PipelineConfig, runtime: Handle) -> Self {
        Self {
            job,
            delay: config.debounce_delay,
            registry: Arc::new(Mutex::new(TimerRegistry::default())),
            runtime,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Arms (or re-arms) the timer for `period` and returns immediately.
    pub fn schedule(&self, period: Period) {
        let mut registry = lock(&self.registry);
        registry.next_generation += 1;
        let generation = registry.next_generation;

        if let Some(previous) = registry.pending.remove(&period) {
            previous.handle.abort();
            debug!("Re-armed report timer for {} ({:?})", period, self.delay);
        } else {
            debug!("Armed report timer for {} ({:?})", period, self.delay);
        }

        let job = self.job.clone();
        let shared = self.registry.clone();
        let delay = self.delay;

        // Spawned while the registry lock is held, so the task cannot observe
        // the registry before its own entry is inserted below.
        let handle = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;

            let run_lock = {
                let mut registry = lock(&shared);
                match registry.pending.get(&period) {
                    Some(entry) if entry.generation == generation => {
                        registry.pending.remove(&period);
                    }
                    // Superseded after the sleep finished but before abort landed.
                    _ => return,
                }
                registry.run_locks.entry(period).or_default().clone()
            };

            {
                let _running = run_lock.lock().await;
                info!("Recomputing global report for {}", period);
                match job.run(period).await {
                    Ok(()) => info!("Global report for {} recomputed", period),
                    Err(e) => error!("Global report run for {} failed: {}", period, e),
                }
            }

            // Drop the lock entry once no other run holds or awaits it.
            let mut registry = lock(&shared);
            let idle = registry
                .run_locks
                .get(&period)
                .is_some_and(|held| Arc::ptr_eq(held, &run_lock) && Arc::strong_count(held) == 2);
            if idle {
                registry.run_locks.remove(&period);
            }
        });

        registry.pending.insert(period, PendingRun { generation, handle });
    }

    /// Schedules the period an expense dated `instant` belongs to.
    pub fn schedule_for(&self, instant: DateTime<Utc>) -> Result<Period> {
        let period = Period::of(instant)?;
        self.schedule(period);
        Ok(period)
    }

    pub fn is_pending(&self, period: Period) -> bool {
        lock(&self.registry).pending.contains_key(&period)
    }

    pub fn pending_periods(&self) -> Vec<Period> {
        let mut periods: Vec<Period> = lock(&self.registry).pending.keys().copied().collect();
        periods.sort();
        periods
    }

    /// Cancels every armed timer. Runs already in progress complete.
    pub fn shutdown(&self) {
        let mut registry = lock(&self.registry);
        let cancelled = registry.pending.len();
        for (_, pending) in registry.pending.drain() {
            pending.handle.abort();
        }
        if cancelled > 0 {
            info!("Cancelled {} pending report timer(s)", cancelled);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingJob {
        runs: Mutex<Vec<Period>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        work: Duration,
    }

    #[async_trait]
    impl PeriodJob for CountingJob {
        async fn run(&self, period: Period) -> Result<()> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if !self.work.is_zero() {
                tokio::time::sleep(self.work).await;
            }
            self.runs.lock().unwrap().push(period);
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn config() -> PipelineConfig {
        PipelineConfig::default().with_debounce_delay(Duration::from_secs(5))
    }

    fn march() -> Period {
        Period::new(3, 2024).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_coalesces_into_one_run() {
        let job = Arc::new(CountingJob::default());
        let scheduler = ReportScheduler::new(job.clone(), &config());

        for _ in 0..10 {
            scheduler.schedule(march());
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        assert!(scheduler.is_pending(march()));
        assert!(job.runs.lock().unwrap().is_empty());

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(*job.runs.lock().unwrap(), vec![march()]);
        assert!(!scheduler.is_pending(march()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_spaced_triggers_each_run() {
        let job = Arc::new(CountingJob::default());
        let scheduler = ReportScheduler::new(job.clone(), &config());

        for _ in 0..3 {
            scheduler.schedule(march());
            tokio::time::sleep(Duration::from_secs(6)).await;
        }
        assert_eq!(job.runs.lock().unwrap().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periods_are_independent() {
        let job = Arc::new(CountingJob::default());
        let scheduler = ReportScheduler::new(job.clone(), &config());
        let april = Period::new(4, 2024).unwrap();

        scheduler.schedule(march());
        scheduler.schedule(april);
        assert_eq!(scheduler.pending_periods(), vec![march(), april]);

        tokio::time::sleep(Duration::from_secs(3)).await;
        scheduler.schedule(april);
        tokio::time::sleep(Duration::from_secs(3)).await;

        // March fired on its own deadline; April was pushed back.
        assert_eq!(*job.runs.lock().unwrap(), vec![march()]);
        assert_eq!(scheduler.pending_periods(), vec![april]);

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(*job.runs.lock().unwrap(), vec![march(), april]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_during_run_starts_new_cycle_without_overlap() {
        let job = Arc::new(CountingJob {
            work: Duration::from_secs(20),
            ..CountingJob::default()
        });
        let scheduler = ReportScheduler::new(job.clone(), &config());

        scheduler.schedule(march());
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(job.in_flight.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_pending(march()));

        // Triggered mid-run: must not cancel the run in flight.
        scheduler.schedule(march());
        assert!(scheduler.is_pending(march()));

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(job.runs.lock().unwrap().len(), 2);
        assert_eq!(job.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_locks_released_after_runs() {
        let job = Arc::new(CountingJob {
            work: Duration::from_secs(20),
            ..CountingJob::default()
        });
        let scheduler = ReportScheduler::new(job.clone(), &config());

        scheduler.schedule(march());
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(lock(&scheduler.registry).run_locks.len(), 1);

        // Second cycle queues behind the first; the entry survives until both finish.
        scheduler.schedule(march());
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(lock(&scheduler.registry).run_locks.len(), 1);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(job.runs.lock().unwrap().len(), 2);
        assert!(lock(&scheduler.registry).run_locks.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_triggers_from_many_tasks_run_once() {
        let job = Arc::new(CountingJob::default());
        let config = PipelineConfig::default().with_debounce_delay(Duration::from_millis(500));
        let scheduler = Arc::new(ReportScheduler::new(job.clone(), &config));

        let triggers: Vec<_> = (0..64)
            .map(|_| {
                let scheduler = scheduler.clone();
                tokio::spawn(async move {
                    for _ in 0..20 {
                        scheduler.schedule(march());
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();
        for trigger in triggers {
            trigger.await.unwrap();
        }
        assert_eq!(scheduler.pending_periods(), vec![march()]);

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(*job.runs.lock().unwrap(), vec![march()]);
        assert_eq!(job.max_in_flight.load(Ordering::SeqCst), 1);
        assert!(scheduler.pending_periods().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_pending() {
        let job = Arc::new(CountingJob::default());
        let scheduler = ReportScheduler::new(job.clone(), &config());

        scheduler.schedule(march());
        scheduler.shutdown();
        assert!(scheduler.pending_periods().is_empty());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(job.runs.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_for_expense_date() {
        use chrono::TimeZone;

        let job = Arc::new(CountingJob::default());
        let scheduler = ReportScheduler::new(job.clone(), &config());

        let at = Utc.with_ymd_and_hms(2024, 3, 31, 23, 0, 0).unwrap();
        assert_eq!(scheduler.schedule_for(at).unwrap(), march());
        assert!(scheduler.is_pending(march()));

        let too_early = Utc.with_ymd_and_hms(2019, 3, 1, 0, 0, 0).unwrap();
        assert!(scheduler.schedule_for(too_early).is_err());
    }
}
