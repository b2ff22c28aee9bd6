// src/pipeline/scheduler.rs

//! Timer-driven refresh of every dataset with single-flight coordination.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{Notify, watch};

use crate::error::Result;
use crate::models::{DatasetType, SchedulerConfig, SnapshotMeta};
use crate::pipeline::refresh::{RefreshJob, commit_outcome};
use crate::storage::DatasetStore;

/// Run-in-progress flag plus a completion signal for one dataset.
#[derive(Debug, Default)]
pub struct SingleFlight {
    running: AtomicBool,
    done: Notify,
}

/// Held for the duration of a run; releasing it wakes waiters.
#[derive(Debug)]
pub struct FlightGuard {
    slot: Arc<SingleFlight>,
}

impl SingleFlight {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Claim the slot, or `None` when a run is already in flight.
    pub fn try_acquire(self: &Arc<Self>) -> Option<FlightGuard> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FlightGuard {
                slot: Arc::clone(self),
            })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Resolve once no run is in flight.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.done.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if !self.is_running() {
                return;
            }
            notified.await;
        }
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.slot.running.store(false, Ordering::Release);
        self.slot.done.notify_waiters();
    }
}

/// Outcome of a manual trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// A new run was spawned
    Started,
    /// A run was already in flight; this trigger folds into it
    Coalesced,
    /// No job is registered for the dataset
    Unknown,
}

#[derive(Clone)]
struct Slot {
    job: Arc<dyn RefreshJob>,
    flight: Arc<SingleFlight>,
}

/// Drives every registered job at its own interval.
pub struct RefreshScheduler {
    store: Arc<dyn DatasetStore>,
    slots: BTreeMap<DatasetType, Slot>,
    retry_backoff: Duration,
    run_on_start: bool,
    shutdown: watch::Sender<bool>,
}

impl RefreshScheduler {
    pub fn new(store: Arc<dyn DatasetStore>, config: &SchedulerConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            store,
            slots: BTreeMap::new(),
            retry_backoff: config.retry_backoff(),
            run_on_start: config.run_on_start,
            shutdown,
        }
    }

    /// Register a job; a later job for the same dataset replaces it.
    pub fn with_job(mut self, job: Arc<dyn RefreshJob>) -> Self {
        self.slots.insert(
            job.dataset(),
            Slot {
                job,
                flight: SingleFlight::new(),
            },
        );
        self
    }

    pub fn with_jobs(self, jobs: impl IntoIterator<Item = Arc<dyn RefreshJob>>) -> Self {
        jobs.into_iter().fold(self, Self::with_job)
    }

    pub fn datasets(&self) -> impl Iterator<Item = DatasetType> + '_ {
        self.slots.keys().copied()
    }

    /// Start a refresh now unless one is already running.
    pub fn trigger(self: &Arc<Self>, dataset: DatasetType) -> Trigger {
        let Some(slot) = self.slots.get(&dataset).cloned() else {
            return Trigger::Unknown;
        };
        let Some(guard) = slot.flight.try_acquire() else {
            log::debug!("Refresh of {} already in flight; trigger coalesced", dataset);
            return Trigger::Coalesced;
        };

        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            scheduler.refresh(&slot, guard).await;
        });
        Trigger::Started
    }

    /// Wait until no refresh of `dataset` is in flight.
    pub async fn wait_idle(&self, dataset: DatasetType) {
        if let Some(slot) = self.slots.get(&dataset) {
            slot.flight.wait_idle().await;
        }
    }

    /// Ask every timer loop and in-flight crawl to stop.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Run every timer loop until [`RefreshScheduler::shutdown`].
    pub async fn run(self: Arc<Self>) {
        log::info!(
            "Scheduler started for {} dataset(s), retry backoff {:?}",
            self.slots.len(),
            self.retry_backoff
        );
        let loops: Vec<_> = self
            .slots
            .keys()
            .map(|&dataset| tokio::spawn(Arc::clone(&self).timer_loop(dataset)))
            .collect();
        for handle in futures::future::join_all(loops).await {
            if let Err(err) = handle {
                log::error!("Scheduler loop panicked: {}", err);
            }
        }
        log::info!("Scheduler stopped");
    }

    async fn timer_loop(self: Arc<Self>, dataset: DatasetType) {
        let Some(slot) = self.slots.get(&dataset).cloned() else {
            return;
        };
        let interval = slot.job.interval();
        let mut shutdown = self.shutdown.subscribe();
        let mut delay = if self.run_on_start {
            Duration::ZERO
        } else {
            interval
        };

        loop {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.wait_for(|stop| *stop) => break,
            }

            delay = match slot.flight.try_acquire() {
                None => {
                    log::debug!("Timer for {} fired during a run; coalesced", dataset);
                    interval
                }
                Some(guard) => match self.refresh(&slot, guard).await {
                    Some(Ok(_)) => interval,
                    Some(Err(_)) => {
                        log::warn!("Rescheduling {} refresh in {:?}", dataset, self.retry_backoff);
                        self.retry_backoff
                    }
                    None => break,
                },
            };
        }
        log::debug!("Timer loop for {} stopped", dataset);
    }

    /// One guarded run. `None` when shutdown abandoned the crawl.
    ///
    /// Only the crawl is cancellable; once records are in hand the commit
    /// runs to completion.
    async fn refresh(&self, slot: &Slot, _guard: FlightGuard) -> Option<Result<SnapshotMeta>> {
        let dataset = slot.job.dataset();
        let mut shutdown = self.shutdown.subscribe();
        if self.is_shutting_down() {
            return None;
        }

        log::info!("Refreshing {}", dataset);
        let outcome = tokio::select! {
            outcome = slot.job.run() => outcome,
            _ = shutdown.wait_for(|stop| *stop) => {
                log::warn!("Shutdown: abandoning in-flight {} crawl", dataset);
                return None;
            }
        };

        let result = match outcome {
            Ok(outcome) => commit_outcome(self.store.as_ref(), dataset, outcome).await,
            Err(err) => Err(err),
        };
        if let Err(err) = &result {
            log::error!(
                "Refresh of {} failed: {}; previous snapshot keeps serving",
                dataset,
                err
            );
        }
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use chrono::Utc;

    use crate::error::AppError;
    use crate::models::{CrawlOutcome, CrawlReport, EolRecord, Record, Snapshot};
    use crate::storage::HistoryEntry;
    use crate::storage::local::checksum;

    #[derive(Default)]
    struct MemoryStore {
        snapshots: Mutex<HashMap<DatasetType, Arc<Snapshot>>>,
    }

    #[async_trait]
    impl DatasetStore for MemoryStore {
        async fn commit(
            &self,
            dataset: DatasetType,
            records: Vec<Record>,
            report: CrawlReport,
        ) -> Result<SnapshotMeta> {
            let mut snapshots = self.snapshots.lock().unwrap();
            let version = snapshots.get(&dataset).map_or(0, |s| s.version()) + 1;
            let meta = SnapshotMeta {
                dataset,
                version,
                committed_at: Utc::now(),
                checksum: checksum(&records)?,
                record_count: records.len(),
                complete: report.is_complete(),
                report,
            };
            snapshots.insert(
                dataset,
                Arc::new(Snapshot {
                    meta: meta.clone(),
                    records,
                }),
            );
            Ok(meta)
        }

        async fn read(&self, dataset: DatasetType) -> Result<Option<Arc<Snapshot>>> {
            Ok(self.snapshots.lock().unwrap().get(&dataset).cloned())
        }

        async fn history(&self, dataset: DatasetType) -> Result<Vec<HistoryEntry>> {
            Ok(self
                .snapshots
                .lock()
                .unwrap()
                .get(&dataset)
                .map(|s| HistoryEntry {
                    version: s.version(),
                    archived: false,
                })
                .into_iter()
                .collect())
        }
    }

    /// Sleeps for `duration`, failing the first `failures` runs.
    struct ScriptedJob {
        duration: Duration,
        interval: Duration,
        failures: usize,
        runs: AtomicUsize,
    }

    impl ScriptedJob {
        fn new(duration: Duration, interval: Duration, failures: usize) -> Arc<Self> {
            Arc::new(Self {
                duration,
                interval,
                failures,
                runs: AtomicUsize::new(0),
            })
        }

        fn runs(&self) -> usize {
            self.runs.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RefreshJob for ScriptedJob {
        fn dataset(&self) -> DatasetType {
            DatasetType::Eol
        }

        fn interval(&self) -> Duration {
            self.interval
        }

        async fn run(&self) -> Result<CrawlOutcome> {
            let run = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(self.duration).await;
            if run <= self.failures {
                return Err(AppError::crawl("eol", "upstream unavailable"));
            }
            let mut report = CrawlReport::new(DatasetType::Eol);
            report.complete_branch("query:all");
            Ok(CrawlOutcome {
                records: vec![Record::Eol(EolRecord::new("WS-C3750X-48P-S"))],
                report,
            })
        }
    }

    fn scheduler(
        store: Arc<MemoryStore>,
        job: Arc<ScriptedJob>,
        run_on_start: bool,
    ) -> Arc<RefreshScheduler> {
        let config = SchedulerConfig {
            retry_backoff_secs: 60,
            run_on_start,
        };
        Arc::new(RefreshScheduler::new(store, &config).with_job(job))
    }

    #[test]
    fn test_single_flight_guard_releases() {
        let slot = SingleFlight::new();
        let guard = slot.try_acquire().unwrap();
        assert!(slot.is_running());
        assert!(slot.try_acquire().is_none());
        drop(guard);
        assert!(!slot.is_running());
        assert!(slot.try_acquire().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_coalesces_while_running() {
        let store = Arc::new(MemoryStore::default());
        let job = ScriptedJob::new(Duration::from_secs(10), Duration::from_secs(3600), 0);
        let scheduler = scheduler(Arc::clone(&store), Arc::clone(&job), false);

        assert_eq!(scheduler.trigger(DatasetType::Eol), Trigger::Started);
        tokio::task::yield_now().await;
        assert_eq!(scheduler.trigger(DatasetType::Eol), Trigger::Coalesced);
        assert_eq!(scheduler.trigger(DatasetType::Eol), Trigger::Coalesced);

        tokio::time::sleep(Duration::from_secs(11)).await;
        scheduler.wait_idle(DatasetType::Eol).await;
        assert_eq!(job.runs(), 1);
        let snapshot = store.read(DatasetType::Eol).await.unwrap().unwrap();
        assert_eq!(snapshot.version(), 1);

        assert_eq!(scheduler.trigger(DatasetType::Eol), Trigger::Started);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_dataset() {
        let store = Arc::new(MemoryStore::default());
        let job = ScriptedJob::new(Duration::ZERO, Duration::from_secs(3600), 0);
        let scheduler = scheduler(store, job, false);
        assert_eq!(scheduler.trigger(DatasetType::Products), Trigger::Unknown);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_retries_after_backoff() {
        let store = Arc::new(MemoryStore::default());
        let job = ScriptedJob::new(Duration::ZERO, Duration::from_secs(3600), 1);
        let scheduler = scheduler(Arc::clone(&store), Arc::clone(&job), true);
        let handle = tokio::spawn(Arc::clone(&scheduler).run());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(job.runs(), 1);
        assert!(store.read(DatasetType::Eol).await.unwrap().is_none());

        // retried after the 60 s backoff, well before the hourly interval
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(job.runs(), 2);
        assert!(store.read(DatasetType::Eol).await.unwrap().is_some());

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(job.runs(), 2);

        scheduler.shutdown();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_discards_in_flight_run() {
        let store = Arc::new(MemoryStore::default());
        let job = ScriptedJob::new(Duration::from_secs(100), Duration::from_secs(3600), 0);
        let scheduler = scheduler(Arc::clone(&store), Arc::clone(&job), false);

        assert_eq!(scheduler.trigger(DatasetType::Eol), Trigger::Started);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(job.runs(), 1);

        scheduler.shutdown();
        scheduler.wait_idle(DatasetType::Eol).await;
        assert!(store.read(DatasetType::Eol).await.unwrap().is_none());
    }
}
