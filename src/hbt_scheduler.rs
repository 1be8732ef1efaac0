// Poll scheduler: drives reconciliation cycles on a timer and on filter changes
//
// Cycles are serialized by `cycle_lock`. A timer tick that finds a cycle in
// flight is dropped; a filter change waits for the in-flight cycle and then
// runs its own. The tracked set and the filter live behind one mutex that is
// held only while a fetched snapshot is applied, and the shutdown token is
// checked under that mutex so nothing reaches the display sink after `stop`.

use crate::hbt_engine::{DisplaySink, ReconciliationEngine};
use crate::hbt_feed::FeedClient;
use crate::hbt_filter::{self, FilterState};
use crate::hbt_models::{CycleReport, CycleTrigger, HBTError, Result, TrackedEntity};
use crate::hbt_normalizer::SnapshotNormalizer;
use crate::hbt_views::HBTViews;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Polling,
    Stopped,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub cycles_applied: u64,
    pub cycles_failed: u64,
    pub ticks_dropped: u64,
}

#[derive(Default)]
struct Counters {
    cycles_applied: AtomicU64,
    cycles_failed: AtomicU64,
    ticks_dropped: AtomicU64,
}

struct TrackerState<S: DisplaySink> {
    engine: ReconciliationEngine<S>,
    filter: FilterState,
}

struct Shared<C: FeedClient, S: DisplaySink> {
    client: C,
    normalizer: SnapshotNormalizer,
    state: Mutex<TrackerState<S>>,
    cycle_lock: Arc<Mutex<()>>,
    shutdown: CancellationToken,
    started: AtomicBool,
    counters: Counters,
}

pub struct PollScheduler<C: FeedClient, S: DisplaySink> {
    shared: Arc<Shared<C, S>>,
    task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl<C, S> PollScheduler<C, S>
where
    C: FeedClient + 'static,
    S: DisplaySink + 'static,
{
    pub fn new(client: C, normalizer: SnapshotNormalizer, sink: S, filter: FilterState) -> Self {
        PollScheduler {
            shared: Arc::new(Shared {
                client,
                normalizer,
                state: Mutex::new(TrackerState {
                    engine: ReconciliationEngine::new(sink),
                    filter,
                }),
                cycle_lock: Arc::new(Mutex::new(())),
                shutdown: CancellationToken::new(),
                started: AtomicBool::new(false),
                counters: Counters::default(),
            }),
            task: std::sync::Mutex::new(None),
        }
    }

    /// Run one cycle right away, then one per `interval`. Must be called
    /// inside a tokio runtime.
    pub fn start(&self, interval: Duration) -> Result<()> {
        if interval.is_zero() {
            return Err(HBTError::Config("poll interval must be non-zero".to_string()));
        }
        if self.shared.shutdown.is_cancelled() {
            return Err(HBTError::Lifecycle("scheduler was stopped".to_string()));
        }
        if self.shared.started.swap(true, Ordering::SeqCst) {
            return Err(HBTError::Lifecycle("scheduler already started".to_string()));
        }

        log::info!("Polling feed every {:?}", interval);
        let handle = tokio::spawn(poll_loop(self.shared.clone(), interval));
        if let Ok(mut task) = self.task.lock() {
            *task = Some(handle);
        }
        Ok(())
    }

    /// Idempotent. Once this returns the display sink receives no further
    /// instructions; a fetch still in flight completes and is discarded.
    pub async fn stop(&self) {
        if !self.shared.shutdown.is_cancelled() {
            log::info!("Stopping poll scheduler");
        }
        self.shared.shutdown.cancel();

        // Wait out a cycle that is applying results right now.
        drop(self.shared.state.lock().await);

        let task = self.task.lock().ok().and_then(|mut task| task.take());
        if let Some(task) = task {
            if let Err(e) = task.await {
                log::warn!("Poll task ended abnormally: {}", e);
            }
        }
    }

    /// Replace the filter and, while running, reconcile against it right away.
    /// Waits for an in-flight cycle instead of overlapping it.
    pub async fn set_filter(&self, filter: FilterState) -> Result<Option<CycleReport>> {
        {
            let mut state = self.shared.state.lock().await;
            log::info!("Filter changed: {} -> {}", state.filter, filter);
            state.filter = filter;
        }

        if !self.is_running() {
            return Ok(None);
        }

        let _guard = self.shared.cycle_lock.lock().await;
        self.shared.run_cycle(CycleTrigger::FilterChange).await
    }

    /// One out-of-band cycle against the current filter. Allowed before
    /// `start`; a no-op after `stop`.
    pub async fn refresh(&self) -> Result<Option<CycleReport>> {
        let _guard = self.shared.cycle_lock.lock().await;
        self.shared.run_cycle(CycleTrigger::Manual).await
    }

    pub fn is_running(&self) -> bool {
        self.shared.started.load(Ordering::SeqCst) && !self.shared.shutdown.is_cancelled()
    }

    pub fn state(&self) -> SchedulerState {
        if self.shared.shutdown.is_cancelled() {
            SchedulerState::Stopped
        } else if self.shared.cycle_lock.try_lock().is_err() {
            SchedulerState::Polling
        } else {
            SchedulerState::Idle
        }
    }

    pub async fn filter(&self) -> FilterState {
        self.shared.state.lock().await.filter.clone()
    }

    /// Snapshot of the tracked set, sorted by id.
    pub async fn tracked(&self) -> Vec<TrackedEntity> {
        let state = self.shared.state.lock().await;
        state.engine.tracked().into_iter().cloned().collect()
    }

    /// Read access to the engine and its sink.
    pub async fn inspect<R>(&self, f: impl FnOnce(&ReconciliationEngine<S>) -> R) -> R {
        let state = self.shared.state.lock().await;
        f(&state.engine)
    }

    pub fn stats(&self) -> SchedulerStats {
        let counters = &self.shared.counters;
        SchedulerStats {
            cycles_applied: counters.cycles_applied.load(Ordering::Relaxed),
            cycles_failed: counters.cycles_failed.load(Ordering::Relaxed),
            ticks_dropped: counters.ticks_dropped.load(Ordering::Relaxed),
        }
    }
}

impl<C: FeedClient, S: DisplaySink> Drop for PollScheduler<C, S> {
    fn drop(&mut self) {
        self.shared.shutdown.cancel();
    }
}

async fn poll_loop<C, S>(shared: Arc<Shared<C, S>>, interval: Duration)
where
    C: FeedClient + 'static,
    S: DisplaySink + 'static,
{
    // The first tick completes immediately.
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shared.shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let guard = match shared.cycle_lock.clone().try_lock_owned() {
            Ok(guard) => guard,
            Err(_) => {
                shared.counters.ticks_dropped.fetch_add(1, Ordering::Relaxed);
                log::debug!("Previous cycle still in flight, dropping tick");
                continue;
            }
        };

        let cycle = shared.clone();
        tokio::spawn(async move {
            let _guard = guard;
            // Failures are logged inside; the next tick polls again.
            let _ = cycle.run_cycle(CycleTrigger::Tick).await;
        });
    }

    log::debug!("Poll loop exited");
}

impl<C: FeedClient, S: DisplaySink> Shared<C, S> {
    /// Caller holds `cycle_lock`. `Ok(None)` means the result was discarded
    /// because the scheduler stopped.
    async fn run_cycle(&self, trigger: CycleTrigger) -> Result<Option<CycleReport>> {
        if self.shutdown.is_cancelled() {
            return Ok(None);
        }

        let fetched = self.client.fetch_snapshot().await.map_err(HBTError::from);
        let snapshot = fetched.and_then(|raw| self.normalizer.normalize(&raw));

        let mut state = self.state.lock().await;
        if self.shutdown.is_cancelled() {
            log::debug!("Scheduler stopped during {} cycle, discarding result", trigger);
            return Ok(None);
        }

        let snapshot = match snapshot {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.counters.cycles_failed.fetch_add(1, Ordering::Relaxed);
                log::warn!("Skipping {} cycle: {}", trigger, e);
                return Err(e);
            }
        };

        let filtered = hbt_filter::select(&snapshot.records, &state.filter);
        let no_match = state.filter.is_single_route() && filtered.is_empty();
        let changes = state.engine.reconcile(&filtered);

        let report = CycleReport {
            trigger,
            changes,
            vehicles_in_feed: snapshot.records.len(),
            dropped_records: snapshot.dropped,
            tracked: state.engine.len(),
            no_match,
            feed_timestamp: snapshot.timestamp,
        };
        drop(state);

        self.counters.cycles_applied.fetch_add(1, Ordering::Relaxed);
        log::info!("{}", HBTViews::cycle_summary(&report));
        Ok(Some(report))
    }
}
