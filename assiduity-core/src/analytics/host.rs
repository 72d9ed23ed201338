//! Background host for statistics runs
//!
//! The caller never aggregates on its own thread. [`StatsHost::submit`]
//! starts a worker thread for one filter and returns a [`StatsRun`] that
//! streams [`RunEvent`]s: zero or more progress stages, then exactly one
//! terminal `Completed` or `Failed`.
//!
//! ```text
//!  submit(filter) ──► join previous worker ──► spawn worker(run_id)
//!                                                  │
//!        StatsRun ◄── mpsc: Progress.., Completed/Failed
//!                                                  │
//!   latest()/subscribe() ◄── watch: newest (run_id, snapshot)
//! ```
//!
//! At most one worker exists at a time: a new submission waits for the
//! previous worker to finish before starting. Completed snapshots are
//! published through a `watch` channel, and only when their run id is newer
//! than the one already published, so a late run never overwrites a newer
//! result. A failed run publishes nothing; the previous snapshot stays.

use super::engine::{AggregationEngine, Stage, StatsInput};
use super::filter::StatsFilter;
use super::rates::RateSource;
use super::snapshot::StatsSnapshot;
use crate::config::StatsConfig;
use crate::error::{Error, Result};
use crate::store::{AttendanceStore, Registry};
use chrono::Local;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use tokio::sync::{mpsc, watch};

/// One event of a statistics run.
#[derive(Debug, Clone)]
pub enum RunEvent {
    Progress(Stage),
    Completed(Arc<StatsSnapshot>),
    Failed(String),
}

impl RunEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunEvent::Progress(_))
    }
}

/// Whether a worker is currently computing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
}

/// The newest completed snapshot and the run that produced it.
#[derive(Debug, Clone)]
pub struct Published {
    pub run_id: u64,
    pub snapshot: Arc<StatsSnapshot>,
}

/// Handle on one submitted run.
pub struct StatsRun {
    id: u64,
    filter: StatsFilter,
    events: mpsc::UnboundedReceiver<RunEvent>,
}

impl StatsRun {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn filter(&self) -> StatsFilter {
        self.filter
    }

    /// Next event, or `None` once the run has ended and every event was read.
    pub async fn next_event(&mut self) -> Option<RunEvent> {
        self.events.recv().await
    }

    /// Next event if one is ready, without waiting.
    pub fn try_next_event(&mut self) -> Option<RunEvent> {
        self.events.try_recv().ok()
    }

    /// Block until the run ends.
    ///
    /// Must not be called from within an async runtime; use
    /// [`next_event`](Self::next_event) there.
    pub fn wait(self) -> Result<Arc<StatsSnapshot>> {
        self.wait_with_progress(|_| {})
    }

    /// Block until the run ends, reporting each progress stage.
    pub fn wait_with_progress(
        mut self,
        mut on_stage: impl FnMut(Stage),
    ) -> Result<Arc<StatsSnapshot>> {
        while let Some(event) = self.events.blocking_recv() {
            match event {
                RunEvent::Progress(stage) => on_stage(stage),
                RunEvent::Completed(snapshot) => return Ok(snapshot),
                RunEvent::Failed(message) => return Err(Error::Worker(message)),
            }
        }
        Err(Error::Worker(format!(
            "statistics run {} ended without a result",
            self.id
        )))
    }
}

/// Runs statistics computations off the caller's thread.
pub struct StatsHost {
    store: Arc<dyn AttendanceStore>,
    rates: Arc<dyn RateSource>,
    engine: Arc<AggregationEngine>,
    last_run_id: AtomicU64,
    worker: Mutex<Option<JoinHandle<()>>>,
    published: Arc<watch::Sender<Option<Published>>>,
}

impl StatsHost {
    pub fn new(
        store: Arc<dyn AttendanceStore>,
        rates: Arc<dyn RateSource>,
        engine: AggregationEngine,
    ) -> Self {
        let (published, _) = watch::channel(None);
        Self {
            store,
            rates,
            engine: Arc::new(engine),
            last_run_id: AtomicU64::new(0),
            worker: Mutex::new(None),
            published: Arc::new(published),
        }
    }

    /// Host reading through `registry`, so its rates always reflect the
    /// registry's latest writes.
    pub fn for_registry(registry: &Registry, config: StatsConfig) -> Self {
        Self::new(
            registry.store(),
            registry.rates(),
            AggregationEngine::new(config),
        )
    }

    /// Start a run for `filter`.
    ///
    /// Blocks until the previous worker, if any, has finished.
    pub fn submit(&self, filter: StatsFilter) -> Result<StatsRun> {
        let mut worker = self.worker_slot();
        if let Some(previous) = worker.take() {
            join_worker(previous);
        }

        let run_id = self.last_run_id.fetch_add(1, Ordering::AcqRel) + 1;
        let (tx, rx) = mpsc::unbounded_channel();
        let job = Job {
            run_id,
            filter,
            store: Arc::clone(&self.store),
            rates: Arc::clone(&self.rates),
            engine: Arc::clone(&self.engine),
            published: Arc::clone(&self.published),
            events: tx,
        };

        tracing::debug!(run_id, group_id = ?filter.group_id, period = %filter.period, "Submitting statistics run");

        let handle = thread::Builder::new()
            .name(format!("assiduity-stats-{run_id}"))
            .spawn(move || job.run())?;
        *worker = Some(handle);

        Ok(StatsRun {
            id: run_id,
            filter,
            events: rx,
        })
    }

    /// The newest published snapshot.
    pub fn latest(&self) -> Option<Published> {
        self.published.borrow().clone()
    }

    /// Receiver notified whenever a newer snapshot is published.
    pub fn subscribe(&self) -> watch::Receiver<Option<Published>> {
        self.published.subscribe()
    }

    pub fn run_state(&self) -> RunState {
        match self.worker_slot().as_ref() {
            Some(handle) if !handle.is_finished() => RunState::Running,
            _ => RunState::Idle,
        }
    }

    fn worker_slot(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.worker.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for StatsHost {
    fn drop(&mut self) {
        if let Some(handle) = self.worker_slot().take() {
            join_worker(handle);
        }
    }
}

fn join_worker(handle: JoinHandle<()>) {
    if handle.join().is_err() {
        tracing::error!("Statistics worker panicked");
    }
}

/// Everything a worker thread owns for one run.
struct Job {
    run_id: u64,
    filter: StatsFilter,
    store: Arc<dyn AttendanceStore>,
    rates: Arc<dyn RateSource>,
    engine: Arc<AggregationEngine>,
    published: Arc<watch::Sender<Option<Published>>>,
    events: mpsc::UnboundedSender<RunEvent>,
}

impl Job {
    fn run(self) {
        let run_id = self.run_id;
        self.emit(RunEvent::Progress(Stage::LoadingData));

        let now = Local::now();
        let input = match StatsInput::load(self.store.as_ref(), self.filter, now.naive_local()) {
            Ok(input) => input,
            Err(e) => {
                tracing::error!(run_id, error = %e, "Statistics run failed");
                self.emit(RunEvent::Failed(e.to_string()));
                return;
            }
        };

        let snapshot = Arc::new(self.engine.compute_with_progress(
            &input,
            self.rates.as_ref(),
            now,
            &mut |stage| self.emit(RunEvent::Progress(stage)),
        ));

        self.publish(Arc::clone(&snapshot));
        self.emit(RunEvent::Progress(Stage::Done));
        self.emit(RunEvent::Completed(snapshot));
    }

    fn publish(&self, snapshot: Arc<StatsSnapshot>) {
        let run_id = self.run_id;
        let replaced = self.published.send_if_modified(|current| {
            if current.as_ref().is_some_and(|p| p.run_id >= run_id) {
                return false;
            }
            *current = Some(Published { run_id, snapshot });
            true
        });
        if replaced {
            tracing::debug!(run_id, "Statistics snapshot published");
        } else {
            tracing::debug!(run_id, "Newer snapshot already published; result dropped");
        }
    }

    fn emit(&self, event: RunEvent) {
        // The caller may have dropped its StatsRun; the run still completes
        if self.events.send(event).is_err() {
            tracing::trace!(run_id = self.run_id, "Run handle dropped");
        }
    }
}
