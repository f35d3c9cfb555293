//! Named background tasks: the daily sweeps and journal compaction.
//!
//! Each task runs on its own schedule, can be triggered by name, and is
//! retried with bounded backoff when a run fails. Tasks share nothing but the
//! store.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, Utc};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::clock::{next_local_occurrence, Clock};
use crate::engine::{Engine, EngineError};
use crate::limits::{COMPACT_CHECK_INTERVAL, TASK_MAX_ATTEMPTS, TASK_RETRY_BASE, TASK_RETRY_CAP};
use crate::observability::{JOURNAL_COMPACTIONS_TOTAL, SWEEP_ROWS_TOTAL, TASK_RUNS_TOTAL};
use crate::store::{InMemoryStore, StoreError};

pub const REMOVE_PAST_RESERVATIONS: &str = "remove-past-reservations";
pub const FINALIZE_TOURNAMENTS: &str = "finalize-tournaments";
pub const COMPACT_JOURNAL: &str = "compact-journal";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// Once a day at this facility-local wall-clock time.
    DailyAt(NaiveTime),
    Every(Duration),
}

impl Schedule {
    /// The first due instant strictly after `now`.
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Schedule::DailyAt(at) => next_local_occurrence(now, *at),
            Schedule::Every(every) => chrono::Duration::from_std(*every)
                .ok()
                .and_then(|d| now.checked_add_signed(d))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }
}

#[derive(Debug, Error)]
pub enum TaskError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("{failures} rows could not be updated")]
    Partial { failures: usize },
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("unknown task: {0}")]
    UnknownTask(String),
    #[error("task {task} failed after {attempts} attempts: {source}")]
    Exhausted {
        task: &'static str,
        attempts: u32,
        source: TaskError,
    },
}

/// One unit of recurring work. `run` must be idempotent.
#[async_trait]
pub trait Task: Send + Sync {
    fn name(&self) -> &'static str;
    fn schedule(&self) -> Schedule;
    /// Returns how many rows the run touched.
    async fn run(&self) -> Result<usize, TaskError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: TASK_MAX_ATTEMPTS,
            base_delay: TASK_RETRY_BASE,
            max_delay: TASK_RETRY_CAP,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based): base, 2·base, 4·base, … capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

pub struct Scheduler {
    tasks: Vec<Arc<dyn Task>>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
}

impl Scheduler {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            tasks: Vec::new(),
            clock,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Add a task; one with the same name is replaced.
    pub fn register(&mut self, task: Arc<dyn Task>) {
        if let Some(slot) = self.tasks.iter_mut().find(|t| t.name() == task.name()) {
            warn!("scheduler: replacing task {}", task.name());
            *slot = task;
        } else {
            self.tasks.push(task);
        }
    }

    pub fn task_names(&self) -> Vec<&'static str> {
        self.tasks.iter().map(|t| t.name()).collect()
    }

    /// Run a task now, with retries, independent of its schedule.
    pub async fn trigger(&self, name: &str) -> Result<usize, SchedulerError> {
        let task = self
            .tasks
            .iter()
            .find(|t| t.name() == name)
            .ok_or_else(|| SchedulerError::UnknownTask(name.to_string()))?;
        self.run_with_retry(task.as_ref()).await
    }

    async fn run_with_retry(&self, task: &dyn Task) -> Result<usize, SchedulerError> {
        let name = task.name();
        let mut attempt = 1;
        loop {
            match task.run().await {
                Ok(rows) => {
                    metrics::counter!(TASK_RUNS_TOTAL, "task" => name, "status" => "ok").increment(1);
                    metrics::counter!(SWEEP_ROWS_TOTAL, "task" => name).increment(rows as u64);
                    if rows > 0 {
                        info!("[{name}] done, {rows} rows");
                    } else {
                        debug!("[{name}] done, nothing to do");
                    }
                    return Ok(rows);
                }
                Err(e) => {
                    metrics::counter!(TASK_RUNS_TOTAL, "task" => name, "status" => "error").increment(1);
                    if attempt >= self.retry.max_attempts {
                        error!("[{name}] giving up after {attempt} attempts: {e}");
                        return Err(SchedulerError::Exhausted {
                            task: name,
                            attempts: attempt,
                            source: e,
                        });
                    }
                    let delay = self.retry.delay_for(attempt);
                    warn!("[{name}] attempt {attempt} failed: {e}; retrying in {delay:?}");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Start one loop per task. Loops exit when `shutdown` flips to true or its sender drops.
    pub fn spawn(self: Arc<Self>, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        self.tasks
            .iter()
            .cloned()
            .map(|task| {
                let scheduler = self.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move { scheduler.task_loop(task, shutdown).await })
            })
            .collect()
    }

    async fn task_loop(&self, task: Arc<dyn Task>, mut shutdown: watch::Receiver<bool>) {
        let name = task.name();
        let schedule = task.schedule();
        match schedule {
            Schedule::DailyAt(at) => {
                info!("[{name}] scheduled daily at {at} facility time");
                loop {
                    let now = self.clock.now();
                    let due = schedule.next_after(now);
                    let wait = (due - now).to_std().unwrap_or_default();
                    tokio::select! {
                        _ = tokio::time::sleep(wait) => {}
                        _ = shutdown.changed() => break,
                    }
                    // Failures are logged; the next occurrence tries again.
                    let _ = self.run_with_retry(task.as_ref()).await;
                }
            }
            Schedule::Every(every) => {
                info!("[{name}] scheduled every {every:?}");
                let mut ticker = interval_at(Instant::now() + every, every);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {}
                        _ = shutdown.changed() => break,
                    }
                    let _ = self.run_with_retry(task.as_ref()).await;
                }
            }
        }
        debug!("[{name}] stopped");
    }
}

// ── Tasks ────────────────────────────────────────────────────────

/// Delete reservations whose start has passed.
pub struct RemovePastReservations {
    engine: Arc<Engine>,
    at: NaiveTime,
}

impl RemovePastReservations {
    pub fn new(engine: Arc<Engine>, at: NaiveTime) -> Self {
        Self { engine, at }
    }
}

#[async_trait]
impl Task for RemovePastReservations {
    fn name(&self) -> &'static str {
        REMOVE_PAST_RESERVATIONS
    }

    fn schedule(&self) -> Schedule {
        Schedule::DailyAt(self.at)
    }

    async fn run(&self) -> Result<usize, TaskError> {
        Ok(self.engine.purge_past_reservations().await?)
    }
}

/// Finish tournaments whose day is over, cascading to registrations.
pub struct FinalizeTournaments {
    engine: Arc<Engine>,
    at: NaiveTime,
}

impl FinalizeTournaments {
    pub fn new(engine: Arc<Engine>, at: NaiveTime) -> Self {
        Self { engine, at }
    }
}

#[async_trait]
impl Task for FinalizeTournaments {
    fn name(&self) -> &'static str {
        FINALIZE_TOURNAMENTS
    }

    fn schedule(&self) -> Schedule {
        Schedule::DailyAt(self.at)
    }

    async fn run(&self) -> Result<usize, TaskError> {
        let report = self.engine.finalize_past_tournaments().await?;
        if report.failures > 0 {
            return Err(TaskError::Partial {
                failures: report.failures,
            });
        }
        Ok(report.tournaments + report.registrations)
    }
}

/// Rewrite the journal once enough appends have piled up.
pub struct CompactJournal {
    store: Arc<InMemoryStore>,
    threshold: u64,
}

impl CompactJournal {
    pub fn new(store: Arc<InMemoryStore>, threshold: u64) -> Self {
        Self { store, threshold }
    }
}

#[async_trait]
impl Task for CompactJournal {
    fn name(&self) -> &'static str {
        COMPACT_JOURNAL
    }

    fn schedule(&self) -> Schedule {
        Schedule::Every(COMPACT_CHECK_INTERVAL)
    }

    async fn run(&self) -> Result<usize, TaskError> {
        if self.store.compact_if_needed(self.threshold).await? {
            metrics::counter!(JOURNAL_COMPACTIONS_TOTAL).increment(1);
            return Ok(1);
        }
        Ok(0)
    }
}
