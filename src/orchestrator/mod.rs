//! Task orchestration: drive one remote job from "start" to a known outcome.
//!
//! - [`backend`] - Remote job executor seam and its transport-backed implementation
//! - `polling` - The completion polling loop
//!
//! One [`TaskOrchestrator`] tracks at most one job at a time. Starting a task
//! cancels whatever the orchestrator was doing before, issues the start call
//! and, if it succeeded, spawns a polling loop that ends when the status
//! endpoint reports `is_working = false` or the safety timeout elapses. The
//! outcome is delivered once through the returned [`TaskCompletion`].
//!
//! Every cycle carries a generation number. Stopping, resetting or starting
//! again bumps it, so a loop or start call that belongs to an older cycle can
//! never touch the state of the current one.

pub mod backend;
mod polling;


pub use backend::{JobBackend, TransportJobBackend, WorkingStatus};

use crate::config::PollingConfig;
use crate::error::{Error, Result};
use crate::types::{EntityId, Event, JobHandle, JobSpec, JobState, TaskOutcome, TaskStatus};
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{broadcast, oneshot, watch};
use tokio_util::sync::CancellationToken;

/// Resolves when the polling cycle it was handed out for concludes
#[derive(Debug)]
pub struct TaskCompletion {
    entity_id: EntityId,
    rx: oneshot::Receiver<TaskOutcome>,
}

impl TaskCompletion {
    /// Entity of the tracked job
    pub fn entity_id(&self) -> EntityId {
        self.entity_id
    }

    /// Wait for the outcome of the cycle.
    ///
    /// Returns `None` if the cycle was stopped, reset or superseded before it
    /// concluded. [`TaskOutcome::TimedOut`] means "stop waiting", not success.
    pub async fn wait(self) -> Option<TaskOutcome> {
        self.rx.await.ok()
    }
}

struct Inner {
    state: JobState,
    job: Option<JobHandle>,
    is_polling: bool,
    completion_fired: bool,
    completion_tx: Option<oneshot::Sender<TaskOutcome>>,
    cancel: Option<CancellationToken>,
    generation: u64,
}

/// State shared between an orchestrator and the loop it spawned
pub(crate) struct Shared {
    inner: Mutex<Inner>,
    status_tx: watch::Sender<TaskStatus>,
    event_tx: broadcast::Sender<Event>,
}

impl Shared {
    fn new(event_tx: broadcast::Sender<Event>) -> Self {
        let (status_tx, _) = watch::channel(TaskStatus::default());
        Self {
            inner: Mutex::new(Inner {
                state: JobState::Idle,
                job: None,
                is_polling: false,
                completion_fired: false,
                completion_tx: None,
                cancel: None,
                generation: 0,
            }),
            status_tx,
            event_tx,
        }
    }

    /// Record a positive status check of cycle `generation`
    pub(crate) fn mark_working(&self, generation: u64) {
        let inner = self.inner.lock();
        if inner.generation == generation && !inner.completion_fired {
            self.status_tx.send_if_modified(|s| {
                let changed = !s.is_working;
                s.is_working = true;
                changed
            });
        }
    }

    /// Conclude cycle `generation` with `outcome`.
    ///
    /// Returns false without doing anything if the cycle is stale or has
    /// already concluded, so the completion fires at most once per cycle.
    pub(crate) fn conclude(
        &self,
        generation: u64,
        outcome: TaskOutcome,
        warning: Option<String>,
        event: Event,
    ) -> bool {
        let mut inner = self.inner.lock();
        if inner.generation != generation || inner.completion_fired {
            return false;
        }

        inner.completion_fired = true;
        inner.is_polling = false;
        if let Some(token) = inner.cancel.take() {
            token.cancel();
        }
        inner.job = None;
        inner.state = match outcome {
            TaskOutcome::Completed => JobState::Completed,
            TaskOutcome::TimedOut => JobState::TimedOut,
        };

        self.status_tx.send_modify(|s| {
            s.is_working = false;
            s.is_loading = false;
            s.last_error = warning;
        });
        self.event_tx.send(event).ok();

        if let Some(tx) = inner.completion_tx.take() {
            tx.send(outcome).ok();
        }
        true
    }
}

/// Drives one remote job at a time and exposes `{is_working, is_loading, last_error}`
///
/// Dropping the orchestrator stops its polling loop.
pub struct TaskOrchestrator {
    backend: Arc<dyn JobBackend>,
    config: PollingConfig,
    shared: Arc<Shared>,
}

impl TaskOrchestrator {
    /// Create an idle orchestrator
    pub fn new(
        backend: Arc<dyn JobBackend>,
        config: PollingConfig,
        event_tx: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            backend,
            config,
            shared: Arc::new(Shared::new(event_tx)),
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> JobState {
        self.shared.inner.lock().state.clone()
    }

    /// Snapshot of the observable status
    pub fn status(&self) -> TaskStatus {
        self.shared.status_tx.borrow().clone()
    }

    /// Watch the observable status
    pub fn subscribe_status(&self) -> watch::Receiver<TaskStatus> {
        self.shared.status_tx.subscribe()
    }

    /// Subscribe to the events this orchestrator publishes
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.shared.event_tx.subscribe()
    }

    /// Whether a polling loop is active
    pub fn is_polling(&self) -> bool {
        self.shared.inner.lock().is_polling
    }

    /// The job currently tracked, if any
    pub fn current_job(&self) -> Option<JobHandle> {
        self.shared.inner.lock().job.clone()
    }

    /// Start a job and begin polling for its completion.
    ///
    /// Any previous cycle is reset first. On a failed start call the state
    /// becomes [`JobState::Failed`], [`Event::TaskStartFailed`] is published and
    /// `Error::StartFailed` is returned; no polling happens. If another
    /// `start_task`, `stop_polling` or `reset_state` runs while the start call
    /// is in flight, this call returns `Error::Cancelled` instead.
    pub async fn start_task(&self, spec: JobSpec) -> Result<TaskCompletion> {
        self.reset_state();

        let generation = {
            let mut inner = self.shared.inner.lock();
            inner.state = JobState::Starting;
            inner.job = Some(JobHandle::from(&spec));
            self.shared.status_tx.send_modify(|s| s.is_loading = true);
            inner.generation
        };

        tracing::info!(
            entity_id = %spec.entity_id,
            path = %spec.start_path,
            "starting job"
        );

        let result = self
            .backend
            .start_job(&spec.start_path, spec.body.as_ref())
            .await;

        let mut inner = self.shared.inner.lock();
        if inner.generation != generation {
            tracing::debug!(
                entity_id = %spec.entity_id,
                "start call finished after the cycle was superseded"
            );
            return Err(Error::Cancelled(format!(
                "start of job for entity {} was superseded",
                spec.entity_id
            )));
        }

        match result {
            Ok(()) => {
                tracing::info!(entity_id = %spec.entity_id, "job started, polling for completion");
                self.shared.status_tx.send_modify(|s| {
                    s.is_loading = false;
                    s.is_working = true;
                });
                self.shared
                    .event_tx
                    .send(Event::TaskStarted {
                        entity_id: spec.entity_id,
                        message: spec.message.clone(),
                    })
                    .ok();
                Ok(self.begin_polling(&mut inner, JobHandle::from(&spec)))
            }
            Err(e) => {
                let err = match e {
                    Error::StartFailed { .. } => e,
                    other => Error::StartFailed {
                        path: spec.start_path.clone(),
                        status: other.status(),
                        message: other.to_string(),
                    },
                };
                tracing::error!(entity_id = %spec.entity_id, error = %err, "failed to start job");

                inner.state = JobState::Failed(err.to_string());
                inner.job = None;
                let message = err.user_message();
                self.shared.status_tx.send_modify(|s| {
                    s.is_loading = false;
                    s.is_working = false;
                    s.last_error = Some(message);
                });
                self.shared
                    .event_tx
                    .send(Event::TaskStartFailed {
                        entity_id: spec.entity_id,
                        error: err.to_string(),
                    })
                    .ok();
                Err(err)
            }
        }
    }

    /// Begin polling for a job that is already running server-side.
    ///
    /// Returns `None` without starting anything if a loop is already active,
    /// if the current cycle already concluded, or if the orchestrator sits in a
    /// terminal state such as a failed start (call
    /// [`reset_state`](Self::reset_state) to begin a new one).
    pub fn start_polling(&self, job: JobHandle) -> Option<TaskCompletion> {
        let mut inner = self.shared.inner.lock();
        if inner.is_polling {
            tracing::debug!(entity_id = %job.entity_id, "polling already active");
            return None;
        }
        if inner.completion_fired {
            tracing::debug!(
                entity_id = %job.entity_id,
                "previous cycle already concluded, reset before polling again"
            );
            return None;
        }
        if inner.state.is_terminal() {
            tracing::debug!(
                entity_id = %job.entity_id,
                state = ?inner.state,
                "orchestrator is in a terminal state, reset before polling"
            );
            return None;
        }
        Some(self.begin_polling(&mut inner, job))
    }

    fn begin_polling(&self, inner: &mut Inner, job: JobHandle) -> TaskCompletion {
        if let Some(previous) = inner.cancel.take() {
            previous.cancel();
        }

        inner.generation += 1;
        let token = CancellationToken::new();
        let (tx, rx) = oneshot::channel();

        inner.is_polling = true;
        inner.completion_tx = Some(tx);
        inner.cancel = Some(token.clone());
        inner.job = Some(job.clone());
        inner.state = JobState::Polling(Utc::now());

        let entity_id = job.entity_id;
        let poll_loop = polling::PollLoop {
            backend: Arc::clone(&self.backend),
            config: self.config.clone(),
            shared: Arc::clone(&self.shared),
            job,
            token,
            generation: inner.generation,
        };
        tokio::spawn(poll_loop.run());

        TaskCompletion { entity_id, rx }
    }

    /// Cancel the polling loop and any in-flight start, returning to Idle.
    ///
    /// The pending [`TaskCompletion`] resolves to `None`. Safe to call at any time.
    pub fn stop_polling(&self) {
        let mut inner = self.shared.inner.lock();
        let was_starting = inner.state == JobState::Starting;

        if let Some(token) = inner.cancel.take() {
            token.cancel();
            tracing::debug!(generation = inner.generation, "polling stopped");
        }
        inner.is_polling = false;
        inner.completion_tx = None;
        inner.generation += 1;
        inner.job = None;
        inner.state = JobState::Idle;

        if was_starting {
            self.shared.status_tx.send_modify(|s| s.is_loading = false);
        }
    }

    /// [`stop_polling`](Self::stop_polling), then clear the observable status and
    /// the single-fire guard.
    pub fn reset_state(&self) {
        self.stop_polling();
        let mut inner = self.shared.inner.lock();
        inner.completion_fired = false;
        self.shared.status_tx.send_replace(TaskStatus::default());
    }
}

impl Drop for TaskOrchestrator {
    fn drop(&mut self) {
        self.stop_polling();
    }
}

impl std::fmt::Debug for TaskOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.shared.inner.lock();
        f.debug_struct("TaskOrchestrator")
            .field("state", &inner.state)
            .field("is_polling", &inner.is_polling)
            .field("generation", &inner.generation)
            .finish()
    }
}
