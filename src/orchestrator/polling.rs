//! Completion polling loop of one orchestrator cycle.

use super::{JobBackend, Shared};
use crate::config::PollingConfig;
use crate::types::{Event, JobHandle, TaskOutcome};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

pub(super) struct PollLoop {
    pub(super) backend: Arc<dyn JobBackend>,
    pub(super) config: PollingConfig,
    pub(super) shared: Arc<Shared>,
    pub(super) job: JobHandle,
    pub(super) token: CancellationToken,
    pub(super) generation: u64,
}

impl PollLoop {
    /// Grace delay, an immediate check, then one check per interval until the
    /// job reports done, the safety deadline passes or the token is cancelled.
    ///
    /// When a tick and the deadline land on the same instant the tick is
    /// served first, and a check that already has its answer wins over the
    /// deadline.
    pub(super) async fn run(self) {
        let started = Instant::now();
        let safety = tokio::time::sleep_until(started + self.config.safety_timeout);
        tokio::pin!(safety);

        tracing::debug!(
            entity_id = %self.job.entity_id,
            path = %self.job.poll_path,
            generation = self.generation,
            "polling loop started"
        );

        tokio::select! {
            biased;
            _ = self.token.cancelled() => {
                tracing::debug!(entity_id = %self.job.entity_id, "polling cancelled during grace delay");
                return;
            }
            _ = tokio::time::sleep(self.config.initial_delay) => {}
            _ = &mut safety => {
                self.time_out(started);
                return;
            }
        }

        let period = self.config.poll_interval.max(Duration::from_millis(1));
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.token.cancelled() => {
                    tracing::debug!(entity_id = %self.job.entity_id, "polling cancelled");
                    return;
                }
                _ = interval.tick() => {}
                _ = &mut safety => {
                    self.time_out(started);
                    return;
                }
            }

            let check = tokio::select! {
                biased;
                _ = self.token.cancelled() => {
                    tracing::debug!(entity_id = %self.job.entity_id, "polling cancelled during status check");
                    return;
                }
                result = self.backend.is_working(&self.job.poll_path) => result,
                _ = &mut safety => {
                    self.time_out(started);
                    return;
                }
            };

            match check {
                Ok(true) => {
                    tracing::debug!(entity_id = %self.job.entity_id, "job still working");
                    self.shared.mark_working(self.generation);
                }
                Ok(false) => {
                    self.complete(started);
                    return;
                }
                Err(e) => {
                    // A single bad check never ends the loop
                    tracing::warn!(
                        entity_id = %self.job.entity_id,
                        path = %self.job.poll_path,
                        error = %e,
                        "status check failed, retrying on next tick"
                    );
                }
            }
        }
    }

    fn complete(&self, started: Instant) {
        let event = Event::TaskCompleted {
            entity_id: self.job.entity_id,
        };
        if self
            .shared
            .conclude(self.generation, TaskOutcome::Completed, None, event)
        {
            tracing::info!(
                entity_id = %self.job.entity_id,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "job completed"
            );
        }
    }

    fn time_out(&self, started: Instant) {
        let waited_ms = started.elapsed().as_millis() as u64;
        let warning = format!(
            "Stopped waiting after {}s; the job may still be running",
            waited_ms / 1000
        );
        let event = Event::TaskTimedOut {
            entity_id: self.job.entity_id,
            waited_ms,
        };
        if self
            .shared
            .conclude(self.generation, TaskOutcome::TimedOut, Some(warning), event)
        {
            tracing::warn!(
                entity_id = %self.job.entity_id,
                waited_ms,
                "polling safety timeout reached"
            );
        }
    }
}
