/// Scheduler - keeps one recurring probe job per active endpoint
pub mod queue;

pub use queue::{
    Backoff, JobHandle, JobOptions, JobOutput, JobProcessor, JobQueue, JobRecord, LocalJobQueue,
    Priority, ProbeJob, QueueError,
};

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};
use uuid::Uuid;

use crate::database::Database;
use crate::database::models::{CheckResult, Endpoint};
use crate::error::{MonitorError, MonitorResult};
use crate::monitoring::types::ProbeTrigger;

pub const SCHEDULED_ATTEMPTS: u32 = 3;
pub const BACKOFF_BASE: Duration = Duration::from_secs(2);

pub fn repeat_key(endpoint_id: Uuid) -> String {
    format!("probe:{endpoint_id}")
}

pub struct Scheduler {
    queue: Arc<dyn JobQueue>,
    database: Arc<dyn Database>,
}

impl Scheduler {
    pub fn new(queue: Arc<dyn JobQueue>, database: Arc<dyn Database>) -> Self {
        Self { queue, database }
    }

    pub fn queue(&self) -> &Arc<dyn JobQueue> {
        &self.queue
    }

    fn scheduled_options() -> JobOptions {
        JobOptions {
            attempts: SCHEDULED_ATTEMPTS,
            backoff: Backoff::Exponential(BACKOFF_BASE),
            keep_history: true,
            ..JobOptions::default()
        }
    }

    /// Register the recurring probe and kick off one immediate run.
    pub async fn schedule(&self, endpoint: &Endpoint) -> Result<(), QueueError> {
        let job = ProbeJob { endpoint_id: endpoint.id, trigger: ProbeTrigger::Scheduled };
        let every = Duration::from_secs(endpoint.interval_seconds);

        self.queue
            .enqueue(
                job,
                JobOptions {
                    job_id: Some(repeat_key(endpoint.id)),
                    repeat_every: Some(every),
                    ..Self::scheduled_options()
                },
            )
            .await?;

        self.queue
            .enqueue(job, JobOptions { priority: Priority::High, ..Self::scheduled_options() })
            .await?;

        info!(endpoint = %endpoint.name, endpoint_id = %endpoint.id, ?every, "Scheduled endpoint");
        Ok(())
    }

    /// Replace the recurring probe, e.g. after the interval changed.
    pub async fn reschedule(&self, endpoint: &Endpoint) -> Result<(), QueueError> {
        self.queue.remove_repeatable(&repeat_key(endpoint.id)).await?;
        self.schedule(endpoint).await
    }

    /// Drop the recurring probe and every queued job for the endpoint.
    /// Calling it again is harmless.
    pub async fn unschedule(&self, endpoint_id: Uuid) -> Result<(), QueueError> {
        let had_repeat = self.queue.remove_repeatable(&repeat_key(endpoint_id)).await?;
        let cancelled = self
            .queue
            .remove_jobs(&move |job: &ProbeJob| job.endpoint_id == endpoint_id)
            .await?;

        debug!(%endpoint_id, had_repeat, cancelled, "Unscheduled endpoint");
        Ok(())
    }

    /// Probe right now, bypassing the schedule, and wait for the result.
    pub async fn run_now(&self, endpoint_id: Uuid) -> MonitorResult<CheckResult> {
        let job = ProbeJob { endpoint_id, trigger: ProbeTrigger::Manual };
        let handle = self
            .queue
            .enqueue(
                job,
                JobOptions {
                    priority: Priority::High,
                    attempts: 1,
                    backoff: Backoff::None,
                    ..JobOptions::default()
                },
            )
            .await?;

        handle.wait().await?.ok_or(MonitorError::EndpointNotFound(endpoint_id))
    }

    /// Schedule every active endpoint, returning how many were scheduled.
    pub async fn schedule_all_active(&self) -> MonitorResult<usize> {
        let endpoints = self.database.list_active_endpoints().await?;
        for endpoint in &endpoints {
            self.schedule(endpoint).await?;
        }
        info!(count = endpoints.len(), "Scheduled active endpoints");
        Ok(endpoints.len())
    }
}
