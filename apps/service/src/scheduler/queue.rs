//! In-process job queue for probe jobs.
//!
//! Jobs run on spawned tasks gated by a worker semaphore. Repeatable jobs are
//! driven by one ticker task per key that enqueues a fresh one-off instance on
//! every period. Failed attempts are retried with the job's backoff until its
//! attempt budget is spent.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{Mutex, Notify, OwnedSemaphorePermit, Semaphore, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::QueueConfig;
use crate::database::models::CheckResult;
use crate::error::{MonitorError, MonitorResult};
use crate::monitoring::types::ProbeTrigger;

/// What a probe job returns: the stored check, or `None` when it was skipped.
pub type JobOutput = MonitorResult<Option<CheckResult>>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Job queue is closed")]
    Closed,
    #[error("Job {id} was cancelled")]
    Cancelled { id: String },
    #[error("Job {id} timed out after {after:?}")]
    TimedOut { id: String, after: Duration },
    #[error("Job {id} cannot be awaited")]
    NotAwaitable { id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProbeJob {
    pub endpoint_id: Uuid,
    pub trigger: ProbeTrigger,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    #[default]
    Normal,
    /// May take the reserved express slot when every worker is busy
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    None,
    Fixed(Duration),
    /// `base * 2^(attempt - 1)`
    Exponential(Duration),
}

impl Backoff {
    /// Delay before the retry following failed attempt number `attempt` (1-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::None => Duration::ZERO,
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential(base) => {
                let exponent = attempt.saturating_sub(1).min(16);
                base.saturating_mul(1u32 << exponent)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct JobOptions {
    /// Deduplication key; for repeatable jobs this is the repeat key
    pub job_id: Option<String>,
    pub repeat_every: Option<Duration>,
    pub priority: Priority,
    pub attempts: u32,
    pub backoff: Backoff,
    pub keep_history: bool,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            job_id: None,
            repeat_every: None,
            priority: Priority::Normal,
            attempts: 1,
            backoff: Backoff::None,
            keep_history: true,
        }
    }
}

/// Returned by [`JobQueue::enqueue`]
#[derive(Debug)]
pub struct JobHandle {
    pub id: String,
    completion: Option<oneshot::Receiver<JobOutput>>,
}

impl JobHandle {
    fn detached(id: String) -> Self {
        Self { id, completion: None }
    }

    pub fn is_awaitable(&self) -> bool {
        self.completion.is_some()
    }

    /// Wait for the job to finish and return what the processor returned.
    pub async fn wait(self) -> JobOutput {
        let Some(completion) = self.completion else {
            return Err(QueueError::NotAwaitable { id: self.id }.into());
        };
        completion.await.map_err(|_| MonitorError::from(QueueError::Closed))?
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "lowercase")]
pub enum JobState {
    Completed,
    Failed(String),
    Cancelled,
}

/// Finished job, kept for audit
#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub id: String,
    pub job: ProbeJob,
    pub attempts_made: u32,
    pub state: JobState,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RepeatableJob {
    pub key: String,
    pub job: ProbeJob,
    pub every: Duration,
}

/// Runs one job attempt
#[async_trait]
pub trait JobProcessor: Send + Sync {
    async fn process(&self, job: &ProbeJob) -> JobOutput;
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: ProbeJob, options: JobOptions) -> Result<JobHandle, QueueError>;

    /// Stop a repeatable job; returns whether it existed.
    async fn remove_repeatable(&self, key: &str) -> Result<bool, QueueError>;

    /// Cancel queued and backing-off jobs matching `predicate`. Jobs already
    /// running are left to finish. Returns how many were cancelled.
    async fn remove_jobs(
        &self,
        predicate: &(dyn for<'j> Fn(&'j ProbeJob) -> bool + Send + Sync),
    ) -> Result<usize, QueueError>;

    /// Jobs that have not finished yet, by id
    async fn pending_jobs(&self) -> Vec<(String, ProbeJob)>;

    async fn repeatable_jobs(&self) -> Vec<RepeatableJob>;

    /// Most recent finished jobs, oldest first
    async fn history(&self) -> Vec<JobRecord>;
}

struct JobEntry {
    id: String,
    job: ProbeJob,
    options: JobOptions,
    cancelled: AtomicBool,
    running: AtomicBool,
    cancel: Notify,
}

impl JobEntry {
    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.cancel.notify_one();
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn cancelled_error(&self) -> MonitorError {
        QueueError::Cancelled { id: self.id.clone() }.into()
    }
}

struct RepeatEntry {
    job: ProbeJob,
    every: Duration,
    ticker: JoinHandle<()>,
}

struct Inner {
    processor: Arc<dyn JobProcessor>,
    workers: Arc<Semaphore>,
    express: Arc<Semaphore>,
    job_timeout: Duration,
    history_limit: usize,
    closed: AtomicBool,
    pending: Mutex<HashMap<String, Arc<JobEntry>>>,
    repeatable: Mutex<HashMap<String, RepeatEntry>>,
    history: Mutex<VecDeque<JobRecord>>,
}

pub struct LocalJobQueue {
    inner: Arc<Inner>,
}

impl LocalJobQueue {
    pub fn new(processor: Arc<dyn JobProcessor>, config: &QueueConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                processor,
                workers: Arc::new(Semaphore::new(config.workers.max(1))),
                express: Arc::new(Semaphore::new(1)),
                job_timeout: Duration::from_secs(config.job_timeout_seconds.max(1)),
                history_limit: config.history_limit,
                closed: AtomicBool::new(false),
                pending: Mutex::new(HashMap::new()),
                repeatable: Mutex::new(HashMap::new()),
                history: Mutex::new(VecDeque::new()),
            }),
        }
    }

    /// Stop every repeat ticker and cancel everything not yet running.
    pub async fn shutdown(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);

        for (_, entry) in self.inner.repeatable.lock().await.drain() {
            entry.ticker.abort();
        }
        for (_, entry) in self.inner.pending.lock().await.drain() {
            entry.cancel();
        }
        self.inner.workers.close();
        self.inner.express.close();
        debug!("Job queue shut down");
    }
}

impl Drop for LocalJobQueue {
    fn drop(&mut self) {
        self.inner.closed.store(true, Ordering::SeqCst);
    }
}

impl Inner {
    async fn submit(self: &Arc<Self>, job: ProbeJob, options: JobOptions) -> Result<JobHandle, QueueError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(QueueError::Closed);
        }

        let id = options.job_id.clone().unwrap_or_else(|| Uuid::new_v4().to_string());

        if let Some(every) = options.repeat_every {
            let mut repeatable = self.repeatable.lock().await;
            if !repeatable.contains_key(&id) {
                let ticker = spawn_repeat(Arc::downgrade(self), id.clone(), job, every, options);
                repeatable.insert(id.clone(), RepeatEntry { job, every, ticker });
                debug!(key = %id, ?every, "Registered repeatable job");
            }
            return Ok(JobHandle::detached(id));
        }

        let entry = {
            let mut pending = self.pending.lock().await;
            if pending.contains_key(&id) {
                debug!(job_id = %id, "Job already queued, not adding a duplicate");
                return Ok(JobHandle::detached(id));
            }
            let entry = Arc::new(JobEntry {
                id: id.clone(),
                job,
                options,
                cancelled: AtomicBool::new(false),
                running: AtomicBool::new(false),
                cancel: Notify::new(),
            });
            pending.insert(id.clone(), entry.clone());
            entry
        };

        let (tx, rx) = oneshot::channel();
        tokio::spawn(execute(self.clone(), entry, tx));
        Ok(JobHandle { id, completion: Some(rx) })
    }

    async fn acquire(&self, priority: Priority) -> Option<OwnedSemaphorePermit> {
        match priority {
            Priority::Normal => self.workers.clone().acquire_owned().await.ok(),
            Priority::High => tokio::select! {
                permit = self.workers.clone().acquire_owned() => permit.ok(),
                permit = self.express.clone().acquire_owned() => permit.ok(),
            },
        }
    }

    async fn has_pending_for(&self, endpoint_id: Uuid) -> bool {
        self.pending.lock().await.values().any(|entry| entry.job.endpoint_id == endpoint_id)
    }

    async fn record(&self, record: JobRecord) {
        if self.history_limit == 0 {
            return;
        }
        let mut history = self.history.lock().await;
        while history.len() >= self.history_limit {
            history.pop_front();
        }
        history.push_back(record);
    }
}

fn spawn_repeat(
    inner: Weak<Inner>,
    key: String,
    job: ProbeJob,
    every: Duration,
    options: JobOptions,
) -> JoinHandle<()> {
    let every = every.max(Duration::from_millis(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut run: u64 = 0;
        loop {
            ticker.tick().await;
            let Some(inner) = inner.upgrade() else { break };
            // One instance per endpoint at a time; a hung probe must not pile
            // up instances that each hold a worker.
            if inner.has_pending_for(job.endpoint_id).await {
                debug!(%key, "Previous run still pending, skipping this period");
                continue;
            }
            run += 1;
            let instance = JobOptions {
                job_id: Some(format!("{key}:{run}")),
                repeat_every: None,
                ..options.clone()
            };
            if let Err(e) = inner.submit(job, instance).await {
                warn!(%key, "Stopping repeatable job: {e}");
                break;
            }
        }
    })
}

async fn execute(inner: Arc<Inner>, entry: Arc<JobEntry>, completion: oneshot::Sender<JobOutput>) {
    let attempts = entry.options.attempts.max(1);
    let mut attempts_made = 0;

    let output: JobOutput = loop {
        let permit = tokio::select! {
            _ = entry.cancel.notified() => break Err(entry.cancelled_error()),
            permit = inner.acquire(entry.options.priority) => permit,
        };
        let Some(permit) = permit else { break Err(QueueError::Closed.into()) };
        if entry.is_cancelled() {
            break Err(entry.cancelled_error());
        }

        entry.running.store(true, Ordering::SeqCst);
        attempts_made += 1;
        let result = match tokio::time::timeout(inner.job_timeout, inner.processor.process(&entry.job)).await {
            Ok(result) => result,
            Err(_) => Err(QueueError::TimedOut { id: entry.id.clone(), after: inner.job_timeout }.into()),
        };
        entry.running.store(false, Ordering::SeqCst);
        drop(permit);

        match result {
            Ok(value) => break Ok(value),
            Err(e) if attempts_made >= attempts => break Err(e),
            Err(e) => {
                let delay = entry.options.backoff.delay(attempts_made);
                warn!(
                    job_id = %entry.id,
                    attempt = attempts_made,
                    of = attempts,
                    ?delay,
                    "Job attempt failed, retrying: {e}"
                );
                tokio::select! {
                    _ = entry.cancel.notified() => break Err(entry.cancelled_error()),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    };

    inner.pending.lock().await.remove(&entry.id);

    let state = match &output {
        Ok(_) => JobState::Completed,
        Err(MonitorError::Queue(QueueError::Cancelled { .. })) => JobState::Cancelled,
        Err(e) => {
            warn!(job_id = %entry.id, endpoint_id = %entry.job.endpoint_id, "Job failed: {e}");
            JobState::Failed(e.to_string())
        }
    };
    if entry.options.keep_history {
        inner
            .record(JobRecord {
                id: entry.id.clone(),
                job: entry.job,
                attempts_made,
                state,
                finished_at: Utc::now(),
            })
            .await;
    }

    // Nobody waiting is fine
    let _ = completion.send(output);
}

#[async_trait]
impl JobQueue for LocalJobQueue {
    async fn enqueue(&self, job: ProbeJob, options: JobOptions) -> Result<JobHandle, QueueError> {
        self.inner.submit(job, options).await
    }

    async fn remove_repeatable(&self, key: &str) -> Result<bool, QueueError> {
        match self.inner.repeatable.lock().await.remove(key) {
            Some(entry) => {
                entry.ticker.abort();
                debug!(%key, "Removed repeatable job");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn remove_jobs(
        &self,
        predicate: &(dyn for<'j> Fn(&'j ProbeJob) -> bool + Send + Sync),
    ) -> Result<usize, QueueError> {
        let mut pending = self.inner.pending.lock().await;
        let doomed: Vec<String> = pending
            .values()
            .filter(|entry| !entry.running.load(Ordering::SeqCst) && predicate(&entry.job))
            .map(|entry| entry.id.clone())
            .collect();

        for id in &doomed {
            if let Some(entry) = pending.remove(id) {
                entry.cancel();
            }
        }
        Ok(doomed.len())
    }

    async fn pending_jobs(&self) -> Vec<(String, ProbeJob)> {
        self.inner
            .pending
            .lock()
            .await
            .values()
            .map(|entry| (entry.id.clone(), entry.job))
            .collect()
    }

    async fn repeatable_jobs(&self) -> Vec<RepeatableJob> {
        self.inner
            .repeatable
            .lock()
            .await
            .iter()
            .map(|(key, entry)| RepeatableJob { key: key.clone(), job: entry.job, every: entry.every })
            .collect()
    }

    async fn history(&self) -> Vec<JobRecord> {
        self.inner.history.lock().await.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;

    use super::*;

    /// Fails the first `fail_first` calls, then succeeds; optionally blocks until released.
    struct ScriptedProcessor {
        calls: AtomicU32,
        fail_first: u32,
        gate: Option<Arc<Notify>>,
    }

    impl ScriptedProcessor {
        fn new(fail_first: u32) -> Arc<Self> {
            Arc::new(Self { calls: AtomicU32::new(0), fail_first, gate: None })
        }

        fn gated(gate: Arc<Notify>) -> Arc<Self> {
            Arc::new(Self { calls: AtomicU32::new(0), fail_first: 0, gate: Some(gate) })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl JobProcessor for ScriptedProcessor {
        async fn process(&self, job: &ProbeJob) -> JobOutput {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if call <= self.fail_first {
                return Err(MonitorError::EndpointNotFound(job.endpoint_id));
            }
            Ok(None)
        }
    }

    /// Never finishes jobs for `stuck`; everything else succeeds at once.
    struct StuckProcessor {
        stuck: Uuid,
        calls: AtomicU32,
    }

    #[async_trait]
    impl JobProcessor for StuckProcessor {
        async fn process(&self, job: &ProbeJob) -> JobOutput {
            if job.endpoint_id == self.stuck {
                self.calls.fetch_add(1, Ordering::SeqCst);
                std::future::pending::<()>().await;
            }
            Ok(None)
        }
    }

    fn queue(processor: Arc<ScriptedProcessor>, workers: usize) -> LocalJobQueue {
        let config = QueueConfig { workers, job_timeout_seconds: 30, history_limit: 10 };
        LocalJobQueue::new(processor, &config)
    }

    fn job() -> ProbeJob {
        ProbeJob { endpoint_id: Uuid::new_v4(), trigger: ProbeTrigger::Scheduled }
    }

    #[test]
    fn test_exponential_backoff() {
        let backoff = Backoff::Exponential(Duration::from_secs(2));
        assert_eq!(backoff.delay(1), Duration::from_secs(2));
        assert_eq!(backoff.delay(2), Duration::from_secs(4));
        assert_eq!(backoff.delay(3), Duration::from_secs(8));
        assert_eq!(Backoff::None.delay(5), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success() {
        let processor = ScriptedProcessor::new(2);
        let queue = queue(processor.clone(), 2);
        let options = JobOptions {
            attempts: 3,
            backoff: Backoff::Exponential(Duration::from_secs(2)),
            ..JobOptions::default()
        };

        let handle = queue.enqueue(job(), options).await.unwrap();
        assert!(handle.wait().await.is_ok());
        assert_eq!(processor.calls(), 3);

        let history = queue.history().await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].attempts_made, 3);
        assert_eq!(history[0].state, JobState::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_attempts_return_last_error() {
        let processor = ScriptedProcessor::new(u32::MAX);
        let queue = queue(processor.clone(), 1);
        let options = JobOptions { attempts: 2, ..JobOptions::default() };

        let err = queue.enqueue(job(), options).await.unwrap().wait().await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(processor.calls(), 2);
        assert!(matches!(queue.history().await[0].state, JobState::Failed(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeatable_job_fires_each_period() {
        let processor = ScriptedProcessor::new(0);
        let queue = queue(processor.clone(), 2);
        let options = JobOptions {
            job_id: Some("probe:x".into()),
            repeat_every: Some(Duration::from_secs(10)),
            ..JobOptions::default()
        };

        let handle = queue.enqueue(job(), options.clone()).await.unwrap();
        assert!(!handle.is_awaitable());
        // Same key again is not a second schedule
        queue.enqueue(job(), options).await.unwrap();
        assert_eq!(queue.repeatable_jobs().await.len(), 1);

        tokio::time::sleep(Duration::from_secs(35)).await;
        assert_eq!(processor.calls(), 3);

        assert!(queue.remove_repeatable("probe:x").await.unwrap());
        assert!(!queue.remove_repeatable("probe:x").await.unwrap());
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(processor.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_repeat_does_not_take_every_worker() {
        let stuck = job();
        let stuck_id = stuck.endpoint_id;
        let processor = Arc::new(StuckProcessor { stuck: stuck_id, calls: AtomicU32::new(0) });
        let config = QueueConfig { workers: 2, job_timeout_seconds: 300, history_limit: 10 };
        let queue = LocalJobQueue::new(processor.clone(), &config);

        let options = JobOptions {
            job_id: Some("probe:stuck".into()),
            repeat_every: Some(Duration::from_secs(1)),
            ..JobOptions::default()
        };
        queue.enqueue(stuck, options).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5_500)).await;

        // Later periods are skipped while the first run hangs
        assert_eq!(processor.calls.load(Ordering::SeqCst), 1);
        let pending = queue.pending_jobs().await;
        assert_eq!(pending.iter().filter(|(_, job)| job.endpoint_id == stuck_id).count(), 1);

        let healthy = queue.enqueue(job(), JobOptions::default()).await.unwrap();
        let finished = tokio::time::timeout(Duration::from_secs(5), healthy.wait()).await;
        assert!(matches!(finished, Ok(Ok(None))));
    }

    #[tokio::test]
    async fn test_remove_jobs_skips_running_and_cancels_queued() {
        let gate = Arc::new(Notify::new());
        let processor = ScriptedProcessor::gated(gate.clone());
        let queue = queue(processor.clone(), 1);
        let target = job();

        let running = queue.enqueue(target, JobOptions::default()).await.unwrap();
        while processor.calls() == 0 {
            tokio::task::yield_now().await;
        }
        let queued = queue.enqueue(target, JobOptions::default()).await.unwrap();
        let other = queue.enqueue(job(), JobOptions::default()).await.unwrap();

        let removed = queue.remove_jobs(&|job: &ProbeJob| job.endpoint_id == target.endpoint_id).await.unwrap();
        assert_eq!(removed, 1);

        let err = queued.wait().await.unwrap_err();
        assert!(matches!(err, MonitorError::Queue(QueueError::Cancelled { .. })));

        gate.notify_one();
        assert!(running.wait().await.is_ok());
        gate.notify_one();
        assert!(other.wait().await.is_ok());
    }

    #[tokio::test]
    async fn test_duplicate_job_id_is_not_queued_twice() {
        let gate = Arc::new(Notify::new());
        let processor = ScriptedProcessor::gated(gate.clone());
        let queue = queue(processor.clone(), 1);
        let options = JobOptions { job_id: Some("same".into()), ..JobOptions::default() };

        let first = queue.enqueue(job(), options.clone()).await.unwrap();
        let second = queue.enqueue(job(), options).await.unwrap();
        assert!(first.is_awaitable());
        assert!(!second.is_awaitable());
        assert!(matches!(
            second.wait().await,
            Err(MonitorError::Queue(QueueError::NotAwaitable { .. }))
        ));

        gate.notify_one();
        assert!(first.wait().await.is_ok());
    }

    #[tokio::test]
    async fn test_enqueue_after_shutdown_fails() {
        let queue = queue(ScriptedProcessor::new(0), 1);
        queue.shutdown().await;
        assert!(matches!(
            queue.enqueue(job(), JobOptions::default()).await,
            Err(QueueError::Closed)
        ));
    }
}
