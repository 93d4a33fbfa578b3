use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::checker::{HttpClient, ProbeRequest};
use super::state::{ProbeOutcome, Transition, transition};
use super::types::{EndpointStatus, ProbeObservation, ProbeTrigger};
use crate::alerts::NotificationDispatcher;
use crate::cache::Cache;
use crate::database::Database;
use crate::database::models::{CheckResult, Endpoint};
use crate::error::{MonitorError, MonitorResult};
use crate::events::{Event, EventBus};
use crate::scheduler::{JobOutput, JobProcessor, ProbeJob};

/// Cache namespace dropped whenever an endpoint changes status
pub const STATS_CACHE_PATTERN: &str = "stats:*";

/// Probes endpoints and applies the outcome: check history, status,
/// incidents, events and alerts.
pub struct ProbeEngine {
    database: Arc<dyn Database>,
    client: Arc<dyn HttpClient>,
    dispatcher: Arc<NotificationDispatcher>,
    events: EventBus,
    cache: Cache,
    /// One lock per endpoint so overlapping probes apply transitions in turn
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl ProbeEngine {
    pub fn new(
        database: Arc<dyn Database>,
        client: Arc<dyn HttpClient>,
        dispatcher: Arc<NotificationDispatcher>,
        events: EventBus,
        cache: Cache,
    ) -> Self {
        Self { database, client, dispatcher, events, cache, locks: Mutex::new(HashMap::new()) }
    }

    /// Issue the endpoint's request once. Never fails: transport problems and
    /// unexpected status codes come back as a failed observation.
    pub async fn perform_probe(&self, endpoint: &Endpoint) -> ProbeObservation {
        let request = ProbeRequest {
            method: endpoint.method.clone(),
            url: endpoint.url.clone(),
            headers: endpoint.headers.clone(),
            body: endpoint.body.clone(),
            timeout: Duration::from_millis(endpoint.timeout_ms),
        };

        let start = Instant::now();
        let response = self.client.request(&request).await;
        let latency_ms = start.elapsed().as_millis() as u64;

        match response {
            Ok(response) if response.status_code == endpoint.expected_status => {
                ProbeObservation::success(latency_ms, response.status_code)
            }
            Ok(response) => ProbeObservation::failure(
                latency_ms,
                Some(response.status_code),
                format!(
                    "Expected status {}, got {}",
                    endpoint.expected_status, response.status_code
                ),
            ),
            Err(e) => ProbeObservation::failure(latency_ms, None, e.to_string()),
        }
    }

    /// Probe one endpoint and apply the result.
    ///
    /// Returns `None` when a scheduled run hits an inactive endpoint.
    pub async fn run_check(
        &self,
        endpoint_id: Uuid,
        trigger: ProbeTrigger,
    ) -> MonitorResult<Option<CheckResult>> {
        let lock = self.lock_for(endpoint_id).await;
        let result = {
            let _guard = lock.lock().await;
            self.run_locked(endpoint_id, trigger).await
        };
        drop(lock);
        self.release_lock(endpoint_id).await;
        result
    }

    async fn lock_for(&self, endpoint_id: Uuid) -> Arc<Mutex<()>> {
        self.locks.lock().await.entry(endpoint_id).or_default().clone()
    }

    async fn release_lock(&self, endpoint_id: Uuid) {
        let mut locks = self.locks.lock().await;
        if locks.get(&endpoint_id).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(&endpoint_id);
        }
    }

    async fn run_locked(
        &self,
        endpoint_id: Uuid,
        trigger: ProbeTrigger,
    ) -> MonitorResult<Option<CheckResult>> {
        let endpoint = self
            .database
            .get_endpoint(endpoint_id)
            .await?
            .ok_or(MonitorError::EndpointNotFound(endpoint_id))?;

        if !endpoint.active && trigger == ProbeTrigger::Scheduled {
            debug!(endpoint = %endpoint.name, "Skipping scheduled probe of inactive endpoint");
            return Ok(None);
        }

        let observation = self.perform_probe(&endpoint).await;
        let checked_at = Utc::now();

        let mut result = CheckResult {
            id: None,
            endpoint_id,
            success: observation.success,
            latency_ms: observation.latency_ms,
            status_code: observation.status_code,
            error: observation.error.clone(),
            checked_at,
        };
        result.id = Some(self.database.insert_check_result(&result).await?);

        let outcome = if observation.success {
            ProbeOutcome::Success { latency_ms: observation.latency_ms }
        } else {
            ProbeOutcome::Failure
        };
        let transition =
            transition(endpoint.status, endpoint.consecutive_failures, outcome, endpoint.timeout_ms);

        self.database
            .update_endpoint_health(
                endpoint_id,
                transition.next,
                transition.consecutive_failures,
                observation.latency_ms,
                checked_at,
            )
            .await?;

        // The status is already written; a failed incident update must not
        // swallow the change event or its alerts.
        let incident = self.apply_incident(&endpoint, &transition, &result).await;
        if let Err(err) = &incident {
            warn!(endpoint = %endpoint.name, error = %err, "Failed to update incident record");
        }

        debug!(
            endpoint = %endpoint.name,
            success = result.success,
            latency_ms = result.latency_ms,
            status_code = ?result.status_code,
            "Check completed"
        );
        self.events.publish(Event::CheckCompleted { endpoint_id, result: result.clone() });

        if transition.changed() {
            self.on_status_changed(endpoint, &transition, &result).await;
        }

        incident?;
        Ok(Some(result))
    }

    async fn apply_incident(
        &self,
        endpoint: &Endpoint,
        transition: &Transition,
        result: &CheckResult,
    ) -> MonitorResult<()> {
        let open = self.database.find_open_incident(endpoint.id).await?;

        match (transition.next, open) {
            (EndpointStatus::Down, None) => {
                let incident = self
                    .database
                    .open_incident(
                        endpoint.id,
                        result.checked_at,
                        transition.consecutive_failures,
                        result.error.clone(),
                    )
                    .await?;
                warn!(
                    target: "beacon::audit",
                    endpoint = %endpoint.name,
                    incident_id = incident.id,
                    failures = incident.failure_count,
                    "Incident opened"
                );
                self.events.publish(Event::IncidentOpened(incident));
            }
            (EndpointStatus::Down, Some(_)) => {}
            (_, Some(mut incident)) => {
                let resolved_at = result.checked_at;
                let duration_ms = (resolved_at - incident.started_at).num_milliseconds().max(0);
                self.database.resolve_incident(incident.id, resolved_at, duration_ms).await?;

                incident.resolved_at = Some(resolved_at);
                incident.duration_ms = Some(duration_ms);
                info!(
                    target: "beacon::audit",
                    endpoint = %endpoint.name,
                    incident_id = incident.id,
                    duration_ms,
                    "Incident resolved"
                );
                self.events.publish(Event::IncidentResolved(incident));
            }
            (_, None) => {}
        }
        Ok(())
    }

    async fn on_status_changed(
        &self,
        mut endpoint: Endpoint,
        transition: &Transition,
        result: &CheckResult,
    ) {
        info!(
            target: "beacon::audit",
            endpoint = %endpoint.name,
            previous = %transition.previous,
            next = %transition.next,
            "Endpoint status changed"
        );
        self.events.publish(Event::StatusChanged {
            endpoint_id: endpoint.id,
            previous: transition.previous,
            next: transition.next,
            changed_at: result.checked_at,
        });
        self.cache.delete_pattern(STATS_CACHE_PATTERN).await;

        endpoint.status = transition.next;
        endpoint.consecutive_failures = transition.consecutive_failures;
        endpoint.last_latency_ms = Some(result.latency_ms);
        endpoint.last_checked_at = Some(result.checked_at);
        self.dispatcher
            .on_status_change(&endpoint, transition.previous, transition.next, result)
            .await;
    }
}

#[async_trait]
impl JobProcessor for ProbeEngine {
    async fn process(&self, job: &ProbeJob) -> JobOutput {
        self.run_check(job.endpoint_id, job.trigger).await
    }
}
