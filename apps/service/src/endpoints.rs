//! Endpoint registry: validated CRUD that keeps the schedule in step with
//! what is stored.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::database::Database;
use crate::database::models::{Endpoint, EndpointPatch, NewEndpoint};
use crate::error::{MonitorError, MonitorResult};
use crate::events::{Event, EventBus};
use crate::scheduler::Scheduler;
use crate::validation::validate_endpoint;

pub struct EndpointRegistry {
    database: Arc<dyn Database>,
    scheduler: Arc<Scheduler>,
    events: EventBus,
}

impl EndpointRegistry {
    pub fn new(database: Arc<dyn Database>, scheduler: Arc<Scheduler>, events: EventBus) -> Self {
        Self { database, scheduler, events }
    }

    pub async fn register(&self, new_endpoint: NewEndpoint) -> MonitorResult<Endpoint> {
        let endpoint = new_endpoint.into_endpoint();
        validate_endpoint(&endpoint).to_result().map_err(MonitorError::Validation)?;

        self.database.insert_endpoint(&endpoint).await?;
        if endpoint.active {
            self.scheduler.schedule(&endpoint).await?;
        }

        info!(endpoint = %endpoint.name, endpoint_id = %endpoint.id, url = %endpoint.url, "Endpoint registered");
        self.events.publish(Event::EndpointCreated(endpoint.clone()));
        Ok(endpoint)
    }

    pub async fn update(&self, id: Uuid, patch: EndpointPatch) -> MonitorResult<Endpoint> {
        let current = self.get(id).await?;
        let mut updated = current.clone();
        apply_patch(&mut updated, patch);
        validate_endpoint(&updated).to_result().map_err(MonitorError::Validation)?;

        updated.updated_at = Utc::now();
        self.database.update_endpoint(&updated).await?;

        let reactivated = updated.active && !current.active;
        let interval_changed = updated.interval_seconds != current.interval_seconds;
        if !updated.active && current.active {
            self.scheduler.unschedule(id).await?;
        } else if reactivated || (updated.active && interval_changed) {
            self.scheduler.reschedule(&updated).await?;
        }

        info!(endpoint = %updated.name, endpoint_id = %id, "Endpoint updated");
        self.events.publish(Event::EndpointUpdated(updated.clone()));
        Ok(updated)
    }

    /// Unschedule and delete. Endpoints with history are only deactivated so
    /// their checks and incidents stay queryable.
    pub async fn remove(&self, id: Uuid) -> MonitorResult<()> {
        let mut endpoint = self.get(id).await?;
        self.scheduler.unschedule(id).await?;

        if self.database.endpoint_has_history(id).await? {
            endpoint.active = false;
            endpoint.updated_at = Utc::now();
            self.database.update_endpoint(&endpoint).await?;
            info!(endpoint = %endpoint.name, endpoint_id = %id, "Endpoint deactivated (has history)");
        } else {
            self.database.delete_endpoint(id).await?;
            info!(endpoint = %endpoint.name, endpoint_id = %id, "Endpoint deleted");
        }

        self.events.publish(Event::EndpointDeleted { endpoint_id: id });
        Ok(())
    }

    pub async fn get(&self, id: Uuid) -> MonitorResult<Endpoint> {
        self.database.get_endpoint(id).await?.ok_or(MonitorError::EndpointNotFound(id))
    }

    pub async fn list(&self) -> MonitorResult<Vec<Endpoint>> {
        Ok(self.database.list_endpoints().await?)
    }
}

fn apply_patch(endpoint: &mut Endpoint, patch: EndpointPatch) {
    if let Some(name) = patch.name {
        endpoint.name = name;
    }
    if let Some(url) = patch.url {
        endpoint.url = url;
    }
    if let Some(method) = patch.method {
        endpoint.method = method.to_ascii_uppercase();
    }
    if let Some(headers) = patch.headers {
        endpoint.headers = headers;
    }
    if let Some(body) = patch.body {
        endpoint.body = body;
    }
    if let Some(interval) = patch.interval_seconds {
        endpoint.interval_seconds = interval;
    }
    if let Some(expected) = patch.expected_status {
        endpoint.expected_status = expected;
    }
    if let Some(timeout) = patch.timeout_ms {
        endpoint.timeout_ms = timeout;
    }
    if let Some(active) = patch.active {
        endpoint.active = active;
    }
}
