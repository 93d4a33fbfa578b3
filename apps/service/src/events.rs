//! Real-time event bus. Publishing is fire-and-forget: with no subscribers
//! events are simply dropped.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;
use uuid::Uuid;

use crate::database::models::{CheckResult, Endpoint, Incident};
use crate::monitoring::types::EndpointStatus;

const BUS_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "topic", content = "data")]
pub enum Event {
    #[serde(rename = "check.completed")]
    CheckCompleted { endpoint_id: Uuid, result: CheckResult },
    #[serde(rename = "endpoint.status")]
    StatusChanged {
        endpoint_id: Uuid,
        previous: EndpointStatus,
        next: EndpointStatus,
        changed_at: DateTime<Utc>,
    },
    #[serde(rename = "incident.opened")]
    IncidentOpened(Incident),
    #[serde(rename = "incident.resolved")]
    IncidentResolved(Incident),
    #[serde(rename = "endpoint.created")]
    EndpointCreated(Endpoint),
    #[serde(rename = "endpoint.updated")]
    EndpointUpdated(Endpoint),
    #[serde(rename = "endpoint.deleted")]
    EndpointDeleted { endpoint_id: Uuid },
}

impl Event {
    pub fn topic(&self) -> &'static str {
        match self {
            Event::CheckCompleted { .. } => "check.completed",
            Event::StatusChanged { .. } => "endpoint.status",
            Event::IncidentOpened(_) => "incident.opened",
            Event::IncidentResolved(_) => "incident.resolved",
            Event::EndpointCreated(_) => "endpoint.created",
            Event::EndpointUpdated(_) => "endpoint.updated",
            Event::EndpointDeleted { .. } => "endpoint.deleted",
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: Event) {
        trace!(topic = event.topic(), "Publishing event");
        // Ignore errors if there are no receivers
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_published_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let endpoint_id = Uuid::new_v4();

        bus.publish(Event::EndpointDeleted { endpoint_id });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.topic(), "endpoint.deleted");
    }

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        EventBus::new().publish(Event::EndpointDeleted { endpoint_id: Uuid::nil() });
    }

    #[test]
    fn test_serialized_topic_matches() {
        let event = Event::StatusChanged {
            endpoint_id: Uuid::nil(),
            previous: EndpointStatus::Up,
            next: EndpointStatus::Down,
            changed_at: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["topic"], event.topic());
        assert_eq!(json["data"]["next"], "DOWN");
    }
}
