use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::channels::SenderRegistry;
use super::payload::AlertPayload;
use super::suppressor::DuplicateSuppressor;
use crate::database::Database;
use crate::database::models::{CheckResult, Endpoint};
use crate::error::{MonitorError, MonitorResult};
use crate::monitoring::types::EndpointStatus;

/// Per-transition delivery tally
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchSummary {
    pub sent: usize,
    pub suppressed: usize,
    pub failed: usize,
}

/// Fans a status change out to every active channel.
pub struct NotificationDispatcher {
    database: Arc<dyn Database>,
    senders: SenderRegistry,
    suppressor: Arc<DuplicateSuppressor>,
}

impl NotificationDispatcher {
    pub fn new(
        database: Arc<dyn Database>,
        senders: SenderRegistry,
        suppressor: Arc<DuplicateSuppressor>,
    ) -> Self {
        Self { database, senders, suppressor }
    }

    pub fn suppressor(&self) -> &Arc<DuplicateSuppressor> {
        &self.suppressor
    }

    /// Deliver a transition alert. Never fails: channel problems are logged
    /// and counted, and one channel failing does not stop the others.
    pub async fn on_status_change(
        &self,
        endpoint: &Endpoint,
        previous: EndpointStatus,
        next: EndpointStatus,
        result: &CheckResult,
    ) -> DispatchSummary {
        let mut summary = DispatchSummary::default();
        if previous == next {
            return summary;
        }

        let channels = match self.database.active_channels().await {
            Ok(channels) => channels,
            Err(e) => {
                warn!(endpoint_id = %endpoint.id, "Failed to load notification channels: {e:#}");
                return summary;
            }
        };

        let payload = AlertPayload::transition(endpoint, previous, next, result);

        for channel in channels {
            let key = DuplicateSuppressor::key_for(endpoint.id, channel.id, previous, next);
            if self.suppressor.is_duplicate(&key).await {
                debug!(channel = %channel.name, %key, "Suppressed duplicate alert");
                summary.suppressed += 1;
                continue;
            }

            let delivery = match self.senders.get(channel.kind) {
                Ok(sender) => sender.send(&channel.config, &payload).await,
                Err(e) => Err(e),
            };

            match delivery {
                Ok(()) => {
                    self.suppressor.mark_sent(&key).await;
                    summary.sent += 1;
                }
                Err(e) => {
                    warn!(
                        channel = %channel.name,
                        kind = %channel.kind,
                        endpoint_id = %endpoint.id,
                        "Alert delivery failed: {e}"
                    );
                    summary.failed += 1;
                }
            }
        }

        info!(
            endpoint = %endpoint.name,
            %previous,
            %next,
            sent = summary.sent,
            suppressed = summary.suppressed,
            failed = summary.failed,
            "Dispatched status change alerts"
        );
        summary
    }

    /// Send a free-text message through one channel, surfacing every error.
    pub async fn test_send(&self, channel_id: Uuid, message: &str) -> MonitorResult<()> {
        let channel = self
            .database
            .get_channel(channel_id)
            .await?
            .ok_or(MonitorError::ChannelNotFound(channel_id))?;

        let sender = self.senders.get(channel.kind)?;
        sender.validate(&channel.config)?;
        sender.send(&channel.config, &AlertPayload::test(message)).await?;

        info!(channel = %channel.name, kind = %channel.kind, "Test notification sent");
        Ok(())
    }
}
