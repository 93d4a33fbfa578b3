use thiserror::Error;
use uuid::Uuid;

use crate::alerts::NotifyError;
use crate::scheduler::QueueError;

/// Errors surfaced by the monitoring core to its callers.
///
/// Transport failures never show up here: a probe that cannot reach its
/// target is recorded as a failed check instead.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Endpoint {0} not found")]
    EndpointNotFound(Uuid),

    #[error("Incident {0} not found")]
    IncidentNotFound(i64),

    #[error("Notification channel {0} not found")]
    ChannelNotFound(Uuid),

    #[error("Invalid endpoint: {0}")]
    Validation(String),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Notify(#[from] NotifyError),

    #[error("Storage failure: {0:#}")]
    Storage(#[from] anyhow::Error),
}

impl MonitorError {
    /// Whether the error names a record that does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::EndpointNotFound(_) | Self::IncidentNotFound(_) | Self::ChannelNotFound(_)
        )
    }
}

pub type MonitorResult<T> = Result<T, MonitorError>;
