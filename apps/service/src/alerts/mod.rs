/// Alerts - notification channels, delivery strategies and duplicate suppression
pub mod channels;
pub mod dispatcher;
pub mod payload;
pub mod suppressor;

pub use channels::{NotificationSender, SenderRegistry};
pub use dispatcher::{DispatchSummary, NotificationDispatcher};
pub use payload::AlertPayload;
pub use suppressor::DuplicateSuppressor;

use thiserror::Error;

use crate::database::models::ChannelKind;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Invalid {kind} channel config: {reason}")]
    InvalidConfig { kind: ChannelKind, reason: String },

    #[error("No sender registered for {0} channels")]
    UnsupportedChannel(ChannelKind),

    #[error("Delivery failed: {0}")]
    Delivery(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}
