use std::sync::{Arc, Weak};
use std::time::Duration;

use tracing::debug;
use uuid::Uuid;

use crate::expiry::{DEFAULT_CAPACITY, ExpiringMap};
use crate::monitoring::types::EndpointStatus;

pub const SUPPRESSION_WINDOW: Duration = Duration::from_secs(300);
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Remembers recently delivered alerts so the same transition is not sent to
/// the same channel twice within the suppression window.
#[derive(Debug)]
pub struct DuplicateSuppressor {
    sent: ExpiringMap<()>,
    window: Duration,
}

impl Default for DuplicateSuppressor {
    fn default() -> Self {
        Self::new(SUPPRESSION_WINDOW)
    }
}

impl DuplicateSuppressor {
    pub fn new(window: Duration) -> Self {
        Self { sent: ExpiringMap::new(DEFAULT_CAPACITY), window }
    }

    /// `endpoint:channel:PREV->NEXT`
    pub fn key_for(
        endpoint_id: Uuid,
        channel_id: Uuid,
        previous: EndpointStatus,
        next: EndpointStatus,
    ) -> String {
        format!("{endpoint_id}:{channel_id}:{previous}->{next}")
    }

    pub async fn is_duplicate(&self, key: &str) -> bool {
        self.sent.contains(key).await
    }

    pub async fn mark_sent(&self, key: &str) {
        self.sent.insert(key, (), self.window).await;
    }

    pub async fn clear_key(&self, key: &str) {
        self.sent.remove(key).await;
    }

    pub async fn clear_all(&self) {
        self.sent.clear().await;
    }

    pub async fn sweep(&self) -> usize {
        self.sent.sweep().await
    }

    /// Periodically drop lapsed markers; stops once the suppressor is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> tokio::task::JoinHandle<()> {
        let suppressor: Weak<Self> = Arc::downgrade(self);
        let every = every.max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(suppressor) = suppressor.upgrade() else { break };
                let swept = suppressor.sweep().await;
                if swept > 0 {
                    debug!(swept, "Swept lapsed alert markers");
                }
            }
        })
    }
}
