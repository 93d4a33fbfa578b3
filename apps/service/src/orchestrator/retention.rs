//! Automatic retention and cleanup of check history.
//!
//! Check results older than the configured horizon (30 days by default) are
//! deleted once an hour. Incidents are kept.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::RetentionConfig;
use crate::database::Database;

pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(3600);

/// Retention policy for stored check results
#[derive(Debug, Clone)]
pub struct RetentionPolicy {
    /// Days to keep check results
    pub check_result_days: i64,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self { check_result_days: 30 }
    }
}

impl From<&RetentionConfig> for RetentionPolicy {
    fn from(config: &RetentionConfig) -> Self {
        Self { check_result_days: config.check_result_days.max(0) }
    }
}

impl RetentionPolicy {
    fn check_result_retention(&self) -> chrono::Duration {
        chrono::Duration::days(self.check_result_days)
    }
}

/// Cleanup manager for expired results
pub struct RetentionCleanup {
    database: Arc<dyn Database>,
    policy: RetentionPolicy,
}

impl RetentionCleanup {
    pub fn new(database: Arc<dyn Database>, policy: RetentionPolicy) -> Self {
        Self { database, policy }
    }

    /// Delete check results older than the horizon, returning how many went.
    pub async fn cleanup_expired_results(&self) -> Result<u64> {
        let cutoff = chrono::Utc::now() - self.policy.check_result_retention();
        debug!(
            "Cleaning up check results (older than {} days, cutoff: {})",
            self.policy.check_result_days, cutoff
        );

        let deleted = self.database.delete_check_results_before(cutoff).await?;
        info!("Retention cleanup completed: {} check results deleted", deleted);
        Ok(deleted)
    }

    /// Start background cleanup task (runs every hour)
    pub fn start_periodic_cleanup(&self) -> tokio::task::JoinHandle<()> {
        let database = Arc::clone(&self.database);
        let policy = self.policy.clone();

        tokio::spawn(async move {
            let cleanup = RetentionCleanup::new(database, policy);
            let mut interval = tokio::time::interval(CLEANUP_INTERVAL);

            loop {
                interval.tick().await;

                if let Err(e) = cleanup.cleanup_expired_results().await {
                    warn!("Periodic check result cleanup failed: {:#}", e);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retention_policy_defaults() {
        let policy = RetentionPolicy::default();
        assert_eq!(policy.check_result_days, 30);
        assert_eq!(policy.check_result_retention(), chrono::Duration::days(30));
    }

    #[test]
    fn test_policy_from_config_clamps_negative() {
        let policy = RetentionPolicy::from(&RetentionConfig { check_result_days: -3 });
        assert_eq!(policy.check_result_days, 0);
    }
}
