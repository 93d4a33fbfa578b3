use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use futures::future::try_join_all;
use tracing::debug;
use uuid::Uuid;

use super::{
    EndpointRanking, IncidentDetail, Overview, ResponseTimeStats, StatsWindow, StatusCount,
    UptimeDay, rank, round2, stability_score, uptime_percentage,
};
use crate::cache::Cache;
use crate::database::models::{Endpoint, Incident, IncidentQuery, Page};
use crate::database::repository::{DAY_MS, HOUR_MS};
use crate::database::Database;
use crate::error::{MonitorError, MonitorResult};
use crate::monitoring::types::EndpointStatus;

pub const ENDPOINT_STATS_TTL: Duration = Duration::from_secs(60);
pub const OVERVIEW_TTL: Duration = Duration::from_secs(60);
pub const COMPARISON_TTL: Duration = Duration::from_secs(300);

pub const MAX_HISTORY_DAYS: u32 = 90;

pub struct StatisticsEngine {
    database: Arc<dyn Database>,
    cache: Cache,
}

impl StatisticsEngine {
    pub fn new(database: Arc<dyn Database>, cache: Cache) -> Self {
        Self { database, cache }
    }

    pub async fn uptime(&self, endpoint_id: Uuid, window: StatsWindow) -> MonitorResult<f64> {
        let key = format!("stats:uptime:{endpoint_id}:{}", window.cache_tag());
        self.cache
            .get_or_compute(&key, Some(ENDPOINT_STATS_TTL), || async move {
                let (from, to) = window.range(Utc::now());
                let counts = self.database.check_counts(Some(endpoint_id), from, to).await?;
                Ok::<_, MonitorError>(uptime_percentage(counts.successful, counts.total))
            })
            .await
    }

    pub async fn response_time_stats(
        &self,
        endpoint_id: Uuid,
        window: StatsWindow,
    ) -> MonitorResult<ResponseTimeStats> {
        let key = format!("stats:latency:{endpoint_id}:{}", window.cache_tag());
        self.cache
            .get_or_compute(&key, Some(ENDPOINT_STATS_TTL), || async move {
                let (from, to) = window.range(Utc::now());
                let (latencies, series) = tokio::try_join!(
                    self.database.successful_latencies(endpoint_id, from, to),
                    self.database.latency_buckets(endpoint_id, from, to, HOUR_MS),
                )?;
                Ok::<_, MonitorError>(ResponseTimeStats::from_sorted(&latencies, series))
            })
            .await
    }

    /// Daily uptime for the last `days` days, oldest first. Days without
    /// checks are left out.
    pub async fn uptime_history(&self, endpoint_id: Uuid, days: u32) -> MonitorResult<Vec<UptimeDay>> {
        let days = days.clamp(1, MAX_HISTORY_DAYS);
        let key = format!("stats:history:{endpoint_id}:{days}");
        self.cache
            .get_or_compute(&key, Some(ENDPOINT_STATS_TTL), || async move {
                let to = Utc::now();
                let from = to - ChronoDuration::days(i64::from(days));
                let buckets = self.database.count_buckets(endpoint_id, from, to, DAY_MS).await?;
                let history = buckets
                    .into_iter()
                    .map(|bucket| UptimeDay {
                        day: bucket.bucket_start,
                        total: bucket.counts.total,
                        successful: bucket.counts.successful,
                        uptime: uptime_percentage(bucket.counts.successful, bucket.counts.total),
                    })
                    .collect::<Vec<_>>();
                Ok::<_, MonitorError>(history)
            })
            .await
    }

    pub async fn overview(&self) -> MonitorResult<Overview> {
        self.cache
            .get_or_compute("stats:overview", Some(OVERVIEW_TTL), || async move {
                let now = Utc::now();
                let day_ago = now - ChronoDuration::hours(24);
                let db = &self.database;

                let (total_endpoints, breakdown, counts, open_incidents, incidents_24h, avg_latency) = tokio::try_join!(
                    db.count_active_endpoints(),
                    db.status_breakdown(),
                    db.check_counts(None, day_ago, now),
                    db.count_open_incidents(None),
                    db.count_incidents_since(None, day_ago),
                    db.average_latency(None, day_ago, now),
                )?;

                debug!(total_endpoints, open_incidents, "Computed overview");
                Ok::<_, MonitorError>(Overview {
                    total_endpoints,
                    status_breakdown: full_breakdown(&breakdown),
                    uptime_24h: uptime_percentage(counts.successful, counts.total),
                    open_incidents,
                    incidents_24h,
                    avg_latency_ms: round2(avg_latency.unwrap_or(0.0)),
                    generated_at: now,
                })
            })
            .await
    }

    /// Active endpoints ranked by stability over the last 24h.
    pub async fn comparison(&self) -> MonitorResult<Vec<EndpointRanking>> {
        self.cache
            .get_or_compute("stats:comparison", Some(COMPARISON_TTL), || async move {
                let endpoints = self.database.list_active_endpoints().await?;
                let rankings = try_join_all(endpoints.iter().map(|endpoint| self.ranking_for(endpoint))).await?;
                Ok::<_, MonitorError>(rank(rankings))
            })
            .await
    }

    async fn ranking_for(&self, endpoint: &Endpoint) -> MonitorResult<EndpointRanking> {
        let now = Utc::now();
        let day_ago = now - ChronoDuration::hours(24);
        let db = &self.database;

        let (counts, avg_latency, incidents_24h) = tokio::try_join!(
            db.check_counts(Some(endpoint.id), day_ago, now),
            db.average_latency(Some(endpoint.id), day_ago, now),
            db.count_incidents_since(Some(endpoint.id), day_ago),
        )?;

        let uptime_24h = uptime_percentage(counts.successful, counts.total);
        let avg_latency_ms = round2(avg_latency.unwrap_or(0.0));
        Ok(EndpointRanking {
            rank: 0,
            endpoint_id: endpoint.id,
            name: endpoint.name.clone(),
            status: endpoint.status,
            uptime_24h,
            avg_latency_ms,
            incidents_24h,
            stability_score: stability_score(uptime_24h, avg_latency_ms, incidents_24h),
        })
    }

    pub async fn list_incidents(&self, query: &IncidentQuery) -> MonitorResult<Page<Incident>> {
        Ok(self.database.list_incidents(query).await?)
    }

    pub async fn incident_detail(&self, incident_id: i64) -> MonitorResult<IncidentDetail> {
        let incident = self
            .database
            .get_incident(incident_id)
            .await?
            .ok_or(MonitorError::IncidentNotFound(incident_id))?;

        let until = incident.resolved_at.unwrap_or_else(Utc::now);
        let (endpoint, checks) = tokio::try_join!(
            self.database.get_endpoint(incident.endpoint_id),
            self.database.check_results_between(incident.endpoint_id, incident.started_at, until),
        )?;

        Ok(IncidentDetail { incident, endpoint, checks })
    }
}

/// Every status, zero-filled, in a stable order
fn full_breakdown(counts: &[(EndpointStatus, u64)]) -> Vec<StatusCount> {
    EndpointStatus::ALL
        .iter()
        .map(|status| StatusCount {
            status: *status,
            count: counts
                .iter()
                .filter(|(counted, _)| counted == status)
                .map(|(_, count)| count)
                .sum(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_breakdown_fills_missing_statuses() {
        let breakdown = full_breakdown(&[(EndpointStatus::Up, 3), (EndpointStatus::Down, 1)]);
        assert_eq!(breakdown.len(), 4);
        assert_eq!(breakdown[0], StatusCount { status: EndpointStatus::Up, count: 3 });
        assert_eq!(breakdown[1], StatusCount { status: EndpointStatus::Down, count: 1 });
        assert_eq!(breakdown[2].count, 0);
        assert_eq!(breakdown[3].count, 0);
    }
}
