use std::collections::BTreeMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Row, params};
use uuid::Uuid;

use super::models::{
    ChannelKind, CheckCounts, CheckResult, CountBucket, Endpoint, Incident, IncidentQuery,
    LatencyBucket, NotificationChannel, Page, from_millis, to_millis,
};
use crate::monitoring::types::EndpointStatus;
use crate::pool::LibsqlPool;

/// Width of the hourly latency buckets, in milliseconds
pub const HOUR_MS: i64 = 3_600_000;
/// Width of the daily uptime buckets, in milliseconds
pub const DAY_MS: i64 = 86_400_000;

/// Database trait for abstracting persistence operations
#[async_trait]
pub trait Database: Send + Sync {
    // Endpoints

    async fn get_endpoint(&self, id: Uuid) -> Result<Option<Endpoint>>;

    async fn list_endpoints(&self) -> Result<Vec<Endpoint>>;

    async fn list_active_endpoints(&self) -> Result<Vec<Endpoint>>;

    async fn insert_endpoint(&self, endpoint: &Endpoint) -> Result<()>;

    /// Overwrite the configuration columns of an endpoint
    async fn update_endpoint(&self, endpoint: &Endpoint) -> Result<()>;

    /// Record the outcome of a probe on the endpoint row (last writer wins)
    async fn update_endpoint_health(
        &self,
        id: Uuid,
        status: EndpointStatus,
        consecutive_failures: u32,
        latency_ms: u64,
        checked_at: DateTime<Utc>,
    ) -> Result<()>;

    async fn delete_endpoint(&self, id: Uuid) -> Result<()>;

    /// Whether any check result or incident references the endpoint
    async fn endpoint_has_history(&self, id: Uuid) -> Result<bool>;

    async fn count_active_endpoints(&self) -> Result<u64>;

    /// Active endpoints grouped by their current status
    async fn status_breakdown(&self) -> Result<Vec<(EndpointStatus, u64)>>;

    // Check results

    async fn insert_check_result(&self, result: &CheckResult) -> Result<i64>;

    async fn check_results_between(
        &self,
        endpoint_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<CheckResult>>;

    async fn recent_check_results(&self, endpoint_id: Uuid, limit: usize) -> Result<Vec<CheckResult>>;

    /// Totals over all endpoints when `endpoint_id` is `None`
    async fn check_counts(
        &self,
        endpoint_id: Option<Uuid>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<CheckCounts>;

    /// Latencies of successful checks, ascending
    async fn successful_latencies(
        &self,
        endpoint_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<u64>>;

    /// Mean latency of successful checks, all endpoints when `endpoint_id` is `None`
    async fn average_latency(
        &self,
        endpoint_id: Option<Uuid>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Option<f64>>;

    async fn latency_buckets(
        &self,
        endpoint_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        bucket_ms: i64,
    ) -> Result<Vec<LatencyBucket>>;

    async fn count_buckets(
        &self,
        endpoint_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        bucket_ms: i64,
    ) -> Result<Vec<CountBucket>>;

    async fn delete_check_results_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    // Incidents

    async fn find_open_incident(&self, endpoint_id: Uuid) -> Result<Option<Incident>>;

    async fn open_incident(
        &self,
        endpoint_id: Uuid,
        started_at: DateTime<Utc>,
        failure_count: u32,
        error: Option<String>,
    ) -> Result<Incident>;

    async fn resolve_incident(
        &self,
        id: i64,
        resolved_at: DateTime<Utc>,
        duration_ms: i64,
    ) -> Result<()>;

    async fn get_incident(&self, id: i64) -> Result<Option<Incident>>;

    async fn list_incidents(&self, query: &IncidentQuery) -> Result<Page<Incident>>;

    async fn count_open_incidents(&self, endpoint_id: Option<Uuid>) -> Result<u64>;

    async fn count_incidents_since(&self, endpoint_id: Option<Uuid>, since: DateTime<Utc>) -> Result<u64>;

    // Notification channels

    async fn active_channels(&self) -> Result<Vec<NotificationChannel>>;

    async fn get_channel(&self, id: Uuid) -> Result<Option<NotificationChannel>>;

    async fn save_channel(&self, channel: &NotificationChannel) -> Result<()>;
}

const ENDPOINT_COLUMNS: &str = "id, name, url, method, headers, body, interval_seconds, \
     expected_status, timeout_ms, active, status, last_latency_ms, last_checked_at, \
     consecutive_failures, created_at, updated_at";

const CHECK_COLUMNS: &str = "id, endpoint_id, success, latency_ms, status_code, error, checked_at";

const INCIDENT_COLUMNS: &str =
    "id, endpoint_id, started_at, resolved_at, duration_ms, failure_count, error";

/// LibSQL database implementation
pub struct DatabaseImpl {
    pool: LibsqlPool,
}

impl DatabaseImpl {
    /// Create a new database instance from a pool
    pub fn new_from_pool(pool: LibsqlPool) -> Self {
        Self { pool }
    }

    /// Get a connection from the pool
    async fn get_conn(&self) -> Result<deadpool::managed::Object<crate::pool::LibsqlManager>> {
        self.pool.get().await.map_err(|e| anyhow::anyhow!("database pool unavailable: {e}"))
    }

    async fn query_endpoints(&self, sql: &str) -> Result<Vec<Endpoint>> {
        let conn = self.get_conn().await?;
        let mut rows = conn.query(sql, ()).await?;
        let mut endpoints = Vec::new();
        while let Some(row) = rows.next().await? {
            endpoints.push(endpoint_from_row(&row)?);
        }
        Ok(endpoints)
    }

    async fn query_single_u64(&self, sql: &str, params: impl libsql::params::IntoParams) -> Result<u64> {
        let conn = self.get_conn().await?;
        let mut rows = conn.query(sql, params).await?;
        match rows.next().await? {
            Some(row) => Ok(row.get::<Option<i64>>(0)?.unwrap_or(0).max(0) as u64),
            None => Ok(0),
        }
    }
}

fn endpoint_from_row(row: &Row) -> Result<Endpoint> {
    let id: String = row.get(0)?;
    let headers: String = row.get(4)?;
    let status: String = row.get(10)?;

    Ok(Endpoint {
        id: Uuid::parse_str(&id)?,
        name: row.get(1)?,
        url: row.get(2)?,
        method: row.get(3)?,
        headers: serde_json::from_str::<BTreeMap<String, String>>(&headers)
            .with_context(|| format!("decoding headers of endpoint {id}"))?,
        body: row.get(5)?,
        interval_seconds: row.get::<i64>(6)? as u64,
        expected_status: row.get::<i64>(7)? as u16,
        timeout_ms: row.get::<i64>(8)? as u64,
        active: row.get::<i64>(9)? != 0,
        status: EndpointStatus::parse(&status),
        last_latency_ms: row.get::<Option<i64>>(11)?.map(|v| v as u64),
        last_checked_at: row.get::<Option<i64>>(12)?.map(from_millis),
        consecutive_failures: row.get::<i64>(13)? as u32,
        created_at: from_millis(row.get(14)?),
        updated_at: from_millis(row.get(15)?),
    })
}

fn check_from_row(row: &Row) -> Result<CheckResult> {
    let endpoint_id: String = row.get(1)?;
    Ok(CheckResult {
        id: Some(row.get(0)?),
        endpoint_id: Uuid::parse_str(&endpoint_id)?,
        success: row.get::<i64>(2)? != 0,
        latency_ms: row.get::<i64>(3)?.max(0) as u64,
        status_code: row.get::<Option<i64>>(4)?.map(|v| v as u16),
        error: row.get(5)?,
        checked_at: from_millis(row.get(6)?),
    })
}

fn incident_from_row(row: &Row) -> Result<Incident> {
    let endpoint_id: String = row.get(1)?;
    Ok(Incident {
        id: row.get(0)?,
        endpoint_id: Uuid::parse_str(&endpoint_id)?,
        started_at: from_millis(row.get(2)?),
        resolved_at: row.get::<Option<i64>>(3)?.map(from_millis),
        duration_ms: row.get(4)?,
        failure_count: row.get::<i64>(5)? as u32,
        error: row.get(6)?,
    })
}

fn channel_from_row(row: &Row) -> Result<NotificationChannel> {
    let id: String = row.get(0)?;
    let kind: String = row.get(2)?;
    let config: String = row.get(3)?;
    Ok(NotificationChannel {
        id: Uuid::parse_str(&id)?,
        name: row.get(1)?,
        kind: kind.parse::<ChannelKind>().map_err(anyhow::Error::msg)?,
        config: serde_json::from_str(&config)
            .with_context(|| format!("decoding config of channel {id}"))?,
        active: row.get::<i64>(4)? != 0,
    })
}

fn optional_id(id: Option<Uuid>) -> Option<String> {
    id.map(|id| id.to_string())
}

#[async_trait]
impl Database for DatabaseImpl {
    async fn get_endpoint(&self, id: Uuid) -> Result<Option<Endpoint>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                &format!("SELECT {ENDPOINT_COLUMNS} FROM endpoints WHERE id = ?"),
                params![id.to_string()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(endpoint_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn list_endpoints(&self) -> Result<Vec<Endpoint>> {
        self.query_endpoints(&format!("SELECT {ENDPOINT_COLUMNS} FROM endpoints ORDER BY name"))
            .await
    }

    async fn list_active_endpoints(&self) -> Result<Vec<Endpoint>> {
        self.query_endpoints(&format!(
            "SELECT {ENDPOINT_COLUMNS} FROM endpoints WHERE active = 1 ORDER BY name"
        ))
        .await
    }

    async fn insert_endpoint(&self, endpoint: &Endpoint) -> Result<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            &format!(
                "INSERT INTO endpoints ({ENDPOINT_COLUMNS}) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
            ),
            params![
                endpoint.id.to_string(),
                endpoint.name.clone(),
                endpoint.url.clone(),
                endpoint.method.clone(),
                serde_json::to_string(&endpoint.headers)?,
                endpoint.body.clone(),
                endpoint.interval_seconds as i64,
                endpoint.expected_status as i64,
                endpoint.timeout_ms as i64,
                if endpoint.active { 1 } else { 0 },
                endpoint.status.as_str(),
                endpoint.last_latency_ms.map(|v| v as i64),
                endpoint.last_checked_at.map(to_millis),
                endpoint.consecutive_failures as i64,
                to_millis(endpoint.created_at),
                to_millis(endpoint.updated_at)
            ],
        )
        .await?;
        Ok(())
    }

    async fn update_endpoint(&self, endpoint: &Endpoint) -> Result<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "UPDATE endpoints SET name = ?, url = ?, method = ?, headers = ?, body = ?, \
             interval_seconds = ?, expected_status = ?, timeout_ms = ?, active = ?, updated_at = ? \
             WHERE id = ?",
            params![
                endpoint.name.clone(),
                endpoint.url.clone(),
                endpoint.method.clone(),
                serde_json::to_string(&endpoint.headers)?,
                endpoint.body.clone(),
                endpoint.interval_seconds as i64,
                endpoint.expected_status as i64,
                endpoint.timeout_ms as i64,
                if endpoint.active { 1 } else { 0 },
                to_millis(endpoint.updated_at),
                endpoint.id.to_string()
            ],
        )
        .await?;
        Ok(())
    }

    async fn update_endpoint_health(
        &self,
        id: Uuid,
        status: EndpointStatus,
        consecutive_failures: u32,
        latency_ms: u64,
        checked_at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "UPDATE endpoints SET status = ?, consecutive_failures = ?, last_latency_ms = ?, \
             last_checked_at = ? WHERE id = ?",
            params![
                status.as_str(),
                consecutive_failures as i64,
                latency_ms as i64,
                to_millis(checked_at),
                id.to_string()
            ],
        )
        .await?;
        Ok(())
    }

    async fn delete_endpoint(&self, id: Uuid) -> Result<()> {
        let conn = self.get_conn().await?;
        conn.execute("DELETE FROM endpoints WHERE id = ?", params![id.to_string()]).await?;
        Ok(())
    }

    async fn endpoint_has_history(&self, id: Uuid) -> Result<bool> {
        let count = self
            .query_single_u64(
                "SELECT (SELECT COUNT(*) FROM check_results WHERE endpoint_id = ?1) + \
                 (SELECT COUNT(*) FROM incidents WHERE endpoint_id = ?1)",
                params![id.to_string()],
            )
            .await?;
        Ok(count > 0)
    }

    async fn count_active_endpoints(&self) -> Result<u64> {
        self.query_single_u64("SELECT COUNT(*) FROM endpoints WHERE active = 1", ()).await
    }

    async fn status_breakdown(&self) -> Result<Vec<(EndpointStatus, u64)>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT status, COUNT(*) FROM endpoints WHERE active = 1 GROUP BY status",
                (),
            )
            .await?;

        let mut breakdown = Vec::new();
        while let Some(row) = rows.next().await? {
            let status: String = row.get(0)?;
            breakdown.push((EndpointStatus::parse(&status), row.get::<i64>(1)?.max(0) as u64));
        }
        Ok(breakdown)
    }

    async fn insert_check_result(&self, result: &CheckResult) -> Result<i64> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO check_results (endpoint_id, success, latency_ms, status_code, error, checked_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                result.endpoint_id.to_string(),
                if result.success { 1 } else { 0 },
                result.latency_ms as i64,
                result.status_code.map(|v| v as i64),
                result.error.clone(),
                to_millis(result.checked_at)
            ],
        )
        .await?;

        Ok(conn.last_insert_rowid())
    }

    async fn check_results_between(
        &self,
        endpoint_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<CheckResult>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {CHECK_COLUMNS} FROM check_results \
                     WHERE endpoint_id = ? AND checked_at >= ? AND checked_at <= ? \
                     ORDER BY checked_at ASC"
                ),
                params![endpoint_id.to_string(), to_millis(from), to_millis(to)],
            )
            .await?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await? {
            results.push(check_from_row(&row)?);
        }
        Ok(results)
    }

    async fn recent_check_results(&self, endpoint_id: Uuid, limit: usize) -> Result<Vec<CheckResult>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {CHECK_COLUMNS} FROM check_results WHERE endpoint_id = ? \
                     ORDER BY checked_at DESC, id DESC LIMIT ?"
                ),
                params![endpoint_id.to_string(), limit as i64],
            )
            .await?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await? {
            results.push(check_from_row(&row)?);
        }
        Ok(results)
    }

    async fn check_counts(
        &self,
        endpoint_id: Option<Uuid>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<CheckCounts> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT COUNT(*), COALESCE(SUM(success), 0) FROM check_results \
                 WHERE (?1 IS NULL OR endpoint_id = ?1) AND checked_at >= ?2 AND checked_at <= ?3",
                params![optional_id(endpoint_id), to_millis(from), to_millis(to)],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(CheckCounts {
                total: row.get::<i64>(0)?.max(0) as u64,
                successful: row.get::<i64>(1)?.max(0) as u64,
            }),
            None => Ok(CheckCounts::default()),
        }
    }

    async fn successful_latencies(
        &self,
        endpoint_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<u64>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT latency_ms FROM check_results \
                 WHERE endpoint_id = ? AND success = 1 AND checked_at >= ? AND checked_at <= ? \
                 ORDER BY latency_ms ASC",
                params![endpoint_id.to_string(), to_millis(from), to_millis(to)],
            )
            .await?;

        let mut latencies = Vec::new();
        while let Some(row) = rows.next().await? {
            latencies.push(row.get::<i64>(0)?.max(0) as u64);
        }
        Ok(latencies)
    }

    async fn average_latency(
        &self,
        endpoint_id: Option<Uuid>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Option<f64>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT AVG(latency_ms) FROM check_results \
                 WHERE (?1 IS NULL OR endpoint_id = ?1) AND success = 1 \
                 AND checked_at >= ?2 AND checked_at <= ?3",
                params![optional_id(endpoint_id), to_millis(from), to_millis(to)],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(row.get::<Option<f64>>(0)?),
            None => Ok(None),
        }
    }

    async fn latency_buckets(
        &self,
        endpoint_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        bucket_ms: i64,
    ) -> Result<Vec<LatencyBucket>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT (checked_at / ?1) * ?1 AS bucket, AVG(latency_ms), COUNT(*) \
                 FROM check_results \
                 WHERE endpoint_id = ?2 AND success = 1 AND checked_at >= ?3 AND checked_at <= ?4 \
                 GROUP BY bucket ORDER BY bucket ASC",
                params![bucket_ms.max(1), endpoint_id.to_string(), to_millis(from), to_millis(to)],
            )
            .await?;

        let mut buckets = Vec::new();
        while let Some(row) = rows.next().await? {
            buckets.push(LatencyBucket {
                bucket_start: from_millis(row.get(0)?),
                avg_latency_ms: row.get::<Option<f64>>(1)?.unwrap_or(0.0),
                samples: row.get::<i64>(2)?.max(0) as u64,
            });
        }
        Ok(buckets)
    }

    async fn count_buckets(
        &self,
        endpoint_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        bucket_ms: i64,
    ) -> Result<Vec<CountBucket>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT (checked_at / ?1) * ?1 AS bucket, COUNT(*), COALESCE(SUM(success), 0) \
                 FROM check_results \
                 WHERE endpoint_id = ?2 AND checked_at >= ?3 AND checked_at <= ?4 \
                 GROUP BY bucket ORDER BY bucket ASC",
                params![bucket_ms.max(1), endpoint_id.to_string(), to_millis(from), to_millis(to)],
            )
            .await?;

        let mut buckets = Vec::new();
        while let Some(row) = rows.next().await? {
            buckets.push(CountBucket {
                bucket_start: from_millis(row.get(0)?),
                counts: CheckCounts {
                    total: row.get::<i64>(1)?.max(0) as u64,
                    successful: row.get::<i64>(2)?.max(0) as u64,
                },
            });
        }
        Ok(buckets)
    }

    async fn delete_check_results_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let conn = self.get_conn().await?;
        let deleted = conn
            .execute("DELETE FROM check_results WHERE checked_at < ?", params![to_millis(cutoff)])
            .await?;
        Ok(deleted)
    }

    async fn find_open_incident(&self, endpoint_id: Uuid) -> Result<Option<Incident>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {INCIDENT_COLUMNS} FROM incidents \
                     WHERE endpoint_id = ? AND resolved_at IS NULL \
                     ORDER BY started_at DESC LIMIT 1"
                ),
                params![endpoint_id.to_string()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(incident_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn open_incident(
        &self,
        endpoint_id: Uuid,
        started_at: DateTime<Utc>,
        failure_count: u32,
        error: Option<String>,
    ) -> Result<Incident> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO incidents (endpoint_id, started_at, failure_count, error) VALUES (?, ?, ?, ?)",
            params![
                endpoint_id.to_string(),
                to_millis(started_at),
                failure_count as i64,
                error.clone()
            ],
        )
        .await?;

        Ok(Incident {
            id: conn.last_insert_rowid(),
            endpoint_id,
            started_at: from_millis(to_millis(started_at)),
            resolved_at: None,
            duration_ms: None,
            failure_count,
            error,
        })
    }

    async fn resolve_incident(
        &self,
        id: i64,
        resolved_at: DateTime<Utc>,
        duration_ms: i64,
    ) -> Result<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "UPDATE incidents SET resolved_at = ?, duration_ms = ? WHERE id = ? AND resolved_at IS NULL",
            params![to_millis(resolved_at), duration_ms, id],
        )
        .await?;
        Ok(())
    }

    async fn get_incident(&self, id: i64) -> Result<Option<Incident>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(&format!("SELECT {INCIDENT_COLUMNS} FROM incidents WHERE id = ?"), params![id])
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(incident_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn list_incidents(&self, query: &IncidentQuery) -> Result<Page<Incident>> {
        const FILTER: &str = "(?1 IS NULL OR endpoint_id = ?1) AND (?2 = 'all' \
             OR (?2 = 'active' AND resolved_at IS NULL) \
             OR (?2 = 'resolved' AND resolved_at IS NOT NULL))";

        let total = self
            .query_single_u64(
                &format!("SELECT COUNT(*) FROM incidents WHERE {FILTER}"),
                params![optional_id(query.endpoint_id), query.state.as_str()],
            )
            .await?;

        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {INCIDENT_COLUMNS} FROM incidents WHERE {FILTER} \
                     ORDER BY started_at DESC, id DESC LIMIT ?3 OFFSET ?4"
                ),
                params![
                    optional_id(query.endpoint_id),
                    query.state.as_str(),
                    query.limit() as i64,
                    query.offset() as i64
                ],
            )
            .await?;

        let mut items = Vec::new();
        while let Some(row) = rows.next().await? {
            items.push(incident_from_row(&row)?);
        }

        Ok(Page { items, total, page: query.page.max(1), per_page: query.limit() })
    }

    async fn count_open_incidents(&self, endpoint_id: Option<Uuid>) -> Result<u64> {
        self.query_single_u64(
            "SELECT COUNT(*) FROM incidents WHERE (?1 IS NULL OR endpoint_id = ?1) AND resolved_at IS NULL",
            params![optional_id(endpoint_id)],
        )
        .await
    }

    async fn count_incidents_since(&self, endpoint_id: Option<Uuid>, since: DateTime<Utc>) -> Result<u64> {
        self.query_single_u64(
            "SELECT COUNT(*) FROM incidents WHERE (?1 IS NULL OR endpoint_id = ?1) AND started_at >= ?2",
            params![optional_id(endpoint_id), to_millis(since)],
        )
        .await
    }

    async fn active_channels(&self) -> Result<Vec<NotificationChannel>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT id, name, kind, config, active FROM notification_channels \
                 WHERE active = 1 ORDER BY name",
                (),
            )
            .await?;

        let mut channels = Vec::new();
        while let Some(row) = rows.next().await? {
            channels.push(channel_from_row(&row)?);
        }
        Ok(channels)
    }

    async fn get_channel(&self, id: Uuid) -> Result<Option<NotificationChannel>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT id, name, kind, config, active FROM notification_channels WHERE id = ?",
                params![id.to_string()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(channel_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn save_channel(&self, channel: &NotificationChannel) -> Result<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO notification_channels (id, name, kind, config, active) VALUES (?1, ?2, ?3, ?4, ?5) \
             ON CONFLICT(id) DO UPDATE SET name = ?2, kind = ?3, config = ?4, active = ?5",
            params![
                channel.id.to_string(),
                channel.name.clone(),
                channel.kind.as_str(),
                serde_json::to_string(&channel.config)?,
                if channel.active { 1 } else { 0 }
            ],
        )
        .await?;
        Ok(())
    }
}
