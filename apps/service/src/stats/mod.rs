/// Statistics - uptime, latency distribution, overview and rankings
///
/// Every query degrades to zeros or empty series on empty data. Results are
/// memoized in the cache under the `stats:` namespace, which the probe engine
/// drops whenever an endpoint changes status.
pub mod engine;

pub use engine::StatisticsEngine;

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::database::models::{CheckResult, Endpoint, Incident, LatencyBucket};
use crate::monitoring::types::EndpointStatus;

/// Time range a statistic is computed over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatsWindow {
    #[serde(rename = "1h")]
    Hour,
    #[serde(rename = "24h")]
    Day,
    #[serde(rename = "7d")]
    Week,
    #[serde(rename = "30d")]
    Month,
    Custom { from: DateTime<Utc>, to: DateTime<Utc> },
}

impl StatsWindow {
    /// `[from, to]` ending at `now` for the rolling windows
    pub fn range(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        match *self {
            StatsWindow::Hour => (now - Duration::hours(1), now),
            StatsWindow::Day => (now - Duration::hours(24), now),
            StatsWindow::Week => (now - Duration::days(7), now),
            StatsWindow::Month => (now - Duration::days(30), now),
            StatsWindow::Custom { from, to } => (from, to),
        }
    }

    /// Part of the cache key
    pub fn cache_tag(&self) -> String {
        match self {
            StatsWindow::Custom { from, to } => {
                format!("{}-{}", from.timestamp_millis(), to.timestamp_millis())
            }
            rolling => rolling.to_string(),
        }
    }
}

impl fmt::Display for StatsWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatsWindow::Hour => f.write_str("1h"),
            StatsWindow::Day => f.write_str("24h"),
            StatsWindow::Week => f.write_str("7d"),
            StatsWindow::Month => f.write_str("30d"),
            StatsWindow::Custom { from, to } => write!(f, "{}..{}", from.to_rfc3339(), to.to_rfc3339()),
        }
    }
}

impl std::str::FromStr for StatsWindow {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "1h" => Ok(StatsWindow::Hour),
            "24h" => Ok(StatsWindow::Day),
            "7d" => Ok(StatsWindow::Week),
            "30d" => Ok(StatsWindow::Month),
            other => Err(format!("unknown window '{other}', expected 1h, 24h, 7d or 30d")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseTimeStats {
    pub samples: u64,
    pub avg_ms: f64,
    pub min_ms: u64,
    pub max_ms: u64,
    pub p50_ms: u64,
    pub p95_ms: u64,
    pub p99_ms: u64,
    /// Hourly averages
    pub series: Vec<LatencyBucket>,
}

impl ResponseTimeStats {
    /// Summarize ascending latencies
    pub fn from_sorted(latencies: &[u64], series: Vec<LatencyBucket>) -> Self {
        let (Some(&min_ms), Some(&max_ms)) = (latencies.first(), latencies.last()) else {
            return Self { series, ..Self::default() };
        };
        let sum: u64 = latencies.iter().sum();
        Self {
            samples: latencies.len() as u64,
            avg_ms: round2(sum as f64 / latencies.len() as f64),
            min_ms,
            max_ms,
            p50_ms: percentile(latencies, 50.0),
            p95_ms: percentile(latencies, 95.0),
            p99_ms: percentile(latencies, 99.0),
            series,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UptimeDay {
    pub day: DateTime<Utc>,
    pub total: u64,
    pub successful: u64,
    pub uptime: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusCount {
    pub status: EndpointStatus,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Overview {
    pub total_endpoints: u64,
    pub status_breakdown: Vec<StatusCount>,
    pub uptime_24h: f64,
    pub open_incidents: u64,
    pub incidents_24h: u64,
    pub avg_latency_ms: f64,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointRanking {
    pub rank: usize,
    pub endpoint_id: Uuid,
    pub name: String,
    pub status: EndpointStatus,
    pub uptime_24h: f64,
    pub avg_latency_ms: f64,
    pub incidents_24h: u64,
    pub stability_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentDetail {
    pub incident: Incident,
    pub endpoint: Option<Endpoint>,
    /// Checks recorded between the start and the resolution (or now)
    pub checks: Vec<CheckResult>,
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// `successful / total * 100`, zero when nothing was recorded
pub fn uptime_percentage(successful: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round2(successful as f64 / total as f64 * 100.0)
}

/// Nearest-rank percentile of ascending values; 0 for an empty slice.
pub fn percentile(sorted: &[u64], p: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = (p / 100.0 * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

pub const LATENCY_CEILING_MS: f64 = 5_000.0;
pub const INCIDENT_CEILING: f64 = 5.0;

/// Weighted 0-100 score: 60% uptime, 30% latency, 10% incident count.
pub fn stability_score(uptime_pct: f64, avg_latency_ms: f64, incidents_24h: u64) -> f64 {
    let uptime = uptime_pct / 100.0;
    let latency = 1.0 - (avg_latency_ms / LATENCY_CEILING_MS).min(1.0);
    let incidents = 1.0 - (incidents_24h as f64 / INCIDENT_CEILING).min(1.0);
    round2((0.6 * uptime + 0.3 * latency + 0.1 * incidents) * 100.0)
}

/// Sort by score, best first, and number the positions from 1.
pub fn rank(mut rankings: Vec<EndpointRanking>) -> Vec<EndpointRanking> {
    rankings.sort_by(|a, b| b.stability_score.total_cmp(&a.stability_score));
    for (position, ranking) in rankings.iter_mut().enumerate() {
        ranking.rank = position + 1;
    }
    rankings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uptime_percentage() {
        assert_eq!(uptime_percentage(95, 100), 95.0);
        assert_eq!(uptime_percentage(2, 3), 66.67);
        assert_eq!(uptime_percentage(0, 0), 0.0);
    }

    #[test]
    fn test_nearest_rank_percentile() {
        let values: Vec<u64> = (1..=100).collect();
        assert_eq!(percentile(&values, 50.0), 50);
        assert_eq!(percentile(&values, 95.0), 95);
        assert_eq!(percentile(&values, 99.0), 99);
        assert_eq!(percentile(&[42], 99.0), 42);
        assert_eq!(percentile(&[10, 20, 30, 40], 50.0), 20);
        assert_eq!(percentile(&[], 50.0), 0);
    }

    #[test]
    fn test_empty_latencies_are_zero() {
        let stats = ResponseTimeStats::from_sorted(&[], Vec::new());
        assert_eq!(stats, ResponseTimeStats::default());
    }

    #[test]
    fn test_latency_summary() {
        let stats = ResponseTimeStats::from_sorted(&[100, 200, 300, 400], Vec::new());
        assert_eq!(stats.samples, 4);
        assert_eq!(stats.avg_ms, 250.0);
        assert_eq!(stats.min_ms, 100);
        assert_eq!(stats.max_ms, 400);
        assert_eq!(stats.p50_ms, 200);
        assert_eq!(stats.p99_ms, 400);
    }

    #[test]
    fn test_stability_score() {
        assert_eq!(stability_score(100.0, 0.0, 0), 100.0);
        assert_eq!(stability_score(0.0, 5_000.0, 5), 0.0);
        // 0.6*0.9 + 0.3*(1-0.5) + 0.1*(1-0.2) = 0.77
        assert_eq!(stability_score(90.0, 2_500.0, 1), 77.0);
        // Latency and incidents saturate at their ceilings
        assert_eq!(stability_score(100.0, 60_000.0, 50), 60.0);
    }

    #[test]
    fn test_rank_orders_descending() {
        let entry = |name: &str, score: f64| EndpointRanking {
            rank: 0,
            endpoint_id: Uuid::new_v4(),
            name: name.to_string(),
            status: EndpointStatus::Up,
            uptime_24h: 0.0,
            avg_latency_ms: 0.0,
            incidents_24h: 0,
            stability_score: score,
        };
        let ranked = rank(vec![entry("b", 50.0), entry("a", 90.0), entry("c", 10.0)]);
        let order: Vec<(&str, usize)> = ranked.iter().map(|r| (r.name.as_str(), r.rank)).collect();
        assert_eq!(order, vec![("a", 1), ("b", 2), ("c", 3)]);
    }

    #[test]
    fn test_window_parse_and_tag() {
        assert_eq!("24h".parse::<StatsWindow>().unwrap(), StatsWindow::Day);
        assert!("2d".parse::<StatsWindow>().is_err());
        assert_eq!(StatsWindow::Week.cache_tag(), "7d");

        let now = Utc::now();
        let (from, to) = StatsWindow::Hour.range(now);
        assert_eq!(to - from, Duration::hours(1));
    }
}
