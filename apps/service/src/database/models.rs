use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::monitoring::types::EndpointStatus;

pub const DEFAULT_INTERVAL_SECONDS: u64 = 60;
pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_EXPECTED_STATUS: u16 = 200;

/// Endpoint model - a monitored HTTP resource and its live health state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: Uuid,
    pub name: String,
    pub url: String,
    pub method: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
    pub interval_seconds: u64,
    pub expected_status: u16,
    pub timeout_ms: u64,
    pub active: bool,
    pub status: EndpointStatus,
    pub last_latency_ms: Option<u64>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Endpoint {
    /// Create a new, never-probed endpoint with default probe settings
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            url: url.into(),
            method: "GET".to_string(),
            headers: BTreeMap::new(),
            body: None,
            interval_seconds: DEFAULT_INTERVAL_SECONDS,
            expected_status: DEFAULT_EXPECTED_STATUS,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            active: true,
            status: EndpointStatus::Unknown,
            last_latency_ms: None,
            last_checked_at: None,
            consecutive_failures: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Fields accepted when registering an endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEndpoint {
    pub name: String,
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default = "default_interval")]
    pub interval_seconds: u64,
    #[serde(default = "default_expected_status")]
    pub expected_status: u16,
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,
    #[serde(default = "default_active")]
    pub active: bool,
}

impl NewEndpoint {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            method: default_method(),
            headers: BTreeMap::new(),
            body: None,
            interval_seconds: default_interval(),
            expected_status: default_expected_status(),
            timeout_ms: default_timeout(),
            active: default_active(),
        }
    }

    pub fn into_endpoint(self) -> Endpoint {
        let mut endpoint = Endpoint::new(self.name, self.url);
        endpoint.method = self.method.to_ascii_uppercase();
        endpoint.headers = self.headers;
        endpoint.body = self.body;
        endpoint.interval_seconds = self.interval_seconds;
        endpoint.expected_status = self.expected_status;
        endpoint.timeout_ms = self.timeout_ms;
        endpoint.active = self.active;
        endpoint
    }
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_interval() -> u64 {
    DEFAULT_INTERVAL_SECONDS
}

fn default_expected_status() -> u16 {
    DEFAULT_EXPECTED_STATUS
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_active() -> bool {
    true
}

/// Partial update of an endpoint; `None` leaves the field untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndpointPatch {
    pub name: Option<String>,
    pub url: Option<String>,
    pub method: Option<String>,
    pub headers: Option<BTreeMap<String, String>>,
    /// `Some(None)` clears the body template.
    pub body: Option<Option<String>>,
    pub interval_seconds: Option<u64>,
    pub expected_status: Option<u16>,
    pub timeout_ms: Option<u64>,
    pub active: Option<bool>,
}

/// CheckResult model - one immutable probe outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub id: Option<i64>,
    pub endpoint_id: Uuid,
    pub success: bool,
    pub latency_ms: u64,
    pub status_code: Option<u16>,
    pub error: Option<String>,
    pub checked_at: DateTime<Utc>,
}

/// Incident model - an interval during which an endpoint was DOWN
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub id: i64,
    pub endpoint_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub failure_count: u32,
    pub error: Option<String>,
}

impl Incident {
    pub fn is_open(&self) -> bool {
        self.resolved_at.is_none()
    }
}

/// Kind of notification channel; each kind maps to one delivery strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Email,
    Webhook,
    Slack,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Email => "email",
            ChannelKind::Webhook => "webhook",
            ChannelKind::Slack => "slack",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChannelKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "email" => Ok(ChannelKind::Email),
            "webhook" => Ok(ChannelKind::Webhook),
            "slack" => Ok(ChannelKind::Slack),
            other => Err(format!("unknown channel type '{other}'")),
        }
    }
}

/// NotificationChannel model - where alerts are delivered
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationChannel {
    pub id: Uuid,
    pub name: String,
    pub kind: ChannelKind,
    pub config: serde_json::Value,
    pub active: bool,
}

impl NotificationChannel {
    pub fn new(name: impl Into<String>, kind: ChannelKind, config: serde_json::Value) -> Self {
        Self { id: Uuid::new_v4(), name: name.into(), kind, config, active: true }
    }
}

/// Filter applied when listing incidents
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncidentState {
    #[default]
    All,
    Active,
    Resolved,
}

impl IncidentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentState::All => "all",
            IncidentState::Active => "active",
            IncidentState::Resolved => "resolved",
        }
    }
}

/// Pagination + filter for incident listings. Pages are 1-based.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentQuery {
    pub endpoint_id: Option<Uuid>,
    pub state: IncidentState,
    pub page: u32,
    pub per_page: u32,
}

impl Default for IncidentQuery {
    fn default() -> Self {
        Self { endpoint_id: None, state: IncidentState::All, page: 1, per_page: 20 }
    }
}

impl IncidentQuery {
    pub const MAX_PER_PAGE: u32 = 100;

    pub fn limit(&self) -> u32 {
        self.per_page.clamp(1, Self::MAX_PER_PAGE)
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page.max(1) - 1) * u64::from(self.limit())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
}

/// Success/total tally over a time range
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckCounts {
    pub total: u64,
    pub successful: u64,
}

/// Average latency of successful checks inside one time bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencyBucket {
    pub bucket_start: DateTime<Utc>,
    pub avg_latency_ms: f64,
    pub samples: u64,
}

/// Check tally inside one time bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountBucket {
    pub bucket_start: DateTime<Utc>,
    pub counts: CheckCounts,
}

/// Convert a timestamp to the Unix milliseconds stored in the database
pub fn to_millis(time: DateTime<Utc>) -> i64 {
    time.timestamp_millis()
}

/// Convert stored Unix milliseconds back to a timestamp
pub fn from_millis(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_endpoint_defaults() {
        let endpoint = NewEndpoint::new("api", "https://example.com/health").into_endpoint();
        assert_eq!(endpoint.method, "GET");
        assert_eq!(endpoint.interval_seconds, 60);
        assert_eq!(endpoint.expected_status, 200);
        assert_eq!(endpoint.timeout_ms, 5_000);
        assert_eq!(endpoint.status, EndpointStatus::Unknown);
        assert_eq!(endpoint.consecutive_failures, 0);
        assert!(endpoint.active);
    }

    #[test]
    fn test_incident_query_paging() {
        let query = IncidentQuery { page: 3, per_page: 10, ..Default::default() };
        assert_eq!(query.offset(), 20);

        let query = IncidentQuery { page: 0, per_page: 1_000, ..Default::default() };
        assert_eq!(query.offset(), 0);
        assert_eq!(query.limit(), IncidentQuery::MAX_PER_PAGE);
    }

    #[test]
    fn test_millis_round_trip() {
        let now = from_millis(to_millis(Utc::now()));
        assert_eq!(from_millis(to_millis(now)), now);
    }

    #[test]
    fn test_channel_kind_parse() {
        assert_eq!("Webhook".parse::<ChannelKind>(), Ok(ChannelKind::Webhook));
        assert!("pager".parse::<ChannelKind>().is_err());
    }
}
