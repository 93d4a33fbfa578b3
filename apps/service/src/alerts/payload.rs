use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::database::models::{CheckResult, Endpoint};
use crate::monitoring::types::EndpointStatus;

/// Everything a channel needs to render one alert
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertPayload {
    pub endpoint_name: String,
    pub endpoint_url: String,
    pub previous_status: Option<EndpointStatus>,
    pub status: Option<EndpointStatus>,
    pub timestamp: DateTime<Utc>,
    pub latency_ms: Option<u64>,
    pub status_code: Option<u16>,
    pub error: Option<String>,
    /// Free text, only set for test sends
    pub message: Option<String>,
}

impl AlertPayload {
    pub fn transition(
        endpoint: &Endpoint,
        previous: EndpointStatus,
        next: EndpointStatus,
        result: &CheckResult,
    ) -> Self {
        Self {
            endpoint_name: endpoint.name.clone(),
            endpoint_url: endpoint.url.clone(),
            previous_status: Some(previous),
            status: Some(next),
            timestamp: result.checked_at,
            latency_ms: Some(result.latency_ms),
            status_code: result.status_code,
            error: result.error.clone(),
            message: None,
        }
    }

    pub fn test(message: impl Into<String>) -> Self {
        Self {
            endpoint_name: "Beacon".to_string(),
            endpoint_url: String::new(),
            previous_status: None,
            status: None,
            timestamp: Utc::now(),
            latency_ms: None,
            status_code: None,
            error: None,
            message: Some(message.into()),
        }
    }

    pub fn subject(&self) -> String {
        match (self.previous_status, self.status) {
            (Some(previous), Some(next)) => {
                format!("[Beacon] {} is {} (was {})", self.endpoint_name, next, previous)
            }
            _ => "[Beacon] Test notification".to_string(),
        }
    }

    /// Plain-text body shared by the text-based channels
    pub fn summary(&self) -> String {
        if let Some(message) = &self.message {
            return message.clone();
        }

        let mut lines = vec![self.subject()];
        if !self.endpoint_url.is_empty() {
            lines.push(format!("URL: {}", self.endpoint_url));
        }
        if let Some(code) = self.status_code {
            lines.push(format!("Status code: {code}"));
        }
        if let Some(latency) = self.latency_ms {
            lines.push(format!("Latency: {latency} ms"));
        }
        if let Some(error) = &self.error {
            lines.push(format!("Error: {error}"));
        }
        lines.push(format!("At: {}", self.timestamp.to_rfc3339()));
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_summary_mentions_error() {
        let endpoint = Endpoint::new("api", "https://api.example.com/health");
        let result = CheckResult {
            id: Some(1),
            endpoint_id: endpoint.id,
            success: false,
            latency_ms: 12,
            status_code: Some(500),
            error: Some("Expected status 200, got 500".into()),
            checked_at: Utc::now(),
        };
        let payload =
            AlertPayload::transition(&endpoint, EndpointStatus::Up, EndpointStatus::Down, &result);

        assert_eq!(payload.subject(), "[Beacon] api is DOWN (was UP)");
        let summary = payload.summary();
        assert!(summary.contains("Status code: 500"));
        assert!(summary.contains("Expected status 200, got 500"));
    }

    #[test]
    fn test_test_payload_uses_message() {
        let payload = AlertPayload::test("hello");
        assert_eq!(payload.summary(), "hello");
        assert_eq!(payload.subject(), "[Beacon] Test notification");
    }
}
