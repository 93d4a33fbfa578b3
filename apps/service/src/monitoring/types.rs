use serde::{Deserialize, Serialize};

/// Health classification of an endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EndpointStatus {
    Up,
    Down,
    Degraded,
    /// Only ever seen before the first probe completes.
    #[default]
    Unknown,
}

impl EndpointStatus {
    pub const ALL: [EndpointStatus; 4] =
        [EndpointStatus::Up, EndpointStatus::Down, EndpointStatus::Degraded, EndpointStatus::Unknown];

    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointStatus::Up => "UP",
            EndpointStatus::Down => "DOWN",
            EndpointStatus::Degraded => "DEGRADED",
            EndpointStatus::Unknown => "UNKNOWN",
        }
    }

    /// Lenient parse used when reading rows back; anything unrecognised is `Unknown`.
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_uppercase().as_str() {
            "UP" => EndpointStatus::Up,
            "DOWN" => EndpointStatus::Down,
            "DEGRADED" => EndpointStatus::Degraded,
            _ => EndpointStatus::Unknown,
        }
    }
}

impl std::fmt::Display for EndpointStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What started a probe. Scheduled runs skip inactive endpoints, manual runs don't.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeTrigger {
    Scheduled,
    Manual,
}

/// Raw observation from one request/response cycle, before it is persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeObservation {
    pub success: bool,
    pub latency_ms: u64,
    pub status_code: Option<u16>,
    pub error: Option<String>,
}

impl ProbeObservation {
    pub fn success(latency_ms: u64, status_code: u16) -> Self {
        Self { success: true, latency_ms, status_code: Some(status_code), error: None }
    }

    pub fn failure(latency_ms: u64, status_code: Option<u16>, error: impl Into<String>) -> Self {
        Self { success: false, latency_ms, status_code, error: Some(error.into()) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_text() {
        for status in EndpointStatus::ALL {
            assert_eq!(EndpointStatus::parse(status.as_str()), status);
        }
        assert_eq!(EndpointStatus::parse("down"), EndpointStatus::Down);
        assert_eq!(EndpointStatus::parse("bogus"), EndpointStatus::Unknown);
    }

    #[test]
    fn test_status_serializes_uppercase() {
        let json = serde_json::to_string(&EndpointStatus::Degraded).unwrap();
        assert_eq!(json, "\"DEGRADED\"");
    }
}
