use url::Url;

use crate::database::models::Endpoint;

pub const ALLOWED_METHODS: [&str; 7] = ["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"];

pub const MIN_INTERVAL_SECONDS: u64 = 10;
pub const MAX_INTERVAL_SECONDS: u64 = 86_400;
pub const MIN_TIMEOUT_MS: u64 = 100;
pub const MAX_TIMEOUT_MS: u64 = 300_000;

/// Validation results with specific error messages
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub error: Option<String>,
}

impl ValidationResult {
    pub fn ok() -> Self {
        Self { is_valid: true, error: None }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self { is_valid: false, error: Some(msg.into()) }
    }

    pub fn to_result(&self) -> Result<(), String> {
        if self.is_valid {
            Ok(())
        } else {
            Err(self.error.clone().unwrap_or_else(|| "Validation failed".to_string()))
        }
    }

    /// Keep the first failure
    fn and_then(self, next: impl FnOnce() -> ValidationResult) -> ValidationResult {
        if self.is_valid { next() } else { self }
    }
}

/// Validate HTTP/HTTPS URL endpoint
pub fn validate_url(target: &str) -> ValidationResult {
    if target.trim().is_empty() {
        return ValidationResult::err("URL cannot be empty");
    }

    match Url::parse(target) {
        Ok(url) => {
            let scheme = url.scheme();
            if scheme != "http" && scheme != "https" {
                return ValidationResult::err(format!(
                    "Invalid scheme '{scheme}'. Must be http or https"
                ));
            }

            if url.host_str().is_none_or(str::is_empty) {
                return ValidationResult::err("URL must have a valid host");
            }

            ValidationResult::ok()
        }
        Err(e) => {
            // If it fails to parse, check if it's missing a scheme
            if !target.contains("://") {
                ValidationResult::err("URL must include scheme (http:// or https://)")
            } else {
                ValidationResult::err(format!("Invalid URL: {e}"))
            }
        }
    }
}

pub fn validate_method(method: &str) -> ValidationResult {
    let upper = method.to_ascii_uppercase();
    if ALLOWED_METHODS.contains(&upper.as_str()) {
        ValidationResult::ok()
    } else {
        ValidationResult::err(format!(
            "Unsupported method '{method}'. Must be one of {}",
            ALLOWED_METHODS.join(", ")
        ))
    }
}

pub fn validate_interval(seconds: u64) -> ValidationResult {
    if (MIN_INTERVAL_SECONDS..=MAX_INTERVAL_SECONDS).contains(&seconds) {
        ValidationResult::ok()
    } else {
        ValidationResult::err(format!(
            "Interval must be between {MIN_INTERVAL_SECONDS} and {MAX_INTERVAL_SECONDS} seconds"
        ))
    }
}

pub fn validate_timeout(timeout_ms: u64) -> ValidationResult {
    if (MIN_TIMEOUT_MS..=MAX_TIMEOUT_MS).contains(&timeout_ms) {
        ValidationResult::ok()
    } else {
        ValidationResult::err(format!(
            "Timeout must be between {MIN_TIMEOUT_MS} and {MAX_TIMEOUT_MS} ms"
        ))
    }
}

pub fn validate_expected_status(code: u16) -> ValidationResult {
    if (100..=599).contains(&code) {
        ValidationResult::ok()
    } else {
        ValidationResult::err("Expected status must be between 100 and 599")
    }
}

pub fn validate_name(name: &str) -> ValidationResult {
    if name.trim().is_empty() {
        ValidationResult::err("Name cannot be empty")
    } else {
        ValidationResult::ok()
    }
}

/// Run every field check, reporting the first failure.
pub fn validate_endpoint(endpoint: &Endpoint) -> ValidationResult {
    validate_name(&endpoint.name)
        .and_then(|| validate_url(&endpoint.url))
        .and_then(|| validate_method(&endpoint.method))
        .and_then(|| validate_interval(endpoint.interval_seconds))
        .and_then(|| validate_timeout(endpoint.timeout_ms))
        .and_then(|| validate_expected_status(endpoint.expected_status))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url() {
        assert!(validate_url("https://example.com/health").is_valid);
        assert!(validate_url("http://10.0.0.1:8080").is_valid);

        let missing_scheme = validate_url("example.com");
        assert!(!missing_scheme.is_valid);
        assert!(missing_scheme.error.unwrap().contains("scheme"));

        assert!(!validate_url("ftp://example.com").is_valid);
        assert!(!validate_url("").is_valid);
    }

    #[test]
    fn test_validate_method() {
        for method in ALLOWED_METHODS {
            assert!(validate_method(method).is_valid);
        }
        assert!(validate_method("get").is_valid);
        assert!(!validate_method("TRACE").is_valid);
    }

    #[test]
    fn test_ranges() {
        assert!(validate_interval(10).is_valid);
        assert!(validate_interval(86_400).is_valid);
        assert!(!validate_interval(9).is_valid);
        assert!(!validate_interval(86_401).is_valid);

        assert!(validate_timeout(100).is_valid);
        assert!(!validate_timeout(99).is_valid);
        assert!(!validate_timeout(300_001).is_valid);

        assert!(validate_expected_status(204).is_valid);
        assert!(!validate_expected_status(99).is_valid);
        assert!(!validate_expected_status(600).is_valid);
    }

    #[test]
    fn test_validate_endpoint_reports_first_failure() {
        let mut endpoint = Endpoint::new("api", "https://api.example.com");
        assert!(validate_endpoint(&endpoint).is_valid);

        endpoint.interval_seconds = 1;
        endpoint.timeout_ms = 1;
        let result = validate_endpoint(&endpoint);
        assert_eq!(result.to_result().unwrap_err(), "Interval must be between 10 and 86400 seconds");
    }
}
