use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::io;
use std::time::Duration;

use anyhow::Result;
use thiserror::Error;

/// One outbound probe request
#[derive(Debug, Clone)]
pub struct ProbeRequest {
    pub method: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResponse {
    pub status_code: u16,
}

/// Network-level probe failure. The display text is what gets stored on the
/// failed check result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Request timed out")]
    Timeout,
    #[error("DNS lookup failed")]
    Dns,
    #[error("Connection refused")]
    ConnectionRefused,
    #[error("Host unreachable")]
    HostUnreachable,
    #[error("Network unreachable")]
    NetworkUnreachable,
    #[error("Request failed: {0}")]
    Other(String),
}

/// Issues probe requests. Any response code is a response, never an error.
#[async_trait::async_trait]
pub trait HttpClient: Send + Sync {
    async fn request(&self, request: &ProbeRequest) -> Result<ProbeResponse, TransportError>;
}

/// reqwest-backed client shared by every probe
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    pub fn new(user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder().user_agent(user_agent).build()?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl HttpClient for ReqwestClient {
    async fn request(&self, request: &ProbeRequest) -> Result<ProbeResponse, TransportError> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|e| TransportError::Other(e.to_string()))?;

        let mut builder = self.client.request(method, &request.url).timeout(request.timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(|e| classify(&e))?;
        Ok(ProbeResponse { status_code: response.status().as_u16() })
    }
}

/// Map a reqwest failure onto the fixed transport reasons.
pub fn classify(error: &reqwest::Error) -> TransportError {
    if error.is_timeout() {
        return TransportError::Timeout;
    }

    let mut source: Option<&(dyn StdError + 'static)> = error.source();
    while let Some(cause) = source {
        if let Some(io_error) = cause.downcast_ref::<io::Error>() {
            if let Some(mapped) = from_io_kind(io_error.kind()) {
                return mapped;
            }
        }
        if is_dns_message(&cause.to_string()) {
            return TransportError::Dns;
        }
        source = cause.source();
    }

    TransportError::Other(error.to_string())
}

fn from_io_kind(kind: io::ErrorKind) -> Option<TransportError> {
    match kind {
        io::ErrorKind::TimedOut => Some(TransportError::Timeout),
        io::ErrorKind::ConnectionRefused => Some(TransportError::ConnectionRefused),
        io::ErrorKind::HostUnreachable => Some(TransportError::HostUnreachable),
        io::ErrorKind::NetworkUnreachable => Some(TransportError::NetworkUnreachable),
        _ => None,
    }
}

fn is_dns_message(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("dns error")
        || message.contains("failed to lookup address")
        || message.contains("name or service not known")
        || message.contains("no such host")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_messages() {
        assert_eq!(TransportError::Timeout.to_string(), "Request timed out");
        assert_eq!(TransportError::Dns.to_string(), "DNS lookup failed");
        assert_eq!(TransportError::ConnectionRefused.to_string(), "Connection refused");
        assert_eq!(TransportError::HostUnreachable.to_string(), "Host unreachable");
        assert_eq!(TransportError::NetworkUnreachable.to_string(), "Network unreachable");
        assert_eq!(
            TransportError::Other("boom".into()).to_string(),
            "Request failed: boom"
        );
    }

    #[test]
    fn test_io_kinds_map_to_reasons() {
        assert_eq!(
            from_io_kind(io::ErrorKind::ConnectionRefused),
            Some(TransportError::ConnectionRefused)
        );
        assert_eq!(from_io_kind(io::ErrorKind::TimedOut), Some(TransportError::Timeout));
        assert_eq!(from_io_kind(io::ErrorKind::PermissionDenied), None);
    }

    #[test]
    fn test_dns_messages() {
        assert!(is_dns_message("dns error: failed to lookup address information"));
        assert!(!is_dns_message("connection reset by peer"));
    }

    #[tokio::test]
    async fn test_refused_connection_is_classified() {
        // Bind then drop to get a port with nothing listening.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = ReqwestClient::new("beacon-test").unwrap();
        let request = ProbeRequest {
            method: "GET".into(),
            url: format!("http://127.0.0.1:{port}/"),
            headers: BTreeMap::new(),
            body: None,
            timeout: Duration::from_secs(2),
        };

        assert_eq!(client.request(&request).await, Err(TransportError::ConnectionRefused));
    }
}
