//! HTTP utilities for API providers

use std::time::Duration;

use reqwest::{Client, Response, StatusCode};

use crate::error::{CapabilityErrorKind, EngineError, Result};

/// Create a reqwest client with connection pooling and sensible defaults.
pub fn create_client() -> Result<Client> {
    Client::builder()
        .pool_max_idle_per_host(10)
        .pool_idle_timeout(Duration::from_secs(90))
        .timeout(Duration::from_secs(120))
        .connect_timeout(Duration::from_secs(30))
        .build()
        .map_err(|e| EngineError::Configuration(format!("failed to build HTTP client: {}", e)))
}

/// Map a transport-level failure to a capability error.
pub fn transport_error(service_name: &str, err: reqwest::Error) -> EngineError {
    let kind = if err.is_timeout() || err.is_connect() {
        CapabilityErrorKind::Connection
    } else {
        CapabilityErrorKind::Other
    };
    EngineError::capability(kind, format!("{}: {}", service_name, err))
}

/// Check HTTP response status and classify the failure for retry purposes.
///
/// Extracts error details from common JSON error bodies for better messages.
pub async fn check_response(response: Response, service_name: &str) -> Result<Response> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    let error_detail = if let Ok(json) = serde_json::from_str::<serde_json::Value>(&body) {
        json.get("error")
            .and_then(|e| e.get("message").and_then(|m| m.as_str()))
            .or_else(|| json.get("message").and_then(|m| m.as_str()))
            .or_else(|| json.get("detail").and_then(|d| d.as_str()))
            .map(|s| s.to_string())
            .unwrap_or(body)
    } else {
        body
    };

    let kind = classify_status(status);
    Err(EngineError::capability(
        kind,
        format!("{} API error {}: {}", service_name, status, error_detail),
    ))
}

fn classify_status(status: StatusCode) -> CapabilityErrorKind {
    if status == StatusCode::TOO_MANY_REQUESTS {
        CapabilityErrorKind::RateLimited
    } else if status.is_server_error() {
        CapabilityErrorKind::Unavailable
    } else {
        CapabilityErrorKind::Other
    }
}
