//! Error taxonomy shared by every remote provider.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Provider error classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    Authentication,
    AccessDenied,
    NotFound,
    InvalidRequest,
    Conflict,
    RateLimit,
    Server,
    Network,
    Decode,
    Configuration,
    Other,
}

/// Failure of a single remote call, after retries were exhausted or skipped.
#[derive(Clone, Debug, PartialEq, Error, Serialize, Deserialize)]
#[error("{provider} {kind:?} error{}: {message}", status_suffix(.status_code))]
pub struct ProviderError {
    pub provider: String,
    pub kind: ProviderErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    pub retryable: bool,
    /// Server-supplied retry hint in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<f64>,
    /// Raw response body, kept for diagnostics on permanent failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

impl ProviderError {
    pub fn new(
        provider: impl Into<String>,
        kind: ProviderErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            kind,
            message: message.into(),
            status_code: None,
            retryable: default_retryable_for_kind(kind),
            retry_after: None,
            body: None,
        }
    }

    /// Build an error from a non-success HTTP response.
    pub fn from_status(
        provider: impl Into<String>,
        status: u16,
        body: String,
        retry_after: Option<f64>,
    ) -> Self {
        let (kind, retryable) = map_http_status(status);
        let message = summarize_body(&body).unwrap_or_else(|| format!("request failed with {status}"));
        Self {
            provider: provider.into(),
            kind,
            message,
            status_code: Some(status),
            retryable,
            retry_after,
            body: Some(body),
        }
    }

    pub fn network(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(provider, ProviderErrorKind::Network, message)
    }

    pub fn decode(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(provider, ProviderErrorKind::Decode, message)
    }

    pub fn is_status(&self, status: u16) -> bool {
        self.status_code == Some(status)
    }
}

/// Map HTTP status codes to error classification and retryability.
/// Only 429 and 500/502/503/504 are transient.
pub fn map_http_status(status: u16) -> (ProviderErrorKind, bool) {
    match status {
        400 | 422 => (ProviderErrorKind::InvalidRequest, false),
        401 => (ProviderErrorKind::Authentication, false),
        403 => (ProviderErrorKind::AccessDenied, false),
        404 => (ProviderErrorKind::NotFound, false),
        409 => (ProviderErrorKind::Conflict, false),
        429 => (ProviderErrorKind::RateLimit, true),
        500 | 502 | 503 | 504 => (ProviderErrorKind::Server, true),
        _ => (ProviderErrorKind::Other, false),
    }
}

pub fn default_retryable_for_kind(kind: ProviderErrorKind) -> bool {
    matches!(
        kind,
        ProviderErrorKind::RateLimit | ProviderErrorKind::Server | ProviderErrorKind::Network
    )
}

/// Pull a human message out of common JSON error bodies.
fn summarize_body(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let message = value
        .get("message")
        .or_else(|| value.get("error").and_then(|e| e.get("message")))
        .or_else(|| value.get("error_description"))
        .and_then(|m| m.as_str())?;
    Some(message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_http_status_marks_only_transient_codes_retryable() {
        assert_eq!(map_http_status(429), (ProviderErrorKind::RateLimit, true));
        for status in [500, 502, 503, 504] {
            assert_eq!(map_http_status(status), (ProviderErrorKind::Server, true));
        }
        assert_eq!(map_http_status(400), (ProviderErrorKind::InvalidRequest, false));
        assert_eq!(map_http_status(401), (ProviderErrorKind::Authentication, false));
        assert_eq!(map_http_status(404), (ProviderErrorKind::NotFound, false));
        assert_eq!(map_http_status(409), (ProviderErrorKind::Conflict, false));
        assert_eq!(map_http_status(501), (ProviderErrorKind::Other, false));
    }

    #[test]
    fn from_status_keeps_body_and_extracts_message() {
        let err = ProviderError::from_status(
            "notion",
            400,
            r#"{"object":"error","status":400,"message":"body failed validation"}"#.into(),
            None,
        );
        assert_eq!(err.kind, ProviderErrorKind::InvalidRequest);
        assert!(!err.retryable);
        assert_eq!(err.message, "body failed validation");
        assert!(err.body.as_deref().unwrap_or_default().contains("validation"));
        assert!(err.to_string().contains("HTTP 400"));
    }

    #[test]
    fn graph_style_error_message_is_extracted() {
        let err = ProviderError::from_status(
            "entra",
            403,
            r#"{"error":{"code":"Authorization_RequestDenied","message":"Insufficient privileges"}}"#
                .into(),
            None,
        );
        assert_eq!(err.message, "Insufficient privileges");
        assert_eq!(err.kind, ProviderErrorKind::AccessDenied);
    }
}
