//! Shared JSON-over-HTTP transport for the remote clients.

use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{RequestBuilder, StatusCode};
use serde_json::Value;

use crate::error::{ProviderError, ProviderErrorKind, ProviderResult};
use crate::retry::{RetryPolicy, retry_async};

#[derive(Debug, Clone)]
pub(crate) struct JsonTransport {
    provider: &'static str,
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl JsonTransport {
    pub(crate) fn new(
        provider: &'static str,
        mut headers: HeaderMap,
        timeout_secs: f64,
        retry: RetryPolicy,
    ) -> ProviderResult<Self> {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let timeout = request_timeout(timeout_secs).ok_or_else(|| {
            ProviderError::new(
                provider,
                ProviderErrorKind::Configuration,
                format!("http timeout must be a positive number of seconds, got {timeout_secs}"),
            )
        })?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|error| {
                ProviderError::new(provider, ProviderErrorKind::Configuration, error.to_string())
            })?;
        Ok(Self {
            provider,
            client,
            retry,
        })
    }

    pub(crate) fn provider(&self) -> &'static str {
        self.provider
    }

    pub(crate) fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Send the request built by `build`, rebuilding it for each retry.
    ///
    /// Empty and `204 No Content` responses decode to `Value::Null`.
    pub(crate) async fn send<F>(&self, build: F) -> ProviderResult<Value>
    where
        F: Fn(&reqwest::Client) -> RequestBuilder,
    {
        retry_async(&self.retry, || {
            let request = build(&self.client);
            async move { self.send_once(request).await }
        })
        .await
    }

    async fn send_once(&self, request: RequestBuilder) -> ProviderResult<Value> {
        let response = request
            .send()
            .await
            .map_err(|error| classify_reqwest_error(self.provider, &error))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(
                self.provider,
                status.as_u16(),
                body,
                retry_after,
            ));
        }
        if status == StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|error| classify_reqwest_error(self.provider, &error))?;
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&bytes)
            .map_err(|error| ProviderError::decode(self.provider, error.to_string()))
    }
}

pub(crate) fn header_value(provider: &str, name: &str, value: &str) -> ProviderResult<HeaderValue> {
    HeaderValue::from_str(value).map_err(|error| {
        ProviderError::new(
            provider,
            ProviderErrorKind::Configuration,
            format!("invalid {name} header: {error}"),
        )
    })
}

/// Read the `id` field every create response carries.
pub(crate) fn response_id(provider: &str, response: &Value) -> ProviderResult<String> {
    response
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ProviderError::decode(provider, "response is missing an 'id' field"))
}

fn classify_reqwest_error(provider: &str, error: &reqwest::Error) -> ProviderError {
    if error.is_timeout() || error.is_connect() || error.is_request() {
        ProviderError::network(provider, error.to_string())
    } else if error.is_decode() || error.is_body() {
        ProviderError::decode(provider, error.to_string())
    } else if error.is_builder() {
        ProviderError::new(provider, ProviderErrorKind::Configuration, error.to_string())
    } else {
        ProviderError::network(provider, error.to_string())
    }
}

fn request_timeout(secs: f64) -> Option<Duration> {
    if secs > 0.0 {
        Duration::try_from_secs_f64(secs).ok()
    } else {
        None
    }
}

/// Delay-seconds form only; dates and non-finite values are ignored.
fn parse_retry_after(headers: &HeaderMap) -> Option<f64> {
    headers
        .get("retry-after")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
}
