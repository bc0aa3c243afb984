//! HTTP transports for the job client.
//!
//! The drivers only see [`Transport`] (cooperative) and
//! [`BlockingTransport`] (blocking). [`ReqwestTransport`] and
//! [`ReqwestBlockingTransport`] are the production implementations; tests
//! substitute scripted ones.

use std::time::Duration;

use aime_core::error::{ErrorReport, FailureCause, RequestStage};
use aime_core::protocol::{HttpRequest, HttpResponse, Method};
use async_trait::async_trait;

/// Errors raised when no response could be obtained.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Any other connection-level failure.
    #[error("Connection error: {0}")]
    Connection(String),
}

/// Sends one request and waits cooperatively for the response.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// Sends one request, blocking the calling thread.
pub trait BlockingTransport: Send {
    fn send_blocking(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// Cooperative transport backed by [`reqwest::Client`].
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build a transport whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// Reuse an existing [`reqwest::Client`] and its connection pool.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut builder = self
            .client
            .request(reqwest_method(request.method), &request.url)
            .query(&request.query);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        Ok(HttpResponse::new(status, body))
    }
}

/// Blocking transport backed by [`reqwest::blocking::Client`].
///
/// Must not be created or used from within a tokio runtime.
#[derive(Debug, Clone)]
pub struct ReqwestBlockingTransport {
    client: reqwest::blocking::Client,
}

impl ReqwestBlockingTransport {
    /// Build a blocking transport whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::blocking::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// Wrap a preconfigured blocking client.
    pub fn with_client(client: reqwest::blocking::Client) -> Self {
        Self { client }
    }
}

impl BlockingTransport for ReqwestBlockingTransport {
    fn send_blocking(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut builder = self
            .client
            .request(reqwest_method(request.method), &request.url)
            .query(&request.query);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send()?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        Ok(HttpResponse::new(status, body))
    }
}

fn reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
    }
}

/// Turn a transport outcome into a 2xx response or an [`ErrorReport`].
pub(crate) fn ensure_success(
    stage: RequestStage,
    server: &str,
    outcome: Result<HttpResponse, TransportError>,
) -> Result<HttpResponse, ErrorReport> {
    match outcome {
        Ok(response) if response.is_success() => Ok(response),
        Ok(response) => {
            let body = response.body_value();
            Err(ErrorReport::new(
                stage,
                server,
                FailureCause::Status {
                    status: response.status,
                    body,
                },
            ))
        }
        Err(e) => {
            tracing::warn!(stage = %stage, server, error = %e, "No response from API server");
            Err(ErrorReport::new(
                stage,
                server,
                FailureCause::Offline {
                    message: e.to_string(),
                },
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    const SERVER: &str = "http://localhost:7777";

    #[test]
    fn success_passes_through() {
        let outcome = Ok(HttpResponse::json(200, &json!({"success": true})));
        let response = ensure_success(RequestStage::Request, SERVER, outcome).unwrap();
        assert_eq!(response.body_value(), json!({"success": true}));
    }

    #[test]
    fn error_status_becomes_report() {
        let outcome = Ok(HttpResponse::new(404, "Not Found"));
        let report = ensure_success(RequestStage::Progress, SERVER, outcome).unwrap_err();
        assert_eq!(report.status(), Some(404));
        assert_eq!(report.body(), Some(&json!("Not Found")));
    }

    #[test]
    fn missing_response_is_offline() {
        let outcome = Err(TransportError::Connection("refused".into()));
        let report = ensure_success(RequestStage::Login, SERVER, outcome).unwrap_err();
        assert_matches!(report.cause, FailureCause::Offline { .. });
        assert!(report.description.ends_with("Connection to http://localhost:7777 offline"));
    }
}
