//! Wire protocol: endpoint URLs, request construction, and login parsing.
//!
//! Three logical endpoints hang off `{api_server}/{endpoint_name}`:
//! login (`GET .../login`, or `GET {api_server}/get_client_session_auth_key`
//! for endpoint-bound sessions), job submission (`POST`), and progress
//! (`GET .../progress`).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::submission::AUTH_KEY_FIELD;

/// HTTP method of a wire request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// A transport-agnostic HTTP request.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    /// JSON body, only for `POST`.
    pub body: Option<Value>,
}

impl HttpRequest {
    /// A GET with query parameters.
    pub fn get(url: String, query: Vec<(String, String)>) -> Self {
        Self {
            method: Method::Get,
            url,
            query,
            body: None,
        }
    }

    /// A POST with a JSON body.
    pub fn post(url: String, body: Value) -> Self {
        Self {
            method: Method::Post,
            url,
            query: Vec::new(),
            body: Some(body),
        }
    }

    /// Look up a query parameter by name.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// A received HTTP response.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    /// A response with a raw body.
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Build a response carrying a JSON body.
    pub fn json(status: u16, body: &Value) -> Self {
        Self::new(status, body.to_string())
    }

    /// Whether the status is 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Parse the body as JSON, falling back to a JSON string holding the raw
    /// text for non-JSON bodies (e.g. plain-text 404 pages).
    pub fn body_value(&self) -> Value {
        serde_json::from_str(&self.body).unwrap_or_else(|_| Value::String(self.body.clone()))
    }
}

/// How the session handshake authenticates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum AuthMode {
    /// Explicit user credentials, sent to `{endpoint}/login`.
    Credentials { user: String, key: String },
    /// Credentials bound to the endpoint name, sent to
    /// `get_client_session_auth_key`.
    EndpointBound,
}

/// Resolved endpoint URLs for one API server and endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    api_server: String,
    endpoint_name: String,
}

impl Endpoints {
    /// Routes for `endpoint_name` on `api_server`; a trailing slash is trimmed.
    pub fn new(api_server: impl Into<String>, endpoint_name: impl Into<String>) -> Self {
        let api_server = api_server.into().trim_end_matches('/').to_string();
        Self {
            api_server,
            endpoint_name: endpoint_name.into(),
        }
    }

    /// Base URL of the API server.
    pub fn api_server(&self) -> &str {
        &self.api_server
    }

    /// Name of the model endpoint.
    pub fn endpoint_name(&self) -> &str {
        &self.endpoint_name
    }

    /// `{server}/{endpoint}`
    pub fn submit_url(&self) -> String {
        format!("{}/{}", self.api_server, self.endpoint_name)
    }

    /// `{server}/{endpoint}/login`
    pub fn login_url(&self) -> String {
        format!("{}/login", self.submit_url())
    }

    /// `{server}/get_client_session_auth_key`
    pub fn session_key_url(&self) -> String {
        format!("{}/get_client_session_auth_key", self.api_server)
    }

    /// `{server}/{endpoint}/progress`
    pub fn progress_url(&self) -> String {
        format!("{}/progress", self.submit_url())
    }
}

/// Build the login request for `mode`.
pub fn login_request(endpoints: &Endpoints, mode: &AuthMode, version: &str) -> HttpRequest {
    match mode {
        AuthMode::Credentials { user, key } => HttpRequest::get(
            endpoints.login_url(),
            vec![
                ("version".to_string(), version.to_string()),
                ("user".to_string(), user.clone()),
                ("key".to_string(), key.clone()),
            ],
        ),
        AuthMode::EndpointBound => HttpRequest::get(
            endpoints.session_key_url(),
            vec![
                ("endpoint_name".to_string(), endpoints.endpoint_name().to_string()),
                ("version".to_string(), version.to_string()),
            ],
        ),
    }
}

/// Build the job submission request from an already encoded body.
pub fn submit_request(endpoints: &Endpoints, body: Map<String, Value>) -> HttpRequest {
    HttpRequest::post(endpoints.submit_url(), Value::Object(body))
}

/// Build the progress query for `job_id`.
pub fn progress_request(endpoints: &Endpoints, auth_key: Option<&str>, job_id: &str) -> HttpRequest {
    let mut query = Vec::with_capacity(2);
    if let Some(key) = auth_key {
        query.push((AUTH_KEY_FIELD.to_string(), key.to_string()));
    }
    query.push(("job_id".to_string(), job_id.to_string()));
    HttpRequest::get(endpoints.progress_url(), query)
}

/// Extract the session auth key from a login response body.
///
/// Returns `None` unless the body reports `success: true` and carries a
/// string key.
pub fn parse_login(body: &Value) -> Option<String> {
    if body.get("success").and_then(Value::as_bool) != Some(true) {
        return None;
    }
    body.get(AUTH_KEY_FIELD)
        .and_then(Value::as_str)
        .map(str::to_string)
}
