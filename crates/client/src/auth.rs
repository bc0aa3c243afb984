//! Session handshake: exchange credentials for a session auth key.

use aime_core::callback::ErrorCallback;
use aime_core::classifier::ErrorClassifier;
use aime_core::error::{ApiResult, ErrorReport, FailureCause, RequestStage};
use aime_core::protocol::{login_request, parse_login, AuthMode, Endpoints, HttpRequest, HttpResponse};
use serde_json::Value;

use crate::config::client_version;
use crate::session::Session;
use crate::transport::{ensure_success, BlockingTransport, Transport, TransportError};

/// Result of a login attempt that did not raise.
#[derive(Debug, Clone, PartialEq)]
pub enum LoginOutcome {
    /// The server issued this key; it is now stored in the session.
    Authenticated(String),
    /// The login failed and the error handler returned this value. The
    /// session keeps its previous key.
    Recovered(Value),
}

/// Performs the login handshake for one endpoint.
#[derive(Debug, Clone)]
pub struct AuthClient {
    endpoints: Endpoints,
    classifier: ErrorClassifier,
}

impl AuthClient {
    /// Create a login driver for `endpoints`.
    pub fn new(endpoints: Endpoints, classifier: ErrorClassifier) -> Self {
        Self {
            endpoints,
            classifier,
        }
    }

    /// Log in and store the issued key in `session`, replacing any previous
    /// key.
    pub async fn login<T: Transport>(
        &self,
        session: &mut Session<T>,
        mode: &AuthMode,
        on_error: &mut ErrorCallback,
    ) -> ApiResult<LoginOutcome> {
        let request = self.request(mode);
        let outcome = session.transport()?.send(&request).await;
        match self.accept(outcome) {
            Ok(key) => Ok(self.store(session, key)),
            Err(report) => self
                .classifier
                .resolve(report, on_error)
                .await
                .map(LoginOutcome::Recovered),
        }
    }

    /// Blocking counterpart of [`login`](Self::login).
    pub fn login_blocking<T: BlockingTransport>(
        &self,
        session: &mut Session<T>,
        mode: &AuthMode,
        on_error: &mut ErrorCallback,
    ) -> ApiResult<LoginOutcome> {
        let request = self.request(mode);
        let outcome = session.transport()?.send_blocking(&request);
        match self.accept(outcome) {
            Ok(key) => Ok(self.store(session, key)),
            Err(report) => self
                .classifier
                .resolve_blocking(report, on_error)
                .map(LoginOutcome::Recovered),
        }
    }

    fn request(&self, mode: &AuthMode) -> HttpRequest {
        login_request(&self.endpoints, mode, &client_version())
    }

    /// A 2xx answer without `success: true` and a key still counts as a
    /// failed login.
    fn accept(&self, outcome: Result<HttpResponse, TransportError>) -> Result<String, ErrorReport> {
        let server = self.endpoints.api_server();
        let response = ensure_success(RequestStage::Login, server, outcome)?;
        let body = response.body_value();
        parse_login(&body).ok_or_else(|| {
            ErrorReport::new(
                RequestStage::Login,
                server,
                FailureCause::Status {
                    status: response.status,
                    body,
                },
            )
        })
    }

    fn store<T>(&self, session: &mut Session<T>, key: String) -> LoginOutcome {
        tracing::info!(
            endpoint = self.endpoints.endpoint_name(),
            "Logged in to API server at {}",
            self.endpoints.api_server(),
        );
        session.set_auth_key(Some(key.clone()));
        LoginOutcome::Authenticated(key)
    }
}
