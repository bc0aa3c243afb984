use std::fmt;

use serde_json::Value;

use crate::codec::CodecError;

/// Server error text signalling that the session auth key is unknown.
pub const SESSION_NOT_REGISTERED_MARKER: &str =
    "Client session authentication key not registered in API Server";

/// The network call a failure occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestStage {
    /// Exchanging credentials for a session auth key.
    Login,
    /// Submitting a job.
    Request,
    /// Querying the progress of a submitted job.
    Progress,
}

impl RequestStage {
    /// Prefix used in error descriptions.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Login => "Login",
            Self::Request => "API request",
            Self::Progress => "Progress",
        }
    }
}

impl fmt::Display for RequestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// What went wrong at the transport level.
#[derive(Debug, Clone, PartialEq)]
pub enum FailureCause {
    /// A response arrived with a non-2xx status, a 2xx login response
    /// without a key, or a 2xx progress response rejecting the session.
    Status { status: u16, body: Value },
    /// No response was obtained at all.
    Offline { message: String },
}

/// Description of a failed network call, handed to error callbacks.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorReport {
    pub stage: RequestStage,
    pub server: String,
    pub cause: FailureCause,
    /// Human-readable multi-line summary.
    pub description: String,
}

impl ErrorReport {
    /// Build a report and its description.
    pub fn new(stage: RequestStage, server: &str, cause: FailureCause) -> Self {
        let detail = match &cause {
            FailureCause::Status { status, body } => {
                format!("Status code: {status}\nResponse: {}", body_text(body))
            }
            FailureCause::Offline { .. } => format!("Connection to {server} offline"),
        };
        let description = format!("{} at {server} failed!\n{detail}", stage.label());
        Self {
            stage,
            server: server.to_string(),
            cause,
            description,
        }
    }

    /// HTTP status, if a response arrived.
    pub fn status(&self) -> Option<u16> {
        match &self.cause {
            FailureCause::Status { status, .. } => Some(*status),
            FailureCause::Offline { .. } => None,
        }
    }

    /// Parsed response body, if a response arrived.
    pub fn body(&self) -> Option<&Value> {
        match &self.cause {
            FailureCause::Status { body, .. } => Some(body),
            FailureCause::Offline { .. } => None,
        }
    }

    /// Whether the server rejected the session auth key.
    pub fn is_session_not_registered(&self) -> bool {
        let Some(body) = self.body() else {
            return false;
        };
        let text = match body {
            Value::String(s) => s.as_str(),
            other => other.get("error").and_then(Value::as_str).unwrap_or_default(),
        };
        text.contains(SESSION_NOT_REGISTERED_MARKER)
    }

    /// Classify into the fatal error for this failure.
    pub fn into_error(self) -> ApiError {
        if self.is_session_not_registered() {
            return ApiError::SessionNotRegistered {
                description: self.description,
            };
        }
        match self.stage {
            RequestStage::Login => ApiError::AuthenticationFailure {
                description: self.description,
            },
            stage => ApiError::ConnectionFailure {
                stage,
                description: self.description,
            },
        }
    }
}

fn body_text(body: &Value) -> String {
    match body {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Errors surfaced by the job client.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Login failed or returned no key.
    #[error("Authentication failed: {description}")]
    AuthenticationFailure { description: String },

    /// No usable response was obtained. `stage` tells submission failures
    /// apart from a connection lost mid-poll.
    #[error("Connection failure during {stage}: {description}")]
    ConnectionFailure {
        stage: RequestStage,
        description: String,
    },

    /// The server does not know the session auth key; log in again.
    #[error("Session not registered, login required: {description}")]
    SessionNotRegistered { description: String },

    /// The requested feature is not available in this client.
    #[error("Unsupported feature: {0}")]
    UnsupportedFeature(&'static str),

    /// A validly wrapped payload failed deserialization.
    #[error(transparent)]
    Decode(#[from] CodecError),

    /// The session was closed and is not allowed to reopen.
    #[error("Session is closed")]
    SessionClosed,

    /// The transport could not be (re)opened.
    #[error("Failed to open transport: {0}")]
    TransportSetup(String),

    /// An event arrived that the job lifecycle does not accept in its
    /// current state.
    #[error("Invalid job lifecycle transition: {0}")]
    InvalidTransition(String),
}

/// Convenience alias for results carrying an [`ApiError`].
pub type ApiResult<T> = Result<T, ApiError>;
