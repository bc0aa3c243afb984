use std::time::Duration;

use aime_core::classifier::ErrorClassifier;
use aime_core::codec::{OutputFormat, PayloadCodec};
use aime_core::protocol::{AuthMode, Endpoints};
use serde::{Deserialize, Serialize};

/// Delay between two progress queries of one job.
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_millis(300);

/// Timeout applied to every HTTP request by the bundled transports.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Version string sent with every login.
pub fn client_version() -> String {
    format!("Rust AIME API Client Interface {}", env!("CARGO_PKG_VERSION"))
}

/// Client configuration.
///
/// Only `api_server` and `endpoint_name` are required; everything else has
/// a default suitable for most endpoints.
///
/// | Field                   | Default           |
/// |-------------------------|-------------------|
/// | `auth`                  | `EndpointBound`   |
/// | `output_format`         | `Base64`          |
/// | `media_type`            | `image`           |
/// | `object_serialization`  | `false`           |
/// | `progress_interval`     | 300 ms            |
/// | `request_timeout`       | 30 s              |
/// | `strict_session_errors` | `true`            |
/// | `reopen_closed_session` | `true`            |
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the API server, e.g. `https://api.aime.info`.
    pub api_server: String,
    /// Name of the model endpoint, e.g. `llama3_chat`.
    pub endpoint_name: String,
    pub auth: AuthMode,
    /// How wrapped base64 values in results are handed back.
    pub output_format: OutputFormat,
    /// Media type used when wrapping binary parameters (`image`, `audio`).
    pub media_type: String,
    /// Serialize structured object parameters before wrapping them.
    pub object_serialization: bool,
    pub progress_interval: Duration,
    pub request_timeout: Duration,
    /// Raise an unregistered session even when an error handler is set.
    pub strict_session_errors: bool,
    /// Transparently reopen the transport after [`close`] was called.
    ///
    /// [`close`]: crate::session::Session::close
    pub reopen_closed_session: bool,
}

impl ClientConfig {
    /// Configuration for `endpoint_name` on `api_server` with documented defaults.
    pub fn new(api_server: impl Into<String>, endpoint_name: impl Into<String>) -> Self {
        Self {
            api_server: api_server.into(),
            endpoint_name: endpoint_name.into(),
            auth: AuthMode::EndpointBound,
            output_format: OutputFormat::default(),
            media_type: "image".to_string(),
            object_serialization: false,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            strict_session_errors: true,
            reopen_closed_session: true,
        }
    }

    /// Log in with explicit user credentials instead of the endpoint-bound
    /// session handshake.
    pub fn with_credentials(mut self, user: impl Into<String>, key: impl Into<String>) -> Self {
        self.auth = AuthMode::Credentials {
            user: user.into(),
            key: key.into(),
        };
        self
    }

    /// Set the shape of decoded result blobs.
    pub fn with_output_format(mut self, output_format: OutputFormat) -> Self {
        self.output_format = output_format;
        self
    }

    /// Set the media type used when wrapping request blobs.
    pub fn with_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = media_type.into();
        self
    }

    /// Wrap object parameters as serialized JSON before sending.
    pub fn with_object_serialization(mut self, enabled: bool) -> Self {
        self.object_serialization = enabled;
        self
    }

    /// Set the delay between progress polls.
    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Set the per-request timeout of the reqwest transports.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Raise on an unregistered session even when an error handler is supplied.
    pub fn with_strict_session_errors(mut self, strict: bool) -> Self {
        self.strict_session_errors = strict;
        self
    }

    /// Reopen the transport on the next call after `close`.
    pub fn with_reopen_closed_session(mut self, reopen: bool) -> Self {
        self.reopen_closed_session = reopen;
        self
    }

    /// URL builder for the configured server and endpoint.
    pub fn endpoints(&self) -> Endpoints {
        Endpoints::new(self.api_server.as_str(), self.endpoint_name.as_str())
    }

    /// Payload codec for the configured output format.
    pub fn codec(&self) -> PayloadCodec {
        PayloadCodec::new(self.media_type.as_str(), self.output_format)
            .with_object_serialization(self.object_serialization)
    }

    /// Error classifier for the configured strictness.
    pub fn classifier(&self) -> ErrorClassifier {
        ErrorClassifier::new(self.strict_session_errors)
    }
}
