//! Client for the AIME model API.
//!
//! Logs in to an API server, submits jobs to a model endpoint, and either
//! waits for the finished result or polls job progress until the job is
//! done. [`JobClient`] is the cooperative surface (including the lazy
//! [`JobClient::stream`]), [`BlockingJobClient`] the blocking one. Both are
//! generic over the transport so tests can script the server.
//!
//! The pure pieces (payload codec, callbacks, errors, lifecycle) live in
//! `aime-core` and are re-exported here.

pub mod auth;
pub mod blocking;
pub mod config;
pub mod orchestrator;
pub mod poller;
pub mod session;
pub mod submitter;
pub mod transport;

pub use aime_core::callback::{Callback, ErrorCallback, ProgressCallback, ResultCallback};
pub use aime_core::codec::OutputFormat;
pub use aime_core::error::{ApiError, ApiResult, ErrorReport, RequestStage};
pub use aime_core::payload::{JobResult, ParamValue, RequestParams, ResultValue};
pub use aime_core::progress::{JobState, ProgressSnapshot};
pub use aime_core::protocol::AuthMode;

pub use auth::LoginOutcome;
pub use blocking::{run_once_blocking, BlockingJobClient};
pub use config::ClientConfig;
pub use orchestrator::{run_once, JobClient, JobEvent, JobRequest, ProgressTransport};
pub use session::Session;
pub use transport::{BlockingTransport, ReqwestBlockingTransport, ReqwestTransport, Transport, TransportError};
