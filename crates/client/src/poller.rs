//! Progress polling driver.
//!
//! One poll is one `GET {endpoint}/progress`. [`ProgressPoller::poll_loop`]
//! repeats it at a fixed interval, feeding each normalized response to the
//! job's [`JobLifecycle`] and reporting what comes out, until the job is
//! done or canceled. Polls of one job never overlap: the next query is
//! issued only after the previous one and its progress callback completed.

use std::time::Duration;

use aime_core::callback::{ErrorCallback, ProgressCallback};
use aime_core::classifier::ErrorClassifier;
use aime_core::codec::PayloadCodec;
use aime_core::error::{ApiError, ApiResult, ErrorReport, FailureCause, RequestStage};
use aime_core::lifecycle::{JobLifecycle, LifecycleEvent};
use aime_core::payload::JobResult;
use aime_core::progress::{normalize, PollStep};
use aime_core::protocol::{progress_request, Endpoints, HttpResponse};
use serde_json::Value;

use crate::session::Session;
use crate::transport::{ensure_success, BlockingTransport, Transport, TransportError};

/// Queries job progress for one endpoint.
#[derive(Debug, Clone)]
pub struct ProgressPoller {
    endpoints: Endpoints,
    codec: PayloadCodec,
    classifier: ErrorClassifier,
}

impl ProgressPoller {
    /// Create a progress poller for `endpoints`.
    pub fn new(endpoints: Endpoints, codec: PayloadCodec, classifier: ErrorClassifier) -> Self {
        Self {
            endpoints,
            codec,
            classifier,
        }
    }

    /// Query the progress of `job_id` once.
    ///
    /// A failure recovered by `on_error` comes back as
    /// [`PollStep::Unconfirmed`] carrying the handler's value.
    pub async fn poll_once<T: Transport>(
        &self,
        session: &mut Session<T>,
        job_id: &str,
        on_error: &mut ErrorCallback,
    ) -> ApiResult<PollStep> {
        let request = progress_request(&self.endpoints, session.auth_key(), job_id);
        let outcome = session.transport()?.send(&request).await;
        let raw = match self.settle(outcome) {
            Ok(raw) => raw,
            Err(report) => self.classifier.resolve(report, on_error).await?,
        };
        self.to_step(raw, job_id)
    }

    /// Blocking counterpart of [`poll_once`](Self::poll_once).
    pub fn poll_once_blocking<T: BlockingTransport>(
        &self,
        session: &mut Session<T>,
        job_id: &str,
        on_error: &mut ErrorCallback,
    ) -> ApiResult<PollStep> {
        let request = progress_request(&self.endpoints, session.auth_key(), job_id);
        let outcome = session.transport()?.send_blocking(&request);
        let raw = match self.settle(outcome) {
            Ok(raw) => raw,
            Err(report) => self.classifier.resolve_blocking(report, on_error)?,
        };
        self.to_step(raw, job_id)
    }

    /// Poll until the job reaches a terminal state.
    ///
    /// Every snapshot, including the terminal one of a finished job, goes to
    /// `on_progress`. A canceled job ends the loop with `Ok(None)` and no
    /// further notification.
    pub async fn poll_loop<T: Transport>(
        &self,
        session: &mut Session<T>,
        lifecycle: &mut JobLifecycle,
        on_progress: &mut ProgressCallback,
        on_error: &mut ErrorCallback,
        interval: Duration,
    ) -> ApiResult<Option<JobResult>> {
        let job_id = polled_job(lifecycle)?;
        loop {
            let step = self.poll_once(session, &job_id, on_error).await?;
            match lifecycle.on_poll(step)? {
                LifecycleEvent::Progress(snapshot) => {
                    on_progress.invoke(snapshot).await;
                    tokio::time::sleep(interval).await;
                }
                LifecycleEvent::Finished { snapshot, result } => {
                    on_progress.invoke(snapshot).await;
                    tracing::info!(job_id = %job_id, "Job done");
                    return Ok(Some(result));
                }
                LifecycleEvent::Canceled => {
                    tracing::info!(job_id = %job_id, "Job canceled by API server");
                    return Ok(None);
                }
            }
        }
    }

    /// Blocking counterpart of [`poll_loop`](Self::poll_loop); sleeps the
    /// calling thread between polls.
    pub fn poll_loop_blocking<T: BlockingTransport>(
        &self,
        session: &mut Session<T>,
        lifecycle: &mut JobLifecycle,
        on_progress: &mut ProgressCallback,
        on_error: &mut ErrorCallback,
        interval: Duration,
    ) -> ApiResult<Option<JobResult>> {
        let job_id = polled_job(lifecycle)?;
        loop {
            let step = self.poll_once_blocking(session, &job_id, on_error)?;
            match lifecycle.on_poll(step)? {
                LifecycleEvent::Progress(snapshot) => {
                    on_progress.invoke_blocking(snapshot);
                    std::thread::sleep(interval);
                }
                LifecycleEvent::Finished { snapshot, result } => {
                    on_progress.invoke_blocking(snapshot);
                    tracing::info!(job_id = %job_id, "Job done");
                    return Ok(Some(result));
                }
                LifecycleEvent::Canceled => {
                    tracing::info!(job_id = %job_id, "Job canceled by API server");
                    return Ok(None);
                }
            }
        }
    }

    /// A 2xx answer that rejects the session key is a failure like any
    /// non-2xx one; treating it as progress would poll forever.
    fn settle(
        &self,
        outcome: Result<HttpResponse, TransportError>,
    ) -> Result<Value, ErrorReport> {
        let server = self.endpoints.api_server();
        let response = ensure_success(RequestStage::Progress, server, outcome)?;
        let body = response.body_value();
        if body.get("success") != Some(&Value::Bool(true)) {
            let report = ErrorReport::new(
                RequestStage::Progress,
                server,
                FailureCause::Status {
                    status: response.status,
                    body: body.clone(),
                },
            );
            if report.is_session_not_registered() {
                return Err(report);
            }
        }
        Ok(body)
    }

    fn to_step(&self, raw: Value, job_id: &str) -> ApiResult<PollStep> {
        let step = normalize(raw, job_id, &self.codec)?;
        tracing::debug!(job_id, step = step_name(&step), "Polled job progress");
        Ok(step)
    }
}

fn polled_job(lifecycle: &JobLifecycle) -> ApiResult<String> {
    lifecycle
        .job_handle()
        .map(|handle| handle.job_id.clone())
        .ok_or_else(|| ApiError::InvalidTransition(format!("poll while {}", lifecycle.state())))
}

fn step_name(step: &PollStep) -> &'static str {
    match step {
        PollStep::Progress(_) => "processing",
        PollStep::Done { .. } => "done",
        PollStep::Canceled(_) => "canceled",
        PollStep::Unconfirmed { .. } => "unconfirmed",
    }
}
