//! Job lifecycle orchestration: login, submit, poll, report.
//!
//! [`JobClient`] drives one [`JobLifecycle`] per request with cooperative
//! suspension points: every network call, every inter-poll delay, and every
//! suspending callback. [`JobClient::stream`] exposes the same lifecycle as
//! a pull-based sequence of [`JobEvent`]s. The blocking surface lives in
//! [`crate::blocking`].

use std::time::Duration;

use aime_core::callback::{Callback, ErrorCallback, ProgressCallback, ResultCallback};
use aime_core::codec::PayloadCodec;
use aime_core::error::{ApiError, ApiResult};
use aime_core::lifecycle::{JobLifecycle, LifecycleEvent};
use aime_core::payload::{JobResult, RequestParams};
use aime_core::progress::ProgressSnapshot;
use aime_core::protocol::AuthMode;
use futures::stream::{self, BoxStream, StreamExt};

use crate::auth::{AuthClient, LoginOutcome};
use crate::config::ClientConfig;
use crate::poller::ProgressPoller;
use crate::session::Session;
use crate::submitter::JobSubmitter;
use crate::transport::{ReqwestTransport, Transport};

/// How progress reaches the client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProgressTransport {
    /// The client queries the progress endpoint at a fixed interval.
    #[default]
    Polling,
    /// The server pushes progress. Not supported by this client.
    Streamed,
}

/// One job request together with the callbacks observing it.
///
/// Without a progress callback the server is asked to answer with the
/// finished result directly. With one, the job is polled and every
/// snapshot is reported.
#[derive(Debug, Default)]
pub struct JobRequest {
    pub(crate) params: RequestParams,
    pub(crate) on_result: ResultCallback,
    pub(crate) on_progress: ProgressCallback,
    pub(crate) on_request_error: ErrorCallback,
    pub(crate) on_progress_error: ErrorCallback,
    pub(crate) progress_transport: ProgressTransport,
    pub(crate) progress_interval: Option<Duration>,
}

impl JobRequest {
    /// A job with `params` and no callbacks.
    pub fn new(params: RequestParams) -> Self {
        Self {
            params,
            ..Self::default()
        }
    }

    /// Called once with the final result.
    pub fn on_result(mut self, callback: ResultCallback) -> Self {
        self.on_result = callback;
        self
    }

    /// Called with every progress snapshot. Enables polling.
    pub fn on_progress(mut self, callback: ProgressCallback) -> Self {
        self.on_progress = callback;
        self
    }

    /// Recovers a failed submission. Its return value becomes the result.
    pub fn on_request_error(mut self, callback: ErrorCallback) -> Self {
        self.on_request_error = callback;
        self
    }

    /// Recovers a failed progress query. Its return value is reported as
    /// the snapshot's `progress_data` and polling goes on.
    pub fn on_progress_error(mut self, callback: ErrorCallback) -> Self {
        self.on_progress_error = callback;
        self
    }

    /// Choose how progress is obtained.
    pub fn with_progress_transport(mut self, transport: ProgressTransport) -> Self {
        self.progress_transport = transport;
        self
    }

    /// Override the configured delay between progress queries.
    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = Some(interval);
        self
    }

    /// Parameters that will be submitted.
    pub fn params(&self) -> &RequestParams {
        &self.params
    }

    pub(crate) fn ensure_supported(&self) -> ApiResult<()> {
        match self.progress_transport {
            ProgressTransport::Polling => Ok(()),
            ProgressTransport::Streamed => Err(ApiError::UnsupportedFeature("streamed progress")),
        }
    }
}

/// One element of a job stream.
#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    Progress(ProgressSnapshot),
    /// The last element of a stream that produced a result.
    Finished(JobResult),
}

/// The drivers shared by the cooperative and blocking clients.
#[derive(Debug, Clone)]
pub(crate) struct Drivers {
    pub(crate) auth: AuthClient,
    pub(crate) submitter: JobSubmitter,
    pub(crate) poller: ProgressPoller,
    pub(crate) codec: PayloadCodec,
}

impl Drivers {
    pub(crate) fn from_config(config: &ClientConfig) -> Self {
        let endpoints = config.endpoints();
        let codec = config.codec();
        let classifier = config.classifier();
        Self {
            auth: AuthClient::new(endpoints.clone(), classifier),
            submitter: JobSubmitter::new(endpoints.clone(), codec.clone(), classifier),
            poller: ProgressPoller::new(endpoints, codec.clone(), classifier),
            codec,
        }
    }
}

/// Cooperative client for one API endpoint.
///
/// Logs in on first use; call [`login`](Self::login) up front to surface
/// authentication problems early.
#[derive(Debug)]
pub struct JobClient<T = ReqwestTransport> {
    config: ClientConfig,
    session: Session<T>,
    drivers: Drivers,
    logged_in: bool,
}

impl JobClient<ReqwestTransport> {
    /// Open a client over a [`ReqwestTransport`].
    pub fn connect(config: ClientConfig) -> ApiResult<Self> {
        let timeout = config.request_timeout;
        let session = Session::with_connector(move || ReqwestTransport::new(timeout), config.reopen_closed_session)?;
        Ok(Self::with_session(config, session))
    }
}

impl<T: Transport> JobClient<T> {
    /// Use `transport` for every request. The session cannot reopen once
    /// closed.
    pub fn new(config: ClientConfig, transport: T) -> Self {
        Self::with_session(config, Session::new(transport))
    }

    /// Create a client over a prepared session.
    pub fn with_session(config: ClientConfig, session: Session<T>) -> Self {
        let drivers = Drivers::from_config(&config);
        Self {
            config,
            session,
            drivers,
            logged_in: false,
        }
    }

    /// The configuration this client was built with.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The session carrying the transport and auth key.
    pub fn session(&self) -> &Session<T> {
        &self.session
    }

    /// Log in with the configured credentials.
    pub async fn login(&mut self) -> ApiResult<LoginOutcome> {
        self.login_handled(Callback::none()).await
    }

    /// Log in with the configured credentials, recovering failures through
    /// `on_error`.
    pub async fn login_handled(&mut self, mut on_error: ErrorCallback) -> ApiResult<LoginOutcome> {
        let outcome = self
            .drivers
            .auth
            .login(&mut self.session, &self.config.auth, &mut on_error)
            .await?;
        self.logged_in = true;
        Ok(outcome)
    }

    /// Log in with explicit credentials, overriding the configured ones for
    /// this login only.
    pub async fn login_with(&mut self, user: impl Into<String>, key: impl Into<String>) -> ApiResult<LoginOutcome> {
        let mode = AuthMode::Credentials {
            user: user.into(),
            key: key.into(),
        };
        let outcome = self
            .drivers
            .auth
            .login(&mut self.session, &mode, &mut Callback::none())
            .await?;
        self.logged_in = true;
        Ok(outcome)
    }

    /// Run one job to completion.
    ///
    /// Returns `Ok(None)` when the job was canceled remotely; neither the
    /// result callback nor the progress callback hear about cancellation.
    pub async fn run(&mut self, request: JobRequest) -> ApiResult<Option<JobResult>> {
        request.ensure_supported()?;
        let interval = request.progress_interval.unwrap_or(self.config.progress_interval);
        let JobRequest {
            params,
            mut on_result,
            mut on_progress,
            mut on_request_error,
            mut on_progress_error,
            ..
        } = request;

        let mut lifecycle = self.begin().await?;
        let wait_for_result = on_progress.is_none();
        let outcome = self
            .drivers
            .submitter
            .submit(&mut self.session, params, wait_for_result, &mut on_request_error)
            .await?;

        let result = match lifecycle.on_submitted(outcome, &self.drivers.codec)? {
            Some(result) => Some(result),
            None => {
                let initial = lifecycle.begin_polling()?;
                on_progress.invoke(initial).await;
                self.drivers
                    .poller
                    .poll_loop(
                        &mut self.session,
                        &mut lifecycle,
                        &mut on_progress,
                        &mut on_progress_error,
                        interval,
                    )
                    .await?
            }
        };

        if let Some(result) = &result {
            on_result.invoke(result.clone()).await;
        }
        Ok(result)
    }

    /// Run one job as a lazy sequence of events.
    ///
    /// Nothing happens until the first element is pulled. The sequence
    /// yields the initial snapshot, one snapshot per poll, and finally
    /// [`JobEvent::Finished`]. Each pull after the first snapshot waits one
    /// progress interval and performs one poll. A canceled job ends the
    /// sequence without a result; an error is yielded once and ends it.
    /// Callbacks registered on `request` are invoked as well.
    pub fn stream(&mut self, request: JobRequest) -> BoxStream<'_, ApiResult<JobEvent>> {
        let state = JobStream {
            interval: request.progress_interval.unwrap_or(self.config.progress_interval),
            client: self,
            phase: Phase::Start(request),
            lifecycle: JobLifecycle::new(),
            callbacks: StreamCallbacks::default(),
        };
        stream::unfold(state, |mut state| async move {
            state.next_event().await.map(|item| (item, state))
        })
        .boxed()
    }

    /// Close the session. Returns `false` if it was already closed.
    pub fn close(&mut self) -> bool {
        self.session.close()
    }

    async fn begin(&mut self) -> ApiResult<JobLifecycle> {
        if !self.logged_in {
            self.login().await?;
        }
        let mut lifecycle = JobLifecycle::new();
        lifecycle.on_login()?;
        Ok(lifecycle)
    }
}

/// Open a client, run one job, and close the client again.
pub async fn run_once(config: ClientConfig, request: JobRequest) -> ApiResult<Option<JobResult>> {
    request.ensure_supported()?;
    let mut client = JobClient::connect(config)?;
    let result = client.run(request).await;
    client.close();
    result
}

enum Phase {
    Start(JobRequest),
    Polling { wait_first: bool },
    Ended,
}

#[derive(Default)]
struct StreamCallbacks {
    on_result: ResultCallback,
    on_progress: ProgressCallback,
    on_progress_error: ErrorCallback,
}

struct JobStream<'a, T> {
    client: &'a mut JobClient<T>,
    phase: Phase,
    lifecycle: JobLifecycle,
    callbacks: StreamCallbacks,
    interval: Duration,
}

impl<T: Transport> JobStream<'_, T> {
    async fn next_event(&mut self) -> Option<ApiResult<JobEvent>> {
        match self.advance().await {
            Ok(event) => event.map(Ok),
            Err(e) => {
                self.phase = Phase::Ended;
                Some(Err(e))
            }
        }
    }

    async fn advance(&mut self) -> ApiResult<Option<JobEvent>> {
        match std::mem::replace(&mut self.phase, Phase::Ended) {
            Phase::Ended => Ok(None),
            Phase::Start(request) => self.submit(request).await,
            Phase::Polling { wait_first } => self.poll(wait_first).await,
        }
    }

    async fn submit(&mut self, request: JobRequest) -> ApiResult<Option<JobEvent>> {
        request.ensure_supported()?;
        let JobRequest {
            params,
            on_result,
            on_progress,
            mut on_request_error,
            on_progress_error,
            ..
        } = request;
        self.callbacks = StreamCallbacks {
            on_result,
            on_progress,
            on_progress_error,
        };

        self.lifecycle = self.client.begin().await?;
        let outcome = self
            .client
            .drivers
            .submitter
            .submit(&mut self.client.session, params, false, &mut on_request_error)
            .await?;

        match self.lifecycle.on_submitted(outcome, &self.client.drivers.codec)? {
            Some(result) => Ok(Some(self.finish(result).await)),
            None => {
                let initial = self.lifecycle.begin_polling()?;
                self.phase = Phase::Polling { wait_first: false };
                Ok(Some(self.report(initial).await))
            }
        }
    }

    async fn poll(&mut self, wait_first: bool) -> ApiResult<Option<JobEvent>> {
        if wait_first {
            tokio::time::sleep(self.interval).await;
        }
        let job_id = match self.lifecycle.job_handle() {
            Some(handle) => handle.job_id.clone(),
            None => return Err(ApiError::InvalidTransition(format!("poll while {}", self.lifecycle.state()))),
        };
        let step = self
            .client
            .drivers
            .poller
            .poll_once(&mut self.client.session, &job_id, &mut self.callbacks.on_progress_error)
            .await?;

        match self.lifecycle.on_poll(step)? {
            LifecycleEvent::Progress(snapshot) => {
                self.phase = Phase::Polling { wait_first: true };
                Ok(Some(self.report(snapshot).await))
            }
            LifecycleEvent::Finished { snapshot, result } => {
                self.callbacks.on_progress.invoke(snapshot).await;
                Ok(Some(self.finish(result).await))
            }
            LifecycleEvent::Canceled => {
                tracing::info!(job_id = %job_id, "Job canceled by API server");
                Ok(None)
            }
        }
    }

    async fn report(&mut self, snapshot: ProgressSnapshot) -> JobEvent {
        self.callbacks.on_progress.invoke(snapshot.clone()).await;
        JobEvent::Progress(snapshot)
    }

    async fn finish(&mut self, result: JobResult) -> JobEvent {
        self.callbacks.on_result.invoke(result.clone()).await;
        JobEvent::Finished(result)
    }
}
