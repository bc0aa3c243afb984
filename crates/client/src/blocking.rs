//! Blocking job client.
//!
//! Same lifecycle as [`JobClient`](crate::orchestrator::JobClient), but
//! every network call and every inter-poll delay blocks the calling thread.
//! Suspending callbacks are driven to completion in place. Do not use this
//! client from inside an async runtime.

use aime_core::callback::{Callback, ErrorCallback};
use aime_core::error::ApiResult;
use aime_core::lifecycle::JobLifecycle;
use aime_core::payload::JobResult;
use aime_core::protocol::AuthMode;

use crate::auth::LoginOutcome;
use crate::config::ClientConfig;
use crate::orchestrator::{Drivers, JobRequest};
use crate::session::Session;
use crate::transport::{BlockingTransport, ReqwestBlockingTransport};

/// Blocking client for one API endpoint.
#[derive(Debug)]
pub struct BlockingJobClient<T = ReqwestBlockingTransport> {
    config: ClientConfig,
    session: Session<T>,
    drivers: Drivers,
    logged_in: bool,
}

impl BlockingJobClient<ReqwestBlockingTransport> {
    /// Open a client over a [`ReqwestBlockingTransport`].
    pub fn connect(config: ClientConfig) -> ApiResult<Self> {
        let timeout = config.request_timeout;
        let session = Session::with_connector(
            move || ReqwestBlockingTransport::new(timeout),
            config.reopen_closed_session,
        )?;
        Ok(Self::with_session(config, session))
    }
}

impl<T: BlockingTransport> BlockingJobClient<T> {
    /// Create a client over an already open transport. The session cannot reopen once closed.
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

    /// Log in with the configured auth mode; failures raise.
    pub fn login(&mut self) -> ApiResult<LoginOutcome> {
        self.login_handled(Callback::none())
    }

    /// Log in, handing a failure to `on_error` instead of raising.
    pub fn login_handled(&mut self, mut on_error: ErrorCallback) -> ApiResult<LoginOutcome> {
        let outcome = self
            .drivers
            .auth
            .login_blocking(&mut self.session, &self.config.auth, &mut on_error)?;
        self.logged_in = true;
        Ok(outcome)
    }

    /// Log in with per-call credentials instead of the configured auth mode.
    pub fn login_with(&mut self, user: impl Into<String>, key: impl Into<String>) -> ApiResult<LoginOutcome> {
        let mode = AuthMode::Credentials {
            user: user.into(),
            key: key.into(),
        };
        let outcome = self
            .drivers
            .auth
            .login_blocking(&mut self.session, &mode, &mut Callback::none())?;
        self.logged_in = true;
        Ok(outcome)
    }

    /// Run one job to completion on the calling thread.
    ///
    /// Returns `Ok(None)` when the job was canceled remotely.
    pub fn run(&mut self, request: JobRequest) -> ApiResult<Option<JobResult>> {
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

        if !self.logged_in {
            self.login()?;
        }
        let mut lifecycle = JobLifecycle::new();
        lifecycle.on_login()?;

        let wait_for_result = on_progress.is_none();
        let outcome = self.drivers.submitter.submit_blocking(
            &mut self.session,
            params,
            wait_for_result,
            &mut on_request_error,
        )?;

        let result = match lifecycle.on_submitted(outcome, &self.drivers.codec)? {
            Some(result) => Some(result),
            None => {
                let initial = lifecycle.begin_polling()?;
                on_progress.invoke_blocking(initial);
                self.drivers.poller.poll_loop_blocking(
                    &mut self.session,
                    &mut lifecycle,
                    &mut on_progress,
                    &mut on_progress_error,
                    interval,
                )?
            }
        };

        if let Some(result) = &result {
            on_result.invoke_blocking(result.clone());
        }
        Ok(result)
    }

    /// Close the session. Returns `false` if it was already closed.
    pub fn close(&mut self) -> bool {
        self.session.close()
    }
}

/// Blocking counterpart of [`run_once`](crate::orchestrator::run_once).
pub fn run_once_blocking(config: ClientConfig, request: JobRequest) -> ApiResult<Option<JobResult>> {
    request.ensure_supported()?;
    let mut client = BlockingJobClient::connect(config)?;
    let result = client.run(request);
    client.close();
    result
}
