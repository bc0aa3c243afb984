//! Job submission driver.

use aime_core::callback::ErrorCallback;
use aime_core::classifier::ErrorClassifier;
use aime_core::codec::PayloadCodec;
use aime_core::error::{ApiResult, RequestStage};
use aime_core::payload::RequestParams;
use aime_core::protocol::{submit_request, Endpoints, HttpRequest};
use aime_core::submission::{interpret, into_object, prepare, SubmitOutcome};

use crate::session::Session;
use crate::transport::{ensure_success, BlockingTransport, Transport};

/// Sends job requests to one endpoint.
///
/// Only `success` and `job_id` of the answer are looked at here; decoding
/// the result payload is left to the lifecycle.
#[derive(Debug, Clone)]
pub struct JobSubmitter {
    endpoints: Endpoints,
    codec: PayloadCodec,
    classifier: ErrorClassifier,
}

impl JobSubmitter {
    /// Create a job submitter for `endpoints`.
    pub fn new(endpoints: Endpoints, codec: PayloadCodec, classifier: ErrorClassifier) -> Self {
        Self {
            endpoints,
            codec,
            classifier,
        }
    }

    /// Submit `params` with the session's auth key.
    ///
    /// With `wait_for_result` the server holds the request open until the
    /// job finishes and answers with its result. A failure recovered by
    /// `on_error` is returned as a rejected submission carrying the
    /// handler's value.
    pub async fn submit<T: Transport>(
        &self,
        session: &mut Session<T>,
        params: RequestParams,
        wait_for_result: bool,
        on_error: &mut ErrorCallback,
    ) -> ApiResult<SubmitOutcome> {
        let request = self.request(session.auth_key(), params, wait_for_result);
        let outcome = session.transport()?.send(&request).await;
        let raw = match ensure_success(RequestStage::Request, self.endpoints.api_server(), outcome) {
            Ok(response) => response.body_value(),
            Err(report) => {
                let recovered = self.classifier.resolve(report, on_error).await?;
                return Ok(SubmitOutcome::Rejected(into_object(recovered)));
            }
        };
        Ok(self.finish(raw, wait_for_result))
    }

    /// Blocking counterpart of [`submit`](Self::submit).
    pub fn submit_blocking<T: BlockingTransport>(
        &self,
        session: &mut Session<T>,
        params: RequestParams,
        wait_for_result: bool,
        on_error: &mut ErrorCallback,
    ) -> ApiResult<SubmitOutcome> {
        let request = self.request(session.auth_key(), params, wait_for_result);
        let outcome = session.transport()?.send_blocking(&request);
        let raw = match ensure_success(RequestStage::Request, self.endpoints.api_server(), outcome) {
            Ok(response) => response.body_value(),
            Err(report) => {
                let recovered = self.classifier.resolve_blocking(report, on_error)?;
                return Ok(SubmitOutcome::Rejected(into_object(recovered)));
            }
        };
        Ok(self.finish(raw, wait_for_result))
    }

    fn request(&self, auth_key: Option<&str>, params: RequestParams, wait_for_result: bool) -> HttpRequest {
        let body = prepare(&self.codec, params, auth_key, wait_for_result);
        submit_request(&self.endpoints, body)
    }

    fn finish(&self, raw: serde_json::Value, wait_for_result: bool) -> SubmitOutcome {
        let outcome = interpret(raw, wait_for_result);
        match &outcome {
            SubmitOutcome::Accepted(handle) => {
                tracing::info!(
                    endpoint = self.endpoints.endpoint_name(),
                    job_id = %handle.job_id,
                    "Job submitted",
                );
            }
            SubmitOutcome::Finished(_) => {
                tracing::debug!(endpoint = self.endpoints.endpoint_name(), "Job finished inline");
            }
            SubmitOutcome::Rejected(_) => {
                tracing::warn!(endpoint = self.endpoints.endpoint_name(), "Job submission was not accepted");
            }
        }
        outcome
    }
}
