//! Routing of failed network calls to an error callback or a typed error.

use serde_json::Value;

use crate::callback::ErrorCallback;
use crate::error::{ApiError, ApiResult, ErrorReport};

/// Decides whether a failure is recovered by the caller's error callback or
/// raised as an [`ApiError`].
#[derive(Debug, Clone, Copy)]
pub struct ErrorClassifier {
    strict_session_errors: bool,
}

impl ErrorClassifier {
    /// * `strict_session_errors` - when set, an unregistered session is
    ///   always raised, even if an error callback is present.
    pub fn new(strict_session_errors: bool) -> Self {
        Self {
            strict_session_errors,
        }
    }

    /// Whether `report` bypasses any error callback.
    pub fn must_raise(&self, report: &ErrorReport, handler: &ErrorCallback) -> bool {
        handler.is_none() || (self.strict_session_errors && report.is_session_not_registered())
    }

    /// Recover `report` through `handler`, or classify it into an error.
    pub async fn resolve(&self, report: ErrorReport, handler: &mut ErrorCallback) -> ApiResult<Value> {
        if self.must_raise(&report, handler) {
            return Err(report.into_error());
        }
        log_recovery(&report);
        Ok(handler.invoke(report).await.unwrap_or_default())
    }

    /// Blocking counterpart of [`resolve`](Self::resolve).
    pub fn resolve_blocking(&self, report: ErrorReport, handler: &mut ErrorCallback) -> ApiResult<Value> {
        if self.must_raise(&report, handler) {
            return Err(report.into_error());
        }
        log_recovery(&report);
        Ok(handler.invoke_blocking(report).unwrap_or_default())
    }

    /// Classify without a handler.
    pub fn fatal(&self, report: ErrorReport) -> ApiError {
        report.into_error()
    }
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new(true)
    }
}

fn log_recovery(report: &ErrorReport) {
    tracing::warn!(
        stage = %report.stage,
        status = report.status(),
        "Request failed, handing over to error callback",
    );
}
