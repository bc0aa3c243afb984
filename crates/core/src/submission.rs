//! Job submission: body preparation and response interpretation.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::codec::PayloadCodec;
use crate::payload::RequestParams;

/// Request field carrying the session auth key.
pub const AUTH_KEY_FIELD: &str = "client_session_auth_key";

/// Request field asking the server to block until the job finishes.
pub const WAIT_FOR_RESULT_FIELD: &str = "wait_for_result";

/// Server-assigned identifier of a submitted job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobHandle {
    pub job_id: String,
}

impl JobHandle {
    /// Handle for the job `job_id`.
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
        }
    }
}

/// How the server answered a submission.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// The job was queued; poll it with this handle.
    Accepted(JobHandle),
    /// The server waited for the job and returned its result inline.
    Finished(Map<String, Value>),
    /// The server (or an error callback) answered without a usable job id.
    Rejected(Map<String, Value>),
}

/// Encode `params` and inject the auth key and wait flag.
pub fn prepare(
    codec: &PayloadCodec,
    params: RequestParams,
    auth_key: Option<&str>,
    wait_for_result: bool,
) -> Map<String, Value> {
    let mut body = codec.encode_request(params);
    body.insert(
        AUTH_KEY_FIELD.to_string(),
        auth_key.map_or(Value::Null, |key| Value::String(key.to_string())),
    );
    body.insert(WAIT_FOR_RESULT_FIELD.to_string(), Value::Bool(wait_for_result));
    body
}

/// Interpret a submission response body.
///
/// Only `success` and `job_id` are inspected; everything else is left for
/// the result decoder.
pub fn interpret(raw: Value, wait_for_result: bool) -> SubmitOutcome {
    let envelope = into_object(raw);
    if wait_for_result {
        return SubmitOutcome::Finished(envelope);
    }
    let accepted = envelope.get("success").and_then(Value::as_bool) == Some(true);
    match envelope.get("job_id").and_then(Value::as_str) {
        Some(job_id) if accepted => SubmitOutcome::Accepted(JobHandle::new(job_id)),
        _ => SubmitOutcome::Rejected(envelope),
    }
}

/// Coerce a response body into a JSON object.
///
/// Non-object bodies (e.g. a bare string returned by an error callback) are
/// kept under a `response` key.
pub fn into_object(raw: Value) -> Map<String, Value> {
    match raw {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("response".to_string(), other);
            map
        }
    }
}
