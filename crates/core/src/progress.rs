//! Progress envelope types and normalization.
//!
//! The progress endpoint nests its payload differently per job state:
//! mid-flight responses carry it under `progress.progress_data`, terminal
//! responses under `job_result`. [`normalize`] folds both shapes into a
//! [`PollStep`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::codec::{CodecError, PayloadCodec};
use crate::payload::{passthrough_fields, DecodedFields, JobResult, ResultValue};

/// Remote job state. Unknown states are treated as still processing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum JobState {
    #[default]
    Processing,
    Done,
    Canceled,
}

impl From<String> for JobState {
    fn from(value: String) -> Self {
        match value.as_str() {
            "done" => Self::Done,
            "canceled" | "cancelled" => Self::Canceled,
            _ => Self::Processing,
        }
    }
}

impl JobState {
    /// Whether the job will make no further progress.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Canceled)
    }
}

/// One observed state of a job.
///
/// `queue_position` and `estimate` use `-1` for "unknown".
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    pub job_id: String,
    pub job_state: JobState,
    /// Completion percentage, `0..=100`.
    pub progress: u8,
    pub queue_position: i64,
    /// Estimated seconds remaining.
    pub estimate: f64,
    pub progress_data: Option<DecodedFields>,
}

impl ProgressSnapshot {
    /// The synthetic snapshot reported right after submission.
    pub fn initial(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            job_state: JobState::Processing,
            progress: 0,
            queue_position: -1,
            estimate: -1.0,
            progress_data: None,
        }
    }

    /// Whether the snapshot ends the job.
    pub fn is_terminal(&self) -> bool {
        self.job_state.is_terminal()
    }
}

/// One normalized poll response.
#[derive(Debug, Clone, PartialEq)]
pub enum PollStep {
    /// The job is still running.
    Progress(ProgressSnapshot),
    /// The job finished; `snapshot` is the terminal progress report.
    Done {
        snapshot: ProgressSnapshot,
        result: JobResult,
    },
    /// The job was canceled remotely.
    Canceled(ProgressSnapshot),
    /// The response did not confirm success, e.g. a value returned by an
    /// error callback. Fields are passed through undecoded.
    Unconfirmed { job_id: String, payload: DecodedFields },
}

#[derive(Debug, Default, Deserialize)]
struct ProgressEnvelope {
    #[serde(default)]
    job_id: Option<String>,
    #[serde(default)]
    job_state: Option<JobState>,
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    progress: Option<ProgressBody>,
    #[serde(default)]
    job_result: Option<Map<String, Value>>,
}

#[derive(Debug, Default, Deserialize)]
struct ProgressBody {
    #[serde(default)]
    progress: Option<f64>,
    #[serde(default)]
    queue_position: Option<f64>,
    #[serde(default)]
    estimate: Option<f64>,
    #[serde(default)]
    progress_data: Option<Map<String, Value>>,
}

/// Normalize a progress response for the job `job_id`.
///
/// Mid-flight payloads and terminal results are run through `codec`;
/// canceled and unconfirmed payloads are passed through as received.
pub fn normalize(raw: Value, job_id: &str, codec: &PayloadCodec) -> Result<PollStep, CodecError> {
    let envelope = match serde_json::from_value::<ProgressEnvelope>(raw.clone()) {
        Ok(envelope) if envelope.success == Some(true) => envelope,
        _ => {
            return Ok(PollStep::Unconfirmed {
                job_id: job_id.to_string(),
                payload: passthrough_fields(crate::submission::into_object(raw)),
            })
        }
    };

    let job_id = envelope.job_id.unwrap_or_else(|| job_id.to_string());
    let job_state = envelope.job_state.unwrap_or_default();
    let body = envelope.progress.unwrap_or_default();

    let mut snapshot = ProgressSnapshot {
        job_id: job_id.clone(),
        job_state,
        progress: clamp_percent(body.progress.unwrap_or(0.0)),
        queue_position: body.queue_position.map_or(-1, |q| q as i64),
        estimate: body.estimate.unwrap_or(-1.0),
        progress_data: None,
    };

    match job_state {
        JobState::Done => {
            let mut result = JobResult::new(codec.decode_result(envelope.job_result.unwrap_or_default())?);
            result.insert("job_id", ResultValue::Json(Value::String(job_id)));
            if !result.contains_key("success") {
                result.insert("success", ResultValue::Json(Value::Bool(true)));
            }
            snapshot.progress = 100;
            snapshot.progress_data = Some(result.fields().clone());
            Ok(PollStep::Done { snapshot, result })
        }
        JobState::Canceled => {
            snapshot.progress_data = body.progress_data.map(passthrough_fields);
            Ok(PollStep::Canceled(snapshot))
        }
        JobState::Processing => {
            snapshot.progress_data = body
                .progress_data
                .map(|data| codec.decode_result(data))
                .transpose()?;
            Ok(PollStep::Progress(snapshot))
        }
    }
}

fn clamp_percent(value: f64) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.round().clamp(0.0, 100.0) as u8
}
