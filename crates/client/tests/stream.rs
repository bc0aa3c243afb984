//! Integration tests for `JobClient::stream`.

mod common;

use aime_client::{ApiError, Callback, JobClient, JobEvent, JobRequest, ProgressTransport, RequestParams, RequestStage};
use assert_matches::assert_matches;
use common::{accepted, canceled, done, login_ok, processing, recorder, test_config, ScriptedTransport};
use futures::StreamExt;
use serde_json::json;

fn request() -> JobRequest {
    JobRequest::new(RequestParams::new().with("prompt", "cat"))
}

/// The stream yields the initial snapshot, each mid-flight snapshot, and
/// ends with the result.
#[tokio::test]
async fn stream_yields_snapshots_then_result() {
    let server = ScriptedTransport::new();
    server
        .respond(200, login_ok("KEY"))
        .respond(200, accepted("JID"))
        .respond(200, processing("JID", 40))
        .respond(200, done("JID", json!({"text": "ok"})));
    let mut client = JobClient::new(test_config(), server.clone());

    let events: Vec<_> = client.stream(request()).collect().await;

    assert_eq!(events.len(), 3);
    assert_matches!(&events[0], Ok(JobEvent::Progress(s)) if s.progress == 0 && s.queue_position == -1);
    assert_matches!(&events[1], Ok(JobEvent::Progress(s)) if s.progress == 40);
    match &events[2] {
        Ok(JobEvent::Finished(result)) => assert_eq!(result.get_str("text"), Some("ok")),
        other => panic!("Expected Finished, got {other:?}"),
    }
    let submit = &server.requests()[1];
    assert_eq!(submit.body.as_ref().unwrap()["wait_for_result"], false);
}

/// Nothing is sent before the first element is pulled, and each pull
/// performs at most one poll.
#[tokio::test]
async fn stream_is_lazy() {
    let server = ScriptedTransport::new();
    server
        .respond(200, login_ok("KEY"))
        .respond(200, accepted("JID"))
        .respond(200, processing("JID", 10))
        .respond(200, done("JID", json!({})));
    let mut client = JobClient::new(test_config(), server.clone());
    let mut stream = client.stream(request());

    assert_eq!(server.request_count(), 0);
    stream.next().await;
    assert_eq!(server.request_count(), 2);
    stream.next().await;
    assert_eq!(server.request_count(), 3);
}

/// A canceled job ends the stream without a result.
#[tokio::test]
async fn canceled_job_ends_stream_silently() {
    let server = ScriptedTransport::new();
    server
        .respond(200, login_ok("KEY"))
        .respond(200, accepted("JID"))
        .respond(200, canceled("JID"));
    let mut client = JobClient::new(test_config(), server);

    let events: Vec<_> = client.stream(request()).collect().await;

    assert_eq!(events.len(), 1);
    assert_matches!(&events[0], Ok(JobEvent::Progress(_)));
}

/// An error is yielded once and ends the stream.
#[tokio::test]
async fn error_ends_stream() {
    let server = ScriptedTransport::new();
    server
        .respond(200, login_ok("KEY"))
        .respond(200, accepted("JID"))
        .offline()
        .respond(200, done("JID", json!({})));
    let mut client = JobClient::new(test_config(), server.clone());

    let events: Vec<_> = client.stream(request()).collect().await;

    assert_eq!(events.len(), 2);
    assert_matches!(
        &events[1],
        Err(ApiError::ConnectionFailure { stage: RequestStage::Progress, .. })
    );
    assert_eq!(server.request_count(), 3);
}

/// Streamed progress is rejected on the first pull without any request.
#[tokio::test]
async fn streamed_transport_is_rejected_in_stream() {
    let server = ScriptedTransport::new();
    let mut client = JobClient::new(test_config(), server.clone());

    let events: Vec<_> = client
        .stream(request().with_progress_transport(ProgressTransport::Streamed))
        .collect()
        .await;

    assert_eq!(events.len(), 1);
    assert_matches!(&events[0], Err(ApiError::UnsupportedFeature(_)));
    assert_eq!(server.request_count(), 0);
}

/// Callbacks registered on the request see the same events.
#[tokio::test]
async fn stream_also_invokes_callbacks() {
    let server = ScriptedTransport::new();
    server
        .respond(200, login_ok("KEY"))
        .respond(200, accepted("JID"))
        .respond(200, done("JID", json!({"text": "ok"})));
    let mut client = JobClient::new(test_config(), server);
    let (results, on_result) = recorder();

    let events: Vec<_> = client
        .stream(request().on_result(on_result).on_progress(Callback::none()))
        .collect()
        .await;

    assert_eq!(events.len(), 2);
    assert_eq!(results.lock().unwrap().len(), 1);
}
