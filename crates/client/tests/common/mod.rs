use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use aime_client::transport::{BlockingTransport, Transport, TransportError};
use aime_client::{Callback, ClientConfig};
use aime_core::protocol::{HttpRequest, HttpResponse};
use async_trait::async_trait;
use serde_json::{json, Value};

pub const SERVER: &str = "http://api.example.test";
pub const ENDPOINT: &str = "llama3_chat";

/// Build a test `ClientConfig` that polls every millisecond.
pub fn test_config() -> ClientConfig {
    ClientConfig::new(SERVER, ENDPOINT).with_progress_interval(Duration::from_millis(1))
}

enum Scripted {
    Respond(HttpResponse),
    Offline,
}

/// In-memory server: replays queued responses in order and records every
/// request it receives. Clones share the same script and log.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    script: Arc<Mutex<VecDeque<Scripted>>>,
    requests: Arc<Mutex<Vec<HttpRequest>>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a JSON response.
    pub fn respond(&self, status: u16, body: Value) -> &Self {
        self.push(Scripted::Respond(HttpResponse::json(status, &body)))
    }

    /// Queue a plain-text response.
    pub fn respond_text(&self, status: u16, body: &str) -> &Self {
        self.push(Scripted::Respond(HttpResponse::new(status, body)))
    }

    /// Queue a connection failure.
    pub fn offline(&self) -> &Self {
        self.push(Scripted::Offline)
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// URLs of all received requests, in order.
    pub fn urls(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.url).collect()
    }

    fn push(&self, entry: Scripted) -> &Self {
        self.script.lock().unwrap().push_back(entry);
        self
    }

    fn next(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        match self.script.lock().unwrap().pop_front() {
            Some(Scripted::Respond(response)) => Ok(response),
            Some(Scripted::Offline) => Err(TransportError::Connection("connection refused".into())),
            None => Err(TransportError::Connection(format!("no scripted response for {}", request.url))),
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        self.next(request)
    }
}

impl BlockingTransport for ScriptedTransport {
    fn send_blocking(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        self.next(request)
    }
}

impl std::fmt::Debug for ScriptedTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedTransport")
            .field("requests", &self.request_count())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Canned server responses
// ---------------------------------------------------------------------------

pub fn login_ok(key: &str) -> Value {
    json!({"success": true, "client_session_auth_key": key})
}

pub fn accepted(job_id: &str) -> Value {
    json!({"success": true, "job_id": job_id})
}

pub fn processing(job_id: &str, progress: u32) -> Value {
    json!({
        "job_id": job_id,
        "job_state": "processing",
        "success": true,
        "progress": {"progress": progress, "queue_position": 0, "estimate": 5.0}
    })
}

pub fn done(job_id: &str, job_result: Value) -> Value {
    json!({
        "job_id": job_id,
        "job_state": "done",
        "success": true,
        "job_result": job_result,
        "progress": {"progress": 100, "queue_position": 0}
    })
}

pub fn canceled(job_id: &str) -> Value {
    json!({
        "job_id": job_id,
        "job_state": "canceled",
        "success": true,
        "progress": {"progress": 10, "queue_position": 0}
    })
}

/// A sync callback that records every argument it receives.
pub fn recorder<A: Send + 'static>() -> (Arc<Mutex<Vec<A>>>, Callback<A>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let callback = Callback::sync(move |arg| sink.lock().unwrap().push(arg));
    (seen, callback)
}
