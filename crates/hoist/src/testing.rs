//! Shared fixtures for the service and poller tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use hoist_http::{HttpClient, HttpError, Request, Response};
use hoist_transfer::{ProgressSink, TaskHandle};
use serde_json::json;

use crate::client::Hoist;
use crate::config::Config;

pub struct MockResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl MockResponse {
    pub fn ok() -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    pub fn json(value: serde_json::Value) -> Self {
        let mut response = Self::ok();
        response.body = Bytes::from(value.to_string());
        response
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }
}

/// Scripted HTTP client: routes every request through a handler closure
/// and records what it saw.
pub struct MockClient {
    log: Mutex<Vec<Request>>,
    handler: Box<dyn Fn(&Request) -> MockResponse + Send + Sync>,
}

impl MockClient {
    pub fn new(handler: impl Fn(&Request) -> MockResponse + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            log: Mutex::new(Vec::new()),
            handler: Box::new(handler),
        })
    }

    pub fn requests(&self) -> Vec<Request> {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpClient for MockClient {
    async fn execute(&self, request: Request) -> Result<Response, HttpError> {
        let scripted = (self.handler)(&request);
        self.log.lock().unwrap().push(request);
        Ok(Response::of_bytes(
            scripted.status,
            scripted.headers,
            scripted.body,
        ))
    }
}

/// A session over a mock client with a deterministic test config.
pub fn hoist_with(client: Arc<MockClient>) -> Hoist {
    let mut config = Config::new("test-token");
    config.agent_address = "https://api.test".to_string();
    config.default_org = Some("org".to_string());
    config.default_workspace = Some("org/main".to_string());
    Hoist::with_client(config, client)
}

pub fn account_json() -> serde_json::Value {
    json!({"id": "acct-1", "name": "petra"})
}

pub fn workspace_json(id: &str, full_name: &str, archived: bool) -> serde_json::Value {
    json!({
        "id": id,
        "name": full_name.rsplit('/').next().unwrap(),
        "fullName": full_name,
        "archived": archived,
    })
}

pub fn dataset_json(id: &str, name: &str, committed: bool) -> serde_json::Value {
    json!({
        "id": id,
        "name": name,
        "fullName": format!("petra/{name}"),
        "created": "2024-04-02T09:30:00Z",
        "committed": if committed { "2024-04-02T10:00:00Z" } else { "0001-01-01T00:00:00Z" },
        "storage": {
            "id": "st-01",
            "token": "storage-token",
            "tokenExpires": "2034-01-01T00:00:00Z",
            "address": "https://storage.test",
        },
    })
}

pub fn job_json(id: &str, finalized: bool) -> serde_json::Value {
    let mut status = json!({
        "created": "2024-04-02T09:00:00Z",
        "started": "2024-04-02T09:02:00Z",
    });
    if finalized {
        status["exited"] = json!("2024-04-02T09:10:00Z");
        status["finalized"] = json!("2024-04-02T09:11:00Z");
        status["exitCode"] = json!(0);
    }
    json!({"id": id, "name": format!("job-{id}"), "status": status})
}

pub fn experiment_json(id: &str, name: &str) -> serde_json::Value {
    json!({
        "id": id,
        "name": name,
        "fullName": format!("petra/{name}"),
        "created": "2024-04-02T09:30:00Z",
    })
}

/// Records every sink call so tests can assert on progress behavior.
pub struct RecordingProgress {
    pub added: Mutex<Vec<TaskHandle>>,
    pub advanced: AtomicU64,
    pub completed: Mutex<Vec<TaskHandle>>,
    next_id: AtomicU64,
}

impl RecordingProgress {
    pub fn new() -> Self {
        Self {
            added: Mutex::new(Vec::new()),
            advanced: AtomicU64::new(0),
            completed: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }
}

impl ProgressSink for RecordingProgress {
    fn add_task(&self, _name: &str, _total: Option<u64>) -> TaskHandle {
        let handle = TaskHandle::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.added.lock().unwrap().push(handle);
        handle
    }

    fn set_total(&self, _task: TaskHandle, _total: Option<u64>) {}

    fn advance(&self, _task: TaskHandle, amount: u64) {
        self.advanced.fetch_add(amount, Ordering::SeqCst);
    }

    fn complete(&self, task: TaskHandle) {
        self.completed.lock().unwrap().push(task);
    }
}
