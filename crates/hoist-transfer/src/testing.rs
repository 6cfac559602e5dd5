//! Shared fixtures for the engine tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use hoist_api::DatasetStorage;
use hoist_http::{HttpClient, HttpError, Request, Response, Transport};

use crate::session::StorageSession;

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

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn json(value: serde_json::Value) -> Self {
        Self::ok().body(value.to_string())
    }
}

/// Scripted HTTP client: routes every request through a handler closure
/// and records what it saw.
pub struct MockClient {
    log: Mutex<Vec<Request>>,
    handler: Box<dyn Fn(&Request) -> MockResponse + Send + Sync>,
}

impl MockClient {
    pub fn new(
        handler: impl Fn(&Request) -> MockResponse + Send + Sync + 'static,
    ) -> Arc<Self> {
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

pub fn storage_session(client: Arc<MockClient>) -> StorageSession {
    let transport = Transport::new(client, "https://api.test", "api-token");
    let storage = DatasetStorage {
        id: "st-01".to_string(),
        token: "storage-token".to_string(),
        token_expires: chrono::Utc::now(),
        address: "https://storage.test".to_string(),
        size: None,
    };
    StorageSession::new(&transport, &storage)
}
