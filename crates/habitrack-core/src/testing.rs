//! Scripted transport for exercising the pipeline without a server.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;
use serde_json::Value;

use crate::api::{ApiRequest, ApiResponse, RequestPipeline, Transport, TransportError};
use crate::auth::{CredentialStore, SessionEvents};

type Responder = dyn Fn(&ApiRequest) -> Result<ApiResponse, TransportError> + Send + Sync;

/// What the mock saw for one dispatch.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub authorization: Option<String>,
    pub body: Option<Value>,
}

#[derive(Clone)]
pub struct MockTransport {
    responder: Arc<Responder>,
    log: Arc<Mutex<Vec<Recorded>>>,
    delays: Vec<(String, Duration)>,
}

impl MockTransport {
    pub fn new(
        responder: impl Fn(&ApiRequest) -> Result<ApiResponse, TransportError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            responder: Arc::new(responder),
            log: Arc::new(Mutex::new(Vec::new())),
            delays: Vec::new(),
        }
    }

    /// Hold every answer for `path` back by `delay`.
    pub fn delay(mut self, path: &str, delay: Duration) -> Self {
        self.delays.push((path.to_string(), delay));
        self
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.log.lock().unwrap().clone()
    }

    pub fn count(&self, path: &str) -> usize {
        self.requests().iter().filter(|r| r.path == path).count()
    }
}

impl Transport for MockTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        self.log.lock().unwrap().push(Recorded {
            method: request.method().to_string(),
            path: request.path().to_string(),
            authorization: request
                .headers()
                .get(AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
            body: request.body().cloned(),
        });
        // Suspend once so concurrent callers interleave like real I/O.
        tokio::task::yield_now().await;
        if let Some((_, delay)) = self.delays.iter().find(|(path, _)| path == request.path()) {
            tokio::time::sleep(*delay).await;
        }
        (self.responder)(&request)
    }
}

pub fn respond(status: u16, body: Value) -> Result<ApiResponse, TransportError> {
    let status = StatusCode::from_u16(status).unwrap();
    Ok(ApiResponse::new(status, body.to_string()))
}

pub fn bearer(request: &ApiRequest) -> Option<&str> {
    request.headers().get(AUTHORIZATION).and_then(|v| v.to_str().ok())
}

/// Pipeline over `transport` with an in-memory store preloaded with `tokens`.
pub fn pipeline_with(
    transport: MockTransport,
    tokens: Option<(&str, &str)>,
) -> Arc<RequestPipeline<MockTransport>> {
    let store = Arc::new(CredentialStore::in_memory());
    if let Some((access, refresh)) = tokens {
        store.set(access, refresh);
    }
    Arc::new(RequestPipeline::new(transport, store, SessionEvents::new()))
}
