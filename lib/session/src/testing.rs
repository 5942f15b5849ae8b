//! Test doubles shared by the module tests.

use async_trait::async_trait;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use crate::broadcast::QueryCache;
use crate::error::RequestError;
use crate::identity::TokenGrant;
use crate::navigation::Navigator;
use crate::transport::{ApiRequest, ApiResponse, ApiTransport};

/// Transport that accepts exactly one bearer token and replays scripted
/// refresh outcomes.
pub(crate) struct ScriptedTransport {
    valid_token: Mutex<String>,
    reject_all: AtomicBool,
    refresh_results: Mutex<VecDeque<Result<TokenGrant, RequestError>>>,
    refresh_tokens: Mutex<Vec<Option<String>>>,
    refresh_calls: AtomicUsize,
    sent: Mutex<Vec<(ApiRequest, Option<String>)>>,
    gate: Option<Arc<Notify>>,
}

impl ScriptedTransport {
    pub(crate) fn new(valid_token: &str) -> Self {
        Self {
            valid_token: Mutex::new(valid_token.to_string()),
            reject_all: AtomicBool::new(false),
            refresh_results: Mutex::new(VecDeque::new()),
            refresh_tokens: Mutex::new(Vec::new()),
            refresh_calls: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    /// Makes every refresh wait for one notification before completing.
    pub(crate) fn with_gate(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Answers 401 to every request regardless of token.
    pub(crate) fn reject_all(&self) {
        self.reject_all.store(true, Ordering::SeqCst);
    }

    /// Queues the outcome of the next refresh call.
    pub(crate) fn push_refresh(&self, result: Result<TokenGrant, RequestError>) {
        self.refresh_results.lock().expect("lock").push_back(result);
    }

    pub(crate) fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn refresh_tokens(&self) -> Vec<Option<String>> {
        self.refresh_tokens.lock().expect("lock").clone()
    }

    /// Requests sent so far, with the bearer each carried.
    pub(crate) fn sent(&self) -> Vec<(ApiRequest, Option<String>)> {
        self.sent.lock().expect("lock").clone()
    }
}

#[async_trait]
impl ApiTransport for ScriptedTransport {
    async fn send(
        &self,
        request: &ApiRequest,
        bearer: Option<&str>,
    ) -> Result<ApiResponse, RequestError> {
        self.sent
            .lock()
            .expect("lock")
            .push((request.clone(), bearer.map(str::to_string)));

        let valid = self.valid_token.lock().expect("lock").clone();
        if self.reject_all.load(Ordering::SeqCst) || bearer != Some(valid.as_str()) {
            return Ok(ApiResponse::new(
                401,
                json!({ "message": "token expired" }).to_string(),
            ));
        }
        Ok(ApiResponse::new(
            200,
            json!({ "path": request.path, "retried": request.retried }).to_string(),
        ))
    }

    async fn refresh(&self, refresh_token: Option<&str>) -> Result<TokenGrant, RequestError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.refresh_tokens
            .lock()
            .expect("lock")
            .push(refresh_token.map(str::to_string));

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        let result = self
            .refresh_results
            .lock()
            .expect("lock")
            .pop_front()
            .unwrap_or(Err(RequestError::Status {
                status: 401,
                message: "refresh token expired".to_string(),
            }));
        if let Ok(grant) = &result {
            *self.valid_token.lock().expect("lock") = grant.access_token.clone();
        }
        result
    }
}

/// Navigator that records every target.
#[derive(Default)]
pub(crate) struct RecordingNavigator {
    visits: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub(crate) fn visits(&self) -> Vec<String> {
        self.visits.lock().expect("lock").clone()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, path: &str) {
        self.visits.lock().expect("lock").push(path.to_string());
    }
}

/// Query cache that counts clears.
#[derive(Default)]
pub(crate) struct CountingCache {
    clears: AtomicUsize,
}

impl CountingCache {
    pub(crate) fn count(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }
}

impl QueryCache for CountingCache {
    fn clear(&self) {
        self.clears.fetch_add(1, Ordering::SeqCst);
    }
}
