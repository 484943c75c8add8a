use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;

use crate::auth_backend::AuthBackend;
use crate::error::AuthError;
use crate::session::SessionPayload;

/// Scripted auth backend for tests (no network)
///
/// Each call pops the next queued response for that operation and records
/// the call; an exhausted queue panics with the operation name. Optional
/// latency makes a call hold the in-flight guard long enough for
/// concurrency tests to observe it.
pub struct ScriptedBackend {
    validate: Mutex<VecDeque<Result<(), AuthError>>>,
    refresh: Mutex<VecDeque<Result<SessionPayload, AuthError>>>,
    exchange: Mutex<VecDeque<Result<SessionPayload, AuthError>>>,
    sign_out: Mutex<VecDeque<Result<(), AuthError>>>,
    calls: Mutex<Vec<String>>,
    latency: Duration,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::with_latency(Duration::ZERO)
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            validate: Mutex::new(VecDeque::new()),
            refresh: Mutex::new(VecDeque::new()),
            exchange: Mutex::new(VecDeque::new()),
            sign_out: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            latency,
        }
    }

    pub fn queue_validate(&self, response: Result<(), AuthError>) {
        self.validate.lock().unwrap().push_back(response);
    }

    pub fn queue_refresh(&self, response: Result<SessionPayload, AuthError>) {
        self.refresh.lock().unwrap().push_back(response);
    }

    pub fn queue_exchange(&self, response: Result<SessionPayload, AuthError>) {
        self.exchange.lock().unwrap().push_back(response);
    }

    pub fn queue_sign_out(&self, response: Result<(), AuthError>) {
        self.sign_out.lock().unwrap().push_back(response);
    }

    /// Every operation invoked so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, operation: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| *c == operation)
            .count()
    }

    async fn begin(&self, operation: &str) {
        self.calls.lock().unwrap().push(operation.to_string());
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthBackend for ScriptedBackend {
    async fn validate(&self, _access_token: &str) -> Result<(), AuthError> {
        self.begin("validate").await;
        self.validate
            .lock()
            .unwrap()
            .pop_front()
            .expect("no scripted validate response left")
    }

    async fn refresh(&self, _refresh_token: &str) -> Result<SessionPayload, AuthError> {
        self.begin("refresh").await;
        self.refresh
            .lock()
            .unwrap()
            .pop_front()
            .expect("no scripted refresh response left")
    }

    async fn exchange_code(&self, _code: &str, _device_info: &str) -> Result<SessionPayload, AuthError> {
        self.begin("exchange").await;
        self.exchange
            .lock()
            .unwrap()
            .pop_front()
            .expect("no scripted exchange response left")
    }

    async fn sign_out(&self, _access_token: &str) -> Result<(), AuthError> {
        self.begin("sign_out").await;
        self.sign_out
            .lock()
            .unwrap()
            .pop_front()
            .expect("no scripted sign_out response left")
    }
}

/// Complete session payload for tests, expiring `ttl` from now. Negative
/// values produce an already-expired session.
pub fn session_fixture(tag: &str, ttl: chrono::Duration) -> SessionPayload {
    SessionPayload {
        access_token: format!("access-{tag}"),
        refresh_token: format!("refresh-{tag}"),
        expires_at: Some(Utc::now() + ttl),
        token_type: Some("bearer".to_string()),
        provider_token: None,
        user: Some(json!({
            "id": format!("user-{tag}"),
            "email": format!("{tag}@clinic.example"),
        })),
    }
}
