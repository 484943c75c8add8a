use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use secplus_api::endpoints::push::PushSubscriptionUpsert;
use secplus_api::ApiError;
use secplus_auth::store::CacheEntry;

use crate::error::{PushError, WorkerError};
use crate::offline::Fetch;
use crate::push::{Permission, PushPlatform, SubscriptionSink};

/// Scripted network edge for worker tests (no real HTTP)
///
/// Every URL maps to a queue of outcomes popped per fetch; a URL with an
/// exhausted or absent queue behaves as offline. Calls are recorded so
/// tests can assert which strategy touched the network.
pub struct ScriptedFetch {
    responses: Mutex<HashMap<String, VecDeque<Result<CacheEntry, String>>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedFetch {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn respond(&self, url: &str, entry: CacheEntry) {
        self.responses
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(Ok(entry));
    }

    pub fn fail(&self, url: &str) {
        self.responses
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(Err("connection refused".to_string()));
    }

    /// Every URL fetched so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == url).count()
    }
}

impl Default for ScriptedFetch {
    fn default() -> Self {
        Self::new()
    }
}

impl Fetch for ScriptedFetch {
    async fn fetch(&self, url: &str) -> Result<CacheEntry, WorkerError> {
        self.calls.lock().unwrap().push(url.to_string());
        match self
            .responses
            .lock()
            .unwrap()
            .get_mut(url)
            .and_then(|queue| queue.pop_front())
        {
            Some(Ok(entry)) => Ok(entry),
            Some(Err(message)) => Err(WorkerError::Network(message)),
            None => Err(WorkerError::Network(format!("offline: {}", url))),
        }
    }
}

/// Successful HTML response for worker tests.
pub fn page(body: &str) -> CacheEntry {
    CacheEntry {
        status: 200,
        content_type: Some("text/html".to_string()),
        body: body.as_bytes().to_vec(),
    }
}

/// Push vendor fake with a configurable permission answer and a
/// subscription id that appears only after a number of probes.
pub struct FakePlatform {
    permission: Permission,
    grant_on_request: bool,
    opt_in_error: Option<String>,
    id: Option<String>,
    id_after_probes: u32,
    probes: Mutex<u32>,
}

impl FakePlatform {
    pub fn granted(id: &str) -> Self {
        Self {
            permission: Permission::Granted,
            grant_on_request: true,
            opt_in_error: None,
            id: Some(id.to_string()),
            id_after_probes: 0,
            probes: Mutex::new(0),
        }
    }

    /// Permission starts undecided and is granted on request; the id shows
    /// up after `ready_after` probes.
    pub fn undecided_then_granted(id: &str, ready_after: u32) -> Self {
        Self {
            permission: Permission::Undecided,
            grant_on_request: true,
            opt_in_error: None,
            id: Some(id.to_string()),
            id_after_probes: ready_after,
            probes: Mutex::new(0),
        }
    }

    pub fn denied() -> Self {
        Self {
            permission: Permission::Denied,
            grant_on_request: false,
            opt_in_error: None,
            id: None,
            id_after_probes: 0,
            probes: Mutex::new(0),
        }
    }

    /// Permission granted but the vendor never assigns an id.
    pub fn never_ready() -> Self {
        Self {
            permission: Permission::Granted,
            grant_on_request: true,
            opt_in_error: None,
            id: None,
            id_after_probes: 0,
            probes: Mutex::new(0),
        }
    }

    /// Permission granted but the vendor SDK errors on opt-in.
    pub fn broken_vendor(message: &str) -> Self {
        Self {
            permission: Permission::Granted,
            grant_on_request: true,
            opt_in_error: Some(message.to_string()),
            id: None,
            id_after_probes: 0,
            probes: Mutex::new(0),
        }
    }

    pub fn probes(&self) -> u32 {
        *self.probes.lock().unwrap()
    }
}

impl PushPlatform for FakePlatform {
    async fn permission(&self) -> Permission {
        self.permission
    }

    async fn request_permission(&self) -> Result<Permission, PushError> {
        Ok(if self.grant_on_request {
            Permission::Granted
        } else {
            Permission::Denied
        })
    }

    async fn opt_in(&self) -> Result<(), PushError> {
        match &self.opt_in_error {
            Some(message) => Err(PushError::Vendor(message.clone())),
            None => Ok(()),
        }
    }

    async fn subscription_id(&self) -> Option<String> {
        let mut probes = self.probes.lock().unwrap();
        *probes += 1;
        let id = self.id.as_ref()?;
        (*probes > self.id_after_probes).then(|| id.clone())
    }
}

/// Sink that records every registered row, optionally rejecting them the
/// way the backend would.
pub struct RecordingSink {
    rows: Mutex<Vec<(String, PushSubscriptionUpsert)>>,
    reject: bool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
            reject: false,
        }
    }

    pub fn rejecting() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
            reject: true,
        }
    }

    /// Registered `(access_token, row)` pairs so far.
    pub fn rows(&self) -> Vec<(String, PushSubscriptionUpsert)> {
        self.rows.lock().unwrap().clone()
    }
}

impl Default for RecordingSink {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriptionSink for RecordingSink {
    async fn register(
        &self,
        access_token: &str,
        row: &PushSubscriptionUpsert,
    ) -> Result<(), PushError> {
        if self.reject {
            return Err(PushError::Backend(ApiError::Rejected {
                status: 401,
                message: "row level security".to_string(),
            }));
        }
        self.rows
            .lock()
            .unwrap()
            .push((access_token.to_string(), row.clone()));
        Ok(())
    }
}
