use std::future::Future;
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use tracing::{debug, info, warn};
use url::Url;

use secplus_auth::bridge::BRIDGE_CACHE_NAME;
use secplus_auth::store::{CacheEntry, CacheSet, NamedCache, AUTH_CACHE_NAME};

use crate::error::WorkerError;

/// Versioned name of the app-shell cache. Bumping the suffix retires the
/// previous version's entries on the next activate sweep.
pub const APP_CACHE_NAME: &str = "sp-cache-v3";

/// Served when a navigation misses both the network and the cache.
pub const OFFLINE_PATH: &str = "/offline.html";

/// Assets the app cannot start without. Install is all-or-nothing over
/// this list.
pub const ESSENTIAL_ASSETS: [&str; 5] = [
    "/",
    "/index.html",
    OFFLINE_PATH,
    "/icons/icon-512.png",
    "/manifest.webmanifest",
];

/// Caches owned by the auth stack. The activate sweep leaves them alone;
/// wiping either would throw away the session backup or a staged install
/// code.
pub const COOPERATING_CACHES: [&str; 2] = [AUTH_CACHE_NAME, BRIDGE_CACHE_NAME];

/// The push vendor routes its own requests through its own worker.
const PUSH_VENDOR_DOMAIN: &str = "onesignal.com";

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
}

/// What the intercepted request is loading, in the browser's terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    Document,
    Image,
    Font,
    Script,
    Style,
    Other,
}

#[derive(Debug, Clone)]
pub struct Request {
    pub url: String,
    pub method: Method,
    pub destination: Destination,
}

impl Request {
    pub fn navigation(url: impl Into<String>) -> Self {
        Self::get(url, Destination::Document)
    }

    pub fn get(url: impl Into<String>, destination: Destination) -> Self {
        Self {
            url: url.into(),
            method: Method::Get,
            destination,
        }
    }
}

/// What the worker decided to do with a request.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Not ours; let the platform handle it untouched.
    PassThrough,
    Respond(CacheEntry),
}

impl Outcome {
    pub fn response(&self) -> Option<&CacheEntry> {
        match self {
            Outcome::PassThrough => None,
            Outcome::Respond(entry) => Some(entry),
        }
    }
}

/// The network edge of the worker. Implemented over HTTP in production
/// and scripted in tests.
pub trait Fetch: Send + Sync {
    /// An `Err` means the network itself failed (offline); an HTTP error
    /// status still comes back as a response.
    fn fetch(&self, url: &str) -> impl Future<Output = Result<CacheEntry, WorkerError>> + Send;
}

pub struct HttpFetch {
    http: reqwest::Client,
}

impl HttpFetch {
    pub fn new() -> Result<Self, WorkerError> {
        let http = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(|e| WorkerError::Network(e.to_string()))?;
        Ok(Self { http })
    }
}

impl Fetch for HttpFetch {
    async fn fetch(&self, url: &str) -> Result<CacheEntry, WorkerError> {
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| WorkerError::Network(e.to_string()))?;
        let status = resp.status().as_u16();
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = resp
            .bytes()
            .await
            .map_err(|e| WorkerError::Network(e.to_string()))?
            .to_vec();
        Ok(CacheEntry {
            status,
            content_type,
            body,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Installing,
    Waiting,
    Active,
}

/// Offline cache controller: the service-worker analog. Precaches the
/// essential assets on install, sweeps stale cache versions on activate,
/// and routes intercepted GET requests through a per-destination strategy:
/// navigations are network-first with the offline page as the last resort,
/// everything static is cache-first.
pub struct Worker<F: Fetch> {
    caches: CacheSet,
    shell: NamedCache,
    fetcher: F,
    origin: Url,
    state: WorkerState,
}

impl<F: Fetch> Worker<F> {
    pub fn new(caches: CacheSet, fetcher: F, origin: &str) -> Result<Self, WorkerError> {
        let origin =
            Url::parse(origin).map_err(|e| WorkerError::Origin(format!("{}: {}", origin, e)))?;
        Ok(Self {
            shell: caches.cache(APP_CACHE_NAME),
            caches,
            fetcher,
            origin,
            state: WorkerState::Installing,
        })
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Precache every essential asset. All-or-nothing: nothing is written
    /// until the whole list fetched cleanly, so a half-cached shell can
    /// never activate.
    pub async fn install(&mut self) -> Result<(), WorkerError> {
        let mut fetched = Vec::with_capacity(ESSENTIAL_ASSETS.len());
        for path in ESSENTIAL_ASSETS {
            let url = self
                .origin
                .join(path)
                .map_err(|e| WorkerError::Origin(format!("{}: {}", path, e)))?;
            let entry = self
                .fetcher
                .fetch(url.as_str())
                .await
                .map_err(|e| WorkerError::Install(format!("{}: {}", path, e)))?;
            if !is_ok(entry.status) {
                return Err(WorkerError::Install(format!(
                    "{}: status {}",
                    path, entry.status
                )));
            }
            fetched.push((path, entry));
        }
        for (path, entry) in &fetched {
            self.shell.put(path, entry)?;
        }
        self.state = WorkerState::Waiting;
        info!(cache = APP_CACHE_NAME, assets = fetched.len(), "essential assets cached");
        Ok(())
    }

    /// Delete caches left behind by previous worker versions, keeping the
    /// current shell cache and the auth stack's cooperating caches.
    pub async fn activate(&mut self) -> Result<(), WorkerError> {
        for name in self.caches.names()? {
            if name == APP_CACHE_NAME || COOPERATING_CACHES.contains(&name.as_str()) {
                continue;
            }
            info!(cache = %name, "removing stale cache");
            self.caches.remove(&name)?;
        }
        self.state = WorkerState::Active;
        Ok(())
    }

    /// Route one intercepted request. Cache trouble never surfaces from
    /// here; a broken cache degrades to plain network behavior.
    pub async fn handle(&self, request: &Request) -> Outcome {
        if request.method != Method::Get {
            return Outcome::PassThrough;
        }
        if request.url.contains(PUSH_VENDOR_DOMAIN) {
            return Outcome::PassThrough;
        }
        match request.destination {
            Destination::Document => Outcome::Respond(self.network_first(request).await),
            Destination::Image | Destination::Font => {
                Outcome::Respond(self.cache_first(request).await)
            }
            // Build output is content-hashed, so a cached copy is as good
            // as the network's.
            Destination::Script | Destination::Style => {
                Outcome::Respond(self.cache_first(request).await)
            }
            Destination::Other => Outcome::PassThrough,
        }
    }

    async fn network_first(&self, request: &Request) -> CacheEntry {
        let key = cache_key(&request.url);
        match self.fetcher.fetch(&request.url).await {
            Ok(entry) => {
                if is_ok(entry.status) {
                    self.store(&key, &entry);
                }
                entry
            }
            Err(e) => {
                debug!(url = %request.url, error = %e, "navigation offline, serving from cache");
                match self.lookup(&key) {
                    Some(cached) => cached,
                    None => self.lookup(OFFLINE_PATH).unwrap_or_else(empty_not_found),
                }
            }
        }
    }

    async fn cache_first(&self, request: &Request) -> CacheEntry {
        let key = cache_key(&request.url);
        if let Some(cached) = self.lookup(&key) {
            return cached;
        }
        match self.fetcher.fetch(&request.url).await {
            Ok(entry) => {
                if is_ok(entry.status) {
                    self.store(&key, &entry);
                }
                entry
            }
            Err(e) => {
                // A missing image or font degrades gracefully on screen.
                debug!(url = %request.url, error = %e, "static asset unavailable");
                empty_not_found()
            }
        }
    }

    fn lookup(&self, key: &str) -> Option<CacheEntry> {
        match self.shell.get(key) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key, error = %e, "cache read failed");
                None
            }
        }
    }

    fn store(&self, key: &str, entry: &CacheEntry) {
        if let Err(e) = self.shell.put(key, entry) {
            warn!(key, error = %e, "cache write failed");
        }
    }
}

/// Cache entries are keyed by path (plus query), so a navigation to the
/// full URL matches the asset precached under its path.
fn cache_key(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => match parsed.query() {
            Some(query) => format!("{}?{}", parsed.path(), query),
            None => parsed.path().to_string(),
        },
        // Already a bare path.
        Err(_) => url.to_string(),
    }
}

fn is_ok(status: u16) -> bool {
    (200..300).contains(&status)
}

fn empty_not_found() -> CacheEntry {
    CacheEntry {
        status: 404,
        content_type: None,
        body: Vec::new(),
    }
}
