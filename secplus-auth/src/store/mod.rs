pub mod cacheset;
mod http_cache;
mod record;
mod simple;
mod structured;
mod volatile;

pub use cacheset::{CacheEntry, CacheSet, NamedCache};
pub use record::{StoredRecord, RECORD_VERSION};

use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::AuthError;

use http_cache::HttpCacheStore;
use simple::SimpleStore;
use structured::StructuredStore;
use volatile::VolatileStore;

// Keys the auth stack keeps replicated across every layer.
pub const KEY_AUTH_CODE: &str = "sp_auth_code";
pub const KEY_SESSION: &str = "sp_session";
pub const KEY_USER_DATA: &str = "sp_user_data";
pub const KEY_LAST_SYNC: &str = "sp_last_sync";

pub const AUTH_KEYS: [&str; 4] = [KEY_AUTH_CODE, KEY_SESSION, KEY_USER_DATA, KEY_LAST_SYNC];

/// Named cache the http-cache layer stores its records in.
pub const AUTH_CACHE_NAME: &str = "sp-auth-cache-v1";

/// Platform the store is running on. Decides which layer is tried first:
/// the simple layer is fastest but is the first thing wiped under storage
/// pressure on iOS, where the durable layer has the better survival rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Ios,
    #[default]
    Other,
}

impl Platform {
    pub fn read_priority(self) -> [BackendKind; 4] {
        match self {
            Platform::Ios => [
                BackendKind::Structured,
                BackendKind::HttpCache,
                BackendKind::Simple,
                BackendKind::Volatile,
            ],
            Platform::Other => [
                BackendKind::Simple,
                BackendKind::Structured,
                BackendKind::HttpCache,
                BackendKind::Volatile,
            ],
        }
    }

    /// Label used in push subscription rows.
    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Ios => "ios",
            Platform::Other => "web",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Structured,
    HttpCache,
    Simple,
    Volatile,
}

impl BackendKind {
    pub fn label(self) -> &'static str {
        match self {
            BackendKind::Structured => "structured",
            BackendKind::HttpCache => "http-cache",
            BackendKind::Simple => "simple",
            BackendKind::Volatile => "volatile",
        }
    }
}

const ALL_BACKENDS: [BackendKind; 4] = [
    BackendKind::Structured,
    BackendKind::HttpCache,
    BackendKind::Simple,
    BackendKind::Volatile,
];

/// Replicated key-value store over four storage layers. Writes fan out to
/// every layer and failures of individual layers are logged, not raised;
/// losing a layer must never take the auth stack down with it. Reads walk
/// the platform priority order and copy the winning record back into the
/// layers that lost it.
pub struct KvStore {
    root: PathBuf,
    platform: Platform,
    structured: StructuredStore,
    http_cache: HttpCacheStore,
    simple: SimpleStore,
    volatile: VolatileStore,
}

impl KvStore {
    pub fn open(root: impl Into<PathBuf>, platform: Platform) -> Result<Self, AuthError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        let caches = CacheSet::open(root.join("caches"));
        Ok(Self {
            structured: StructuredStore::new(&root),
            http_cache: HttpCacheStore::new(&caches),
            simple: SimpleStore::new(&root),
            volatile: VolatileStore::new(),
            root,
            platform,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// The cache set this store shares with the offline worker and the
    /// install bridge.
    pub fn caches(&self) -> CacheSet {
        CacheSet::open(self.root.join("caches"))
    }

    /// Serialize `value` once and fan it out to every layer.
    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<(), AuthError> {
        let record = StoredRecord::wrap(value)?;
        self.set_record(key, &record);
        Ok(())
    }

    /// Fan a prepared record out to every layer, keeping its timestamp.
    pub fn set_record(&self, key: &str, record: &StoredRecord) {
        for kind in ALL_BACKENDS {
            if let Err(e) = self.put_in(kind, key, record) {
                warn!(backend = kind.label(), key, error = %e, "layer write failed");
            }
        }
    }

    /// Priority read. The first layer holding the key wins and its record
    /// is copied into every other layer before returning.
    pub fn get_record(&self, key: &str) -> Option<StoredRecord> {
        let order = self.platform.read_priority();
        let mut winner: Option<(BackendKind, StoredRecord)> = None;
        for kind in order {
            match self.get_from(kind, key) {
                Ok(Some(record)) => {
                    winner = Some((kind, record));
                    break;
                }
                Ok(None) => {}
                Err(e) => warn!(backend = kind.label(), key, error = %e, "layer read failed"),
            }
        }

        let (winner_kind, record) = winner?;
        for kind in ALL_BACKENDS {
            if kind == winner_kind {
                continue;
            }
            if let Err(e) = self.put_in(kind, key, &record) {
                warn!(backend = kind.label(), key, error = %e, "layer heal failed");
            }
        }
        debug!(backend = winner_kind.label(), key, "read served");
        Some(record)
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let record = self.get_record(key)?;
        match record.parse() {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key, error = %e, "stored record failed to parse");
                None
            }
        }
    }

    /// Remove the key from every layer.
    pub fn remove(&self, key: &str) {
        for kind in ALL_BACKENDS {
            if let Err(e) = self.delete_in(kind, key) {
                warn!(backend = kind.label(), key, error = %e, "layer delete failed");
            }
        }
    }

    /// Freshest-wins repair for one key: the newest record found in any
    /// layer is rewritten everywhere.
    pub fn reconcile(&self, key: &str) -> Option<StoredRecord> {
        let mut newest: Option<StoredRecord> = None;
        for kind in ALL_BACKENDS {
            match self.get_from(kind, key) {
                Ok(Some(record)) => {
                    let replace = newest
                        .as_ref()
                        .is_none_or(|best| record.timestamp > best.timestamp);
                    if replace {
                        newest = Some(record);
                    }
                }
                Ok(None) => {}
                Err(e) => warn!(backend = kind.label(), key, error = %e, "layer read failed"),
            }
        }
        let record = newest?;
        self.set_record(key, &record);
        Some(record)
    }

    /// Repair every replicated auth key, then stamp the sweep so every
    /// layer records when the layers last agreed.
    pub fn reconcile_all(&self) {
        for key in AUTH_KEYS {
            self.reconcile(key);
        }
        if let Err(e) = self.set(KEY_LAST_SYNC, &Utc::now().timestamp_millis()) {
            warn!(error = %e, "last-sync stamp failed");
        }
    }

    /// Which layers currently hold the key. Diagnostic surface.
    pub fn health(&self, key: &str) -> Vec<(BackendKind, bool)> {
        ALL_BACKENDS
            .into_iter()
            .map(|kind| (kind, matches!(self.get_from(kind, key), Ok(Some(_)))))
            .collect()
    }

    /// Drop every replicated auth key from every layer.
    pub fn clear_auth_keys(&self) {
        for key in AUTH_KEYS {
            self.remove(key);
        }
    }

    fn put_in(&self, kind: BackendKind, key: &str, record: &StoredRecord) -> Result<(), AuthError> {
        match kind {
            BackendKind::Structured => self.structured.put(key, record),
            BackendKind::HttpCache => self.http_cache.put(key, record),
            BackendKind::Simple => self.simple.put(key, record),
            BackendKind::Volatile => self.volatile.put(key, record),
        }
    }

    fn get_from(&self, kind: BackendKind, key: &str) -> Result<Option<StoredRecord>, AuthError> {
        match kind {
            BackendKind::Structured => self.structured.get(key),
            BackendKind::HttpCache => self.http_cache.get(key),
            BackendKind::Simple => self.simple.get(key),
            BackendKind::Volatile => self.volatile.get(key),
        }
    }

    fn delete_in(&self, kind: BackendKind, key: &str) -> Result<(), AuthError> {
        match kind {
            BackendKind::Structured => self.structured.delete(key),
            BackendKind::HttpCache => self.http_cache.delete(key),
            BackendKind::Simple => self.simple.delete(key),
            BackendKind::Volatile => self.volatile.delete(key),
        }
    }
}

/// Filesystem-safe stem for a key. Clean short keys map to themselves so
/// files stay recognizable; anything sanitized gets a hash suffix so
/// distinct keys cannot collide.
pub(crate) fn file_stem(key: &str) -> String {
    let safe: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if safe == key && safe.len() <= 64 {
        return safe;
    }
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    let mut stem = safe;
    stem.truncate(48);
    format!("{}-{:016x}", stem, hasher.finish())
}
