use crate::error::AuthError;

use super::cacheset::{CacheEntry, CacheSet, NamedCache};
use super::record::StoredRecord;
use super::AUTH_CACHE_NAME;

/// Backend that rides the named-cache layer. Records are stored as JSON
/// response bodies under synthetic request paths, in the same cache set
/// the offline worker manages, so they survive as long as that cache
/// survives its version sweeps.
pub struct HttpCacheStore {
    cache: NamedCache,
}

impl HttpCacheStore {
    pub fn new(caches: &CacheSet) -> Self {
        Self {
            cache: caches.cache(AUTH_CACHE_NAME),
        }
    }

    pub fn put(&self, key: &str, record: &StoredRecord) -> Result<(), AuthError> {
        let body = serde_json::to_vec(record)?;
        self.cache.put(&request_key(key), &CacheEntry::json(body))?;
        Ok(())
    }

    pub fn get(&self, key: &str) -> Result<Option<StoredRecord>, AuthError> {
        match self.cache.get(&request_key(key))? {
            Some(entry) => Ok(Some(serde_json::from_slice(&entry.body)?)),
            None => Ok(None),
        }
    }

    pub fn delete(&self, key: &str) -> Result<(), AuthError> {
        self.cache.delete(&request_key(key))?;
        Ok(())
    }
}

fn request_key(key: &str) -> String {
    format!("/auth-record/{}", key)
}
