use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::AuthError;

use super::record::StoredRecord;

/// Process-lifetime backend. Nothing here survives a restart, matching
/// the most ephemeral browser storage layer.
pub struct VolatileStore {
    map: Mutex<HashMap<String, StoredRecord>>,
}

impl VolatileStore {
    pub fn new() -> Self {
        Self {
            map: Mutex::new(HashMap::new()),
        }
    }

    pub fn put(&self, key: &str, record: &StoredRecord) -> Result<(), AuthError> {
        self.lock()?.insert(key.to_string(), record.clone());
        Ok(())
    }

    pub fn get(&self, key: &str) -> Result<Option<StoredRecord>, AuthError> {
        Ok(self.lock()?.get(key).cloned())
    }

    pub fn delete(&self, key: &str) -> Result<(), AuthError> {
        self.lock()?.remove(key);
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, StoredRecord>>, AuthError> {
        self.map
            .lock()
            .map_err(|_| AuthError::Storage("volatile store lock poisoned".to_string()))
    }
}

impl Default for VolatileStore {
    fn default() -> Self {
        Self::new()
    }
}
