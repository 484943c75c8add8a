use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::AuthError;

use super::record::StoredRecord;

/// Single-file map backend, the cheapest layer to read. The whole map is
/// rewritten on every change, which is fine at a handful of keys.
pub struct SimpleStore {
    path: PathBuf,
}

impl SimpleStore {
    pub fn new(root: &Path) -> Self {
        Self {
            path: root.join("kv.json"),
        }
    }

    pub fn put(&self, key: &str, record: &StoredRecord) -> Result<(), AuthError> {
        let mut map = self.load_for_write();
        map.insert(key.to_string(), record.clone());
        self.save(&map)
    }

    pub fn get(&self, key: &str) -> Result<Option<StoredRecord>, AuthError> {
        Ok(self.load()?.remove(key))
    }

    pub fn delete(&self, key: &str) -> Result<(), AuthError> {
        let mut map = match self.load() {
            Ok(map) => map,
            Err(e) => {
                // The key is unreadable along with everything else; clear
                // the file so the layer can be healed by later writes.
                warn!(path = %self.path.display(), error = %e, "map file unreadable, clearing");
                return self.save(&BTreeMap::new());
            }
        };
        if map.remove(key).is_some() {
            self.save(&map)?;
        }
        Ok(())
    }

    /// Write-path load. An unparseable map file (torn write, partial
    /// eviction) must not wedge the layer: writes start from an empty map
    /// and the full rewrite in `save` replaces the broken file.
    fn load_for_write(&self) -> BTreeMap<String, StoredRecord> {
        self.load().unwrap_or_else(|e| {
            warn!(path = %self.path.display(), error = %e, "map file unreadable, rewriting");
            BTreeMap::new()
        })
    }

    fn load(&self) -> Result<BTreeMap<String, StoredRecord>, AuthError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let json = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&json)?)
    }

    fn save(&self, map: &BTreeMap<String, StoredRecord>) -> Result<(), AuthError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(map)?;
        fs::write(&self.path, json)?;
        Ok(())
    }
}
