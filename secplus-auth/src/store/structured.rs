use std::fs;
use std::path::{Path, PathBuf};

use crate::error::AuthError;

use super::file_stem;
use super::record::StoredRecord;

/// Record-per-file backend, the durable layer. Each key becomes one JSON
/// document under `records/`.
pub struct StructuredStore {
    dir: PathBuf,
}

impl StructuredStore {
    pub fn new(root: &Path) -> Self {
        Self {
            dir: root.join("records"),
        }
    }

    pub fn put(&self, key: &str, record: &StoredRecord) -> Result<(), AuthError> {
        fs::create_dir_all(&self.dir)?;
        let json = serde_json::to_string_pretty(record)?;
        fs::write(self.path(key), json)?;
        Ok(())
    }

    pub fn get(&self, key: &str) -> Result<Option<StoredRecord>, AuthError> {
        let path = self.path(key);
        if !path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&json)?))
    }

    pub fn delete(&self, key: &str) -> Result<(), AuthError> {
        let path = self.path(key);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(key)))
    }
}
