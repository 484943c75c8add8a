use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::file_stem;

/// Disk-backed named caches, one directory per cache. Entries are keyed
/// by request URL and stored as a metadata document next to the raw body,
/// so bodies stay byte-exact for any content type.
///
/// Opening a set or a cache touches nothing on disk; directories appear
/// on first write.
#[derive(Debug, Clone)]
pub struct CacheSet {
    root: PathBuf,
}

/// A cached response: enough to replay it without the network.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl CacheEntry {
    pub fn json(body: Vec<u8>) -> Self {
        Self {
            status: 200,
            content_type: Some("application/json".to_string()),
            body,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct EntryMeta {
    key: String,
    status: u16,
    content_type: Option<String>,
}

impl CacheSet {
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn cache(&self, name: &str) -> NamedCache {
        NamedCache {
            name: name.to_string(),
            dir: self.root.join(name),
        }
    }

    /// Names of the caches that currently exist on disk.
    pub fn names(&self) -> io::Result<Vec<String>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Delete a whole cache. Missing caches are not an error.
    pub fn remove(&self, name: &str) -> io::Result<()> {
        let dir = self.root.join(name);
        if dir.exists() {
            fs::remove_dir_all(dir)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct NamedCache {
    name: String,
    dir: PathBuf,
}

impl NamedCache {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn put(&self, key: &str, entry: &CacheEntry) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let meta = EntryMeta {
            key: key.to_string(),
            status: entry.status,
            content_type: entry.content_type.clone(),
        };
        let json = serde_json::to_string(&meta)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(self.meta_path(key), json)?;
        fs::write(self.body_path(key), &entry.body)?;
        Ok(())
    }

    pub fn get(&self, key: &str) -> io::Result<Option<CacheEntry>> {
        let meta_path = self.meta_path(key);
        let json = match fs::read_to_string(&meta_path) {
            Ok(json) => json,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        let meta: EntryMeta = serde_json::from_str(&json)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let body = match fs::read(self.body_path(key)) {
            Ok(body) => body,
            // Meta without body means a torn write; treat the entry as gone.
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        Ok(Some(CacheEntry {
            status: meta.status,
            content_type: meta.content_type,
            body,
        }))
    }

    /// Remove one entry; returns whether it existed.
    pub fn delete(&self, key: &str) -> io::Result<bool> {
        let existed = match fs::remove_file(self.meta_path(key)) {
            Ok(()) => true,
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(e) => return Err(e),
        };
        // The body may already be gone after an interrupted delete.
        let _ = fs::remove_file(self.body_path(key));
        Ok(existed)
    }

    /// Original keys of every entry in this cache.
    pub fn keys(&self) -> io::Result<Vec<String>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let is_meta = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(".meta.json"));
            if !is_meta {
                continue;
            }
            let json = fs::read_to_string(&path)?;
            if let Ok(meta) = serde_json::from_str::<EntryMeta>(&json) {
                keys.push(meta.key);
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn meta_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.meta.json", file_stem(key)))
    }

    fn body_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.body", file_stem(key)))
    }
}
