//! Persisted state records and the backends that hold them.
//!
//! One record per caller-chosen [`StateKey`]. A record exists only while the
//! local side manages a remote object: it is written on create or adoption
//! and removed on a clean delete or when drift shows the object is gone.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::debug;
use warden_id::StateKey;

use crate::attributes::Attributes;
use crate::resource::{ResourceHandle, ResourceType};

/// Errors from state store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt state record '{key}': {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize state record: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl StoreError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Last known applied and observed state of one managed resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateRecord {
    pub resource_type: ResourceType,
    pub handle: ResourceHandle,
    pub attributes: Attributes,
    /// Schema version the attributes were written under.
    #[serde(default)]
    pub schema_version: u32,
    pub updated_at: DateTime<Utc>,
}

impl StateRecord {
    pub fn new(
        resource_type: ResourceType,
        handle: ResourceHandle,
        attributes: Attributes,
        schema_version: u32,
    ) -> Self {
        Self {
            resource_type,
            handle,
            attributes,
            schema_version,
            updated_at: Utc::now(),
        }
    }
}

/// Durable key-value store for state records.
///
/// Implementations must provide read-your-writes consistency.
#[async_trait]
pub trait StateStore: Send + Sync + 'static {
    async fn get(&self, key: &StateKey) -> Result<Option<StateRecord>, StoreError>;

    async fn put(&self, key: &StateKey, record: &StateRecord) -> Result<(), StoreError>;

    /// Remove a record. Removing a missing record is not an error.
    async fn delete(&self, key: &StateKey) -> Result<(), StoreError>;

    async fn keys(&self) -> Result<Vec<StateKey>, StoreError>;
}

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<StateKey, StateRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn get(&self, key: &StateKey) -> Result<Option<StateRecord>, StoreError> {
        Ok(self.records.read().await.get(key).cloned())
    }

    async fn put(&self, key: &StateKey, record: &StateRecord) -> Result<(), StoreError> {
        self.records
            .write()
            .await
            .insert(key.clone(), record.clone());
        Ok(())
    }

    async fn delete(&self, key: &StateKey) -> Result<(), StoreError> {
        self.records.write().await.remove(key);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<StateKey>, StoreError> {
        Ok(self.records.read().await.keys().cloned().collect())
    }
}

/// File-backed store: one pretty-printed JSON file per key in a directory.
///
/// Writes go to a temp file first and are renamed into place.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

const RECORD_EXTENSION: &str = "json";

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &StateKey) -> PathBuf {
        self.dir.join(format!("{key}.{RECORD_EXTENSION}"))
    }
}

#[async_trait]
impl StateStore for FileStore {
    async fn get(&self, key: &StateKey) -> Result<Option<StateRecord>, StoreError> {
        let path = self.path_for(key);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io(&path, e)),
        };

        let record = serde_json::from_str(&content).map_err(|source| StoreError::Corrupt {
            key: key.to_string(),
            source,
        })?;

        Ok(Some(record))
    }

    async fn put(&self, key: &StateKey, record: &StateRecord) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| StoreError::io(&self.dir, e))?;

        let path = self.path_for(key);
        let tmp_path = path.with_extension("tmp");
        let content = serde_json::to_string_pretty(record)?;

        fs::write(&tmp_path, content)
            .await
            .map_err(|e| StoreError::io(&tmp_path, e))?;

        fs::rename(&tmp_path, &path)
            .await
            .map_err(|e| StoreError::io(&path, e))?;

        debug!(path = %path.display(), handle = %record.handle.id, "Saved state record");
        Ok(())
    }

    async fn delete(&self, key: &StateKey) -> Result<(), StoreError> {
        let path = self.path_for(key);
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(path = %path.display(), "Removed state record");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io(&path, e)),
        }
    }

    async fn keys(&self) -> Result<Vec<StateKey>, StoreError> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&self.dir, e)),
        };

        let mut keys = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::io(&self.dir, e))?
        {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            if let Some(key) = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| StateKey::parse(stem).ok())
            {
                keys.push(key);
            }
        }

        keys.sort();
        Ok(keys)
    }
}
