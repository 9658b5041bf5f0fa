//! Provider persisted to a JSON state file.
//!
//! The whole store is rewritten after every successful mutation, so the file
//! always reflects what a real provider would report on the next run.

use super::memory::{MemoryProvider, Records};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use declarative::{Identity, ListHint, Properties, Provider, ProviderError, RawRecord};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// On-disk layout of the state file
#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    /// Last time the file was written
    updated_at: DateTime<Utc>,

    /// Records per kind
    #[serde(default)]
    resources: Records,
}

/// Provider that keeps its records in a state file
pub struct FileProvider {
    path: PathBuf,
    inner: MemoryProvider,
    write: Mutex<()>,
}

impl FileProvider {
    /// Load the state file at `path`. A missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let records = if path.exists() {
            let content = fs::read_to_string(&path).map_err(|source| Error::Io {
                path: path.clone(),
                source,
            })?;
            let snapshot: Snapshot =
                serde_json::from_str(&content).map_err(|source| Error::Snapshot {
                    path: path.clone(),
                    source,
                })?;
            log::debug!(
                "Loaded state from {} (written {})",
                path.display(),
                snapshot.updated_at.to_rfc3339()
            );
            snapshot.resources
        } else {
            log::debug!("State file {} does not exist, starting empty", path.display());
            Records::new()
        };

        Ok(Self {
            path,
            inner: MemoryProvider::with_records(records),
            write: Mutex::new(()),
        })
    }

    /// Path of the state file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the current records to disk.
    pub fn save(&self) -> Result<()> {
        let _guard = self.write.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|source| Error::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }

        let snapshot = Snapshot {
            updated_at: Utc::now(),
            resources: self.inner.snapshot(),
        };
        let content = serde_json::to_string_pretty(&snapshot).map_err(|source| Error::Snapshot {
            path: self.path.clone(),
            source,
        })?;

        // Write beside the target and rename so a crash never leaves half a file
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content)
            .and_then(|()| fs::rename(&tmp, &self.path))
            .map_err(|source| Error::Io {
                path: self.path.clone(),
                source,
            })?;

        log::debug!("Saved state to {}", self.path.display());
        Ok(())
    }

    fn persist<T>(
        &self,
        result: std::result::Result<T, ProviderError>,
    ) -> std::result::Result<T, ProviderError> {
        let value = result?;
        self.save()
            .map_err(|e| ProviderError::transport(e.to_string()))?;
        Ok(value)
    }
}

impl Provider for FileProvider {
    fn list(
        &self,
        kind: &str,
        hint: &ListHint,
    ) -> std::result::Result<Vec<RawRecord>, ProviderError> {
        self.inner.list(kind, hint)
    }

    fn create(
        &self,
        kind: &str,
        identity: &Identity,
        properties: &Properties,
    ) -> std::result::Result<RawRecord, ProviderError> {
        self.persist(self.inner.create(kind, identity, properties))
    }

    fn update(
        &self,
        kind: &str,
        identity: &Identity,
        property: &str,
        value: &Value,
    ) -> std::result::Result<(), ProviderError> {
        self.persist(self.inner.update(kind, identity, property, value))
    }

    fn destroy(&self, kind: &str, identity: &Identity) -> std::result::Result<(), ProviderError> {
        self.persist(self.inner.destroy(kind, identity))
    }
}
