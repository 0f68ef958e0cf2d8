//! Record persistence.
//!
//! Accepted submissions are kept as raw bytes, one record per natural id.
//! Callers only see the [`RecordStore`] trait; [`FsRecordStore`] keeps one
//! `<id>.xml` file per record in a single directory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::fsutil;
use crate::models::StoredRecord;
use crate::schema::is_valid_id;

// ---

/// File extension of stored records.
pub const RECORD_EXTENSION: &str = "xml";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record '{0}' already exists")]
    Conflict(String),

    #[error("'{0}' is not a valid record id")]
    InvalidId(String),

    #[error("record store unreadable at '{path}': {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write record '{id}': {source}")]
    Write {
        id: String,
        #[source]
        source: io::Error,
    },
}

/// Lazy sequence of stored records.
pub type RecordIter<'a> = Box<dyn Iterator<Item = StoredRecord> + 'a>;

/// Persistence for accepted submissions.
///
/// Records are immutable: `put` never overwrites, and the only removal is
/// [`RecordStore::delete_all`].
pub trait RecordStore: Send + Sync {
    fn exists(&self, id: &str) -> Result<bool, StoreError>;

    /// Store `raw` under `id` unless the id is already taken.
    fn put(&self, id: &str, raw: &[u8]) -> Result<(), StoreError>;

    /// Every stored record, in no particular order.
    ///
    /// Entries that cannot be read are logged and skipped.
    fn list_all(&self) -> Result<RecordIter<'_>, StoreError>;

    /// Remove every record and report how many were removed.
    fn delete_all(&self) -> Result<usize, StoreError>;
}

#[derive(Debug, Clone)]
pub struct FsRecordStore {
    dir: PathBuf,
}

impl FsRecordStore {
    /// Open the store, creating its directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> io::Result<Self> {
        // ---
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        info!(path = %dir.display(), "record store opened");
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, id: &str) -> Result<PathBuf, StoreError> {
        // ---
        if !is_valid_id(id) {
            return Err(StoreError::InvalidId(id.to_string()));
        }
        Ok(self.dir.join(format!("{id}.{RECORD_EXTENSION}")))
    }

    /// Record files, skipping temp files and anything without our extension.
    fn record_entries(&self) -> Result<impl Iterator<Item = (String, PathBuf)> + '_, StoreError> {
        // ---
        let entries = fs::read_dir(&self.dir).map_err(|source| StoreError::Unreadable {
            path: self.dir.clone(),
            source,
        })?;

        Ok(entries.filter_map(move |entry| {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(path = %self.dir.display(), error = %e, "skipping unreadable directory entry");
                    return None;
                }
            };
            let path = entry.path();
            if path.extension().map_or(true, |ext| ext != RECORD_EXTENSION) {
                return None;
            }
            let id = path.file_stem()?.to_str()?.to_string();
            if id.starts_with('.') {
                return None;
            }
            Some((id, path))
        }))
    }
}

impl RecordStore for FsRecordStore {
    fn exists(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.record_path(id)?.exists())
    }

    fn put(&self, id: &str, raw: &[u8]) -> Result<(), StoreError> {
        // ---
        let path = self.record_path(id)?;
        let created = fsutil::create_new_atomic(&path, raw).map_err(|source| StoreError::Write {
            id: id.to_string(),
            source,
        })?;
        if !created {
            return Err(StoreError::Conflict(id.to_string()));
        }
        debug!(record_id = %id, bytes = raw.len(), "record written");
        Ok(())
    }

    fn list_all(&self) -> Result<RecordIter<'_>, StoreError> {
        // ---
        let iter = self
            .record_entries()?
            .filter_map(|(id, path)| match fs::read(&path) {
                Ok(raw) => Some(StoredRecord { id, raw }),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable record");
                    None
                }
            });
        Ok(Box::new(iter))
    }

    fn delete_all(&self) -> Result<usize, StoreError> {
        // ---
        let mut deleted = 0;
        for (id, path) in self.record_entries()? {
            match fs::remove_file(&path) {
                Ok(()) => deleted += 1,
                Err(e) => warn!(record_id = %id, error = %e, "failed to delete record"),
            }
        }
        info!(deleted, "records deleted");
        Ok(deleted)
    }
}
