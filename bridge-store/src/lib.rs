//! JSON document persistence for bridge state stores
//!
//! Each store is a single pretty-printed JSON document on disk: loaded
//! eagerly when the bridge starts, rewritten wholesale on every mutation.
//! There is no incremental or append format - the documents are small
//! (home-scale device counts) and a full rewrite keeps recovery trivial.
//!
//! # Quick Start
//!
//! ```rust
//! use std::collections::BTreeMap;
//! use bridge_store::DocumentStore;
//!
//! let dir = tempfile::tempdir().unwrap();
//! let store: DocumentStore<BTreeMap<String, u64>> =
//!     DocumentStore::open(dir.path().join("history.json"));
//!
//! let mut doc = store.load_or_default();
//! doc.insert("node1-ep1".to_string(), 1_700_000_000);
//! store.save(&doc).unwrap();
//!
//! assert_eq!(store.load_or_default(), doc);
//! ```

use std::fs;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur reading or writing a document store
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem read/write failed
    #[error("store I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Document on disk is not valid JSON for the expected shape
    #[error("store decode error at {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Document could not be serialized
    #[error("store encode error at {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// A single JSON document persisted at a fixed path.
///
/// `T` is the in-memory shape of the document. The store itself holds no
/// state beyond the path; callers own the document and write it back
/// through [`save`](Self::save) after each mutation.
pub struct DocumentStore<T> {
    path: PathBuf,
    _doc: PhantomData<fn() -> T>,
}

impl<T> DocumentStore<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    /// Create a store backed by the given path. No I/O is performed until
    /// the first load or save.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _doc: PhantomData,
        }
    }

    /// Path of the backing document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the document from disk.
    ///
    /// A missing file is not an error - it yields `T::default()`, so a
    /// fresh bridge starts from empty stores.
    pub fn load(&self) -> Result<T> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(T::default()),
            Err(e) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source: e,
                })
            }
        };

        serde_json::from_str(&raw).map_err(|e| StoreError::Decode {
            path: self.path.clone(),
            source: e,
        })
    }

    /// Load the document, falling back to `T::default()` on any failure.
    ///
    /// A corrupt document is logged and discarded rather than taking the
    /// bridge down: every store here is either re-derivable from the mesh
    /// or user-editable state the operator can re-register.
    pub fn load_or_default(&self) -> T {
        match self.load() {
            Ok(doc) => doc,
            Err(e) => {
                tracing::warn!("failed to load {}: {e}", self.path.display());
                T::default()
            }
        }
    }

    /// Write the document to disk, pretty-printed, replacing any previous
    /// content. Creates parent directories on first write.
    pub fn save(&self, doc: &T) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| StoreError::Io {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
            }
        }

        let raw = serde_json::to_string_pretty(doc).map_err(|e| StoreError::Encode {
            path: self.path.clone(),
            source: e,
        })?;

        fs::write(&self.path, raw).map_err(|e| StoreError::Io {
            path: self.path.clone(),
            source: e,
        })
    }
}
