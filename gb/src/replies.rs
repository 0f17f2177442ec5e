//! Persisted reply texts
//!
//! When the gyro acknowledges a turn-on, the user gets one of these phrases at
//! random. The list lives in a small JSON file:
//!
//! ```json
//! { "replies": ["Let there be light.", "Lumos"] }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

/// Errors from reply store operations
#[derive(Debug, Error)]
pub enum ReplyStoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid reply file {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("No reply at index {index} (have {len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Reply text must not be empty")]
    EmptyReply,
}

/// On-disk format
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyFile {
    #[serde(default)]
    pub replies: Vec<String>,
}

/// Reply list bound to its backing file
#[derive(Debug, Clone)]
pub struct ReplyStore {
    path: PathBuf,
    file: ReplyFile,
}

impl ReplyStore {
    /// Open the store, creating an empty file (and its directory) if missing
    pub fn load_or_create(path: impl Into<PathBuf>) -> Result<Self, ReplyStoreError> {
        let path = path.into();
        debug!(?path, "ReplyStore::load_or_create: called");

        if path.exists() {
            info!("Reading reply file {}", path.display());
            let file = read_file(&path)?;
            return Ok(Self { path, file });
        }

        info!("Creating reply file {}", path.display());
        let store = Self {
            path,
            file: ReplyFile::default(),
        };
        store.save()?;
        Ok(store)
    }

    /// Re-read the file, picking up edits made by other processes
    pub fn reload(&mut self) -> Result<(), ReplyStoreError> {
        debug!(path = ?self.path, "ReplyStore::reload: called");
        self.file = read_file(&self.path)?;
        info!(count = self.file.replies.len(), "Reloaded reply file");
        Ok(())
    }

    /// Write the current list back to disk
    pub fn save(&self) -> Result<(), ReplyStoreError> {
        debug!(path = ?self.path, "ReplyStore::save: called");
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|source| ReplyStoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let json = serde_json::to_string_pretty(&self.file).map_err(|source| ReplyStoreError::Json {
            path: self.path.clone(),
            source,
        })?;
        fs::write(&self.path, json).map_err(|source| ReplyStoreError::Io {
            path: self.path.clone(),
            source,
        })
    }

    /// Uniformly random reply, or None when the list is empty
    pub fn pick(&self) -> Option<&str> {
        self.file.replies.choose(&mut rand::rng()).map(String::as_str)
    }

    pub fn list(&self) -> &[String] {
        &self.file.replies
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a reply and persist
    pub fn add(&mut self, text: &str) -> Result<(), ReplyStoreError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ReplyStoreError::EmptyReply);
        }
        debug!(%text, "ReplyStore::add: called");
        self.file.replies.push(text.to_string());
        self.save()
    }

    /// Remove the reply at `index` and persist; returns the removed text
    pub fn remove(&mut self, index: usize) -> Result<String, ReplyStoreError> {
        let len = self.file.replies.len();
        if index >= len {
            return Err(ReplyStoreError::IndexOutOfRange { index, len });
        }
        debug!(index, "ReplyStore::remove: called");
        let removed = self.file.replies.remove(index);
        self.save()?;
        Ok(removed)
    }
}

fn read_file(path: &Path) -> Result<ReplyFile, ReplyStoreError> {
    let content = fs::read_to_string(path).map_err(|source| ReplyStoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| ReplyStoreError::Json {
        path: path.to_path_buf(),
        source,
    })
}
