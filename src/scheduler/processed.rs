//! Durable set of identifiers that have already been classified.

use crate::error::AppResult;
use crate::fsutil::{self, PUBLIC_FILE_MODE};
use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Identifiers seen by the monitor, written through to a JSON list on every insert.
#[derive(Debug)]
pub struct ProcessedIdSet {
    path: PathBuf,
    ids: BTreeSet<String>,
}

impl ProcessedIdSet {
    /// Load the set from `path`.
    ///
    /// A missing file is an empty set. An unreadable or malformed file is
    /// logged and also treated as empty.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let ids = match std::fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<Vec<String>>(&bytes) {
                Ok(list) => list.into_iter().collect(),
                Err(e) => {
                    warn!(path = %path.display(), "Ignoring malformed processed list: {}", e);
                    BTreeSet::new()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeSet::new(),
            Err(e) => {
                warn!(path = %path.display(), "Cannot read processed list: {}", e);
                BTreeSet::new()
            }
        };

        debug!(count = ids.len(), "Loaded processed identifiers");
        Self { path, ids }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Add `id` and persist. Returns `false` if it was already present.
    ///
    /// If the write fails the in-memory set is left unchanged.
    pub fn insert(&mut self, id: &str) -> AppResult<bool> {
        if !self.ids.insert(id.to_string()) {
            return Ok(false);
        }

        if let Err(e) = self.persist() {
            self.ids.remove(id);
            return Err(e);
        }
        Ok(true)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }

    fn persist(&self) -> AppResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_vec_pretty(&self.ids)?;
        fsutil::write_atomic(&self.path, &contents, PUBLIC_FILE_MODE)?;
        Ok(())
    }
}
