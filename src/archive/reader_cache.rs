//! Archive read cache (C8).
//!
//! One BSA can be referenced by many assets; this cache guarantees each
//! distinct archive path is opened exactly once and the resulting handle
//! is shared across every worker that needs it (§4.6, §5). Handles are
//! disposed exactly once, on drop of the cache itself.
//!
//! Grounded on the teacher's `bsa/reader.rs::BsaReader` access-tracking
//! idea, redesigned around a shared mutex-protected map of `Arc<Ba2Archive>`
//! rather than re-opening the archive on every extraction.

use super::Ba2Archive;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;

#[derive(Default)]
pub struct ArchiveReadCache {
    handles: Mutex<HashMap<PathBuf, Arc<Ba2Archive>>>,
}

impl ArchiveReadCache {
    pub fn new() -> Self {
        Self {
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the shared handle for `path`, opening it on first request.
    /// Concurrent callers racing to open the same path block on the
    /// cache's lock, not on the filesystem.
    pub fn get_handle(&self, path: &Path) -> Result<Arc<Ba2Archive>> {
        let canonical = path
            .canonicalize()
            .with_context(|| format!("archive path does not exist: {}", path.display()))?;

        let mut handles = self.handles.lock().expect("archive read cache lock poisoned");
        if let Some(existing) = handles.get(&canonical) {
            return Ok(Arc::clone(existing));
        }

        debug!("opening archive: {}", canonical.display());
        let archive = Arc::new(Ba2Archive::open(&canonical)?);
        handles.insert(canonical, Arc::clone(&archive));
        Ok(archive)
    }

    /// Number of distinct archives opened so far.
    pub fn len(&self) -> usize {
        self.handles.lock().expect("archive read cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
