//! Scratch directory registry (C15).
//!
//! Every scratch directory this engine creates (package extraction,
//! nested patch staging) is registered here so it can be torn down on
//! every terminal driver state, and so a crashed prior run's leftovers
//! are swept on the next INIT (§5, §9). Directories are named
//! `ttw_mpi_<uuid>` under the system temp root; `sweep_stale` only ever
//! deletes entries matching that prefix.
//!
//! Grounded on the teacher's `installer/streaming.rs::cleanup_temp_dirs`
//! (prefix-guarded sweep of leftover temp dirs from interrupted runs).

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

pub const SCRATCH_PREFIX: &str = "ttw_mpi_";

/// Process-wide registry of scratch directories created this run.
pub struct ScratchRegistry {
    root: PathBuf,
    created: Mutex<Vec<PathBuf>>,
}

impl ScratchRegistry {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            created: Mutex::new(Vec::new()),
        }
    }

    /// Registry rooted at the host's temp directory, the common case.
    pub fn in_temp_dir() -> Self {
        Self::new(std::env::temp_dir())
    }

    /// Creates a fresh, uniquely named scratch directory and registers
    /// it for teardown.
    pub fn create_dir(&self) -> anyhow::Result<PathBuf> {
        let name = format!("{}{}", SCRATCH_PREFIX, Uuid::new_v4());
        let path = self.root.join(name);
        fs::create_dir_all(&path)?;
        self.created.lock().expect("scratch registry lock poisoned").push(path.clone());
        debug!("created scratch dir: {}", path.display());
        Ok(path)
    }

    /// Removes every directory this registry created during the current
    /// run, regardless of state.
    pub fn cleanup_all(&self) {
        let mut created = self.created.lock().expect("scratch registry lock poisoned");
        for path in created.drain(..) {
            if let Err(e) = fs::remove_dir_all(&path) {
                warn!("failed to remove scratch dir {}: {}", path.display(), e);
            }
        }
    }

    /// Sweeps leftover scratch directories from a previous interrupted
    /// run, called once at driver INIT. Only removes entries whose name
    /// starts with [`SCRATCH_PREFIX`] — never a bare `rm -rf` of the
    /// whole temp root.
    pub fn sweep_stale(&self) -> usize {
        sweep_stale_under(&self.root)
    }
}

fn sweep_stale_under(root: &Path) -> usize {
    let mut cleaned = 0;
    let Ok(entries) = fs::read_dir(root) else {
        return 0;
    };

    for entry in entries.filter_map(Result::ok) {
        let name = entry.file_name();
        let name_str = name.to_string_lossy();
        if name_str.starts_with(SCRATCH_PREFIX) && entry.path().is_dir() {
            if fs::remove_dir_all(entry.path()).is_ok() {
                cleaned += 1;
            }
        }
    }

    if cleaned > 0 {
        debug!("swept {} stale scratch directories", cleaned);
    }
    cleaned
}

impl Drop for ScratchRegistry {
    fn drop(&mut self) {
        self.cleanup_all();
    }
}
