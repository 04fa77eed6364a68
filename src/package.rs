//! Package extractor (C3).
//!
//! A packaged `.mpi` archive is itself BSA-format (§6, version tag 104):
//! it is opened through the same archive codec (C2) that reads game
//! BSAs, not through a separate container-format extractor. Every entry
//! is extracted into a fresh scratch directory (C15); a bare directory
//! path is returned unchanged.

use crate::archive::Ba2Archive;
use crate::scratch::ScratchRegistry;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub const PACKAGE_SUFFIX: &str = ".mpi";

/// Resolves `input` to a usable package root: extracts a `.mpi` archive
/// into a scratch directory, or passes an existing directory through.
pub fn open_package(input: &Path, scratch: &ScratchRegistry) -> Result<PathBuf> {
    if input.is_dir() {
        return Ok(input.to_path_buf());
    }

    if !input.is_file() || !has_package_suffix(input) {
        anyhow::bail!("{} is neither a directory nor a {} package", input.display(), PACKAGE_SUFFIX);
    }

    let archive = Ba2Archive::open(input)
        .with_context(|| format!("failed to open package archive: {}", input.display()))?;

    let dest = scratch.create_dir()?;
    info!("extracting package {} to {}", input.display(), dest.display());

    for entry_path in archive.entry_paths() {
        let bytes = archive.extract_file(&entry_path)?;
        let relative = entry_path.replace('\\', "/");
        let target = dest.join(&relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory: {}", parent.display()))?;
        }
        fs::write(&target, bytes).with_context(|| format!("failed to write: {}", target.display()))?;
    }

    Ok(dest)
}

fn has_package_suffix(path: &Path) -> bool {
    path.to_string_lossy().to_lowercase().ends_with(PACKAGE_SUFFIX)
}
