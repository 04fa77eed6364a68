//! Case-insensitive path handling for Windows paths on Linux
//!
//! Bethesda mod manifests use Windows-style paths with backslashes.
//! This module handles:
//! - Converting `\` to `/` for Linux filesystem operations
//! - Case-insensitive file lookups (Windows is case-insensitive, Linux is not)
//! - Preserving intended case for output paths

use std::path::{Path, PathBuf};

/// Convert Windows path separators to Linux
/// `Data\Textures\armor.dds` -> `Data/Textures/armor.dds`
pub fn to_linux_path(path: &str) -> String {
    path.replace('\\', "/")
}

/// Convert a Windows-style path to a native PathBuf
/// Handles both forward and backslashes
pub fn to_native_pathbuf(path: &str) -> PathBuf {
    PathBuf::from(to_linux_path(path))
}

/// Normalize a path for lookups and comparisons (lowercase, forward slashes, trimmed)
pub fn normalize_for_lookup(path: &str) -> String {
    path.to_lowercase()
        .replace('\\', "/")
        .trim_matches('/')
        .to_string()
}

/// Check if two paths are equal (case-insensitive)
pub fn paths_equal(a: &str, b: &str) -> bool {
    normalize_for_lookup(a) == normalize_for_lookup(b)
}

/// Find a file case-insensitively within a directory
///
/// Given a base directory and a relative path like `Data\Textures\armor.dds`,
/// finds the actual file even if the real path is `data\TEXTURES\Armor.DDS`
pub fn resolve_case_insensitive(base: &Path, relative: &str) -> Option<PathBuf> {
    // Split the relative path into components
    let components: Vec<&str> = relative
        .split(['\\', '/'])
        .filter(|s| !s.is_empty())
        .collect();

    if components.is_empty() {
        return Some(base.to_path_buf());
    }

    let mut current = base.to_path_buf();

    for component in components {
        let target_lower = component.to_lowercase();

        // Read directory and find matching entry
        let found = std::fs::read_dir(&current).ok()?.find_map(|entry| {
            let entry = entry.ok()?;
            let name = entry.file_name();
            let name_str = name.to_string_lossy();

            if name_str.to_lowercase() == target_lower {
                Some(entry.path())
            } else {
                None
            }
        });

        match found {
            Some(path) => current = path,
            None => return None, // Component not found
        }
    }

    Some(current)
}

/// Get the parent directory of a path (handles both / and \)
pub fn parent_path(path: &str) -> Option<&str> {
    path.rfind(['\\', '/']).map(|idx| &path[..idx])
}

/// Get the filename from a path (handles both / and \)
pub fn file_name(path: &str) -> &str {
    path.rfind(['\\', '/'])
        .map(|idx| &path[idx + 1..])
        .unwrap_or(path)
}

/// Get file extension (lowercase)
pub fn extension(path: &str) -> Option<&str> {
    let name = file_name(path);
    name.rfind('.').map(|idx| &name[idx + 1..])
}

/// Find a file in a list of archive entries case-insensitively
/// Returns the actual path as it exists in the archive
pub fn find_in_archive_entries<'a>(entries: &'a [String], target: &str) -> Option<&'a str> {
    let target_normalized = normalize_for_lookup(target);
    entries.iter()
        .find(|e| normalize_for_lookup(e) == target_normalized)
        .map(|s| s.as_str())
}

/// Create parent directories for a path if they don't exist
pub fn ensure_parent_dirs(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Join a base path with a Windows-style relative path
/// Converts separators and creates a proper PathBuf
pub fn join_windows_path(base: &Path, relative: &str) -> PathBuf {
    base.join(to_linux_path(relative))
}

/// Strip a leading `./` or `.\` and any leading separators, collapsing to `/`.
///
/// Used by the write-dispatch (§4.10) and write-archive collector (§4.7) to
/// normalize an effective target path before it is joined to a directory or
/// used as a staging key.
pub fn strip_dot_and_leading_seps(path: &str) -> String {
    let mut s = to_linux_path(path);
    if let Some(rest) = s.strip_prefix("./") {
        s = rest.to_string();
    }
    s.trim_start_matches('/').to_string()
}
