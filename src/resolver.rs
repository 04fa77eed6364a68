//! Location resolver (C5).
//!
//! Expands `%VAR%` markers in a location's textual `value` against the
//! configured game/output roots, then normalizes separators for the host.
//! Unknown variables are left literal (§4.2); an unexpanded `%…%` reaching
//! a filesystem operation downstream is a fatal error for that asset, not
//! here.

use crate::config::InstallConfig;
use crate::games::GameRoot;
use crate::manifest::{Location, LocationType};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("location is a read-archive, which has no directory path")]
    NotADirectoryOrWriteArchive,

    #[error("location is not a read-archive")]
    NotAReadArchive,
}

/// Expands the configured game/output root variables against a config.
pub struct LocationResolver<'a> {
    config: &'a InstallConfig,
}

impl<'a> LocationResolver<'a> {
    pub fn new(config: &'a InstallConfig) -> Self {
        Self { config }
    }

    /// Full expansion of a location's `value`, with `\` converted to `/`
    /// after substitution on hosts using `/` as separator.
    pub fn resolve_path(&self, loc: &Location) -> String {
        let expanded = self.expand_variables(&loc.value);
        if cfg!(windows) {
            expanded
        } else {
            expanded.replace('\\', "/")
        }
    }

    /// Shared with the post-command interpreter (C13), which expands the
    /// same variable set against a bare command string rather than a
    /// location's `value`.
    pub(crate) fn expand_variables(&self, value: &str) -> String {
        let mut out = value.to_string();
        out = out.replace("%DESTINATION%", &self.config.destination.to_string_lossy());

        for game in [GameRoot::Fallout3, GameRoot::FalloutNV, GameRoot::Oblivion] {
            let prefix = game.variable_prefix();
            if let Some(root) = self.config.game_roots.get(&game) {
                out = out.replace(&format!("%{}ROOT%", prefix), &root.to_string_lossy());
                out = out.replace(
                    &format!("%{}DATA%", prefix),
                    &game.data_dir(root).to_string_lossy(),
                );
            }
            // Unset variables are left literal, per §4.2.
        }

        out
    }

    /// For a directory location, its expansion; for a write-archive
    /// location, the parent directory of its expanded archive path; fails
    /// for read-archive locations.
    pub fn get_directory_path(&self, loc: &Location) -> Result<PathBuf, ResolveError> {
        match loc.location_type() {
            Some(LocationType::Directory) => Ok(PathBuf::from(self.resolve_path(loc))),
            Some(LocationType::WriteArchive) => {
                let full = self.resolve_path(loc);
                Ok(Path::new(&full)
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| PathBuf::from(&full)))
            }
            _ => Err(ResolveError::NotADirectoryOrWriteArchive),
        }
    }

    /// For a read-archive location, its expansion; fails otherwise.
    pub fn get_bsa_path(&self, loc: &Location) -> Result<PathBuf, ResolveError> {
        match loc.location_type() {
            Some(LocationType::ReadArchive) => Ok(PathBuf::from(self.resolve_path(loc))),
            _ => Err(ResolveError::NotAReadArchive),
        }
    }

    pub fn is_bsa_location(loc: &Location) -> bool {
        loc.location_type() == Some(LocationType::ReadArchive)
    }

    pub fn is_bsa_creation_location(loc: &Location) -> bool {
        loc.location_type() == Some(LocationType::WriteArchive)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_with_roots() -> InstallConfig {
        let mut roots = HashMap::new();
        roots.insert(GameRoot::Fallout3, PathBuf::from("/games/fo3"));
        InstallConfig {
            game_roots: roots,
            destination: PathBuf::from("/out"),
            ..Default::default()
        }
    }

    fn loc(value: &str, loc_type: i64) -> Location {
        Location {
            name: "loc".to_string(),
            loc_type,
            value: value.to_string(),
            archive_type: None,
            archive_flags: None,
            files_flags: None,
            archive_compressed: None,
        }
    }

    #[test]
    fn test_expand_destination_and_game_root() {
        let config = config_with_roots();
        let resolver = LocationResolver::new(&config);
        let l = loc("%FO3ROOT%\\Data", 0);
        assert_eq!(resolver.resolve_path(&l), "/games/fo3/Data");

        let l2 = loc("%DESTINATION%\\out.bsa", 2);
        assert_eq!(resolver.resolve_path(&l2), "/out/out.bsa");
    }

    #[test]
    fn test_unset_variable_left_literal() {
        let config = config_with_roots();
        let resolver = LocationResolver::new(&config);
        let l = loc("%FNVROOT%\\Data", 0);
        assert_eq!(resolver.resolve_path(&l), "%FNVROOT%/Data");
    }

    #[test]
    fn test_get_directory_path_for_write_archive() {
        let config = config_with_roots();
        let resolver = LocationResolver::new(&config);
        let l = loc("%DESTINATION%\\Meshes.bsa", 2);
        let dir = resolver.get_directory_path(&l).unwrap();
        assert_eq!(dir, PathBuf::from("/out"));
    }

    #[test]
    fn test_get_directory_path_fails_for_read_archive() {
        let config = config_with_roots();
        let resolver = LocationResolver::new(&config);
        let l = loc("%FO3ROOT%\\foo.bsa", 1);
        assert!(resolver.get_directory_path(&l).is_err());
    }

    #[test]
    fn test_is_bsa_location_predicates() {
        assert!(LocationResolver::is_bsa_location(&loc("x", 1)));
        assert!(!LocationResolver::is_bsa_location(&loc("x", 0)));
        assert!(LocationResolver::is_bsa_creation_location(&loc("x", 2)));
    }
}
