//! Installation configuration.
//!
//! Defines the configuration structure the embedder builds before handing
//! it to the driver. There is no persisted settings file and no interactive
//! dependency-check dialog: both are out-of-scope external collaborators.

use crate::games::{validate_game_root, GameRoot};
use std::collections::HashMap;
use std::path::PathBuf;

/// Configuration for a single installation run.
#[derive(Debug, Clone, Default)]
pub struct InstallConfig {
    /// Configured reference game roots. Any subset may be absent.
    pub game_roots: HashMap<GameRoot, PathBuf>,

    /// Installation target directory.
    pub destination: PathBuf,

    /// Either a packaged `.mpi` archive, or a directory already extracted
    /// from one.
    pub package_path: PathBuf,

    /// Bounded parallelism for copy/new/patch buckets (§4.9 default: 4).
    pub parallelism: usize,

    /// If a validation check fails, continue anyway. Advisory; the
    /// interactive prompt that sets this is an external collaborator.
    pub continue_on_validation_failure: bool,
}

impl InstallConfig {
    /// Derived per-game data directory: `<root>/Data` unless explicitly
    /// overridden in `data_dir_overrides`.
    pub fn data_dir(&self, game: GameRoot) -> Option<PathBuf> {
        self.game_roots.get(&game).map(|root| game.data_dir(root))
    }

    /// Validate the configuration per §3's invariant: a supplied game root
    /// must contain the game's signature executable; destination and
    /// package path are always required.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.destination.as_os_str().is_empty() {
            return Err(ConfigError::MissingDestination);
        }
        if self.package_path.as_os_str().is_empty() || !self.package_path.exists() {
            return Err(ConfigError::PackageNotFound(self.package_path.clone()));
        }

        for (game, root) in &self.game_roots {
            validate_game_root(*game, root)
                .map_err(|e| ConfigError::GameRootInvalid(*game, e.to_string()))?;
        }

        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("installation destination is required")]
    MissingDestination,

    #[error("package not found: {0}")]
    PackageNotFound(PathBuf),

    #[error("{0} root is invalid: {1}")]
    GameRootInvalid(GameRoot, String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_missing_destination() {
        let config = InstallConfig {
            package_path: PathBuf::from("/tmp"),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingDestination)
        ));
    }

    #[test]
    fn test_validate_missing_package() {
        let config = InstallConfig {
            destination: PathBuf::from("/tmp/out"),
            package_path: PathBuf::from("/does/not/exist.mpi"),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::PackageNotFound(_))
        ));
    }

    #[test]
    fn test_data_dir_absent_when_root_unset() {
        let config = InstallConfig::default();
        assert!(config.data_dir(GameRoot::Fallout3).is_none());
    }

    #[test]
    fn test_data_dir_derived() {
        let mut roots = HashMap::new();
        roots.insert(GameRoot::FalloutNV, PathBuf::from("/games/fnv"));
        let config = InstallConfig {
            game_roots: roots,
            ..Default::default()
        };
        assert_eq!(
            config.data_dir(GameRoot::FalloutNV),
            Some(PathBuf::from("/games/fnv/Data"))
        );
    }
}
