//! Game root definitions.
//!
//! The installer configuration carries up to three reference game roots
//! (Fallout 3, Fallout New Vegas, Oblivion), any subset of which may be
//! absent. Each supplied root is validated against the game's signature
//! executable before the installation proceeds.

use std::path::{Path, PathBuf};

/// One of the three reference games this engine installs into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GameRoot {
    Fallout3,
    FalloutNV,
    Oblivion,
}

impl GameRoot {
    /// Display name used in error messages and logs.
    pub fn name(&self) -> &'static str {
        match self {
            GameRoot::Fallout3 => "Fallout 3",
            GameRoot::FalloutNV => "Fallout New Vegas",
            GameRoot::Oblivion => "Oblivion",
        }
    }

    /// The `%…ROOT%`/`%…DATA%` variable prefix used by the resolver.
    pub fn variable_prefix(&self) -> &'static str {
        match self {
            GameRoot::Fallout3 => "FO3",
            GameRoot::FalloutNV => "FNV",
            GameRoot::Oblivion => "TES4",
        }
    }

    /// Signature executable whose presence confirms a valid install root.
    pub fn signature_executable(&self) -> &'static str {
        match self {
            GameRoot::Fallout3 => "Fallout3.exe",
            GameRoot::FalloutNV => "FalloutNV.exe",
            GameRoot::Oblivion => "Oblivion.exe",
        }
    }

    /// Data directory name, relative to the game root.
    pub fn data_folder(&self) -> &'static str {
        "Data"
    }

    /// Derived data directory: `<root>/Data`.
    pub fn data_dir(&self, root: &Path) -> PathBuf {
        root.join(self.data_folder())
    }
}

impl std::fmt::Display for GameRoot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Validates that a supplied game root contains the game's signature executable.
///
/// A data directory missing is not itself fatal here: many packages write
/// a fresh `Data` folder as part of installation. Only the signature
/// executable is required, per the configuration invariant.
pub fn validate_game_root(game: GameRoot, path: &Path) -> anyhow::Result<()> {
    if !path.exists() {
        anyhow::bail!("{} root does not exist: {}", game.name(), path.display());
    }

    let exe_path = path.join(game.signature_executable());
    if !exe_path.exists() {
        anyhow::bail!(
            "{} installation appears incomplete: {} not found at {}",
            game.name(),
            game.signature_executable(),
            path.display()
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_game_root_properties() {
        assert_eq!(GameRoot::Fallout3.name(), "Fallout 3");
        assert_eq!(GameRoot::Fallout3.variable_prefix(), "FO3");
        assert_eq!(GameRoot::Fallout3.signature_executable(), "Fallout3.exe");
        assert_eq!(GameRoot::Oblivion.variable_prefix(), "TES4");
    }

    #[test]
    fn test_display() {
        assert_eq!(GameRoot::FalloutNV.to_string(), "Fallout New Vegas");
    }

    #[test]
    fn test_data_dir() {
        let root = Path::new("/games/fnv");
        assert_eq!(GameRoot::FalloutNV.data_dir(root), Path::new("/games/fnv/Data"));
    }

    #[test]
    fn test_validate_missing_root() {
        let err = validate_game_root(GameRoot::Oblivion, Path::new("/nonexistent/path/xyz")).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_validate_missing_exe() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let err = validate_game_root(GameRoot::Fallout3, dir.path()).unwrap_err();
        assert!(err.to_string().contains("Fallout3.exe"));
        Ok(())
    }

    #[test]
    fn test_validate_ok() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("Fallout3.exe"), b"")?;
        validate_game_root(GameRoot::Fallout3, dir.path())?;
        Ok(())
    }
}
