//! Manifest data model (§3) and loader (C4).
//!
//! Grounded on the teacher's `modlist::types`/`collection::types` shape
//! (plain-old-data structs deserialized from the package's JSON document),
//! generalized to the Package/Profile/Location/Asset/Check/PostCommand
//! vocabulary this format actually uses.

pub mod loader;

use serde::Deserialize;
use std::collections::HashMap;

pub use loader::{load_manifest, ManifestError};

/// Index of the profile used for installation (§2, §4.1).
pub const INSTALL_PROFILE: usize = 1;

/// Advisory package metadata (title/version/author/description).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Package {
    #[serde(default, rename = "Title")]
    pub title: String,
    #[serde(default, rename = "Version")]
    pub version: String,
    #[serde(default, rename = "Author")]
    pub author: String,
    #[serde(default, rename = "Description")]
    pub description: String,
}

/// A named, typed, textual value. Substitution happens lazily in the
/// resolver (C5), never here.
#[derive(Debug, Clone, Deserialize)]
pub struct Variable {
    pub name: String,
    #[serde(default)]
    pub tag: String,
    pub value: String,
}

/// Location type tag (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationType {
    Directory = 0,
    ReadArchive = 1,
    WriteArchive = 2,
}

impl LocationType {
    pub fn from_i64(v: i64) -> Option<Self> {
        match v {
            0 => Some(LocationType::Directory),
            1 => Some(LocationType::ReadArchive),
            2 => Some(LocationType::WriteArchive),
            _ => None,
        }
    }
}

/// A named addressable place: directory, read-archive, or write-archive.
#[derive(Debug, Clone, Deserialize)]
pub struct Location {
    pub name: String,
    #[serde(rename = "type")]
    pub loc_type: i64,
    pub value: String,
    #[serde(default)]
    pub archive_type: Option<u32>,
    #[serde(default)]
    pub archive_flags: Option<u32>,
    #[serde(default)]
    pub files_flags: Option<u32>,
    #[serde(default)]
    pub archive_compressed: Option<bool>,
}

impl Location {
    pub fn location_type(&self) -> Option<LocationType> {
        LocationType::from_i64(self.loc_type)
    }
}

/// Op-type discriminator (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpType {
    Copy,
    New,
    Patch,
    Reserved,
    AudioResample,
    AudioTranscode,
}

impl OpType {
    pub fn from_i64(v: i64) -> Option<Self> {
        match v {
            0 => Some(OpType::Copy),
            1 => Some(OpType::New),
            2 => Some(OpType::Patch),
            3 => Some(OpType::Reserved),
            4 => Some(OpType::AudioResample),
            5 => Some(OpType::AudioTranscode),
            _ => None,
        }
    }
}

/// One unit of work: read from `source_loc`, transform per `op_type`, write
/// to `target_loc`. A length-7 tuple implies `target_path == source_path`.
#[derive(Debug, Clone)]
pub struct Asset {
    pub tags: String,
    pub op_type: i64,
    pub params: String,
    pub status: i64,
    pub source_loc: i64,
    pub target_loc: i64,
    pub source_path: String,
    pub target_path: String,
}

impl Asset {
    pub fn op(&self) -> Option<OpType> {
        OpType::from_i64(self.op_type)
    }
}

/// Check type tag (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckType {
    FileExists,
    FreeSize,
    NoRestrictedPath,
}

impl CheckType {
    pub fn from_i64(v: i64) -> Option<Self> {
        match v {
            0 => Some(CheckType::FileExists),
            1 => Some(CheckType::FreeSize),
            2 => Some(CheckType::NoRestrictedPath),
            _ => None,
        }
    }
}

/// A manifest-declared validation check.
#[derive(Debug, Clone, Deserialize)]
pub struct Check {
    #[serde(rename = "type")]
    pub check_type: i64,
    #[serde(default)]
    pub inverted: bool,
    pub loc: i64,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub checksums: Option<String>,
    #[serde(default)]
    pub custom_message: Option<String>,
}

impl Check {
    pub fn kind(&self) -> Option<CheckType> {
        CheckType::from_i64(self.check_type)
    }

    /// Newline-separated checksum list, trimmed and filtered for blanks.
    pub fn checksum_list(&self) -> Vec<&str> {
        self.checksums
            .as_deref()
            .map(|s| s.lines().map(str::trim).filter(|l| !l.is_empty()).collect())
            .unwrap_or_default()
    }
}

/// Advisory, not consumed by the engine beyond pass-through reporting.
#[derive(Debug, Clone, Deserialize)]
pub struct FileAttr {
    pub loc: i64,
    pub path: String,
    #[serde(default)]
    pub attributes: String,
}

/// A Windows-style shell command string with advisory wait/hidden flags.
#[derive(Debug, Clone, Deserialize)]
pub struct PostCommand {
    pub command: String,
    #[serde(default)]
    pub wait: bool,
    #[serde(default)]
    pub hidden: bool,
}

/// One profile: its own ordered variables and locations.
#[derive(Debug, Clone, Default)]
pub struct Profile {
    pub variables: Vec<Variable>,
    pub locations: Vec<Location>,
}

/// The fully parsed manifest document.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    pub package: Package,
    pub profiles: HashMap<usize, Profile>,
    pub assets: Vec<Asset>,
    pub checks: Vec<Check>,
    pub file_attrs: Vec<FileAttr>,
    pub post_commands: Vec<PostCommand>,
}

impl Manifest {
    /// Locations for the given 1-based profile index. Fails if the index
    /// does not exist (§4.1).
    pub fn get_locations(&self, profile_index: usize) -> Result<&[Location], ManifestError> {
        self.profiles
            .get(&profile_index)
            .map(|p| p.locations.as_slice())
            .ok_or(ManifestError::ProfileOutOfRange(profile_index))
    }

    /// Variables for the given 1-based profile index. Fails if the index
    /// does not exist (§4.1).
    pub fn get_variables(&self, profile_index: usize) -> Result<&[Variable], ManifestError> {
        self.profiles
            .get(&profile_index)
            .map(|p| p.variables.as_slice())
            .ok_or(ManifestError::ProfileOutOfRange(profile_index))
    }
}
