//! Write-archive collector (C7).
//!
//! At construction, scans a profile's locations; every write-archive
//! location whose resolved name ends in `.bsa` becomes a write target,
//! each with its own staging directory under the collector's staging
//! root (`<destination>/.ttw_bsa_staging_temp/`, §6). `add_file` writes
//! straight to the staging directory rather than holding files in
//! memory, so many workers can stage into the same target concurrently
//! (§4.7, §5); `write_all_bsas` walks each staging directory afterward
//! and builds the real archive.
//!
//! Grounded on `bsa/writer.rs::BsaWriterManager` for the per-location
//! registry-behind-a-mutex shape, and on
//! `installer/handlers/create_bsa.rs` for staging-directory-to-archive
//! construction (walk, read, `add_file`, `write`).

use super::{default_write_flags, infer_types_from_name, ArchiveWriter, VERSION_FO3_FNV};
use crate::manifest::{Location, LocationType};
use crate::paths::strip_dot_and_leading_seps;
use crate::resolver::LocationResolver;
use anyhow::{Context, Result};
use ba2::tes4::{ArchiveFlags, ArchiveTypes};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::warn;
use walkdir::WalkDir;

/// One case-insensitive collision recorded while staging files.
#[derive(Debug, Clone)]
pub struct Collision {
    pub target_name: String,
    pub previous_logical: String,
    pub new_logical: String,
    pub staging_path: PathBuf,
}

struct Target {
    display_name: String,
    flags: ArchiveFlags,
    types: ArchiveTypes,
    staging_dir: PathBuf,
}

/// Collects staged writes for every write-archive location, keyed by
/// ascending location index.
pub struct WriteArchiveCollector {
    targets: BTreeMap<i64, Target>,
    seen: Mutex<HashMap<PathBuf, String>>,
    collisions: Mutex<Vec<Collision>>,
    file_count: AtomicUsize,
}

impl WriteArchiveCollector {
    /// Scans `locations` for write-archive targets ending in `.bsa` and
    /// creates each one's staging directory under `staging_root`.
    pub fn new(locations: &[Location], resolver: &LocationResolver, staging_root: &Path) -> Result<Self> {
        let mut targets = BTreeMap::new();

        for (idx, loc) in locations.iter().enumerate() {
            if loc.location_type() != Some(LocationType::WriteArchive) {
                continue;
            }

            let resolved = resolver.resolve_path(loc);
            let display_name = match Path::new(&resolved).file_name() {
                Some(name) => name.to_string_lossy().to_string(),
                None => continue,
            };
            if !display_name.to_lowercase().ends_with(".bsa") {
                continue;
            }

            let loc_index = idx as i64;
            let staging_dir = staging_root.join(loc_index.to_string());
            fs::create_dir_all(&staging_dir)
                .with_context(|| format!("failed to create staging dir: {}", staging_dir.display()))?;

            let flags = loc
                .archive_flags
                .map(ArchiveFlags::from_bits_truncate)
                .unwrap_or_else(default_write_flags);
            let types = loc
                .archive_type
                .map(|t| ArchiveTypes::from_bits_truncate(t as u16))
                .unwrap_or_else(|| infer_types_from_name(&display_name));

            targets.insert(
                loc_index,
                Target {
                    display_name,
                    flags,
                    types,
                    staging_dir,
                },
            );
        }

        Ok(Self {
            targets,
            seen: Mutex::new(HashMap::new()),
            collisions: Mutex::new(Vec::new()),
            file_count: AtomicUsize::new(0),
        })
    }

    pub fn is_bsa_location(&self, loc_index: i64) -> bool {
        self.targets.contains_key(&loc_index)
    }

    /// Normalizes `logical_path` (strip `./`/`.\`, collapse to `/`,
    /// lowercase) and writes `bytes` to the target's staging directory.
    /// Collisions (two logical paths landing on the same staging path)
    /// are recorded, not rejected — last write wins (§4.7).
    pub fn add_file(&self, loc_index: i64, logical_path: &str, bytes: &[u8]) -> Result<()> {
        let target = self
            .targets
            .get(&loc_index)
            .with_context(|| format!("location {} is not a registered write-archive target", loc_index))?;

        let original_logical = strip_dot_and_leading_seps(&logical_path.replace('\\', "/"));
        let normalized = original_logical.to_lowercase();
        let staging_path = target.staging_dir.join(normalized.split('/').collect::<PathBuf>());

        if let Some(parent) = staging_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create staging subdir: {}", parent.display()))?;
        }

        {
            let mut seen = self.seen.lock().expect("collector lock poisoned");
            match seen.insert(staging_path.clone(), original_logical.clone()) {
                Some(previous) => {
                    let collision = Collision {
                        target_name: target.display_name.clone(),
                        previous_logical: previous,
                        new_logical: original_logical.clone(),
                        staging_path: staging_path.clone(),
                    };
                    warn!(
                        "collision in {}: '{}' and '{}' both map to {}",
                        collision.target_name, collision.previous_logical, collision.new_logical, staging_path.display()
                    );
                    self.collisions.lock().expect("collector lock poisoned").push(collision);
                }
                None => {
                    self.file_count.fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        // Atomic write: stage into a sibling temp file, then rename.
        let tmp_path = staging_path.with_extension("mpi-write-tmp");
        fs::write(&tmp_path, bytes)
            .with_context(|| format!("failed to stage file: {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &staging_path)
            .with_context(|| format!("failed to finalize staged file: {}", staging_path.display()))?;

        self.file_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn total_file_count(&self) -> usize {
        self.file_count.load(Ordering::Relaxed)
    }

    pub fn collisions(&self) -> Vec<Collision> {
        self.collisions.lock().expect("collector lock poisoned").clone()
    }

    /// Builds every target's archive from its staging directory into
    /// `dest_dir`, in ascending location-index order. Returns the number
    /// of targets that failed to build; a human-readable collision
    /// report is written alongside if any collision was recorded.
    pub fn write_all_bsas(&self, dest_dir: &Path) -> Result<usize> {
        let mut failures = 0;

        for target in self.targets.values() {
            let mut writer = ArchiveWriter::create();
            writer.set_archive_flags(target.flags);
            writer.set_archive_types(target.types);

            let mut any_file = false;
            for entry in WalkDir::new(&target.staging_dir)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
            {
                let rel = match entry.path().strip_prefix(&target.staging_dir) {
                    Ok(r) => r,
                    Err(_) => continue,
                };
                let rel_str = rel.to_string_lossy().replace('\\', "/").to_lowercase();
                let (dir, file) = match rel_str.rfind('/') {
                    Some(i) => (&rel_str[..i], &rel_str[i + 1..]),
                    None => ("", rel_str.as_str()),
                };

                let bytes = match fs::read(entry.path()) {
                    Ok(b) => b,
                    Err(e) => {
                        warn!("failed to read staged file {}: {}", entry.path().display(), e);
                        continue;
                    }
                };

                writer.add_file(dir, file, bytes);
                any_file = true;
            }

            if !any_file {
                continue;
            }

            let output_path = dest_dir.join(&target.display_name);
            if let Err(e) = writer.write(&output_path, VERSION_FO3_FNV) {
                warn!("failed to write archive {}: {}", target.display_name, e);
                failures += 1;
            }
        }

        let collisions = self.collisions();
        if !collisions.is_empty() {
            let report = render_collision_report(&collisions);
            let report_path = dest_dir.join("bsa_collisions_report.txt");
            if let Err(e) = fs::write(&report_path, report) {
                warn!("failed to write collision report {}: {}", report_path.display(), e);
            }
        }

        Ok(failures)
    }
}

fn render_collision_report(collisions: &[Collision]) -> String {
    let mut out = String::new();
    for c in collisions {
        out.push_str(&format!(
            "{}: '{}' and '{}' collided at {}\n",
            c.target_name,
            c.previous_logical,
            c.new_logical,
            c.staging_path.display()
        ));
    }
    out
}

impl Drop for WriteArchiveCollector {
    fn drop(&mut self) {
        for target in self.targets.values() {
            if let Err(e) = fs::remove_dir_all(&target.staging_dir) {
                warn!("failed to remove staging dir {}: {}", target.staging_dir.display(), e);
            }
        }
    }
}
