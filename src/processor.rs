//! Asset processor (C9).
//!
//! Dispatches one manifest asset by its op-type: reads the source payload
//! (archive or filesystem, with the zlib-in-zlib quirk and case-insensitive
//! fallback §9 describes), transforms it (patch/audio ops delegate to
//! C10/C11), and writes the result via the shared write-dispatch (§4.10).
//! Every per-asset failure is converted to `bool` here — nothing unwinds
//! past this boundary into the scheduler (§7).

use crate::archive::{strip_zlib_in_zlib_quirk, ArchiveReadCache, WriteArchiveCollector};
use crate::audio;
use crate::config::InstallConfig;
use crate::helpers::{HelperTools, Invoker};
use crate::logger::InstallationLogger;
use crate::manifest::{Asset, Location, LocationType, OpType};
use crate::patch;
use crate::paths;
use crate::resolver::LocationResolver;
use crate::scratch::ScratchRegistry;
use anyhow::Context;
use std::fs;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
enum ProcessError {
    #[error("missing source: {0}")]
    MissingSource(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

type ProcessResult<T> = Result<T, ProcessError>;

/// Everything one asset needs to resolve its source/target locations,
/// reach the shared collaborators, and dispatch to the external helpers.
pub struct ProcessContext<'a> {
    pub config: &'a InstallConfig,
    pub package_root: &'a Path,
    pub locations: &'a [Location],
    pub resolver: &'a LocationResolver<'a>,
    pub read_cache: &'a ArchiveReadCache,
    pub collector: &'a WriteArchiveCollector,
    pub logger: &'a InstallationLogger,
    pub scratch: &'a ScratchRegistry,
    pub invoker: &'a dyn Invoker,
    pub tools: &'a HelperTools,
}

/// Processes one asset; returns `true` on success. All failures (missing
/// source, subprocess failure, archive-codec failure) are logged and
/// converted here rather than propagated (§7).
pub fn process_asset(ctx: &ProcessContext, asset: &Asset) -> bool {
    match process_asset_inner(ctx, asset) {
        Ok(()) => true,
        Err(ProcessError::MissingSource(detail)) => {
            ctx.logger.missing_file(detail);
            false
        }
        Err(ProcessError::Other(e)) => {
            ctx.logger
                .error(format!("asset {} -> {} failed: {}", asset.source_path, asset.target_path, e));
            false
        }
    }
}

fn process_asset_inner(ctx: &ProcessContext, asset: &Asset) -> ProcessResult<()> {
    match asset.op() {
        Some(OpType::Copy) => process_copy(ctx, asset),
        Some(OpType::New) => process_new(ctx, asset),
        Some(OpType::Patch) => process_patch(ctx, asset),
        Some(OpType::AudioResample) => process_audio_resample(ctx, asset),
        Some(OpType::AudioTranscode) => process_audio_transcode(ctx, asset),
        Some(OpType::Reserved) | None => {
            Err(ProcessError::Other(anyhow::anyhow!("op-type {} is a hard error (§9 Open Question)", asset.op_type)))
        }
    }
}

fn process_copy(ctx: &ProcessContext, asset: &Asset) -> ProcessResult<()> {
    let bytes = read_from_location(ctx, asset.source_loc, &asset.source_path)?
        .ok_or_else(|| ProcessError::MissingSource(format!("{} (location {})", asset.source_path, asset.source_loc)))?;
    write_dispatch(ctx, asset.target_loc, &asset.target_path, &bytes)?;
    Ok(())
}

fn process_new(ctx: &ProcessContext, asset: &Asset) -> ProcessResult<()> {
    let bytes = read_from_directory(ctx.package_root, &asset.source_path)
        .map_err(ProcessError::Other)?
        .ok_or_else(|| ProcessError::MissingSource(format!("{} (package root)", asset.source_path)))?;
    write_dispatch(ctx, asset.target_loc, &asset.target_path, &bytes)?;
    Ok(())
}

fn process_patch(ctx: &ProcessContext, asset: &Asset) -> ProcessResult<()> {
    let effective_target = paths::strip_dot_and_leading_seps(&asset.target_path.replace('\\', "/"));
    let blob_path = ctx.package_root.join(format!("{}.xd3", effective_target));
    let patch_blob = fs::read(&blob_path)
        .map_err(|_| ProcessError::MissingSource(format!("{}.xd3 (patch blob)", effective_target)))?;

    let reference = read_reference_with_directory_fallback(ctx, asset.source_loc, &asset.source_path)?
        .ok_or_else(|| ProcessError::MissingSource(format!("{} (patch reference)", asset.source_path)))?;

    let output = patch::apply_patch(ctx.invoker, ctx.tools, ctx.scratch, &patch_blob, &reference)
        .map_err(ProcessError::Other)?;
    write_dispatch(ctx, asset.target_loc, &asset.target_path, &output)?;
    Ok(())
}

fn process_audio_resample(ctx: &ProcessContext, asset: &Asset) -> ProcessResult<()> {
    let bytes = read_from_location(ctx, asset.source_loc, &asset.source_path)?
        .ok_or_else(|| ProcessError::MissingSource(format!("{} (location {})", asset.source_path, asset.source_loc)))?;

    let work_dir = ctx.scratch.create_dir().map_err(ProcessError::Other)?;
    let input_path = work_dir.join("input.ogg");
    let output_path = work_dir.join("output.ogg");
    fs::write(&input_path, &bytes).context("failed to stage audio-resample input").map_err(ProcessError::Other)?;

    let params = audio::parse_audio_params(&asset.params);
    audio::run_resample(ctx.invoker, ctx.tools, &params, &input_path, &output_path).map_err(ProcessError::Other)?;

    let output = fs::read(&output_path).context("failed to read audio-resample output").map_err(ProcessError::Other)?;
    write_dispatch(ctx, asset.target_loc, &asset.target_path, &output)?;
    Ok(())
}

fn process_audio_transcode(ctx: &ProcessContext, asset: &Asset) -> ProcessResult<()> {
    let bytes = read_from_location(ctx, asset.source_loc, &asset.source_path)?
        .ok_or_else(|| ProcessError::MissingSource(format!("{} (location {})", asset.source_path, asset.source_loc)))?;

    let source_ext = paths::extension(&asset.source_path).unwrap_or("bin");
    let target_ext = paths::extension(&asset.target_path).unwrap_or("bin");

    let work_dir = ctx.scratch.create_dir().map_err(ProcessError::Other)?;
    let input_path = work_dir.join(format!("input.{}", source_ext));
    let output_path = work_dir.join(format!("output.{}", target_ext));
    fs::write(&input_path, &bytes).context("failed to stage audio-transcode input").map_err(ProcessError::Other)?;

    let params = audio::parse_audio_params(&asset.params);
    audio::run_transcode(ctx.invoker, ctx.tools, &params, &input_path, &output_path, target_ext).map_err(ProcessError::Other)?;

    let output = fs::read(&output_path).context("failed to read audio-transcode output").map_err(ProcessError::Other)?;
    write_dispatch(ctx, asset.target_loc, &asset.target_path, &output)?;
    Ok(())
}

/// Reads `rel_path` from the location at `loc_index`: extracts from the
/// archive for a read-archive location (applying the zlib-in-zlib quirk),
/// or reads from disk with case-insensitive fallback for a directory
/// location. `Ok(None)` means "not found", not an error.
fn read_from_location(ctx: &ProcessContext, loc_index: i64, rel_path: &str) -> ProcessResult<Option<Vec<u8>>> {
    let loc = ctx
        .locations
        .get(loc_index as usize)
        .with_context(|| format!("asset references unknown location {}", loc_index))
        .map_err(ProcessError::Other)?;

    match loc.location_type() {
        Some(LocationType::ReadArchive) => {
            let archive_path = ctx.resolver.get_bsa_path(loc).map_err(|e| ProcessError::Other(e.into()))?;
            read_from_archive(ctx, &archive_path, rel_path).map_err(ProcessError::Other)
        }
        Some(LocationType::Directory) => {
            let dir = ctx.resolver.get_directory_path(loc).map_err(|e| ProcessError::Other(e.into()))?;
            read_from_directory(&dir, rel_path).map_err(ProcessError::Other)
        }
        _ => Err(ProcessError::Other(anyhow::anyhow!(
            "location {} is not a directory or read-archive",
            loc_index
        ))),
    }
}

/// Patch's reference read (§4.8): same rules as `read_from_location`, but
/// when the location is a read-archive and extraction misses, falls back
/// to reading `<archive's parent dir>/<rel_path>` from disk directly.
fn read_reference_with_directory_fallback(ctx: &ProcessContext, loc_index: i64, rel_path: &str) -> ProcessResult<Option<Vec<u8>>> {
    let loc = ctx
        .locations
        .get(loc_index as usize)
        .with_context(|| format!("asset references unknown location {}", loc_index))
        .map_err(ProcessError::Other)?;

    if loc.location_type() == Some(LocationType::ReadArchive) {
        let archive_path = ctx.resolver.get_bsa_path(loc).map_err(|e| ProcessError::Other(e.into()))?;
        if let Some(found) = read_from_archive(ctx, &archive_path, rel_path).map_err(ProcessError::Other)? {
            return Ok(Some(found));
        }
        let fallback_dir = archive_path.parent().map(Path::to_path_buf).unwrap_or_default();
        return read_from_directory(&fallback_dir, rel_path).map_err(ProcessError::Other);
    }

    read_from_location(ctx, loc_index, rel_path)
}

fn read_from_archive(ctx: &ProcessContext, archive_path: &Path, rel_path: &str) -> anyhow::Result<Option<Vec<u8>>> {
    let handle = ctx.read_cache.get_handle(archive_path)?;
    let entries = handle.entry_paths();
    let Some(actual) = paths::find_in_archive_entries(&entries, rel_path) else {
        return Ok(None);
    };
    let bytes = handle.extract_file(actual)?;
    Ok(Some(strip_zlib_in_zlib_quirk(bytes)))
}

fn read_from_directory(dir: &Path, rel_path: &str) -> anyhow::Result<Option<Vec<u8>>> {
    let primary = dir.join(paths::to_native_pathbuf(rel_path));
    if primary.is_file() {
        return Ok(Some(fs::read(&primary).with_context(|| format!("failed to read {}", primary.display()))?));
    }

    match paths::resolve_case_insensitive(dir, rel_path) {
        Some(found) if found.is_file() => {
            Ok(Some(fs::read(&found).with_context(|| format!("failed to read {}", found.display()))?))
        }
        _ => Ok(None),
    }
}

/// Write-dispatch (§4.10): normalize the effective target path, delegate
/// to the write-archive collector for a write-archive target, or write
/// straight to `<targetDir>/<normalized>` otherwise.
fn write_dispatch(ctx: &ProcessContext, target_loc_index: i64, target_path: &str, bytes: &[u8]) -> ProcessResult<()> {
    let normalized = paths::strip_dot_and_leading_seps(&target_path.replace('\\', "/"));

    if ctx.collector.is_bsa_location(target_loc_index) {
        return ctx
            .collector
            .add_file(target_loc_index, &normalized, bytes)
            .map_err(ProcessError::Other);
    }

    let loc = ctx
        .locations
        .get(target_loc_index as usize)
        .with_context(|| format!("asset references unknown target location {}", target_loc_index))
        .map_err(ProcessError::Other)?;
    let dir = ctx.resolver.get_directory_path(loc).map_err(|e| ProcessError::Other(e.into()))?;
    let out_path = dir.join(paths::to_native_pathbuf(&normalized));

    paths::ensure_parent_dirs(&out_path)
        .with_context(|| format!("failed to create parent dirs for {}", out_path.display()))
        .map_err(ProcessError::Other)?;
    fs::write(&out_path, bytes)
        .with_context(|| format!("failed to write {}", out_path.display()))
        .map_err(ProcessError::Other)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ArchiveWriter;
    use crate::helpers::FakeInvoker;
    use crate::manifest::Location;

    fn loc(loc_type: i64, value: &str) -> Location {
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

    fn asset(op_type: i64, source_loc: i64, target_loc: i64, source_path: &str, target_path: &str) -> Asset {
        Asset {
            tags: String::new(),
            op_type,
            params: String::new(),
            status: 0,
            source_loc,
            target_loc,
            source_path: source_path.to_string(),
            target_path: target_path.to_string(),
        }
    }

    #[test]
    fn test_copy_from_directory_source() -> anyhow::Result<()> {
        let src = tempfile::tempdir()?;
        let dst = tempfile::tempdir()?;
        fs::write(src.path().join("a.txt"), b"hello")?;

        let config = InstallConfig {
            destination: dst.path().to_path_buf(),
            ..Default::default()
        };
        let resolver = LocationResolver::new(&config);
        let locations = vec![loc(0, &src.path().to_string_lossy()), loc(0, &dst.path().to_string_lossy())];
        let read_cache = ArchiveReadCache::new();
        let scratch = ScratchRegistry::in_temp_dir();
        let staging_root = scratch.create_dir()?;
        let collector = WriteArchiveCollector::new(&[], &resolver, &staging_root)?;
        let logger = InstallationLogger::new();
        let invoker = FakeInvoker::succeeding("");
        let tools = HelperTools {
            binary_patch: "binary-patch".into(),
            lz4_decode: "lz4-decode".into(),
            media_transcode: "ffmpeg".into(),
        };

        let ctx = ProcessContext {
            config: &config,
            package_root: src.path(),
            locations: &locations,
            resolver: &resolver,
            read_cache: &read_cache,
            collector: &collector,
            logger: &logger,
            scratch: &scratch,
            invoker: &invoker,
            tools: &tools,
        };

        let a = asset(0, 0, 1, "a.txt", "a.txt");
        assert!(process_asset(&ctx, &a));
        assert_eq!(fs::read_to_string(dst.path().join("a.txt"))?, "hello");
        assert_eq!(logger.error_count(), 0);
        Ok(())
    }

    #[test]
    fn test_copy_missing_source_is_recorded_not_errored() -> anyhow::Result<()> {
        let src = tempfile::tempdir()?;
        let dst = tempfile::tempdir()?;
        let config = InstallConfig {
            destination: dst.path().to_path_buf(),
            ..Default::default()
        };
        let resolver = LocationResolver::new(&config);
        let locations = vec![loc(0, &src.path().to_string_lossy()), loc(0, &dst.path().to_string_lossy())];
        let read_cache = ArchiveReadCache::new();
        let scratch = ScratchRegistry::in_temp_dir();
        let staging_root = scratch.create_dir()?;
        let collector = WriteArchiveCollector::new(&[], &resolver, &staging_root)?;
        let logger = InstallationLogger::new();
        let invoker = FakeInvoker::succeeding("");
        let tools = HelperTools {
            binary_patch: "binary-patch".into(),
            lz4_decode: "lz4-decode".into(),
            media_transcode: "ffmpeg".into(),
        };

        let ctx = ProcessContext {
            config: &config,
            package_root: src.path(),
            locations: &locations,
            resolver: &resolver,
            read_cache: &read_cache,
            collector: &collector,
            logger: &logger,
            scratch: &scratch,
            invoker: &invoker,
            tools: &tools,
        };

        let a = asset(0, 0, 1, "missing.txt", "missing.txt");
        assert!(!process_asset(&ctx, &a));
        assert_eq!(logger.missing_file_count(), 1);
        assert_eq!(logger.error_count(), 0);
        Ok(())
    }

    #[test]
    fn test_copy_from_archive_source_strips_zlib_header() -> anyhow::Result<()> {
        use std::io::Write;

        let src = tempfile::tempdir()?;
        let dst = tempfile::tempdir()?;

        let mut encoder = flate2::write::DeflateEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(b"inner")?;
        let inner = encoder.finish()?;
        let mut wrapped = vec![0x78, 0x9C];
        wrapped.extend_from_slice(&inner);

        let mut writer = ArchiveWriter::create();
        writer.add_file("meshes", "x.nif", wrapped);
        let bsa_path = src.path().join("foo.bsa");
        writer.write(&bsa_path, crate::archive::VERSION_FO3_FNV)?;

        let config = InstallConfig {
            destination: dst.path().to_path_buf(),
            ..Default::default()
        };
        let resolver = LocationResolver::new(&config);
        let locations = vec![loc(1, &bsa_path.to_string_lossy()), loc(0, &dst.path().to_string_lossy())];
        let read_cache = ArchiveReadCache::new();
        let scratch = ScratchRegistry::in_temp_dir();
        let staging_root = scratch.create_dir()?;
        let collector = WriteArchiveCollector::new(&[], &resolver, &staging_root)?;
        let logger = InstallationLogger::new();
        let invoker = FakeInvoker::succeeding("");
        let tools = HelperTools {
            binary_patch: "binary-patch".into(),
            lz4_decode: "lz4-decode".into(),
            media_transcode: "ffmpeg".into(),
        };

        let ctx = ProcessContext {
            config: &config,
            package_root: src.path(),
            locations: &locations,
            resolver: &resolver,
            read_cache: &read_cache,
            collector: &collector,
            logger: &logger,
            scratch: &scratch,
            invoker: &invoker,
            tools: &tools,
        };

        let a = asset(0, 0, 1, "meshes/x.nif", "meshes/x.nif");
        assert!(process_asset(&ctx, &a));
        assert_eq!(fs::read(dst.path().join("meshes/x.nif"))?, b"inner".to_vec());
        Ok(())
    }

    #[test]
    fn test_write_dispatch_routes_to_collector_for_bsa_target() -> anyhow::Result<()> {
        let src = tempfile::tempdir()?;
        let dst = tempfile::tempdir()?;
        fs::write(src.path().join("a.txt"), b"hi")?;

        let config = InstallConfig {
            destination: dst.path().to_path_buf(),
            ..Default::default()
        };
        let resolver = LocationResolver::new(&config);
        let locations = vec![loc(0, &src.path().to_string_lossy()), loc(2, &dst.path().join("Out.bsa").to_string_lossy())];
        let read_cache = ArchiveReadCache::new();
        let scratch = ScratchRegistry::in_temp_dir();
        let staging_root = scratch.create_dir()?;
        let collector = WriteArchiveCollector::new(&locations, &resolver, &staging_root)?;
        let logger = InstallationLogger::new();
        let invoker = FakeInvoker::succeeding("");
        let tools = HelperTools {
            binary_patch: "binary-patch".into(),
            lz4_decode: "lz4-decode".into(),
            media_transcode: "ffmpeg".into(),
        };

        let ctx = ProcessContext {
            config: &config,
            package_root: src.path(),
            locations: &locations,
            resolver: &resolver,
            read_cache: &read_cache,
            collector: &collector,
            logger: &logger,
            scratch: &scratch,
            invoker: &invoker,
            tools: &tools,
        };

        let a = asset(0, 0, 1, "a.txt", "a.txt");
        assert!(process_asset(&ctx, &a));
        assert_eq!(collector.total_file_count(), 1);
        Ok(())
    }

    #[test]
    fn test_reserved_op_type_is_hard_error() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        let config = InstallConfig {
            destination: dst.path().to_path_buf(),
            ..Default::default()
        };
        let resolver = LocationResolver::new(&config);
        let locations = vec![loc(0, &src.path().to_string_lossy()), loc(0, &dst.path().to_string_lossy())];
        let read_cache = ArchiveReadCache::new();
        let scratch = ScratchRegistry::in_temp_dir();
        let staging_root = scratch.create_dir().unwrap();
        let collector = WriteArchiveCollector::new(&[], &resolver, &staging_root).unwrap();
        let logger = InstallationLogger::new();
        let invoker = FakeInvoker::succeeding("");
        let tools = HelperTools {
            binary_patch: "binary-patch".into(),
            lz4_decode: "lz4-decode".into(),
            media_transcode: "ffmpeg".into(),
        };

        let ctx = ProcessContext {
            config: &config,
            package_root: src.path(),
            locations: &locations,
            resolver: &resolver,
            read_cache: &read_cache,
            collector: &collector,
            logger: &logger,
            scratch: &scratch,
            invoker: &invoker,
            tools: &tools,
        };

        let a = asset(3, 0, 1, "a.txt", "a.txt");
        assert!(!process_asset(&ctx, &a));
        assert_eq!(logger.error_count(), 1);
    }
}
