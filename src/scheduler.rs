//! Scheduler (C12).
//!
//! Runs one manifest's assets through the five dispatch buckets in order
//! (new, copy, patch, audio-resample, audio-transcode, §4.9). Each bucket
//! gets its own bounded thread pool — 4 workers for new/copy/patch, one
//! worker per hardware thread for the two audio buckets — and reports
//! throttled progress on a channel so a UI consumer isn't flooded with
//! per-asset updates.
//!
//! Grounded on the teacher's `installer/streaming.rs` `all_archives.par_iter()`
//! single-pool-per-phase idiom, split into multiple bounded pools instead
//! of one pool sized for the whole run.

use crate::manifest::{Asset, OpType};
use crate::processor::{self, ProcessContext};
use rayon::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Mutex;
use tracing::warn;

/// Bounded parallelism for the new/copy/patch buckets (§4.9 default).
pub const BOUNDED_WORKERS: usize = 4;

/// One throttled progress update, emitted every `stride` completions
/// within a bucket (and always on the bucket's last item).
#[derive(Debug, Clone, Copy)]
pub struct ProgressUpdate {
    pub bucket: &'static str,
    pub completed: usize,
    pub total: usize,
}

/// Per-bucket tallies accumulated across a scheduler run.
#[derive(Debug, Default, Clone, Copy)]
pub struct BucketOutcome {
    pub bucket: &'static str,
    pub processed: usize,
    pub failed: usize,
}

struct BucketSpec {
    op: OpType,
    name: &'static str,
    workers: usize,
    stride: usize,
}

fn bucket_specs() -> [BucketSpec; 5] {
    let audio_workers = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
    [
        BucketSpec { op: OpType::New, name: "new", workers: BOUNDED_WORKERS, stride: 100 },
        BucketSpec { op: OpType::Copy, name: "copy", workers: BOUNDED_WORKERS, stride: 500 },
        BucketSpec { op: OpType::Patch, name: "patch", workers: BOUNDED_WORKERS, stride: 100 },
        BucketSpec { op: OpType::AudioResample, name: "audio-resample", workers: audio_workers, stride: 1000 },
        BucketSpec { op: OpType::AudioTranscode, name: "audio-transcode", workers: audio_workers, stride: 100 },
    ]
}

/// Runs every asset in `assets` through the five dispatch buckets, in
/// that fixed order (§4.9), reporting throttled progress on `progress_tx`.
pub fn run_all(ctx: &ProcessContext, assets: &[Asset], progress_tx: &Sender<ProgressUpdate>) -> Vec<BucketOutcome> {
    bucket_specs()
        .into_iter()
        .map(|spec| {
            let bucket_assets: Vec<&Asset> = assets.iter().filter(|a| a.op() == Some(spec.op)).collect();
            run_bucket(ctx, &bucket_assets, &spec, progress_tx)
        })
        .collect()
}

fn run_bucket(ctx: &ProcessContext, assets: &[&Asset], spec: &BucketSpec, progress_tx: &Sender<ProgressUpdate>) -> BucketOutcome {
    let total = assets.len();
    if total == 0 {
        return BucketOutcome { bucket: spec.name, processed: 0, failed: 0 };
    }

    let failed = AtomicUsize::new(0);
    let completed = AtomicUsize::new(0);
    // `Sender` is Send but not Sync; a `Mutex` gives the shared closure
    // below (invoked concurrently by rayon's worker threads) a `Sync`
    // way to reach it.
    let tx = Mutex::new(progress_tx.clone());

    let work = || {
        assets.par_iter().for_each(|asset| {
            if !processor::process_asset(ctx, asset) {
                failed.fetch_add(1, Ordering::Relaxed);
            }

            let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
            if done % spec.stride == 0 || done == total {
                if let Ok(sender) = tx.lock() {
                    let _ = sender.send(ProgressUpdate { bucket: spec.name, completed: done, total });
                }
            }
        });
    };

    match rayon::ThreadPoolBuilder::new().num_threads(spec.workers.max(1)).build() {
        Ok(pool) => pool.install(work),
        Err(e) => {
            warn!("failed to build bucket thread pool for {} ({}), running on the default pool", spec.name, e);
            work();
        }
    }

    BucketOutcome {
        bucket: spec.name,
        processed: total - failed.load(Ordering::Relaxed),
        failed: failed.load(Ordering::Relaxed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{ArchiveReadCache, WriteArchiveCollector};
    use crate::config::InstallConfig;
    use crate::helpers::{FakeInvoker, HelperTools};
    use crate::logger::InstallationLogger;
    use crate::manifest::Location;
    use crate::resolver::LocationResolver;
    use crate::scratch::ScratchRegistry;
    use std::fs;
    use std::sync::mpsc;

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
    fn test_run_all_dispatches_copy_assets_and_reports_progress() -> anyhow::Result<()> {
        let src = tempfile::tempdir()?;
        let dst = tempfile::tempdir()?;
        for i in 0..3 {
            fs::write(src.path().join(format!("{}.txt", i)), format!("file-{}", i))?;
        }

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

        let assets: Vec<Asset> = (0..3).map(|i| asset(0, 0, 1, &format!("{}.txt", i), &format!("{}.txt", i))).collect();
        let (tx, rx) = mpsc::channel();
        let outcomes = run_all(&ctx, &assets, &tx);
        drop(tx);

        let copy_outcome = outcomes.iter().find(|o| o.bucket == "copy").expect("copy bucket present");
        assert_eq!(copy_outcome.processed, 3);
        assert_eq!(copy_outcome.failed, 0);

        let updates: Vec<_> = rx.iter().collect();
        assert!(updates.iter().any(|u| u.bucket == "copy" && u.completed == u.total));
        Ok(())
    }

    #[test]
    fn test_empty_bucket_reports_no_progress() {
        let spec = BucketSpec { op: OpType::Patch, name: "patch", workers: 1, stride: 100 };
        let (tx, rx) = mpsc::channel();

        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        let config = InstallConfig {
            destination: dst.path().to_path_buf(),
            ..Default::default()
        };
        let resolver = LocationResolver::new(&config);
        let locations = vec![loc(0, &src.path().to_string_lossy())];
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

        let outcome = run_bucket(&ctx, &[], &spec, &tx);
        assert_eq!(outcome.processed, 0);
        assert_eq!(outcome.failed, 0);
        drop(tx);
        assert!(rx.iter().next().is_none());
    }
}
