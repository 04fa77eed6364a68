//! Installer driver (C16).
//!
//! Advances the fixed state machine described in §4.13:
//! `INIT -> EXTRACT -> LOAD -> VALIDATE -> DISPATCH(new) -> DISPATCH(copy)
//! -> DISPATCH(patch) -> DISPATCH(audio-resample) -> DISPATCH(audio-transcode)
//! -> PACK -> POST -> REPORT -> CLEANUP -> DONE`. The driver's own thread is
//! the sole state-machine advancer (§5); workers spawned by the scheduler
//! never touch it. `CLEANUP` always runs, on both the success and the
//! `FAILED` path.
//!
//! Grounded on the teacher's `installer/mod.rs::Installer::run_streaming`
//! for the overall shape (extract -> load -> process buckets -> summarize),
//! generalized from its two-phase download/move pipeline to this format's
//! five-bucket dispatch and write-archive packing step.

use crate::archive::{ArchiveReadCache, WriteArchiveCollector};
use crate::config::InstallConfig;
use crate::helpers::{HelperTools, Invoker, ProcessInvoker};
use crate::logger::InstallationLogger;
use crate::manifest::{self, Manifest, INSTALL_PROFILE};
use crate::package;
use crate::postcmd::{self, PostCommandOutcome};
use crate::processor::ProcessContext;
use crate::resolver::LocationResolver;
use crate::scheduler::{self, BucketOutcome, ProgressUpdate};
use crate::scratch::ScratchRegistry;
use crate::validator;
use anyhow::{Context, Result};
use std::sync::mpsc::Sender;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Summary of one completed (or failed) installation run (§11).
#[derive(Debug, Default)]
pub struct InstallationReport {
    pub package_title: String,
    pub buckets: Vec<BucketOutcome>,
    pub bsa_write_failures: usize,
    pub post_commands: PostCommandOutcome,
    pub error_count: usize,
    pub warning_count: usize,
    pub missing_file_count: usize,
    pub elapsed: Duration,
    pub succeeded: bool,
}

impl InstallationReport {
    fn header(&self) -> String {
        let mut out = format!(
            "Installation report for '{}' ({}, {:.1}s)\n",
            self.package_title,
            if self.succeeded { "succeeded" } else { "failed" },
            self.elapsed.as_secs_f64()
        );
        for bucket in &self.buckets {
            out.push_str(&format!(
                "  {}: {} processed, {} failed\n",
                bucket.bucket, bucket.processed, bucket.failed
            ));
        }
        out.push_str(&format!(
            "  bsa write failures: {}\n  post-commands: {} ok, {} failed\n",
            self.bsa_write_failures, self.post_commands.succeeded, self.post_commands.failed
        ));
        out
    }
}

/// Drives one installation end to end. Owns the collaborators the
/// embedder does not supply per-run (the scratch registry, the read
/// cache, the logger); takes the external-helper locations and the
/// `Invoker` it should dispatch subprocesses through.
pub struct Driver {
    config: InstallConfig,
    tools: HelperTools,
    invoker: Box<dyn Invoker>,
}

impl Driver {
    pub fn new(config: InstallConfig, tools: HelperTools) -> Self {
        Self::with_invoker(config, tools, Box::new(ProcessInvoker))
    }

    pub fn with_invoker(config: InstallConfig, tools: HelperTools, invoker: Box<dyn Invoker>) -> Self {
        Self { config, tools, invoker }
    }

    /// Runs the full state machine, optionally reporting throttled
    /// progress on `progress_tx` (§5). `Err` is returned only for the
    /// transitions §4.13 names as fatal: configuration, extraction,
    /// manifest load, or a refused validation failure.
    pub fn run(&self, progress_tx: Option<&Sender<ProgressUpdate>>) -> Result<InstallationReport> {
        let started = Instant::now();
        let logger = InstallationLogger::new();
        let scratch = ScratchRegistry::in_temp_dir();

        let result = self.run_inner(&logger, &scratch, progress_tx, started);

        // CLEANUP runs on every terminal state, success or failure.
        scratch.cleanup_all();

        match &result {
            Ok(report) => {
                if let Err(e) = logger.write_report(&self.config.destination, &report.header()) {
                    warn!("failed to write installation report: {}", e);
                }
            }
            Err(e) => {
                warn!("installation failed: {:#}", e);
                let header = format!("Installation failed after {:.1}s: {:#}\n", started.elapsed().as_secs_f64(), e);
                if let Err(write_err) = logger.write_report(&self.config.destination, &header) {
                    warn!("failed to write failure report: {}", write_err);
                }
            }
        }

        result
    }

    fn run_inner(
        &self,
        logger: &InstallationLogger,
        scratch: &ScratchRegistry,
        progress_tx: Option<&Sender<ProgressUpdate>>,
        started: Instant,
    ) -> Result<InstallationReport> {
        // INIT
        self.config.validate().context("configuration is invalid")?;
        let swept = scratch.sweep_stale();
        if swept > 0 {
            info!("swept {} stale scratch directories from a prior run", swept);
        }

        // EXTRACT
        info!("extracting package {}", self.config.package_path.display());
        let package_root = package::open_package(&self.config.package_path, scratch).context("failed to open package")?;

        // LOAD
        let manifest_path = package_root.join("_package").join("index.json");
        let manifest: Manifest = manifest::load_manifest(&manifest_path).context("failed to load manifest")?;
        let locations = manifest.get_locations(INSTALL_PROFILE).context("failed to read install profile locations")?;

        // VALIDATE
        let resolver = LocationResolver::new(&self.config);
        let (passed, report) = validator::run_checks(&manifest.checks, locations, &resolver);
        if !passed {
            if self.config.continue_on_validation_failure {
                warn!("validation failed, continuing anyway:\n{}", report);
            } else {
                anyhow::bail!("validation failed:\n{}", report);
            }
        }

        let read_cache = ArchiveReadCache::new();
        let staging_root = scratch.create_dir().context("failed to create write-archive staging root")?;
        let collector = WriteArchiveCollector::new(locations, &resolver, &staging_root).context("failed to set up write-archive collector")?;

        let ctx = ProcessContext {
            config: &self.config,
            package_root: &package_root,
            locations,
            resolver: &resolver,
            read_cache: &read_cache,
            collector: &collector,
            logger,
            scratch,
            invoker: self.invoker.as_ref(),
            tools: &self.tools,
        };

        // DISPATCH(new) -> DISPATCH(copy) -> DISPATCH(patch)
        // -> DISPATCH(audio-resample) -> DISPATCH(audio-transcode)
        let buckets = self.dispatch(&ctx, &manifest, progress_tx);

        // PACK
        let bsa_write_failures = collector.write_all_bsas(&self.config.destination).context("failed to write archive(s)")?;

        // POST
        let post_commands = postcmd::apply_post_commands(&manifest.post_commands, &self.config, logger);

        // REPORT
        let report = InstallationReport {
            package_title: manifest.package.title.clone(),
            buckets,
            bsa_write_failures,
            post_commands,
            error_count: logger.error_count(),
            warning_count: logger.warning_count(),
            missing_file_count: logger.missing_file_count(),
            elapsed: started.elapsed(),
            succeeded: true,
        };

        Ok(report)
    }

    fn dispatch(&self, ctx: &ProcessContext, manifest: &Manifest, progress_tx: Option<&Sender<ProgressUpdate>>) -> Vec<BucketOutcome> {
        match progress_tx {
            Some(tx) => scheduler::run_all(ctx, &manifest.assets, tx),
            None => {
                let (tx, _rx) = std::sync::mpsc::channel();
                scheduler::run_all(ctx, &manifest.assets, &tx)
            }
        }
    }
}
