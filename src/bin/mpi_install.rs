//! mpi-install - manual-invocation CLI wrapping `Driver` (§10.3).
//!
//! Not part of the engine: argument parsing lives entirely here, the same
//! way `clf3`'s `main.rs` wraps `installer::Installer` as a convenience
//! entry point for a library the GUI otherwise drives.

use anyhow::Result;
use clap::Parser;
use mpi_engine::config::InstallConfig;
use mpi_engine::games::GameRoot;
use mpi_engine::helpers::HelperTools;
use mpi_engine::progress;
use mpi_engine::Driver;
use std::collections::HashMap;
use std::path::PathBuf;
use std::thread;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mpi-install")]
#[command(author = "mpi-engine")]
#[command(version)]
#[command(about = "Installs a Bethesda-engine mod package (.mpi) into an output directory")]
struct Cli {
    /// Path to the .mpi package, or a directory already extracted from one.
    package: PathBuf,

    /// Installation target directory.
    #[arg(short, long)]
    destination: PathBuf,

    /// Fallout 3 installation directory, if installing into it.
    #[arg(long)]
    fo3_root: Option<PathBuf>,

    /// Fallout New Vegas installation directory, if installing into it.
    #[arg(long)]
    fnv_root: Option<PathBuf>,

    /// Oblivion installation directory, if installing into it.
    #[arg(long)]
    oblivion_root: Option<PathBuf>,

    /// Path to the binary-patch (xdelta-compatible) helper executable.
    #[arg(long, env = "MPI_BINARY_PATCH_TOOL")]
    binary_patch_tool: PathBuf,

    /// Path to the LZ4-frame decode helper executable.
    #[arg(long, env = "MPI_LZ4_DECODE_TOOL")]
    lz4_decode_tool: PathBuf,

    /// Path to the media transcode helper executable (ffmpeg-compatible).
    #[arg(long, env = "MPI_MEDIA_TRANSCODE_TOOL")]
    media_transcode_tool: PathBuf,

    /// Continue past a failed validation check instead of aborting.
    #[arg(long)]
    continue_on_validation_failure: bool,

    /// Bounded parallelism for the copy/new/patch buckets.
    #[arg(long, default_value = "4")]
    parallelism: usize,

    /// Enable verbose logging (use RUST_LOG=debug for more detail).
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose || std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env()
                    .add_directive(if cli.verbose { "mpi_engine=debug".parse()? } else { "mpi_engine=warn".parse()? }),
            )
            .init();
    }

    let mut game_roots = HashMap::new();
    if let Some(root) = cli.fo3_root {
        game_roots.insert(GameRoot::Fallout3, root);
    }
    if let Some(root) = cli.fnv_root {
        game_roots.insert(GameRoot::FalloutNV, root);
    }
    if let Some(root) = cli.oblivion_root {
        game_roots.insert(GameRoot::Oblivion, root);
    }

    let config = InstallConfig {
        game_roots,
        destination: cli.destination,
        package_path: cli.package,
        parallelism: cli.parallelism,
        continue_on_validation_failure: cli.continue_on_validation_failure,
    };

    let tools = HelperTools {
        binary_patch: cli.binary_patch_tool,
        lz4_decode: cli.lz4_decode_tool,
        media_transcode: cli.media_transcode_tool,
    };

    let driver = Driver::new(config, tools);

    let (tx, rx) = std::sync::mpsc::channel();
    let renderer = thread::spawn(move || progress::render_to_stderr(rx));

    let report = driver.run(Some(&tx));
    drop(tx);
    let _ = renderer.join();

    match report {
        Ok(report) => {
            println!("\n=== Installation Summary ===");
            println!("Package: {}", report.package_title);
            for bucket in &report.buckets {
                println!("{:>16}: {} processed, {} failed", bucket.bucket, bucket.processed, bucket.failed);
            }
            println!("BSA write failures: {}", report.bsa_write_failures);
            println!(
                "Post-commands: {} succeeded, {} failed",
                report.post_commands.succeeded, report.post_commands.failed
            );
            println!(
                "Errors: {}, Warnings: {}, Missing files: {}",
                report.error_count, report.warning_count, report.missing_file_count
            );
            println!("Elapsed: {:.1}s", report.elapsed.as_secs_f64());

            if report.error_count > 0 || report.bsa_write_failures > 0 {
                println!("\nInstallation finished with errors. Check the report for details.");
                std::process::exit(1);
            } else {
                println!("\nInstallation complete!");
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("Installation failed: {:#}", e);
            Err(e)
        }
    }
}
