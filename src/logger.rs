//! Installation logger (C14).
//!
//! A thread-safe accumulator for the three failure classes workers report
//! during a run (errors, warnings, missing-source files), shared across
//! the scheduler's worker pool (§5) with no lock held across I/O. Emits a
//! flat report file at the end of a run (§6: `ttw-installation.log`).

use std::fs;
use std::io;
use std::path::Path;
use std::sync::Mutex;

pub const REPORT_FILE_NAME: &str = "ttw-installation.log";

/// Collects per-run errors, warnings, and missing-file entries behind a
/// mutex per category, mirroring the teacher's shared-accumulator pattern
/// for worker-reported failures.
#[derive(Default)]
pub struct InstallationLogger {
    errors: Mutex<Vec<String>>,
    warnings: Mutex<Vec<String>>,
    missing_files: Mutex<Vec<String>>,
}

impl InstallationLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&self, message: impl Into<String>) {
        self.errors.lock().expect("logger lock poisoned").push(message.into());
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.warnings.lock().expect("logger lock poisoned").push(message.into());
    }

    pub fn missing_file(&self, path: impl Into<String>) {
        self.missing_files.lock().expect("logger lock poisoned").push(path.into());
    }

    pub fn error_count(&self) -> usize {
        self.errors.lock().expect("logger lock poisoned").len()
    }

    pub fn warning_count(&self) -> usize {
        self.warnings.lock().expect("logger lock poisoned").len()
    }

    pub fn missing_file_count(&self) -> usize {
        self.missing_files.lock().expect("logger lock poisoned").len()
    }

    /// Renders the plain-text report: a summary header (supplied by the
    /// driver, §11's `InstallationReport`) followed by each category.
    pub fn render_report(&self, summary_header: &str) -> String {
        let errors = self.errors.lock().expect("logger lock poisoned");
        let warnings = self.warnings.lock().expect("logger lock poisoned");
        let missing = self.missing_files.lock().expect("logger lock poisoned");

        let mut out = String::new();
        out.push_str(summary_header);
        out.push('\n');

        out.push_str(&format!("\nErrors ({}):\n", errors.len()));
        for e in errors.iter() {
            out.push_str("  - ");
            out.push_str(e);
            out.push('\n');
        }

        out.push_str(&format!("\nWarnings ({}):\n", warnings.len()));
        for w in warnings.iter() {
            out.push_str("  - ");
            out.push_str(w);
            out.push('\n');
        }

        out.push_str(&format!("\nMissing files ({}):\n", missing.len()));
        for m in missing.iter() {
            out.push_str("  - ");
            out.push_str(m);
            out.push('\n');
        }

        out
    }

    /// Writes the report to `<dest>/ttw-installation.log`.
    pub fn write_report(&self, dest_dir: &Path, summary_header: &str) -> io::Result<()> {
        let report = self.render_report(summary_header);
        fs::write(dest_dir.join(REPORT_FILE_NAME), report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_start_at_zero() {
        let logger = InstallationLogger::new();
        assert_eq!(logger.error_count(), 0);
        assert_eq!(logger.warning_count(), 0);
        assert_eq!(logger.missing_file_count(), 0);
    }

    #[test]
    fn test_recording_increments_counts() {
        let logger = InstallationLogger::new();
        logger.error("boom");
        logger.warning("careful");
        logger.missing_file("meshes/x.nif");
        assert_eq!(logger.error_count(), 1);
        assert_eq!(logger.warning_count(), 1);
        assert_eq!(logger.missing_file_count(), 1);
    }

    #[test]
    fn test_render_report_includes_all_categories() {
        let logger = InstallationLogger::new();
        logger.error("disk full");
        logger.warning("skipped asset");
        logger.missing_file("textures/a.dds");

        let report = logger.render_report("Install summary");
        assert!(report.contains("Install summary"));
        assert!(report.contains("disk full"));
        assert!(report.contains("skipped asset"));
        assert!(report.contains("textures/a.dds"));
    }

    #[test]
    fn test_write_report_creates_file() -> io::Result<()> {
        let dir = tempfile::tempdir()?;
        let logger = InstallationLogger::new();
        logger.error("sample error");
        logger.write_report(dir.path(), "header")?;
        let contents = fs::read_to_string(dir.path().join(REPORT_FILE_NAME))?;
        assert!(contents.contains("sample error"));
        Ok(())
    }
}
