//! Subprocess invocation seam (§12.2).
//!
//! `Invoker` is the trait C10 (patch) and C11 (audio) dispatch through;
//! `ProcessInvoker` runs a real child process, `FakeInvoker` is the test
//! double used by their unit tests.
//!
//! Grounded on the teacher's `ttw::install_ttw` `Command::new(...)
//! .stdout(Stdio::piped()).stderr(Stdio::piped()).spawn()` invocation
//! idiom, but deliberately diverging from it in one respect: that
//! function reads all of stdout, then all of stderr, then calls
//! `child.wait()`. A helper that writes a lot to stderr while this
//! engine is still draining stdout would fill stderr's OS pipe buffer
//! and deadlock both sides. Here stdout and stderr are drained
//! concurrently on separate threads before `wait()`.

use anyhow::{Context, Result};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;
use tracing::warn;

/// Locations of the three native helpers this engine shells out to (§6).
/// Supplied by the embedder, the same way `InstallConfig` is — none of
/// these are probed or bundled by this crate (out-of-scope external
/// collaborators per §1).
#[derive(Debug, Clone)]
pub struct HelperTools {
    pub binary_patch: PathBuf,
    pub lz4_decode: PathBuf,
    pub media_transcode: PathBuf,
}

/// Captured output of one helper invocation.
#[derive(Debug, Clone)]
pub struct HelperOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// One external helper invocation: a binary, its arguments, and an
/// optional timeout (§4.11 uses 30s for media transcode).
pub struct HelperCommand<'a> {
    pub program: &'a Path,
    pub args: Vec<String>,
    pub timeout: Option<Duration>,
}

pub trait Invoker: Send + Sync {
    fn invoke(&self, cmd: HelperCommand) -> Result<HelperOutput>;
}

/// Runs a real child process, draining stdout/stderr concurrently.
pub struct ProcessInvoker;

impl Invoker for ProcessInvoker {
    fn invoke(&self, cmd: HelperCommand) -> Result<HelperOutput> {
        let mut child = Command::new(cmd.program)
            .args(&cmd.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to spawn helper: {}", cmd.program.display()))?;

        let stdout = child.stdout.take().expect("child stdout was piped");
        let stderr = child.stderr.take().expect("child stderr was piped");

        let stdout_thread = thread::spawn(move || drain_lines(stdout));
        let stderr_thread = thread::spawn(move || drain_lines(stderr));

        let status = if let Some(timeout) = cmd.timeout {
            wait_with_timeout(&mut child, timeout)?
        } else {
            child.wait().context("failed to wait for helper process")?
        };

        let stdout_text = stdout_thread.join().unwrap_or_default();
        let stderr_text = stderr_thread.join().unwrap_or_default();

        Ok(HelperOutput {
            success: status.success(),
            code: status.code(),
            stdout: stdout_text,
            stderr: stderr_text,
        })
    }
}

fn drain_lines<R: std::io::Read>(reader: R) -> String {
    let mut out = String::new();
    for line in BufReader::new(reader).lines().map_while(Result::ok) {
        out.push_str(&line);
        out.push('\n');
    }
    out
}

fn wait_with_timeout(child: &mut std::process::Child, timeout: Duration) -> Result<std::process::ExitStatus> {
    let start = std::time::Instant::now();
    loop {
        if let Some(status) = child.try_wait().context("failed to poll helper process")? {
            return Ok(status);
        }
        if start.elapsed() >= timeout {
            warn!("helper process timed out after {:?}, killing", timeout);
            let _ = child.kill();
            return child.wait().context("failed to wait for killed helper process");
        }
        thread::sleep(Duration::from_millis(25));
    }
}

/// Test double: returns a pre-scripted response for every call, or a
/// matcher-based response keyed by the first argument.
#[derive(Default)]
pub struct FakeInvoker {
    pub response: Option<HelperOutput>,
}

impl FakeInvoker {
    pub fn succeeding(stdout: &str) -> Self {
        Self {
            response: Some(HelperOutput {
                success: true,
                code: Some(0),
                stdout: stdout.to_string(),
                stderr: String::new(),
            }),
        }
    }

    pub fn failing(stderr: &str) -> Self {
        Self {
            response: Some(HelperOutput {
                success: false,
                code: Some(1),
                stdout: String::new(),
                stderr: stderr.to_string(),
            }),
        }
    }
}

impl Invoker for FakeInvoker {
    fn invoke(&self, _cmd: HelperCommand) -> Result<HelperOutput> {
        self.response
            .clone()
            .context("FakeInvoker has no scripted response")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fake_invoker_succeeding() {
        let invoker = FakeInvoker::succeeding("done");
        let out = invoker
            .invoke(HelperCommand {
                program: Path::new("whatever"),
                args: vec![],
                timeout: None,
            })
            .unwrap();
        assert!(out.success);
        assert_eq!(out.stdout, "done");
    }

    #[test]
    fn test_fake_invoker_failing() {
        let invoker = FakeInvoker::failing("boom");
        let out = invoker
            .invoke(HelperCommand {
                program: Path::new("whatever"),
                args: vec![],
                timeout: None,
            })
            .unwrap();
        assert!(!out.success);
        assert_eq!(out.stderr, "boom");
    }

    #[test]
    fn test_process_invoker_runs_real_command() {
        let invoker = ProcessInvoker;
        let out = invoker
            .invoke(HelperCommand {
                program: Path::new("echo"),
                args: vec!["hello".to_string()],
                timeout: Some(Duration::from_secs(5)),
            })
            .unwrap();
        assert!(out.success);
        assert!(out.stdout.contains("hello"));
    }
}
