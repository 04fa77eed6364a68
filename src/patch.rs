//! Patch engine (C10).
//!
//! Applies a binary patch blob to a reference file via the external
//! binary-patch helper (§4.8, §6), optionally decompressing an LZ4-framed
//! blob first via the external lz4-decode helper. Both tools are invoked
//! as subprocesses through the [`Invoker`] seam (§12.2) — there is no
//! in-process LZ4 decoder here, matching §6's external-helpers table.

use crate::helpers::{HelperCommand, HelperTools, Invoker};
use crate::scratch::ScratchRegistry;
use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;

const LZ4_FRAME_MAGIC: [u8; 4] = [0x04, 0x22, 0x4D, 0x18];

/// Applies `patch_blob` against `reference_bytes`, returning the patched
/// output bytes. A patch blob shorter than 4 bytes is treated as
/// uncompressed (§8 boundary behavior).
pub fn apply_patch(
    invoker: &dyn Invoker,
    tools: &HelperTools,
    scratch: &ScratchRegistry,
    patch_blob: &[u8],
    reference_bytes: &[u8],
) -> Result<Vec<u8>> {
    let work_dir = scratch.create_dir()?;

    let blob_for_patch_tool = if starts_with_lz4_magic(patch_blob) {
        let compressed_path = work_dir.join("patch.lz4");
        fs::write(&compressed_path, patch_blob).context("failed to stage compressed patch blob")?;
        let decompressed_path = work_dir.join("patch.xd3");
        run_lz4_decode(invoker, tools, &compressed_path, &decompressed_path)?;
        decompressed_path
    } else {
        let path = work_dir.join("patch.xd3");
        fs::write(&path, patch_blob).context("failed to stage patch blob")?;
        path
    };

    let reference_path = work_dir.join("reference.bin");
    fs::write(&reference_path, reference_bytes).context("failed to stage reference file")?;
    let output_path = work_dir.join("output.bin");

    run_binary_patch(invoker, tools, &reference_path, &blob_for_patch_tool, &output_path)?;

    fs::read(&output_path).context("failed to read patch output")
}

fn starts_with_lz4_magic(blob: &[u8]) -> bool {
    blob.len() >= 4 && blob[..4] == LZ4_FRAME_MAGIC
}

fn run_lz4_decode(invoker: &dyn Invoker, tools: &HelperTools, input: &Path, output: &Path) -> Result<()> {
    let cmd = HelperCommand {
        program: &tools.lz4_decode,
        args: vec![
            "-d".to_string(),
            "-f".to_string(),
            input.to_string_lossy().into_owned(),
            output.to_string_lossy().into_owned(),
        ],
        timeout: None,
    };
    let out = invoker.invoke(cmd).context("failed to invoke lz4-decode helper")?;
    if !out.success {
        bail!("lz4-decode failed: {}", out.stderr);
    }
    Ok(())
}

/// §5: the binary-patch tool has no timeout, unlike the media-transcode
/// helper's 30-second bound.
fn run_binary_patch(invoker: &dyn Invoker, tools: &HelperTools, reference: &Path, patch_blob: &Path, output: &Path) -> Result<()> {
    let cmd = HelperCommand {
        program: &tools.binary_patch,
        args: vec![
            "-d".to_string(),
            "-f".to_string(),
            "-s".to_string(),
            reference.to_string_lossy().into_owned(),
            patch_blob.to_string_lossy().into_owned(),
            output.to_string_lossy().into_owned(),
        ],
        timeout: None,
    };
    let out = invoker.invoke(cmd).context("failed to invoke binary-patch helper")?;
    if !out.success {
        match classify_patch_failure(&out.stderr) {
            Some(hint) => bail!("binary-patch failed: {} ({})", out.stderr, hint),
            None => bail!("binary-patch failed: {}", out.stderr),
        }
    }
    Ok(())
}

/// §4.8: stderr mentioning a too-short source or checksum mismatch usually
/// means the reference copy is the wrong game version.
fn classify_patch_failure(stderr: &str) -> Option<&'static str> {
    let lower = stderr.to_lowercase();
    if lower.contains("source file too short") || lower.contains("checksum mismatch") {
        Some("reference file is likely the wrong version")
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helpers::HelperOutput;
    use std::cell::RefCell;
    use std::path::PathBuf;

    fn tools() -> HelperTools {
        HelperTools {
            binary_patch: PathBuf::from("binary-patch"),
            lz4_decode: PathBuf::from("lz4-decode"),
            media_transcode: PathBuf::from("ffmpeg"),
        }
    }

    /// Writes `output_bytes` to the last argument of every invocation (the
    /// output-path convention both helpers share) and counts calls.
    struct WritingInvoker {
        output_bytes: Vec<u8>,
        calls: RefCell<usize>,
    }

    impl Invoker for WritingInvoker {
        fn invoke(&self, cmd: HelperCommand) -> Result<HelperOutput> {
            *self.calls.borrow_mut() += 1;
            let output_path = cmd.args.last().expect("helper commands always end in an output path");
            fs::write(output_path, &self.output_bytes)?;
            Ok(HelperOutput {
                success: true,
                code: Some(0),
                stdout: String::new(),
                stderr: String::new(),
            })
        }
    }

    #[test]
    fn test_apply_patch_uncompressed_blob() -> Result<()> {
        let scratch = ScratchRegistry::in_temp_dir();
        let invoker = WritingInvoker {
            output_bytes: b"patched-content".to_vec(),
            calls: RefCell::new(0),
        };

        let result = apply_patch(&invoker, &tools(), &scratch, b"not-lz4-blob", b"reference")?;
        assert_eq!(result, b"patched-content");
        assert_eq!(*invoker.calls.borrow(), 1, "only the binary-patch tool should run");
        Ok(())
    }

    #[test]
    fn test_apply_patch_lz4_magic_triggers_decode_then_patch() -> Result<()> {
        let scratch = ScratchRegistry::in_temp_dir();
        let invoker = WritingInvoker {
            output_bytes: b"patched-content".to_vec(),
            calls: RefCell::new(0),
        };

        let mut blob = LZ4_FRAME_MAGIC.to_vec();
        blob.extend_from_slice(b"compressed-body");

        let result = apply_patch(&invoker, &tools(), &scratch, &blob, b"reference")?;
        assert_eq!(result, b"patched-content");
        assert_eq!(*invoker.calls.borrow(), 2, "lz4-decode then binary-patch should both run");
        Ok(())
    }

    struct FailingInvoker {
        stderr: String,
    }

    impl Invoker for FailingInvoker {
        fn invoke(&self, _cmd: HelperCommand) -> Result<HelperOutput> {
            Ok(HelperOutput {
                success: false,
                code: Some(1),
                stdout: String::new(),
                stderr: self.stderr.clone(),
            })
        }
    }

    #[test]
    fn test_binary_patch_failure_includes_version_hint() {
        let scratch = ScratchRegistry::in_temp_dir();
        let invoker = FailingInvoker {
            stderr: "checksum mismatch on source".to_string(),
        };

        let err = apply_patch(&invoker, &tools(), &scratch, b"blob", b"reference").unwrap_err();
        assert!(err.to_string().contains("wrong version"));
    }

    #[test]
    fn test_binary_patch_failure_without_hint_keywords() {
        let scratch = ScratchRegistry::in_temp_dir();
        let invoker = FailingInvoker {
            stderr: "unexpected error".to_string(),
        };

        let err = apply_patch(&invoker, &tools(), &scratch, b"blob", b"reference").unwrap_err();
        assert!(!err.to_string().contains("wrong version"));
    }

    #[test]
    fn test_short_blob_treated_as_uncompressed() {
        assert!(!starts_with_lz4_magic(b"ab"));
        assert!(!starts_with_lz4_magic(&[]));
    }
}
