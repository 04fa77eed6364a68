//! Audio engine (C11).
//!
//! Parses the per-asset audio parameter string (§4.11) and drives the
//! external media-transcode helper (§4.8, §6) for the two audio op-types:
//! resample (always libvorbis/ogg) and transcode (codec dispatched from
//! the target extension).

use crate::helpers::{HelperCommand, HelperTools, Invoker};
use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Every media-tool invocation gets this wall-clock bound (§5); on expiry
/// the subprocess is killed and the asset fails.
const MEDIA_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// Sample rate assumed when `params` omits `-f:` for an audio-resample
/// asset (§4.11). Transcode has no such default — its codec comes purely
/// from the target extension when `params` is empty (§8).
const DEFAULT_RESAMPLE_HZ: &str = "24000";

/// Splits `params` on whitespace; each `-k:v` token becomes `k → v`.
/// Unknown keys are ignored. A `BTreeMap` keeps `format_audio_params`
/// deterministic, which is what makes the parse/format round-trip hold.
pub fn parse_audio_params(params: &str) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    for token in params.split_whitespace() {
        let Some(rest) = token.strip_prefix('-') else {
            continue;
        };
        if let Some((k, v)) = rest.split_once(':') {
            map.insert(k.to_string(), v.to_string());
        }
    }
    map
}

/// Inverse of [`parse_audio_params`], used by its round-trip test (§8).
pub fn format_audio_params(map: &BTreeMap<String, String>) -> String {
    map.iter()
        .map(|(k, v)| format!("-{}:{}", k, v))
        .collect::<Vec<_>>()
        .join(" ")
}

/// audio-resample (op 4): always libvorbis into an `.ogg` container, `-f`
/// defaulting to 24000 Hz when absent.
pub fn run_resample(invoker: &dyn Invoker, tools: &HelperTools, params: &BTreeMap<String, String>, input: &Path, output: &Path) -> Result<()> {
    let sample_rate = params.get("f").map(String::as_str).unwrap_or(DEFAULT_RESAMPLE_HZ);
    let args = vec![
        "-nostdin".to_string(),
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-i".to_string(),
        input.to_string_lossy().into_owned(),
        "-ar".to_string(),
        sample_rate.to_string(),
        "-c:a".to_string(),
        "libvorbis".to_string(),
        "-y".to_string(),
        output.to_string_lossy().into_owned(),
    ];
    invoke_media_tool(invoker, tools, args, "audio-resample")
}

/// audio-transcode (op 5): codec is dispatched purely from `target_ext`
/// (§4.8); `-ar`/`-ac` are added only when present in `params`.
pub fn run_transcode(invoker: &dyn Invoker, tools: &HelperTools, params: &BTreeMap<String, String>, input: &Path, output: &Path, target_ext: &str) -> Result<()> {
    let args = transcode_args(params, input, output, target_ext)?;
    invoke_media_tool(invoker, tools, args, "audio-transcode")
}

fn transcode_args(params: &BTreeMap<String, String>, input: &Path, output: &Path, target_ext: &str) -> Result<Vec<String>> {
    let mut args = vec![
        "-nostdin".to_string(),
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-i".to_string(),
        input.to_string_lossy().into_owned(),
    ];

    match target_ext.to_lowercase().as_str() {
        "wav" => {
            args.push("-c:a".to_string());
            args.push("pcm_s16le".to_string());
        }
        "mp3" => {
            args.push("-c:a".to_string());
            args.push("libmp3lame".to_string());
            if let Some(bitrate) = params.get("b") {
                args.push("-b:a".to_string());
                args.push(format!("{}k", bitrate));
            }
        }
        "ogg" => {
            args.push("-c:a".to_string());
            args.push("libvorbis".to_string());
        }
        other => bail!("no transcode codec mapping for target extension '{}'", other),
    }

    if let Some(sample_rate) = params.get("f") {
        args.push("-ar".to_string());
        args.push(sample_rate.clone());
    }
    if let Some(channels) = params.get("c") {
        args.push("-ac".to_string());
        args.push(channels.clone());
    }

    args.push("-y".to_string());
    args.push(output.to_string_lossy().into_owned());
    Ok(args)
}

fn invoke_media_tool(invoker: &dyn Invoker, tools: &HelperTools, args: Vec<String>, op_name: &str) -> Result<()> {
    let cmd = HelperCommand {
        program: &tools.media_transcode,
        args,
        timeout: Some(MEDIA_TOOL_TIMEOUT),
    };
    let out = invoker
        .invoke(cmd)
        .with_context(|| format!("failed to invoke media-transcode helper for {}", op_name))?;
    if !out.success {
        bail!("media-transcode failed ({}): {}", op_name, out.stderr);
    }
    Ok(())
}
