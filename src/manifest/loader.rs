//! Manifest loader (C4).
//!
//! Parses `_package/index.json` into the typed `Manifest`. The document is
//! tolerant of trailing commas and `//` line comments (hand-authored
//! manifests accumulate both); assets are heterogeneous JSON arrays of
//! length 7 or 8, coerced into the typed `Asset` struct, with unparsable
//! entries skipped behind a bounded warning log.

use super::{Asset, Check, FileAttr, Location, Manifest, Package, PostCommand, Profile, Variable};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::warn;

/// At most this many per-asset parse warnings are logged verbosely; after
/// that a single suppressed-count message closes out the batch (§4.1, §10.2).
const MAX_VERBOSE_ASSET_WARNINGS: usize = 3;

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("failed to read manifest document: {0}")]
    Io(#[from] std::io::Error),

    #[error("manifest document is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("profile {0} does not exist in this manifest")]
    ProfileOutOfRange(usize),

    #[error("manifest is missing a top-level '{0}' field")]
    MissingField(&'static str),
}

/// Strips `//` line comments and trailing commas before the closing
/// delimiter of an array or object, outside of string literals.
fn strip_comments_and_trailing_commas(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_string = false;
    let mut escape = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            if escape {
                escape = false;
            } else if c == '\\' {
                escape = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            '/' if chars.peek() == Some(&'/') => {
                // Skip to end of line.
                for c2 in chars.by_ref() {
                    if c2 == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            ',' => {
                // Look ahead past whitespace for a closing delimiter; if
                // found, this comma is trailing and is dropped.
                let mut lookahead = chars.clone();
                let mut only_whitespace = true;
                let mut closer = None;
                for c2 in lookahead.by_ref() {
                    if c2.is_whitespace() {
                        continue;
                    }
                    if c2 == ']' || c2 == '}' {
                        closer = Some(c2);
                    } else {
                        only_whitespace = false;
                    }
                    break;
                }
                if only_whitespace && closer.is_some() {
                    // drop the comma
                } else {
                    out.push(c);
                }
            }
            other => out.push(other),
        }
    }

    out
}

/// Parses the manifest document at `path` into typed entities.
pub fn load_manifest(path: &Path) -> Result<Manifest, ManifestError> {
    let raw = std::fs::read_to_string(path)?;
    parse_manifest(&raw)
}

/// Parses a manifest document already read into memory (tested directly,
/// and used by the package extractor when the document is read from the
/// archive rather than the filesystem).
pub fn parse_manifest(raw: &str) -> Result<Manifest, ManifestError> {
    let cleaned = strip_comments_and_trailing_commas(raw);
    let root: Value = serde_json::from_str(&cleaned)?;

    let package: Package = root
        .get("Package")
        .map(|v| serde_json::from_value(v.clone()))
        .transpose()?
        .unwrap_or_default();

    let profiles = parse_profiles(&root)?;
    let assets = parse_assets(root.get("Assets"));
    let checks: Vec<Check> = root
        .get("Checks")
        .map(|v| serde_json::from_value(v.clone()))
        .transpose()?
        .unwrap_or_default();
    let file_attrs: Vec<FileAttr> = root
        .get("FileAttrs")
        .map(|v| serde_json::from_value(v.clone()))
        .transpose()?
        .unwrap_or_default();
    let post_commands: Vec<PostCommand> = root
        .get("PostCommands")
        .map(|v| serde_json::from_value(v.clone()))
        .transpose()?
        .unwrap_or_default();

    Ok(Manifest {
        package,
        profiles,
        assets,
        checks,
        file_attrs,
        post_commands,
    })
}

/// `Variables` and `Locations` are each an array-of-arrays: outer index is
/// the profile (1-based), inner array is that profile's entries.
fn parse_profiles(root: &Value) -> Result<HashMap<usize, Profile>, ManifestError> {
    let mut profiles: HashMap<usize, Profile> = HashMap::new();

    if let Some(Value::Array(outer)) = root.get("Variables") {
        for (idx, inner) in outer.iter().enumerate() {
            let vars: Vec<Variable> = serde_json::from_value(inner.clone())?;
            profiles.entry(idx + 1).or_default().variables = vars;
        }
    }

    if let Some(Value::Array(outer)) = root.get("Locations") {
        for (idx, inner) in outer.iter().enumerate() {
            let locs: Vec<Location> = serde_json::from_value(inner.clone())?;
            profiles.entry(idx + 1).or_default().locations = locs;
        }
    }

    Ok(profiles)
}

/// Each asset is a heterogeneous 7-or-8-length array:
/// `[tags, opType, params, status, sourceLoc, targetLoc, sourcePath, targetPath?]`
fn parse_assets(value: Option<&Value>) -> Vec<Asset> {
    let Some(Value::Array(entries)) = value else {
        return Vec::new();
    };

    let suppressed = AtomicUsize::new(0);
    let mut assets = Vec::with_capacity(entries.len());

    for entry in entries {
        match parse_one_asset(entry) {
            Some(asset) => assets.push(asset),
            None => {
                let n = suppressed.fetch_add(1, Ordering::Relaxed) + 1;
                if n <= MAX_VERBOSE_ASSET_WARNINGS {
                    warn!("skipping unparsable asset tuple: {}", entry);
                } else if n == MAX_VERBOSE_ASSET_WARNINGS + 1 {
                    warn!("further asset parse errors will be suppressed");
                }
            }
        }
    }

    let total_suppressed = suppressed.load(Ordering::Relaxed);
    if total_suppressed > MAX_VERBOSE_ASSET_WARNINGS {
        warn!(
            "{} further asset parse errors suppressed",
            total_suppressed - MAX_VERBOSE_ASSET_WARNINGS
        );
    }

    assets
}

fn parse_one_asset(entry: &Value) -> Option<Asset> {
    let arr = entry.as_array()?;
    if arr.len() < 7 {
        return None;
    }

    let tags = coerce_string(&arr[0])?;
    let op_type = coerce_i64(&arr[1])?;
    let params = coerce_string(&arr[2])?;
    let status = coerce_i64(&arr[3])?;
    let source_loc = coerce_i64(&arr[4])?;
    let target_loc = coerce_i64(&arr[5])?;
    let source_path = coerce_string(&arr[6])?;
    let target_path = arr
        .get(7)
        .and_then(coerce_string)
        .unwrap_or_else(|| source_path.clone());

    Some(Asset {
        tags,
        op_type,
        params,
        status,
        source_loc,
        target_loc,
        source_path,
        target_path,
    })
}

fn coerce_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Null => Some(String::new()),
        _ => None,
    }
}

fn coerce_i64(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
