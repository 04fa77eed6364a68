//! Validator (C6).
//!
//! Runs the manifest's declared checks (§4.3) against the resolved
//! locations: file-exists (with optional checksum verification), the
//! stubbed free-size check, and the restricted-path check.

use crate::hash::{digest_eq, hash_file, Algorithm};
use crate::manifest::{Check, CheckType, Location};
use crate::resolver::LocationResolver;
use std::path::Path;

/// Outcome of a single check.
#[derive(Debug)]
pub struct CheckResult {
    pub passed: bool,
    pub message: Option<String>,
}

/// Runs every check in `checks` against `locations`, via `resolver`.
/// Returns `(pass, error_report)` where `error_report` concatenates every
/// failure with its expected-vs-actual detail (§4.3).
pub fn run_checks(checks: &[Check], locations: &[Location], resolver: &LocationResolver) -> (bool, String) {
    let mut failures = Vec::new();

    for check in checks {
        let result = run_one_check(check, locations, resolver);
        if !result.passed {
            failures.push(result.message.unwrap_or_else(|| "check failed".to_string()));
        }
    }

    (failures.is_empty(), failures.join("\n"))
}

fn run_one_check(check: &Check, locations: &[Location], resolver: &LocationResolver) -> CheckResult {
    match check.kind() {
        Some(CheckType::FileExists) => file_exists_check(check, locations, resolver),
        Some(CheckType::FreeSize) => CheckResult {
            passed: true,
            message: None,
        },
        Some(CheckType::NoRestrictedPath) => restricted_path_check(check, locations, resolver),
        None => CheckResult {
            passed: false,
            message: Some(format!("unknown check type {}", check.check_type)),
        },
    }
}

fn file_exists_check(check: &Check, locations: &[Location], resolver: &LocationResolver) -> CheckResult {
    let Some(loc) = locations.get(check.loc as usize) else {
        return CheckResult {
            passed: false,
            message: Some(format!("check references unknown location {}", check.loc)),
        };
    };

    let dir = match resolver.get_directory_path(loc) {
        Ok(d) => d,
        Err(e) => {
            return CheckResult {
                passed: false,
                message: Some(format!("{}", e)),
            }
        }
    };

    let file = check.file.clone().unwrap_or_default();
    let target = dir.join(crate::paths::to_linux_path(&file));
    let exists = target.exists();
    let predicate = if check.inverted { !exists } else { exists };

    if !predicate {
        return CheckResult {
            passed: false,
            message: Some(custom_or_default(
                check,
                &format!("expected file {} (inverted={})", target.display(), check.inverted),
            )),
        };
    }

    // Checksum verification only applies when the predicate matched on
    // existence (not on the inverted-missing branch).
    let checksums = check.checksum_list();
    if exists && !checksums.is_empty() {
        return match verify_checksums(&target, &checksums) {
            Ok(()) => CheckResult {
                passed: true,
                message: None,
            },
            Err(detail) => CheckResult {
                passed: false,
                message: Some(custom_or_default(check, &detail)),
            },
        };
    }

    CheckResult {
        passed: true,
        message: None,
    }
}

fn verify_checksums(path: &Path, expected: &[&str]) -> Result<(), String> {
    for digest in expected {
        let Some(algorithm) = Algorithm::from_digest_len(digest) else {
            continue;
        };
        let actual = hash_file(path, algorithm).map_err(|e| e.to_string())?;
        if digest_eq(digest, &actual) {
            return Ok(());
        }
    }

    let actual_md5 = hash_file(path, Algorithm::Md5).ok();
    let actual_sha1 = hash_file(path, Algorithm::Sha1).ok();
    Err(format!(
        "checksum mismatch for {}: expected one of [{}], got md5={:?} sha1={:?}",
        path.display(),
        expected.join(", "),
        actual_md5,
        actual_sha1
    ))
}

fn restricted_path_check(check: &Check, locations: &[Location], resolver: &LocationResolver) -> CheckResult {
    let Some(loc) = locations.get(check.loc as usize) else {
        return CheckResult {
            passed: false,
            message: Some(format!("check references unknown location {}", check.loc)),
        };
    };

    let resolved = resolver.resolve_path(loc);
    let is_restricted = resolved.to_lowercase().contains("program files");
    let predicate = if check.inverted { is_restricted } else { !is_restricted };

    if predicate {
        CheckResult {
            passed: true,
            message: None,
        }
    } else {
        CheckResult {
            passed: false,
            message: Some(custom_or_default(
                check,
                &format!("restricted path check failed for {}", resolved),
            )),
        }
    }
}

fn custom_or_default(check: &Check, default: &str) -> String {
    check.custom_message.clone().unwrap_or_else(|| default.to_string())
}
