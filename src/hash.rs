//! Content-hash helper (C1).
//!
//! Reference-file checksums in the manifest are given as uppercase hex
//! digests without an algorithm tag: a 32-character digest is MD5, a
//! 40-character digest is SHA-1. Streaming reads keep memory flat for large
//! reference files (esm/esp/bsa).

use anyhow::{Context, Result};
use sha1::Digest;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

const CHUNK_SIZE: usize = 1024 * 1024;

/// The two digest algorithms this format dispatches between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    Md5,
    Sha1,
}

impl Algorithm {
    /// Chooses an algorithm from the expected digest's hex length: 32 for
    /// MD5, 40 for SHA-1. Any other length has no defined algorithm.
    pub fn from_digest_len(digest: &str) -> Option<Self> {
        match digest.trim().len() {
            32 => Some(Algorithm::Md5),
            40 => Some(Algorithm::Sha1),
            _ => None,
        }
    }
}

/// Streaming digest of a file's contents under the given algorithm,
/// returned as a lowercase hex string.
pub fn hash_file(path: &Path, algorithm: Algorithm) -> Result<String> {
    let file = File::open(path)
        .with_context(|| format!("failed to open file for hashing: {}", path.display()))?;
    let mut reader = BufReader::with_capacity(CHUNK_SIZE, file);
    let mut buf = vec![0u8; CHUNK_SIZE];

    match algorithm {
        Algorithm::Md5 => {
            let mut ctx = md5::Context::new();
            loop {
                let n = reader
                    .read(&mut buf)
                    .with_context(|| format!("failed to read file: {}", path.display()))?;
                if n == 0 {
                    break;
                }
                ctx.consume(&buf[..n]);
            }
            Ok(format!("{:x}", ctx.compute()))
        }
        Algorithm::Sha1 => {
            let mut hasher = sha1::Sha1::new();
            loop {
                let n = reader
                    .read(&mut buf)
                    .with_context(|| format!("failed to read file: {}", path.display()))?;
                if n == 0 {
                    break;
                }
                hasher.update(&buf[..n]);
            }
            Ok(hex_lower(&hasher.finalize()))
        }
    }
}

/// Digest of an in-memory buffer, used for small embedded payloads.
pub fn hash_bytes(data: &[u8], algorithm: Algorithm) -> String {
    match algorithm {
        Algorithm::Md5 => format!("{:x}", md5::compute(data)),
        Algorithm::Sha1 => {
            let mut hasher = sha1::Sha1::new();
            hasher.update(data);
            hex_lower(&hasher.finalize())
        }
    }
}

fn hex_lower(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{:02x}", b));
    }
    out
}

/// True iff `actual` case-insensitively equals `expected`, both hex.
pub fn digest_eq(expected: &str, actual: &str) -> bool {
    expected.trim().eq_ignore_ascii_case(actual.trim())
}
