//! Archive codec adapter (C2).
//!
//! Wraps the Bethesda archive (BSA) format behind the fixed surface named
//! in §4.5: open/close, extract-to-bytes, exists-check, entry count, and
//! writing a fresh archive from a staged directory. The underlying codec
//! is `ba2::tes4` (the teacher's choice in `bsa/reader.rs`/`bsa/writer.rs`);
//! this module's job is the narrow trait seam (§12.1) so the rest of the
//! engine never touches `ba2` directly.
//!
//! The `.mpi` package itself is opened through this same adapter (§6):
//! its on-disk format is the BSA container, version-tagged 104.

pub mod reader_cache;
pub mod writer;

pub use reader_cache::ArchiveReadCache;
pub use writer::WriteArchiveCollector;

use ba2::tes4::{Archive, ArchiveFlags, ArchiveKey, ArchiveOptions, ArchiveTypes, Directory, DirectoryKey, File as Ba2File, FileCompressionOptions, Version};
use ba2::{ByteSlice, CompressableFrom, Reader};
use anyhow::{bail, Context, Result};
use flate2::bufread::DeflateDecoder;
use std::collections::HashMap;
use std::fs;
use std::io::{BufWriter, Read};
use std::path::Path;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

/// Version tags recognized by the codec (§4.5).
pub const VERSION_TES4: u32 = 103;
pub const VERSION_FO3_FNV: u32 = 104;
pub const VERSION_SSE: u32 = 105;

fn version_from_tag(tag: u32) -> Version {
    match tag {
        103 => Version::v103,
        105 => Version::v105,
        _ => Version::v104,
    }
}

/// Default content-type inference table (§10.4/§4.7), expanded to the
/// full closed enumeration named in §4.5.
pub fn infer_types_from_name(name: &str) -> ArchiveTypes {
    let lower = name.to_lowercase();
    if lower.contains("meshes") {
        ArchiveTypes::MESHES
    } else if lower.contains("textures") {
        ArchiveTypes::TEXTURES
    } else if lower.contains("menuvoices") {
        ArchiveTypes::MENUS | ArchiveTypes::VOICES
    } else if lower.contains("voices") {
        ArchiveTypes::VOICES
    } else if lower.contains("sound") {
        ArchiveTypes::SOUNDS
    } else if lower.contains("main") {
        ArchiveTypes::MISC
    } else {
        ArchiveTypes::MISC
    }
}

/// The default flag set named in §4.7 when a write-archive location lacks
/// explicit flags.
pub fn default_write_flags() -> ArchiveFlags {
    ArchiveFlags::DIRECTORY_STRINGS
        | ArchiveFlags::FILE_STRINGS
        | ArchiveFlags::COMPRESSED
        | ArchiveFlags::RETAIN_DIRECTORY_NAMES
        | ArchiveFlags::RETAIN_FILE_NAMES
        | ArchiveFlags::RETAIN_FILE_NAME_OFFSETS
}

/// A read handle over one opened BSA archive. Implements §4.5's
/// `extractFile`/`fileExists`/`fileCount` over the fixed, already-loaded
/// directory table; the underlying `ba2` reader is safe to query
/// concurrently (it owns no mutable state per call), satisfying §4.6's
/// "callable concurrently on one handle" requirement.
pub struct Ba2Archive {
    archive: Archive<'static>,
    options: ba2::tes4::ArchiveOptions,
}

impl Ba2Archive {
    /// Opens an archive from disk. The codec's `open`/`close` pair (§4.5)
    /// collapses to RAII here: disposal happens on drop.
    pub fn open(path: &Path) -> Result<Self> {
        let (archive, options): (Archive<'static>, _) = Archive::read(path)
            .with_context(|| format!("failed to open archive: {}", path.display()))?;
        Ok(Self { archive, options })
    }

    /// Entry count across all directories (§4.5 `fileCount`).
    pub fn file_count(&self) -> usize {
        self.archive.iter().map(|(_, dir)| dir.len()).sum()
    }

    /// Case-insensitive existence check (§4.5 `fileExists`).
    pub fn file_exists(&self, entry_path: &str) -> bool {
        self.find(entry_path).is_some()
    }

    /// Extracts a named entry to an owned byte buffer (§4.5 `extractFile`
    /// + `freeData`, collapsed: the returned `Vec<u8>` is already the
    /// managed, owned copy the codec contract requires).
    pub fn extract_file(&self, entry_path: &str) -> Result<Vec<u8>> {
        let (_, file) = self
            .find(entry_path)
            .with_context(|| format!("entry not found in archive: {}", entry_path))?;

        let compression_options: FileCompressionOptions = (&self.options).into();
        let data = if file.is_decompressed() {
            file.as_bytes().to_vec()
        } else {
            file.decompress(&compression_options)?.as_bytes().to_vec()
        };
        Ok(data)
    }

    /// Lists every entry path (backslash-joined, as stored).
    pub fn entry_paths(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(self.file_count());
        for (dir_key, dir) in self.archive.iter() {
            let dir_name = String::from_utf8_lossy(dir_key.name().as_bytes()).to_string();
            for (file_key, _) in dir.iter() {
                let file_name = String::from_utf8_lossy(file_key.name().as_bytes()).to_string();
                let full = if dir_name.is_empty() || dir_name == "." {
                    file_name
                } else {
                    format!("{}\\{}", dir_name, file_name)
                };
                out.push(full);
            }
        }
        out
    }

    fn find(&self, entry_path: &str) -> Option<(String, ba2::tes4::File<'_>)> {
        let normalized = entry_path.replace('/', "\\");
        let (dir_name, file_name) = match normalized.rfind('\\') {
            Some(idx) => (&normalized[..idx], &normalized[idx + 1..]),
            None => ("", normalized.as_str()),
        };

        for (dir_key, dir) in self.archive.iter() {
            let current_dir = String::from_utf8_lossy(dir_key.name().as_bytes());
            if current_dir.eq_ignore_ascii_case(dir_name) {
                for (file_key, file) in dir.iter() {
                    let current_file = String::from_utf8_lossy(file_key.name().as_bytes());
                    if current_file.eq_ignore_ascii_case(file_name) {
                        return Some((entry_path.to_string(), file));
                    }
                }
            }
        }
        None
    }
}

/// Write side of the codec surface (§4.5): `create`/`setArchiveFlags`/
/// `setArchiveTypes`/`addFile`/`write`.
pub struct ArchiveWriter {
    files: HashMap<String, HashMap<String, Vec<u8>>>,
    flags: ArchiveFlags,
    types: ArchiveTypes,
}

impl ArchiveWriter {
    pub fn create() -> Self {
        Self {
            files: HashMap::new(),
            flags: default_write_flags(),
            types: ArchiveTypes::empty(),
        }
    }

    pub fn set_archive_flags(&mut self, flags: ArchiveFlags) {
        self.flags = flags;
    }

    pub fn set_archive_types(&mut self, types: ArchiveTypes) {
        self.types = types;
    }

    /// `addFile(h, dir, name, bytes)` — directory and file name are
    /// expected pre-split and lowercased by the caller (§4.7).
    pub fn add_file(&mut self, dir: &str, name: &str, bytes: Vec<u8>) {
        self.files
            .entry(dir.to_string())
            .or_default()
            .insert(name.to_string(), bytes);
    }

    pub fn is_empty(&self) -> bool {
        self.files.values().all(|d| d.is_empty())
    }

    /// `write(h, outputPath, versionTag)`. Takes `&self` (the codec's
    /// `addFile`/`write` surface, §4.5, is never consuming) rather than
    /// taking ownership.
    pub fn write(&self, output_path: &Path, version_tag: u32) -> Result<()> {
        if self.is_empty() {
            bail!("cannot write an empty archive: {}", output_path.display());
        }

        let version = version_from_tag(version_tag);
        let should_compress = self.flags.contains(ArchiveFlags::COMPRESSED);

        let mut archive = Archive::new();
        for (dir_path, entries) in &self.files {
            let mut directory = Directory::default();
            for (file_name, data) in entries {
                let uncompressed = Ba2File::from_decompressed(data.clone().into_boxed_slice());
                let file = if should_compress {
                    let opts = FileCompressionOptions::builder().version(version).build();
                    uncompressed
                        .compress(&opts)
                        .with_context(|| format!("failed to compress {}/{}", dir_path, file_name))?
                } else {
                    uncompressed
                };
                directory.insert(DirectoryKey::from(file_name.as_bytes()), file);
            }
            archive.insert(ArchiveKey::from(dir_path.as_bytes()), directory);
        }

        let options = ArchiveOptions::builder()
            .version(version)
            .flags(self.flags)
            .types(self.types)
            .build();

        if let Some(parent) = output_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create parent dir for {}", output_path.display()))?;
        }

        let file = fs::File::create(output_path)
            .with_context(|| format!("failed to create archive file: {}", output_path.display()))?;
        let mut writer = BufWriter::new(file);
        archive
            .write(&mut writer, &options)
            .with_context(|| format!("failed to write archive: {}", output_path.display()))?;

        Ok(())
    }
}

impl Default for ArchiveWriter {
    fn default() -> Self {
        Self::create()
    }
}

/// Zlib-in-zlib quirk (§9): a payload extracted from this archive format
/// may itself begin with a raw zlib header (`78 9C`) wrapping a second,
/// inner deflate stream. When that's the case the real payload is the
/// raw-deflate body past the 2-byte header, not the bytes the codec
/// already decompressed for us. Bounded to a 30-second decode so a
/// pathological stream can't hang the worker; falls back to the original
/// bytes on timeout or decode failure, since this is a narrow format quirk
/// and not a general decompression guarantee.
pub fn strip_zlib_in_zlib_quirk(data: Vec<u8>) -> Vec<u8> {
    if data.len() < 2 || data[0] != 0x78 || data[1] != 0x9C {
        return data;
    }

    let body = data[2..].to_vec();
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut decoder = DeflateDecoder::new(&body[..]);
        let mut out = Vec::new();
        let _ = tx.send(decoder.read_to_end(&mut out).map(|_| out));
    });

    match rx.recv_timeout(Duration::from_secs(30)) {
        Ok(Ok(decoded)) => decoded,
        _ => data,
    }
}
