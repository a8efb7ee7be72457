//! Bundle writer
//!
//! Produces a bundle from a host executable and a set of files:
//!
//! ```text
//! ┌─────────────────────────┐
//! │  host executable        │  ← may contain the marker placeholder
//! ├─────────────────────────┤
//! │  file data              │  ← raw or raw-deflate, assemblies 16-byte aligned
//! ├─────────────────────────┤
//! │  header                 │  ← offset patched into the marker
//! ├─────────────────────────┤
//! │  manifest entries       │
//! └─────────────────────────┘
//! ```

use std::fs;
use std::io::Write;
use std::path::Path;

use data_encoding::BASE64URL_NOPAD;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};
use tracing::debug;

use super::file_entry::{FileEntry, FileType};
use super::header::{
    Header, HeaderFlags, Location, BUNDLE_MAJOR_VERSION, BUNDLE_MINOR_VERSION,
    COMPRESSION_MAJOR_VERSION,
};
use super::marker;
use super::reader::{is_contained_path, is_single_component, normalize_separators, PATH_MAX};
use crate::error::{BundleError, Result};

/// Alignment of assembly data within the container.
const ASSEMBLY_ALIGNMENT: usize = 16;

/// Length of generated bundle ids.
const BUNDLE_ID_LENGTH: usize = 12;

/// Write a path as a 7-bit length prefix followed by UTF-8 with `/` separators.
pub fn write_path_string(out: &mut Vec<u8>, path: &str) -> Result<()> {
    let portable = path.replace('\\', "/");
    let bytes = portable.as_bytes();
    if bytes.is_empty() || bytes.len() > PATH_MAX {
        return Err(BundleError::InvalidInput {
            path: path.to_string(),
            reason: format!("path length must be between 1 and {} bytes", PATH_MAX),
        });
    }

    let mut length = bytes.len();
    while length >= 0x80 {
        out.push((length as u8 & 0x7F) | 0x80);
        length >>= 7;
    }
    out.push(length as u8);
    out.extend_from_slice(bytes);
    Ok(())
}

struct BundleFile {
    relative_path: String,
    file_type: FileType,
    data: Vec<u8>,
}

/// A finished bundle image.
#[derive(Debug, Clone)]
pub struct WrittenBundle {
    pub bytes: Vec<u8>,
    pub header_offset: i64,
    pub header: Header,
    pub entries: Vec<FileEntry>,
}

/// Builds a bundle from a host executable and embedded files.
pub struct BundleWriter {
    major_version: u32,
    minor_version: u32,
    bundle_id: Option<String>,
    flags: HeaderFlags,
    compress: bool,
    files: Vec<BundleFile>,
}

impl Default for BundleWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl BundleWriter {
    pub fn new() -> Self {
        Self {
            major_version: BUNDLE_MAJOR_VERSION,
            minor_version: BUNDLE_MINOR_VERSION,
            bundle_id: None,
            flags: HeaderFlags::NONE,
            compress: false,
            files: Vec::new(),
        }
    }

    pub fn with_version(mut self, major_version: u32, minor_version: u32) -> Self {
        self.major_version = major_version;
        self.minor_version = minor_version;
        self
    }

    /// Use a fixed bundle id instead of one derived from the contents.
    pub fn with_bundle_id(mut self, bundle_id: impl Into<String>) -> Self {
        self.bundle_id = Some(bundle_id.into());
        self
    }

    pub fn with_flags(mut self, flags: HeaderFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Deflate entries when that makes them smaller. Config files stay raw.
    pub fn with_compression(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    pub fn add_file(
        &mut self,
        relative_path: impl Into<String>,
        file_type: FileType,
        data: impl Into<Vec<u8>>,
    ) -> &mut Self {
        self.files.push(BundleFile {
            relative_path: relative_path.into(),
            file_type,
            data: data.into(),
        });
        self
    }

    /// Deterministic id: URL-safe base64 of a SHA-256 over paths and contents.
    fn generate_bundle_id(&self) -> String {
        let mut hasher = Sha256::new();
        for file in &self.files {
            hasher.update(file.relative_path.as_bytes());
            hasher.update([0u8]);
            hasher.update(&file.data);
        }
        let digest = hasher.finalize();
        let mut id = BASE64URL_NOPAD.encode(&digest);
        id.truncate(BUNDLE_ID_LENGTH);
        id
    }

    fn should_compress(&self, file_type: FileType) -> bool {
        self.compress
            && self.major_version >= COMPRESSION_MAJOR_VERSION
            && !matches!(file_type, FileType::DepsJson | FileType::RuntimeConfigJson)
    }

    /// Append the files, header and manifest to `host`.
    pub fn write(&self, host: &[u8]) -> Result<WrittenBundle> {
        if host.is_empty() {
            return Err(BundleError::InvalidInput {
                path: "<host>".to_string(),
                reason: "host executable is empty".to_string(),
            });
        }
        if self.files.is_empty() {
            return Err(BundleError::InvalidInput {
                path: "<bundle>".to_string(),
                reason: "no files to bundle".to_string(),
            });
        }
        for file in &self.files {
            if !is_contained_path(&normalize_separators(&file.relative_path)) {
                return Err(BundleError::InvalidInput {
                    path: file.relative_path.clone(),
                    reason: "path must be relative and stay inside the bundle".to_string(),
                });
            }
        }
        if let Some(id) = &self.bundle_id {
            if !is_single_component(&normalize_separators(id)) {
                return Err(BundleError::InvalidInput {
                    path: id.clone(),
                    reason: "bundle id must be a single directory name".to_string(),
                });
            }
        }

        let mut out = host.to_vec();
        let mut entries = Vec::with_capacity(self.files.len());
        let mut deps_json = Location::default();
        let mut runtimeconfig_json = Location::default();
        let force_extraction = self.flags.contains(HeaderFlags::NETCOREAPP3_COMPAT_MODE);

        for file in &self.files {
            if file.file_type == FileType::Assembly {
                let padding =
                    (ASSEMBLY_ALIGNMENT - out.len() % ASSEMBLY_ALIGNMENT) % ASSEMBLY_ALIGNMENT;
                out.resize(out.len() + padding, 0);
            }

            let offset = out.len() as i64;
            let size = file.data.len() as i64;
            let mut compressed_size = 0i64;

            if self.should_compress(file.file_type) {
                let compressed = deflate(&file.data)
                    .map_err(|e| BundleError::io(&file.relative_path, e))?;
                if compressed.len() < file.data.len() {
                    compressed_size = compressed.len() as i64;
                    out.extend_from_slice(&compressed);
                } else {
                    out.extend_from_slice(&file.data);
                }
            } else {
                out.extend_from_slice(&file.data);
            }

            let location = Location { offset, size };
            match file.file_type {
                FileType::DepsJson if !deps_json.is_present() => deps_json = location,
                FileType::RuntimeConfigJson if !runtimeconfig_json.is_present() => {
                    runtimeconfig_json = location
                }
                _ => {}
            }

            entries.push(FileEntry::new(
                offset,
                size,
                compressed_size,
                file.file_type,
                &file.relative_path,
                force_extraction,
            ));
        }

        let bundle_id = self
            .bundle_id
            .clone()
            .unwrap_or_else(|| self.generate_bundle_id());
        let header = Header::new(
            self.major_version,
            self.minor_version,
            entries.len() as i32,
            bundle_id,
            deps_json,
            runtimeconfig_json,
            self.flags,
        );

        let header_offset = out.len() as i64;
        header.write(&mut out)?;
        for entry in &entries {
            entry.write(&mut out, self.major_version)?;
        }

        if marker::patch_header_offset(&mut out[..host.len()], header_offset) {
            debug!("Patched bundle marker with header offset {}", header_offset);
        }

        debug!(
            "Wrote bundle {} ({} files, {} bytes)",
            header.bundle_id(),
            entries.len(),
            out.len()
        );

        Ok(WrittenBundle {
            bytes: out,
            header_offset,
            header,
            entries,
        })
    }

    /// Write the bundle to `output`, marked executable on Unix.
    pub fn write_to_path(&self, host: &[u8], output: &Path) -> Result<WrittenBundle> {
        let bundle = self.write(host)?;
        fs::write(output, &bundle.bytes).map_err(|e| BundleError::io(output, e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(output, fs::Permissions::from_mode(0o755))
                .map_err(|e| BundleError::io(output, e))?;
        }
        Ok(bundle)
    }
}

fn deflate(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(data)?;
    encoder.finish()
}
