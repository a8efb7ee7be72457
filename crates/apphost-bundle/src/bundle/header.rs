//! Bundle header
//!
//! ```text
//! uint32  major_version
//! uint32  minor_version
//! int32   num_embedded_files
//! string  bundle_id                   (7-bit length prefix)
//! --- v2 block (major >= 2) ---
//! int64   deps_json offset, size
//! int64   runtimeconfig_json offset, size
//! uint64  flags
//! ```

use serde::Serialize;
use tracing::debug;

use super::reader::{is_single_component, Reader};
use super::writer::write_path_string;
use crate::error::{BundleError, Result};

/// Major version written by this crate.
pub const BUNDLE_MAJOR_VERSION: u32 = 6;

/// Minor version written by this crate.
pub const BUNDLE_MINOR_VERSION: u32 = 0;

/// `(major, minor)` pairs this host can read.
pub const SUPPORTED_VERSIONS: &[(u32, u32)] = &[(2, 0), (6, 0)];

/// First major version carrying the v2 block.
pub const HEADER_V2_MAJOR_VERSION: u32 = 2;

/// First major version whose entries carry `compressed_size`.
pub const COMPRESSION_MAJOR_VERSION: u32 = 6;

/// Byte range of a file inside the container. `offset == 0` means absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Location {
    pub offset: i64,
    pub size: i64,
}

impl Location {
    pub fn is_present(&self) -> bool {
        self.offset != 0
    }

    fn read(reader: &mut Reader<'_>) -> Result<Self> {
        let offset = reader.read_i64()?;
        let size = reader.read_i64()?;
        Ok(Self { offset, size })
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.offset.to_le_bytes());
        out.extend_from_slice(&self.size.to_le_bytes());
    }
}

/// Header flag bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct HeaderFlags(pub u64);

impl HeaderFlags {
    pub const NONE: HeaderFlags = HeaderFlags(0);

    /// Legacy layout: every embedded file is extracted to disk.
    pub const NETCOREAPP3_COMPAT_MODE: HeaderFlags = HeaderFlags(1);

    pub fn contains(self, other: HeaderFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

/// Parsed bundle header. Immutable once read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Header {
    major_version: u32,
    minor_version: u32,
    num_embedded_files: i32,
    bundle_id: String,
    deps_json: Location,
    runtimeconfig_json: Location,
    flags: HeaderFlags,
}

impl Header {
    pub(crate) fn new(
        major_version: u32,
        minor_version: u32,
        num_embedded_files: i32,
        bundle_id: String,
        deps_json: Location,
        runtimeconfig_json: Location,
        flags: HeaderFlags,
    ) -> Self {
        Self {
            major_version,
            minor_version,
            num_embedded_files,
            bundle_id,
            deps_json,
            runtimeconfig_json,
            flags,
        }
    }

    pub fn is_compatible(major_version: u32, minor_version: u32) -> bool {
        SUPPORTED_VERSIONS.contains(&(major_version, minor_version))
    }

    /// Parse the header at the reader's current position.
    pub fn read(reader: &mut Reader<'_>) -> Result<Self> {
        let major_version = reader.read_u32()?;
        let minor_version = reader.read_u32()?;
        let num_embedded_files = reader.read_i32()?;

        if !Self::is_compatible(major_version, minor_version) {
            return Err(BundleError::UnsupportedVersion {
                major: major_version,
                minor: minor_version,
            });
        }
        if num_embedded_files <= 0 {
            return Err(BundleError::InvalidFileCount(num_embedded_files));
        }

        let id_position = reader.offset();
        let bundle_id = reader.read_path_string()?;
        if !is_single_component(&bundle_id) {
            return Err(BundleError::UnsafePath {
                position: id_position,
                path: bundle_id,
            });
        }

        let (deps_json, runtimeconfig_json, flags) = if major_version >= HEADER_V2_MAJOR_VERSION {
            let deps_json = Location::read(reader)?;
            let runtimeconfig_json = Location::read(reader)?;
            let flags = HeaderFlags(reader.read_u64()?);
            (deps_json, runtimeconfig_json, flags)
        } else {
            (Location::default(), Location::default(), HeaderFlags::NONE)
        };

        debug!(
            "Bundle header {}.{}: {} files, id {}, flags {:#x}",
            major_version, minor_version, num_embedded_files, bundle_id, flags.0
        );

        Ok(Self {
            major_version,
            minor_version,
            num_embedded_files,
            bundle_id,
            deps_json,
            runtimeconfig_json,
            flags,
        })
    }

    /// Serialize in the on-disk layout.
    pub fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        out.extend_from_slice(&self.major_version.to_le_bytes());
        out.extend_from_slice(&self.minor_version.to_le_bytes());
        out.extend_from_slice(&self.num_embedded_files.to_le_bytes());
        write_path_string(out, &self.bundle_id)?;
        if self.major_version >= HEADER_V2_MAJOR_VERSION {
            self.deps_json.write(out);
            self.runtimeconfig_json.write(out);
            out.extend_from_slice(&self.flags.0.to_le_bytes());
        }
        Ok(())
    }

    pub fn major_version(&self) -> u32 {
        self.major_version
    }

    pub fn minor_version(&self) -> u32 {
        self.minor_version
    }

    pub fn num_embedded_files(&self) -> i32 {
        self.num_embedded_files
    }

    /// Opaque identifier partitioning the extraction cache.
    pub fn bundle_id(&self) -> &str {
        &self.bundle_id
    }

    pub fn deps_json_location(&self) -> &Location {
        &self.deps_json
    }

    pub fn runtimeconfig_json_location(&self) -> &Location {
        &self.runtimeconfig_json
    }

    pub fn flags(&self) -> HeaderFlags {
        self.flags
    }

    pub fn is_netcoreapp3_compat_mode(&self) -> bool {
        self.flags.contains(HeaderFlags::NETCOREAPP3_COMPAT_MODE)
    }
}
