//! Bundle info and zero-copy access to the configuration files
//!
//! The bundle is memory-mapped only while it is being read: once to parse the
//! header, and once per [`Info::map`] of deps.json or runtimeconfig.json. Each
//! mapping is released when its guard is dropped.

use std::fs::File;
use std::ops::Deref;
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use tracing::debug;

use super::header::{Header, Location};
use super::reader::Reader;
use crate::error::{BundleError, Result};

/// A read-only mapping of the whole bundle file.
pub struct MappedBundle {
    mmap: Mmap,
}

impl MappedBundle {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| BundleError::Map {
            path: path.to_path_buf(),
            source: e,
        })?;
        // Safety: the mapping is read-only and private to this process. The
        // bundle is the running executable, which the OS keeps from being
        // truncated while it is mapped.
        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| BundleError::Map {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(Self { mmap })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.mmap
    }

    /// A reader over the container starting at `offset_in_file`.
    pub fn reader(&self, offset_in_file: u64) -> Result<Reader<'_>> {
        Reader::new(&self.mmap, offset_in_file)
    }
}

/// One of the two configuration files, borrowed from a live mapping.
///
/// Dropping the guard (or calling [`ConfigMapping::unmap`]) releases the mapping.
pub struct ConfigMapping {
    bundle: MappedBundle,
    start: usize,
    len: usize,
}

impl ConfigMapping {
    pub fn bytes(&self) -> &[u8] {
        &self.bundle.bytes()[self.start..self.start + self.len]
    }

    /// Release the mapping now instead of at the end of scope.
    pub fn unmap(self) {
        debug!("Unmapping bundled config file at {}", self.start);
        drop(self.bundle);
    }
}

impl Deref for ConfigMapping {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.bytes()
    }
}

/// Which configuration file a path names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFile {
    DepsJson,
    RuntimeConfigJson,
}

impl ConfigFile {
    fn suffix(self) -> &'static str {
        match self {
            ConfigFile::DepsJson => ".deps.json",
            ConfigFile::RuntimeConfigJson => ".runtimeconfig.json",
        }
    }
}

/// Header-level facts about a bundle.
#[derive(Debug, Clone)]
pub struct Info {
    bundle_path: PathBuf,
    base_path: PathBuf,
    header_offset: i64,
    offset_in_file: u64,
    manifest_offset: u64,
    header: Header,
}

impl Info {
    /// Read the header of a bundle whose container starts at the beginning of the file.
    pub fn open(bundle_path: impl Into<PathBuf>, header_offset: i64) -> Result<Self> {
        Self::open_at(bundle_path, header_offset, 0)
    }

    /// Read the header of a bundle whose container starts at `offset_in_file`.
    pub fn open_at(
        bundle_path: impl Into<PathBuf>,
        header_offset: i64,
        offset_in_file: u64,
    ) -> Result<Self> {
        let bundle_path = bundle_path.into();
        let base_path = bundle_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        let mapped = MappedBundle::open(&bundle_path)?;
        let mut reader = mapped.reader(offset_in_file)?;
        reader.set_offset(header_offset)?;
        let header = Header::read(&mut reader)?;
        let manifest_offset = reader.offset();

        debug!(
            "Opened bundle {} (header at {}, id {})",
            bundle_path.display(),
            header_offset,
            header.bundle_id()
        );

        Ok(Self {
            bundle_path,
            base_path,
            header_offset,
            offset_in_file,
            manifest_offset,
            header,
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn bundle_path(&self) -> &Path {
        &self.bundle_path
    }

    /// Directory containing the bundle
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn header_offset(&self) -> i64 {
        self.header_offset
    }

    pub fn offset_in_file(&self) -> u64 {
        self.offset_in_file
    }

    /// Container offset of the first manifest entry
    pub fn manifest_offset(&self) -> u64 {
        self.manifest_offset
    }

    pub fn deps_json_location(&self) -> &Location {
        self.header.deps_json_location()
    }

    pub fn runtimeconfig_json_location(&self) -> &Location {
        self.header.runtimeconfig_json_location()
    }

    /// Map the whole bundle for reading.
    pub fn map_bundle(&self) -> Result<MappedBundle> {
        MappedBundle::open(&self.bundle_path)
    }

    /// Logical path of a configuration file: `<bundle dir>/<bundle stem><suffix>`.
    pub fn config_path(&self, which: ConfigFile) -> PathBuf {
        let stem = self
            .bundle_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.base_path.join(format!("{}{}", stem, which.suffix()))
    }

    /// Which configuration file `path` names, if any.
    pub fn config_file_for(&self, path: &Path) -> Option<ConfigFile> {
        [ConfigFile::DepsJson, ConfigFile::RuntimeConfigJson]
            .into_iter()
            .find(|&which| self.config_path(which) == path)
    }

    fn location(&self, which: ConfigFile) -> &Location {
        match which {
            ConfigFile::DepsJson => self.deps_json_location(),
            ConfigFile::RuntimeConfigJson => self.runtimeconfig_json_location(),
        }
    }

    /// Map the bundle and borrow the bytes of deps.json or runtimeconfig.json.
    ///
    /// Returns `None` when `path` is not one of the two configuration files or
    /// the bundle does not embed it.
    pub fn map(&self, path: &Path) -> Result<Option<ConfigMapping>> {
        let Some(which) = self.config_file_for(path) else {
            return Ok(None);
        };
        let location = *self.location(which);
        if !location.is_present() {
            return Ok(None);
        }

        let bundle = self.map_bundle()?;
        let available = bundle.bytes().len() as u64;
        let Some(start) = file_range(self.offset_in_file, &location, available) else {
            let start = self.offset_in_file.saturating_add(location.offset.max(0) as u64);
            return Err(BundleError::Truncated {
                offset: location.offset.max(0) as u64,
                needed: location.size.max(0) as u64,
                remaining: available.saturating_sub(start),
            });
        };

        debug!("Mapped bundled {}", path.display());
        Ok(Some(ConfigMapping {
            bundle,
            start,
            len: location.size as usize,
        }))
    }

    /// Parse deps.json or runtimeconfig.json straight from the bundle.
    pub fn read_config_json(&self, path: &Path) -> Result<Option<serde_json::Value>> {
        let Some(mapping) = self.map(path)? else {
            return Ok(None);
        };
        let parsed = serde_json::from_slice::<serde_json::Value>(mapping.bytes());
        mapping.unmap();
        parsed.map(Some).map_err(|e| BundleError::Json {
            name: path.display().to_string(),
            source: e,
        })
    }
}

/// File offset of `location` when the whole range lies inside a file of
/// `available` bytes.
fn file_range(offset_in_file: u64, location: &Location, available: u64) -> Option<usize> {
    let offset = u64::try_from(location.offset).ok().filter(|&o| o > 0)?;
    let size = u64::try_from(location.size).ok()?;
    let start = offset_in_file.checked_add(offset)?;
    let end = start.checked_add(size)?;
    if end > available {
        return None;
    }
    usize::try_from(start).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_range_bounds() {
        let location = Location {
            offset: 100,
            size: 50,
        };
        assert_eq!(file_range(0, &location, 150), Some(100));
        assert_eq!(file_range(8, &location, 158), Some(108));
        assert_eq!(file_range(8, &location, 157), None);
    }

    #[test]
    fn test_file_range_rejects_overflow() {
        let huge = Location {
            offset: 100,
            size: i64::MAX,
        };
        assert_eq!(file_range(0, &huge, 200), None);
        assert_eq!(file_range(u64::MAX, &Location { offset: 1, size: 0 }, 200), None);

        let negative = Location {
            offset: -10,
            size: 5,
        };
        assert_eq!(file_range(0, &negative, 200), None);
    }
}
