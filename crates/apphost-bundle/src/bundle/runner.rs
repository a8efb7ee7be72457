//! Bundle runner
//!
//! Parses the manifest once at startup, performs any extraction the manifest
//! requires, and then answers probe/locate queries for the rest of the
//! process lifetime. The bundle mapping is released before [`Runner::process`]
//! returns.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::extractor::Extractor;
use super::file_entry::FileEntry;
use super::header::Header;
use super::info::Info;
use super::manifest::Manifest;
use crate::config::ExtractionConfig;
use crate::error::Result;

/// Where an in-memory file lives inside the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbedFile {
    pub offset: i64,
    pub size: i64,
    pub compressed_size: i64,
}

/// Result of [`Runner::locate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedFile {
    /// Extracted files: the real path on disk. In-bundle files: a nominal
    /// path under the bundle directory that identifies the file but need not
    /// exist.
    pub path: PathBuf,
    pub extracted: bool,
}

/// A processed bundle: header, manifest, and extraction directory.
#[derive(Debug)]
pub struct Runner {
    info: Info,
    manifest: Manifest,
    extraction_path: Option<PathBuf>,
}

impl Runner {
    /// Read the manifest and extract (or verify) whatever must live on disk.
    pub fn process(info: Info, config: ExtractionConfig) -> Result<Self> {
        let mapped = info.map_bundle()?;
        let mut reader = mapped.reader(info.offset_in_file())?;
        reader.set_offset(info.manifest_offset() as i64)?;

        let manifest = Manifest::read(&mut reader, info.header())?;

        let extraction_path = if manifest.files_need_extraction() {
            let mut extractor = Extractor::new(
                info.header().bundle_id(),
                info.bundle_path(),
                &manifest,
                config,
            )?;
            Some(extractor.extract(&mut reader)?)
        } else {
            debug!("No files need extraction");
            None
        };

        info!(
            "Processed bundle {} ({} files)",
            info.bundle_path().display(),
            manifest.len()
        );

        Ok(Self {
            info,
            manifest,
            extraction_path,
        })
    }

    pub fn info(&self) -> &Info {
        &self.info
    }

    pub fn header(&self) -> &Header {
        self.info.header()
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Extraction directory, if any file needed extraction
    pub fn extraction_path(&self) -> Option<&Path> {
        self.extraction_path.as_deref()
    }

    /// Directory containing the bundle
    pub fn app_directory(&self) -> &Path {
        self.info.base_path()
    }

    /// First enabled entry with this relative path.
    pub fn probe(&self, relative_path: &str) -> Option<&FileEntry> {
        self.manifest
            .files()
            .iter()
            .find(|entry| !entry.is_disabled() && entry.matches(relative_path))
    }

    /// Container range of a file that can be read straight from the bundle.
    ///
    /// `None` for files that need extraction, are disabled, or are absent.
    pub fn probe_in_bundle(&self, relative_path: &str) -> Option<ProbedFile> {
        let entry = self.probe(relative_path)?;
        if entry.needs_extraction() {
            return None;
        }
        Some(ProbedFile {
            offset: entry.offset(),
            size: entry.size(),
            compressed_size: entry.compressed_size(),
        })
    }

    /// Full path of a bundled file and whether it was extracted.
    pub fn locate(&self, relative_path: &str) -> Option<LocatedFile> {
        let entry = self.probe(relative_path)?;
        let extracted = entry.needs_extraction();
        let dir = if extracted {
            self.extraction_path.as_deref()?
        } else {
            self.info.base_path()
        };
        Some(LocatedFile {
            path: dir.join(entry.relative_path()),
            extracted,
        })
    }

    /// Hide the entry for `relative_path` from later probes.
    ///
    /// Returns false when no enabled entry matches.
    pub fn disable(&mut self, relative_path: &str) -> bool {
        match self
            .manifest
            .files_mut()
            .iter_mut()
            .find(|entry| !entry.is_disabled() && entry.matches(relative_path))
        {
            Some(entry) => {
                debug!("Disabling bundled {}", relative_path);
                entry.disable();
                true
            }
            None => false,
        }
    }
}
