//! Two-phase extraction of embedded files
//!
//! Files are staged into a per-process working directory and then renamed
//! onto the shared extraction directory in one step:
//!
//! ```text
//! <base>/<host name>/<bundle id>     final extraction directory
//! <base>/<host name>/<pid in hex>    working directory for this attempt
//! ```
//!
//! The rename is the only synchronization between concurrent processes. A
//! process that loses the race discards its own copy and reuses the winner's.
//! An existing extraction directory is verified and any missing file is
//! re-extracted individually.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use flate2::{Decompress, FlushDecompress, Status};
use tracing::{debug, info, warn};

use super::file_entry::FileEntry;
use super::manifest::Manifest;
use super::reader::{is_contained_path, is_single_component, Reader};
use crate::config::ExtractionConfig;
use crate::dir_utils::{self, RenameOutcome};
use crate::error::{BundleError, Result};

/// Size of the scratch buffer the inflate loop drains into.
const INFLATE_BUFFER_SIZE: usize = 8 * 1024;

/// Progress of an extraction attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractorState {
    Idle,
    WorkingDirCreated,
    FilesWritten,
    Committed,
    Aborted,
}

/// Drives extraction of one bundle's manifest.
pub struct Extractor<'m> {
    manifest: &'m Manifest,
    config: ExtractionConfig,
    extraction_dir: PathBuf,
    working_extraction_dir: PathBuf,
    state: ExtractorState,
}

impl<'m> Extractor<'m> {
    /// Compute the extraction directories for `bundle_path` and `bundle_id`.
    pub fn new(
        bundle_id: &str,
        bundle_path: &Path,
        manifest: &'m Manifest,
        config: ExtractionConfig,
    ) -> Result<Self> {
        let base_dir = config.resolve_base_dir()?;
        let extraction_dir = extraction_dir_for(&base_dir, bundle_path, bundle_id)?;
        let working_extraction_dir = working_dir_for(&extraction_dir, config.process_id)?;

        debug!(
            "Extraction directory {}, working directory {}",
            extraction_dir.display(),
            working_extraction_dir.display()
        );

        Ok(Self {
            manifest,
            config,
            extraction_dir,
            working_extraction_dir,
            state: ExtractorState::Idle,
        })
    }

    pub fn extraction_dir(&self) -> &Path {
        &self.extraction_dir
    }

    pub fn working_extraction_dir(&self) -> &Path {
        &self.working_extraction_dir
    }

    pub fn state(&self) -> ExtractorState {
        self.state
    }

    /// Extract into a fresh directory, or verify and repair an existing one.
    ///
    /// Returns the final extraction directory.
    pub fn extract(&mut self, reader: &mut Reader<'_>) -> Result<PathBuf> {
        if self.extraction_dir.is_dir() {
            self.verify_recover_extraction(reader)?;
        } else {
            self.extract_new(reader)?;
        }
        Ok(self.extraction_dir.clone())
    }

    /// Create the working directory and its parents.
    pub fn begin(&mut self) -> Result<()> {
        dir_utils::create_directory_tree(&self.working_extraction_dir).map_err(|e| {
            self.state = ExtractorState::Aborted;
            BundleError::io(&self.working_extraction_dir, e)
        })?;
        self.state = ExtractorState::WorkingDirCreated;
        Ok(())
    }

    /// Write one entry into the working directory.
    pub fn extract_file(&mut self, entry: &FileEntry, reader: &mut Reader<'_>) -> Result<()> {
        let result = self.write_entry(entry, reader);
        if result.is_err() {
            self.state = ExtractorState::Aborted;
        }
        result
    }

    fn write_entry(&self, entry: &FileEntry, reader: &mut Reader<'_>) -> Result<()> {
        let path = entry_path(&self.working_extraction_dir, entry.relative_path())?;
        if let Some(parent) = path.parent() {
            dir_utils::create_directory_tree(parent).map_err(|e| BundleError::io(parent, e))?;
        }

        let mut file = File::create(&path).map_err(|e| BundleError::io(&path, e))?;
        reader.set_offset(entry.offset())?;

        let written = if entry.is_compressed() {
            let input = reader.read_direct(entry.compressed_size() as usize)?;
            inflate_into(input, &mut file, entry.size(), &path)?
        } else {
            let data = reader.read_direct(entry.size() as usize)?;
            file.write_all(data).map_err(|e| BundleError::io(&path, e))?;
            data.len() as u64
        };

        if written != entry.size() as u64 {
            return Err(BundleError::SizeMismatch {
                path,
                expected: entry.size(),
                actual: written,
            });
        }

        file.sync_all().map_err(|e| BundleError::io(&path, e))?;
        debug!("Extracted {} ({} bytes)", entry.relative_path(), written);
        Ok(())
    }

    /// Rename the working directory onto the extraction directory.
    pub fn commit_dir(&mut self) -> Result<()> {
        let outcome = dir_utils::rename_with_retries(
            &self.working_extraction_dir,
            &self.extraction_dir,
            &self.config.retry,
            |path| path.is_dir(),
        );

        match outcome {
            RenameOutcome::Renamed => {
                info!("Extraction committed to {}", self.extraction_dir.display());
            }
            RenameOutcome::DestinationExists => {
                info!(
                    "Extraction {} completed by a concurrent process, discarding {}",
                    self.extraction_dir.display(),
                    self.working_extraction_dir.display()
                );
                self.clean();
            }
            RenameOutcome::Failed(source) => {
                self.state = ExtractorState::Aborted;
                return Err(BundleError::Commit {
                    path: self.extraction_dir.clone(),
                    source,
                });
            }
        }

        self.state = ExtractorState::Committed;
        Ok(())
    }

    /// Move one staged file into the extraction directory.
    pub fn commit_file(&mut self, relative_path: &str) -> Result<()> {
        let working_path = entry_path(&self.working_extraction_dir, relative_path)?;
        let final_path = entry_path(&self.extraction_dir, relative_path)?;

        if let Some(parent) = final_path.parent() {
            dir_utils::create_directory_tree(parent).map_err(|e| {
                self.state = ExtractorState::Aborted;
                BundleError::io(parent, e)
            })?;
        }

        let outcome = dir_utils::rename_with_retries(
            &working_path,
            &final_path,
            &self.config.retry,
            |path| path.is_file(),
        );

        match outcome {
            RenameOutcome::Renamed => {
                info!("Recovered {}", final_path.display());
                Ok(())
            }
            RenameOutcome::DestinationExists => {
                info!("{} restored by a concurrent process", final_path.display());
                Ok(())
            }
            RenameOutcome::Failed(source) => {
                self.state = ExtractorState::Aborted;
                Err(BundleError::Commit {
                    path: final_path,
                    source,
                })
            }
        }
    }

    /// Delete the working directory. Failures are logged, not returned.
    pub fn clean(&mut self) {
        dir_utils::remove_directory_tree_best_effort(&self.working_extraction_dir);
    }

    /// Stage every file that needs extraction, then commit the directory.
    pub fn extract_new(&mut self, reader: &mut Reader<'_>) -> Result<()> {
        info!("Extracting bundle to {}", self.extraction_dir.display());

        let result = self.stage_and_commit(reader);
        if result.is_err() {
            self.abort();
        }
        result
    }

    fn stage_and_commit(&mut self, reader: &mut Reader<'_>) -> Result<()> {
        self.begin()?;
        let manifest = self.manifest;
        for entry in manifest.files_to_extract() {
            self.extract_file(entry, reader)?;
        }
        self.state = ExtractorState::FilesWritten;
        self.commit_dir()
    }

    /// Re-extract whichever files are missing from an existing extraction.
    pub fn verify_recover_extraction(&mut self, reader: &mut Reader<'_>) -> Result<()> {
        let result = self.recover_missing(reader);
        if result.is_err() {
            self.abort();
        }
        result
    }

    fn recover_missing(&mut self, reader: &mut Reader<'_>) -> Result<()> {
        let manifest = self.manifest;
        let mut recovering = false;

        for entry in manifest.files_to_extract() {
            let final_path = entry_path(&self.extraction_dir, entry.relative_path())?;
            if final_path.exists() {
                continue;
            }

            warn!("Extracted file {} is missing, recovering", final_path.display());
            if !recovering {
                self.begin()?;
                recovering = true;
            }
            self.extract_file(entry, reader)?;
            self.commit_file(entry.relative_path())?;
        }

        if recovering {
            self.clean();
        } else {
            debug!("Reusing extraction {}", self.extraction_dir.display());
        }
        self.state = ExtractorState::Committed;
        Ok(())
    }

    fn abort(&mut self) {
        self.state = ExtractorState::Aborted;
        self.clean();
    }
}

/// `<base>/<host name without extension>/<bundle id>`
pub fn extraction_dir_for(base_dir: &Path, bundle_path: &Path, bundle_id: &str) -> Result<PathBuf> {
    if !is_single_component(bundle_id) {
        return Err(BundleError::ExtractionLocation(format!(
            "bundle id {:?} is not a plain directory name",
            bundle_id
        )));
    }
    let host_name = bundle_path.file_stem().ok_or_else(|| {
        BundleError::ExtractionLocation(format!(
            "bundle path {} has no file name",
            bundle_path.display()
        ))
    })?;
    Ok(base_dir.join(host_name).join(bundle_id))
}

/// `dir/relative_path`, refusing paths that would resolve outside `dir`.
fn entry_path(dir: &Path, relative_path: &str) -> Result<PathBuf> {
    if !is_contained_path(relative_path) {
        return Err(BundleError::ExtractionLocation(format!(
            "bundled path {:?} resolves outside {}",
            relative_path,
            dir.display()
        )));
    }
    Ok(dir.join(relative_path))
}

/// `<parent of extraction dir>/<process id in hex>`
pub fn working_dir_for(extraction_dir: &Path, process_id: u32) -> Result<PathBuf> {
    let parent = extraction_dir.parent().ok_or_else(|| {
        BundleError::ExtractionLocation(format!(
            "extraction directory {} has no parent",
            extraction_dir.display()
        ))
    })?;
    Ok(parent.join(format!("{:x}", process_id)))
}

/// Inflate a raw deflate stream into `out` through a fixed scratch buffer.
///
/// Returns the number of bytes written. Output beyond `expected_size` fails
/// immediately instead of being truncated.
fn inflate_into<W: Write>(
    input: &[u8],
    out: &mut W,
    expected_size: i64,
    path: &Path,
) -> Result<u64> {
    let mut stream = Decompress::new(false);
    let mut buffer = vec![0u8; INFLATE_BUFFER_SIZE];
    let mut written = 0u64;

    loop {
        let consumed = stream.total_in() as usize;
        let produced_before = stream.total_out();

        let status = stream
            .decompress(&input[consumed..], &mut buffer, FlushDecompress::None)
            .map_err(|e| BundleError::Decompress {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        let produced = (stream.total_out() - produced_before) as usize;
        if produced > 0 {
            written += produced as u64;
            if written > expected_size as u64 {
                return Err(BundleError::SizeMismatch {
                    path: path.to_path_buf(),
                    expected: expected_size,
                    actual: written,
                });
            }
            out.write_all(&buffer[..produced])
                .map_err(|e| BundleError::io(path, e))?;
        }

        match status {
            Status::StreamEnd => break,
            Status::Ok | Status::BufError => {
                if produced == 0 && stream.total_in() as usize == consumed {
                    return Err(BundleError::Decompress {
                        path: path.to_path_buf(),
                        message: "compressed stream ended before its end marker".to_string(),
                    });
                }
            }
        }
    }

    Ok(written)
}
