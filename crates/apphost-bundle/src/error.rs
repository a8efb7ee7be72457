//! Bundle error types.
//!
//! Every failure in this crate is fatal to the parse or extraction attempt
//! that raised it. [`BundleError::kind`] sorts them into the two classes the
//! host reports at startup: format/compatibility problems and I/O problems.

use std::io;
use std::path::PathBuf;

/// Broad classification of a [`BundleError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or incompatible container, or an unusable extraction location.
    Format,
    /// Read, write, map or decompression failure.
    Io,
}

/// Errors that can occur while parsing, extracting, or building a bundle.
#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    /// A read ran past the end of the container
    #[error("Bundle truncated: {needed} bytes needed at offset {offset}, {remaining} remaining")]
    Truncated {
        offset: u64,
        needed: u64,
        remaining: u64,
    },

    /// A seek target outside the container
    #[error("Bundle offset {0} is out of bounds")]
    OffsetOutOfBounds(i64),

    /// Length prefix of a path string is zero, too long, or over-encoded
    #[error("Invalid path length prefix at offset {0}")]
    InvalidPathLength(u64),

    /// Path string bytes are not UTF-8
    #[error("Path string at offset {0} is not valid UTF-8")]
    InvalidUtf8(u64),

    /// Header version not in the supported set
    #[error("Unsupported bundle version {major}.{minor}")]
    UnsupportedVersion { major: u32, minor: u32 },

    /// Header declares no embedded files (or a negative count)
    #[error("Invalid embedded file count {0}")]
    InvalidFileCount(i32),

    /// A manifest entry failed validation
    #[error(
        "Malformed bundle entry at offset {position}: offset={offset} size={size} \
         compressed_size={compressed_size} type={type_tag}"
    )]
    MalformedEntry {
        position: u64,
        offset: i64,
        size: i64,
        compressed_size: i64,
        type_tag: u8,
    },

    /// An entry path or bundle id that would resolve outside the extraction directory
    #[error("Unsafe bundle path {path:?} at offset {position}")]
    UnsafePath { position: u64, path: String },

    /// The extraction base directory could not be determined or created
    #[error("Failed to determine extraction location: {0}")]
    ExtractionLocation(String),

    /// Renaming staged output into the final directory failed after retries
    #[error("Failed to commit extraction to {path}: {source}")]
    Commit {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// File system error with the path that caused it
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Memory-mapping the bundle failed
    #[error("Failed to map bundle {path}: {source}")]
    Map {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Extracted byte count differs from the manifest
    #[error("Extracted {path}: wrote {actual} bytes, expected {expected}")]
    SizeMismatch {
        path: PathBuf,
        expected: i64,
        actual: u64,
    },

    /// The deflate stream of an entry is corrupt or truncated
    #[error("Failed to decompress {path}: {message}")]
    Decompress { path: PathBuf, message: String },

    /// A bundled configuration file is not valid JSON
    #[error("Invalid JSON in bundled {name}: {source}")]
    Json {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    /// Input handed to the bundle writer cannot be represented
    #[error("Cannot bundle {path}: {reason}")]
    InvalidInput { path: String, reason: String },
}

impl BundleError {
    /// Which of the two fatal classes this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            BundleError::Truncated { .. }
            | BundleError::OffsetOutOfBounds(_)
            | BundleError::InvalidPathLength(_)
            | BundleError::InvalidUtf8(_)
            | BundleError::UnsupportedVersion { .. }
            | BundleError::InvalidFileCount(_)
            | BundleError::MalformedEntry { .. }
            | BundleError::UnsafePath { .. }
            | BundleError::ExtractionLocation(_)
            | BundleError::Commit { .. }
            | BundleError::Json { .. }
            | BundleError::InvalidInput { .. } => ErrorKind::Format,
            BundleError::Io { .. }
            | BundleError::Map { .. }
            | BundleError::SizeMismatch { .. }
            | BundleError::Decompress { .. } => ErrorKind::Io,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        BundleError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, BundleError>;
