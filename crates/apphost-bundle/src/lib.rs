//! App host single-file bundle support
//!
//! Parses the container appended to a host executable, extracts the files
//! that must live on disk (once, across any number of concurrent launches),
//! and answers where each embedded file can be found.

pub mod bundle;
pub mod config;
pub mod dir_utils;
pub mod error;

pub use bundle::{
    BundleWriter, ConfigFile, FileEntry, FileType, Header, Info, LocatedFile, Manifest,
    ProbedFile, Runner,
};
pub use config::{ExtractionConfig, RetryPolicy, EXTRACT_BASE_DIR_ENV};
pub use error::{BundleError, ErrorKind, Result};
