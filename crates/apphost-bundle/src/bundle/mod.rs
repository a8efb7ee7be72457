//! Single-file bundle format, extraction, and lookup
//!
//! - **reader**: bounds-checked cursor over the mapped bundle
//! - **header** / **file_entry** / **manifest**: container metadata
//! - **extractor**: crash-safe, race-safe extraction to disk
//! - **info**: header access and zero-copy config file mapping
//! - **runner**: one-time processing plus probe/locate queries
//! - **marker** / **writer**: the bundler side of the format

pub mod extractor;
pub mod file_entry;
pub mod header;
pub mod info;
pub mod manifest;
pub mod marker;
pub mod reader;
pub mod runner;
pub mod writer;

pub use extractor::{Extractor, ExtractorState};
pub use file_entry::{FileEntry, FileType};
pub use header::{Header, HeaderFlags, Location};
pub use info::{ConfigFile, ConfigMapping, Info, MappedBundle};
pub use manifest::Manifest;
pub use reader::Reader;
pub use runner::{LocatedFile, ProbedFile, Runner};
pub use writer::{BundleWriter, WrittenBundle};
