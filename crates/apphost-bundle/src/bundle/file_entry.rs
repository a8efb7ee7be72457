//! Manifest entries
//!
//! ```text
//! int64   offset
//! int64   size
//! int64   compressed_size     (major >= 6)
//! uint8   type
//! string  relative_path       (7-bit length prefix)
//! ```

use serde::Serialize;

use super::header::COMPRESSION_MAJOR_VERSION;
use super::reader::{is_contained_path, normalize_separators, Reader};
use super::writer::write_path_string;
use crate::error::{BundleError, Result};

/// Kind of an embedded file. The tag values are fixed by the container format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FileType {
    Unknown,
    Assembly,
    NativeBinary,
    DepsJson,
    RuntimeConfigJson,
    Symbols,
}

impl FileType {
    /// Decode a type tag; `None` for tags outside the format.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(FileType::Unknown),
            1 => Some(FileType::Assembly),
            2 => Some(FileType::NativeBinary),
            3 => Some(FileType::DepsJson),
            4 => Some(FileType::RuntimeConfigJson),
            5 => Some(FileType::Symbols),
            _ => None,
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            FileType::Unknown => 0,
            FileType::Assembly => 1,
            FileType::NativeBinary => 2,
            FileType::DepsJson => 3,
            FileType::RuntimeConfigJson => 4,
            FileType::Symbols => 5,
        }
    }

    /// Whether consumers can read this type straight from the mapped bundle.
    pub fn is_servable_from_memory(self) -> bool {
        match self {
            FileType::Assembly | FileType::DepsJson | FileType::RuntimeConfigJson => true,
            FileType::Unknown | FileType::NativeBinary | FileType::Symbols => false,
        }
    }
}

/// One embedded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileEntry {
    offset: i64,
    size: i64,
    compressed_size: i64,
    #[serde(rename = "type")]
    file_type: FileType,
    relative_path: String,
    disabled: bool,
    force_extraction: bool,
}

impl FileEntry {
    /// Build an entry directly. `relative_path` is normalized to native separators.
    pub fn new(
        offset: i64,
        size: i64,
        compressed_size: i64,
        file_type: FileType,
        relative_path: &str,
        force_extraction: bool,
    ) -> Self {
        Self {
            offset,
            size,
            compressed_size,
            file_type,
            relative_path: normalize_separators(relative_path),
            disabled: false,
            force_extraction,
        }
    }

    fn is_valid(offset: i64, size: i64, compressed_size: i64) -> bool {
        offset > 0 && size >= 0 && compressed_size >= 0
    }

    /// Parse one entry at the reader's current position.
    pub fn read(
        reader: &mut Reader<'_>,
        major_version: u32,
        force_extraction: bool,
    ) -> Result<Self> {
        let position = reader.offset();
        let offset = reader.read_i64()?;
        let size = reader.read_i64()?;
        let compressed_size = if major_version >= COMPRESSION_MAJOR_VERSION {
            reader.read_i64()?
        } else {
            0
        };
        let type_tag = reader.read_byte()?;

        let file_type = FileType::from_u8(type_tag)
            .filter(|_| Self::is_valid(offset, size, compressed_size))
            .ok_or(BundleError::MalformedEntry {
                position,
                offset,
                size,
                compressed_size,
                type_tag,
            })?;

        let path_position = reader.offset();
        let relative_path = reader.read_path_string()?;
        if !is_contained_path(&relative_path) {
            return Err(BundleError::UnsafePath {
                position: path_position,
                path: relative_path,
            });
        }

        Ok(Self {
            offset,
            size,
            compressed_size,
            file_type,
            relative_path,
            disabled: false,
            force_extraction,
        })
    }

    /// Serialize in the on-disk layout for the given major version.
    pub fn write(&self, out: &mut Vec<u8>, major_version: u32) -> Result<()> {
        out.extend_from_slice(&self.offset.to_le_bytes());
        out.extend_from_slice(&self.size.to_le_bytes());
        if major_version >= COMPRESSION_MAJOR_VERSION {
            out.extend_from_slice(&self.compressed_size.to_le_bytes());
        }
        out.push(self.file_type.to_u8());
        write_path_string(out, &self.relative_path)
    }

    /// Whether this file has to exist on disk before it can be used.
    pub fn needs_extraction(&self) -> bool {
        self.force_extraction || !self.file_type.is_servable_from_memory()
    }

    /// Compare against a relative path, ignoring separator style.
    pub fn matches(&self, path: &str) -> bool {
        self.relative_path == normalize_separators(path)
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }

    /// Uncompressed length
    pub fn size(&self) -> i64 {
        self.size
    }

    /// Length of the deflate stream, or 0 when stored raw
    pub fn compressed_size(&self) -> i64 {
        self.compressed_size
    }

    pub fn is_compressed(&self) -> bool {
        self.compressed_size != 0
    }

    pub fn file_type(&self) -> FileType {
        self.file_type
    }

    pub fn relative_path(&self) -> &str {
        &self.relative_path
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Hide this entry from probing; a copy outside the bundle takes precedence.
    pub fn disable(&mut self) {
        self.disabled = true;
    }

    pub fn force_extraction(&self) -> bool {
        self.force_extraction
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_TYPES: [FileType; 6] = [
        FileType::Unknown,
        FileType::Assembly,
        FileType::NativeBinary,
        FileType::DepsJson,
        FileType::RuntimeConfigJson,
        FileType::Symbols,
    ];

    #[test]
    fn test_type_tags() {
        for file_type in ALL_TYPES {
            assert_eq!(FileType::from_u8(file_type.to_u8()), Some(file_type));
        }
        assert_eq!(FileType::from_u8(6), None);
        assert_eq!(FileType::from_u8(0xFF), None);
    }

    #[test]
    fn test_needs_extraction_policy() {
        for file_type in ALL_TYPES {
            let entry = FileEntry::new(8, 1, 0, file_type, "f", false);
            let expected = !matches!(
                file_type,
                FileType::Assembly | FileType::DepsJson | FileType::RuntimeConfigJson
            );
            assert_eq!(entry.needs_extraction(), expected, "{:?}", file_type);

            let forced = FileEntry::new(8, 1, 0, file_type, "f", true);
            assert!(forced.needs_extraction(), "{:?}", file_type);
        }
    }

    #[test]
    fn test_read_v6_entry() {
        let entry = FileEntry::new(100, 50, 20, FileType::Assembly, "App.dll", false);
        let mut bytes = Vec::new();
        entry.write(&mut bytes, 6).unwrap();

        let mut reader = Reader::new(&bytes, 0).unwrap();
        let parsed = FileEntry::read(&mut reader, 6, false).unwrap();
        assert_eq!(parsed, entry);
        assert!(parsed.is_compressed());
    }

    #[test]
    fn test_read_v2_entry_has_no_compressed_size() {
        let entry = FileEntry::new(100, 50, 0, FileType::NativeBinary, "native/lib.so", true);
        let mut bytes = Vec::new();
        entry.write(&mut bytes, 2).unwrap();
        // offset + size + type + length prefix + path
        assert_eq!(bytes.len(), 8 + 8 + 1 + 1 + "native/lib.so".len());

        let mut reader = Reader::new(&bytes, 0).unwrap();
        let parsed = FileEntry::read(&mut reader, 2, true).unwrap();
        assert_eq!(parsed.compressed_size(), 0);
        assert!(parsed.force_extraction());
        assert!(parsed.matches("native/lib.so"));
    }

    fn raw_entry(offset: i64, size: i64, compressed: i64, tag: u8) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&offset.to_le_bytes());
        bytes.extend_from_slice(&size.to_le_bytes());
        bytes.extend_from_slice(&compressed.to_le_bytes());
        bytes.push(tag);
        bytes.push(1);
        bytes.push(b'x');
        bytes
    }

    #[test]
    fn test_malformed_entries_rejected() {
        for bytes in [
            raw_entry(0, 10, 0, 1),
            raw_entry(-4, 10, 0, 1),
            raw_entry(16, -1, 0, 1),
            raw_entry(16, 10, -1, 1),
            raw_entry(16, 10, 0, 6),
        ] {
            let mut reader = Reader::new(&bytes, 0).unwrap();
            assert!(matches!(
                FileEntry::read(&mut reader, 6, false),
                Err(BundleError::MalformedEntry { .. })
            ));
        }
    }

    #[test]
    fn test_escaping_paths_rejected() {
        for path in ["/etc/cron.d/job", "../outside.so", "native/../../outside.so"] {
            let mut bytes = Vec::new();
            FileEntry::new(16, 1, 0, FileType::NativeBinary, path, false)
                .write(&mut bytes, 6)
                .unwrap();

            let mut reader = Reader::new(&bytes, 0).unwrap();
            let err = FileEntry::read(&mut reader, 6, false).unwrap_err();
            // offset + size + compressed_size + type
            assert!(
                matches!(err, BundleError::UnsafePath { position: 25, .. }),
                "{}",
                path
            );
        }
    }

    #[test]
    fn test_disable() {
        let mut entry = FileEntry::new(8, 1, 0, FileType::Assembly, "a.dll", false);
        assert!(!entry.is_disabled());
        entry.disable();
        assert!(entry.is_disabled());
    }
}
