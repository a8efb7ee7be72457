//! Ordered list of embedded files

use tracing::debug;

use super::file_entry::FileEntry;
use super::header::Header;
use super::reader::Reader;
use crate::error::Result;

/// All file entries of a bundle in declaration order.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    files: Vec<FileEntry>,
    files_need_extraction: bool,
}

impl Manifest {
    pub fn new(files: Vec<FileEntry>) -> Self {
        let files_need_extraction = files.iter().any(FileEntry::needs_extraction);
        Self {
            files,
            files_need_extraction,
        }
    }

    /// Read `header.num_embedded_files()` entries following the header.
    pub fn read(reader: &mut Reader<'_>, header: &Header) -> Result<Self> {
        let force_extraction = header.is_netcoreapp3_compat_mode();
        let count = header.num_embedded_files() as usize;

        // The count is untrusted; let a bogus one fail on the first short read.
        let mut files = Vec::with_capacity(count.min(1024));
        let mut files_need_extraction = false;
        for _ in 0..count {
            let entry = FileEntry::read(reader, header.major_version(), force_extraction)?;
            files_need_extraction |= entry.needs_extraction();
            files.push(entry);
        }

        debug!(
            "Bundle manifest: {} files, extraction {}",
            files.len(),
            if files_need_extraction { "required" } else { "not required" }
        );

        Ok(Self {
            files,
            files_need_extraction,
        })
    }

    pub fn files(&self) -> &[FileEntry] {
        &self.files
    }

    pub fn files_mut(&mut self) -> &mut [FileEntry] {
        &mut self.files
    }

    /// Whether any entry has to be materialized on disk
    pub fn files_need_extraction(&self) -> bool {
        self.files_need_extraction
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Entries that have to be materialized on disk.
    pub fn files_to_extract(&self) -> impl Iterator<Item = &FileEntry> {
        self.files.iter().filter(|entry| entry.needs_extraction())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::file_entry::FileType;
    use crate::bundle::header::{HeaderFlags, Location};
    use crate::error::BundleError;

    fn header(count: i32, flags: HeaderFlags) -> Header {
        Header::new(
            6,
            0,
            count,
            "id".to_string(),
            Location::default(),
            Location::default(),
            flags,
        )
    }

    fn encode(entries: &[FileEntry]) -> Vec<u8> {
        let mut bytes = Vec::new();
        for entry in entries {
            entry.write(&mut bytes, 6).unwrap();
        }
        bytes
    }

    #[test]
    fn test_read_preserves_order() {
        let entries = vec![
            FileEntry::new(100, 50, 0, FileType::Assembly, "App.dll", false),
            FileEntry::new(150, 30, 0, FileType::NativeBinary, "native/lib.so", false),
            FileEntry::new(180, 5, 0, FileType::DepsJson, "App.deps.json", false),
        ];
        let bytes = encode(&entries);

        let mut reader = Reader::new(&bytes, 0).unwrap();
        let manifest = Manifest::read(&mut reader, &header(3, HeaderFlags::NONE)).unwrap();

        assert_eq!(manifest.files(), entries.as_slice());
        assert!(manifest.files_need_extraction());
        assert_eq!(manifest.files_to_extract().count(), 1);
    }

    #[test]
    fn test_no_extraction_for_managed_only() {
        let entries = vec![
            FileEntry::new(100, 50, 0, FileType::Assembly, "App.dll", false),
            FileEntry::new(
                150,
                10,
                0,
                FileType::RuntimeConfigJson,
                "App.runtimeconfig.json",
                false,
            ),
        ];
        let bytes = encode(&entries);

        let mut reader = Reader::new(&bytes, 0).unwrap();
        let manifest = Manifest::read(&mut reader, &header(2, HeaderFlags::NONE)).unwrap();
        assert!(!manifest.files_need_extraction());
    }

    #[test]
    fn test_compat_mode_forces_extraction() {
        let entries = vec![FileEntry::new(100, 50, 0, FileType::Assembly, "App.dll", false)];
        let bytes = encode(&entries);

        let mut reader = Reader::new(&bytes, 0).unwrap();
        let manifest =
            Manifest::read(&mut reader, &header(1, HeaderFlags::NETCOREAPP3_COMPAT_MODE)).unwrap();
        assert!(manifest.files_need_extraction());
        assert!(manifest.files()[0].force_extraction());
    }

    #[test]
    fn test_fewer_entries_than_declared() {
        let entries = vec![FileEntry::new(100, 50, 0, FileType::Assembly, "App.dll", false)];
        let bytes = encode(&entries);

        let mut reader = Reader::new(&bytes, 0).unwrap();
        assert!(matches!(
            Manifest::read(&mut reader, &header(2, HeaderFlags::NONE)),
            Err(BundleError::Truncated { .. })
        ));
    }
}
