//! Bounds-checked cursor over the mapped bundle
//!
//! All positions are relative to the start of the container, which may begin
//! at a non-zero offset inside the executable file.

use std::path::{Component, Path};

use crate::error::{BundleError, Result};

/// Longest path string accepted in a manifest.
pub const PATH_MAX: usize = 4096;

/// Cursor over the container region of a mapped bundle.
pub struct Reader<'a> {
    /// The container bytes: everything from `offset_in_file` to end of file.
    buffer: &'a [u8],
    position: usize,
}

impl<'a> Reader<'a> {
    /// Create a reader over `mapped`, whose container starts at `offset_in_file`.
    pub fn new(mapped: &'a [u8], offset_in_file: u64) -> Result<Self> {
        let start = usize::try_from(offset_in_file)
            .ok()
            .filter(|&start| start <= mapped.len())
            .ok_or(BundleError::OffsetOutOfBounds(offset_in_file as i64))?;
        Ok(Self {
            buffer: &mapped[start..],
            position: 0,
        })
    }

    /// Current position within the container
    pub fn offset(&self) -> u64 {
        self.position as u64
    }

    /// Length of the container
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Move the cursor to an absolute container offset.
    pub fn set_offset(&mut self, offset: i64) -> Result<()> {
        if offset < 0 || offset as u64 >= self.buffer.len() as u64 {
            return Err(BundleError::OffsetOutOfBounds(offset));
        }
        self.position = offset as usize;
        Ok(())
    }

    fn ensure(&self, len: usize) -> Result<()> {
        let remaining = self.buffer.len() - self.position;
        if len > remaining {
            return Err(BundleError::Truncated {
                offset: self.position as u64,
                needed: len as u64,
                remaining: remaining as u64,
            });
        }
        Ok(())
    }

    /// Read a single byte
    pub fn read_byte(&mut self) -> Result<u8> {
        self.ensure(1)?;
        let value = self.buffer[self.position];
        self.position += 1;
        Ok(value)
    }

    /// Copy `dest.len()` bytes into `dest`.
    pub fn read(&mut self, dest: &mut [u8]) -> Result<()> {
        let src = self.read_direct(dest.len())?;
        dest.copy_from_slice(src);
        Ok(())
    }

    /// Borrow `len` bytes of the mapped region without copying.
    pub fn read_direct(&mut self, len: usize) -> Result<&'a [u8]> {
        self.ensure(len)?;
        let start = self.position;
        self.position += len;
        Ok(&self.buffer[start..start + len])
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut bytes = [0u8; N];
        self.read(&mut bytes)?;
        Ok(bytes)
    }

    /// Read a 32-bit unsigned integer (little-endian)
    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    /// Read a 32-bit signed integer (little-endian)
    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    /// Read a 64-bit signed integer (little-endian)
    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(i64::from_le_bytes(self.read_array()?))
    }

    /// Read a 64-bit unsigned integer (little-endian)
    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    /// Read the 7-bit encoded length prefix of a path string.
    ///
    /// At most two bytes are accepted, and the result must be in `1..=PATH_MAX`.
    pub fn read_path_length(&mut self) -> Result<usize> {
        let start = self.offset();
        let first = self.read_byte()?;

        let length = if first & 0x80 == 0 {
            first as usize
        } else {
            let second = self.read_byte()?;
            if second & 0x80 != 0 {
                return Err(BundleError::InvalidPathLength(start));
            }
            (first & 0x7F) as usize | ((second as usize) << 7)
        };

        if length == 0 || length > PATH_MAX {
            return Err(BundleError::InvalidPathLength(start));
        }
        Ok(length)
    }

    /// Read a length-prefixed UTF-8 path and convert it to native separators.
    pub fn read_path_string(&mut self) -> Result<String> {
        let length = self.read_path_length()?;
        let start = self.offset();
        let bytes = self.read_direct(length)?;
        let path = std::str::from_utf8(bytes).map_err(|_| BundleError::InvalidUtf8(start))?;
        Ok(normalize_separators(path))
    }
}

/// Replace the foreign directory separator with the platform one.
pub fn normalize_separators(path: &str) -> String {
    #[cfg(windows)]
    {
        path.replace('/', "\\")
    }
    #[cfg(not(windows))]
    {
        path.replace('\\', "/")
    }
}

/// Whether `path` stays below any directory it is joined onto.
///
/// Rejects roots, drive prefixes and `..`, and requires at least one name.
pub fn is_contained_path(path: &str) -> bool {
    let mut named = false;
    for component in Path::new(path).components() {
        match component {
            Component::Normal(_) => named = true,
            Component::CurDir => {}
            Component::RootDir | Component::Prefix(_) | Component::ParentDir => return false,
        }
    }
    named
}

/// Whether `name` is exactly one plain directory name.
pub fn is_single_component(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_read_integers() {
        let mut data = Vec::new();
        data.extend_from_slice(&6u32.to_le_bytes());
        data.extend_from_slice(&(-2i32).to_le_bytes());
        data.extend_from_slice(&0x1122_3344_5566_7788i64.to_le_bytes());

        let mut reader = Reader::new(&data, 0).unwrap();
        assert_eq!(reader.read_u32().unwrap(), 6);
        assert_eq!(reader.read_i32().unwrap(), -2);
        assert_eq!(reader.read_i64().unwrap(), 0x1122_3344_5566_7788);
        assert_eq!(reader.offset(), 16);
    }

    #[test]
    fn test_offset_in_file_shifts_positions() {
        let data = [0xAAu8, 0xBB, 0x01, 0x02];
        let mut reader = Reader::new(&data, 2).unwrap();
        assert_eq!(reader.len(), 2);
        assert_eq!(reader.read_byte().unwrap(), 0x01);
        reader.set_offset(1).unwrap();
        assert_eq!(reader.read_byte().unwrap(), 0x02);
    }

    #[test]
    fn test_read_past_end_fails() {
        let data = [1u8, 2, 3];
        let mut reader = Reader::new(&data, 0).unwrap();
        let err = reader.read_u32().unwrap_err();
        assert!(matches!(
            err,
            BundleError::Truncated {
                offset: 0,
                needed: 4,
                remaining: 3
            }
        ));
        assert_eq!(err.kind(), ErrorKind::Format);
    }

    #[test]
    fn test_set_offset_bounds() {
        let data = [0u8; 8];
        let mut reader = Reader::new(&data, 0).unwrap();
        assert!(reader.set_offset(7).is_ok());
        assert!(reader.set_offset(8).is_err());
        assert!(reader.set_offset(-1).is_err());
    }

    #[test]
    fn test_read_direct_borrows_mapping() {
        let data = b"headerpayload";
        let mut reader = Reader::new(data, 0).unwrap();
        reader.set_offset(6).unwrap();
        let slice = reader.read_direct(7).unwrap();
        assert_eq!(slice, b"payload");
        assert!(reader.read_direct(1).is_err());
    }

    #[test]
    fn test_path_string_single_byte_length() {
        let mut data = vec![7u8];
        data.extend_from_slice(b"App.dll");
        let mut reader = Reader::new(&data, 0).unwrap();
        assert_eq!(reader.read_path_string().unwrap(), "App.dll");
    }

    #[test]
    fn test_path_string_two_byte_length() {
        // 200 = 0b1_1001000 -> [0xC8, 0x01]
        let mut data = vec![0xC8, 0x01];
        data.extend(std::iter::repeat(b'a').take(200));
        let mut reader = Reader::new(&data, 0).unwrap();
        assert_eq!(reader.read_path_string().unwrap().len(), 200);
    }

    #[test]
    fn test_path_length_rejects_three_byte_prefix() {
        let data = [0x80u8, 0x80, 0x01];
        let mut reader = Reader::new(&data, 0).unwrap();
        assert!(matches!(
            reader.read_path_length(),
            Err(BundleError::InvalidPathLength(0))
        ));
    }

    #[test]
    fn test_path_length_rejects_zero_and_oversized() {
        let mut reader = Reader::new(&[0u8], 0).unwrap();
        assert!(reader.read_path_length().is_err());

        // 4097 = 0x1001 -> [0x81, 0x20]
        let mut reader = Reader::new(&[0x81u8, 0x20], 0).unwrap();
        assert!(reader.read_path_length().is_err());
    }

    #[test]
    fn test_path_string_invalid_utf8() {
        let data = [2u8, 0xFF, 0xFE];
        let mut reader = Reader::new(&data, 0).unwrap();
        assert!(matches!(
            reader.read_path_string(),
            Err(BundleError::InvalidUtf8(1))
        ));
    }

    #[cfg(not(windows))]
    #[test]
    fn test_path_separators_normalized() {
        assert_eq!(normalize_separators("native\\lib.so"), "native/lib.so");
        assert_eq!(normalize_separators("native/lib.so"), "native/lib.so");
    }

    #[test]
    fn test_contained_paths() {
        assert!(is_contained_path("App.dll"));
        assert!(is_contained_path("native/lib.so"));
        assert!(is_contained_path("./native/lib.so"));

        assert!(!is_contained_path("/etc/passwd"));
        assert!(!is_contained_path("../outside.so"));
        assert!(!is_contained_path("native/../../outside.so"));
        assert!(!is_contained_path("."));
    }

    #[test]
    fn test_single_component() {
        assert!(is_single_component("abc123"));
        assert!(is_single_component("Zm9v-YmFy_"));

        assert!(!is_single_component("a/b"));
        assert!(!is_single_component(".."));
        assert!(!is_single_component("."));
        assert!(!is_single_component("/abs"));
    }
}
