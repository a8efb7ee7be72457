//! Bundle marker embedded in the host executable
//!
//! The host carries an `int64` header offset immediately followed by a fixed
//! 32-byte signature. An unbundled host has offset 0; the bundler patches in
//! the real offset of the bundle header.

/// Signature that follows the header offset placeholder.
pub const BUNDLE_SIGNATURE: [u8; 32] = [
    0x8b, 0x12, 0x02, 0xb9, 0x6a, 0x61, 0x20, 0x38, 0x72, 0x7b, 0x93, 0x02, 0x14, 0xd7, 0xa0, 0x32,
    0x13, 0xf5, 0xb9, 0xe6, 0xef, 0xae, 0x33, 0x18, 0xee, 0x3b, 0x2d, 0xce, 0x24, 0xb3, 0x6a, 0xae,
];

const OFFSET_SIZE: usize = std::mem::size_of::<i64>();

/// An unpatched placeholder: zero offset followed by the signature.
pub fn placeholder() -> Vec<u8> {
    let mut bytes = vec![0u8; OFFSET_SIZE];
    bytes.extend_from_slice(&BUNDLE_SIGNATURE);
    bytes
}

/// Position of the offset field of the first placeholder in `data`.
fn find_placeholder(data: &[u8]) -> Option<usize> {
    data.windows(BUNDLE_SIGNATURE.len())
        .position(|window| window == &BUNDLE_SIGNATURE[..])
        .filter(|&pos| pos >= OFFSET_SIZE)
        .map(|pos| pos - OFFSET_SIZE)
}

/// Header offset recorded in `data`, or `None` when it is not a bundle.
pub fn find_header_offset(data: &[u8]) -> Option<i64> {
    let pos = find_placeholder(data)?;
    let mut bytes = [0u8; OFFSET_SIZE];
    bytes.copy_from_slice(&data[pos..pos + OFFSET_SIZE]);
    let offset = i64::from_le_bytes(bytes);
    (offset > 0).then_some(offset)
}

/// Write `header_offset` into the placeholder. Returns false if there is none.
pub fn patch_header_offset(data: &mut [u8], header_offset: i64) -> bool {
    match find_placeholder(data) {
        Some(pos) => {
            data[pos..pos + OFFSET_SIZE].copy_from_slice(&header_offset.to_le_bytes());
            true
        }
        None => false,
    }
}
