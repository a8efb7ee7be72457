//! Shared helpers for bundle integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use apphost_bundle::bundle::writer::write_path_string;
use apphost_bundle::{ExtractionConfig, FileEntry, FileType, RetryPolicy};

/// Host executable prefix of the hand-built scenario bundle.
pub const SCENARIO_HOST_SIZE: usize = 100;

/// A config rooted at `base` that retries renames quickly.
pub fn test_config(base: &Path, process_id: u32) -> ExtractionConfig {
    ExtractionConfig::default()
        .with_base_dir(base)
        .with_process_id(process_id)
        .with_retry(RetryPolicy {
            attempts: 5,
            delay: Duration::from_millis(5),
        })
}

/// Write `bytes` as an executable named `name` in `dir`.
pub fn write_bundle(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, bytes).unwrap();
    path
}

/// Raw header bytes in the v6 layout with no config locations.
pub fn header_bytes(major: u32, minor: u32, count: i32, bundle_id: &str, flags: u64) -> Vec<u8> {
    header_bytes_with_deps(major, minor, count, bundle_id, (0, 0), flags)
}

/// Raw header bytes whose deps.json location is `(offset, size)`.
pub fn header_bytes_with_deps(
    major: u32,
    minor: u32,
    count: i32,
    bundle_id: &str,
    deps_json: (i64, i64),
    flags: u64,
) -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&major.to_le_bytes());
    bytes.extend_from_slice(&minor.to_le_bytes());
    bytes.extend_from_slice(&count.to_le_bytes());
    write_path_string(&mut bytes, bundle_id).unwrap();
    for value in [deps_json.0, deps_json.1, 0, 0] {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes.extend_from_slice(&flags.to_le_bytes());
    bytes
}

/// Payload bytes of the scenario's `App.dll` (offset 100, 50 bytes).
pub fn scenario_assembly() -> Vec<u8> {
    (0..50u8).collect()
}

/// Payload bytes of the scenario's `native/lib.so` (offset 150, 30 bytes).
pub fn scenario_native() -> Vec<u8> {
    (0..30u8).map(|i| 200 - i).collect()
}

/// Bundle with id `abc123` holding `App.dll` at 100..150 and
/// `native/lib.so` at 150..180. Returns the image and its header offset.
pub fn scenario_bundle() -> (Vec<u8>, i64) {
    let mut bytes = vec![0xEEu8; SCENARIO_HOST_SIZE];
    bytes.extend_from_slice(&scenario_assembly());
    bytes.extend_from_slice(&scenario_native());

    let header_offset = bytes.len() as i64;
    bytes.extend_from_slice(&header_bytes(6, 0, 2, "abc123", 0));
    FileEntry::new(100, 50, 0, FileType::Assembly, "App.dll", false)
        .write(&mut bytes, 6)
        .unwrap();
    FileEntry::new(150, 30, 0, FileType::NativeBinary, "native/lib.so", false)
        .write(&mut bytes, 6)
        .unwrap();

    (bytes, header_offset)
}

/// Directory names directly under `dir`.
pub fn dir_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
