//! `apphost inspect` — Print header and manifest.

use std::path::Path;

use anyhow::Context;
use apphost_bundle::{FileEntry, Header, Manifest};
use serde::Serialize;

#[derive(Serialize)]
struct Inspection<'a> {
    header: &'a Header,
    header_offset: i64,
    files: &'a [FileEntry],
}

pub fn execute(bundle: &Path, header_offset: Option<i64>, json: bool) -> anyhow::Result<()> {
    let info = super::open_info(bundle, header_offset)?;

    let mapped = info.map_bundle()?;
    let mut reader = mapped.reader(info.offset_in_file())?;
    reader.set_offset(info.manifest_offset() as i64)?;
    let manifest = Manifest::read(&mut reader, info.header())
        .with_context(|| format!("failed to read manifest of {}", bundle.display()))?;

    let header = info.header();
    if json {
        let inspection = Inspection {
            header,
            header_offset: info.header_offset(),
            files: manifest.files(),
        };
        println!("{}", serde_json::to_string_pretty(&inspection)?);
        return Ok(());
    }

    println!("Bundle:       {}", bundle.display());
    println!(
        "Version:      {}.{}",
        header.major_version(),
        header.minor_version()
    );
    println!("Bundle id:    {}", header.bundle_id());
    println!("Header at:    {}", info.header_offset());
    if header.is_netcoreapp3_compat_mode() {
        println!("Mode:         extract all files");
    }
    println!("Files:        {}", manifest.len());
    println!();

    for entry in manifest.files() {
        let compression = if entry.is_compressed() {
            format!(" (deflated {})", entry.compressed_size())
        } else {
            String::new()
        };
        println!(
            "  {:>10} {:>10}  {:<20} {}{}{}",
            entry.offset(),
            entry.size(),
            format!("{:?}", entry.file_type()),
            entry.relative_path(),
            compression,
            if entry.needs_extraction() { "  [extract]" } else { "" }
        );
    }
    Ok(())
}
