//! `apphost pack` — Append files to a host executable.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use apphost_bundle::bundle::HeaderFlags;
use apphost_bundle::{BundleWriter, FileType};

pub struct PackOptions {
    pub host: PathBuf,
    pub output: PathBuf,
    pub root: Option<PathBuf>,
    pub compress: bool,
    pub extract_all: bool,
    pub bundle_id: Option<String>,
    pub files: Vec<PathBuf>,
}

pub fn execute(options: PackOptions) -> anyhow::Result<()> {
    let host = std::fs::read(&options.host)
        .with_context(|| format!("failed to read host {}", options.host.display()))?;

    let mut writer = BundleWriter::new().with_compression(options.compress);
    if options.extract_all {
        writer = writer.with_flags(HeaderFlags::NETCOREAPP3_COMPAT_MODE);
    }
    if let Some(id) = options.bundle_id {
        writer = writer.with_bundle_id(id);
    }

    for file in &options.files {
        let relative = relative_path(file, options.root.as_deref())?;
        let data = std::fs::read(file)
            .with_context(|| format!("failed to read {}", file.display()))?;
        let file_type = infer_file_type(&relative);
        tracing::debug!(path = %relative, ?file_type, size = data.len(), "adding file");
        writer.add_file(relative, file_type, data);
    }

    let bundle = writer
        .write_to_path(&host, &options.output)
        .with_context(|| format!("failed to write {}", options.output.display()))?;

    println!(
        "Wrote {} ({} files, bundle id {}, header at {})",
        options.output.display(),
        bundle.entries.len(),
        bundle.header.bundle_id(),
        bundle.header_offset
    );
    Ok(())
}

/// Bundle-relative path of `file`, always with forward slashes.
fn relative_path(file: &Path, root: Option<&Path>) -> anyhow::Result<String> {
    let relative = match root {
        Some(root) => file.strip_prefix(root).with_context(|| {
            format!("{} is not under {}", file.display(), root.display())
        })?,
        None => match file.file_name() {
            Some(name) => Path::new(name),
            None => bail!("{} has no file name", file.display()),
        },
    };

    let mut parts = Vec::new();
    for component in relative.components() {
        match component.as_os_str().to_str() {
            Some(part) => parts.push(part),
            None => bail!("{} is not valid UTF-8", file.display()),
        }
    }
    if parts.is_empty() {
        bail!("{} has an empty bundle path", file.display());
    }
    Ok(parts.join("/"))
}

/// Entry type from the file name, the way the SDK bundler assigns them.
fn infer_file_type(relative_path: &str) -> FileType {
    let name = relative_path
        .rsplit('/')
        .next()
        .unwrap_or(relative_path)
        .to_ascii_lowercase();

    if name.ends_with(".deps.json") {
        FileType::DepsJson
    } else if name.ends_with(".runtimeconfig.json") {
        FileType::RuntimeConfigJson
    } else if name.ends_with(".dll") || name.ends_with(".exe") {
        FileType::Assembly
    } else if name.ends_with(".so") || name.ends_with(".dylib") || name.contains(".so.") {
        FileType::NativeBinary
    } else if name.ends_with(".pdb") || name.ends_with(".dbg") || name.ends_with(".dwarf") {
        FileType::Symbols
    } else {
        FileType::Unknown
    }
}
