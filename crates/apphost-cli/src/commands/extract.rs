//! `apphost extract` — Extract (or verify) the files a bundle needs on disk.

use std::path::{Path, PathBuf};

use anyhow::Context;
use apphost_bundle::Runner;

pub fn execute(
    bundle: &Path,
    header_offset: Option<i64>,
    base_dir: Option<PathBuf>,
) -> anyhow::Result<()> {
    let info = super::open_info(bundle, header_offset)?;
    let runner = Runner::process(info, super::extraction_config(base_dir))
        .with_context(|| format!("failed to process bundle {}", bundle.display()))?;

    match runner.extraction_path() {
        Some(dir) => {
            let count = runner.manifest().files_to_extract().count();
            println!("{} ({} files)", dir.display(), count);
        }
        None => println!("No files need extraction."),
    }
    Ok(())
}
