//! `apphost locate` — Show where a bundled file is served from.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use apphost_bundle::Runner;

pub fn execute(
    bundle: &Path,
    path: &str,
    header_offset: Option<i64>,
    base_dir: Option<PathBuf>,
) -> anyhow::Result<()> {
    let info = super::open_info(bundle, header_offset)?;
    let runner = Runner::process(info, super::extraction_config(base_dir))
        .with_context(|| format!("failed to process bundle {}", bundle.display()))?;

    let Some(located) = runner.locate(path) else {
        bail!("{} is not in bundle {}", path, bundle.display());
    };

    if located.extracted {
        println!("{}  (extracted)", located.path.display());
    } else if let Some(probed) = runner.probe_in_bundle(path) {
        println!(
            "{}  (in bundle at offset {}, {} bytes)",
            located.path.display(),
            probed.offset,
            probed.size
        );
    }
    Ok(())
}
