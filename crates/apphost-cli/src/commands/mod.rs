//! Subcommand implementations.

pub mod extract;
pub mod inspect;
pub mod locate;
pub mod pack;

use std::path::{Path, PathBuf};

use anyhow::Context;
use apphost_bundle::bundle::marker;
use apphost_bundle::{ExtractionConfig, Info};

/// Open a bundle, finding the header offset from its marker when not given.
pub fn open_info(bundle: &Path, header_offset: Option<i64>) -> anyhow::Result<Info> {
    let header_offset = match header_offset {
        Some(offset) => offset,
        None => {
            let bytes = std::fs::read(bundle)
                .with_context(|| format!("failed to read {}", bundle.display()))?;
            marker::find_header_offset(&bytes).with_context(|| {
                format!(
                    "{} is not a single-file bundle (no header offset in its marker)",
                    bundle.display()
                )
            })?
        }
    };

    Info::open(bundle, header_offset)
        .with_context(|| format!("failed to open bundle {}", bundle.display()))
}

/// Environment-derived config, with an explicit base directory taking precedence.
pub fn extraction_config(base_dir: Option<PathBuf>) -> ExtractionConfig {
    let config = ExtractionConfig::from_env();
    match base_dir {
        Some(dir) => config.with_base_dir(dir),
        None => config,
    }
}
