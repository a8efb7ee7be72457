//! Extraction settings
//!
//! Where bundles get extracted, which process identity names the staging
//! directory, and how long a blocked rename is retried.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

use crate::error::{BundleError, Result};

/// Environment variable overriding the extraction base directory.
pub const EXTRACT_BASE_DIR_ENV: &str = "DOTNET_BUNDLE_EXTRACT_BASE_DIR";

/// Subdirectory of the home (or temp) directory holding extracted bundles.
const DEFAULT_BASE_DIR_NAME: &str = ".net";

/// Bounded retry for renames that fail while a scanner holds a file open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 500,
            delay: Duration::from_millis(100),
        }
    }
}

/// Settings for one extraction attempt.
#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    /// Root of the extraction cache; `None` selects the platform default.
    pub base_dir: Option<PathBuf>,

    /// Names the per-run working directory.
    pub process_id: u32,

    pub retry: RetryPolicy,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            base_dir: None,
            process_id: std::process::id(),
            retry: RetryPolicy::default(),
        }
    }
}

impl ExtractionConfig {
    /// Defaults, with the base directory taken from `DOTNET_BUNDLE_EXTRACT_BASE_DIR`.
    pub fn from_env() -> Self {
        let base_dir = env::var_os(EXTRACT_BASE_DIR_ENV)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from);
        Self {
            base_dir,
            ..Self::default()
        }
    }

    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(base_dir.into());
        self
    }

    pub fn with_process_id(mut self, process_id: u32) -> Self {
        self.process_id = process_id;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The absolute base directory extraction directories are computed under.
    pub fn resolve_base_dir(&self) -> Result<PathBuf> {
        match &self.base_dir {
            Some(dir) if dir.is_absolute() => Ok(dir.clone()),
            Some(dir) => {
                let cwd = env::current_dir().map_err(|e| {
                    BundleError::ExtractionLocation(format!(
                        "cannot resolve relative base directory {}: {}",
                        dir.display(),
                        e
                    ))
                })?;
                Ok(cwd.join(dir))
            }
            None => default_base_dir(),
        }
    }
}

/// `$HOME/.net`, or `<temp>/.net` when there is no usable home directory.
///
/// The directory is created if missing, owner-only on Unix.
pub fn default_base_dir() -> Result<PathBuf> {
    let parent = dirs::home_dir()
        .filter(|home| home.is_dir())
        .unwrap_or_else(env::temp_dir);
    let base = parent.join(DEFAULT_BASE_DIR_NAME);

    if !base.is_dir() {
        create_private_dir(&base).map_err(|e| {
            BundleError::ExtractionLocation(format!(
                "failed to create default extraction directory {}: {}",
                base.display(),
                e
            ))
        })?;
        debug!("Created default extraction base {}", base.display());
    }
    Ok(base)
}

#[cfg(unix)]
fn create_private_dir(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new().recursive(true).mode(0o700).create(path)
}

#[cfg(not(unix))]
fn create_private_dir(path: &Path) -> std::io::Result<()> {
    fs::create_dir_all(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ExtractionConfig::default();
        assert!(config.base_dir.is_none());
        assert_eq!(config.process_id, std::process::id());
        assert_eq!(config.retry.attempts, 500);
        assert_eq!(config.retry.delay, Duration::from_millis(100));
    }

    #[test]
    fn test_absolute_base_dir_used_verbatim() {
        let temp = tempfile::tempdir().unwrap();
        let config = ExtractionConfig::default().with_base_dir(temp.path());
        assert_eq!(config.resolve_base_dir().unwrap(), temp.path());
    }

    #[test]
    fn test_relative_base_dir_resolved_against_cwd() {
        let config = ExtractionConfig::default().with_base_dir("bundle-cache");
        let resolved = config.resolve_base_dir().unwrap();
        assert!(resolved.is_absolute());
        assert!(resolved.ends_with("bundle-cache"));
    }

    #[test]
    fn test_builders() {
        let retry = RetryPolicy {
            attempts: 3,
            delay: Duration::from_millis(1),
        };
        let config = ExtractionConfig::default()
            .with_process_id(0x2a)
            .with_retry(retry);
        assert_eq!(config.process_id, 0x2a);
        assert_eq!(config.retry, retry);
    }
}
