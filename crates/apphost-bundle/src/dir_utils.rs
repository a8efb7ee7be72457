//! File system helpers for the extraction protocol.

use std::fs;
use std::io;
use std::path::Path;
use std::thread;

use tracing::{trace, warn};

use crate::config::RetryPolicy;

/// Result of [`rename_with_retries`].
#[derive(Debug)]
pub enum RenameOutcome {
    /// The source now lives at the destination.
    Renamed,
    /// The destination already exists; another process committed first.
    DestinationExists,
    /// Rename failed for any other reason, after all retries.
    Failed(io::Error),
}

/// Rename `from` to `to`, retrying while access is denied.
///
/// `destination_exists` decides whether a failed rename lost a race against
/// an identical commit. Access-denied failures are retried up to
/// `policy.attempts` times with `policy.delay` between attempts; other
/// failures end the loop immediately.
pub fn rename_with_retries(
    from: &Path,
    to: &Path,
    policy: &RetryPolicy,
    destination_exists: impl Fn(&Path) -> bool,
) -> RenameOutcome {
    let attempts = policy.attempts.max(1);
    let mut last_error = None;

    for attempt in 0..attempts {
        let error = match fs::rename(from, to) {
            Ok(()) => return RenameOutcome::Renamed,
            Err(e) => e,
        };

        if destination_exists(to) {
            return RenameOutcome::DestinationExists;
        }
        if error.kind() != io::ErrorKind::PermissionDenied {
            return RenameOutcome::Failed(error);
        }

        trace!(
            "Rename {} -> {} denied (attempt {}/{}), retrying",
            from.display(),
            to.display(),
            attempt + 1,
            attempts
        );
        last_error = Some(error);
        if attempt + 1 < attempts {
            thread::sleep(policy.delay);
        }
    }

    RenameOutcome::Failed(
        last_error.unwrap_or_else(|| io::Error::other("rename not attempted")),
    )
}

/// Create `path` and all missing parents.
pub fn create_directory_tree(path: &Path) -> io::Result<()> {
    fs::create_dir_all(path)
}

/// Recursively delete `path`. A missing directory is not an error.
pub fn remove_directory_tree(path: &Path) -> io::Result<()> {
    match fs::remove_dir_all(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// [`remove_directory_tree`] that logs instead of failing.
pub fn remove_directory_tree_best_effort(path: &Path) {
    if let Err(e) = remove_directory_tree(path) {
        warn!("Failed to remove directory {}: {}", path.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            attempts: 3,
            delay: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_rename_directory() {
        let temp = tempfile::tempdir().unwrap();
        let from = temp.path().join("work");
        let to = temp.path().join("final");
        fs::create_dir(&from).unwrap();
        fs::write(from.join("a.txt"), b"a").unwrap();

        let outcome = rename_with_retries(&from, &to, &fast_policy(), |p| p.is_dir());
        assert!(matches!(outcome, RenameOutcome::Renamed));
        assert!(to.join("a.txt").is_file());
        assert!(!from.exists());
    }

    #[test]
    fn test_rename_onto_populated_directory_reports_existing() {
        let temp = tempfile::tempdir().unwrap();
        let from = temp.path().join("work");
        let to = temp.path().join("final");
        fs::create_dir(&from).unwrap();
        fs::write(from.join("a.txt"), b"mine").unwrap();
        fs::create_dir(&to).unwrap();
        fs::write(to.join("a.txt"), b"theirs").unwrap();

        let outcome = rename_with_retries(&from, &to, &fast_policy(), |p| p.is_dir());
        assert!(matches!(outcome, RenameOutcome::DestinationExists));
        assert_eq!(fs::read(to.join("a.txt")).unwrap(), b"theirs");
    }

    #[test]
    fn test_rename_missing_source_fails() {
        let temp = tempfile::tempdir().unwrap();
        let outcome = rename_with_retries(
            &temp.path().join("missing"),
            &temp.path().join("final"),
            &fast_policy(),
            |p| p.is_dir(),
        );
        match outcome {
            RenameOutcome::Failed(e) => assert_eq!(e.kind(), io::ErrorKind::NotFound),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_remove_missing_tree_is_ok() {
        let temp = tempfile::tempdir().unwrap();
        assert!(remove_directory_tree(&temp.path().join("nope")).is_ok());
    }

    #[test]
    fn test_remove_tree() {
        let temp = tempfile::tempdir().unwrap();
        let dir = temp.path().join("a/b/c");
        create_directory_tree(&dir).unwrap();
        fs::write(dir.join("f"), b"x").unwrap();

        remove_directory_tree(&temp.path().join("a")).unwrap();
        assert!(!temp.path().join("a").exists());
    }
}
