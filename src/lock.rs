//! Advisory lock serialising deployments to the same remote branch.
//!
//! Only deployments started from the same machine see each other. Two hosts
//! pushing to the same branch still race at the push, where the remote's
//! fast-forward check decides.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fs2::FileExt;
use thiserror::Error;

use crate::types::BranchName;

/// Default lock timeout (5 minutes) - prevents indefinite hangs
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Errors returned while acquiring a deployment lock.
#[derive(Error, Debug)]
pub enum LockError {
    /// Another deployment held the lock for the whole timeout.
    #[error("another deployment to {target} is in progress (waited {waited:?})")]
    TimedOut { target: String, waited: Duration },
    /// The lock file could not be created or locked.
    #[error("failed to lock {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Default directory for lock files: `{cache_dir}/deploy-git/locks`.
pub fn default_lock_dir() -> Option<PathBuf> {
    dirs::cache_dir().map(|p| p.join("deploy-git").join("locks"))
}

/// Lock file for a remote/branch pair: `{lock_dir}/<remote>__<branch>.lock`
/// with every character outside `[A-Za-z0-9._-]` replaced by `_`.
pub fn lock_path(lock_dir: &Path, remote: &str, branch: &BranchName) -> PathBuf {
    let sanitize = |s: &str| -> String {
        s.chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    };
    lock_dir.join(format!("{}__{}.lock", sanitize(remote), sanitize(branch.as_str())))
}

/// A guard that holds an exclusive lock on a remote branch.
/// Lock is released when dropped.
#[derive(Debug)]
pub struct DeployLock {
    file: File,
}

impl DeployLock {
    /// Acquire the lock for `remote`/`branch`, blocking until available or
    /// until `timeout` elapses. Creates the lock file and parent dirs if needed.
    pub fn acquire(
        lock_dir: &Path,
        remote: &str,
        branch: &BranchName,
        timeout: Duration,
    ) -> Result<Self, LockError> {
        let path = lock_path(lock_dir, remote, branch);
        let io_err = |source| LockError::Io {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(io_err)?;

        // Poll with exponential backoff
        let start = Instant::now();
        let mut sleep_duration = Duration::from_millis(10);
        let max_sleep = Duration::from_millis(500);
        let mut announced = false;

        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    log::debug!("acquired deployment lock {}", path.display());
                    return Ok(Self { file });
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    if start.elapsed() >= timeout {
                        return Err(LockError::TimedOut {
                            target: format!("{} ({})", remote, branch),
                            waited: timeout,
                        });
                    }
                    if !announced {
                        log::info!("waiting for another deployment to {} ({})", remote, branch);
                        announced = true;
                    }
                    std::thread::sleep(sleep_duration);
                    sleep_duration = (sleep_duration * 2).min(max_sleep);
                }
                Err(e) => return Err(io_err(e)),
            }
        }
    }
}

impl Drop for DeployLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
