//! Disposable workspace directory for one deployment.
//!
//! Each workspace is a fresh directory named `deploy-git-XXXXXXX` (seven
//! random characters) under the system temp directory. It is never reused.
//! [`Workspace::destroy`] removes it and only logs failures; dropping a
//! workspace without calling `destroy` still removes it, silently.

use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// Name prefix of every workspace directory.
pub const WORKSPACE_PREFIX: &str = "deploy-git-";

const RANDOM_LEN: usize = 7;

/// An exclusively owned temporary directory holding the clone.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    /// Create a workspace under the system temp directory.
    pub fn create() -> io::Result<Self> {
        Self::create_in(&std::env::temp_dir())
    }

    /// Create a workspace under `base`.
    ///
    /// The returned path is absolute even if `base` is not.
    pub fn create_in(base: &Path) -> io::Result<Self> {
        let base = std::path::absolute(base)?;
        let dir = tempfile::Builder::new()
            .prefix(WORKSPACE_PREFIX)
            .rand_bytes(RANDOM_LEN)
            .tempdir_in(base)?;
        log::debug!("created workspace {}", dir.path().display());
        Ok(Self { dir })
    }

    /// Absolute path of the workspace.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Recursively remove the workspace.
    ///
    /// Errors are logged and otherwise ignored.
    pub fn destroy(self) {
        let path = self.dir.path().to_path_buf();
        match self.dir.close() {
            Ok(()) => log::debug!("removed workspace {}", path.display()),
            Err(e) => log::warn!("failed to remove workspace {}: {}", path.display(), e),
        }
    }

    /// Give up ownership without removing the directory.
    pub fn keep(self) -> PathBuf {
        self.dir.keep()
    }
}
