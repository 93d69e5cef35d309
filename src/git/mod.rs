//! Git operations on the deployment clone, all through libgit2.
//!
//! - `clone_repository` - clone `remote` into the workspace
//! - [`branch`] - establish the checked-out target branch
//! - [`commit`] - rebuild the index from the working tree and commit it
//! - [`push`] - publish the branch to `origin`
//!
//! Network access goes through the callbacks assembled in [`auth`].

pub mod auth;
pub mod branch;
pub mod commit;
pub mod push;

use std::path::Path;

use git2::build::RepoBuilder;
use git2::{FetchOptions, Repository};
use thiserror::Error;

use self::auth::RemoteAuth;

/// Errors returned by git operations.
#[derive(Error, Debug)]
pub enum GitError {
    /// libgit2 reported an error.
    #[error("git operation failed: {0}")]
    Git(#[from] git2::Error),
    /// The remote refused to update a reference.
    #[error("remote rejected {refname}: {message}")]
    Rejected { refname: String, message: String },
}

/// Clone `url` into `dest`, which must be missing or an empty directory.
pub fn clone_repository(url: &str, dest: &Path, auth: &RemoteAuth) -> Result<Repository, GitError> {
    let mut fetch = FetchOptions::new();
    fetch.remote_callbacks(auth.callbacks());

    log::debug!("cloning {} into {}", url, dest.display());
    let repo = RepoBuilder::new().fetch_options(fetch).clone(url, dest)?;
    Ok(repo)
}
