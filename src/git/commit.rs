//! Index rebuild and commit creation.
//!
//! The index is emptied and written before the working tree is re-added.
//! Adding alone would keep entries for files the build no longer produces;
//! clearing first makes the new tree exactly the working tree (minus `.git`
//! and ignored paths).

use git2::{Commit, ErrorCode, IndexAddOption, Oid, Repository, Signature};

use super::GitError;
use crate::types::CommitIdentity;

/// Clear the index, persist it, re-add every file in the working tree and
/// persist again. Returns the id of the tree the index now describes.
pub fn rebuild_index(repo: &Repository) -> Result<Oid, GitError> {
    let mut index = repo.index()?;

    index.clear()?;
    index.write()?;

    index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
    index.write()?;

    let tree = index.write_tree()?;
    log::debug!("index rebuilt with {} entries, tree {}", index.len(), tree);
    Ok(tree)
}

/// The signature for the deployment commit: the given identity stamped with
/// the current time, or the repository's configured `user.name`/`user.email`.
pub fn commit_signature(
    repo: &Repository,
    identity: Option<&CommitIdentity>,
) -> Result<Signature<'static>, GitError> {
    let signature = match identity {
        Some(identity) => Signature::now(&identity.name, &identity.email)?,
        None => repo.signature()?,
    };
    Ok(signature)
}

/// Commit `tree` on top of the checked-out branch and advance it.
///
/// The branch tip is the only parent; an unborn branch gets a root commit.
pub fn commit_tree(
    repo: &Repository,
    tree: Oid,
    identity: Option<&CommitIdentity>,
    message: &str,
) -> Result<Oid, GitError> {
    let signature = commit_signature(repo, identity)?;
    let tree = repo.find_tree(tree)?;

    let parent = head_commit(repo)?;
    let parents: Vec<&Commit<'_>> = parent.iter().collect();

    let oid = repo.commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)?;
    log::debug!("created commit {} with {} parent(s)", oid, parents.len());
    Ok(oid)
}

fn head_commit(repo: &Repository) -> Result<Option<Commit<'_>>, GitError> {
    match repo.head() {
        Ok(head) => Ok(Some(head.peel_to_commit()?)),
        Err(e) if matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => Ok(None),
        Err(e) => Err(e.into()),
    }
}
