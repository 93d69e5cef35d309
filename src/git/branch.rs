//! Target branch resolution.
//!
//! After the clone, the branch that receives the deployment commit is
//! established as follows:
//!
//! 1. HEAD already names the target branch (born or unborn): nothing to do.
//! 2. `origin/<branch>` exists: create the local branch at its tip, check out.
//! 3. Otherwise: create the local branch at the current HEAD commit and check
//!    it out. On an empty clone HEAD has no commit, so HEAD is pointed at the
//!    unborn branch and the first deployment becomes a root commit.
//!
//! Failures are not retried; a half-created branch may already exist.

use std::fmt;

use git2::build::CheckoutBuilder;
use git2::{BranchType, ErrorCode, Oid, Repository};

use super::GitError;
use crate::types::BranchName;

/// Repository operations the resolver needs.
pub trait BranchOps {
    /// Short name of the branch HEAD points to, even if unborn.
    /// `None` when HEAD is detached.
    fn current_branch(&self) -> Result<Option<String>, GitError>;

    /// Tip of `origin/<branch>`, if that remote-tracking branch exists.
    fn remote_branch_tip(&self, branch: &BranchName) -> Result<Option<Oid>, GitError>;

    /// Commit HEAD resolves to, `None` when HEAD is unborn.
    fn head_commit(&self) -> Result<Option<Oid>, GitError>;

    /// Create local `branch` at `target`. Fails if it already exists.
    fn create_branch(&self, branch: &BranchName, target: Oid) -> Result<(), GitError>;

    /// Make `branch` the checked-out branch, replacing the working tree.
    fn checkout_branch(&self, branch: &BranchName) -> Result<(), GitError>;
}

/// How the target branch was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchResolution {
    /// HEAD was already on the target branch.
    OnTargetBranch,
    /// Created from the remote-tracking branch at this commit.
    FromRemote(Oid),
    /// Created at the clone's HEAD commit, or unborn for an empty clone.
    New(Option<Oid>),
}

impl fmt::Display for BranchResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OnTargetBranch => write!(f, "already checked out"),
            Self::FromRemote(oid) => write!(f, "tracking origin at {}", oid),
            Self::New(Some(oid)) => write!(f, "new at {}", oid),
            Self::New(None) => write!(f, "new (unborn)"),
        }
    }
}

/// Decide what has to happen to get onto `branch`, without changing anything.
pub fn plan_branch<O: BranchOps + ?Sized>(
    ops: &O,
    branch: &BranchName,
) -> Result<BranchResolution, GitError> {
    if ops.current_branch()?.as_deref() == Some(branch.as_str()) {
        return Ok(BranchResolution::OnTargetBranch);
    }

    if let Some(tip) = ops.remote_branch_tip(branch)? {
        return Ok(BranchResolution::FromRemote(tip));
    }

    Ok(BranchResolution::New(ops.head_commit()?))
}

/// Carry out a plan produced by [`plan_branch`].
pub fn apply_branch_plan<O: BranchOps + ?Sized>(
    ops: &O,
    branch: &BranchName,
    plan: BranchResolution,
) -> Result<(), GitError> {
    match plan {
        BranchResolution::OnTargetBranch => return Ok(()),
        BranchResolution::FromRemote(target) | BranchResolution::New(Some(target)) => {
            ops.create_branch(branch, target)?;
        }
        BranchResolution::New(None) => {}
    }
    ops.checkout_branch(branch)
}

impl BranchOps for Repository {
    fn current_branch(&self) -> Result<Option<String>, GitError> {
        let head = self.find_reference("HEAD")?;
        let Some(target) = head.symbolic_target() else {
            return Ok(None);
        };
        Ok(target.strip_prefix("refs/heads/").map(str::to_string))
    }

    fn remote_branch_tip(&self, branch: &BranchName) -> Result<Option<Oid>, GitError> {
        match self.find_branch(&branch.remote_tracking(), BranchType::Remote) {
            Ok(remote) => Ok(Some(remote.get().peel_to_commit()?.id())),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn head_commit(&self) -> Result<Option<Oid>, GitError> {
        match self.head() {
            Ok(head) => Ok(Some(head.peel_to_commit()?.id())),
            Err(e) if matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn create_branch(&self, branch: &BranchName, target: Oid) -> Result<(), GitError> {
        let commit = self.find_commit(target)?;
        self.branch(branch.as_str(), &commit, false)?;
        log::debug!("created branch {} at {}", branch, target);
        Ok(())
    }

    fn checkout_branch(&self, branch: &BranchName) -> Result<(), GitError> {
        let refname = branch.refname();
        match self.find_reference(&refname) {
            Ok(reference) => {
                let tree = reference.peel_to_tree()?;
                let mut checkout = CheckoutBuilder::new();
                checkout.force();
                self.checkout_tree(tree.as_object(), Some(&mut checkout))?;
                self.set_head(&refname)?;
            }
            Err(e) if e.code() == ErrorCode::NotFound => {
                // Unborn: the first commit creates the ref.
                self.set_head(&refname)?;
            }
            Err(e) => return Err(e.into()),
        }
        log::debug!("checked out {}", refname);
        Ok(())
    }
}
