//! Publishing the deployment branch to `origin`.

use git2::{PushOptions, Repository};

use super::GitError;
use super::auth::RemoteAuth;
use crate::types::BranchName;

/// Name of the remote every deployment pushes to.
pub const REMOTE_NAME: &str = "origin";

/// Refspec mapping the local branch onto the same name on the remote:
/// `refs/heads/<branch>:refs/heads/<branch>`. Never forced.
pub fn push_refspec(branch: &BranchName) -> String {
    let refname = branch.refname();
    format!("{0}:{0}", refname)
}

/// Push `branch` to `origin`.
///
/// Transport failures and per-reference rejections (for example a
/// non-fast-forward update) are both errors. Nothing is retried.
pub fn push_branch(repo: &Repository, branch: &BranchName, auth: &RemoteAuth) -> Result<(), GitError> {
    let mut remote = repo.find_remote(REMOTE_NAME)?;
    let refspec = push_refspec(branch);
    let mut rejected: Option<(String, String)> = None;

    {
        let mut callbacks = auth.callbacks();
        callbacks.push_update_reference(|refname, status| {
            if let Some(message) = status {
                rejected = Some((refname.to_string(), message.to_string()));
            }
            Ok(())
        });

        let mut options = PushOptions::new();
        options.remote_callbacks(callbacks);

        log::debug!(
            "pushing {} to {}",
            refspec,
            remote.url().unwrap_or("<non-utf8 url>")
        );
        remote.push(&[refspec.as_str()], Some(&mut options))?;
    }

    if let Some((refname, message)) = rejected {
        return Err(GitError::Rejected { refname, message });
    }
    Ok(())
}
