//! The deployment pipeline.
//!
//! One deployment runs these stages strictly in sequence, each blocking
//! until done:
//!
//! resolve options -> lock -> create workspace -> clone -> branch ->
//! build -> deployment files -> index -> commit -> push -> remove workspace
//!
//! The first failing stage ends the run. Once the workspace exists it is
//! removed on every path unless `keep_workspace` is set.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use git2::Oid;
use thiserror::Error;

use crate::config::{ConfigError, DeploymentOptions, PartialOptions, resolve};
use crate::git::auth::RemoteAuth;
use crate::git::branch::{BranchResolution, apply_branch_plan, plan_branch};
use crate::git::commit::{commit_tree, rebuild_index};
use crate::git::push::{REMOTE_NAME, push_branch};
use crate::git::{GitError, clone_repository};
use crate::lock::{DEFAULT_LOCK_TIMEOUT, DeployLock, LockError};
use crate::report::{Level, Reporter};
use crate::sync::builder::{BuildError, Builder};
use crate::sync::{SyncError, copy_deployment_files, run_build};
use crate::types::BranchName;
use crate::workspace::Workspace;

/// Announced once the push has succeeded.
pub const SUCCESS_MESSAGE: &str = "The site has been successfully deployed!";

/// Git stage that produced a [`DeployError::Git`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitStage {
    Clone,
    Branch,
    Index,
    Commit,
    Push,
}

impl fmt::Display for GitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Clone => "clone",
            Self::Branch => "branch checkout",
            Self::Index => "index update",
            Self::Commit => "commit",
            Self::Push => "push",
        };
        f.write_str(name)
    }
}

/// Why a deployment failed.
#[derive(Error, Debug)]
pub enum DeployError {
    /// Options are missing or invalid. No workspace was created.
    #[error(transparent)]
    Configuration(#[from] ConfigError),
    /// The workspace directory could not be created.
    #[error("failed to create workspace: {0}")]
    Workspace(#[source] io::Error),
    /// A git operation failed.
    #[error("git {stage} failed: {source}")]
    Git {
        stage: GitStage,
        #[source]
        source: GitError,
    },
    /// The builder failed.
    #[error("build failed: {0}")]
    Build(#[from] BuildError),
    /// Copying deployment files failed.
    #[error(transparent)]
    FileSync(#[from] SyncError),
    /// Another deployment to the same remote branch holds the lock.
    #[error(transparent)]
    Locked(#[from] LockError),
}

impl DeployError {
    fn git(stage: GitStage) -> impl FnOnce(GitError) -> Self {
        move |source| Self::Git { stage, source }
    }
}

/// Outcome of a successful deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deployment {
    /// The pushed commit.
    pub commit: Oid,
    pub branch: BranchName,
    /// How the branch was established in the clone.
    pub resolution: BranchResolution,
    /// Set when the workspace was kept.
    pub workspace: Option<PathBuf>,
}

/// Runs deployments with one builder and one reporter.
pub struct Pipeline<B, R> {
    project_dir: PathBuf,
    builder: B,
    reporter: R,
    auth: RemoteAuth,
    workspace_base: Option<PathBuf>,
    lock_dir: Option<PathBuf>,
    lock_timeout: Duration,
}

impl<B: Builder, R: Reporter> Pipeline<B, R> {
    /// A pipeline with default credentials, workspaces under the system temp
    /// directory and no lock.
    pub fn new(project_dir: impl Into<PathBuf>, builder: B, reporter: R) -> Self {
        Self {
            project_dir: project_dir.into(),
            builder,
            reporter,
            auth: RemoteAuth::default(),
            workspace_base: None,
            lock_dir: None,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    pub fn with_auth(mut self, auth: RemoteAuth) -> Self {
        self.auth = auth;
        self
    }

    /// Create workspaces under `base` instead of the system temp directory.
    pub fn with_workspace_base(mut self, base: impl Into<PathBuf>) -> Self {
        self.workspace_base = Some(base.into());
        self
    }

    /// Serialize deployments per remote branch through lock files in
    /// `lock_dir`. `None` disables locking.
    pub fn with_lock_dir(mut self, lock_dir: Option<PathBuf>) -> Self {
        self.lock_dir = lock_dir;
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Merge the option sources and deploy.
    ///
    /// Configuration errors are reported before anything touches the
    /// filesystem.
    pub fn run(
        &self,
        defaults: &PartialOptions,
        stored: &PartialOptions,
        overrides: &PartialOptions,
    ) -> Result<Deployment, DeployError> {
        let options = match resolve(defaults, stored, overrides) {
            Ok(options) => options,
            Err(e) => {
                let e = DeployError::from(e);
                self.reporter.log(&e.to_string(), Level::Error);
                return Err(e);
            }
        };
        self.deploy(&options)
    }

    /// Deploy with already resolved options. The outcome is reported
    /// exactly once, as success or error.
    pub fn deploy(&self, options: &DeploymentOptions) -> Result<Deployment, DeployError> {
        let result = self.deploy_locked(options);
        match &result {
            Ok(deployment) => {
                log::info!(
                    "deployed {} to {} ({})",
                    deployment.commit,
                    options.branch,
                    deployment.resolution
                );
                self.reporter.log(SUCCESS_MESSAGE, Level::Success);
            }
            Err(e) => self.reporter.log(&e.to_string(), Level::Error),
        }
        result
    }

    fn deploy_locked(&self, options: &DeploymentOptions) -> Result<Deployment, DeployError> {
        let _lock = match &self.lock_dir {
            Some(dir) => Some(DeployLock::acquire(
                dir,
                &options.remote,
                &options.branch,
                self.lock_timeout,
            )?),
            None => None,
        };

        let workspace = match &self.workspace_base {
            Some(base) => Workspace::create_in(base),
            None => Workspace::create(),
        }
        .map_err(DeployError::Workspace)?;

        let outcome = self.run_stages(workspace.path(), options);

        let kept = if options.keep_workspace {
            let path = workspace.keep();
            log::info!("keeping workspace {}", path.display());
            Some(path)
        } else {
            self.status(&format!(
                "Removing the {} directory...",
                workspace.path().display()
            ));
            workspace.destroy();
            None
        };

        let mut deployment = outcome?;
        deployment.workspace = kept;
        Ok(deployment)
    }

    fn run_stages(&self, path: &Path, options: &DeploymentOptions) -> Result<Deployment, DeployError> {
        let branch = &options.branch;

        self.status(&format!("Cloning the repository into {}.", path.display()));
        let repo = clone_repository(&options.remote, path, &self.auth)
            .map_err(DeployError::git(GitStage::Clone))?;

        let resolution = plan_branch(&repo, branch).map_err(DeployError::git(GitStage::Branch))?;
        match resolution {
            BranchResolution::OnTargetBranch => {
                log::debug!("clone is already on {}", branch);
            }
            BranchResolution::FromRemote(_) => {
                self.status(&format!("Checking out the {} branch...", branch));
            }
            BranchResolution::New(_) => {
                self.status(&format!("Creating the {} branch...", branch));
            }
        }
        apply_branch_plan(&repo, branch, resolution).map_err(DeployError::git(GitStage::Branch))?;

        self.status("Building the site...");
        run_build(&self.builder, path, options)?;

        if !options.deployment_files.is_empty() {
            self.status("Copying deployment files...");
            copy_deployment_files(&self.project_dir, path, &options.deployment_files)?;
        }

        self.status("Adding all files to the index...");
        let tree = rebuild_index(&repo).map_err(DeployError::git(GitStage::Index))?;

        self.status("Committing changes...");
        let commit = commit_tree(&repo, tree, options.signature.as_ref(), &options.message)
            .map_err(DeployError::git(GitStage::Commit))?;

        self.status(&format!("Pushing changes to {}/{}...", REMOTE_NAME, branch));
        push_branch(&repo, branch, &self.auth).map_err(DeployError::git(GitStage::Push))?;

        Ok(Deployment {
            commit,
            branch: branch.clone(),
            resolution,
            workspace: None,
        })
    }

    fn status(&self, message: &str) {
        self.reporter.log(message, Level::Status);
    }
}
