//! Shared types for deploy-git

use std::ffi::OsStr;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;

/// Error type for parsing failures
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("value cannot be empty")]
    Empty,
    #[error("invalid character in value: {0:?}")]
    InvalidCharacter(char),
    #[error("value cannot start with '{0}'")]
    InvalidStart(char),
    #[error("value cannot contain '..'")]
    ParentTraversal,
    #[error("'{0}' is not a valid git branch name")]
    InvalidRefName(String),
    #[error("path must be relative: {0}")]
    AbsolutePath(String),
    #[error("'{0}' is reserved for the repository")]
    ReservedName(String),
}

/// Repository directory inside the workspace.
const GIT_DIR: &str = ".git";

/// A local branch name, as in `refs/heads/<name>`.
///
/// Validation rules:
/// - Non-empty
/// - Cannot contain `..` or control characters
/// - Cannot start with `-`
/// - Must form a valid reference name under `refs/heads/`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BranchName(String);

impl BranchName {
    /// Returns the branch name as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Full reference name: `refs/heads/<name>`
    pub fn refname(&self) -> String {
        format!("refs/heads/{}", self.0)
    }

    /// Name of the remote-tracking branch on `origin`: `origin/<name>`
    pub fn remote_tracking(&self) -> String {
        format!("origin/{}", self.0)
    }
}

impl FromStr for BranchName {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ParseError::Empty);
        }

        if s.starts_with('-') {
            return Err(ParseError::InvalidStart('-'));
        }

        if s.contains("..") {
            return Err(ParseError::ParentTraversal);
        }

        if let Some(c) = s.chars().find(|c| c.is_control()) {
            return Err(ParseError::InvalidCharacter(c));
        }

        if !git2::Reference::is_valid_name(&format!("refs/heads/{}", s)) {
            return Err(ParseError::InvalidRefName(s.to_string()));
        }

        Ok(BranchName(s.to_string()))
    }
}

impl fmt::Display for BranchName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A subdirectory of the workspace that becomes the publish root.
///
/// Always relative, never escapes the workspace and never points into
/// `.git`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishFolder(PathBuf);

impl PublishFolder {
    pub fn as_path(&self) -> &Path {
        &self.0
    }
}

impl FromStr for PublishFolder {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ParseError::Empty);
        }

        let path = Path::new(s);
        let first = path.components().find(|c| *c != Component::CurDir);
        if first == Some(Component::Normal(OsStr::new(GIT_DIR))) {
            return Err(ParseError::ReservedName(s.to_string()));
        }
        for component in path.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                Component::ParentDir => return Err(ParseError::ParentTraversal),
                Component::RootDir | Component::Prefix(_) => {
                    return Err(ParseError::AbsolutePath(s.to_string()));
                }
            }
        }

        Ok(PublishFolder(path.to_path_buf()))
    }
}

impl fmt::Display for PublishFolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// Name and email used for the deployment commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitIdentity {
    pub name: String,
    pub email: String,
}

/// An extra file or directory copied into the workspace after the build.
///
/// `src` is relative to the project directory, `dest` to the workspace root.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeploymentFile {
    pub src: PathBuf,
    pub dest: PathBuf,
}

impl DeploymentFile {
    pub fn new(src: impl Into<PathBuf>, dest: impl Into<PathBuf>) -> Self {
        Self {
            src: src.into(),
            dest: dest.into(),
        }
    }
}
