//! Option merging and validation.
//!
//! Three [`PartialOptions`] sources are merged field by field with the
//! precedence: invocation overrides > stored configuration > defaults. The
//! first non-empty value wins; empty strings and empty lists count as unset.

pub mod file;

use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;

use crate::types::{BranchName, CommitIdentity, DeploymentFile, ParseError, PublishFolder};

pub use file::{DEFAULT_CONFIG_FILE, load_stored_options};

/// Commit message used when no source provides one.
pub const DEFAULT_MESSAGE: &str = "Deployment from source repository.";

/// Errors returned while resolving deployment options.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// One or more required options are unset in every source.
    #[error("{}", missing_message(.0))]
    MissingFields(Vec<&'static str>),
    /// Exactly one of `name` and `email` was provided.
    #[error("Both name and email options are required for a custom commit signature.")]
    PartialSignature,
    /// The branch option is not a usable branch name.
    #[error("invalid branch option: {0}")]
    InvalidBranch(#[source] ParseError),
    /// The folder option is not a relative path inside the workspace.
    #[error("invalid folder option: {0}")]
    InvalidFolder(#[source] ParseError),
    /// A stored configuration file could not be read.
    #[error("failed to read configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// A stored configuration file is not valid JSON for this tool.
    #[error("failed to parse configuration file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

fn missing_message(fields: &[&'static str]) -> String {
    let quoted = fields
        .iter()
        .map(|f| format!("\"{}\"", f))
        .collect::<Vec<_>>()
        .join(", ");
    if fields.len() == 1 {
        format!("{} option is missing. Cannot deploy.", quoted)
    } else {
        format!("{} options are missing. Cannot deploy.", quoted)
    }
}

/// One source of deployment options. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PartialOptions {
    pub remote: Option<String>,
    pub branch: Option<String>,
    pub message: Option<String>,
    pub folder: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub deployment_files: Option<Vec<DeploymentFile>>,
    pub exclude_links: Option<Vec<PathBuf>>,
    pub add_links: Option<Vec<DeploymentFile>>,
    pub delete_patterns: Option<Vec<String>>,
    pub keep_workspace: Option<bool>,
}

impl PartialOptions {
    /// Built-in defaults: the default message and a purge-everything-but-`.git`
    /// delete rule.
    pub fn defaults() -> Self {
        Self {
            message: Some(DEFAULT_MESSAGE.to_string()),
            delete_patterns: Some(vec!["*".to_string(), "!.git".to_string()]),
            ..Self::default()
        }
    }
}

/// Fully merged and validated options for one deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentOptions {
    pub remote: String,
    pub branch: BranchName,
    pub message: String,
    pub folder: Option<PublishFolder>,
    pub signature: Option<CommitIdentity>,
    pub deployment_files: Vec<DeploymentFile>,
    pub exclude_links: Vec<PathBuf>,
    pub add_links: Vec<DeploymentFile>,
    pub delete_patterns: Vec<String>,
    pub keep_workspace: bool,
}

/// Merge the three sources and validate the result.
///
/// Sources are given lowest precedence first, matching how they are
/// usually gathered: `defaults`, then `stored`, then `overrides`.
pub fn resolve(
    defaults: &PartialOptions,
    stored: &PartialOptions,
    overrides: &PartialOptions,
) -> Result<DeploymentOptions, ConfigError> {
    let sources = [overrides, stored, defaults];

    let remote = first_text(&sources, |s| &s.remote);
    let branch = first_text(&sources, |s| &s.branch);
    let message = first_text(&sources, |s| &s.message);

    let mut missing = Vec::new();
    if remote.is_none() {
        missing.push("remote");
    }
    if branch.is_none() {
        missing.push("branch");
    }
    if message.is_none() {
        missing.push("message");
    }

    let (Some(remote), Some(branch), Some(message)) = (remote, branch, message) else {
        return Err(ConfigError::MissingFields(missing));
    };

    let signature = match (
        first_text(&sources, |s| &s.name),
        first_text(&sources, |s| &s.email),
    ) {
        (Some(name), Some(email)) => Some(CommitIdentity { name, email }),
        (None, None) => None,
        _ => return Err(ConfigError::PartialSignature),
    };

    let branch = branch.parse::<BranchName>().map_err(ConfigError::InvalidBranch)?;
    let folder = first_text(&sources, |s| &s.folder)
        .map(|f| f.parse::<PublishFolder>())
        .transpose()
        .map_err(ConfigError::InvalidFolder)?;

    Ok(DeploymentOptions {
        remote,
        branch,
        message,
        folder,
        signature,
        deployment_files: first_list(&sources, |s| &s.deployment_files),
        exclude_links: first_list(&sources, |s| &s.exclude_links),
        add_links: first_list(&sources, |s| &s.add_links),
        delete_patterns: first_list(&sources, |s| &s.delete_patterns),
        keep_workspace: sources
            .iter()
            .find_map(|s| s.keep_workspace)
            .unwrap_or(false),
    })
}

fn first_text<F>(sources: &[&PartialOptions], field: F) -> Option<String>
where
    F: Fn(&PartialOptions) -> &Option<String>,
{
    sources
        .iter()
        .filter_map(|s| field(s).as_deref())
        .find(|v| !v.trim().is_empty())
        .map(str::to_string)
}

fn first_list<T, F>(sources: &[&PartialOptions], field: F) -> Vec<T>
where
    T: Clone,
    F: Fn(&PartialOptions) -> &Option<Vec<T>>,
{
    sources
        .iter()
        .filter_map(|s| field(s).as_ref())
        .find(|v| !v.is_empty())
        .cloned()
        .unwrap_or_default()
}
