//! Publish a built site to a branch of a remote git repository.
//!
//! A deployment clones the remote into a disposable workspace, switches to
//! the target branch, replaces the tree with the build output plus any extra
//! deployment files, commits and pushes. See [`pipeline::Pipeline`].

pub mod config;
pub mod git;
pub mod lock;
pub mod pipeline;
pub mod report;
pub mod sync;
pub mod types;
pub mod workspace;

pub use config::{DeploymentOptions, PartialOptions};
pub use pipeline::{DeployError, Deployment, Pipeline};
pub use report::{ConsoleReporter, Level, Reporter};
pub use sync::builder::{BuildOptions, Builder, DirectoryBuilder};
