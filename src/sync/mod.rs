//! Replacing the workspace tree with the build output.
//!
//! The builder runs against the publish root (the workspace, or a folder
//! inside it), then deployment files are copied from the project into the
//! workspace. Nothing here touches git.

pub mod builder;
pub mod copy;

use std::path::{Path, PathBuf};

use thiserror::Error;

use self::builder::{BuildError, BuildOptions, Builder};
use crate::config::DeploymentOptions;
use crate::types::{DeploymentFile, PublishFolder};

/// Errors copying deployment files.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The project file to copy does not exist.
    #[error("deployment file not found: {0}")]
    MissingSource(PathBuf),
    /// The destination would land outside the workspace or inside `.git`.
    #[error("deployment file destination must stay inside the workspace: {0}")]
    OutsideWorkspace(PathBuf),
    #[error("failed to copy {src} to {dest}: {source}")]
    Copy {
        src: PathBuf,
        dest: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Directory the builder writes into.
pub fn publish_root(workspace: &Path, folder: Option<&PublishFolder>) -> PathBuf {
    match folder {
        Some(folder) => workspace.join(folder.as_path()),
        None => workspace.to_path_buf(),
    }
}

/// Builder options for a deployment. Links are always materialized.
pub fn build_options(options: &DeploymentOptions) -> BuildOptions {
    BuildOptions {
        symlink: false,
        delete_patterns: options.delete_patterns.clone(),
        exclude_links: options.exclude_links.clone(),
        add_links: options.add_links.clone(),
    }
}

/// Run `builder` against the publish root. Returns that root.
pub fn run_build<B: Builder + ?Sized>(
    builder: &B,
    workspace: &Path,
    options: &DeploymentOptions,
) -> Result<PathBuf, BuildError> {
    let root = publish_root(workspace, options.folder.as_ref());
    builder.build(&root, &build_options(options))?;
    Ok(root)
}

/// Copy each `src` (relative to `project_dir`) to `dest` (relative to the
/// workspace root, ignoring `folder`), replacing what is there.
pub fn copy_deployment_files(
    project_dir: &Path,
    workspace: &Path,
    files: &[DeploymentFile],
) -> Result<usize, SyncError> {
    for file in files {
        if !copy::stays_inside(&file.dest) {
            return Err(SyncError::OutsideWorkspace(file.dest.clone()));
        }

        let src = project_dir.join(&file.src);
        let dest = workspace.join(&file.dest);
        if !src.exists() {
            return Err(SyncError::MissingSource(src));
        }

        log::debug!("copying {} to {}", src.display(), dest.display());
        copy::copy_clobber(&src, &dest).map_err(|source| SyncError::Copy {
            src: src.clone(),
            dest: dest.clone(),
            source,
        })?;
    }
    Ok(files.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PartialOptions, resolve};
    use std::fs;
    use tempfile::tempdir;

    fn write(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn options(folder: Option<&str>) -> DeploymentOptions {
        let overrides = PartialOptions {
            remote: Some("r".into()),
            branch: Some("gh-pages".into()),
            folder: folder.map(String::from),
            ..PartialOptions::default()
        };
        resolve(&PartialOptions::defaults(), &PartialOptions::default(), &overrides).unwrap()
    }

    #[test]
    fn publish_root_honors_folder() {
        let ws = Path::new("/tmp/deploy-git-abcdefg");
        assert_eq!(publish_root(ws, None), ws);

        let folder: PublishFolder = "docroot".parse().unwrap();
        assert_eq!(publish_root(ws, Some(&folder)), ws.join("docroot"));
    }

    #[test]
    fn build_options_never_symlink() {
        let opts = build_options(&options(None));
        assert!(!opts.symlink);
        assert_eq!(opts.delete_patterns, vec!["*", "!.git"]);
    }

    #[test]
    fn run_build_targets_folder() {
        let project = tempdir().unwrap();
        let ws = tempdir().unwrap();
        write(project.path(), "build/index.html", "x");
        write(ws.path(), "README.md", "outside the folder");

        let builder = builder::DirectoryBuilder::new(project.path(), "build");
        let root = run_build(&builder, ws.path(), &options(Some("docroot"))).unwrap();

        assert_eq!(root, ws.path().join("docroot"));
        assert!(ws.path().join("docroot/index.html").exists());
        assert!(ws.path().join("README.md").exists());
    }

    #[test]
    fn deployment_files_land_relative_to_workspace_root() {
        let project = tempdir().unwrap();
        let ws = tempdir().unwrap();
        write(project.path(), "deploy/.htaccess", "Deny from all");
        write(ws.path(), ".htaccess", "old");

        let files = vec![DeploymentFile::new("deploy/.htaccess", ".htaccess")];
        let copied = copy_deployment_files(project.path(), ws.path(), &files).unwrap();

        assert_eq!(copied, 1);
        assert_eq!(
            fs::read_to_string(ws.path().join(".htaccess")).unwrap(),
            "Deny from all"
        );
    }

    #[test]
    fn missing_deployment_file_fails() {
        let project = tempdir().unwrap();
        let ws = tempdir().unwrap();

        let files = vec![DeploymentFile::new("missing.txt", "missing.txt")];
        let err = copy_deployment_files(project.path(), ws.path(), &files).unwrap_err();
        assert!(matches!(err, SyncError::MissingSource(_)));
    }

    #[test]
    fn escaping_destination_is_refused() {
        let project = tempdir().unwrap();
        let ws = tempdir().unwrap();
        write(project.path(), "a.txt", "a");

        for dest in ["../a.txt", "/etc/a.txt", ".git/config", "", "sub/../../a.txt"] {
            let files = vec![DeploymentFile::new("a.txt", dest)];
            let result = copy_deployment_files(project.path(), ws.path(), &files);
            assert!(
                matches!(result, Err(SyncError::OutsideWorkspace(_))),
                "{dest} should be refused"
            );
        }

        let files = vec![DeploymentFile::new("a.txt", "./nested/a.txt")];
        copy_deployment_files(project.path(), ws.path(), &files).unwrap();
        assert!(ws.path().join("nested/a.txt").exists());
    }
}
