//! The build step that produces the published files.

use std::io;
use std::path::{Path, PathBuf};

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use thiserror::Error;

use super::copy::{copy_clobber, copy_recursive, purge, stays_inside};
use crate::types::DeploymentFile;

/// Errors a builder can report.
#[derive(Error, Debug)]
pub enum BuildError {
    /// The directory holding the build output does not exist.
    #[error("build output directory not found: {0}")]
    MissingSource(PathBuf),
    /// A delete pattern could not be compiled.
    #[error("invalid delete pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: ignore::Error,
    },
    /// An `addLinks` destination leaves the publish root or enters `.git`.
    #[error("link destination must stay inside the publish root: {0}")]
    OutsideRoot(PathBuf),
    /// A filesystem operation failed.
    #[error("failed to {action} {path}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// A custom builder failed.
    #[error("{0}")]
    Failed(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// What a builder is asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOptions {
    /// Recreate links found in the build output instead of copying their
    /// targets. Deployments always pass `false` so that only real files end
    /// up in the commit.
    pub symlink: bool,
    /// Gitignore-style patterns, relative to the publish root, for entries
    /// removed before anything is written.
    pub delete_patterns: Vec<String>,
    /// Source paths, relative to the build output, left out of the copy.
    pub exclude_links: Vec<PathBuf>,
    /// Extra project paths placed into the publish root.
    pub add_links: Vec<DeploymentFile>,
}

/// Populates a directory with the files to publish.
///
/// Whatever the directory holds afterwards (apart from `.git`) becomes the
/// content of the deployment commit.
pub trait Builder {
    fn build(&self, path: &Path, options: &BuildOptions) -> Result<(), BuildError>;
}

impl<B: Builder + ?Sized> Builder for &B {
    fn build(&self, path: &Path, options: &BuildOptions) -> Result<(), BuildError> {
        (**self).build(path, options)
    }
}

/// Publishes a prebuilt output directory.
///
/// The target is purged with the delete patterns, the output directory is
/// copied over it, then every `add_links` entry is copied from the project.
/// `add_links` are always real copies; `.git` is never written.
#[derive(Debug, Clone)]
pub struct DirectoryBuilder {
    project_dir: PathBuf,
    source: PathBuf,
}

impl DirectoryBuilder {
    /// `source` is resolved against `project_dir` when relative.
    pub fn new(project_dir: impl Into<PathBuf>, source: impl AsRef<Path>) -> Self {
        let project_dir = project_dir.into();
        let source = project_dir.join(source);
        Self { project_dir, source }
    }
}

impl Builder for DirectoryBuilder {
    fn build(&self, path: &Path, options: &BuildOptions) -> Result<(), BuildError> {
        if !self.source.is_dir() {
            return Err(BuildError::MissingSource(self.source.clone()));
        }

        std::fs::create_dir_all(path).map_err(|source| BuildError::Io {
            action: "create",
            path: path.to_path_buf(),
            source,
        })?;

        let matcher = delete_matcher(path, &options.delete_patterns)?;
        let removed = purge(path, &matcher).map_err(|source| BuildError::Io {
            action: "purge",
            path: path.to_path_buf(),
            source,
        })?;
        log::debug!("purged {} entries from {}", removed, path.display());

        let excluded = &options.exclude_links;
        copy_recursive(
            &self.source,
            path,
            &|rel| excluded.iter().any(|ex| rel.starts_with(ex)),
            !options.symlink,
        )
        .map_err(|source| BuildError::Io {
            action: "copy",
            path: self.source.clone(),
            source,
        })?;

        for link in &options.add_links {
            if !stays_inside(&link.dest) {
                return Err(BuildError::OutsideRoot(link.dest.clone()));
            }
            let src = self.project_dir.join(&link.src);
            let dest = path.join(&link.dest);
            log::debug!("adding {} as {}", src.display(), dest.display());
            copy_clobber(&src, &dest).map_err(|source| BuildError::Io {
                action: "add",
                path: src.clone(),
                source,
            })?;
        }

        Ok(())
    }
}

/// Compile `patterns` into a matcher rooted at `root`.
pub fn delete_matcher(root: &Path, patterns: &[String]) -> Result<Gitignore, BuildError> {
    let mut builder = GitignoreBuilder::new(root);
    for pattern in patterns {
        builder
            .add_line(None, pattern)
            .map_err(|source| BuildError::InvalidPattern {
                pattern: pattern.clone(),
                source,
            })?;
    }
    builder.build().map_err(|source| BuildError::InvalidPattern {
        pattern: patterns.join(" "),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn write(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn options() -> BuildOptions {
        BuildOptions {
            symlink: false,
            delete_patterns: vec!["*".into(), "!.git".into()],
            exclude_links: Vec::new(),
            add_links: Vec::new(),
        }
    }

    #[test]
    fn replaces_target_with_build_output() {
        let project = tempdir().unwrap();
        let target = tempdir().unwrap();
        write(project.path(), "build/new.html", "new");
        write(target.path(), "old.html", "old");
        write(target.path(), ".git/HEAD", "ref: refs/heads/gh-pages");

        DirectoryBuilder::new(project.path(), "build")
            .build(target.path(), &options())
            .unwrap();

        assert!(!target.path().join("old.html").exists());
        assert_eq!(fs::read_to_string(target.path().join("new.html")).unwrap(), "new");
        assert!(target.path().join(".git/HEAD").exists());
    }

    #[test]
    fn missing_source_is_reported() {
        let project = tempdir().unwrap();
        let target = tempdir().unwrap();

        let err = DirectoryBuilder::new(project.path(), "build")
            .build(target.path(), &options())
            .unwrap_err();

        assert!(matches!(err, BuildError::MissingSource(p) if p.ends_with("build")));
    }

    #[test]
    fn creates_missing_target() {
        let project = tempdir().unwrap();
        let target = tempdir().unwrap();
        write(project.path(), "build/index.html", "x");
        let folder = target.path().join("docs/site");

        DirectoryBuilder::new(project.path(), "build")
            .build(&folder, &options())
            .unwrap();

        assert!(folder.join("index.html").exists());
    }

    #[test]
    fn excluded_paths_are_not_copied() {
        let project = tempdir().unwrap();
        let target = tempdir().unwrap();
        write(project.path(), "build/index.php", "x");
        write(project.path(), "build/sites/default/files/upload.jpg", "x");
        write(project.path(), "build/sites/default/settings.php", "x");

        let mut opts = options();
        opts.exclude_links = vec![PathBuf::from("sites/default/files")];
        DirectoryBuilder::new(project.path(), "build")
            .build(target.path(), &opts)
            .unwrap();

        assert!(target.path().join("index.php").exists());
        assert!(target.path().join("sites/default/settings.php").exists());
        assert!(!target.path().join("sites/default/files").exists());
    }

    #[test]
    fn add_links_are_copied_from_project() {
        let project = tempdir().unwrap();
        let target = tempdir().unwrap();
        write(project.path(), "build/index.html", "x");
        write(project.path(), "config/sync/system.yml", "yml");

        let mut opts = options();
        opts.add_links = vec![DeploymentFile::new("config", "config")];
        DirectoryBuilder::new(project.path(), "build")
            .build(target.path(), &opts)
            .unwrap();

        let copied = target.path().join("config/sync/system.yml");
        assert_eq!(fs::read_to_string(&copied).unwrap(), "yml");
        assert!(!fs::symlink_metadata(target.path().join("config")).unwrap().file_type().is_symlink());
    }

    #[test]
    fn missing_add_link_fails() {
        let project = tempdir().unwrap();
        let target = tempdir().unwrap();
        write(project.path(), "build/index.html", "x");

        let mut opts = options();
        opts.add_links = vec![DeploymentFile::new("nope", "nope")];
        let err = DirectoryBuilder::new(project.path(), "build")
            .build(target.path(), &opts)
            .unwrap_err();

        assert!(matches!(err, BuildError::Io { action: "add", .. }));
    }

    #[test]
    fn add_link_destinations_must_stay_inside() {
        let project = tempdir().unwrap();
        let target = tempdir().unwrap();
        write(project.path(), "build/index.html", "x");
        write(project.path(), "hooks/post-update", "#!/bin/sh");
        write(target.path(), ".git/hooks/README", "untouched");

        for dest in [".git/hooks", "../escape", "/tmp/abs"] {
            let mut opts = options();
            opts.add_links = vec![DeploymentFile::new("hooks", dest)];
            let err = DirectoryBuilder::new(project.path(), "build")
                .build(target.path(), &opts)
                .unwrap_err();
            assert!(matches!(err, BuildError::OutsideRoot(_)), "{dest} should be refused");
        }
        assert!(target.path().join(".git/hooks/README").exists());
        assert!(!target.path().join(".git/hooks/post-update").exists());
    }

    #[test]
    fn checkout_as_source_leaves_target_repository_alone() {
        let project = tempdir().unwrap();
        let target = tempdir().unwrap();
        write(project.path(), "build/index.html", "x");
        write(project.path(), "build/.git/config", "[remote \"origin\"]");
        write(project.path(), "build/.git/HEAD", "ref: refs/heads/dev");
        write(target.path(), ".git/HEAD", "ref: refs/heads/gh-pages");

        DirectoryBuilder::new(project.path(), "build")
            .build(target.path(), &options())
            .unwrap();

        assert!(target.path().join("index.html").exists());
        assert_eq!(
            fs::read_to_string(target.path().join(".git/HEAD")).unwrap(),
            "ref: refs/heads/gh-pages"
        );
        assert!(!target.path().join(".git/config").exists());
    }

    #[test]
    fn custom_delete_patterns_keep_unmatched_files() {
        let project = tempdir().unwrap();
        let target = tempdir().unwrap();
        write(project.path(), "build/index.html", "new");
        write(target.path(), "index.html", "old");
        write(target.path(), "CNAME", "example.com");

        let mut opts = options();
        opts.delete_patterns = vec!["*.html".into()];
        DirectoryBuilder::new(project.path(), "build")
            .build(target.path(), &opts)
            .unwrap();

        assert_eq!(fs::read_to_string(target.path().join("index.html")).unwrap(), "new");
        assert!(target.path().join("CNAME").exists());
    }

    #[test]
    fn builder_by_reference() {
        struct Touch;
        impl Builder for Touch {
            fn build(&self, path: &Path, _options: &BuildOptions) -> Result<(), BuildError> {
                fs::write(path.join("touched"), "").map_err(|e| BuildError::Failed(Box::new(e)))
            }
        }

        let target = tempdir().unwrap();
        let touch = Touch;
        let by_ref: &dyn Builder = &touch;
        (&by_ref).build(target.path(), &options()).unwrap();
        assert!(target.path().join("touched").exists());
    }
}
