//! Filesystem helpers: clobbering copies and pattern-driven purges.

use std::fs;
use std::io;
use std::path::{Component, Path};

use ignore::gitignore::Gitignore;

/// Directory that is never purged or overwritten.
pub const GIT_DIR: &str = ".git";

/// Remove whatever exists at `path`. A missing path is not an error.
pub fn remove_path(path: &Path) -> io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Whether `path` is relative, never climbs out with `..`, names at least
/// one entry and does not start inside `.git`.
pub fn stays_inside(path: &Path) -> bool {
    let mut normal = path.components().filter_map(|c| match c {
        Component::Normal(name) => Some(Some(name)),
        Component::CurDir => None,
        _ => Some(None),
    });
    match normal.next() {
        Some(Some(first)) => first != GIT_DIR && normal.all(|c| c.is_some()),
        _ => false,
    }
}

/// Copy `src` (file or directory) to `dest`, replacing whatever `dest`
/// held. An existing directory is removed first, not merged into.
pub fn copy_clobber(src: &Path, dest: &Path) -> io::Result<()> {
    // Fail before touching dest if the source is unreadable.
    fs::metadata(src)?;
    remove_path(dest)?;
    copy_recursive(src, dest, &|_| false, true)
}

/// Copy `src` into `dest`, overwriting files that already exist there.
///
/// `skip` receives each path relative to `src` and prunes it (and, for a
/// directory, everything below it) when it returns true. With
/// `follow_symlinks` set, links are replaced by the content they point at;
/// otherwise they are recreated as links. `.git` entries are never copied,
/// so a source that is itself a checkout cannot overwrite the target's
/// repository.
pub fn copy_recursive(
    src: &Path,
    dest: &Path,
    skip: &dyn Fn(&Path) -> bool,
    follow_symlinks: bool,
) -> io::Result<()> {
    copy_entry(src, src, dest, skip, follow_symlinks)
}

fn copy_entry(
    root: &Path,
    src: &Path,
    dest: &Path,
    skip: &dyn Fn(&Path) -> bool,
    follow_symlinks: bool,
) -> io::Result<()> {
    let meta = if follow_symlinks {
        fs::metadata(src)?
    } else {
        fs::symlink_metadata(src)?
    };

    if meta.file_type().is_symlink() {
        remove_path(dest)?;
        return copy_link(src, dest);
    }

    if meta.is_dir() {
        match fs::symlink_metadata(dest) {
            Ok(existing) if !existing.is_dir() => fs::remove_file(dest)?,
            _ => {}
        }
        fs::create_dir_all(dest)?;

        for entry in fs::read_dir(src)? {
            let entry = entry?;
            if entry.file_name() == GIT_DIR {
                continue;
            }
            let path = entry.path();
            let rel = path.strip_prefix(root).unwrap_or(&path);
            if skip(rel) {
                log::debug!("skipping {}", rel.display());
                continue;
            }
            copy_entry(root, &path, &dest.join(entry.file_name()), skip, follow_symlinks)?;
        }
        return Ok(());
    }

    match fs::symlink_metadata(dest) {
        Ok(existing) if existing.is_dir() => fs::remove_dir_all(dest)?,
        Ok(existing) if existing.file_type().is_symlink() => fs::remove_file(dest)?,
        _ => {}
    }
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(src, dest)?;
    Ok(())
}

#[cfg(unix)]
fn copy_link(src: &Path, dest: &Path) -> io::Result<()> {
    let target = fs::read_link(src)?;
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    std::os::unix::fs::symlink(target, dest)
}

#[cfg(not(unix))]
fn copy_link(src: &Path, dest: &Path) -> io::Result<()> {
    copy_entry(src, src, dest, &|_| false, true)
}

/// Remove every entry under `root` the matcher ignores.
///
/// A matching directory is removed whole; a non-matching one is descended
/// into. `.git` at any level is left alone. Returns the number of entries
/// removed.
pub fn purge(root: &Path, matcher: &Gitignore) -> io::Result<usize> {
    let mut removed = 0;
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if entry.file_name() == GIT_DIR {
            continue;
        }

        let path = entry.path();
        let is_dir = entry.file_type()?.is_dir();
        if matcher.matched(&path, is_dir).is_ignore() {
            remove_path(&path)?;
            removed += 1;
        } else if is_dir {
            removed += purge(&path, matcher)?;
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ignore::gitignore::GitignoreBuilder;
    use tempfile::tempdir;

    fn write(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn matcher(root: &Path, patterns: &[&str]) -> Gitignore {
        let mut builder = GitignoreBuilder::new(root);
        for pattern in patterns {
            builder.add_line(None, pattern).unwrap();
        }
        builder.build().unwrap()
    }

    #[test]
    fn purge_everything_but_git() {
        let dir = tempdir().unwrap();
        write(dir.path(), ".git/HEAD", "ref: refs/heads/main");
        write(dir.path(), "index.html", "x");
        write(dir.path(), "assets/app.js", "x");
        write(dir.path(), ".nojekyll", "");

        let removed = purge(dir.path(), &matcher(dir.path(), &["*", "!.git"])).unwrap();

        assert_eq!(removed, 3);
        assert!(dir.path().join(".git/HEAD").exists());
        assert!(!dir.path().join("index.html").exists());
        assert!(!dir.path().join("assets").exists());
        assert!(!dir.path().join(".nojekyll").exists());
    }

    #[test]
    fn purge_keeps_git_even_without_negation() {
        let dir = tempdir().unwrap();
        write(dir.path(), ".git/HEAD", "ref: refs/heads/main");
        write(dir.path(), "index.html", "x");

        purge(dir.path(), &matcher(dir.path(), &["*"])).unwrap();

        assert!(dir.path().join(".git/HEAD").exists());
        assert!(!dir.path().join("index.html").exists());
    }

    #[test]
    fn purge_honors_negated_entries() {
        let dir = tempdir().unwrap();
        write(dir.path(), "CNAME", "example.com");
        write(dir.path(), "old.html", "x");

        purge(dir.path(), &matcher(dir.path(), &["*", "!.git", "!CNAME"])).unwrap();

        assert!(dir.path().join("CNAME").exists());
        assert!(!dir.path().join("old.html").exists());
    }

    #[test]
    fn purge_descends_into_unmatched_dirs() {
        let dir = tempdir().unwrap();
        write(dir.path(), "docs/page.html", "x");
        write(dir.path(), "docs/page.md", "x");
        write(dir.path(), "root.html", "x");

        purge(dir.path(), &matcher(dir.path(), &["*.html"])).unwrap();

        assert!(!dir.path().join("docs/page.html").exists());
        assert!(dir.path().join("docs/page.md").exists());
        assert!(!dir.path().join("root.html").exists());
    }

    #[test]
    fn copy_recursive_overwrites_and_skips() {
        let src = tempdir().unwrap();
        let dest = tempdir().unwrap();
        write(src.path(), "index.html", "new");
        write(src.path(), "sites/default/files/big.bin", "skip me");
        write(src.path(), "sites/default/settings.php", "keep");
        write(dest.path(), "index.html", "old");

        let excluded = Path::new("sites/default/files");
        copy_recursive(src.path(), dest.path(), &|rel| rel.starts_with(excluded), true).unwrap();

        assert_eq!(fs::read_to_string(dest.path().join("index.html")).unwrap(), "new");
        assert!(dest.path().join("sites/default/settings.php").exists());
        assert!(!dest.path().join("sites/default/files").exists());
    }

    #[test]
    fn copy_recursive_never_copies_git_dirs() {
        let src = tempdir().unwrap();
        let dest = tempdir().unwrap();
        write(src.path(), ".git/config", "[remote \"origin\"]\n\turl = elsewhere");
        write(src.path(), "vendor/lib/.git/HEAD", "ref: refs/heads/other");
        write(src.path(), "vendor/lib/mod.js", "x");
        write(src.path(), "index.html", "x");
        write(dest.path(), ".git/config", "mine");

        copy_recursive(src.path(), dest.path(), &|_| false, true).unwrap();

        assert_eq!(fs::read_to_string(dest.path().join(".git/config")).unwrap(), "mine");
        assert!(!dest.path().join("vendor/lib/.git").exists());
        assert!(dest.path().join("vendor/lib/mod.js").exists());
        assert!(dest.path().join("index.html").exists());
    }

    #[test]
    fn stays_inside_rules() {
        for ok in ["a.txt", "./nested/a.txt", "docs/.gitignore", "sub/.git/x"] {
            assert!(stays_inside(Path::new(ok)), "{ok} should be accepted");
        }
        for bad in ["", ".", "../a.txt", "/etc/a.txt", ".git", "./.git/config", "sub/../../a"] {
            assert!(!stays_inside(Path::new(bad)), "{bad} should be refused");
        }
    }

    #[test]
    fn copy_clobber_replaces_directory_wholesale() {
        let src = tempdir().unwrap();
        let dest = tempdir().unwrap();
        write(src.path(), "config/a.txt", "a");
        write(dest.path(), "config/stale.txt", "stale");

        copy_clobber(&src.path().join("config"), &dest.path().join("config")).unwrap();

        assert!(dest.path().join("config/a.txt").exists());
        assert!(!dest.path().join("config/stale.txt").exists());
    }

    #[test]
    fn copy_clobber_replaces_file() {
        let src = tempdir().unwrap();
        let dest = tempdir().unwrap();
        write(src.path(), "CNAME", "new.example.com");
        write(dest.path(), "deep/CNAME", "old.example.com");

        copy_clobber(&src.path().join("CNAME"), &dest.path().join("deep/CNAME")).unwrap();

        assert_eq!(
            fs::read_to_string(dest.path().join("deep/CNAME")).unwrap(),
            "new.example.com"
        );
    }

    #[test]
    fn copy_clobber_missing_source_leaves_dest() {
        let src = tempdir().unwrap();
        let dest = tempdir().unwrap();
        write(dest.path(), "CNAME", "keep");

        let result = copy_clobber(&src.path().join("missing"), &dest.path().join("CNAME"));

        assert!(result.is_err());
        assert!(dest.path().join("CNAME").exists());
    }

    #[test]
    #[cfg(unix)]
    fn copy_follows_symlinks_when_asked() {
        let src = tempdir().unwrap();
        let dest = tempdir().unwrap();
        write(src.path(), "real/file.txt", "content");
        std::os::unix::fs::symlink(src.path().join("real"), src.path().join("link")).unwrap();

        copy_recursive(src.path(), dest.path(), &|_| false, true).unwrap();

        let copied = dest.path().join("link");
        assert!(!fs::symlink_metadata(&copied).unwrap().file_type().is_symlink());
        assert_eq!(fs::read_to_string(copied.join("file.txt")).unwrap(), "content");
    }

    #[test]
    #[cfg(unix)]
    fn copy_preserves_symlinks_otherwise() {
        let src = tempdir().unwrap();
        let dest = tempdir().unwrap();
        write(src.path(), "real.txt", "content");
        std::os::unix::fs::symlink("real.txt", src.path().join("link.txt")).unwrap();

        copy_recursive(src.path(), dest.path(), &|_| false, false).unwrap();

        let copied = dest.path().join("link.txt");
        assert!(fs::symlink_metadata(&copied).unwrap().file_type().is_symlink());
        assert_eq!(fs::read_link(&copied).unwrap(), Path::new("real.txt"));
    }
}
