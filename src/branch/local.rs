// src/branch/local.rs

//! Source trees that already exist on the local filesystem
//!
//! A `local` repository points at a directory of source trees. When the
//! checkout root is elsewhere, checkout copies the module's tree into it;
//! when they coincide the tree is used in place.

use super::{Branch, RepositoryRef};
use crate::build::BuildContext;
use crate::config::CheckoutMode;
use crate::error::{Error, Result};
use sha2::{Digest, Sha256};
use std::fs;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

#[derive(Debug, Clone)]
pub struct LocalBranch {
    repo: String,
    /// Repository root directory
    href: PathBuf,
    /// Path of the module under the repository root
    module: String,
    checkoutdir: Option<String>,
    srcdir: PathBuf,
    /// Module the branch belongs to, for per-module checkout modes
    package: Option<String>,
}

impl LocalBranch {
    pub fn new(
        repo: impl Into<String>,
        href: impl Into<PathBuf>,
        module: impl Into<String>,
        checkoutroot: &Path,
        checkoutdir: Option<String>,
    ) -> Self {
        let module = module.into();
        let dirname = checkoutdir.clone().unwrap_or_else(|| {
            Path::new(&module)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| module.clone())
        });
        Self {
            repo: repo.into(),
            href: href.into(),
            module,
            checkoutdir,
            srcdir: checkoutroot.join(dirname),
            package: None,
        }
    }

    pub fn for_package(mut self, name: impl Into<String>) -> Self {
        self.package = Some(name.into());
        self
    }

    /// Where the pristine sources live
    pub fn source(&self) -> PathBuf {
        self.href.join(&self.module)
    }

    fn in_place(&self) -> bool {
        self.source() == self.srcdir
    }

    fn copy_in(&self) -> Result<()> {
        let source = self.source();
        if !source.is_dir() {
            return Err(Error::BuildState(format!(
                "source tree {} does not exist",
                source.display()
            )));
        }
        if self.srcdir.exists() {
            fs::remove_dir_all(&self.srcdir)?;
        }
        info!("Copying {} to {}", source.display(), self.srcdir.display());
        copy_tree(&source, &self.srcdir)
    }
}

impl Branch for LocalBranch {
    fn srcdir(&self) -> &Path {
        &self.srcdir
    }

    fn checkoutdir(&self) -> Option<&str> {
        self.checkoutdir.as_deref()
    }

    fn tree_id(&self) -> Option<String> {
        let source = self.source();
        if let Some(commit) = git_head(&source) {
            return Some(commit);
        }
        tree_digest(&source).ok()
    }

    fn may_checkout(&self, _ctx: &BuildContext) -> bool {
        true
    }

    fn checkout(&self, ctx: &BuildContext) -> Result<()> {
        if self.in_place() {
            if !self.srcdir.is_dir() {
                return Err(Error::BuildState(format!(
                    "source tree {} does not exist",
                    self.srcdir.display()
                )));
            }
            return Ok(());
        }

        let package = self.package.clone().unwrap_or_else(|| self.module_basename());
        match ctx.config().checkout_mode_for(&package) {
            CheckoutMode::Update if self.srcdir.is_dir() => {
                debug!("{} already checked out", self.srcdir.display());
                Ok(())
            }
            _ => self.copy_in(),
        }
    }

    fn force_checkout(&self, _ctx: &BuildContext) -> Result<()> {
        if self.in_place() {
            return Err(Error::BuildState(format!(
                "cannot force checkout of {}: the tree is used in place",
                self.srcdir.display()
            )));
        }
        self.copy_in()
    }

    fn repository(&self) -> RepositoryRef {
        RepositoryRef {
            kind: "local",
            name: self.repo.clone(),
            href: self.href.to_string_lossy().into_owned(),
        }
    }

    fn branch_attrs(&self) -> Vec<(&'static str, String)> {
        let mut attrs = vec![("module", self.module.clone())];
        if let Some(dir) = &self.checkoutdir {
            attrs.push(("checkoutdir", dir.clone()));
        }
        attrs
    }
}

/// Recursively copy a directory, preserving symlinks
pub(crate) fn copy_tree(from: &Path, to: &Path) -> Result<()> {
    for entry in WalkDir::new(from).follow_links(false) {
        let entry = entry?;
        let rel = entry
            .path()
            .strip_prefix(from)
            .map_err(|e| Error::BuildState(e.to_string()))?;
        let target = to.join(rel);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
        } else if file_type.is_symlink() {
            let link = fs::read_link(entry.path())?;
            symlink(link, &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Commit id of a git work tree, read without spawning git
fn git_head(dir: &Path) -> Option<String> {
    let git = dir.join(".git");
    let head = fs::read_to_string(git.join("HEAD")).ok()?;
    let head = head.trim();
    let Some(reference) = head.strip_prefix("ref: ") else {
        return Some(head.to_string());
    };
    if let Ok(commit) = fs::read_to_string(git.join(reference)) {
        return Some(commit.trim().to_string());
    }
    let packed = fs::read_to_string(git.join("packed-refs")).ok()?;
    packed.lines().find_map(|line| {
        let (commit, name) = line.split_once(' ')?;
        (name == reference).then(|| commit.to_string())
    })
}

/// Digest over relative paths, sizes and modification times of a tree
fn tree_digest(dir: &Path) -> Result<String> {
    if !dir.is_dir() {
        return Err(Error::BuildState(format!("{} is not a directory", dir.display())));
    }
    let mut hasher = Sha256::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry?;
        let metadata = entry.metadata()?;
        let rel = entry.path().strip_prefix(dir).unwrap_or(entry.path());
        let mtime = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(0);
        hasher.update(rel.to_string_lossy().as_bytes());
        hasher.update(metadata.len().to_le_bytes());
        hasher.update(mtime.to_le_bytes());
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_copy_tree() {
        let src = TempDir::new().unwrap();
        fs::create_dir_all(src.path().join("sub")).unwrap();
        fs::write(src.path().join("sub/a.c"), "int a;").unwrap();
        symlink("sub/a.c", src.path().join("link")).unwrap();

        let dst = TempDir::new().unwrap();
        let target = dst.path().join("copy");
        copy_tree(src.path(), &target).unwrap();

        assert_eq!(fs::read_to_string(target.join("sub/a.c")).unwrap(), "int a;");
        assert_eq!(fs::read_link(target.join("link")).unwrap(), PathBuf::from("sub/a.c"));
    }

    #[test]
    fn test_tree_id_tracks_changes() {
        let repo = TempDir::new().unwrap();
        fs::create_dir_all(repo.path().join("foo")).unwrap();
        fs::write(repo.path().join("foo/configure.ac"), "AC_INIT").unwrap();

        let root = TempDir::new().unwrap();
        let branch = LocalBranch::new("local", repo.path(), "foo", root.path(), None);
        let first = branch.tree_id().unwrap();
        assert_eq!(branch.tree_id().unwrap(), first);

        fs::write(repo.path().join("foo/NEWS"), "release").unwrap();
        assert_ne!(branch.tree_id().unwrap(), first);
    }

    #[test]
    fn test_git_head_packed_ref() {
        let repo = TempDir::new().unwrap();
        let git = repo.path().join(".git");
        fs::create_dir_all(&git).unwrap();
        fs::write(git.join("HEAD"), "ref: refs/heads/main\n").unwrap();
        fs::write(git.join("packed-refs"), "# pack-refs\nabc123 refs/heads/main\n").unwrap();
        assert_eq!(git_head(repo.path()), Some("abc123".to_string()));
    }

    #[test]
    fn test_srcdir_uses_checkoutdir() {
        let branch = LocalBranch::new(
            "local",
            "/srv/src",
            "gnome/glib",
            Path::new("/co"),
            Some("glib-main".to_string()),
        );
        assert_eq!(branch.srcdir(), Path::new("/co/glib-main"));
        assert_eq!(branch.source(), PathBuf::from("/srv/src/gnome/glib"));
    }
}
