// src/branch/mod.rs

//! Source branches
//!
//! A [`Branch`] abstracts the source tree of a module: where it lives, how to
//! fetch or refresh it, and a stable identifier for its current state. The
//! identifier (`tree_id`) is stored in the package database as the installed
//! version, which is what makes `build_policy = "updated"` work.

mod local;
mod tarball;

pub use local::LocalBranch;
pub use tarball::TarballBranch;

use crate::build::BuildContext;
use crate::error::Result;
use std::fmt;
use std::path::{Path, PathBuf};

/// Repository a branch belongs to, as written into moduleset snapshots
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryRef {
    /// Repository type attribute (`local`, `tarball`, `system`)
    pub kind: &'static str,
    pub name: String,
    pub href: String,
}

/// Contract every source provider satisfies
pub trait Branch: fmt::Debug {
    /// Directory holding the module's sources
    fn srcdir(&self) -> &Path;

    /// Explicit checkout directory name, if the moduleset set one
    fn checkoutdir(&self) -> Option<&str> {
        None
    }

    fn module_basename(&self) -> String {
        self.srcdir()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Stable identifier for the current state of the working tree
    fn tree_id(&self) -> Option<String>;

    /// Version pinned by the moduleset (tarballs and system modules)
    fn version(&self) -> Option<&str> {
        None
    }

    fn exists(&self) -> bool {
        self.srcdir().is_dir()
    }

    /// False when fetching would need the network and it is disabled
    fn may_checkout(&self, ctx: &BuildContext) -> bool;

    /// Fetch or update the sources
    fn checkout(&self, ctx: &BuildContext) -> Result<()>;

    /// Discard the working tree and fetch it again
    fn force_checkout(&self, ctx: &BuildContext) -> Result<()>;

    /// Working tree has local modifications
    fn is_dirty(&self) -> bool {
        false
    }

    fn is_tarball(&self) -> bool {
        false
    }

    fn repository(&self) -> RepositoryRef;

    /// `<branch>` attributes for snapshots, excluding `repo`
    fn branch_attrs(&self) -> Vec<(&'static str, String)>;
}

/// Placeholder branch of a system module; carries the required version
#[derive(Debug, Clone)]
pub struct SystemBranch {
    repo: String,
    version: Option<String>,
    srcdir: PathBuf,
}

impl SystemBranch {
    pub fn new(repo: impl Into<String>, srcdir: PathBuf, version: Option<String>) -> Self {
        Self {
            repo: repo.into(),
            version,
            srcdir,
        }
    }
}

impl Branch for SystemBranch {
    fn srcdir(&self) -> &Path {
        &self.srcdir
    }

    fn tree_id(&self) -> Option<String> {
        self.version.clone()
    }

    fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    fn may_checkout(&self, _ctx: &BuildContext) -> bool {
        true
    }

    fn checkout(&self, _ctx: &BuildContext) -> Result<()> {
        Ok(())
    }

    fn force_checkout(&self, _ctx: &BuildContext) -> Result<()> {
        Ok(())
    }

    fn repository(&self) -> RepositoryRef {
        RepositoryRef {
            kind: "system",
            name: self.repo.clone(),
            href: String::new(),
        }
    }

    fn branch_attrs(&self) -> Vec<(&'static str, String)> {
        self.version
            .iter()
            .map(|v| ("version", v.clone()))
            .collect()
    }
}
