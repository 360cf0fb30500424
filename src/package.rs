// src/package.rs

//! Packages: the named build units of a moduleset

use crate::branch::Branch;
use crate::build::BuildContext;
use crate::error::{Error, Result};
use crate::modtypes::ModuleKind;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Kind of a system dependency declared by a module
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SysDepKind {
    /// Executable on PATH, or an absolute file path
    Path,
    /// Header file under one of the C include directories
    CInclude,
    /// Importable python2 module
    Python2,
    /// Entry resolvable through the XML catalog
    Xml,
}

impl SysDepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SysDepKind::Path => "path",
            SysDepKind::CInclude => "c_include",
            SysDepKind::Python2 => "python2",
            SysDepKind::Xml => "xml",
        }
    }
}

impl FromStr for SysDepKind {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "path" => Ok(SysDepKind::Path),
            "c_include" => Ok(SysDepKind::CInclude),
            "python2" => Ok(SysDepKind::Python2),
            "xml" => Ok(SysDepKind::Xml),
            _ => Err(Error::Moduleset(format!("Unknown system dependency type: {s}"))),
        }
    }
}

impl fmt::Display for SysDepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A system dependency with optional alternatives of the same shape
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemDependency {
    pub kind: SysDepKind,
    pub value: String,
    pub alternatives: Vec<SystemDependency>,
}

impl SystemDependency {
    pub fn new(kind: SysDepKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
            alternatives: Vec::new(),
        }
    }
}

/// A named build unit
#[derive(Debug)]
pub struct Package {
    pub name: String,
    pub kind: ModuleKind,
    pub branch: Option<Box<dyn Branch>>,
    /// Hard prerequisites
    pub dependencies: Vec<String>,
    /// Soft prerequisites
    pub suggests: Vec<String>,
    /// Ordering-only edges
    pub after: Vec<String>,
    pub tags: Vec<String>,
    /// pkg-config file used for system version probing, e.g. `glib-2.0.pc`
    pub pkg_config: Option<String>,
    pub systemdependencies: Vec<SystemDependency>,
    /// Variables set for every command run for this module
    pub extra_env: BTreeMap<String, String>,
}

impl Package {
    pub fn new(name: impl Into<String>, kind: ModuleKind) -> Self {
        Self {
            name: name.into(),
            kind,
            branch: None,
            dependencies: Vec::new(),
            suggests: Vec::new(),
            after: Vec::new(),
            tags: Vec::new(),
            pkg_config: None,
            systemdependencies: Vec::new(),
            extra_env: BTreeMap::new(),
        }
    }

    pub fn with_branch(mut self, branch: Box<dyn Branch>) -> Self {
        self.branch = Some(branch);
        self
    }

    pub fn with_dependencies<S: AsRef<str>>(mut self, deps: &[S]) -> Self {
        self.dependencies = deps.iter().map(|d| d.as_ref().to_string()).collect();
        self
    }

    pub fn with_suggests<S: AsRef<str>>(mut self, deps: &[S]) -> Self {
        self.suggests = deps.iter().map(|d| d.as_ref().to_string()).collect();
        self
    }

    pub fn with_after<S: AsRef<str>>(mut self, deps: &[S]) -> Self {
        self.after = deps.iter().map(|d| d.as_ref().to_string()).collect();
        self
    }

    pub fn with_pkg_config(mut self, pc: impl Into<String>) -> Self {
        self.pkg_config = Some(pc.into());
        self
    }

    pub fn is_system(&self) -> bool {
        matches!(self.kind, ModuleKind::System)
    }

    /// Branch, or a build-state error for modules without one
    pub fn branch(&self) -> Result<&dyn Branch> {
        self.branch
            .as_deref()
            .ok_or_else(|| Error::BuildState(format!("module {} has no branch", self.name)))
    }

    pub fn srcdir(&self) -> Result<&Path> {
        Ok(self.branch()?.srcdir())
    }

    /// Directory the build runs in
    ///
    /// Out-of-tree builds go under `buildroot` when configured; types that
    /// forbid in-tree builds fall back to a `_build` directory in the source.
    pub fn builddir(&self, ctx: &BuildContext) -> Result<PathBuf> {
        let branch = self.branch()?;
        let srcdir = branch.srcdir().to_path_buf();
        let mut builddir = srcdir.clone();
        if let Some(buildroot) = &ctx.config().buildroot {
            if self.kind.supports_non_srcdir_builds() {
                let name = branch
                    .checkoutdir()
                    .map(str::to_string)
                    .unwrap_or_else(|| branch.module_basename());
                builddir = buildroot.join(name);
            }
        }
        if self.kind.forces_non_srcdir_builds() && builddir == srcdir {
            builddir = srcdir.join("_build");
        }
        Ok(builddir)
    }

    /// Version of the module's current tree, recorded in the package database
    pub fn revision(&self) -> Option<String> {
        self.branch.as_ref().and_then(|b| b.tree_id())
    }

    /// Version required by the moduleset (tarballs and system modules)
    pub fn required_version(&self) -> Option<&str> {
        self.branch.as_ref().and_then(|b| b.version())
    }

    /// pkg-config module name without the `.pc` suffix
    pub fn pkg_config_name(&self) -> Option<&str> {
        self.pkg_config
            .as_deref()
            .map(|pc| pc.strip_suffix(".pc").unwrap_or(pc))
    }

    /// Module-level variables merged with the per-module config overrides
    pub fn command_env(&self, ctx: &BuildContext) -> BTreeMap<String, String> {
        let mut env = self.extra_env.clone();
        if let Some(overrides) = ctx.config().extra_env_for(&self.name) {
            env.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        env
    }
}

impl fmt::Display for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modtypes::ModuleKind;

    #[test]
    fn test_pkg_config_name() {
        let pkg = Package::new("glib", ModuleKind::Meta).with_pkg_config("glib-2.0.pc");
        assert_eq!(pkg.pkg_config_name(), Some("glib-2.0"));
    }

    #[test]
    fn test_sysdep_kind_names() {
        assert_eq!("c_include".parse::<SysDepKind>().unwrap(), SysDepKind::CInclude);
        assert!("rpm".parse::<SysDepKind>().is_err());
    }

    #[test]
    fn test_meta_has_no_branch() {
        let pkg = Package::new("meta-gnome", ModuleKind::Meta).with_dependencies(&["gtk"]);
        assert!(pkg.branch().is_err());
        assert_eq!(pkg.revision(), None);
        assert_eq!(pkg.dependencies, vec!["gtk".to_string()]);
    }
}
