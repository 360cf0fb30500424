// src/sysdeps.rs

//! Probing the host for system-provided dependencies
//!
//! Modules may declare a `pkg-config` file and a list of system dependencies
//! (executables on PATH, C headers, python modules, XML catalog entries).
//! The [`SystemProbe`] trait answers whether those are present; [`HostProbe`]
//! asks the running system.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::package::{SysDepKind, SystemDependency};
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::debug;

/// Source of truth for what the host system provides
pub trait SystemProbe {
    /// Installed pkg-config modules mapped to their versions
    fn installed_pkgconfigs(&self) -> Result<HashMap<String, String>>;

    /// Whether a single system dependency (ignoring alternatives) is present
    fn dependency_present(&self, kind: SysDepKind, value: &str) -> bool;

    /// Whether every dependency, or one of its alternatives, is present
    fn dependencies_met(&self, deps: &[SystemDependency]) -> bool {
        deps.iter().all(|dep| {
            self.dependency_present(dep.kind, &dep.value)
                || dep
                    .alternatives
                    .iter()
                    .any(|alt| self.dependency_present(alt.kind, &alt.value))
        })
    }
}

/// Probe backed by `pkg-config` and the filesystem
#[derive(Debug, Clone)]
pub struct HostProbe {
    prefix: PathBuf,
    env: HashMap<String, String>,
}

impl HostProbe {
    pub fn new(config: &Config) -> Self {
        Self {
            prefix: config.prefix.clone(),
            env: crate::environment::build_environment(config)
                .into_iter()
                .collect(),
        }
    }

    fn pkg_config(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("pkg-config")
            .args(args)
            .envs(&self.env)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| Error::Fatal(format!("Failed to run pkg-config: {e}")))?;
        if !output.status.success() {
            return Err(Error::command(
                format!("pkg-config {}", args.join(" ")),
                output.status.code(),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn include_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = Vec::new();
        if let Ok(cppflags) = env::var("CPPFLAGS") {
            dirs.extend(
                cppflags
                    .split_whitespace()
                    .filter_map(|flag| flag.strip_prefix("-I"))
                    .map(PathBuf::from),
            );
        }
        for var in ["C_INCLUDE_PATH", "CPLUS_INCLUDE_PATH"] {
            if let Ok(value) = env::var(var) {
                dirs.extend(value.split(':').filter(|p| !p.is_empty()).map(PathBuf::from));
            }
        }
        dirs.push(self.prefix.join("include"));
        dirs.push(PathBuf::from("/usr/local/include"));
        dirs.push(PathBuf::from("/usr/include"));
        dirs
    }

    fn path_present(&self, value: &str) -> bool {
        let path = Path::new(value);
        if path.is_absolute() {
            return path.is_file();
        }
        let search = self
            .env
            .get("PATH")
            .cloned()
            .unwrap_or_default();
        which::which_in(value, Some(format!("{search}:/sbin:/usr/sbin")), "/").is_ok()
    }

    fn python_module_present(&self, module: &str) -> bool {
        Command::new("python2")
            .arg("-c")
            .arg(format!("import {module}"))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }

    fn xml_entry_present(&self, uri: &str) -> bool {
        Command::new("xmlcatalog")
            .args(["--noout", "/etc/xml/catalog", uri])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }
}

impl SystemProbe for HostProbe {
    fn installed_pkgconfigs(&self) -> Result<HashMap<String, String>> {
        let listing = self.pkg_config(&["--list-all"])?;
        let names: Vec<&str> = listing
            .lines()
            .filter_map(|line| line.split_whitespace().next())
            .collect();
        if names.is_empty() {
            return Ok(HashMap::new());
        }

        let mut args = vec!["--modversion"];
        args.extend(names.iter().copied());
        let versions = self.pkg_config(&args)?;

        let installed: HashMap<String, String> = names
            .iter()
            .zip(versions.lines())
            .map(|(name, version)| (name.to_string(), version.trim().to_string()))
            .collect();
        debug!("pkg-config reports {} installed modules", installed.len());
        Ok(installed)
    }

    fn dependency_present(&self, kind: SysDepKind, value: &str) -> bool {
        match kind {
            SysDepKind::Path => self.path_present(value),
            SysDepKind::CInclude => self.include_dirs().iter().any(|dir| dir.join(value).exists()),
            SysDepKind::Python2 => self.python_module_present(value),
            SysDepKind::Xml => self.xml_entry_present(value),
        }
    }
}
