// src/moduleset/mod.rs

//! The module catalog
//!
//! A [`ModuleSet`] owns every [`Package`] loaded from moduleset files.
//! Packages refer to each other by name only; all graph walks go through
//! the set. The resolver orders modules so hard dependencies come first,
//! and [`ModuleSet::get_module_list`] additionally drops modules the host
//! already provides.

mod loader;
mod resolver;
mod snapshot;

pub use loader::load;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::package::Package;
use crate::sysdeps::{HostProbe, SystemProbe};
use crate::version::compare_versions;
use resolver::{Resolver, SkipMatcher};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info, warn};

/// Installed state of a module that the host may provide
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleState {
    pub required_version: Option<String>,
    /// `"unknown"` when only system dependencies could be checked
    pub installed_version: Option<String>,
    pub new_enough: bool,
    pub is_system: bool,
}

pub struct ModuleSet {
    packages: Vec<Package>,
    index: HashMap<String, usize>,
    /// `modules` from the configuration; they and their hard dependencies
    /// are exempt from glob skips
    configured: Vec<String>,
    partial_build: bool,
    /// Turn resolver warnings into usage errors
    strict: bool,
    probe: Box<dyn SystemProbe>,
}

impl fmt::Debug for ModuleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleSet")
            .field("modules", &self.packages.len())
            .field("partial_build", &self.partial_build)
            .finish()
    }
}

impl ModuleSet {
    pub fn new(config: &Config) -> Self {
        Self {
            packages: Vec::new(),
            index: HashMap::new(),
            configured: config.modules.clone(),
            partial_build: config.partial_build,
            strict: false,
            probe: Box::new(HostProbe::new(config)),
        }
    }

    pub fn with_probe(mut self, probe: Box<dyn SystemProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn set_strict(&mut self, strict: bool) {
        self.strict = strict;
    }

    /// Register a package; a later definition replaces an earlier one
    pub fn add(&mut self, package: Package) {
        match self.index.get(&package.name) {
            Some(&idx) => {
                debug!("Module {} redefined", package.name);
                self.packages[idx] = package;
            }
            None => {
                self.index.insert(package.name.clone(), self.packages.len());
                self.packages.push(package);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Every package in definition order
    pub fn modules(&self) -> impl Iterator<Item = &Package> {
        self.packages.iter()
    }

    pub(crate) fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub(crate) fn package_at(&self, idx: usize) -> &Package {
        &self.packages[idx]
    }

    fn lookup_index(&self, name: &str, ignore_case: bool) -> Result<usize> {
        if let Some(idx) = self.index_of(name) {
            return Ok(idx);
        }
        if ignore_case {
            let lower = name.to_lowercase();
            if let Some(pkg) = self.packages.iter().find(|p| p.name.to_lowercase() == lower) {
                info!("fixed case of module '{}' to '{}'", name, pkg.name);
                return Ok(self.index[&pkg.name]);
            }
        }
        Err(Error::Usage(format!(
            "A module called '{name}' could not be found."
        )))
    }

    pub fn get_module(&self, name: &str, ignore_case: bool) -> Result<&Package> {
        self.lookup_index(name, ignore_case)
            .map(|idx| &self.packages[idx])
    }

    pub fn get_module_mut(&mut self, name: &str) -> Option<&mut Package> {
        let idx = self.index_of(name)?;
        Some(&mut self.packages[idx])
    }

    /// Ordered build list: resolved, filtered by tags, without modules the
    /// host provides
    pub fn get_module_list<S: AsRef<str>>(
        &self,
        seeds: &[S],
        skip: &[String],
        tags: &[String],
        include_suggests: bool,
        include_afters: bool,
    ) -> Result<Vec<&Package>> {
        let modules =
            self.get_full_module_list(seeds, skip, include_suggests, include_afters, true)?;
        let modules = self.remove_system_modules(modules);
        Ok(filter_tags(modules, tags))
    }

    /// Ordered list of every module reachable from the seeds
    ///
    /// `["all"]` seeds every module. Unknown dependencies are warnings
    /// (usage errors in strict mode); unknown seeds are always errors. Hard
    /// dependency cycles are reported the same way when
    /// `warn_about_circular_dependencies` is set, and silently broken
    /// otherwise.
    pub fn get_full_module_list<S: AsRef<str>>(
        &self,
        seeds: &[S],
        skip: &[String],
        include_suggests: bool,
        include_afters: bool,
        warn_about_circular_dependencies: bool,
    ) -> Result<Vec<&Package>> {
        let matcher = SkipMatcher::new(skip, &self.configured_closure());

        let seed_indices: Vec<usize> =
            if seeds.len() == 1 && seeds[0].as_ref() == "all" {
                (0..self.packages.len()).collect()
            } else {
                seeds
                    .iter()
                    .map(|seed| self.lookup_index(seed.as_ref(), true))
                    .collect::<Result<_>>()?
            };
        let seed_indices: Vec<usize> = seed_indices
            .into_iter()
            .filter(|&idx| !matcher.matches(&self.packages[idx].name))
            .collect();

        let resolution = Resolver::new(self, &matcher, include_suggests).resolve(&seed_indices);
        let cycles: &[String] = if warn_about_circular_dependencies {
            resolution.cycles.as_slice()
        } else {
            &[]
        };
        for warning in resolution.warnings.iter().chain(cycles) {
            if self.strict {
                return Err(Error::Usage(warning.clone()));
            }
            warn!("{}", warning);
        }

        Ok(resolution
            .order
            .into_iter()
            .filter(|(_, after)| include_afters || !after)
            .map(|(idx, _)| &self.packages[idx])
            .collect())
    }

    /// Configured modules and everything they hard-depend on
    fn configured_closure(&self) -> Vec<String> {
        let mut seen: Vec<String> = Vec::new();
        let mut stack: Vec<&str> = self.configured.iter().map(String::as_str).collect();
        while let Some(name) = stack.pop() {
            if seen.iter().any(|s| s == name) {
                continue;
            }
            seen.push(name.to_string());
            if let Some(idx) = self.index_of(name) {
                stack.extend(self.packages[idx].dependencies.iter().map(String::as_str));
            }
        }
        seen
    }

    fn installed_pkgconfigs(&self) -> HashMap<String, String> {
        self.probe.installed_pkgconfigs().unwrap_or_else(|e| {
            warn!("Could not list installed pkg-config modules: {}", e);
            HashMap::new()
        })
    }

    fn remove_system_modules<'a>(&self, modules: Vec<&'a Package>) -> Vec<&'a Package> {
        let modules = modules.into_iter().filter(|pkg| !pkg.is_system());
        if !self.partial_build {
            return modules.collect();
        }
        let installed = self.installed_pkgconfigs();
        modules
            .filter(|pkg| {
                let Some(name) = pkg.pkg_config_name() else {
                    return true;
                };
                let provided = installed.get(name).is_some_and(|version| {
                    pkg.required_version().is_none_or(|required| {
                        compare_versions(version, required) != Ordering::Less
                    })
                });
                if provided {
                    debug!("{} is provided by the system", pkg.name);
                }
                !provided
            })
            .collect()
    }

    /// State of every module with a pkg-config file or system dependencies
    pub fn get_module_state<'a>(&self, modules: &[&'a Package]) -> Vec<(&'a Package, ModuleState)> {
        let installed = self.installed_pkgconfigs();
        modules
            .iter()
            .filter(|pkg| pkg.pkg_config.is_some() || !pkg.systemdependencies.is_empty())
            .map(|&pkg| {
                let required_version = pkg.required_version().map(str::to_string);
                let mut installed_version = None;
                let mut new_enough = false;
                if let Some(name) = pkg.pkg_config_name() {
                    if let Some(version) = installed.get(name) {
                        new_enough = required_version.as_deref().is_none_or(|required| {
                            compare_versions(version, required) != Ordering::Less
                        });
                        installed_version = Some(version.clone());
                    }
                } else if self.probe.dependencies_met(&pkg.systemdependencies) {
                    installed_version = Some("unknown".to_string());
                    new_enough = true;
                }
                let state = ModuleState {
                    required_version,
                    installed_version,
                    new_enough,
                    is_system: pkg.is_system(),
                };
                (pkg, state)
            })
            .collect()
    }

    /// Serialize modules into a standalone moduleset document
    pub fn snapshot(&self, modules: &[&Package]) -> String {
        snapshot::write(modules)
    }
}

fn filter_tags<'a>(modules: Vec<&'a Package>, tags: &[String]) -> Vec<&'a Package> {
    if tags.is_empty() {
        return modules;
    }
    modules
        .into_iter()
        .filter(|pkg| pkg.tags.iter().any(|tag| tags.contains(tag)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modtypes::ModuleKind;

    fn set(names: &[&str]) -> ModuleSet {
        let mut ms = ModuleSet::new(&Config::default());
        for name in names {
            ms.add(Package::new(*name, ModuleKind::Meta));
        }
        ms
    }

    #[test]
    fn test_case_insensitive_lookup() {
        let ms = set(&["GConf", "glib"]);
        assert_eq!(ms.get_module("gconf", true).unwrap().name, "GConf");
        assert!(ms.get_module("gconf", false).is_err());
        let err = ms.get_module("gtk", true).unwrap_err();
        assert_eq!(err.to_string(), "A module called 'gtk' could not be found.");
    }

    #[test]
    fn test_redefinition_keeps_position() {
        let mut ms = set(&["a", "b"]);
        ms.add(Package::new("a", ModuleKind::autotools()));
        let names: Vec<&str> = ms.modules().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(ms.get_module("a", false).unwrap().kind.type_name(), "autotools");
    }

    #[test]
    fn test_tag_filter() {
        let mut ms = set(&[]);
        let mut gtk = Package::new("gtk", ModuleKind::Meta);
        gtk.tags.push("gnome".to_string());
        ms.add(gtk);
        ms.add(Package::new("zlib", ModuleKind::Meta));
        let list = ms
            .get_module_list(&["all"], &[], &["gnome".to_string()], true, false)
            .unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].name, "gtk");
    }
}
