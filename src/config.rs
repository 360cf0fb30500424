// src/config.rs

//! Build configuration
//!
//! The configuration is a TOML file (by default `jhbuildrc.toml` in the
//! user's config directory). Every field has a default so an empty file is a
//! valid configuration. Command-line switches are collected in [`Overrides`]
//! and re-applied whenever the file is reloaded.

use crate::error::{Error, Result};
use crate::phase::Phase;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

/// Default configuration file name
pub const CONFIG_FILE_NAME: &str = "jhbuildrc.toml";

/// Whether up-to-date modules are rebuilt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BuildPolicy {
    /// Build every module
    #[default]
    All,
    /// Skip modules whose installed version matches the checked out tree
    Updated,
    /// Like `Updated`, but rebuild when a dependency was installed later
    UpdatedDeps,
}

impl BuildPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildPolicy::All => "all",
            BuildPolicy::Updated => "updated",
            BuildPolicy::UpdatedDeps => "updated-deps",
        }
    }
}

impl FromStr for BuildPolicy {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "all" => Ok(BuildPolicy::All),
            "updated" => Ok(BuildPolicy::Updated),
            "updated-deps" => Ok(BuildPolicy::UpdatedDeps),
            _ => Err(Error::Usage(format!("Invalid build policy: {s}"))),
        }
    }
}

/// How an existing source tree is refreshed on checkout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckoutMode {
    #[default]
    Update,
    Clobber,
    Export,
    Copy,
}

/// Generator used for cmake modules that do not choose one themselves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CmakeGenerator {
    #[default]
    Ninja,
    Make,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Install root
    pub prefix: PathBuf,
    /// Root for source directories
    pub checkoutroot: PathBuf,
    /// Location of the package database; relative paths are under `prefix`
    pub top_builddir: PathBuf,
    /// Out-of-tree build root for modules that support it
    pub buildroot: Option<PathBuf>,
    /// Download cache for tarballs; defaults to `checkoutroot/pkgs`
    pub tarballdir: Option<PathBuf>,
    /// Directory holding `*.trigger` scripts
    pub triggers_dir: Option<PathBuf>,

    /// Moduleset files to load
    pub moduleset: Vec<String>,
    /// Modules built when no module is named on the command line
    pub modules: Vec<String>,
    pub skip: Vec<String>,
    pub tags: Vec<String>,
    /// Flags consulted by `<if condition-set=...>` in modulesets
    pub conditions: BTreeSet<String>,

    pub build_targets: Vec<String>,
    pub build_policy: BuildPolicy,
    pub nonetwork: bool,
    pub nobuild: bool,
    pub makecheck: bool,
    pub makedist: bool,
    pub makedistcheck: bool,
    pub makeclean: bool,
    pub makedistclean: bool,
    pub makecheck_advisory: bool,
    pub nopoison: bool,
    pub trycheckout: bool,
    pub exit_on_error: bool,
    pub interact: bool,
    /// Skip modules installed within the last N seconds
    pub min_age: Option<u64>,
    pub alwaysautogen: bool,
    pub partial_build: bool,
    pub check_sysdeps: bool,
    pub use_lib64: bool,
    pub uninstall_before_install: bool,
    /// Run build commands under `chrt --idle`/`ionice` when available
    pub nice_build: bool,
    /// Only show command output when the command fails
    pub quiet_mode: bool,
    pub start_at: Option<String>,

    pub makeargs: String,
    pub autogenargs: String,
    pub cmakeargs: String,
    pub mesonargs: String,
    pub ninjaargs: String,
    pub cmake_generator: CmakeGenerator,
    pub python: String,
    pub checkout_mode: CheckoutMode,

    pub module_autogenargs: HashMap<String, String>,
    pub module_makeargs: HashMap<String, String>,
    pub module_mesonargs: HashMap<String, String>,
    pub module_cmakeargs: HashMap<String, String>,
    pub module_ninjaargs: HashMap<String, String>,
    pub module_extra_env: HashMap<String, BTreeMap<String, String>>,
    pub module_checkout_mode: HashMap<String, CheckoutMode>,
    pub module_nopoison: HashMap<String, bool>,
    pub module_makecheck: HashMap<String, bool>,

    /// Extra variables exported to every build command
    pub extra_env: BTreeMap<String, String>,

    #[serde(skip)]
    pub(crate) source: Option<PathBuf>,
    #[serde(skip)]
    pub(crate) overrides: Overrides,
}

impl Default for Config {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("/opt"));
        Self {
            prefix: home.join("jhbuild/install"),
            checkoutroot: home.join("jhbuild/checkout"),
            top_builddir: PathBuf::from("_jhbuild"),
            buildroot: None,
            tarballdir: None,
            triggers_dir: None,
            moduleset: Vec::new(),
            modules: Vec::new(),
            skip: Vec::new(),
            tags: Vec::new(),
            conditions: BTreeSet::new(),
            build_targets: vec!["install".to_string()],
            build_policy: BuildPolicy::All,
            nonetwork: false,
            nobuild: false,
            makecheck: false,
            makedist: false,
            makedistcheck: false,
            makeclean: false,
            makedistclean: false,
            makecheck_advisory: false,
            nopoison: false,
            trycheckout: false,
            exit_on_error: false,
            interact: true,
            min_age: None,
            alwaysautogen: false,
            partial_build: true,
            check_sysdeps: true,
            use_lib64: false,
            uninstall_before_install: false,
            nice_build: false,
            quiet_mode: false,
            start_at: None,
            makeargs: String::new(),
            autogenargs: String::new(),
            cmakeargs: String::new(),
            mesonargs: String::new(),
            ninjaargs: String::new(),
            cmake_generator: CmakeGenerator::Ninja,
            python: "python3".to_string(),
            checkout_mode: CheckoutMode::Update,
            module_autogenargs: HashMap::new(),
            module_makeargs: HashMap::new(),
            module_mesonargs: HashMap::new(),
            module_cmakeargs: HashMap::new(),
            module_ninjaargs: HashMap::new(),
            module_extra_env: HashMap::new(),
            module_checkout_mode: HashMap::new(),
            module_nopoison: HashMap::new(),
            module_makecheck: HashMap::new(),
            extra_env: BTreeMap::new(),
            source: None,
            overrides: Overrides::default(),
        }
    }
}

impl Config {
    /// Default configuration file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_FILE_NAME))
    }

    /// Parse a configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        let mut config = Self::parse(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        config.source = Some(path.to_path_buf());
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load the given file, the default file if it exists, or defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::load(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    /// Path the configuration was loaded from
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Re-read the configuration file and re-apply command-line overrides
    pub fn reload(&mut self) -> Result<()> {
        let Some(path) = self.source.clone() else {
            return Err(Error::Config(
                "configuration was not loaded from a file".to_string(),
            ));
        };
        let overrides = self.overrides.clone();
        let mut fresh = Self::load(&path)?;
        fresh.apply_overrides(overrides);
        *self = fresh;
        Ok(())
    }

    /// Apply command-line overrides and remember them for reloads
    pub fn apply_overrides(&mut self, overrides: Overrides) {
        overrides.apply(self);
        self.overrides = overrides;
    }

    fn validate(&self) -> Result<()> {
        if !self.prefix.is_absolute() {
            return Err(Error::Config(format!(
                "prefix must be an absolute path: {}",
                self.prefix.display()
            )));
        }
        if !self.checkoutroot.is_absolute() {
            return Err(Error::Config(format!(
                "checkoutroot must be an absolute path: {}",
                self.checkoutroot.display()
            )));
        }
        for target in &self.build_targets {
            target.parse::<Phase>()?;
        }
        Ok(())
    }

    /// Package database directory
    pub fn top_builddir(&self) -> PathBuf {
        if self.top_builddir.is_absolute() {
            self.top_builddir.clone()
        } else {
            self.prefix.join(&self.top_builddir)
        }
    }

    pub fn tarballdir(&self) -> PathBuf {
        self.tarballdir
            .clone()
            .unwrap_or_else(|| self.checkoutroot.join("pkgs"))
    }

    pub fn libdir(&self) -> PathBuf {
        if self.use_lib64 {
            self.prefix.join("lib64")
        } else {
            self.prefix.join("lib")
        }
    }

    /// Effective phase targets after applying the make* and nobuild flags
    pub fn build_targets(&self) -> Result<Vec<Phase>> {
        let mut targets = self
            .build_targets
            .iter()
            .map(|t| t.parse::<Phase>())
            .collect::<Result<Vec<_>>>()?;

        if self.makecheck && !targets.contains(&Phase::Check) {
            targets.insert(0, Phase::Check);
        }
        if self.makeclean && !targets.contains(&Phase::Clean) {
            targets.insert(0, Phase::Clean);
        }
        if self.makedistclean && !targets.contains(&Phase::Distclean) {
            targets.insert(0, Phase::Distclean);
        }
        if self.makedist && !targets.contains(&Phase::Dist) {
            targets.push(Phase::Dist);
        }
        if self.makedistcheck && !targets.contains(&Phase::Distcheck) {
            targets.push(Phase::Distcheck);
        }
        // Applied last: any other target would pull configure back in
        if self.nobuild {
            targets = vec![Phase::Checkout];
        }
        Ok(targets)
    }

    pub fn autogenargs_for(&self, module: &str) -> &str {
        self.module_autogenargs
            .get(module)
            .unwrap_or(&self.autogenargs)
    }

    pub fn makeargs_for(&self, module: &str) -> &str {
        self.module_makeargs.get(module).unwrap_or(&self.makeargs)
    }

    pub fn mesonargs_for(&self, module: &str) -> &str {
        self.module_mesonargs.get(module).unwrap_or(&self.mesonargs)
    }

    pub fn cmakeargs_for(&self, module: &str) -> &str {
        self.module_cmakeargs.get(module).unwrap_or(&self.cmakeargs)
    }

    pub fn ninjaargs_for(&self, module: &str) -> &str {
        self.module_ninjaargs.get(module).unwrap_or(&self.ninjaargs)
    }

    pub fn checkout_mode_for(&self, module: &str) -> CheckoutMode {
        self.module_checkout_mode
            .get(module)
            .copied()
            .unwrap_or(self.checkout_mode)
    }

    pub fn nopoison_for(&self, module: &str) -> bool {
        self.module_nopoison
            .get(module)
            .copied()
            .unwrap_or(self.nopoison)
    }

    /// Per-module makecheck setting, if one was given
    pub fn makecheck_for(&self, module: &str) -> Option<bool> {
        self.module_makecheck.get(module).copied()
    }

    pub fn extra_env_for(&self, module: &str) -> Option<&BTreeMap<String, String>> {
        self.module_extra_env.get(module)
    }
}

/// Command-line switches layered over the configuration file
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    /// Replaces the configured moduleset list when non-empty
    pub moduleset: Vec<String>,
    pub skip: Vec<String>,
    pub tags: Vec<String>,
    pub nonetwork: bool,
    pub nobuild: bool,
    pub nopoison: bool,
    pub makecheck: bool,
    pub makeclean: bool,
    pub makedist: bool,
    pub makedistcheck: bool,
    pub makedistclean: bool,
    pub exit_on_error: bool,
    pub trycheckout: bool,
    pub alwaysautogen: bool,
    pub no_interact: bool,
    pub nodeps: bool,
    pub quiet: bool,
    pub build_policy: Option<BuildPolicy>,
    pub min_age: Option<u64>,
    pub start_at: Option<String>,
    pub partial_build: Option<bool>,
    pub conditions: Vec<String>,
}

impl Overrides {
    fn apply(&self, config: &mut Config) {
        if !self.moduleset.is_empty() {
            config.moduleset = self.moduleset.clone();
        }
        config.skip.extend(self.skip.iter().cloned());
        if !self.tags.is_empty() {
            config.tags = self.tags.clone();
        }
        config.nonetwork |= self.nonetwork;
        config.nobuild |= self.nobuild;
        config.nopoison |= self.nopoison;
        config.makecheck |= self.makecheck;
        config.makeclean |= self.makeclean;
        config.makedist |= self.makedist;
        config.makedistcheck |= self.makedistcheck;
        config.makedistclean |= self.makedistclean;
        config.exit_on_error |= self.exit_on_error;
        config.trycheckout |= self.trycheckout;
        config.alwaysautogen |= self.alwaysautogen;
        config.quiet_mode |= self.quiet;
        if self.no_interact {
            config.interact = false;
        }
        if self.nodeps {
            config.check_sysdeps = false;
        }
        if let Some(policy) = self.build_policy {
            config.build_policy = policy;
        }
        if self.min_age.is_some() {
            config.min_age = self.min_age;
        }
        if self.start_at.is_some() {
            config.start_at = self.start_at.clone();
        }
        if let Some(partial) = self.partial_build {
            config.partial_build = partial;
        }
        for condition in &self.conditions {
            match condition.strip_prefix('-') {
                Some(removed) => {
                    config.conditions.remove(removed);
                }
                None => {
                    config.conditions.insert(condition.trim_start_matches('+').to_string());
                }
            }
        }
    }
}
