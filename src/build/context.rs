// src/build/context.rs

//! Shared state of a build run
//!
//! Phase bodies receive a [`BuildContext`]: the configuration, the package
//! database, the build environment and the command runner, plus the
//! frontend hooks for action banners and messages.

use super::exec::{CommandRunner, CommandSpec, SystemRunner};
use super::frontend::Frontend;
use crate::config::Config;
use crate::environment::build_environment;
use crate::error::Result;
use crate::packagedb::PackageDb;
use std::cell::{Cell, RefCell, RefMut};
use std::collections::BTreeMap;
use tracing::debug;

pub struct BuildContext {
    config: Config,
    packagedb: PackageDb,
    env: BTreeMap<String, String>,
    runner: Box<dyn CommandRunner>,
    frontend: RefCell<Box<dyn Frontend>>,
    /// (current module, module count) for banners
    progress: Cell<(usize, usize)>,
}

impl BuildContext {
    pub fn new(config: Config, runner: Box<dyn CommandRunner>, frontend: Box<dyn Frontend>) -> Self {
        let packagedb = PackageDb::new(config.top_builddir(), config.prefix.clone());
        let env = build_environment(&config);
        Self {
            config,
            packagedb,
            env,
            runner,
            frontend: RefCell::new(frontend),
            progress: Cell::new((0, 0)),
        }
    }

    /// Context that runs real commands, niced when `nice_build` is set
    pub fn with_system_runner(config: Config, frontend: Box<dyn Frontend>) -> Self {
        let runner = SystemRunner::new()
            .with_nice(nice_prefix(&config))
            .quiet(config.quiet_mode);
        Self::new(config, Box::new(runner), frontend)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn packagedb(&self) -> &PackageDb {
        &self.packagedb
    }

    /// Variables exported to every command
    pub fn environment(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Run a command with the build environment
    pub fn execute(&self, spec: CommandSpec) -> Result<()> {
        self.runner.run(&spec, &self.env)
    }

    pub fn set_action(&self, action: &str, module: &str) {
        self.frontend
            .borrow_mut()
            .set_action(action, module, self.progress.get());
    }

    pub fn message(&self, msg: &str) {
        self.frontend.borrow_mut().message(msg);
    }

    pub(crate) fn frontend(&self) -> RefMut<'_, Box<dyn Frontend>> {
        self.frontend.borrow_mut()
    }

    pub(crate) fn set_progress(&self, current: usize, total: usize) {
        self.progress.set((current, total));
    }

    /// Re-read the configuration file, keeping command-line overrides
    pub fn reload_config(&mut self) -> Result<()> {
        self.config.reload()?;
        self.env = build_environment(&self.config);
        self.packagedb = PackageDb::new(self.config.top_builddir(), self.config.prefix.clone());
        debug!("Configuration reloaded");
        Ok(())
    }
}

/// Scheduler and I/O priority wrappers found on the host
fn nice_prefix(config: &Config) -> Vec<String> {
    if !config.nice_build {
        return Vec::new();
    }
    let mut prefix = Vec::new();
    if which::which("chrt").is_ok() {
        prefix.extend(["chrt", "--idle", "0"].map(String::from));
    }
    if which::which("ionice").is_ok() {
        prefix.extend(["ionice", "-c", "3", "-t"].map(String::from));
    }
    prefix
}
