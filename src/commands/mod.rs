// src/commands/mod.rs
//! Command handlers for the jhbuild CLI

mod build;
mod completions;
mod info;
mod list;
mod snapshot;
mod sysdeps;
mod uninstall;

pub use build::{cmd_build, cmd_buildone};
pub use completions::cmd_completions;
pub use info::cmd_info;
pub use list::{ListOptions, cmd_list};
pub use snapshot::cmd_snapshot;
pub use sysdeps::cmd_sysdeps;
pub use uninstall::cmd_uninstall;

use anyhow::Result;
use jhbuild::{Config, Error, Overrides};
use std::path::Path;

/// Options every command shares
#[derive(Debug, Clone, Default)]
pub struct GlobalOptions<'a> {
    pub file: Option<&'a Path>,
    pub moduleset: Option<&'a str>,
    pub quiet: bool,
}

/// Load the configuration file and layer the command-line switches over it
pub fn load_config(global: &GlobalOptions<'_>, mut overrides: Overrides) -> Result<Config> {
    let mut config = Config::load_or_default(global.file)?;
    if let Some(moduleset) = global.moduleset {
        overrides.moduleset = vec![moduleset.to_string()];
    }
    overrides.quiet |= global.quiet;
    config.apply_overrides(overrides);
    Ok(config)
}

/// Explicit modules, or the configured ones when none were named
fn seed_modules(modules: &[String], config: &Config) -> Result<Vec<String>> {
    if !modules.is_empty() {
        return Ok(modules.to_vec());
    }
    if config.modules.is_empty() {
        return Err(Error::Usage(
            "no modules given and none configured in `modules`".to_string(),
        )
        .into());
    }
    Ok(config.modules.clone())
}
