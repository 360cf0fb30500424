// src/commands/snapshot.rs
//! Moduleset snapshots

use super::{GlobalOptions, load_config, seed_modules};
use anyhow::{Context, Result};
use jhbuild::Overrides;
use std::fs;
use std::path::Path;
use tracing::info;

/// Write a standalone moduleset holding the resolved modules
pub fn cmd_snapshot(
    global: &GlobalOptions<'_>,
    modules: &[String],
    output: Option<&Path>,
) -> Result<()> {
    let config = load_config(global, Overrides::default())?;
    let set = jhbuild::moduleset::load(&config)?;
    let seeds = seed_modules(modules, &config)?;

    let list = set.get_full_module_list(&seeds, &config.skip, true, true, true)?;
    let xml = set.snapshot(&list);

    match output {
        Some(path) => {
            fs::write(path, xml)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Wrote snapshot of {} module(s) to {}", list.len(), path.display());
        }
        None => print!("{xml}"),
    }
    Ok(())
}
