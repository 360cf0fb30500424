// src/commands/list.rs
//! Module listing

use super::{GlobalOptions, load_config, seed_modules};
use anyhow::Result;
use jhbuild::{Overrides, Package};

#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub skip: Vec<String>,
    pub tags: Vec<String>,
    pub show_revision: bool,
    pub ignore_suggests: bool,
    pub list_optional: bool,
    pub all: bool,
}

/// Print the resolved build order, one module per line
pub fn cmd_list(global: &GlobalOptions<'_>, modules: &[String], opts: ListOptions) -> Result<()> {
    let overrides = Overrides {
        skip: opts.skip,
        tags: opts.tags,
        ..Overrides::default()
    };
    let config = load_config(global, overrides)?;
    let set = jhbuild::moduleset::load(&config)?;

    let list: Vec<&Package> = if opts.all {
        let mut all: Vec<&Package> = set.modules().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    } else {
        let seeds = seed_modules(modules, &config)?;
        set.get_module_list(
            &seeds,
            &config.skip,
            &config.tags,
            !opts.ignore_suggests,
            opts.list_optional,
        )?
    };

    for pkg in list {
        println!("{}", format_entry(pkg, opts.show_revision));
    }
    Ok(())
}

fn format_entry(pkg: &Package, show_revision: bool) -> String {
    if !show_revision {
        return pkg.name.clone();
    }
    match pkg.revision() {
        Some(rev) => format!("{} ({})", pkg.name, rev),
        None => pkg.name.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jhbuild::branch::SystemBranch;
    use jhbuild::modtypes::ModuleKind;
    use std::path::PathBuf;

    #[test]
    fn test_format_entry() {
        let pkg = Package::new("glib", ModuleKind::System)
            .with_branch(Box::new(SystemBranch::new("system", PathBuf::from("/co/glib"), Some("2.80".to_string()))));
        assert_eq!(format_entry(&pkg, false), "glib");
        assert_eq!(format_entry(&pkg, true), "glib (2.80)");
    }
}
