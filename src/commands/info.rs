// src/commands/info.rs
//! Module information

use super::{GlobalOptions, load_config};
use anyhow::Result;
use jhbuild::packagedb::PackageDb;
use jhbuild::{ModuleSet, Overrides, Package};

/// Show metadata, install state and reverse dependencies of a module
pub fn cmd_info(global: &GlobalOptions<'_>, module: &str) -> Result<()> {
    let config = load_config(global, Overrides::default())?;
    let set = jhbuild::moduleset::load(&config)?;
    let pkg = set.get_module(module, true)?;
    let db = PackageDb::new(config.top_builddir(), config.prefix.clone());

    println!("Name: {}", pkg.name);
    println!("Module Set: {}", pkg.tags.first().map(String::as_str).unwrap_or("-"));
    println!("Type: {}", pkg.kind.type_name());

    match db.get(&pkg.name)? {
        Some(entry) => {
            println!("Install version: {}", entry.version);
            println!(
                "Install date: {}",
                entry.installed_date.format("%Y-%m-%d %H:%M:%S")
            );
        }
        None => {
            println!("Install version: not installed");
            println!("Install date: not installed");
        }
    }

    if let Some(branch) = &pkg.branch {
        let repo = branch.repository();
        println!("Source directory: {}", branch.srcdir().display());
        println!("Repository: {} ({})", repo.name, repo.kind);
        if let Some(rev) = branch.tree_id() {
            println!("Tree id: {}", rev);
        }
    }
    if let Some(pc) = &pkg.pkg_config {
        println!("pkg-config: {}", pc);
    }

    print_list("Requires", &pkg.dependencies);
    print_list("Required by", &dependents(&set, pkg));
    print_list("Suggests", &pkg.suggests);
    print_list("After", &pkg.after);
    print_list("Before", &successors(&set, pkg));
    Ok(())
}

fn print_list(label: &str, names: &[String]) {
    if !names.is_empty() {
        println!("{}: {}", label, names.join(", "));
    }
}

/// Modules with a hard dependency on `pkg`
fn dependents(set: &ModuleSet, pkg: &Package) -> Vec<String> {
    set.modules()
        .filter(|other| other.dependencies.contains(&pkg.name))
        .map(|other| other.name.clone())
        .collect()
}

/// Modules ordered after `pkg`
fn successors(set: &ModuleSet, pkg: &Package) -> Vec<String> {
    set.modules()
        .filter(|other| other.after.contains(&pkg.name))
        .map(|other| other.name.clone())
        .collect()
}
