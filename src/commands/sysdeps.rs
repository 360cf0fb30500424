// src/commands/sysdeps.rs
//! System dependency report

use super::{GlobalOptions, load_config, seed_modules};
use anyhow::Result;
use jhbuild::{ModuleState, Overrides, Package};

/// Print which modules the host provides, grouped by state
pub fn cmd_sysdeps(global: &GlobalOptions<'_>, modules: &[String]) -> Result<()> {
    let config = load_config(global, Overrides::default())?;
    let set = jhbuild::moduleset::load(&config)?;
    let seeds = seed_modules(modules, &config)?;

    let full = set.get_full_module_list(&seeds, &config.skip, true, false, false)?;
    let states = set.get_module_state(&full);

    let groups: [(&str, fn(&ModuleState) -> bool); 4] = [
        ("System installed packages which are new enough:", |s| {
            s.installed_version.is_some() && s.new_enough
        }),
        ("Required packages:", |s| s.is_system && s.installed_version.is_none()),
        ("Installed packages which are too old:", |s| {
            s.installed_version.is_some() && !s.new_enough
        }),
        ("No matching system package installed:", |s| {
            !s.is_system && s.installed_version.is_none()
        }),
    ];

    for (heading, selected) in groups {
        println!("{heading}");
        let mut any = false;
        for (pkg, state) in states.iter().filter(|(_, s)| selected(s)) {
            println!("    {}", format_state(pkg, state));
            any = true;
        }
        if !any {
            println!("    (none)");
        }
    }
    Ok(())
}

fn format_state(pkg: &Package, state: &ModuleState) -> String {
    let name = pkg.pkg_config.as_deref().unwrap_or(&pkg.name);
    let required = state.required_version.as_deref().unwrap_or("any");
    match &state.installed_version {
        Some(installed) => format!("{name} (installed: {installed}, required: {required})"),
        None => format!("{name} (required: {required})"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jhbuild::modtypes::ModuleKind;

    #[test]
    fn test_format_state() {
        let pkg = Package::new("glib", ModuleKind::System).with_pkg_config("glib-2.0.pc");
        let state = ModuleState {
            required_version: Some("2.80".to_string()),
            installed_version: Some("2.78.1".to_string()),
            new_enough: false,
            is_system: true,
        };
        assert_eq!(
            format_state(&pkg, &state),
            "glib-2.0.pc (installed: 2.78.1, required: 2.80)"
        );
    }
}
