// src/commands/build.rs
//! Build commands

use super::{GlobalOptions, load_config, seed_modules};
use crate::cli::BuildArgs;
use anyhow::Result;
use jhbuild::build::{Frontend, LogFrontend, TerminalFrontend};
use jhbuild::{BuildContext, BuildScript, Config, Error, ModuleSet, Package};
use tracing::{info, warn};

/// Build modules and their dependencies
///
/// Returns the process exit code: 0 when every module built, 1 otherwise.
pub fn cmd_build(global: &GlobalOptions<'_>, modules: &[String], opts: &BuildArgs) -> Result<i32> {
    let config = load_config(global, opts.overrides())?;
    let set = jhbuild::moduleset::load(&config)?;
    let seeds = seed_modules(modules, &config)?;

    let list = set.get_module_list(&seeds, &config.skip, &config.tags, true, false)?;
    let list = start_at(list, config.start_at.as_deref())?;

    if config.check_sysdeps {
        check_system_modules(&set, &seeds, &config)?;
    }

    run(config, list)
}

/// Build the named modules only, ignoring their dependencies
pub fn cmd_buildone(
    global: &GlobalOptions<'_>,
    modules: &[String],
    opts: &BuildArgs,
) -> Result<i32> {
    let config = load_config(global, opts.overrides())?;
    let set = jhbuild::moduleset::load(&config)?;

    let list = modules
        .iter()
        .map(|name| set.get_module(name, true))
        .collect::<jhbuild::Result<Vec<_>>>()?;

    run(config, list)
}

fn run(config: Config, list: Vec<&Package>) -> Result<i32> {
    if list.is_empty() {
        info!("Nothing to build");
        return Ok(0);
    }
    info!("Building {} module(s)", list.len());

    let frontend: Box<dyn Frontend> = if config.interact {
        Box::new(TerminalFrontend::new())
    } else {
        Box::new(LogFrontend)
    };
    let ctx = BuildContext::with_system_runner(config, frontend);
    let outcome = BuildScript::new(ctx, list).build()?;

    if outcome.interrupted {
        warn!("Build interrupted");
    } else if !outcome.success() {
        warn!("Failed modules: {}", outcome.failures.join(", "));
    }
    Ok(outcome.exit_code())
}

/// Drop the modules before `start_at`
fn start_at<'a>(list: Vec<&'a Package>, name: Option<&str>) -> Result<Vec<&'a Package>> {
    let Some(name) = name else {
        return Ok(list);
    };
    let Some(pos) = list.iter().position(|pkg| pkg.name == name) else {
        return Err(Error::Usage(format!("{name} not in module list")).into());
    };
    Ok(list.into_iter().skip(pos).collect())
}

/// Refuse to build when a system module is missing or too old
fn check_system_modules(set: &ModuleSet, seeds: &[String], config: &Config) -> Result<()> {
    let full = set.get_full_module_list(seeds, &config.skip, true, false, true)?;
    let missing: Vec<String> = set
        .get_module_state(&full)
        .into_iter()
        .filter(|(_, state)| state.is_system && !state.new_enough)
        .map(|(pkg, state)| match state.required_version {
            Some(required) => format!("{} (>= {})", pkg.name, required),
            None => pkg.name.clone(),
        })
        .collect();

    if missing.is_empty() {
        return Ok(());
    }
    for name in &missing {
        warn!("  [FAIL] System module {} is not installed or too old", name);
    }
    Err(Error::Fatal(format!(
        "required system dependencies not installed: {}; install them or use --nodeps",
        missing.join(", ")
    ))
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use jhbuild::modtypes::ModuleKind;

    #[test]
    fn test_start_at() {
        let a = Package::new("a", ModuleKind::Meta);
        let b = Package::new("b", ModuleKind::Meta);
        let c = Package::new("c", ModuleKind::Meta);

        let list = start_at(vec![&a, &b, &c], Some("b")).unwrap();
        let names: Vec<&str> = list.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["b", "c"]);

        assert_eq!(start_at(vec![&a], None).unwrap().len(), 1);
        assert!(start_at(vec![&a], Some("z")).is_err());
    }
}
