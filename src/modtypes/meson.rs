// src/modtypes/meson.rs

//! meson modules, built with ninja in a separate build directory

use super::{configure_unchanged, install, join_args};
use crate::build::{BuildContext, CommandSpec};
use crate::error::Result;
use crate::package::Package;
use crate::phase::{Phase, PhaseControl, PhaseSpec};
use std::fs;

use Phase::*;

pub(crate) const PHASES: &[PhaseSpec] = &[
    PhaseSpec::new(Checkout, &[], &[ForceCheckout]),
    PhaseSpec::confirmed(ForceCheckout, &[], &[ForceCheckout]),
    PhaseSpec::new(Configure, &[Checkout], &[ForceCheckout]),
    PhaseSpec::new(Clean, &[Configure], &[ForceCheckout, Configure]),
    PhaseSpec::new(Build, &[Configure], &[ForceCheckout, Configure]),
    PhaseSpec::new(Check, &[Build], &[ForceCheckout, Configure]),
    PhaseSpec::new(Dist, &[Build], &[ForceCheckout, Configure]),
    PhaseSpec::new(Install, &[Build], &[]),
];

#[derive(Debug, Clone, Default)]
pub struct Meson {
    pub mesonargs: String,
    pub ninjaargs: String,
    pub skip_install: bool,
}

impl Meson {
    pub fn configure_command(&self, pkg: &Package, ctx: &BuildContext) -> Result<String> {
        let config = ctx.config();
        let srcdir = pkg.srcdir()?.display().to_string();
        let prefix = config.prefix.display().to_string();
        let libdir = if config.use_lib64 { "lib64" } else { "lib" };
        Ok(join_args([
            "meson setup --prefix",
            prefix.as_str(),
            "--libdir",
            libdir,
            self.mesonargs.as_str(),
            config.mesonargs_for(&pkg.name),
            srcdir.as_str(),
        ]))
    }

    fn ninja(&self, pkg: &Package, ctx: &BuildContext, target: &str) -> String {
        join_args([
            "ninja",
            self.ninjaargs.as_str(),
            ctx.config().ninjaargs_for(&pkg.name),
            target,
        ])
    }

    fn run_ninja(&self, pkg: &Package, ctx: &BuildContext, target: &str) -> Result<()> {
        let builddir = pkg.builddir(ctx)?;
        ctx.execute(
            CommandSpec::shell(self.ninja(pkg, ctx, target), &builddir).with_env(pkg.command_env(ctx)),
        )
    }

    pub(crate) fn run_phase(
        &self,
        pkg: &Package,
        phase: Phase,
        ctx: &BuildContext,
    ) -> Result<PhaseControl> {
        match phase {
            Configure => {
                ctx.set_action("Configuring", &pkg.name);
                // meson refuses to set up into a populated build directory
                let builddir = pkg.builddir(ctx)?;
                if builddir.exists() {
                    fs::remove_dir_all(&builddir)?;
                }
                fs::create_dir_all(&builddir)?;
                let command = self.configure_command(pkg, ctx)?;
                ctx.execute(CommandSpec::shell(command, &builddir).with_env(pkg.command_env(ctx)))?;
            }
            Clean => {
                ctx.set_action("Cleaning", &pkg.name);
                self.run_ninja(pkg, ctx, "clean")?;
            }
            Build => {
                ctx.set_action("Building", &pkg.name);
                self.run_ninja(pkg, ctx, "")?;
            }
            Check => {
                ctx.set_action("Checking", &pkg.name);
                self.run_ninja(pkg, ctx, "test")?;
            }
            Dist => {
                ctx.set_action("Creating tarball for", &pkg.name);
                self.run_ninja(pkg, ctx, "dist")?;
            }
            Install => {
                ctx.set_action("Installing", &pkg.name);
                let destdir = install::prepare_destdir(pkg, ctx)?;
                let builddir = pkg.builddir(ctx)?;
                ctx.execute(
                    CommandSpec::shell(self.ninja(pkg, ctx, "install"), &builddir)
                        .with_env(pkg.command_env(ctx))
                        .env_var("DESTDIR", destdir.to_string_lossy()),
                )?;
                let configure_cmd = self.configure_command(pkg, ctx)?;
                install::process_install(pkg, ctx, &destdir, Some(&configure_cmd))?;
            }
            _ => {}
        }
        Ok(PhaseControl::Done)
    }

    pub(crate) fn skip_phase(
        &self,
        pkg: &Package,
        phase: Phase,
        last: Option<Phase>,
        ctx: &BuildContext,
    ) -> bool {
        match phase {
            Configure => {
                let (Ok(builddir), Ok(command)) =
                    (pkg.builddir(ctx), self.configure_command(pkg, ctx))
                else {
                    return false;
                };
                configure_unchanged(pkg, ctx, &command, &builddir.join("meson-private"), last)
            }
            Check => ctx.config().makecheck_for(&pkg.name) == Some(false),
            Install => self.skip_install,
            _ => false,
        }
    }

    pub(crate) fn xml_attrs(&self) -> Vec<(&'static str, String)> {
        let mut attrs = Vec::new();
        if !self.mesonargs.is_empty() {
            attrs.push(("mesonargs", self.mesonargs.clone()));
        }
        if !self.ninjaargs.is_empty() {
            attrs.push(("ninjaargs", self.ninjaargs.clone()));
        }
        if self.skip_install {
            attrs.push(("skip-install", "true".to_string()));
        }
        attrs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase::compute_phases;

    #[test]
    fn test_phase_list_with_check() {
        assert_eq!(
            compute_phases(PHASES, &[Check, Install]),
            vec![Checkout, Configure, Build, Check, Install]
        );
        assert!(compute_phases(PHASES, &[Distcheck]).is_empty());
    }

    #[test]
    fn test_xml_attrs() {
        let meson = Meson {
            mesonargs: "-Dintrospection=enabled".to_string(),
            ..Meson::default()
        };
        assert_eq!(
            meson.xml_attrs(),
            vec![("mesonargs", "-Dintrospection=enabled".to_string())]
        );
    }
}
