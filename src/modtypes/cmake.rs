// src/modtypes/cmake.rs

//! cmake modules

use super::{configure_unchanged, ensure_builddir, install, join_args};
use crate::build::{BuildContext, CommandSpec};
use crate::config::CmakeGenerator;
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
pub struct CMake {
    pub cmakeargs: String,
    pub makeargs: String,
    pub ninjaargs: String,
    /// Generator choice; `None` follows the configured default
    pub use_ninja: Option<bool>,
    pub skip_install: bool,
}

impl CMake {
    fn uses_ninja(&self, ctx: &BuildContext) -> bool {
        self.use_ninja
            .unwrap_or(ctx.config().cmake_generator == CmakeGenerator::Ninja)
    }

    pub fn configure_command(&self, pkg: &Package, ctx: &BuildContext) -> Result<String> {
        let config = ctx.config();
        let srcdir = pkg.srcdir()?.display().to_string();
        let prefix = format!("-DCMAKE_INSTALL_PREFIX={}", config.prefix.display());
        let libdir = if config.use_lib64 {
            "-DCMAKE_INSTALL_LIBDIR=lib64"
        } else {
            "-DCMAKE_INSTALL_LIBDIR=lib"
        };
        let generator = if self.uses_ninja(ctx) { "-G Ninja" } else { "" };
        Ok(join_args([
            "cmake",
            prefix.as_str(),
            libdir,
            generator,
            self.cmakeargs.as_str(),
            config.cmakeargs_for(&pkg.name),
            srcdir.as_str(),
        ]))
    }

    fn tool(&self, pkg: &Package, ctx: &BuildContext, target: &str) -> String {
        let config = ctx.config();
        if self.uses_ninja(ctx) {
            join_args([
                "ninja",
                self.ninjaargs.as_str(),
                config.ninjaargs_for(&pkg.name),
                target,
            ])
        } else {
            join_args([
                "make",
                self.makeargs.as_str(),
                config.makeargs_for(&pkg.name),
                target,
            ])
        }
    }

    fn run_tool(&self, pkg: &Package, ctx: &BuildContext, target: &str) -> Result<()> {
        let builddir = pkg.builddir(ctx)?;
        ctx.execute(
            CommandSpec::shell(self.tool(pkg, ctx, target), &builddir).with_env(pkg.command_env(ctx)),
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
                let builddir = ensure_builddir(pkg, ctx)?;
                // A stale cache pins the previous generator and options
                let cache = builddir.join("CMakeCache.txt");
                if cache.exists() {
                    fs::remove_file(&cache)?;
                }
                let files = builddir.join("CMakeFiles");
                if files.exists() {
                    fs::remove_dir_all(&files)?;
                }
                let command = self.configure_command(pkg, ctx)?;
                ctx.execute(CommandSpec::shell(command, &builddir).with_env(pkg.command_env(ctx)))?;
            }
            Clean => {
                ctx.set_action("Cleaning", &pkg.name);
                self.run_tool(pkg, ctx, "clean")?;
            }
            Build => {
                ctx.set_action("Building", &pkg.name);
                self.run_tool(pkg, ctx, "")?;
            }
            Check => {
                ctx.set_action("Checking", &pkg.name);
                self.run_tool(pkg, ctx, "test")?;
            }
            Dist => {
                ctx.set_action("Creating tarball for", &pkg.name);
                self.run_tool(pkg, ctx, "package_source")?;
            }
            Install => {
                ctx.set_action("Installing", &pkg.name);
                let destdir = install::prepare_destdir(pkg, ctx)?;
                let builddir = pkg.builddir(ctx)?;
                ctx.execute(
                    CommandSpec::shell(self.tool(pkg, ctx, "install"), &builddir)
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
                configure_unchanged(pkg, ctx, &command, &builddir.join("CMakeCache.txt"), last)
            }
            Check => ctx.config().makecheck_for(&pkg.name) == Some(false),
            Install => self.skip_install,
            _ => false,
        }
    }

    pub(crate) fn xml_attrs(&self) -> Vec<(&'static str, String)> {
        let mut attrs = Vec::new();
        if !self.cmakeargs.is_empty() {
            attrs.push(("cmakeargs", self.cmakeargs.clone()));
        }
        if !self.makeargs.is_empty() {
            attrs.push(("makeargs", self.makeargs.clone()));
        }
        if !self.ninjaargs.is_empty() {
            attrs.push(("ninjaargs", self.ninjaargs.clone()));
        }
        if let Some(use_ninja) = self.use_ninja {
            attrs.push(("use-ninja", use_ninja.to_string()));
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

    #[test]
    fn test_generator_attr_only_when_set() {
        assert!(CMake::default().xml_attrs().is_empty());
        let cmake = CMake {
            use_ninja: Some(false),
            cmakeargs: "-DBUILD_TESTING=OFF".to_string(),
            ..CMake::default()
        };
        assert_eq!(
            cmake.xml_attrs(),
            vec![
                ("cmakeargs", "-DBUILD_TESTING=OFF".to_string()),
                ("use-ninja", "false".to_string()),
            ]
        );
    }
}
