// src/modtypes/distutils.rs

//! Python `setup.py` modules

use super::install;
use crate::build::{BuildContext, CommandSpec};
use crate::error::Result;
use crate::package::Package;
use crate::phase::{Phase, PhaseControl, PhaseSpec};

use Phase::*;

pub(crate) const PHASES: &[PhaseSpec] = &[
    PhaseSpec::new(Checkout, &[], &[ForceCheckout]),
    PhaseSpec::confirmed(ForceCheckout, &[], &[ForceCheckout]),
    PhaseSpec::new(Build, &[Checkout], &[ForceCheckout]),
    PhaseSpec::new(Install, &[Build], &[]),
];

#[derive(Debug, Clone, Default)]
pub struct Distutils {
    /// Interpreter override; the configured `python` otherwise
    pub python: Option<String>,
}

impl Distutils {
    fn python<'a>(&'a self, ctx: &'a BuildContext) -> &'a str {
        self.python.as_deref().unwrap_or(&ctx.config().python)
    }

    pub(crate) fn run_phase(
        &self,
        pkg: &Package,
        phase: Phase,
        ctx: &BuildContext,
    ) -> Result<PhaseControl> {
        let srcdir = pkg.srcdir()?;
        let builddir = pkg.builddir(ctx)?;
        let python = self.python(ctx);
        match phase {
            Build => {
                ctx.set_action("Building", &pkg.name);
                let build_base = builddir.to_string_lossy();
                let mut argv = vec![python, "setup.py", "build"];
                if builddir != srcdir {
                    argv.extend(["--build-base", &*build_base]);
                }
                ctx.execute(CommandSpec::argv(argv, srcdir).with_env(pkg.command_env(ctx)))?;
            }
            Install => {
                ctx.set_action("Installing", &pkg.name);
                let destdir = install::prepare_destdir(pkg, ctx)?;
                let prefix = ctx.config().prefix.to_string_lossy().into_owned();
                let root = destdir.to_string_lossy().into_owned();
                ctx.execute(
                    CommandSpec::argv(
                        [python, "setup.py", "install", "--prefix", prefix.as_str(), "--root", root.as_str()],
                        srcdir,
                    )
                    .with_env(pkg.command_env(ctx)),
                )?;
                install::process_install(pkg, ctx, &destdir, None)?;
            }
            _ => {}
        }
        Ok(PhaseControl::Done)
    }

    pub(crate) fn xml_attrs(&self) -> Vec<(&'static str, String)> {
        match &self.python {
            Some(python) => vec![("python", python.clone())],
            None => Vec::new(),
        }
    }
}
