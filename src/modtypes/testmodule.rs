// src/modtypes/testmodule.rs

//! Test modules: run a test command against the installed prefix

use crate::build::{BuildContext, CommandSpec};
use crate::error::{Error, Result};
use crate::package::Package;
use crate::phase::{Phase, PhaseControl, PhaseSpec};

use Phase::*;

pub(crate) const PHASES: &[PhaseSpec] = &[
    PhaseSpec::new(Checkout, &[], &[ForceCheckout]),
    PhaseSpec::confirmed(ForceCheckout, &[], &[ForceCheckout]),
    PhaseSpec::new(Test, &[Checkout], &[]),
];

#[derive(Debug, Clone, Default)]
pub struct TestModule {
    /// Free-form kind of test suite (e.g. "ldtp", "dogtail")
    pub test_type: String,
    pub command: Option<String>,
}

impl TestModule {
    pub(crate) fn run_phase(
        &self,
        pkg: &Package,
        phase: Phase,
        ctx: &BuildContext,
    ) -> Result<PhaseControl> {
        if phase != Test {
            return Ok(PhaseControl::Done);
        }
        ctx.set_action("Testing", &pkg.name);
        let Some(command) = &self.command else {
            return Err(Error::BuildState(format!(
                "test module {} has no test command",
                pkg.name
            )));
        };
        let srcdir = pkg.srcdir()?;
        ctx.execute(CommandSpec::shell(command.clone(), srcdir).with_env(pkg.command_env(ctx)))?;
        Ok(PhaseControl::Done)
    }

    pub(crate) fn xml_attrs(&self) -> Vec<(&'static str, String)> {
        let mut attrs = Vec::new();
        if !self.test_type.is_empty() {
            attrs.push(("type", self.test_type.clone()));
        }
        if let Some(command) = &self.command {
            attrs.push(("command", command.clone()));
        }
        attrs
    }
}
