// src/phase.rs

//! Build phases and phase tables
//!
//! Every module type declares a static table of [`PhaseSpec`] records. The
//! `depends` edges of a table determine the executed phase list for a set of
//! build targets, and the `error_phases` are the recovery choices offered
//! when a phase fails.

use crate::error::Error;
use std::fmt;
use std::str::FromStr;

/// A named step in building a module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Phase {
    Checkout,
    ForceCheckout,
    Configure,
    Clean,
    Distclean,
    Build,
    Check,
    Dist,
    Distcheck,
    Install,
    Test,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Checkout => "checkout",
            Phase::ForceCheckout => "force_checkout",
            Phase::Configure => "configure",
            Phase::Clean => "clean",
            Phase::Distclean => "distclean",
            Phase::Build => "build",
            Phase::Check => "check",
            Phase::Dist => "dist",
            Phase::Distcheck => "distcheck",
            Phase::Install => "install",
            Phase::Test => "test",
        }
    }

    /// The phase a `force_` variant stands in for in a normal phase list
    pub fn canonical(&self) -> Phase {
        match self {
            Phase::ForceCheckout => Phase::Checkout,
            other => *other,
        }
    }
}

impl FromStr for Phase {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "checkout" => Ok(Phase::Checkout),
            "force_checkout" | "force-checkout" => Ok(Phase::ForceCheckout),
            "configure" => Ok(Phase::Configure),
            "clean" => Ok(Phase::Clean),
            "distclean" => Ok(Phase::Distclean),
            "build" => Ok(Phase::Build),
            "check" => Ok(Phase::Check),
            "dist" => Ok(Phase::Dist),
            "distcheck" => Ok(Phase::Distcheck),
            "install" => Ok(Phase::Install),
            "test" => Ok(Phase::Test),
            _ => Err(Error::Usage(format!("Unknown build phase: {s}"))),
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One row of a module type's phase table
#[derive(Debug, Clone, Copy)]
pub struct PhaseSpec {
    pub phase: Phase,
    /// Phases that must run earlier in the executed sequence
    pub depends: &'static [Phase],
    /// Recovery phases offered when this phase fails
    pub error_phases: &'static [Phase],
    /// The user must type "yes" before this phase runs from the error menu
    pub needs_confirmation: bool,
}

impl PhaseSpec {
    pub const fn new(
        phase: Phase,
        depends: &'static [Phase],
        error_phases: &'static [Phase],
    ) -> Self {
        Self {
            phase,
            depends,
            error_phases,
            needs_confirmation: false,
        }
    }

    pub const fn confirmed(
        phase: Phase,
        depends: &'static [Phase],
        error_phases: &'static [Phase],
    ) -> Self {
        Self {
            phase,
            depends,
            error_phases,
            needs_confirmation: true,
        }
    }
}

/// Non-error control signal returned by a phase body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseControl {
    /// Phase completed; continue with the next one
    Done,
    /// Abandon the current sequence and continue at the given phase
    JumpTo(Phase),
    /// Treat the module as complete
    End,
}

/// Look up a phase in a table
pub fn lookup(table: &[PhaseSpec], phase: Phase) -> Option<&PhaseSpec> {
    table.iter().find(|spec| spec.phase == phase)
}

/// Compute the executed phase list for the given targets
///
/// Targets unknown to the table are dropped. Each phase gets its `depends`
/// inserted in front of it (transitively) unless they already appear earlier,
/// then duplicates are removed keeping the first occurrence.
pub fn compute_phases(table: &[PhaseSpec], targets: &[Phase]) -> Vec<Phase> {
    let mut pending: Vec<Phase> = targets.to_vec();
    let mut i = 0;

    while i < pending.len() {
        let Some(spec) = lookup(table, pending[i]) else {
            pending.remove(i);
            continue;
        };

        let missing: Vec<Phase> = spec
            .depends
            .iter()
            .copied()
            .filter(|dep| lookup(table, *dep).is_some() && !pending[..=i].contains(dep))
            .collect();

        if missing.is_empty() {
            i += 1;
        } else {
            pending.splice(i..i, missing);
        }
    }

    let mut phases = Vec::with_capacity(pending.len());
    for phase in pending {
        if !phases.contains(&phase) {
            phases.push(phase);
        }
    }
    phases
}

#[cfg(test)]
mod tests {
    use super::*;
    use Phase::*;

    const TABLE: &[PhaseSpec] = &[
        PhaseSpec::new(Checkout, &[], &[ForceCheckout]),
        PhaseSpec::confirmed(ForceCheckout, &[], &[ForceCheckout]),
        PhaseSpec::new(Configure, &[Checkout], &[ForceCheckout]),
        PhaseSpec::new(Clean, &[Configure], &[ForceCheckout, Configure]),
        PhaseSpec::new(Build, &[Configure], &[ForceCheckout, Configure]),
        PhaseSpec::new(Check, &[Build], &[ForceCheckout, Configure]),
        PhaseSpec::new(Install, &[Build], &[]),
    ];

    #[test]
    fn test_install_pulls_in_chain() {
        assert_eq!(
            compute_phases(TABLE, &[Install]),
            vec![Checkout, Configure, Build, Install]
        );
    }

    #[test]
    fn test_last_phase_is_target() {
        for target in [Checkout, Configure, Build, Check, Install] {
            let phases = compute_phases(TABLE, &[target]);
            assert_eq!(phases.last(), Some(&target));
            for (idx, phase) in phases.iter().enumerate() {
                for dep in lookup(TABLE, *phase).unwrap().depends {
                    let pos = phases.iter().position(|p| p == dep).unwrap();
                    assert!(pos < idx, "{dep} must precede {phase}");
                }
            }
        }
    }

    #[test]
    fn test_clean_and_check_targets() {
        assert_eq!(
            compute_phases(TABLE, &[Clean, Check, Install]),
            vec![Checkout, Configure, Clean, Build, Check, Install]
        );
    }

    #[test]
    fn test_unknown_targets_dropped() {
        assert_eq!(
            compute_phases(TABLE, &[Install, Test]),
            vec![Checkout, Configure, Build, Install]
        );
        assert!(compute_phases(TABLE, &[Dist]).is_empty());
    }

    #[test]
    fn test_phase_names() {
        assert_eq!("force_checkout".parse::<Phase>().unwrap(), ForceCheckout);
        assert_eq!(ForceCheckout.canonical(), Checkout);
        assert_eq!(Install.to_string(), "install");
        assert!("frobnicate".parse::<Phase>().is_err());
    }
}
