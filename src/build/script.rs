// src/build/script.rs

//! The build engine
//!
//! [`BuildScript`] walks an ordered module list and drives each module
//! through its phase list. Phase errors go to the frontend's error handler
//! (or the automatic retry policy), dependents of failed modules are
//! poisoned, and triggers run after every successful install.

use super::context::BuildContext;
use super::frontend::{ErrorChoice, ErrorRequest, RecoveryOption};
use crate::error::{Error, Result};
use crate::modtypes;
use crate::package::Package;
use crate::phase::{Phase, PhaseControl, PhaseSpec, compute_phases, lookup};
use crate::trigger::{self, TriggerRunner};
use chrono::Utc;
use tracing::{debug, info, warn};

/// Result of a whole build run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildOutcome {
    /// Modules that failed or were poisoned, in build order
    pub failures: Vec<String>,
    /// The run stopped on Ctrl-C
    pub interrupted: bool,
}

impl BuildOutcome {
    pub fn success(&self) -> bool {
        self.failures.is_empty() && !self.interrupted
    }

    /// Process exit status for this outcome
    pub fn exit_code(&self) -> i32 {
        if self.interrupted {
            130
        } else if self.failures.is_empty() {
            0
        } else {
            1
        }
    }
}

/// Progress of the `trycheckout` automatic recovery for one module
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RetryState {
    Untried,
    Reconfigured,
    Exhausted,
}

#[derive(Debug, Default)]
struct ModuleOutcome {
    failed: bool,
    installed: bool,
    /// `exit_on_error` hit; no further modules run
    stop: bool,
}

pub struct BuildScript<'a> {
    ctx: BuildContext,
    modules: Vec<&'a Package>,
    triggers: TriggerRunner,
}

impl<'a> BuildScript<'a> {
    pub fn new(ctx: BuildContext, modules: Vec<&'a Package>) -> Self {
        let triggers = match &ctx.config().triggers_dir {
            Some(dir) => trigger::load_all(dir).unwrap_or_else(|e| {
                warn!("Failed to load triggers from {}: {}", dir.display(), e);
                Vec::new()
            }),
            None => Vec::new(),
        };
        Self {
            ctx,
            modules,
            triggers: TriggerRunner::new(triggers),
        }
    }

    pub fn with_triggers(mut self, triggers: TriggerRunner) -> Self {
        self.triggers = triggers;
        self
    }

    pub fn context(&self) -> &BuildContext {
        &self.ctx
    }

    pub fn into_context(self) -> BuildContext {
        self.ctx
    }

    /// Build every module in order
    ///
    /// Phase failures are reported through the outcome; only usage, fatal
    /// and configuration errors are returned as `Err`.
    pub fn build(&mut self) -> Result<BuildOutcome> {
        let targets = self.ctx.config().build_targets()?;
        let names: Vec<&str> = self.modules.iter().map(|pkg| pkg.name.as_str()).collect();
        self.ctx.frontend().start_build(&names);

        let total = self.modules.len();
        let mut outcome = BuildOutcome::default();

        for idx in 0..total {
            let pkg = self.modules[idx];
            self.ctx.set_progress(idx + 1, total);

            if self.installed_recently(pkg) {
                self.ctx
                    .message(&format!("Skipping {} (installed recently)", pkg.name));
                continue;
            }

            self.ctx.frontend().start_module(&pkg.name);

            if let Some(dep) = pkg.dependencies.iter().find(|d| outcome.failures.contains(d)) {
                if self.ctx.config().nopoison_for(&pkg.name) {
                    self.ctx.message(&format!(
                        "module {} will be built even though {} failed",
                        pkg.name, dep
                    ));
                } else {
                    self.ctx.message(&format!(
                        "module {} not built due to non buildable {}",
                        pkg.name, dep
                    ));
                    outcome.failures.push(pkg.name.clone());
                    self.ctx.frontend().end_module(&pkg.name, true);
                    continue;
                }
            }

            let result = match self.build_module(pkg, &targets) {
                Ok(result) => result,
                Err(Error::Interrupted) => {
                    warn!("Build interrupted during {}", pkg.name);
                    outcome.failures.push(pkg.name.clone());
                    outcome.interrupted = true;
                    self.ctx.frontend().end_module(&pkg.name, true);
                    break;
                }
                Err(e) => return Err(e),
            };

            if result.installed && !result.failed {
                self.run_triggers(pkg);
            }
            if result.failed {
                outcome.failures.push(pkg.name.clone());
            }
            self.ctx.frontend().end_module(&pkg.name, result.failed);
            if result.stop {
                break;
            }
        }

        self.ctx.frontend().end_build(&outcome.failures);
        if outcome.success() {
            info!("Build finished: {} module(s)", total);
        } else {
            info!("Build finished with {} failure(s)", outcome.failures.len());
        }
        Ok(outcome)
    }

    fn installed_recently(&self, pkg: &Package) -> bool {
        let Some(min_age) = self.ctx.config().min_age else {
            return false;
        };
        let Some(installed) = self.ctx.packagedb().installdate(&pkg.name) else {
            return false;
        };
        let age = i64::try_from(min_age).unwrap_or(i64::MAX);
        (Utc::now() - installed).num_seconds() < age
    }

    fn build_module(&mut self, pkg: &Package, targets: &[Phase]) -> Result<ModuleOutcome> {
        let table = pkg.kind.phase_table();
        let mut phases = compute_phases(table, targets);
        let mut outcome = ModuleOutcome::default();
        let mut num_phase = 0;
        let mut force_phase = false;
        let mut last_phase: Option<Phase> = None;
        let mut retry = RetryState::Untried;

        debug!(
            "{}: phases {}",
            pkg.name,
            phases.iter().map(Phase::as_str).collect::<Vec<_>>().join(", ")
        );

        while num_phase < phases.len() {
            let phase = phases[num_phase];
            if !force_phase && modtypes::skip_phase(pkg, phase, last_phase, &self.ctx) {
                debug!("{}: skipping phase {}", pkg.name, phase);
                num_phase += 1;
                continue;
            }
            if !pkg.kind.has_phase(phase) {
                num_phase += 1;
                continue;
            }

            self.ctx.frontend().start_phase(&pkg.name, phase);
            let result = modtypes::run_phase(pkg, phase, &self.ctx);
            self.ctx
                .frontend()
                .end_phase(&pkg.name, phase, result.as_ref().err());
            last_phase = Some(phase);

            let error = match result {
                Ok(PhaseControl::Done) => {
                    if phase == Phase::Install {
                        outcome.installed = true;
                    }
                    force_phase = false;
                    num_phase += 1;
                    continue;
                }
                Ok(PhaseControl::JumpTo(target)) => {
                    force_phase = false;
                    match phases.iter().position(|p| *p == target) {
                        Some(idx) => num_phase = idx,
                        None => {
                            phases.insert(num_phase + 1, target);
                            num_phase += 1;
                        }
                    }
                    continue;
                }
                Ok(PhaseControl::End) => break,
                Err(e) if e.is_phase_error() => e,
                Err(e) => return Err(e),
            };

            if self.ctx.config().exit_on_error {
                self.ctx.frontend().fatal_error(&pkg.name, phase, &error);
                outcome.failed = true;
                outcome.stop = true;
                break;
            }

            let alternatives = recovery_options(table, phase);
            let choice = match self.automatic_choice(&mut retry, phase, &alternatives) {
                Some(choice) => {
                    info!("{}: {} failed, retrying automatically", pkg.name, phase);
                    choice
                }
                None if !self.ctx.config().interact => ErrorChoice::Fail,
                None => {
                    let next_phase = phases.get(num_phase + 1).copied();
                    self.ask(pkg, phase, next_phase, &error, alternatives)
                }
            };

            force_phase = true;
            match choice {
                ErrorChoice::Fail => {
                    outcome.failed = true;
                    break;
                }
                ErrorChoice::Continue | ErrorChoice::ReloadConfig => break,
                ErrorChoice::Run(target) => {
                    let found = phases[num_phase..]
                        .iter()
                        .position(|p| *p == target)
                        .map(|i| i + num_phase)
                        .or_else(|| phases.iter().position(|p| *p == target));
                    match found {
                        Some(idx) => num_phase = idx,
                        None => insert_recovery(&mut phases, num_phase, target, phase, table),
                    }
                }
            }
        }

        Ok(outcome)
    }

    /// Recovery chosen by `trycheckout` without asking: configure again,
    /// then a forced checkout
    fn automatic_choice(
        &self,
        state: &mut RetryState,
        failed: Phase,
        alternatives: &[RecoveryOption],
    ) -> Option<ErrorChoice> {
        if !self.ctx.config().trycheckout {
            return None;
        }
        let offered = |phase: Phase| alternatives.iter().any(|o| o.phase == phase);

        if *state == RetryState::Untried && (failed == Phase::Configure || offered(Phase::Configure))
        {
            *state = RetryState::Reconfigured;
            return Some(ErrorChoice::Run(Phase::Configure));
        }
        if *state != RetryState::Exhausted && offered(Phase::ForceCheckout) {
            *state = RetryState::Exhausted;
            return Some(ErrorChoice::Run(Phase::ForceCheckout));
        }
        *state = RetryState::Exhausted;
        None
    }

    fn ask(
        &mut self,
        pkg: &Package,
        phase: Phase,
        next_phase: Option<Phase>,
        error: &Error,
        alternatives: Vec<RecoveryOption>,
    ) -> ErrorChoice {
        loop {
            let request = ErrorRequest {
                module: &pkg.name,
                phase,
                next_phase,
                error,
                alternatives: alternatives.clone(),
                builddir: pkg.builddir(&self.ctx).ok(),
            };
            let choice = self.ctx.frontend().handle_error(&request);
            if choice != ErrorChoice::ReloadConfig {
                return choice;
            }
            match self.ctx.reload_config() {
                Ok(()) => self.ctx.message("Configuration reloaded"),
                Err(e) => {
                    warn!("Failed to reload configuration: {}", e);
                    self.ctx.message(&format!("Could not reload configuration: {e}"));
                }
            }
        }
    }

    fn run_triggers(&mut self, pkg: &Package) {
        if self.triggers.is_empty() {
            return;
        }
        let entry = match self.ctx.packagedb().get(&pkg.name) {
            Ok(Some(entry)) => entry,
            Ok(None) => return,
            Err(e) => {
                warn!("Cannot read install record of {}: {}", pkg.name, e);
                return;
            }
        };
        let manifest = match entry.manifest() {
            Ok(Some(manifest)) => manifest,
            Ok(None) => return,
            Err(e) => {
                warn!("Cannot read manifest of {}: {}", pkg.name, e);
                return;
            }
        };
        let results = self
            .triggers
            .run_for_manifest(manifest, self.ctx.environment());
        if !results.all_succeeded() {
            self.ctx.message(&format!(
                "{} trigger(s) failed after installing {}",
                results.failed, pkg.name
            ));
        }
    }
}

fn recovery_options(table: &[PhaseSpec], phase: Phase) -> Vec<RecoveryOption> {
    lookup(table, phase)
        .map(|spec| spec.error_phases)
        .unwrap_or_default()
        .iter()
        .map(|&alt| RecoveryOption {
            phase: alt,
            needs_confirmation: lookup(table, alt).is_some_and(|s| s.needs_confirmation),
        })
        .collect()
}

/// Insert a recovery phase before the failed one, followed by the phases
/// needed to get back to the failed phase
fn insert_recovery(
    phases: &mut Vec<Phase>,
    num_phase: usize,
    target: Phase,
    failed: Phase,
    table: &[PhaseSpec],
) {
    let mut filling = compute_phases(table, &[failed]);
    let end = filling.len().saturating_sub(1);
    match filling.iter().position(|p| *p == target.canonical()) {
        Some(i) => filling = filling[(i + 1).min(end)..end].to_vec(),
        None => filling.truncate(end),
    }

    let mut inserted = vec![target];
    inserted.extend(filling);
    phases.splice(num_phase..num_phase, inserted);

    if phases.get(num_phase + 1) == Some(&target.canonical()) {
        phases.remove(num_phase + 1);
    }
}
