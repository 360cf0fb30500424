// src/build/frontend.rs

//! Frontend hooks
//!
//! The build engine reports progress and asks for error decisions through
//! the [`Frontend`] trait. The terminal implementation lives in
//! [`super::terminal`]; tests record the calls.

use crate::error::Error;
use crate::phase::Phase;
use std::path::PathBuf;

/// Decision returned by the frontend after a phase failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorChoice {
    /// Give up on the module and record it as failed
    Fail,
    /// Stop working on the module without recording a failure
    Continue,
    /// Run the given phase next
    Run(Phase),
    /// Reload the configuration file and ask again
    ReloadConfig,
}

/// A recovery phase the user may pick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryOption {
    pub phase: Phase,
    /// The user has to type "yes" before it runs
    pub needs_confirmation: bool,
}

/// Context handed to [`Frontend::handle_error`]
#[derive(Debug)]
pub struct ErrorRequest<'a> {
    pub module: &'a str,
    pub phase: Phase,
    /// The phase that would run if the user continues
    pub next_phase: Option<Phase>,
    pub error: &'a Error,
    pub alternatives: Vec<RecoveryOption>,
    /// Where a debugging shell should start
    pub builddir: Option<PathBuf>,
}

/// Progress and decision callbacks of a build
pub trait Frontend {
    fn start_build(&mut self, _modules: &[&str]) {}

    /// Called once at the end with the names of failed modules
    fn end_build(&mut self, _failures: &[String]) {}

    fn start_module(&mut self, _module: &str) {}

    fn end_module(&mut self, _module: &str, _failed: bool) {}

    fn start_phase(&mut self, _module: &str, _phase: Phase) {}

    fn end_phase(&mut self, _module: &str, _phase: Phase, _error: Option<&Error>) {}

    /// Human-readable step about to run, e.g. "Configuring"
    fn set_action(&mut self, action: &str, module: &str, progress: (usize, usize));

    fn message(&mut self, msg: &str);

    fn handle_error(&mut self, request: &ErrorRequest<'_>) -> ErrorChoice;

    /// The build is about to stop because `exit_on_error` is set
    fn fatal_error(&mut self, _module: &str, _phase: Phase, _error: &Error) {}
}

/// Frontend that only logs; used for non-interactive commands
#[derive(Debug, Default)]
pub struct LogFrontend;

impl Frontend for LogFrontend {
    fn set_action(&mut self, action: &str, module: &str, progress: (usize, usize)) {
        tracing::info!("{} {} [{}/{}]", action, module, progress.0, progress.1);
    }

    fn message(&mut self, msg: &str) {
        tracing::info!("{}", msg);
    }

    fn handle_error(&mut self, request: &ErrorRequest<'_>) -> ErrorChoice {
        tracing::warn!(
            "{} failed during {}: {}",
            request.module,
            request.phase,
            request.error
        );
        ErrorChoice::Fail
    }
}
