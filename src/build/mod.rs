// src/build/mod.rs

//! Build execution
//!
//! - [`BuildContext`]: configuration, package database and command runner
//!   shared by all phase bodies
//! - [`exec`]: spawning build commands
//! - [`Frontend`]: progress and error-decision hooks
//! - [`BuildScript`]: the per-module phase state machine

mod context;
pub mod exec;
mod frontend;
mod script;
mod terminal;

pub use context::BuildContext;
pub use exec::{CommandLine, CommandRunner, CommandSpec, SystemRunner};
pub use frontend::{ErrorChoice, ErrorRequest, Frontend, LogFrontend, RecoveryOption};
pub use script::{BuildOutcome, BuildScript};
pub use terminal::TerminalFrontend;
