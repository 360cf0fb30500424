// src/error.rs

//! Error types for the build orchestrator
//!
//! Command and build-state errors raised inside a phase body are caught by
//! the build engine and offered to the frontend's error handler. Usage,
//! configuration and fatal errors propagate to the binary and end the run.

use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed invocation or configuration value
    #[error("{0}")]
    Usage(String),

    /// Configuration file could not be read or parsed
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invariant or environment failure; the build cannot continue
    #[error("Fatal error: {0}")]
    Fatal(String),

    /// A subprocess exited non-zero or could not be spawned
    #[error("Command '{command}' failed{}", status.map(|c| format!(" with exit code {c}")).unwrap_or_default())]
    Command { command: String, status: Option<i32> },

    /// A phase detected a semantic problem with the working tree or prefix
    #[error("{0}")]
    BuildState(String),

    #[error("Moduleset error: {0}")]
    Moduleset(String),

    #[error("Package database error: {0}")]
    PackageDb(String),

    #[error("Trigger error: {0}")]
    Trigger(String),

    #[error("Download error: {0}")]
    Download(String),

    #[error("Interrupted by user")]
    Interrupted,
}

impl Error {
    /// Build a command error for a spawned process
    pub fn command(command: impl Into<String>, status: Option<i32>) -> Self {
        Error::Command {
            command: command.into(),
            status,
        }
    }

    /// Errors the engine hands to the error handler instead of propagating
    pub fn is_phase_error(&self) -> bool {
        matches!(
            self,
            Error::Command { .. } | Error::BuildState(_) | Error::Download(_) | Error::Io(_)
        )
    }
}

impl From<quick_xml::Error> for Error {
    fn from(e: quick_xml::Error) -> Self {
        Error::Moduleset(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Download(e.to_string())
    }
}

impl From<walkdir::Error> for Error {
    fn from(e: walkdir::Error) -> Self {
        Error::Io(std::io::Error::other(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_error_display() {
        let err = Error::command("make install", Some(2));
        assert_eq!(err.to_string(), "Command 'make install' failed with exit code 2");

        let err = Error::command("ninja", None);
        assert_eq!(err.to_string(), "Command 'ninja' failed");
    }

    #[test]
    fn test_phase_error_classification() {
        assert!(Error::command("make", Some(1)).is_phase_error());
        assert!(Error::BuildState("bad tree".into()).is_phase_error());
        assert!(!Error::Usage("bad flag".into()).is_phase_error());
        assert!(!Error::Interrupted.is_phase_error());
    }
}
