// src/build/exec.rs

//! Running build commands
//!
//! Phase bodies describe what to run as a [`CommandSpec`] and hand it to the
//! context's [`CommandRunner`]. [`SystemRunner`] spawns real processes,
//! streams their output, and forwards a Ctrl-C to the child before reporting
//! [`Error::Interrupted`]. Tests substitute a recording runner.

use crate::error::{Error, Result};
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};
use nix::unistd::Pid;
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};
use wait_timeout::ChildExt;

/// How long to block in `wait_timeout` between interrupt checks
const POLL_INTERVAL: Duration = Duration::from_millis(100);

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// The program to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandLine {
    /// Interpreted by `/bin/sh -c`
    Shell(String),
    /// Executed directly
    Argv(Vec<String>),
}

/// A command together with the directory and variables it runs with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub line: CommandLine,
    pub cwd: PathBuf,
    /// Variables layered over the build environment
    pub env: BTreeMap<String, String>,
}

impl CommandSpec {
    pub fn shell(command: impl Into<String>, cwd: &Path) -> Self {
        Self {
            line: CommandLine::Shell(command.into()),
            cwd: cwd.to_path_buf(),
            env: BTreeMap::new(),
        }
    }

    pub fn argv<I, S>(args: I, cwd: &Path) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            line: CommandLine::Argv(args.into_iter().map(Into::into).collect()),
            cwd: cwd.to_path_buf(),
            env: BTreeMap::new(),
        }
    }

    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env.extend(env);
        self
    }

    pub fn env_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// The command as a user would type it
    pub fn display(&self) -> String {
        match &self.line {
            CommandLine::Shell(line) => line.clone(),
            CommandLine::Argv(args) => args.join(" "),
        }
    }

    /// Full argument vector, including the shell for shell lines
    pub fn argv_with_prefix(&self, prefix: &[String]) -> Vec<String> {
        let mut argv: Vec<String> = prefix.to_vec();
        match &self.line {
            CommandLine::Shell(line) => {
                argv.extend(["/bin/sh".to_string(), "-c".to_string(), line.clone()]);
            }
            CommandLine::Argv(args) => argv.extend(args.iter().cloned()),
        }
        argv
    }
}

/// Executes commands on behalf of phase bodies
pub trait CommandRunner {
    /// Run to completion with `env` layered over the inherited environment;
    /// non-zero exit is an [`Error::Command`]
    fn run(&self, spec: &CommandSpec, env: &BTreeMap<String, String>) -> Result<()>;
}

/// Runner that spawns real processes
#[derive(Debug, Clone, Default)]
pub struct SystemRunner {
    /// Prepended to every command, e.g. `chrt --idle 0`
    nice: Vec<String>,
    /// Buffer output and only show it when the command fails
    quiet: bool,
}

impl SystemRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_nice(mut self, nice: Vec<String>) -> Self {
        self.nice = nice;
        self
    }

    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, spec: &CommandSpec, env: &BTreeMap<String, String>) -> Result<()> {
        let argv = spec.argv_with_prefix(&self.nice);
        let shown = spec.display();
        debug!("Executing in {}: {}", spec.cwd.display(), shown);

        let _guard = InterruptGuard::install()?;

        let mut child = Command::new(&argv[0])
            .args(&argv[1..])
            .current_dir(&spec.cwd)
            .envs(env)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                warn!("Failed to spawn '{}': {}", shown, e);
                Error::command(shown.clone(), None)
            })?;

        let captured = Arc::new(Mutex::new(Vec::new()));
        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            readers.push(forward_lines(stdout, false, self.quiet, Arc::clone(&captured)));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(forward_lines(stderr, true, self.quiet, Arc::clone(&captured)));
        }

        let mut forwarded = false;
        let status = loop {
            if let Some(status) = child.wait_timeout(POLL_INTERVAL)? {
                break status;
            }
            if INTERRUPTED.load(Ordering::SeqCst) && !forwarded {
                debug!("Forwarding interrupt to pid {}", child.id());
                let _ = signal::kill(Pid::from_raw(child.id() as i32), Signal::SIGINT);
                forwarded = true;
            }
        };

        for reader in readers {
            let _ = reader.join();
        }

        if forwarded || INTERRUPTED.load(Ordering::SeqCst) {
            return Err(Error::Interrupted);
        }

        if !status.success() {
            if self.quiet {
                if let Ok(lines) = captured.lock() {
                    for line in lines.iter() {
                        eprintln!("{line}");
                    }
                }
            }
            return Err(Error::command(shown, status.code()));
        }
        Ok(())
    }
}

fn forward_lines<R: Read + Send + 'static>(
    stream: R,
    is_stderr: bool,
    quiet: bool,
    captured: Arc<Mutex<Vec<String>>>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
            if buf.ends_with(b"\n") {
                buf.pop();
            }
            // Output need not be UTF-8; stopping here would close the pipe
            let line = String::from_utf8_lossy(&buf).into_owned();
            if quiet {
                if let Ok(mut lines) = captured.lock() {
                    lines.push(line);
                }
            } else if is_stderr {
                eprintln!("{line}");
            } else {
                println!("{line}");
            }
        }
    })
}

extern "C" fn on_sigint(_: nix::libc::c_int) {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// Keeps SIGINT from killing the orchestrator while a child runs
struct InterruptGuard {
    previous: SigAction,
}

impl InterruptGuard {
    fn install() -> Result<Self> {
        INTERRUPTED.store(false, Ordering::SeqCst);
        let action = SigAction::new(
            SigHandler::Handler(on_sigint),
            SaFlags::empty(),
            SigSet::empty(),
        );
        // SAFETY: the handler only stores to an atomic
        let previous = unsafe { signal::sigaction(Signal::SIGINT, &action) }
            .map_err(std::io::Error::from)?;
        Ok(Self { previous })
    }
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        // SAFETY: restores the disposition saved in install()
        let _ = unsafe { signal::sigaction(Signal::SIGINT, &self.previous) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_env() -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        env.insert("PATH".to_string(), "/usr/bin:/bin".to_string());
        env
    }

    #[test]
    fn test_display_and_prefix() {
        let spec = CommandSpec::argv(["ninja", "install"], Path::new("/tmp"));
        assert_eq!(spec.display(), "ninja install");

        let spec = CommandSpec::shell("make -j4", Path::new("/tmp"));
        let argv = spec.argv_with_prefix(&["ionice".to_string(), "-c".to_string(), "3".to_string()]);
        assert_eq!(argv, vec!["ionice", "-c", "3", "/bin/sh", "-c", "make -j4"]);
    }

    #[test]
    fn test_system_runner_status() {
        let dir = tempfile::tempdir().unwrap();
        let runner = SystemRunner::new().quiet(true);

        let ok = CommandSpec::shell("test \"$GREETING\" = hello", dir.path())
            .env_var("GREETING", "hello");
        assert!(runner.run(&ok, &base_env()).is_ok());

        let failing = CommandSpec::shell("exit 3", dir.path());
        match runner.run(&failing, &base_env()) {
            Err(Error::Command { status, .. }) => assert_eq!(status, Some(3)),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_system_runner_cwd() {
        let dir = tempfile::tempdir().unwrap();
        let runner = SystemRunner::new().quiet(true);
        let spec = CommandSpec::shell("touch marker", dir.path());
        runner.run(&spec, &base_env()).unwrap();
        assert!(dir.path().join("marker").exists());
    }

    #[test]
    fn test_invalid_utf8_output_keeps_draining() {
        let dir = tempfile::tempdir().unwrap();
        let spec = CommandSpec::shell(
            "printf 'caf\\351\\n'; head -c 300000 /dev/zero | tr '\\0' a; echo",
            dir.path(),
        );
        for quiet in [true, false] {
            let runner = SystemRunner::new().quiet(quiet);
            assert!(runner.run(&spec, &base_env()).is_ok(), "quiet={quiet}");
        }
    }

    #[test]
    fn test_spawn_failure_is_command_error() {
        let dir = tempfile::tempdir().unwrap();
        let spec = CommandSpec::argv(["/nonexistent/tool"], dir.path());
        let err = SystemRunner::new().run(&spec, &base_env()).unwrap_err();
        assert!(err.is_phase_error());
    }
}
