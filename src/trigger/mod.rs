// src/trigger/mod.rs

//! Post-install triggers
//!
//! A trigger is a shell script in the triggers directory named
//! `<name>.trigger`. Header comments select the installed paths it reacts to:
//!
//! ```text
//! # IfExecutable: gtk-update-icon-cache
//! # REMatch: /share/icons/.*
//! # LiteralMatch: /share/glib-2.0/schemas/
//! ```
//!
//! After a module installs, every trigger whose patterns match a manifest
//! path (and whose `IfExecutable` program exists) runs once. Each trigger
//! runs at most once per build invocation, and failures are logged without
//! stopping the build.

use crate::error::{Error, Result};
use regex::Regex;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};
use wait_timeout::ChildExt;

/// Default timeout for a trigger script (5 minutes)
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

const SUFFIX: &str = ".trigger";

/// A parsed trigger script
#[derive(Debug, Clone)]
pub struct Trigger {
    pub name: String,
    pub path: PathBuf,
    pub rematches: Vec<Regex>,
    pub literal_matches: Vec<String>,
    /// Program that must be on PATH for the trigger to apply
    pub executable: Option<String>,
}

impl Trigger {
    /// Parse the header of a trigger script
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let name = name.strip_suffix(SUFFIX).unwrap_or(&name).to_string();

        let mut trigger = Trigger {
            name,
            path: path.to_path_buf(),
            rematches: Vec::new(),
            literal_matches: Vec::new(),
            executable: None,
        };

        for line in content.lines() {
            if let Some(value) = line.strip_prefix("# IfExecutable: ") {
                trigger.executable = Some(value.trim().to_string());
            } else if let Some(value) = line.strip_prefix("# REMatch: ") {
                let regex = Regex::new(value.trim()).map_err(|e| {
                    Error::Trigger(format!("{}: invalid REMatch: {}", path.display(), e))
                })?;
                trigger.rematches.push(regex);
            } else if let Some(value) = line.strip_prefix("# LiteralMatch: ") {
                trigger.literal_matches.push(value.trim().to_string());
            }
        }

        if trigger.rematches.is_empty() && trigger.literal_matches.is_empty() {
            return Err(Error::Trigger(format!(
                "No keys specified in trigger script {}",
                path.display()
            )));
        }
        Ok(trigger)
    }

    /// Whether any path matches one of the trigger's patterns
    pub fn matches(&self, paths: &[String]) -> bool {
        paths.iter().any(|path| {
            self.rematches.iter().any(|re| re.is_match(path))
                || self.literal_matches.iter().any(|lit| path.contains(lit.as_str()))
        })
    }

    fn precondition_met(&self, env: &BTreeMap<String, String>) -> bool {
        match &self.executable {
            None => true,
            Some(program) => {
                let search = env.get("PATH").cloned().or_else(|| std::env::var("PATH").ok());
                which::which_in(program, search, "/").is_ok()
            }
        }
    }
}

/// Load every `*.trigger` file in a directory, sorted by name
pub fn load_all(dir: &Path) -> Result<Vec<Trigger>> {
    if !dir.is_dir() {
        debug!("No trigger directory at {}", dir.display());
        return Ok(Vec::new());
    }
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.to_string_lossy().ends_with(SUFFIX))
        .collect();
    paths.sort();
    paths.iter().map(|path| Trigger::load(path)).collect()
}

/// Runs matching triggers, each at most once per invocation
#[derive(Debug)]
pub struct TriggerRunner {
    triggers: Vec<Trigger>,
    executed: HashSet<String>,
    timeout: Duration,
}

impl TriggerRunner {
    pub fn new(triggers: Vec<Trigger>) -> Self {
        Self {
            triggers,
            executed: HashSet::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set custom timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty()
    }

    /// Run the triggers selected by a freshly installed manifest
    pub fn run_for_manifest(
        &mut self,
        manifest: &[String],
        env: &BTreeMap<String, String>,
    ) -> TriggerResults {
        let mut results = TriggerResults::default();

        for trigger in &self.triggers {
            if !trigger.matches(manifest) {
                continue;
            }
            if self.executed.contains(&trigger.name) {
                debug!("Trigger '{}' already ran", trigger.name);
                results.skipped += 1;
                continue;
            }
            if !trigger.precondition_met(env) {
                info!(
                    "  [SKIP] Trigger '{}': '{}' not found",
                    trigger.name,
                    trigger.executable.as_deref().unwrap_or_default()
                );
                results.skipped += 1;
                continue;
            }

            self.executed.insert(trigger.name.clone());
            info!("  Running trigger: {}", trigger.name);
            match execute(trigger, env, self.timeout) {
                Ok(()) => {
                    info!("  [OK] Trigger '{}' completed", trigger.name);
                    results.succeeded += 1;
                }
                Err(e) => {
                    warn!("  [FAIL] Trigger '{}': {}", trigger.name, e);
                    results.failed += 1;
                    results.errors.push(format!("{}: {}", trigger.name, e));
                }
            }
        }

        results
    }
}

fn execute(trigger: &Trigger, env: &BTreeMap<String, String>, timeout: Duration) -> Result<()> {
    let mut child = Command::new("/bin/sh")
        .arg(&trigger.path)
        .envs(env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| Error::Trigger(format!("Failed to spawn '{}': {}", trigger.path.display(), e)))?;

    // Drained while waiting so a chatty script cannot fill the pipe and stall
    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);

    let status = match child.wait_timeout(timeout)? {
        Some(status) => status,
        None => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(Error::Trigger(format!(
                "timed out after {} seconds",
                timeout.as_secs()
            )));
        }
    };

    let stdout = collect(stdout);
    let stderr = collect(stderr);
    for line in stdout.lines() {
        debug!("[{}] {}", trigger.name, line);
    }
    for line in stderr.lines() {
        warn!("[{}] {}", trigger.name, line);
    }

    if status.success() {
        Ok(())
    } else {
        Err(Error::Trigger(format!(
            "exited with code {}: {}",
            status.code().unwrap_or(-1),
            stderr.trim()
        )))
    }
}

fn drain<R: Read + Send + 'static>(mut stream: R) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = stream.read_to_end(&mut buf);
        buf
    })
}

fn collect(handle: Option<thread::JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

/// Results of trigger execution
#[derive(Debug, Default)]
pub struct TriggerResults {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
}

impl TriggerResults {
    /// Check if all triggers succeeded
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }

    /// Total triggers processed
    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.skipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_trigger(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(format!("{name}.trigger"));
        fs::write(&path, body).unwrap();
        path
    }

    fn env() -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        env.insert("PATH".to_string(), "/usr/bin:/bin".to_string());
        env
    }

    #[test]
    fn test_load_headers() {
        let dir = TempDir::new().unwrap();
        let path = write_trigger(
            dir.path(),
            "icon-cache",
            "#!/bin/sh\n# IfExecutable: gtk-update-icon-cache\n# REMatch: /share/icons/.*\n# LiteralMatch: /share/pixmaps/\n",
        );
        let trigger = Trigger::load(&path).unwrap();
        assert_eq!(trigger.name, "icon-cache");
        assert_eq!(trigger.executable.as_deref(), Some("gtk-update-icon-cache"));
        assert!(trigger.matches(&["/opt/share/icons/hicolor/index.theme".to_string()]));
        assert!(trigger.matches(&["/opt/share/pixmaps/foo.png".to_string()]));
        assert!(!trigger.matches(&["/opt/bin/foo".to_string()]));
    }

    #[test]
    fn test_trigger_without_keys_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write_trigger(dir.path(), "empty", "#!/bin/sh\necho hi\n");
        let err = Trigger::load(&path).unwrap_err();
        assert!(err.to_string().contains("No keys specified"));
    }

    #[test]
    fn test_runs_once_per_invocation() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("log");
        write_trigger(
            dir.path(),
            "schemas",
            &format!(
                "# LiteralMatch: /glib-2.0/schemas/\necho ran >> {}\n",
                log.display()
            ),
        );

        let mut runner = TriggerRunner::new(load_all(dir.path()).unwrap());
        let manifest = vec!["/opt/share/glib-2.0/schemas/org.foo.gschema.xml".to_string()];
        let first = runner.run_for_manifest(&manifest, &env());
        assert_eq!(first.succeeded, 1);
        let second = runner.run_for_manifest(&manifest, &env());
        assert_eq!(second.succeeded, 0);
        assert_eq!(second.skipped, 1);

        assert_eq!(fs::read_to_string(&log).unwrap(), "ran\n");
    }

    #[test]
    fn test_missing_executable_skips() {
        let dir = TempDir::new().unwrap();
        write_trigger(
            dir.path(),
            "nope",
            "# IfExecutable: definitely-not-installed-tool\n# REMatch: .*\nexit 1\n",
        );
        let mut runner = TriggerRunner::new(load_all(dir.path()).unwrap());
        let results = runner.run_for_manifest(&["/opt/x".to_string()], &env());
        assert_eq!(results.skipped, 1);
        assert!(results.all_succeeded());
    }

    #[test]
    fn test_failure_is_reported() {
        let dir = TempDir::new().unwrap();
        write_trigger(dir.path(), "broken", "# REMatch: .*\nexit 4\n");
        let mut runner = TriggerRunner::new(load_all(dir.path()).unwrap());
        let results = runner.run_for_manifest(&["/opt/x".to_string()], &env());
        assert_eq!(results.failed, 1);
        assert_eq!(results.total(), 1);
        assert!(results.errors[0].contains("code 4"));
    }

    #[test]
    fn test_large_output_does_not_stall() {
        let dir = TempDir::new().unwrap();
        write_trigger(
            dir.path(),
            "big",
            "# LiteralMatch: /share/\nhead -c 300000 /dev/zero | tr '\\0' x\nhead -c 300000 /dev/zero | tr '\\0' y >&2\n",
        );
        let mut runner =
            TriggerRunner::new(load_all(dir.path()).unwrap()).with_timeout(Duration::from_secs(30));
        let results = runner.run_for_manifest(&["/opt/share/foo".to_string()], &env());
        assert_eq!(results.succeeded, 1, "{:?}", results.errors);
    }
}
