// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use jhbuild::branch::{Branch, RepositoryRef};
use jhbuild::build::{
    CommandRunner, CommandSpec, ErrorChoice, ErrorRequest, Frontend,
};
use jhbuild::modtypes::{Autotools, ModuleKind};
use jhbuild::package::{SysDepKind, SystemDependency};
use jhbuild::phase::Phase;
use jhbuild::sysdeps::SystemProbe;
use jhbuild::{BuildContext, BuildOutcome, BuildScript, Config, Error, ModuleSet, Package};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

pub type Log = Rc<RefCell<Vec<String>>>;

/// Records `"module:Action"` for every action; a failed phase marks its
/// action with `" [error]"`, or records `"module:phase [error]"` when the
/// phase failed before announcing one
#[derive(Default)]
pub struct RecordingFrontend {
    pub actions: Log,
    pub messages: Log,
    /// Answers handed out by `handle_error`, in order; `Fail` when exhausted
    pub answers: Vec<ErrorChoice>,
    announced: bool,
}

impl RecordingFrontend {
    pub fn new(actions: Log, messages: Log, answers: Vec<ErrorChoice>) -> Self {
        Self {
            actions,
            messages,
            answers,
            announced: false,
        }
    }
}

impl Frontend for RecordingFrontend {
    fn start_phase(&mut self, _module: &str, _phase: Phase) {
        self.announced = false;
    }

    fn end_phase(&mut self, module: &str, phase: Phase, error: Option<&Error>) {
        if error.is_none() {
            return;
        }
        let mut actions = self.actions.borrow_mut();
        match actions.last_mut() {
            Some(last) if self.announced => last.push_str(" [error]"),
            _ => actions.push(format!("{module}:{phase} [error]")),
        }
    }

    fn set_action(&mut self, action: &str, module: &str, _progress: (usize, usize)) {
        self.actions.borrow_mut().push(format!("{module}:{action}"));
        self.announced = true;
    }

    fn message(&mut self, msg: &str) {
        self.messages.borrow_mut().push(msg.to_string());
    }

    fn handle_error(&mut self, _request: &ErrorRequest<'_>) -> ErrorChoice {
        if self.answers.is_empty() {
            ErrorChoice::Fail
        } else {
            self.answers.remove(0)
        }
    }
}

type FailWhen = Box<dyn Fn(&CommandSpec) -> bool>;

/// Records every command instead of running it
pub struct RecordingRunner {
    pub commands: Log,
    fail_when: FailWhen,
}

impl RecordingRunner {
    pub fn new(commands: Log) -> Self {
        Self {
            commands,
            fail_when: Box::new(|_| false),
        }
    }

    pub fn failing(commands: Log, fail_when: impl Fn(&CommandSpec) -> bool + 'static) -> Self {
        Self {
            commands,
            fail_when: Box::new(fail_when),
        }
    }
}

impl CommandRunner for RecordingRunner {
    fn run(&self, spec: &CommandSpec, _env: &BTreeMap<String, String>) -> jhbuild::Result<()> {
        self.commands.borrow_mut().push(spec.display());
        if (self.fail_when)(spec) {
            return Err(Error::command(spec.display(), Some(2)));
        }
        Ok(())
    }
}

/// Host probe answering from fixed tables
#[derive(Debug, Default, Clone)]
pub struct FakeProbe {
    pub pkgconfigs: HashMap<String, String>,
    pub present: HashSet<String>,
}

impl FakeProbe {
    pub fn with_pkgconfig(mut self, name: &str, version: &str) -> Self {
        self.pkgconfigs.insert(name.to_string(), version.to_string());
        self
    }
}

impl SystemProbe for FakeProbe {
    fn installed_pkgconfigs(&self) -> jhbuild::Result<HashMap<String, String>> {
        Ok(self.pkgconfigs.clone())
    }

    fn dependency_present(&self, _kind: SysDepKind, value: &str) -> bool {
        self.present.contains(value)
    }
}

/// Source tree created on checkout, with a fixed tree id
#[derive(Debug)]
pub struct MockBranch {
    pub name: String,
    pub srcdir: PathBuf,
    pub tree_id: String,
}

impl MockBranch {
    pub fn new(name: &str, checkoutroot: &Path) -> Self {
        Self {
            name: name.to_string(),
            srcdir: checkoutroot.join(name),
            tree_id: "1".to_string(),
        }
    }
}

impl Branch for MockBranch {
    fn srcdir(&self) -> &Path {
        &self.srcdir
    }

    fn tree_id(&self) -> Option<String> {
        Some(self.tree_id.clone())
    }

    fn may_checkout(&self, ctx: &BuildContext) -> bool {
        !ctx.config().nonetwork
    }

    fn checkout(&self, _ctx: &BuildContext) -> jhbuild::Result<()> {
        fs::create_dir_all(&self.srcdir)?;
        let configure = self.srcdir.join("configure");
        if !configure.exists() {
            fs::write(configure, "#!/bin/sh\n")?;
        }
        Ok(())
    }

    fn force_checkout(&self, ctx: &BuildContext) -> jhbuild::Result<()> {
        if self.srcdir.exists() {
            fs::remove_dir_all(&self.srcdir)?;
        }
        self.checkout(ctx)
    }

    fn repository(&self) -> RepositoryRef {
        RepositoryRef {
            kind: "local",
            name: "mock".to_string(),
            href: String::new(),
        }
    }

    fn branch_attrs(&self) -> Vec<(&'static str, String)> {
        vec![("module", self.name.clone())]
    }
}

/// Configuration rooted in a scratch directory, non-interactive
pub fn test_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.prefix = root.join("prefix");
    config.checkoutroot = root.join("src");
    config.top_builddir = root.join("_jhbuild");
    config.interact = false;
    config.check_sysdeps = false;
    config.partial_build = false;
    config
}

pub fn autotools(name: &str, deps: &[&str], config: &Config) -> Package {
    autotools_with(name, deps, config, Autotools::default())
}

pub fn autotools_with(name: &str, deps: &[&str], config: &Config, kind: Autotools) -> Package {
    Package::new(name, ModuleKind::Autotools(kind))
        .with_branch(Box::new(MockBranch::new(name, &config.checkoutroot)))
        .with_dependencies(deps)
}

pub fn meta(name: &str, deps: &[&str]) -> Package {
    Package::new(name, ModuleKind::Meta).with_dependencies(deps)
}

pub fn system_module(name: &str, deps: &[&str], pkg_config: &str) -> Package {
    Package::new(name, ModuleKind::System)
        .with_dependencies(deps)
        .with_pkg_config(pkg_config)
}

/// System module that also needs a program on the host
pub fn system_tool(name: &str, program: &str) -> Package {
    let mut pkg = Package::new(name, ModuleKind::System);
    pkg.systemdependencies
        .push(SystemDependency::new(SysDepKind::Path, program));
    pkg
}

/// Catalog with a fixed probe
pub fn module_set(config: &Config, probe: FakeProbe, packages: Vec<Package>) -> ModuleSet {
    let mut set = ModuleSet::new(config).with_probe(Box::new(probe));
    for pkg in packages {
        set.add(pkg);
    }
    set
}

pub fn names(list: &[&Package]) -> Vec<String> {
    list.iter().map(|pkg| pkg.name.clone()).collect()
}

/// What a build run left behind
pub struct BuildRun {
    pub outcome: BuildOutcome,
    pub actions: Vec<String>,
    pub messages: Vec<String>,
    pub commands: Vec<String>,
}

/// Build `modules` with recorded commands; `fail_when` picks failing ones
pub fn run_build(
    config: Config,
    modules: &[&Package],
    fail_when: impl Fn(&CommandSpec) -> bool + 'static,
) -> BuildRun {
    run_build_answering(config, modules, fail_when, Vec::new())
}

pub fn run_build_answering(
    config: Config,
    modules: &[&Package],
    fail_when: impl Fn(&CommandSpec) -> bool + 'static,
    answers: Vec<ErrorChoice>,
) -> BuildRun {
    let actions = Log::default();
    let messages = Log::default();
    let commands = Log::default();

    let frontend = RecordingFrontend::new(actions.clone(), messages.clone(), answers);
    let runner = RecordingRunner::failing(commands.clone(), fail_when);
    let ctx = BuildContext::new(config, Box::new(runner), Box::new(frontend));
    let outcome = BuildScript::new(ctx, modules.to_vec())
        .build()
        .expect("build engine error");

    let actions = actions.borrow().clone();
    let messages = messages.borrow().clone();
    let commands = commands.borrow().clone();
    BuildRun {
        outcome,
        actions,
        messages,
        commands,
    }
}

/// Command fails when it runs in `module`'s tree and ends with `suffix`,
/// e.g. `"make"` for the build step or `"check"` for the test suite
pub fn fails_in(module: &str, suffix: &str) -> impl Fn(&CommandSpec) -> bool + 'static {
    let module = module.to_string();
    let suffix = suffix.to_string();
    move |spec: &CommandSpec| {
        spec.cwd.file_name().is_some_and(|n| n == module.as_str())
            && spec.display().ends_with(&suffix)
    }
}

pub fn never(_spec: &CommandSpec) -> bool {
    false
}
