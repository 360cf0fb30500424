// tests/install.rs

//! Staged installs into the prefix and uninstalls from the package database

mod common;

use common::{Log, RecordingFrontend, autotools, test_config};
use jhbuild::build::{CommandRunner, CommandSpec};
use jhbuild::packagedb::PackageDb;
use jhbuild::{BuildContext, BuildScript, Config, Package};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tempfile::TempDir;

/// Writes the given prefix-relative files into `DESTDIR` on install
struct StagingRunner {
    prefix: PathBuf,
    files: Rc<RefCell<Vec<&'static str>>>,
}

impl CommandRunner for StagingRunner {
    fn run(&self, spec: &CommandSpec, _env: &BTreeMap<String, String>) -> jhbuild::Result<()> {
        let Some(destdir) = spec.env.get("DESTDIR") else {
            return Ok(());
        };
        let staged = Path::new(destdir).join(self.prefix.strip_prefix("/").unwrap_or(&self.prefix));
        for file in self.files.borrow().iter() {
            let path = staged.join(file);
            fs::create_dir_all(path.parent().unwrap())?;
            fs::write(&path, file.as_bytes())?;
        }
        Ok(())
    }
}

fn install(config: &Config, pkg: &Package, files: &Rc<RefCell<Vec<&'static str>>>) {
    let runner = StagingRunner {
        prefix: config.prefix.clone(),
        files: files.clone(),
    };
    let frontend = RecordingFrontend::new(Log::default(), Log::default(), Vec::new());
    let ctx = BuildContext::new(config.clone(), Box::new(runner), Box::new(frontend));
    let outcome = BuildScript::new(ctx, vec![pkg]).build().unwrap();
    assert!(outcome.failures.is_empty(), "{:?}", outcome.failures);
}

#[test]
fn test_install_reinstall_uninstall() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let foo = autotools("foo", &[], &config);
    let files = Rc::new(RefCell::new(vec!["bin/foo", "share/foo/data.txt"]));

    install(&config, &foo, &files);
    let prefix = &config.prefix;
    assert!(prefix.join("bin/foo").is_file());
    assert!(prefix.join("share/foo/data.txt").is_file());
    assert!(!config.top_builddir().join("root-foo").exists());

    let db = PackageDb::new(config.top_builddir(), prefix.clone());
    let entry = db.get("foo").unwrap().unwrap();
    assert_eq!(entry.version, "1");
    let manifest = entry.manifest().unwrap().unwrap();
    assert!(manifest.contains(&prefix.join("bin/foo").display().to_string()));
    assert!(manifest.contains(&format!("{}/", prefix.join("share/foo").display())));

    // A reinstall that no longer ships the data file removes it
    *files.borrow_mut() = vec!["bin/foo"];
    install(&config, &foo, &files);
    assert!(prefix.join("bin/foo").is_file());
    assert!(!prefix.join("share/foo/data.txt").exists());
    assert!(!prefix.join("share/foo").exists());

    db.uninstall("foo").unwrap();
    assert!(!prefix.join("bin/foo").exists());
    assert!(!db.check("foo", None));
    assert!(db.installed().unwrap().is_empty());
}

#[test]
fn test_manifest_paths_live_under_prefix() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let foo = autotools("foo", &[], &config);
    let files = Rc::new(RefCell::new(vec!["bin/foo"]));

    install(&config, &foo, &files);
    let db = PackageDb::new(config.top_builddir(), config.prefix.clone());
    let manifest = db.get("foo").unwrap().unwrap().manifest().unwrap().unwrap().to_vec();
    assert!(
        manifest
            .iter()
            .all(|path| Path::new(path.trim_end_matches('/')).starts_with(&config.prefix))
    );
}

#[test]
fn test_uninstall_unknown_module() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let db = PackageDb::new(config.top_builddir(), config.prefix.clone());
    assert!(db.uninstall("nothing").is_err());
}
