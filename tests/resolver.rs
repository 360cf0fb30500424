// tests/resolver.rs

//! Dependency ordering and module-list filtering tests

mod common;

use common::{FakeProbe, autotools, meta, module_set, names, system_module, system_tool, test_config};
use jhbuild::Error;
use std::io;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

fn no_skip() -> Vec<String> {
    Vec::new()
}

#[test]
fn test_linear_chain() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let set = module_set(
        &config,
        FakeProbe::default(),
        vec![
            autotools("foo", &["bar"], &config),
            autotools("bar", &["baz"], &config),
            autotools("baz", &[], &config),
        ],
    );

    let list = set.get_module_list(&["foo"], &no_skip(), &[], true, false).unwrap();
    assert_eq!(names(&list), vec!["baz", "bar", "foo"]);
}

#[test]
fn test_skip_middle() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let set = module_set(
        &config,
        FakeProbe::default(),
        vec![
            autotools("foo", &["bar"], &config),
            autotools("bar", &["baz"], &config),
            autotools("baz", &[], &config),
        ],
    );

    let list = set
        .get_module_list(&["foo"], &["bar".to_string()], &[], true, false)
        .unwrap();
    assert_eq!(names(&list), vec!["foo"]);
}

#[test]
fn test_cycle_through_after_is_absorbed() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let mut set = module_set(
        &config,
        FakeProbe::default(),
        vec![
            autotools("foo", &["bar", "qux"], &config),
            autotools("bar", &["baz"], &config),
            autotools("baz", &[], &config),
            autotools("qux", &["quux"], &config).with_after(&["foo"]),
            autotools("quux", &[], &config),
        ],
    );
    set.set_strict(true);

    let list = set.get_module_list(&["foo"], &no_skip(), &[], true, false).unwrap();
    assert_eq!(names(&list), vec!["baz", "bar", "quux", "qux", "foo"]);
}

#[test]
fn test_hard_cycle_is_error_in_strict_mode() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let mut set = module_set(
        &config,
        FakeProbe::default(),
        vec![meta("a", &["b"]), meta("b", &["a"])],
    );

    // Lenient mode warns and still lists each module once
    let list = set.get_module_list(&["a"], &no_skip(), &[], true, false).unwrap();
    assert_eq!(names(&list), vec!["b", "a"]);

    set.set_strict(true);
    let err = set
        .get_module_list(&["a"], &no_skip(), &[], true, false)
        .unwrap_err();
    assert!(matches!(err, Error::Usage(_)));
    assert_eq!(err.to_string(), "Circular dependencies detected: a -> b -> a");
}

/// Collects formatted log output for inspection
#[derive(Clone, Default)]
struct CapturedLog(Arc<Mutex<Vec<u8>>>);

impl CapturedLog {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for CapturedLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn test_cycle_warnings_can_be_silenced() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let mut set = module_set(
        &config,
        FakeProbe::default(),
        vec![meta("a", &["b"]), meta("b", &["a"])],
    );

    let log = CapturedLog::default();
    let writer = log.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .finish();

    tracing::subscriber::with_default(subscriber, || {
        let list = set
            .get_full_module_list(&["a"], &no_skip(), true, false, false)
            .unwrap();
        assert_eq!(names(&list), vec!["b", "a"]);
    });
    assert!(!log.contents().contains("Circular"), "{}", log.contents());

    let log = CapturedLog::default();
    let writer = log.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .finish();
    tracing::subscriber::with_default(subscriber, || {
        set.get_full_module_list(&["a"], &no_skip(), true, false, true)
            .unwrap();
    });
    assert!(log.contents().contains("Circular dependencies detected: a -> b -> a"));

    // Strict mode only rejects cycles that are being reported
    set.set_strict(true);
    assert!(set.get_full_module_list(&["a"], &no_skip(), true, false, false).is_ok());
    assert!(set.get_full_module_list(&["a"], &no_skip(), true, false, true).is_err());
}

#[test]
fn test_unknown_dependency() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let mut set = module_set(&config, FakeProbe::default(), vec![meta("gtk", &["pango"])]);

    let list = set.get_module_list(&["gtk"], &no_skip(), &[], true, false).unwrap();
    assert_eq!(names(&list), vec!["gtk"]);

    set.set_strict(true);
    let err = set
        .get_module_list(&["gtk"], &no_skip(), &[], true, false)
        .unwrap_err();
    assert_eq!(err.to_string(), "gtk has a dependency on unknown \"pango\" module");

    let err = set
        .get_module_list(&["nope"], &no_skip(), &[], true, false)
        .unwrap_err();
    assert_eq!(err.to_string(), "A module called 'nope' could not be found.");
}

#[test]
fn test_after_modules_only_when_requested() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let set = module_set(
        &config,
        FakeProbe::default(),
        vec![
            meta("app", &[]).with_after(&["lib"]),
            meta("lib", &["base"]),
            meta("base", &[]),
        ],
    );

    let list = set.get_module_list(&["app"], &no_skip(), &[], true, false).unwrap();
    assert_eq!(names(&list), vec!["app"]);

    let list = set.get_module_list(&["app"], &no_skip(), &[], true, true).unwrap();
    assert_eq!(names(&list), vec!["base", "lib", "app"]);

    // Naming the after-only module as a seed keeps it and what it pulled in
    let list = set
        .get_module_list(&["app", "lib"], &no_skip(), &[], true, false)
        .unwrap();
    assert_eq!(names(&list), vec!["base", "lib", "app"]);
}

#[test]
fn test_suggests_toggle() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let set = module_set(
        &config,
        FakeProbe::default(),
        vec![meta("gtk", &[]).with_suggests(&["gtk-doc"]), meta("gtk-doc", &[])],
    );

    let with = set.get_module_list(&["gtk"], &no_skip(), &[], true, false).unwrap();
    assert_eq!(names(&with), vec!["gtk-doc", "gtk"]);
    let without = set.get_module_list(&["gtk"], &no_skip(), &[], false, false).unwrap();
    assert_eq!(names(&without), vec!["gtk"]);
}

#[test]
fn test_skip_all_keeps_configured_modules_and_deps() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path());
    config.modules = vec!["gtk".to_string()];
    let set = module_set(
        &config,
        FakeProbe::default(),
        vec![
            meta("gtk", &["glib"]),
            meta("glib", &[]),
            meta("gimp", &["gtk"]),
        ],
    );

    let list = set
        .get_module_list(&["all"], &["*".to_string()], &[], true, false)
        .unwrap();
    assert_eq!(names(&list), vec!["glib", "gtk"]);
}

#[test]
fn test_dependency_order_invariant() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let set = module_set(
        &config,
        FakeProbe::default(),
        vec![
            meta("e", &["c", "d"]),
            meta("d", &["b"]),
            meta("c", &["a", "b"]),
            meta("b", &["a"]),
            meta("a", &[]),
        ],
    );

    let list = set.get_module_list(&["all"], &no_skip(), &[], true, false).unwrap();
    let order = names(&list);
    assert_eq!(order.len(), 5);
    for pkg in &list {
        let own = order.iter().position(|n| *n == pkg.name).unwrap();
        for dep in &pkg.dependencies {
            let before = order.iter().position(|n| n == dep).unwrap();
            assert!(before < own, "{dep} must precede {}", pkg.name);
        }
    }
}

#[test]
fn test_system_module_elision() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path());
    config.partial_build = true;
    let modules = || {
        vec![
            meta("foo", &["bar"]),
            meta("bar", &["sys"]),
            system_module("sys", &["baz"], "sys.pc"),
            meta("baz", &[]),
        ]
    };

    for installed in ["3.1", "2"] {
        let set = module_set(
            &config,
            FakeProbe::default().with_pkgconfig("sys", installed),
            modules(),
        );
        let full = set.get_full_module_list(&["foo"], &no_skip(), true, false, true).unwrap();
        assert_eq!(names(&full), vec!["baz", "sys", "bar", "foo"]);

        let list = set.get_module_list(&["foo"], &no_skip(), &[], true, false).unwrap();
        assert_eq!(names(&list), vec!["baz", "bar", "foo"]);
    }
}

#[test]
fn test_partial_build_drops_provided_modules() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path());
    config.partial_build = true;
    let set = module_set(
        &config,
        FakeProbe::default().with_pkgconfig("glib-2.0", "2.80.0"),
        vec![
            autotools("gtk", &["glib"], &config),
            autotools("glib", &[], &config).with_pkg_config("glib-2.0.pc"),
        ],
    );
    let list = set.get_module_list(&["gtk"], &no_skip(), &[], true, false).unwrap();
    assert_eq!(names(&list), vec!["gtk"]);

    config.partial_build = false;
    let set = module_set(
        &config,
        FakeProbe::default().with_pkgconfig("glib-2.0", "2.80.0"),
        vec![
            autotools("gtk", &["glib"], &config),
            autotools("glib", &[], &config).with_pkg_config("glib-2.0.pc"),
        ],
    );
    let list = set.get_module_list(&["gtk"], &no_skip(), &[], true, false).unwrap();
    assert_eq!(names(&list), vec!["glib", "gtk"]);
}

#[test]
fn test_module_state() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let mut probe = FakeProbe::default().with_pkgconfig("sys", "2");
    probe.present.insert("msgfmt".to_string());
    let set = module_set(
        &config,
        probe,
        vec![
            system_module("sys", &[], "sys.pc"),
            system_tool("gettext", "msgfmt"),
            system_tool("bison", "bison"),
        ],
    );

    let modules: Vec<&jhbuild::Package> = set.modules().collect();
    let states = set.get_module_state(&modules);
    assert_eq!(states.len(), 3);

    let (_, sys) = &states[0];
    assert_eq!(sys.installed_version.as_deref(), Some("2"));
    assert!(sys.new_enough);
    assert!(sys.is_system);

    let (_, gettext) = &states[1];
    assert_eq!(gettext.installed_version.as_deref(), Some("unknown"));
    assert!(gettext.new_enough);

    let (_, bison) = &states[2];
    assert_eq!(bison.installed_version, None);
    assert!(!bison.new_enough);
}
