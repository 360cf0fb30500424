// src/environment.rs

//! Environment overlay for build commands
//!
//! The process environment is never modified. Instead the variables that
//! point build tools at the install prefix are computed once per
//! configuration and layered over the inherited environment of each child.

use crate::config::Config;
use std::collections::BTreeMap;
use std::env;
use std::path::Path;

/// Compute the variables exported to every build command
pub fn build_environment(config: &Config) -> BTreeMap<String, String> {
    let prefix = &config.prefix;
    let libdir = config.libdir();
    let mut vars = BTreeMap::new();

    vars.insert("JHBUILD_PREFIX".to_string(), path_str(prefix));
    vars.insert("JHBUILD_LIBDIR".to_string(), path_str(&libdir));
    vars.insert("UNMANGLED_PATH".to_string(), inherited("PATH").unwrap_or_default());

    prepend(&mut vars, "PATH", &[prefix.join("bin")], None);
    prepend(&mut vars, "LD_LIBRARY_PATH", &[libdir.clone()], None);
    prepend(
        &mut vars,
        "PKG_CONFIG_PATH",
        &[libdir.join("pkgconfig"), prefix.join("share/pkgconfig")],
        None,
    );
    prepend(
        &mut vars,
        "XDG_DATA_DIRS",
        &[prefix.join("share")],
        Some("/usr/local/share:/usr/share"),
    );
    prepend(
        &mut vars,
        "XDG_CONFIG_DIRS",
        &[prefix.join("etc/xdg")],
        Some("/etc/xdg"),
    );
    prepend(&mut vars, "ACLOCAL_PATH", &[prefix.join("share/aclocal")], None);
    prepend(&mut vars, "GI_TYPELIB_PATH", &[libdir.join("girepository-1.0")], None);

    for (key, value) in &config.extra_env {
        vars.insert(key.clone(), value.clone());
    }
    vars
}

fn inherited(var: &str) -> Option<String> {
    env::var(var).ok().filter(|v| !v.is_empty())
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Put `dirs` in front of a colon-separated variable, dropping duplicates
fn prepend(
    vars: &mut BTreeMap<String, String>,
    var: &str,
    dirs: &[impl AsRef<Path>],
    fallback: Option<&str>,
) {
    let existing = inherited(var).or_else(|| fallback.map(str::to_string));
    let mut parts: Vec<String> = dirs.iter().map(|d| path_str(d.as_ref())).collect();
    if let Some(existing) = existing {
        for part in existing.split(':').filter(|p| !p.is_empty()) {
            if !parts.iter().any(|p| p == part) {
                parts.push(part.to_string());
            }
        }
    }
    vars.insert(var.to_string(), parts.join(":"));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_prefix_variables() {
        let config = Config {
            prefix: PathBuf::from("/opt/jh"),
            ..Config::default()
        };
        let vars = build_environment(&config);

        assert_eq!(vars["JHBUILD_PREFIX"], "/opt/jh");
        assert!(vars["PATH"].starts_with("/opt/jh/bin"));
        assert!(vars["LD_LIBRARY_PATH"].starts_with("/opt/jh/lib"));
        assert!(vars["PKG_CONFIG_PATH"].starts_with("/opt/jh/lib/pkgconfig:/opt/jh/share/pkgconfig"));
        assert!(vars["XDG_DATA_DIRS"].contains("/opt/jh/share"));
    }

    #[test]
    fn test_extra_env_wins() {
        let mut config = Config {
            prefix: PathBuf::from("/opt/jh"),
            ..Config::default()
        };
        config.extra_env.insert("CFLAGS".to_string(), "-O0 -g".to_string());
        let vars = build_environment(&config);
        assert_eq!(vars["CFLAGS"], "-O0 -g");
    }

    #[test]
    fn test_prepend_dedups() {
        let mut vars = BTreeMap::new();
        prepend(&mut vars, "JHBUILD_TEST_UNSET_VAR", &["/a", "/b"], Some("/b:/c"));
        assert_eq!(vars["JHBUILD_TEST_UNSET_VAR"], "/a:/b:/c");
    }
}
