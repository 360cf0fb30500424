// src/modtypes/install.rs

//! DESTDIR staged installs
//!
//! Install phases run the build tool with `DESTDIR` pointing at
//! `<top_builddir>/root-<module>`. The staged copy of the prefix is then
//! moved into the real prefix, every moved path is recorded as the new
//! manifest, and files the previous install owned but this one did not
//! produce are removed.

use crate::build::BuildContext;
use crate::error::{Error, Result};
use crate::package::Package;
use crate::packagedb::remove_paths;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Fresh, empty staging directory for a module
pub(crate) fn prepare_destdir(pkg: &Package, ctx: &BuildContext) -> Result<PathBuf> {
    let config = ctx.config();
    let db = ctx.packagedb();
    if config.uninstall_before_install && db.check(&pkg.name, None) {
        ctx.message(&format!("Uninstalling old installed version of {}", pkg.name));
        db.uninstall(&pkg.name)?;
    }

    let destdir = config.top_builddir().join(format!("root-{}", pkg.name));
    if destdir.exists() {
        fs::remove_dir_all(&destdir)?;
    }
    fs::create_dir_all(&destdir)?;
    Ok(destdir)
}

/// Move the staged tree into the prefix and record the install
pub(crate) fn process_install(
    pkg: &Package,
    ctx: &BuildContext,
    destdir: &Path,
    configure_cmd: Option<&str>,
) -> Result<()> {
    let config = ctx.config();
    let prefix = &config.prefix;
    let staged_prefix = destdir.join(prefix.strip_prefix("/").unwrap_or(prefix));

    let previous: Option<Vec<String>> = match ctx.packagedb().get(&pkg.name)? {
        Some(entry) => entry.manifest()?.map(<[String]>::to_vec),
        None => None,
    };

    let mut manifest = Vec::new();
    if staged_prefix.is_dir() {
        move_tree(&staged_prefix, prefix, &mut manifest)?;
    } else {
        warn!("{} did not install anything into {}", pkg.name, prefix.display());
    }

    let leftovers = WalkDir::new(destdir)
        .min_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| !e.file_type().is_dir())
        .count();
    if leftovers > 0 {
        warn!(
            "{} installed {} file(s) outside of {}; they were not installed",
            pkg.name,
            leftovers,
            prefix.display()
        );
    }
    fs::remove_dir_all(destdir)?;

    if let Some(previous) = previous {
        let current: HashSet<&str> = manifest.iter().map(String::as_str).collect();
        let stale: Vec<String> = previous
            .into_iter()
            .filter(|path| !current.contains(path.as_str()))
            .collect();
        if !stale.is_empty() {
            debug!("Removing {} stale path(s) of {}", stale.len(), pkg.name);
            remove_paths(&stale, prefix);
        }
    }

    let revision = pkg.revision().unwrap_or_default();
    ctx.packagedb()
        .add(&pkg.name, &revision, &manifest, configure_cmd)
}

/// Move `from` onto `to`, recording destination paths (directories with a
/// trailing '/')
fn move_tree(from: &Path, to: &Path, manifest: &mut Vec<String>) -> Result<()> {
    fs::create_dir_all(to)?;
    let entries: Vec<walkdir::DirEntry> = WalkDir::new(from)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .collect::<std::result::Result<_, _>>()?;

    for entry in entries {
        let rel = entry
            .path()
            .strip_prefix(from)
            .map_err(|e| Error::BuildState(e.to_string()))?;
        let target = to.join(rel);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            if target.is_symlink() || (target.exists() && !target.is_dir()) {
                return Err(Error::BuildState(format!(
                    "cannot install directory over {}",
                    target.display()
                )));
            }
            fs::create_dir_all(&target)?;
            manifest.push(format!("{}/", target.display()));
            continue;
        }

        if target.is_dir() && !target.is_symlink() {
            return Err(Error::BuildState(format!(
                "cannot install file over directory {}",
                target.display()
            )));
        }
        match fs::symlink_metadata(&target) {
            Ok(_) => fs::remove_file(&target)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        if fs::rename(entry.path(), &target).is_err() {
            // Different filesystems: copy, then drop the staged file
            if file_type.is_symlink() {
                symlink(fs::read_link(entry.path())?, &target)?;
            } else {
                fs::copy(entry.path(), &target)?;
            }
            fs::remove_file(entry.path())?;
        }
        manifest.push(target.to_string_lossy().into_owned());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_move_tree_records_manifest() {
        let staged = TempDir::new().unwrap();
        fs::create_dir_all(staged.path().join("lib/pkgconfig")).unwrap();
        fs::write(staged.path().join("lib/libfoo.so.1"), "elf").unwrap();
        symlink("libfoo.so.1", staged.path().join("lib/libfoo.so")).unwrap();
        fs::write(staged.path().join("lib/pkgconfig/foo.pc"), "Version: 1").unwrap();

        let prefix = TempDir::new().unwrap();
        fs::create_dir_all(prefix.path().join("lib")).unwrap();
        fs::write(prefix.path().join("lib/libfoo.so.1"), "old").unwrap();

        let mut manifest = Vec::new();
        move_tree(staged.path(), prefix.path(), &mut manifest).unwrap();

        let p = prefix.path().display();
        assert_eq!(
            manifest,
            vec![
                format!("{p}/lib/"),
                format!("{p}/lib/libfoo.so"),
                format!("{p}/lib/libfoo.so.1"),
                format!("{p}/lib/pkgconfig/"),
                format!("{p}/lib/pkgconfig/foo.pc"),
            ]
        );
        assert_eq!(fs::read_to_string(prefix.path().join("lib/libfoo.so.1")).unwrap(), "elf");
        assert_eq!(
            fs::read_link(prefix.path().join("lib/libfoo.so")).unwrap(),
            PathBuf::from("libfoo.so.1")
        );
    }

    #[test]
    fn test_file_over_directory_rejected() {
        let staged = TempDir::new().unwrap();
        fs::write(staged.path().join("share"), "not a dir").unwrap();
        let prefix = TempDir::new().unwrap();
        fs::create_dir_all(prefix.path().join("share")).unwrap();

        let mut manifest = Vec::new();
        assert!(move_tree(staged.path(), prefix.path(), &mut manifest).is_err());
    }
}
