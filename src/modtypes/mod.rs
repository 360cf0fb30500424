// src/modtypes/mod.rs

//! Module types
//!
//! [`ModuleKind`] is a closed set of build systems. Each kind declares a
//! static phase table, a skip predicate per phase and the phase bodies; the
//! build engine only sees [`run_phase`], [`skip_phase`] and the table.
//!
//! The checkout phases and the build policy check are shared by every kind
//! with sources and live here.

mod autotools;
mod cmake;
mod distutils;
pub(crate) mod install;
mod meson;
mod testmodule;

pub use autotools::Autotools;
pub use cmake::CMake;
pub use distutils::Distutils;
pub use meson::Meson;
pub use testmodule::TestModule;

use crate::build::BuildContext;
use crate::config::BuildPolicy;
use crate::error::{Error, Result};
use crate::package::Package;
use crate::packagedb::configure_hash;
use crate::phase::{Phase, PhaseControl, PhaseSpec, lookup};
use std::fs;
use std::path::Path;
use std::time::SystemTime;
use tracing::info;

/// Build system of a module and its type-specific settings
#[derive(Debug, Clone)]
pub enum ModuleKind {
    Autotools(Autotools),
    Meson(Meson),
    CMake(CMake),
    Distutils(Distutils),
    /// Provided by the host; never built
    System,
    /// Pure dependency aggregator
    Meta,
    Test(TestModule),
}

impl ModuleKind {
    pub fn autotools() -> Self {
        ModuleKind::Autotools(Autotools::default())
    }

    /// Module type name as used in moduleset files
    pub fn type_name(&self) -> &'static str {
        match self {
            ModuleKind::Autotools(_) => "autotools",
            ModuleKind::Meson(_) => "meson",
            ModuleKind::CMake(_) => "cmake",
            ModuleKind::Distutils(_) => "distutils",
            ModuleKind::System => "system",
            ModuleKind::Meta => "meta",
            ModuleKind::Test(_) => "test",
        }
    }

    pub fn phase_table(&self) -> &'static [PhaseSpec] {
        match self {
            ModuleKind::Autotools(_) => autotools::PHASES,
            ModuleKind::Meson(_) => meson::PHASES,
            ModuleKind::CMake(_) => cmake::PHASES,
            ModuleKind::Distutils(_) => distutils::PHASES,
            ModuleKind::Test(_) => testmodule::PHASES,
            ModuleKind::System | ModuleKind::Meta => &[],
        }
    }

    pub fn has_phase(&self, phase: Phase) -> bool {
        lookup(self.phase_table(), phase).is_some()
    }

    /// Whether a `buildroot` may host the build directory
    pub fn supports_non_srcdir_builds(&self) -> bool {
        match self {
            ModuleKind::Autotools(a) => a.supports_non_srcdir_builds,
            ModuleKind::Meson(_) | ModuleKind::CMake(_) | ModuleKind::Distutils(_) => true,
            ModuleKind::System | ModuleKind::Meta | ModuleKind::Test(_) => false,
        }
    }

    /// Whether the build directory must differ from the source directory
    pub fn forces_non_srcdir_builds(&self) -> bool {
        matches!(self, ModuleKind::Meson(_) | ModuleKind::CMake(_))
    }

    /// Element name and type-specific attributes for snapshots
    pub fn xml_tag_and_attrs(&self) -> (&'static str, Vec<(&'static str, String)>) {
        match self {
            ModuleKind::Autotools(a) => ("autotools", a.xml_attrs()),
            ModuleKind::Meson(m) => ("meson", m.xml_attrs()),
            ModuleKind::CMake(c) => ("cmake", c.xml_attrs()),
            ModuleKind::Distutils(d) => ("distutils", d.xml_attrs()),
            ModuleKind::System => ("systemmodule", Vec::new()),
            ModuleKind::Meta => ("metamodule", Vec::new()),
            ModuleKind::Test(t) => ("testmodule", t.xml_attrs()),
        }
    }
}

/// Run one phase body of a module
pub fn run_phase(pkg: &Package, phase: Phase, ctx: &BuildContext) -> Result<PhaseControl> {
    match phase {
        Phase::Checkout => return checkout(pkg, ctx),
        Phase::ForceCheckout => return force_checkout(pkg, ctx),
        _ => {}
    }
    match &pkg.kind {
        ModuleKind::Autotools(a) => a.run_phase(pkg, phase, ctx),
        ModuleKind::Meson(m) => m.run_phase(pkg, phase, ctx),
        ModuleKind::CMake(c) => c.run_phase(pkg, phase, ctx),
        ModuleKind::Distutils(d) => d.run_phase(pkg, phase, ctx),
        ModuleKind::Test(t) => t.run_phase(pkg, phase, ctx),
        ModuleKind::System | ModuleKind::Meta => Ok(PhaseControl::Done),
    }
}

/// Whether a phase can be skipped given the last executed phase
pub fn skip_phase(pkg: &Package, phase: Phase, last: Option<Phase>, ctx: &BuildContext) -> bool {
    match &pkg.kind {
        ModuleKind::Autotools(a) => a.skip_phase(pkg, phase, last, ctx),
        ModuleKind::Meson(m) => m.skip_phase(pkg, phase, last, ctx),
        ModuleKind::CMake(c) => c.skip_phase(pkg, phase, last, ctx),
        ModuleKind::Distutils(_) | ModuleKind::Test(_) => false,
        ModuleKind::System | ModuleKind::Meta => true,
    }
}

fn checkout(pkg: &Package, ctx: &BuildContext) -> Result<PhaseControl> {
    let branch = pkg.branch()?;
    if branch.may_checkout(ctx) {
        ctx.set_action("Checking out", &pkg.name);
        branch.checkout(ctx)?;
        if !branch.exists() {
            return Err(Error::BuildState(format!(
                "source directory {} was not created",
                branch.srcdir().display()
            )));
        }
    } else if !branch.exists() {
        return Err(Error::BuildState(format!(
            "source directory {} does not exist and network access is disabled",
            branch.srcdir().display()
        )));
    } else {
        info!("{}: source directory present, skipping checkout", pkg.name);
    }
    Ok(check_build_policy(pkg, ctx))
}

fn force_checkout(pkg: &Package, ctx: &BuildContext) -> Result<PhaseControl> {
    ctx.set_action("Checking out", &pkg.name);
    pkg.branch()?.force_checkout(ctx)?;
    Ok(PhaseControl::Done)
}

/// End the module early when it is already installed at the current tree
fn check_build_policy(pkg: &Package, ctx: &BuildContext) -> PhaseControl {
    let policy = ctx.config().build_policy;
    if policy == BuildPolicy::All {
        return PhaseControl::Done;
    }
    if pkg.branch.as_ref().is_some_and(|b| b.is_dirty()) {
        return PhaseControl::Done;
    }
    let revision = pkg.revision().unwrap_or_default();
    let db = ctx.packagedb();
    if !db.check(&pkg.name, Some(&revision)) {
        return PhaseControl::Done;
    }

    if policy == BuildPolicy::UpdatedDeps {
        let installed = db.installdate(&pkg.name);
        let dep_newer = pkg.dependencies.iter().any(|dep| {
            match (db.installdate(dep), installed) {
                (Some(dep_date), Some(own)) => dep_date > own,
                _ => false,
            }
        });
        if dep_newer {
            return PhaseControl::Done;
        }
    }

    ctx.message(&format!("Skipping {} (not updated)", pkg.name));
    PhaseControl::End
}

/// Shared part of the configure skip predicates
///
/// Configure is skipped only when `marker` (e.g. `config.status`) exists, the
/// recorded configure hash matches `command`, the marker is newer than
/// `configure.ac`/`configure.in`, and the previous phase does not invalidate
/// the configured tree.
pub(crate) fn configure_unchanged(
    pkg: &Package,
    ctx: &BuildContext,
    command: &str,
    marker: &Path,
    last: Option<Phase>,
) -> bool {
    if matches!(
        last,
        Some(Phase::ForceCheckout | Phase::Clean | Phase::Distclean | Phase::Build | Phase::Install)
    ) {
        return false;
    }
    if ctx.config().alwaysautogen || !marker.exists() {
        return false;
    }
    let Ok(Some(entry)) = ctx.packagedb().get(&pkg.name) else {
        return false;
    };
    if entry.configure_hash.as_deref() != Some(configure_hash(command).as_str()) {
        return false;
    }
    let Ok(srcdir) = pkg.srcdir() else {
        return false;
    };
    let marker_time = mtime(marker);
    for source in ["configure.ac", "configure.in"] {
        let path = srcdir.join(source);
        if path.exists() && mtime(&path) > marker_time {
            return false;
        }
    }
    true
}

fn mtime(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Join argument fragments and collapse runs of whitespace
pub(crate) fn join_args<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    parts
        .into_iter()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Create the build directory of a module if needed
pub(crate) fn ensure_builddir(pkg: &Package, ctx: &BuildContext) -> Result<std::path::PathBuf> {
    let builddir = pkg.builddir(ctx)?;
    fs::create_dir_all(&builddir)?;
    Ok(builddir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase::compute_phases;

    #[test]
    fn test_join_args() {
        assert_eq!(join_args(["make", "  -j4 ", "", "install"]), "make -j4 install");
    }

    #[test]
    fn test_meta_and_system_have_no_phases() {
        assert!(ModuleKind::Meta.phase_table().is_empty());
        assert!(!ModuleKind::System.has_phase(Phase::Checkout));
        assert!(compute_phases(ModuleKind::Meta.phase_table(), &[Phase::Install]).is_empty());
    }

    #[test]
    fn test_type_names() {
        assert_eq!(ModuleKind::autotools().type_name(), "autotools");
        assert_eq!(ModuleKind::Meson(Meson::default()).xml_tag_and_attrs().0, "meson");
        assert_eq!(ModuleKind::System.xml_tag_and_attrs().0, "systemmodule");
    }

    #[test]
    fn test_out_of_tree_rules() {
        assert!(ModuleKind::Meson(Meson::default()).forces_non_srcdir_builds());
        assert!(!ModuleKind::autotools().forces_non_srcdir_builds());
        assert!(ModuleKind::autotools().supports_non_srcdir_builds());
    }
}
