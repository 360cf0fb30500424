// src/commands/uninstall.rs
//! Module removal

use super::{GlobalOptions, load_config};
use anyhow::Result;
use jhbuild::Overrides;
use jhbuild::packagedb::PackageDb;
use tracing::{info, warn};

/// Remove installed modules, last named first
///
/// Returns 1 when any module could not be removed.
pub fn cmd_uninstall(global: &GlobalOptions<'_>, modules: &[String]) -> Result<i32> {
    let config = load_config(global, Overrides::default())?;
    let db = PackageDb::new(config.top_builddir(), config.prefix.clone());

    let mut failed = 0;
    for name in modules.iter().rev() {
        if !db.check(name, None) {
            info!("  [SKIP] {} is not installed", name);
            continue;
        }
        match db.uninstall(name) {
            Ok(()) => info!("  [OK] Uninstalled {}", name),
            Err(e) => {
                warn!("  [FAIL] {}: {}", name, e);
                failed += 1;
            }
        }
    }
    Ok(if failed > 0 { 1 } else { 0 })
}
