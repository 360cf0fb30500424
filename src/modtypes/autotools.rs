// src/modtypes/autotools.rs

//! autotools modules: `autogen.sh`/`configure` and `make`

use super::{configure_unchanged, ensure_builddir, install, join_args};
use crate::build::{BuildContext, CommandSpec};
use crate::error::Result;
use crate::package::Package;
use crate::phase::{Phase, PhaseControl, PhaseSpec};
use std::env;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use tracing::warn;

use Phase::*;

pub(crate) const PHASES: &[PhaseSpec] = &[
    PhaseSpec::new(Checkout, &[], &[ForceCheckout]),
    PhaseSpec::confirmed(ForceCheckout, &[], &[ForceCheckout]),
    PhaseSpec::new(Configure, &[Checkout], &[ForceCheckout]),
    PhaseSpec::new(Clean, &[Configure], &[ForceCheckout, Configure]),
    PhaseSpec::confirmed(Distclean, &[Checkout], &[ForceCheckout, Configure]),
    PhaseSpec::new(Build, &[Configure], &[ForceCheckout, Configure]),
    PhaseSpec::new(Check, &[Build], &[ForceCheckout, Configure]),
    PhaseSpec::new(Dist, &[Build], &[ForceCheckout, Configure]),
    PhaseSpec::new(Distcheck, &[Dist], &[ForceCheckout, Configure]),
    PhaseSpec::new(Install, &[Build], &[]),
];

const DEFAULT_AUTOGEN: &str = "autogen.sh";

#[derive(Debug, Clone)]
pub struct Autotools {
    pub autogenargs: String,
    pub makeargs: String,
    pub makeinstallargs: Option<String>,
    /// Script run to configure; `autogen.sh` falls back to `configure`
    pub autogen_sh: String,
    /// Skip configure whenever the tree is already configured
    pub skip_autogen: bool,
    pub supports_non_srcdir_builds: bool,
    /// Run the `check` target when checks are requested
    pub check_target: bool,
}

impl Default for Autotools {
    fn default() -> Self {
        Self {
            autogenargs: String::new(),
            makeargs: String::new(),
            makeinstallargs: None,
            autogen_sh: DEFAULT_AUTOGEN.to_string(),
            skip_autogen: false,
            supports_non_srcdir_builds: true,
            check_target: true,
        }
    }
}

impl Autotools {
    /// Script the configure command invokes, relative to the source tree
    fn configure_script(&self, srcdir: &Path) -> &str {
        let fallback = self.autogen_sh == DEFAULT_AUTOGEN && !srcdir.join(DEFAULT_AUTOGEN).exists();
        if fallback || self.autogen_sh == "autoreconf" {
            "configure"
        } else {
            &self.autogen_sh
        }
    }

    /// The generated `configure` must come from `autoreconf` first
    fn needs_autoreconf(&self, srcdir: &Path) -> bool {
        match self.autogen_sh.as_str() {
            "autoreconf" => true,
            DEFAULT_AUTOGEN => {
                !srcdir.join(DEFAULT_AUTOGEN).exists() && !srcdir.join("configure").exists()
            }
            _ => false,
        }
    }

    /// Configure command line; also the input of the configure hash
    pub fn configure_command(&self, pkg: &Package, ctx: &BuildContext) -> Result<String> {
        let config = ctx.config();
        let srcdir = pkg.srcdir()?;
        let builddir = pkg.builddir(ctx)?;
        let script = self.configure_script(srcdir);

        let script_dir = if builddir == srcdir {
            ".".to_string()
        } else {
            srcdir.display().to_string()
        };
        let libdir = if config.use_lib64 {
            "'${exec_prefix}/lib64'"
        } else {
            "'${exec_prefix}/lib'"
        };
        let prefix = config.prefix.display().to_string();

        let mut command = join_args([
            format!("{script_dir}/{script}").as_str(),
            "--prefix",
            prefix.as_str(),
            "--disable-static",
            "--libdir",
            libdir,
            self.autogenargs.as_str(),
            config.autogenargs_for(&pkg.name),
        ]);
        if script == "configure" {
            command = join_args(
                command
                    .split(' ')
                    .filter(|arg| *arg != "--enable-maintainer-mode" && *arg != "--"),
            );
        }
        if !command.contains("--exec-prefix") {
            command = command.replace("${exec_prefix}", &prefix);
        }
        Ok(command)
    }

    fn make(&self, pkg: &Package, ctx: &BuildContext, target: &str) -> String {
        let make = env::var("MAKE").unwrap_or_else(|_| "make".to_string());
        join_args([
            make.as_str(),
            self.makeargs.as_str(),
            ctx.config().makeargs_for(&pkg.name),
            target,
        ])
    }

    fn run_make(&self, pkg: &Package, ctx: &BuildContext, target: &str) -> Result<()> {
        let builddir = pkg.builddir(ctx)?;
        ctx.execute(
            CommandSpec::shell(self.make(pkg, ctx, target), &builddir).with_env(pkg.command_env(ctx)),
        )
    }

    pub(crate) fn run_phase(
        &self,
        pkg: &Package,
        phase: Phase,
        ctx: &BuildContext,
    ) -> Result<PhaseControl> {
        match phase {
            Configure => {
                ctx.set_action("Configuring", &pkg.name);
                self.configure(pkg, ctx)?;
            }
            Clean => {
                ctx.set_action("Cleaning", &pkg.name);
                self.run_make(pkg, ctx, "clean")?;
            }
            Distclean => {
                ctx.set_action("Distcleaning", &pkg.name);
                self.run_make(pkg, ctx, "distclean")?;
            }
            Build => {
                ctx.set_action("Building", &pkg.name);
                self.run_make(pkg, ctx, "")?;
            }
            Check => {
                ctx.set_action("Checking", &pkg.name);
                if let Err(e) = self.run_make(pkg, ctx, "check") {
                    if !ctx.config().makecheck_advisory || !e.is_phase_error() {
                        return Err(e);
                    }
                    warn!("{}: check failed: {}", pkg.name, e);
                    ctx.message(&format!("Check of {} failed, continuing", pkg.name));
                }
            }
            Dist => {
                ctx.set_action("Creating tarball for", &pkg.name);
                self.run_make(pkg, ctx, "dist")?;
            }
            Distcheck => {
                ctx.set_action("Dist checking", &pkg.name);
                self.run_make(pkg, ctx, "distcheck")?;
            }
            Install => {
                ctx.set_action("Installing", &pkg.name);
                self.install(pkg, ctx)?;
            }
            Checkout | ForceCheckout | Test => {}
        }
        Ok(PhaseControl::Done)
    }

    fn configure(&self, pkg: &Package, ctx: &BuildContext) -> Result<()> {
        let srcdir = pkg.srcdir()?;
        let builddir = ensure_builddir(pkg, ctx)?;
        let env = pkg.command_env(ctx);

        if self.needs_autoreconf(srcdir) {
            ctx.execute(CommandSpec::argv(["autoreconf", "-fi"], srcdir).with_env(env.clone()))?;
            let configure = srcdir.join("configure");
            if configure.exists() {
                fs::set_permissions(&configure, fs::Permissions::from_mode(0o755))?;
            }
        }

        let command = self.configure_command(pkg, ctx)?;
        ctx.execute(CommandSpec::shell(command, &builddir).with_env(env))
    }

    fn install(&self, pkg: &Package, ctx: &BuildContext) -> Result<()> {
        let destdir = install::prepare_destdir(pkg, ctx)?;
        let builddir = pkg.builddir(ctx)?;
        let target = match &self.makeinstallargs {
            Some(args) => args.clone(),
            None => "install".to_string(),
        };
        let command = format!(
            "{} DESTDIR={}",
            self.make(pkg, ctx, &target),
            destdir.display()
        );
        ctx.execute(
            CommandSpec::shell(command, &builddir)
                .with_env(pkg.command_env(ctx))
                .env_var("DESTDIR", destdir.to_string_lossy()),
        )?;
        let configure_cmd = self.configure_command(pkg, ctx)?;
        install::process_install(pkg, ctx, &destdir, Some(&configure_cmd))
    }

    pub(crate) fn skip_phase(
        &self,
        pkg: &Package,
        phase: Phase,
        last: Option<Phase>,
        ctx: &BuildContext,
    ) -> bool {
        match phase {
            Configure => self.skip_configure(pkg, ctx, last),
            Clean => {
                let distclean_requested = ctx
                    .config()
                    .build_targets()
                    .is_ok_and(|targets| targets.contains(&Distclean));
                distclean_requested
                    || pkg
                        .builddir(ctx)
                        .map(|dir| !dir.join("Makefile").exists())
                        .unwrap_or(true)
            }
            Check => {
                if !self.check_target {
                    return true;
                }
                if let Some(enabled) = ctx.config().makecheck_for(&pkg.name) {
                    return !enabled;
                }
                !ctx
                    .config()
                    .build_targets()
                    .is_ok_and(|targets| targets.contains(&Check))
            }
            _ => false,
        }
    }

    fn skip_configure(&self, pkg: &Package, ctx: &BuildContext, last: Option<Phase>) -> bool {
        if self.skip_autogen {
            return true;
        }
        let Ok(builddir) = pkg.builddir(ctx) else {
            return false;
        };
        let Ok(command) = self.configure_command(pkg, ctx) else {
            return false;
        };
        configure_unchanged(pkg, ctx, &command, &builddir.join("config.status"), last)
    }

    pub(crate) fn xml_attrs(&self) -> Vec<(&'static str, String)> {
        let mut attrs = Vec::new();
        if !self.autogenargs.is_empty() {
            attrs.push(("autogenargs", self.autogenargs.clone()));
        }
        if !self.makeargs.is_empty() {
            attrs.push(("makeargs", self.makeargs.clone()));
        }
        if let Some(args) = &self.makeinstallargs {
            attrs.push(("makeinstallargs", args.clone()));
        }
        if self.autogen_sh != DEFAULT_AUTOGEN {
            attrs.push(("autogen-sh", self.autogen_sh.clone()));
        }
        if self.skip_autogen {
            attrs.push(("skip-autogen", "true".to_string()));
        }
        if !self.supports_non_srcdir_builds {
            attrs.push(("supports-non-srcdir-builds", "no".to_string()));
        }
        if !self.check_target {
            attrs.push(("check-target", "false".to_string()));
        }
        attrs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase::compute_phases;

    #[test]
    fn test_phase_lists() {
        assert_eq!(
            compute_phases(PHASES, &[Install]),
            vec![Checkout, Configure, Build, Install]
        );
        assert_eq!(
            compute_phases(PHASES, &[Clean, Check, Install]),
            vec![Checkout, Configure, Clean, Build, Check, Install]
        );
        assert_eq!(
            compute_phases(PHASES, &[Install, Distcheck]),
            vec![Checkout, Configure, Build, Install, Dist, Distcheck]
        );
    }

    #[test]
    fn test_configure_script_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let autotools = Autotools::default();
        assert_eq!(autotools.configure_script(dir.path()), "configure");
        assert!(autotools.needs_autoreconf(dir.path()));

        fs::write(dir.path().join("configure"), "#!/bin/sh\n").unwrap();
        assert!(!autotools.needs_autoreconf(dir.path()));

        fs::write(dir.path().join("autogen.sh"), "#!/bin/sh\n").unwrap();
        assert_eq!(autotools.configure_script(dir.path()), "autogen.sh");
    }

    #[test]
    fn test_default_attrs_omitted() {
        assert!(Autotools::default().xml_attrs().is_empty());
        let custom = Autotools {
            autogen_sh: "configure".to_string(),
            ..Autotools::default()
        };
        assert_eq!(custom.xml_attrs(), vec![("autogen-sh", "configure".to_string())]);
    }
}
