// src/cli/mod.rs
//! CLI definitions for jhbuild
//!
//! This module contains the command-line interface definitions using clap.
//! The command implementations are in the `commands` module.
//!
//! - `build` - Build modules and their dependencies
//! - `buildone` - Build the named modules only
//! - `list` - Print the resolved build order
//! - `info` - Show module metadata and install state
//! - `uninstall` - Remove installed modules from the prefix
//! - `sysdeps` - Report which modules the host already provides
//! - `snapshot` - Write a standalone moduleset for the resolved modules

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use jhbuild::{BuildPolicy, Overrides};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "jhbuild")]
#[command(version)]
#[command(about = "Build a stack of source modules into a common prefix", long_about = None)]
pub struct Cli {
    /// Configuration file (default: $XDG_CONFIG_HOME/jhbuildrc.toml)
    #[arg(short = 'f', long = "file", global = true)]
    pub file: Option<PathBuf>,

    /// Moduleset to load instead of the configured one
    #[arg(short = 'm', long, global = true)]
    pub moduleset: Option<String>,

    /// More log output; repeat for trace level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only warnings and errors; command output is shown on failure only
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build modules and everything they depend on
    Build {
        /// Modules to build (default: the configured modules)
        modules: Vec<String>,

        #[command(flatten)]
        opts: BuildArgs,
    },

    /// Build the named modules without their dependencies
    Buildone {
        #[arg(required = true)]
        modules: Vec<String>,

        #[command(flatten)]
        opts: BuildArgs,
    },

    /// Print the modules that would be built, in order
    List {
        modules: Vec<String>,

        /// Modules to leave out (names or shell patterns)
        #[arg(short, long, value_delimiter = ',')]
        skip: Vec<String>,

        /// Only list modules carrying one of these tags
        #[arg(short, long, value_delimiter = ',')]
        tags: Vec<String>,

        /// Print each module's current source revision
        #[arg(short = 'r', long)]
        show_revision: bool,

        /// Leave out modules that are only suggested
        #[arg(long)]
        ignore_suggests: bool,

        /// Include modules that are only ordered with `after`
        #[arg(long)]
        list_optional: bool,

        /// List every module in the moduleset instead
        #[arg(short, long)]
        all: bool,
    },

    /// Show information about a module
    Info {
        module: String,
    },

    /// Remove installed modules from the prefix
    Uninstall {
        #[arg(required = true)]
        modules: Vec<String>,
    },

    /// Show which modules the host system already provides
    Sysdeps {
        modules: Vec<String>,
    },

    /// Write a standalone moduleset for the resolved modules
    Snapshot {
        modules: Vec<String>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Switches shared by `build` and `buildone`
#[derive(Args, Debug, Clone, Default)]
pub struct BuildArgs {
    /// Modules to skip (names or shell patterns)
    #[arg(short, long, value_delimiter = ',')]
    pub skip: Vec<String>,

    /// Only build modules carrying one of these tags
    #[arg(short, long, value_delimiter = ',')]
    pub tags: Vec<String>,

    /// Do not access the network
    #[arg(short, long)]
    pub no_network: bool,

    /// Only check out sources
    #[arg(long)]
    pub nobuild: bool,

    /// Build modules even when a dependency failed
    #[arg(long)]
    pub no_poison: bool,

    /// Run the test suite after building
    #[arg(short, long)]
    pub check: bool,

    /// Run `make clean` before building
    #[arg(long)]
    pub clean: bool,

    /// Run `make distclean` before building
    #[arg(long)]
    pub distclean: bool,

    /// Build release tarballs
    #[arg(long)]
    pub dist: bool,

    /// Build and verify release tarballs
    #[arg(long)]
    pub distcheck: bool,

    /// Stop at the first failure
    #[arg(long)]
    pub exit_on_error: bool,

    /// Rebuild modules that are already up to date
    #[arg(long)]
    pub force: bool,

    /// Build policy: all, updated or updated-deps
    #[arg(long, value_name = "POLICY")]
    pub policy: Option<BuildPolicy>,

    /// Skip modules installed less than this many seconds ago
    #[arg(long, value_name = "SECONDS")]
    pub min_age: Option<u64>,

    /// Retry a failed configure with a fresh checkout
    #[arg(long)]
    pub try_checkout: bool,

    /// Always run autogen/configure
    #[arg(short, long)]
    pub autogen: bool,

    /// Never prompt; failed modules are recorded and the build moves on
    #[arg(long)]
    pub no_interact: bool,

    /// Do not check system dependencies before building
    #[arg(long)]
    pub nodeps: bool,

    /// Start building at this module
    #[arg(long, value_name = "MODULE")]
    pub start_at: Option<String>,

    /// Leave out modules the host system provides
    #[arg(long)]
    pub partial_build: bool,

    /// Set (`name` or `+name`) or unset (`-name`) a moduleset condition
    #[arg(long = "condition", value_name = "COND", allow_hyphen_values = true)]
    pub conditions: Vec<String>,
}

impl BuildArgs {
    /// Configuration overrides for these switches
    pub fn overrides(&self) -> Overrides {
        let build_policy = if self.force {
            Some(BuildPolicy::All)
        } else {
            self.policy
        };
        Overrides {
            skip: self.skip.clone(),
            tags: self.tags.clone(),
            nonetwork: self.no_network,
            nobuild: self.nobuild,
            nopoison: self.no_poison,
            makecheck: self.check,
            makeclean: self.clean,
            makedist: self.dist,
            makedistcheck: self.distcheck,
            makedistclean: self.distclean,
            exit_on_error: self.exit_on_error,
            trycheckout: self.try_checkout,
            alwaysautogen: self.autogen,
            no_interact: self.no_interact,
            nodeps: self.nodeps,
            build_policy,
            min_age: self.min_age,
            start_at: self.start_at.clone(),
            partial_build: self.partial_build.then_some(true),
            conditions: self.conditions.clone(),
            ..Overrides::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_build_flags_become_overrides() {
        let cli = Cli::parse_from([
            "jhbuild", "build", "gtk", "--skip", "a,b*", "--force", "--policy", "updated",
            "--condition", "-x11", "-n",
        ]);
        let Some(Commands::Build { modules, opts }) = cli.command else {
            panic!("expected build");
        };
        assert_eq!(modules, vec!["gtk"]);
        let overrides = opts.overrides();
        assert_eq!(overrides.skip, vec!["a", "b*"]);
        assert_eq!(overrides.build_policy, Some(BuildPolicy::All));
        assert_eq!(overrides.conditions, vec!["-x11"]);
        assert!(overrides.nonetwork);
        assert_eq!(overrides.partial_build, None);
    }

    #[test]
    fn test_buildone_requires_modules() {
        assert!(Cli::try_parse_from(["jhbuild", "buildone"]).is_err());
    }
}
