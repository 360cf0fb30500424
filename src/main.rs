// src/main.rs

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use commands::{GlobalOptions, ListOptions};
use jhbuild::Error;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Exit codes besides 0 (success) and 1 (module failures)
const EXIT_USAGE: u8 = 2;
const EXIT_FATAL: u8 = 3;
const EXIT_INTERRUPTED: u8 = 130;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = match (cli.quiet, cli.verbose) {
        (true, _) => "warn",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    match run(cli) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("jhbuild: {e:#}");
            ExitCode::from(exit_code_for(&e))
        }
    }
}

fn run(cli: Cli) -> Result<u8> {
    let global = GlobalOptions {
        file: cli.file.as_deref(),
        moduleset: cli.moduleset.as_deref(),
        quiet: cli.quiet,
    };

    let status = match cli.command {
        Some(Commands::Build { modules, opts }) => commands::cmd_build(&global, &modules, &opts)?,
        Some(Commands::Buildone { modules, opts }) => {
            commands::cmd_buildone(&global, &modules, &opts)?
        }
        Some(Commands::List {
            modules,
            skip,
            tags,
            show_revision,
            ignore_suggests,
            list_optional,
            all,
        }) => {
            let opts = ListOptions {
                skip,
                tags,
                show_revision,
                ignore_suggests,
                list_optional,
                all,
            };
            commands::cmd_list(&global, &modules, opts)?;
            0
        }
        Some(Commands::Info { module }) => {
            commands::cmd_info(&global, &module)?;
            0
        }
        Some(Commands::Uninstall { modules }) => commands::cmd_uninstall(&global, &modules)?,
        Some(Commands::Sysdeps { modules }) => {
            commands::cmd_sysdeps(&global, &modules)?;
            0
        }
        Some(Commands::Snapshot { modules, output }) => {
            commands::cmd_snapshot(&global, &modules, output.as_deref())?;
            0
        }
        Some(Commands::Completions { shell }) => {
            commands::cmd_completions(shell)?;
            0
        }
        None => commands::cmd_build(&global, &[], &cli::BuildArgs::default())?,
    };
    Ok(u8::try_from(status).unwrap_or(1))
}

/// Map a top-level error to the process exit code
fn exit_code_for(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<Error>() {
        Some(Error::Usage(_)) => EXIT_USAGE,
        Some(Error::Interrupted) => EXIT_INTERRUPTED,
        _ => EXIT_FATAL,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let usage = anyhow::Error::from(Error::Usage("bad".to_string()));
        assert_eq!(exit_code_for(&usage), EXIT_USAGE);
        let config = anyhow::Error::from(Error::Config("broken".to_string()));
        assert_eq!(exit_code_for(&config), EXIT_FATAL);
        assert_eq!(exit_code_for(&anyhow::Error::from(Error::Interrupted)), EXIT_INTERRUPTED);
        assert_eq!(exit_code_for(&anyhow::anyhow!("write failed")), EXIT_FATAL);
    }
}
