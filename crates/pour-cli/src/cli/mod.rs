//! CLI for pour.

mod commands;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use pour_core::config;
use pour_core::error::{DescriptorError, InstallError, RunError, EXIT_DESCRIPTOR};
use std::fmt;
use std::path::PathBuf;

use commands::{
    run_checksum, run_completions, run_install, run_show, run_uninstall, DescriptorArgs,
    InstallArgs,
};

/// Top-level CLI for pour.
#[derive(Debug, Parser)]
#[command(name = "pour")]
#[command(about = "pour: install release archives from checksum-pinned descriptors", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Fetch, verify, install and smoke-test a package from its descriptor.
    Install {
        /// Path to the descriptor (TOML).
        descriptor: PathBuf,

        /// Installation prefix (default from config, else ~/.local).
        #[arg(long, value_name = "DIR")]
        prefix: Option<PathBuf>,

        /// Do not fail on checksum mismatch. Dangerous.
        #[arg(long)]
        skip_verify: bool,

        /// Resolve and print the plan without downloading or installing.
        #[arg(long)]
        dry_run: bool,

        /// Template variable, overriding the environment. Repeatable.
        #[arg(long = "var", value_name = "KEY=VALUE")]
        vars: Vec<String>,

        /// Target platform as OS_ARCH (e.g. darwin_amd64). Defaults to this host.
        #[arg(long, value_name = "OS_ARCH")]
        platform: Option<String>,

        /// Keep the verified archive in the download cache.
        #[arg(long)]
        keep_download: bool,
    },

    /// Resolve a descriptor and print what it would install.
    Show {
        /// Path to the descriptor (TOML).
        descriptor: PathBuf,

        /// Installation prefix used for destination paths.
        #[arg(long, value_name = "DIR")]
        prefix: Option<PathBuf>,

        /// Template variable, overriding the environment. Repeatable.
        #[arg(long = "var", value_name = "KEY=VALUE")]
        vars: Vec<String>,

        /// Target platform as OS_ARCH.
        #[arg(long, value_name = "OS_ARCH")]
        platform: Option<String>,
    },

    /// Remove the files a previous install recorded.
    Uninstall {
        /// Package name.
        name: String,

        /// Installation prefix.
        #[arg(long, value_name = "DIR")]
        prefix: Option<PathBuf>,
    },

    /// Compute SHA-256 of a file (e.g. to fill in a descriptor).
    Checksum {
        /// Path to the file.
        path: PathBuf,
    },

    /// Print shell completions to stdout.
    Completions {
        /// Target shell.
        shell: Shell,
    },
}

/// Context marker for configuration failures.
#[derive(Debug)]
struct ConfigFailure;

impl fmt::Display for ConfigFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("load configuration")
    }
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        // Needs neither config nor state.
        if let CliCommand::Completions { shell } = cli.command {
            return run_completions(shell);
        }

        let cfg = config::load_or_init().context(ConfigFailure)?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Install {
                descriptor,
                prefix,
                skip_verify,
                dry_run,
                vars,
                platform,
                keep_download,
            } => {
                let args = InstallArgs {
                    descriptor: DescriptorArgs {
                        path: descriptor,
                        vars,
                        platform,
                    },
                    prefix,
                    skip_verify,
                    dry_run,
                    keep_download,
                };
                run_install(&cfg, args).await?;
            }
            CliCommand::Show {
                descriptor,
                prefix,
                vars,
                platform,
            } => {
                let args = DescriptorArgs {
                    path: descriptor,
                    vars,
                    platform,
                };
                run_show(&cfg, &args, prefix).await?;
            }
            CliCommand::Uninstall { name, prefix } => run_uninstall(&cfg, &name, prefix).await?,
            CliCommand::Checksum { path } => run_checksum(&path).await?,
            CliCommand::Completions { .. } => {}
        }

        Ok(())
    }
}

/// Process exit code for a failed command.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    if let Some(e) = err.downcast_ref::<RunError>() {
        return e.exit_code();
    }
    if err.downcast_ref::<DescriptorError>().is_some() || err.downcast_ref::<ConfigFailure>().is_some()
    {
        return EXIT_DESCRIPTOR;
    }
    if err.downcast_ref::<InstallError>().is_some() {
        return 3;
    }
    1
}

#[cfg(test)]
mod tests;
