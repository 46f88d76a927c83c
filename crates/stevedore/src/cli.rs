//! Command-line interface definition.
//!
//! Configuration flags (`--project-dir`, `--endpoint`, ...) are handled by the
//! configuration loader and never reach this parser.

use clap::{Parser, Subcommand};

/// Brings a compose-managed server and its database to a ready state.
#[derive(Parser, Debug)]
#[command(
    name = "stevedore",
    version,
    disable_help_subcommand = true,
    after_help = "Configuration flags such as --project-dir, --endpoint and \
                  --log-filter are also read from STEVEDORE_* environment \
                  variables and the file named by --config-path."
)]
pub(crate) struct Cli {
    /// What to do; reconciles when omitted.
    #[command(subcommand)]
    pub(crate) command: Option<CliCommand>,
}

impl Cli {
    pub(crate) fn command(&self) -> CliCommand {
        self.command.unwrap_or(CliCommand::Reconcile)
    }
}

/// Subcommands.
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CliCommand {
    /// Observe, act and verify until the deployment is running.
    Reconcile,
    /// Observe and verify only; never starts or stops anything.
    Status,
}
