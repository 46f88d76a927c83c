//! Routes configuration flags to `ortho_config` and the rest to `clap`.
//!
//! Configuration flags may appear anywhere on the command line, before or
//! after the subcommand. They are lifted out, together with their values,
//! into the argument list handed to the configuration loader.

use std::ffi::{OsStr, OsString};

use stevedore_config::Config;

use crate::errors::AppError;

/// CLI flags recognised by the configuration loader.
///
/// Keep in sync with the fields of [`stevedore_config::Config`].
pub(crate) const CONFIG_CLI_FLAGS: &[&str] = &[
    "--config-path",
    "--project-dir",
    "--compose-command",
    "--docker-binary",
    "--container-prefix",
    "--endpoint",
    "--env-file",
    "--probe-timeout-secs",
    "--action-timeout-secs",
    "--readiness-timeout-secs",
    "--grace-period-ms",
    "--log-filter",
    "--log-format",
];

/// Loads configuration from filtered arguments.
pub(crate) trait ConfigLoader {
    /// Loads configuration; `args` starts with the binary name.
    fn load(&self, args: &[OsString]) -> Result<Config, AppError>;
}

/// Loader backed by `ortho_config` layering.
pub(crate) struct OrthoConfigLoader;

impl ConfigLoader for OrthoConfigLoader {
    fn load(&self, args: &[OsString]) -> Result<Config, AppError> {
        Config::load_from_iter(args.iter().cloned()).map_err(AppError::LoadConfiguration)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlagAction {
    Include { needs_value: bool },
    Skip,
}

fn classify_flag(argument: &OsStr) -> FlagAction {
    let text = argument.to_string_lossy();
    if !text.starts_with("--") {
        return FlagAction::Skip;
    }
    let (flag, has_inline_value) = match text.split_once('=') {
        Some((flag, _)) => (flag, true),
        None => (&*text, false),
    };
    if CONFIG_CLI_FLAGS.contains(&flag) {
        FlagAction::Include {
            needs_value: !has_inline_value,
        }
    } else {
        FlagAction::Skip
    }
}

/// Arguments split between the configuration loader and the CLI parser.
///
/// Both lists keep the binary name as their first element.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct ConfigArgumentSplit {
    pub(crate) config_arguments: Vec<OsString>,
    pub(crate) cli_arguments: Vec<OsString>,
}

pub(crate) fn split_config_arguments(args: &[OsString]) -> ConfigArgumentSplit {
    let Some((binary, rest)) = args.split_first() else {
        return ConfigArgumentSplit::default();
    };
    let mut split = ConfigArgumentSplit {
        config_arguments: vec![binary.clone()],
        cli_arguments: vec![binary.clone()],
    };

    let mut remaining = rest.iter();
    while let Some(argument) = remaining.next() {
        if argument == "--" {
            split.cli_arguments.push(argument.clone());
            split.cli_arguments.extend(remaining.cloned());
            break;
        }
        match classify_flag(argument) {
            FlagAction::Include { needs_value } => {
                split.config_arguments.push(argument.clone());
                if needs_value {
                    if let Some(value) = remaining.next() {
                        split.config_arguments.push(value.clone());
                    }
                }
            }
            FlagAction::Skip => split.cli_arguments.push(argument.clone()),
        }
    }
    split
}
