//! Lifecycle reconciler for a compose-managed server and its database.
//!
//! One invocation is one observe-decide-act-verify cycle: snapshot the managed
//! containers, pick the least disruptive action that reaches a running
//! deployment, fall back to a harder one if it fails, then confirm the public
//! endpoint answers. The runtime sits behind [`runtime::RuntimeAdapter`] so the
//! decision logic runs unchanged against scripted fakes.

use std::ffi::OsString;
use std::io::Write;
use std::process::ExitCode;

use clap::Parser;
use stevedore_config::Config;

mod cli;
mod config;
mod controller;
mod errors;
pub mod executor;
pub mod probe;
pub mod readiness;
pub mod reconciler;
pub mod report;
pub mod reporter;
pub mod runtime;
pub mod telemetry;

#[cfg(test)]
mod tests;

use cli::{Cli, CliCommand};
use config::{ConfigLoader, OrthoConfigLoader, split_config_arguments};
use controller::Controller;
pub use errors::AppError;
use readiness::TcpNetworkProbe;
use report::EnvCheck;
use reporter::StructuredReporter;
use runtime::{DockerRuntime, InterruptFlag, ProcessRunner};

/// Runs the CLI with the given arguments and output streams.
#[must_use]
pub fn run<I, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    run_with_loader(args, stdout, stderr, &OrthoConfigLoader)
}

pub(crate) fn run_with_loader<I, W, E, L>(
    args: I,
    stdout: &mut W,
    stderr: &mut E,
    loader: &L,
) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
    L: ConfigLoader,
{
    let args: Vec<OsString> = args.into_iter().collect();
    let split = split_config_arguments(&args);

    let cli = match Cli::try_parse_from(&split.cli_arguments) {
        Ok(cli) => cli,
        Err(error) => return render_usage(&error, stdout, stderr),
    };

    let result = loader
        .load(&split.config_arguments)
        .and_then(|config| execute(cli.command(), &config, stdout));

    match result {
        Ok(exit_code) => exit_code,
        Err(error) => {
            let _ = writeln!(stderr, "{error}");
            ExitCode::FAILURE
        }
    }
}

fn render_usage<W: Write, E: Write>(error: &clap::Error, stdout: &mut W, stderr: &mut E) -> ExitCode {
    let rendered = error.render();
    if error.use_stderr() {
        let _ = write!(stderr, "{rendered}");
        ExitCode::from(u8::try_from(error.exit_code()).unwrap_or(2))
    } else {
        let _ = write!(stdout, "{rendered}");
        ExitCode::SUCCESS
    }
}

fn execute<W: Write>(command: CliCommand, config: &Config, stdout: &mut W) -> Result<ExitCode, AppError> {
    telemetry::initialise(config)?;
    let interrupt = InterruptFlag::install().map_err(AppError::InstallSignals)?;

    let (env, env_file) = EnvCheck::inspect(&config.env_file_path());
    let runner = ProcessRunner::new(interrupt.clone());
    let runtime = DockerRuntime::from_config(config, runner, env_file.as_ref());

    let controller = Controller {
        config,
        runtime: &runtime,
        network: &TcpNetworkProbe,
        reporter: &StructuredReporter,
        env: &env,
        interrupt,
    };
    match command {
        CliCommand::Reconcile => controller.reconcile(stdout),
        CliCommand::Status => controller.status(stdout),
    }
}
