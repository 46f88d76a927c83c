//! Bounded execution of external commands.
//!
//! Every runtime and orchestrator call goes through [`CommandRunner`]. The
//! production [`ProcessRunner`] captures output into anonymous temporary files
//! so a chatty child can never block on a full pipe, then polls the child
//! against its deadline and the operator interrupt flag. A child that outlives
//! either is killed and reaped before the error is returned.

use std::ffi::{OsStr, OsString};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, warn};

use super::interrupt::InterruptFlag;

const COMMAND_TARGET: &str = "stevedore::command";
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Description of one external command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    program: OsString,
    args: Vec<OsString>,
    current_dir: Option<PathBuf>,
    envs: Vec<(OsString, OsString)>,
    timeout: Duration,
}

impl CommandSpec {
    /// Starts a spec for `program` with a default ten second timeout.
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            envs: Vec::new(),
            timeout: Duration::from_secs(10),
        }
    }

    /// Appends one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets the working directory of the child.
    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Adds environment variables on top of the inherited environment.
    #[must_use]
    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<OsString>,
        V: Into<OsString>,
    {
        self.envs
            .extend(vars.into_iter().map(|(key, value)| (key.into(), value.into())));
        self
    }

    /// Sets the upper bound on the child's run time.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Program to execute.
    #[must_use]
    pub fn program(&self) -> &OsStr {
        self.program.as_os_str()
    }

    /// Arguments passed to the program.
    #[must_use]
    pub fn arguments(&self) -> &[OsString] {
        self.args.as_slice()
    }

    /// Working directory, when set.
    #[must_use]
    pub fn working_dir(&self) -> Option<&Path> {
        self.current_dir.as_deref()
    }

    /// Extra environment variables.
    #[must_use]
    pub fn environment(&self) -> &[(OsString, OsString)] {
        self.envs.as_slice()
    }

    /// Upper bound on run time.
    #[must_use]
    pub const fn time_limit(&self) -> Duration {
        self.timeout
    }

    /// Program and arguments joined for log output.
    #[must_use]
    pub fn display_line(&self) -> String {
        let mut line = self.program.to_string_lossy().into_owned();
        for arg in &self.args {
            line.push(' ');
            line.push_str(&arg.to_string_lossy());
        }
        line
    }
}

/// Captured result of a command that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `None` when the child was ended by a signal.
    pub code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// Builds a successful output carrying `stdout`.
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Builds a failed output with the given exit code and `stderr`.
    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Whether the command exited with status zero.
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        matches!(self.code, Some(0))
    }

    /// Short failure description built from the exit code and stderr.
    #[must_use]
    pub fn failure_reason(&self) -> String {
        let status = self
            .code
            .map_or_else(|| String::from("terminated by signal"), |code| format!("exit status {code}"));
        let detail = self
            .stderr
            .lines()
            .map(str::trim)
            .rfind(|line| !line.is_empty());
        match detail {
            Some(detail) => format!("{status}: {detail}"),
            None => status,
        }
    }
}

/// Errors raised when a command could not run to completion.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The program is not installed or not on `PATH`.
    #[error("'{program}' is not available: {source}")]
    NotFound {
        /// Program that could not be found.
        program: String,
        /// Underlying spawn error.
        #[source]
        source: io::Error,
    },
    /// Spawning failed for another reason.
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        /// Program that failed to spawn.
        program: String,
        /// Underlying spawn error.
        #[source]
        source: io::Error,
    },
    /// The child outlived its deadline and was killed.
    #[error("'{command}' did not finish within {timeout_ms} ms")]
    Timeout {
        /// Command line that timed out.
        command: String,
        /// Deadline in milliseconds.
        timeout_ms: u64,
    },
    /// The operator interrupted the run; the child was killed.
    #[error("'{command}' was interrupted")]
    Interrupted {
        /// Command line that was interrupted.
        command: String,
    },
    /// Polling the child failed.
    #[error("failed to wait for '{command}': {source}")]
    Wait {
        /// Command line being awaited.
        command: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Capture files could not be created or read.
    #[error("failed to capture output of '{command}': {source}")]
    Capture {
        /// Command line whose output was lost.
        command: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

impl CommandError {
    /// Whether the failure says nothing about the deployment itself.
    ///
    /// A missing tool or a call that overran its deadline leaves the runtime
    /// state unknown, so callers must not escalate on it.
    #[must_use]
    pub const fn is_soft(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::Timeout { .. })
    }
}

/// Executes command specs.
pub trait CommandRunner {
    /// Runs `spec` to completion or until its deadline.
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError>;
}

impl<T: CommandRunner + ?Sized> CommandRunner for &T {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError> {
        (**self).run(spec)
    }
}

/// Runs commands as real child processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    interrupt: InterruptFlag,
}

impl ProcessRunner {
    /// Builds a runner that honours `interrupt`.
    #[must_use]
    pub const fn new(interrupt: InterruptFlag) -> Self {
        Self { interrupt }
    }
}

impl CommandRunner for ProcessRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError> {
        let line = spec.display_line();
        if self.interrupt.is_raised() {
            return Err(CommandError::Interrupted { command: line });
        }
        let capture_error = |source| CommandError::Capture {
            command: line.clone(),
            source,
        };
        let stdout_file = tempfile::tempfile().map_err(capture_error)?;
        let stderr_file = tempfile::tempfile().map_err(capture_error)?;

        let mut command = Command::new(spec.program());
        command
            .args(spec.arguments())
            .envs(spec.environment().iter().map(|(key, value)| (key, value)))
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout_file.try_clone().map_err(capture_error)?))
            .stderr(Stdio::from(stderr_file.try_clone().map_err(capture_error)?));
        if let Some(dir) = spec.working_dir() {
            command.current_dir(dir);
        }

        debug!(
            target: COMMAND_TARGET,
            command = %line,
            timeout_ms = duration_ms(spec.time_limit()),
            "spawning command"
        );
        let program = spec.program().to_string_lossy().into_owned();
        let mut child = command.spawn().map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                CommandError::NotFound { program, source }
            } else {
                CommandError::Spawn { program, source }
            }
        })?;

        let status = wait_with_deadline(&mut child, &line, spec.time_limit(), &self.interrupt)?;
        let output = CommandOutput {
            code: status.code(),
            stdout: read_capture(stdout_file).map_err(capture_error)?,
            stderr: read_capture(stderr_file).map_err(capture_error)?,
        };
        debug!(
            target: COMMAND_TARGET,
            command = %line,
            code = ?output.code,
            "command finished"
        );
        Ok(output)
    }
}

fn wait_with_deadline(
    child: &mut Child,
    line: &str,
    timeout: Duration,
    interrupt: &InterruptFlag,
) -> Result<ExitStatus, CommandError> {
    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) => {
                if interrupt.is_raised() {
                    warn!(
                        target: COMMAND_TARGET,
                        command = %line,
                        "interrupt received, terminating child"
                    );
                    terminate(child, line);
                    return Err(CommandError::Interrupted {
                        command: line.to_owned(),
                    });
                }
                if Instant::now() >= deadline {
                    warn!(
                        target: COMMAND_TARGET,
                        command = %line,
                        timeout_ms = duration_ms(timeout),
                        "command timed out, terminating child"
                    );
                    terminate(child, line);
                    return Err(CommandError::Timeout {
                        command: line.to_owned(),
                        timeout_ms: duration_ms(timeout),
                    });
                }
                thread::sleep(POLL_INTERVAL);
            }
            Err(source) => {
                terminate(child, line);
                return Err(CommandError::Wait {
                    command: line.to_owned(),
                    source,
                });
            }
        }
    }
}

fn terminate(child: &mut Child, line: &str) {
    if let Err(error) = child.kill() {
        // InvalidInput means the child already exited.
        if error.kind() != io::ErrorKind::InvalidInput {
            warn!(target: COMMAND_TARGET, command = %line, %error, "failed to kill child");
        }
    }
    if let Err(error) = child.wait() {
        warn!(target: COMMAND_TARGET, command = %line, %error, "failed to reap child");
    }
}

fn read_capture(mut file: File) -> io::Result<String> {
    file.seek(SeekFrom::Start(0))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn shell(script: &str) -> CommandSpec {
        CommandSpec::new("sh").arg("-c").arg(script)
    }

    #[test]
    fn captures_stdout_and_exit_code() {
        let runner = ProcessRunner::default();
        let output = runner
            .run(&shell("printf 'a\\tb\\n'; echo oops >&2; exit 3"))
            .expect("run");
        assert_eq!(output.code, Some(3));
        assert_eq!(output.stdout, "a\tb\n");
        assert_eq!(output.failure_reason(), "exit status 3: oops");
        assert!(!output.succeeded());
    }

    #[test]
    fn forwards_environment_and_working_directory() {
        let dir = tempfile::tempdir().expect("temp dir");
        let runner = ProcessRunner::default();
        let spec = shell("printf '%s:%s' \"$STEVEDORE_TEST_VALUE\" \"$(basename \"$PWD\")\"")
            .envs([("STEVEDORE_TEST_VALUE", "forwarded")])
            .current_dir(dir.path());
        let output = runner.run(&spec).expect("run");
        let expected_dir = dir
            .path()
            .file_name()
            .and_then(|name| name.to_str())
            .expect("dir name");
        assert_eq!(output.stdout, format!("forwarded:{expected_dir}"));
    }

    #[test]
    fn kills_children_that_overrun_their_deadline() {
        let runner = ProcessRunner::default();
        let started = Instant::now();
        let error = runner
            .run(&shell("sleep 5").timeout(Duration::from_millis(200)))
            .expect_err("should time out");
        assert!(matches!(error, CommandError::Timeout { timeout_ms: 200, .. }));
        assert!(error.is_soft());
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn interrupt_terminates_running_child() {
        let interrupt = InterruptFlag::default();
        let runner = ProcessRunner::new(interrupt.clone());
        let raiser = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            interrupt.raise();
        });
        let started = Instant::now();
        let error = runner
            .run(&shell("sleep 5").timeout(Duration::from_secs(30)))
            .expect_err("should be interrupted");
        raiser.join().expect("join raiser");
        assert!(matches!(error, CommandError::Interrupted { .. }));
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn missing_program_is_reported_as_unavailable() {
        let runner = ProcessRunner::default();
        let error = runner
            .run(&CommandSpec::new("stevedore-definitely-not-installed"))
            .expect_err("spawn should fail");
        assert!(matches!(error, CommandError::NotFound { .. }), "unexpected error: {error}");
        assert!(error.is_soft());
    }

    #[test]
    fn failure_reason_without_stderr_reports_status_only() {
        assert_eq!(CommandOutput::failure(1, "\n  \n").failure_reason(), "exit status 1");
    }
}
