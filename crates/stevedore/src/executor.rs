//! Lifecycle primitives driven through the compose orchestrator.
//!
//! [`ComposeOrchestrator`] turns a [`ComposeVerb`] into one bounded external
//! command run inside the project directory. [`ActionExecutor`] layers the
//! four lifecycle operations and the composite recreate on top of any
//! [`RuntimeAdapter`].

use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use tracing::{info, warn};

use crate::reconciler::Action;
use crate::runtime::{CommandError, CommandRunner, CommandSpec, RuntimeAdapter};

const EXECUTOR_TARGET: &str = "stevedore::executor";

/// Orchestrator verbs the executor may issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComposeVerb {
    /// `up -d`: create missing containers and start everything.
    Up,
    /// `start`: start existing containers.
    Start,
    /// `stop`: stop running containers.
    Stop,
    /// `down`: stop and remove containers.
    Down,
}

impl ComposeVerb {
    /// Arguments appended to the compose front end.
    #[must_use]
    pub const fn arguments(self) -> &'static [&'static str] {
        match self {
            Self::Up => &["up", "-d"],
            Self::Start => &["start"],
            Self::Stop => &["stop"],
            Self::Down => &["down"],
        }
    }
}

impl fmt::Display for ComposeVerb {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.arguments().join(" ").as_str())
    }
}

/// Outcome of one lifecycle operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionResult {
    /// The operation completed.
    Succeeded,
    /// The operation failed; the reconciler may escalate.
    Failed(String),
    /// The orchestrator is missing or did not answer in time. The deployment
    /// state is unknown, so nothing may escalate from here.
    Unavailable(String),
    /// The operator interrupted the operation; nothing further may run.
    Interrupted,
}

impl fmt::Display for ActionResult {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => formatter.write_str("succeeded"),
            Self::Failed(reason) => write!(formatter, "failed: {reason}"),
            Self::Unavailable(reason) => write!(formatter, "unavailable: {reason}"),
            Self::Interrupted => formatter.write_str("interrupted"),
        }
    }
}

/// Runs compose verbs in the project directory.
#[derive(Debug, Clone)]
pub struct ComposeOrchestrator<C> {
    runner: C,
    command: Vec<String>,
    project_dir: PathBuf,
    environment: Vec<(OsString, OsString)>,
    timeout: Duration,
}

impl<C: CommandRunner> ComposeOrchestrator<C> {
    /// Builds an orchestrator for `command` (program plus leading arguments).
    pub fn new(
        runner: C,
        command: Vec<String>,
        project_dir: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Self {
        Self {
            runner,
            command,
            project_dir: project_dir.into(),
            environment: Vec::new(),
            timeout,
        }
    }

    /// Forwards extra variables to every orchestrator call.
    #[must_use]
    pub fn with_environment<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<OsString>,
        V: Into<OsString>,
    {
        self.environment
            .extend(vars.into_iter().map(|(key, value)| (key.into(), value.into())));
        self
    }

    /// Builds the command spec for `verb`.
    #[must_use]
    pub fn spec_for(&self, verb: ComposeVerb) -> Option<CommandSpec> {
        let (program, leading) = self.command.split_first()?;
        Some(
            CommandSpec::new(program)
                .args(leading)
                .args(verb.arguments().iter().copied())
                .current_dir(&self.project_dir)
                .envs(self.environment.iter().cloned())
                .timeout(self.timeout),
        )
    }

    /// Runs `verb` and folds the outcome into an [`ActionResult`].
    pub fn invoke(&self, verb: ComposeVerb) -> ActionResult {
        let Some(spec) = self.spec_for(verb) else {
            return ActionResult::Failed(String::from("compose command is empty"));
        };
        match self.runner.run(&spec) {
            Ok(output) if output.succeeded() => ActionResult::Succeeded,
            Ok(output) => ActionResult::Failed(output.failure_reason()),
            Err(CommandError::Interrupted { .. }) => ActionResult::Interrupted,
            Err(error) if error.is_soft() => ActionResult::Unavailable(error.to_string()),
            Err(error) => ActionResult::Failed(error.to_string()),
        }
    }
}

/// Lifecycle operations over a [`RuntimeAdapter`].
///
/// Every operation is safe to repeat: each maps onto one orchestrator verb
/// that converges rather than accumulates.
pub struct ActionExecutor<'a, R: ?Sized> {
    runtime: &'a R,
}

impl<'a, R: RuntimeAdapter + ?Sized> ActionExecutor<'a, R> {
    /// Wraps `runtime`.
    pub const fn new(runtime: &'a R) -> Self {
        Self { runtime }
    }

    /// `up -d`.
    pub fn create_and_start(&self) -> ActionResult {
        self.step(ComposeVerb::Up)
    }

    /// `start`; fails when nothing exists to start.
    pub fn start_existing(&self) -> ActionResult {
        self.step(ComposeVerb::Start)
    }

    /// `stop`.
    pub fn stop(&self) -> ActionResult {
        self.step(ComposeVerb::Stop)
    }

    /// `down`.
    pub fn remove(&self) -> ActionResult {
        self.step(ComposeVerb::Down)
    }

    /// Stop, remove, then create and start.
    ///
    /// Stop and remove failures are logged and ignored; the result is that of
    /// the final create step. An interrupt or an unavailable orchestrator at
    /// any step ends the sequence.
    pub fn recreate(&self) -> ActionResult {
        for verb in [ComposeVerb::Stop, ComposeVerb::Down] {
            match self.step(verb) {
                result @ (ActionResult::Interrupted | ActionResult::Unavailable(_)) => {
                    return result;
                }
                ActionResult::Failed(reason) => warn!(
                    target: EXECUTOR_TARGET,
                    event = "recreate_step_ignored",
                    verb = %verb,
                    reason = %reason,
                    "best-effort step failed, continuing"
                ),
                ActionResult::Succeeded => {}
            }
        }
        self.create_and_start()
    }

    /// Runs the operation behind `action`.
    pub fn execute(&self, action: Action) -> ActionResult {
        match action {
            Action::CreateAndStart => self.create_and_start(),
            Action::StartExisting => self.start_existing(),
            Action::Recreate => self.recreate(),
            Action::NoOp => ActionResult::Succeeded,
        }
    }

    fn step(&self, verb: ComposeVerb) -> ActionResult {
        info!(
            target: EXECUTOR_TARGET,
            event = "compose_invoked",
            verb = %verb,
            "running compose"
        );
        let result = self.runtime.invoke(verb);
        info!(
            target: EXECUTOR_TARGET,
            event = "compose_finished",
            verb = %verb,
            result = %result,
            "compose finished"
        );
        result
    }
}
