//! Human-readable status summary printed at the end of every run.

use std::fmt;
use std::path::{Path, PathBuf};

use stevedore_config::{ApiKeyStatus, EnvFile};

use crate::probe::Snapshot;
use crate::readiness::ReadinessReport;
use crate::reconciler::{ObservedState, ReconcileOutcome, Verdict};

/// Result of reading and checking the env file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvCheck {
    /// No env file at `path`.
    FileNotFound {
        /// Expected location.
        path: PathBuf,
    },
    /// The file exists but could not be read.
    Unreadable {
        /// File location.
        path: PathBuf,
        /// Read error.
        reason: String,
    },
    /// The file was read; `status` classifies the credential.
    Loaded {
        /// File location.
        path: PathBuf,
        /// Credential heuristic result.
        status: ApiKeyStatus,
    },
}

impl EnvCheck {
    /// Loads the env file at `path` and classifies it.
    ///
    /// The parsed file is returned alongside so its values can be forwarded.
    #[must_use]
    pub fn inspect(path: &Path) -> (Self, Option<EnvFile>) {
        match EnvFile::load(path) {
            Ok(Some(file)) => {
                let status = file.api_key_status();
                (
                    Self::Loaded {
                        path: path.to_path_buf(),
                        status,
                    },
                    Some(file),
                )
            }
            Ok(None) => (
                Self::FileNotFound {
                    path: path.to_path_buf(),
                },
                None,
            ),
            Err(error) => (
                Self::Unreadable {
                    path: path.to_path_buf(),
                    reason: error.to_string(),
                },
                None,
            ),
        }
    }
}

impl fmt::Display for EnvCheck {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FileNotFound { path } => write!(formatter, "{}: file not found", path.display()),
            Self::Unreadable { path, reason } => {
                write!(formatter, "{}: unreadable ({reason})", path.display())
            }
            Self::Loaded { path, status } => {
                let path = path.display();
                match status {
                    ApiKeyStatus::Configured { key } => write!(formatter, "{path}: {key} configured"),
                    ApiKeyStatus::Placeholder { key } => {
                        write!(formatter, "{path}: {key} still holds the template placeholder")
                    }
                    ApiKeyStatus::TooShort { key } => write!(formatter, "{path}: {key} too short"),
                    ApiKeyStatus::Missing => write!(formatter, "{path}: API key missing"),
                }
            }
        }
    }
}

/// Which command produced the summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Full observe-decide-act-verify pass.
    Reconcile,
    /// Observe and verify only.
    Status,
}

/// End-of-run summary.
#[derive(Debug, Clone, Copy)]
pub struct StatusSummary<'a> {
    /// Which command ran.
    pub mode: RunMode,
    /// Compose project directory.
    pub project_dir: &'a str,
    /// Compose front end, for operator hints.
    pub compose_command: &'a str,
    /// Reconciliation pass, when one ran.
    pub outcome: Option<&'a ReconcileOutcome>,
    /// Snapshot taken just before reporting.
    pub snapshot: &'a Snapshot,
    /// Readiness verification result.
    pub readiness: &'a ReadinessReport,
    /// Env file check.
    pub env: &'a EnvCheck,
}

impl fmt::Display for StatusSummary<'_> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let title = match self.mode {
            RunMode::Reconcile => "reconcile",
            RunMode::Status => "status",
        };
        writeln!(formatter, "stevedore {title} summary")?;
        writeln!(formatter, "  project:    {}", self.project_dir)?;
        if let Some(outcome) = self.outcome {
            write_outcome(formatter, outcome)?;
        } else {
            writeln!(
                formatter,
                "  observed:   {}",
                ObservedState::classify(self.snapshot)
            )?;
        }
        write_containers(formatter, self.snapshot)?;
        writeln!(formatter, "  endpoint:   {}", self.readiness)?;
        writeln!(formatter, "  env file:   {}", self.env)?;
        writeln!(formatter, "next steps:")?;
        writeln!(formatter, "  connect:    {}", self.readiness.endpoint)?;
        writeln!(formatter, "  status:     {} ps", self.compose_command)?;
        writeln!(formatter, "  logs:       {} logs -f", self.compose_command)?;
        writeln!(formatter, "  stop:       {} down", self.compose_command)
    }
}

fn write_outcome(formatter: &mut fmt::Formatter<'_>, outcome: &ReconcileOutcome) -> fmt::Result {
    writeln!(
        formatter,
        "  observed:   {} ({})",
        outcome.plan.state(),
        outcome.plan.rationale()
    )?;
    let chain: Vec<String> = outcome
        .plan
        .actions()
        .iter()
        .map(ToString::to_string)
        .collect();
    writeln!(formatter, "  plan:       {}", chain.join(" -> "))?;
    for attempt in &outcome.attempts {
        writeln!(formatter, "    {}: {}", attempt.action, attempt.result)?;
    }
    match &outcome.verdict {
        Verdict::Applied { action } => writeln!(formatter, "  outcome:    applied {action}"),
        Verdict::AlreadySatisfied { port_active: true } => {
            writeln!(formatter, "  outcome:    already running, port active")
        }
        Verdict::AlreadySatisfied { port_active: false } => writeln!(
            formatter,
            "  outcome:    already running, port not active yet"
        ),
        Verdict::Deferred { reason } if outcome.attempts.is_empty() => {
            writeln!(formatter, "  outcome:    no action taken, {reason}")
        }
        Verdict::Deferred { reason } => {
            writeln!(formatter, "  outcome:    deferred without escalating, {reason}")
        }
        Verdict::Failed(error) => writeln!(formatter, "  outcome:    FAILED, {error}"),
        Verdict::Interrupted { action } => {
            writeln!(formatter, "  outcome:    interrupted during {action}")
        }
    }
}

fn write_containers(formatter: &mut fmt::Formatter<'_>, snapshot: &Snapshot) -> fmt::Result {
    if let Some(failure) = snapshot.failure() {
        return writeln!(formatter, "  containers: unknown ({failure})");
    }
    let containers = snapshot.containers();
    if containers.is_empty() {
        return writeln!(formatter, "  containers: none");
    }
    writeln!(formatter, "  containers:")?;
    let width = containers
        .iter()
        .map(|container| container.name.len())
        .max()
        .unwrap_or_default();
    for container in containers {
        write!(
            formatter,
            "    {name:<width$}  {status:<8}  {text}",
            name = container.name,
            status = container.status.label(),
            text = container.status_text,
        )?;
        if !container.ports.is_empty() {
            write!(formatter, "  {}", container.ports.join(", "))?;
        }
        writeln!(formatter)?;
    }
    Ok(())
}
