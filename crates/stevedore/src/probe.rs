//! Runtime observation: container snapshots and port reachability.
//!
//! The probe never raises. When the runtime cannot be queried the snapshot is
//! [`Snapshot::Indeterminate`] with the reason attached, which callers must not
//! mistake for an empty deployment.

use std::fmt;
use std::io;
use std::net::{IpAddr, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::runtime::{CommandError, CommandRunner, CommandSpec};

const PROBE_TARGET: &str = "stevedore::probe";
const LISTING_FORMAT: &str = "{{.Names}}\t{{.Status}}\t{{.Ports}}";
const RUNNING_MARKER: &str = "up";

/// Lifecycle status of one managed container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerStatus {
    /// Not known to the runtime.
    Absent,
    /// Created but not running.
    Stopped,
    /// Running.
    Running,
    /// The runtime reported no status text.
    Unknown,
}

impl ContainerStatus {
    /// Classifies raw runtime status text such as `Up 5 minutes` or
    /// `Exited (0) 2 hours ago`.
    #[must_use]
    pub fn classify(status_text: &str) -> Self {
        let trimmed = status_text.trim();
        if trimmed.is_empty() {
            return Self::Unknown;
        }
        if trimmed
            .split_whitespace()
            .any(|token| token.eq_ignore_ascii_case(RUNNING_MARKER))
        {
            Self::Running
        } else {
            Self::Stopped
        }
    }

    /// Lower-case label used in summaries.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Absent => "absent",
            Self::Stopped => "stopped",
            Self::Running => "running",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.label())
    }
}

/// One container observed by the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedContainer {
    /// Container name.
    pub name: String,
    /// Classified status.
    pub status: ContainerStatus,
    /// Raw status text as reported by the runtime.
    pub status_text: String,
    /// Published port bindings, possibly empty.
    pub ports: Vec<String>,
}

impl ManagedContainer {
    /// Builds a container from its name and raw status text.
    pub fn new(name: impl Into<String>, status_text: impl Into<String>) -> Self {
        let status_text = status_text.into();
        Self {
            name: name.into(),
            status: ContainerStatus::classify(&status_text),
            status_text,
            ports: Vec::new(),
        }
    }

    /// Attaches port bindings.
    #[must_use]
    pub fn with_ports<I, S>(mut self, ports: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ports = ports.into_iter().map(Into::into).collect();
        self
    }

    /// Whether the container is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.status == ContainerStatus::Running
    }
}

/// Why the runtime could not be observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeFailure {
    /// The runtime binary is missing.
    ToolUnavailable(String),
    /// The runtime did not answer in time.
    TimedOut(String),
    /// The runtime answered with an error.
    RuntimeError(String),
    /// The operator interrupted the probe.
    Interrupted,
}

impl fmt::Display for ProbeFailure {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ToolUnavailable(detail) => write!(formatter, "runtime unavailable: {detail}"),
            Self::TimedOut(detail) => write!(formatter, "runtime timed out: {detail}"),
            Self::RuntimeError(detail) => write!(formatter, "runtime error: {detail}"),
            Self::Interrupted => formatter.write_str("interrupted"),
        }
    }
}

impl From<&CommandError> for ProbeFailure {
    fn from(error: &CommandError) -> Self {
        match error {
            CommandError::NotFound { .. } => Self::ToolUnavailable(error.to_string()),
            CommandError::Timeout { .. } => Self::TimedOut(error.to_string()),
            CommandError::Interrupted { .. } => Self::Interrupted,
            CommandError::Spawn { .. } | CommandError::Wait { .. } | CommandError::Capture { .. } => {
                Self::RuntimeError(error.to_string())
            }
        }
    }
}

/// Point-in-time observation of the managed containers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Snapshot {
    /// The runtime answered; the list may be empty.
    Observed(Vec<ManagedContainer>),
    /// The runtime could not be observed.
    Indeterminate(ProbeFailure),
}

impl Snapshot {
    /// Observed containers; empty when indeterminate.
    #[must_use]
    pub fn containers(&self) -> &[ManagedContainer] {
        match self {
            Self::Observed(containers) => containers.as_slice(),
            Self::Indeterminate(_) => &[],
        }
    }

    /// Failure reason when the runtime could not be observed.
    #[must_use]
    pub const fn failure(&self) -> Option<&ProbeFailure> {
        match self {
            Self::Observed(_) => None,
            Self::Indeterminate(failure) => Some(failure),
        }
    }

    /// Looks up a container by exact name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&ManagedContainer> {
        self.containers().iter().find(|container| container.name == name)
    }
}

/// Parses `name<TAB>status<TAB>ports` listing output.
///
/// Lines without at least a name and a status column are skipped, as are
/// names that do not contain `prefix`.
#[must_use]
pub fn parse_listing(output: &str, prefix: &str) -> Vec<ManagedContainer> {
    output
        .lines()
        .filter_map(|line| {
            let mut columns = line.splitn(3, '\t');
            let name = columns.next()?.trim();
            let status_text = columns.next()?.trim();
            if name.is_empty() || !name.contains(prefix) {
                return None;
            }
            let ports = columns
                .next()
                .map(|ports| {
                    ports
                        .split(", ")
                        .map(str::trim)
                        .filter(|binding| !binding.is_empty())
                        .map(str::to_owned)
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default();
            Some(ManagedContainer::new(name, status_text).with_ports(ports))
        })
        .collect()
}

/// Queries the container runtime binary for managed containers.
#[derive(Debug, Clone)]
pub struct ContainerProbe<C> {
    runner: C,
    binary: String,
    prefix: String,
    timeout: Duration,
}

impl<C: CommandRunner> ContainerProbe<C> {
    /// Builds a probe for containers whose names contain `prefix`.
    pub fn new(
        runner: C,
        binary: impl Into<String>,
        prefix: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            runner,
            binary: binary.into(),
            prefix: prefix.into(),
            timeout,
        }
    }

    /// Checks that the runtime daemon answers, then lists managed containers.
    pub fn snapshot(&self) -> Snapshot {
        if let Err(failure) = self.preflight() {
            warn!(
                target: PROBE_TARGET,
                event = "runtime_unreachable",
                reason = %failure,
                "container runtime could not be queried"
            );
            return Snapshot::Indeterminate(failure);
        }
        match self.list() {
            Ok(containers) => {
                debug!(
                    target: PROBE_TARGET,
                    event = "snapshot_taken",
                    containers = containers.len(),
                    "observed managed containers"
                );
                Snapshot::Observed(containers)
            }
            Err(failure) => {
                warn!(
                    target: PROBE_TARGET,
                    event = "listing_failed",
                    reason = %failure,
                    "container listing failed"
                );
                Snapshot::Indeterminate(failure)
            }
        }
    }

    fn preflight(&self) -> Result<(), ProbeFailure> {
        let spec = CommandSpec::new(&self.binary)
            .args(["version", "--format", "{{.Server.Version}}"])
            .timeout(self.timeout);
        self.run_checked(&spec).map(|_| ())
    }

    fn list(&self) -> Result<Vec<ManagedContainer>, ProbeFailure> {
        let spec = CommandSpec::new(&self.binary)
            .args(["ps", "-a", "--filter"])
            .arg(format!("name={}", self.prefix))
            .args(["--format", LISTING_FORMAT])
            .timeout(self.timeout);
        let stdout = self.run_checked(&spec)?;
        Ok(parse_listing(&stdout, &self.prefix))
    }

    fn run_checked(&self, spec: &CommandSpec) -> Result<String, ProbeFailure> {
        let output = self
            .runner
            .run(spec)
            .map_err(|error| ProbeFailure::from(&error))?;
        if output.succeeded() {
            Ok(output.stdout)
        } else {
            Err(ProbeFailure::RuntimeError(format!(
                "'{}' failed with {}",
                spec.display_line(),
                output.failure_reason()
            )))
        }
    }
}

/// Resolves `host:port` within `timeout`.
///
/// IP literals resolve without a lookup. Names go to the system resolver on a
/// helper thread, which is abandoned if it outlives `timeout`.
pub(crate) fn resolve(host: &str, port: u16, timeout: Duration) -> io::Result<Vec<SocketAddr>> {
    if let Ok(address) = host.parse::<IpAddr>() {
        return Ok(vec![SocketAddr::new(address, port)]);
    }
    let (sender, receiver) = mpsc::channel::<io::Result<Vec<SocketAddr>>>();
    let name = host.to_owned();
    thread::spawn(move || {
        let resolved = (name.as_str(), port)
            .to_socket_addrs()
            .map(Iterator::collect);
        // The receiver is gone when the lookup overran its budget.
        let _ = sender.send(resolved);
    });
    match receiver.recv_timeout(timeout) {
        Ok(resolved) => resolved,
        Err(mpsc::RecvTimeoutError::Timeout) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            "name resolution timed out",
        )),
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(io::Error::other(
            "name resolution thread exited without an answer",
        )),
    }
}

/// Reports whether a TCP listener accepts connections on `host:port`.
///
/// Refusals and unresolvable hosts count as inactive; so does any other
/// connection error, after a warning. Resolution and connecting share
/// `timeout`.
#[must_use]
pub fn port_is_active(host: &str, port: u16, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    let addresses = match resolve(host, port, timeout) {
        Ok(addresses) => addresses,
        Err(error) => {
            warn!(target: PROBE_TARGET, host, port, %error, "failed to resolve host");
            return false;
        }
    };
    addresses.iter().any(|address| {
        let left = deadline.saturating_duration_since(Instant::now());
        if left.is_zero() {
            return false;
        }
        match TcpStream::connect_timeout(address, left) {
            Ok(_) => true,
            Err(error) if is_nothing_listening(&error) => false,
            Err(error) => {
                warn!(target: PROBE_TARGET, %address, %error, "port check failed");
                false
            }
        }
    })
}

/// Connection errors meaning no process is listening.
///
/// `ConnectionReset` is excluded: the peer accepted and then closed.
pub(crate) fn is_nothing_listening(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::NotFound
            | io::ErrorKind::AddrNotAvailable
    )
}
