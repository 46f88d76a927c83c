use camino::Utf8PathBuf;

use crate::endpoint::ServiceEndpoint;
use crate::logging::LogFormat;

/// Default log filter expression used by the binary.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Name prefix shared by every container of the managed compose project.
pub const DEFAULT_CONTAINER_PREFIX: &str = "mcp-mem0";

/// Endpoint the managed server exposes once it is ready.
pub const DEFAULT_ENDPOINT: &str = "http://localhost:8050/sse";

/// Compose front end invoked for declarative lifecycle operations.
pub const DEFAULT_COMPOSE_COMMAND: &str = "docker compose";

/// Container runtime binary used for inspection.
pub const DEFAULT_DOCKER_BINARY: &str = "docker";

/// Env file name, resolved relative to the project directory.
pub const DEFAULT_ENV_FILE: &str = ".env";

/// Upper bound for a single inspection call (`ps`, `version`).
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 10;

/// Upper bound for a single orchestrator call (`up`, `start`, `down`, ...).
pub const DEFAULT_ACTION_TIMEOUT_SECS: u64 = 300;

/// Upper bound for the readiness verification.
pub const DEFAULT_READINESS_TIMEOUT_SECS: u64 = 10;

/// Settling time granted to a just-started service before probing it.
pub const DEFAULT_GRACE_PERIOD_MS: u64 = 3_000;

/// Default log filter expression used by the binary.
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the binary.
pub fn default_log_format() -> LogFormat {
    LogFormat::Compact
}

/// Project directory holding the compose file; the current directory.
pub fn default_project_dir() -> Utf8PathBuf {
    Utf8PathBuf::from(".")
}

/// Owned container prefix for serde defaults.
pub fn default_container_prefix() -> String {
    DEFAULT_CONTAINER_PREFIX.to_owned()
}

/// Owned compose command for serde defaults.
pub fn default_compose_command() -> String {
    DEFAULT_COMPOSE_COMMAND.to_owned()
}

/// Owned runtime binary for serde defaults.
pub fn default_docker_binary() -> String {
    DEFAULT_DOCKER_BINARY.to_owned()
}

/// Env file location relative to the project directory.
pub fn default_env_file() -> Utf8PathBuf {
    Utf8PathBuf::from(DEFAULT_ENV_FILE)
}

/// Parsed default endpoint.
pub fn default_endpoint() -> ServiceEndpoint {
    ServiceEndpoint::http("localhost", 8050, "/sse")
}

pub(crate) const fn default_probe_timeout_secs() -> u64 {
    DEFAULT_PROBE_TIMEOUT_SECS
}

pub(crate) const fn default_action_timeout_secs() -> u64 {
    DEFAULT_ACTION_TIMEOUT_SECS
}

pub(crate) const fn default_readiness_timeout_secs() -> u64 {
    DEFAULT_READINESS_TIMEOUT_SECS
}

pub(crate) const fn default_grace_period_ms() -> u64 {
    DEFAULT_GRACE_PERIOD_MS
}
