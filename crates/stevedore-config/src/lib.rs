//! Shared configuration for the `stevedore` reconciler.
//!
//! Configuration is layered by `ortho_config`: built-in defaults, then a TOML
//! file (`--config-path` or `STEVEDORE_CONFIG_PATH`), then `STEVEDORE_*`
//! environment variables, then command-line flags. Every value the reconciler
//! needs to find and drive the compose project is carried here explicitly so
//! nothing depends on the process working directory.

use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use ortho_config::{OrthoConfig, OrthoError};
use serde::{Deserialize, Serialize};

mod defaults;
mod endpoint;
mod env_file;
mod logging;

pub use defaults::{
    DEFAULT_ACTION_TIMEOUT_SECS, DEFAULT_COMPOSE_COMMAND, DEFAULT_CONTAINER_PREFIX,
    DEFAULT_DOCKER_BINARY, DEFAULT_ENDPOINT, DEFAULT_ENV_FILE, DEFAULT_GRACE_PERIOD_MS,
    DEFAULT_LOG_FILTER, DEFAULT_PROBE_TIMEOUT_SECS, DEFAULT_READINESS_TIMEOUT_SECS,
    default_compose_command, default_container_prefix, default_docker_binary, default_endpoint,
    default_env_file, default_log_filter, default_log_filter_string, default_log_format,
    default_project_dir,
};
pub use endpoint::{EndpointParseError, EndpointScheme, ServiceEndpoint};
pub use env_file::{API_KEY_VARIABLES, ApiKeyStatus, EnvFile, EnvFileError, MIN_API_KEY_LENGTH};
pub use logging::{LogFormat, LogFormatParseError};

/// Resolved reconciler configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "STEVEDORE")]
pub struct Config {
    /// Directory containing the compose project; orchestrator commands run here.
    #[serde(default = "defaults::default_project_dir")]
    pub project_dir: Utf8PathBuf,
    /// Compose front end, split on whitespace (`docker compose`, `docker-compose`).
    #[serde(default = "defaults::default_compose_command")]
    pub compose_command: String,
    /// Container runtime binary used for inspection.
    #[serde(default = "defaults::default_docker_binary")]
    pub docker_binary: String,
    /// Name prefix identifying the managed containers.
    #[serde(default = "defaults::default_container_prefix")]
    pub container_prefix: String,
    /// Public endpoint of the managed server.
    #[serde(default = "defaults::default_endpoint")]
    pub endpoint: ServiceEndpoint,
    /// Env file forwarded to the orchestrator, relative to `project_dir`.
    #[serde(default = "defaults::default_env_file")]
    pub env_file: Utf8PathBuf,
    /// Timeout for runtime inspection commands, in seconds.
    #[serde(default = "defaults::default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
    /// Timeout for each orchestrator action, in seconds.
    #[serde(default = "defaults::default_action_timeout_secs")]
    pub action_timeout_secs: u64,
    /// Overall budget for readiness verification, in seconds.
    #[serde(default = "defaults::default_readiness_timeout_secs")]
    pub readiness_timeout_secs: u64,
    /// Settling time before the readiness probe, in milliseconds.
    #[serde(default = "defaults::default_grace_period_ms")]
    pub grace_period_ms: u64,
    /// `tracing` filter expression.
    #[serde(default = "defaults::default_log_filter_string")]
    pub log_filter: String,
    /// Log output format.
    #[serde(default = "defaults::default_log_format")]
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project_dir: default_project_dir(),
            compose_command: default_compose_command(),
            docker_binary: default_docker_binary(),
            container_prefix: default_container_prefix(),
            endpoint: default_endpoint(),
            env_file: default_env_file(),
            probe_timeout_secs: DEFAULT_PROBE_TIMEOUT_SECS,
            action_timeout_secs: DEFAULT_ACTION_TIMEOUT_SECS,
            readiness_timeout_secs: DEFAULT_READINESS_TIMEOUT_SECS,
            grace_period_ms: DEFAULT_GRACE_PERIOD_MS,
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
        }
    }
}

impl Config {
    /// Loads configuration from an explicit argument list.
    ///
    /// The first item is treated as the binary name, as with `argv`.
    pub fn load_from_iter<I>(args: I) -> Result<Self, Arc<OrthoError>>
    where
        I: IntoIterator<Item = OsString>,
    {
        <Self as OrthoConfig>::load_from_iter(args)
    }

    /// Compose project directory.
    #[must_use]
    pub fn project_dir(&self) -> &Utf8Path {
        self.project_dir.as_path()
    }

    /// Compose front end split into program and leading arguments.
    #[must_use]
    pub fn compose_command(&self) -> Vec<String> {
        self.compose_command
            .split_whitespace()
            .map(str::to_owned)
            .collect()
    }

    /// Container runtime binary.
    #[must_use]
    pub fn docker_binary(&self) -> &str {
        self.docker_binary.as_str()
    }

    /// Managed container name prefix.
    #[must_use]
    pub fn container_prefix(&self) -> &str {
        self.container_prefix.as_str()
    }

    /// Public endpoint of the managed server.
    #[must_use]
    pub const fn endpoint(&self) -> &ServiceEndpoint {
        &self.endpoint
    }

    /// Env file path resolved against the project directory.
    #[must_use]
    pub fn env_file_path(&self) -> PathBuf {
        self.project_dir
            .join(&self.env_file)
            .into_std_path_buf()
    }

    /// Timeout for runtime inspection commands.
    #[must_use]
    pub const fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    /// Timeout for each orchestrator action.
    #[must_use]
    pub const fn action_timeout(&self) -> Duration {
        Duration::from_secs(self.action_timeout_secs)
    }

    /// Overall readiness budget.
    #[must_use]
    pub const fn readiness_timeout(&self) -> Duration {
        Duration::from_secs(self.readiness_timeout_secs)
    }

    /// Settling time before the readiness probe.
    #[must_use]
    pub const fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    /// `tracing` filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_str()
    }

    /// Log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }
}
