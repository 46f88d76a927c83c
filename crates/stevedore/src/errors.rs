//! Error types for the binary surface.

use std::io;
use std::sync::Arc;

use thiserror::Error;

use crate::telemetry::TelemetryError;

/// Failures that stop a run before or after reconciliation.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration layers could not be merged.
    #[error("failed to load configuration: {0}")]
    LoadConfiguration(Arc<ortho_config::OrthoError>),
    /// Logging could not be set up.
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    /// Signal handlers could not be registered.
    #[error("failed to install signal handlers: {0}")]
    InstallSignals(io::Error),
    /// The summary could not be written.
    #[error("failed to write status summary: {0}")]
    Output(io::Error),
}
