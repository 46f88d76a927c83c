//! Post-reconciliation readiness verification.
//!
//! Readiness is advisory: an unreachable endpoint is reported, never undone.
//! [`ReadinessVerifier::verify`] spends at most its timeout across the grace
//! period and the single endpoint probe.

use std::fmt;
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::time::{Duration, Instant};

use stevedore_config::{EndpointScheme, ServiceEndpoint};

use crate::probe::{ContainerStatus, Snapshot, is_nothing_listening, resolve};
use crate::runtime::InterruptFlag;

const READINESS_TARGET: &str = "stevedore::readiness";
const RESPONSE_PEEK_BYTES: usize = 256;

/// Result of one endpoint probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeVerdict {
    /// Something answered; the detail says how.
    Reachable(String),
    /// Nothing answered; the detail says why.
    Unreachable(String),
}

impl ProbeVerdict {
    /// Whether the endpoint answered.
    #[must_use]
    pub const fn is_reachable(&self) -> bool {
        matches!(self, Self::Reachable(_))
    }

    fn into_detail(self) -> String {
        match self {
            Self::Reachable(detail) | Self::Unreachable(detail) => detail,
        }
    }
}

/// Checks whether an endpoint accepts connections within a budget.
#[cfg_attr(test, mockall::automock)]
pub trait NetworkProbe {
    /// Probes `endpoint`, returning within `budget`.
    fn probe(&self, endpoint: &ServiceEndpoint, budget: Duration) -> ProbeVerdict;
}

/// [`NetworkProbe`] over plain TCP sockets.
///
/// HTTP endpoints receive a `GET` asking for an event stream. A streaming
/// server holds the connection open without replying, so a read timeout after
/// a successful connect counts as reachable.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpNetworkProbe;

impl NetworkProbe for TcpNetworkProbe {
    fn probe(&self, endpoint: &ServiceEndpoint, budget: Duration) -> ProbeVerdict {
        let deadline = Instant::now() + budget;
        let addresses = match resolve(endpoint.host(), endpoint.port(), budget) {
            Ok(addresses) => addresses,
            Err(error) => {
                return ProbeVerdict::Unreachable(format!(
                    "failed to resolve {}: {error}",
                    endpoint.host()
                ));
            }
        };
        let mut last_error =
            ProbeVerdict::Unreachable(String::from("host resolved to no addresses"));
        for address in addresses {
            let Some(remaining) = remaining(deadline) else {
                return ProbeVerdict::Unreachable(String::from("timed out before connecting"));
            };
            match TcpStream::connect_timeout(&address, remaining) {
                Ok(stream) => return converse(stream, endpoint, deadline),
                Err(error) if is_nothing_listening(&error) => {
                    last_error = ProbeVerdict::Unreachable(format!("{address}: connection refused"));
                }
                Err(error) => {
                    last_error = ProbeVerdict::Unreachable(format!("{address}: {error}"));
                }
            }
        }
        last_error
    }
}

fn remaining(deadline: Instant) -> Option<Duration> {
    let left = deadline.saturating_duration_since(Instant::now());
    (!left.is_zero()).then_some(left)
}

fn converse(mut stream: TcpStream, endpoint: &ServiceEndpoint, deadline: Instant) -> ProbeVerdict {
    if endpoint.scheme() != EndpointScheme::Http {
        return ProbeVerdict::Reachable(String::from("accepted connection"));
    }
    let Some(left) = remaining(deadline) else {
        return ProbeVerdict::Reachable(String::from("accepted connection"));
    };
    if stream.set_read_timeout(Some(left)).is_err() || stream.set_write_timeout(Some(left)).is_err()
    {
        return ProbeVerdict::Reachable(String::from("accepted connection"));
    }
    let request = format!(
        "GET {path} HTTP/1.1\r\nHost: {authority}\r\nAccept: text/event-stream\r\nConnection: close\r\n\r\n",
        path = if endpoint.path().is_empty() { "/" } else { endpoint.path() },
        authority = endpoint.authority(),
    );
    if let Err(error) = stream.write_all(request.as_bytes()) {
        return ProbeVerdict::Reachable(format!("accepted connection, request failed: {error}"));
    }
    let mut buffer = [0_u8; RESPONSE_PEEK_BYTES];
    match stream.read(&mut buffer) {
        Ok(0) => ProbeVerdict::Reachable(String::from("accepted connection, closed without reply")),
        Ok(read) => {
            let text = String::from_utf8_lossy(&buffer[..read]);
            let status_line = text.lines().next().unwrap_or_default().trim();
            ProbeVerdict::Reachable(format!("responded: {status_line}"))
        }
        Err(error)
            if matches!(
                error.kind(),
                io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
            ) =>
        {
            ProbeVerdict::Reachable(String::from("connection held open (streaming)"))
        }
        Err(error) => ProbeVerdict::Reachable(format!("accepted connection, read failed: {error}")),
    }
}

/// Readiness of one managed container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceReadiness {
    /// Container name.
    pub name: String,
    /// Status in the fresh snapshot; `Absent` when it disappeared.
    pub status: ContainerStatus,
    /// Whether the container is running.
    pub ready: bool,
}

/// Final readiness summary for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessReport {
    /// Per-container readiness.
    pub services: Vec<ServiceReadiness>,
    /// Endpoint that was probed.
    pub endpoint: ServiceEndpoint,
    /// Whether the endpoint answered.
    pub endpoint_reachable: bool,
    /// How the endpoint probe went.
    pub detail: String,
}

impl ReadinessReport {
    /// Report for a run that never probed the endpoint.
    #[must_use]
    pub fn skipped(endpoint: ServiceEndpoint, snapshot: &Snapshot, reason: impl Into<String>) -> Self {
        Self {
            services: service_readiness(snapshot, None),
            endpoint,
            endpoint_reachable: false,
            detail: reason.into(),
        }
    }
}

impl fmt::Display for ReadinessReport {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.endpoint_reachable {
            "reachable"
        } else {
            "not reachable"
        };
        write!(formatter, "{} {state} ({})", self.endpoint, self.detail)
    }
}

/// Confirms the deployment answers after reconciliation.
pub struct ReadinessVerifier<'a, N: ?Sized> {
    probe: &'a N,
    endpoint: ServiceEndpoint,
    grace_period: Duration,
    interrupt: InterruptFlag,
}

impl<'a, N: NetworkProbe + ?Sized> ReadinessVerifier<'a, N> {
    /// Builds a verifier with no grace period.
    pub fn new(probe: &'a N, endpoint: ServiceEndpoint) -> Self {
        Self {
            probe,
            endpoint,
            grace_period: Duration::ZERO,
            interrupt: InterruptFlag::default(),
        }
    }

    /// Settling time before the probe; capped by the verify timeout.
    #[must_use]
    pub const fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Interrupt flag that cuts the grace period short.
    #[must_use]
    pub fn with_interrupt(mut self, interrupt: InterruptFlag) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// Waits out the grace period, then probes the endpoint once.
    ///
    /// `current` is the snapshot taken after reconciliation. Containers seen
    /// in `previous` but missing from `current` are reported absent. The call
    /// returns within `timeout`.
    pub fn verify(
        &self,
        current: &Snapshot,
        previous: Option<&Snapshot>,
        timeout: Duration,
    ) -> ReadinessReport {
        let deadline = Instant::now() + timeout;
        let services = service_readiness(current, previous);

        let grace = self.grace_period.min(timeout);
        let (endpoint_reachable, detail) = if !grace.is_zero() && !self.interrupt.sleep(grace) {
            (false, String::from("interrupted before probing"))
        } else {
            match remaining(deadline) {
                Some(budget) => {
                    let verdict = self.probe.probe(&self.endpoint, budget);
                    (verdict.is_reachable(), verdict.into_detail())
                }
                None => (false, String::from("no time left to probe")),
            }
        };

        tracing::debug!(
            target: READINESS_TARGET,
            endpoint = %self.endpoint,
            reachable = endpoint_reachable,
            detail = %detail,
            "endpoint probed"
        );
        ReadinessReport {
            services,
            endpoint: self.endpoint.clone(),
            endpoint_reachable,
            detail,
        }
    }
}

fn service_readiness(current: &Snapshot, previous: Option<&Snapshot>) -> Vec<ServiceReadiness> {
    let mut services: Vec<ServiceReadiness> = current
        .containers()
        .iter()
        .map(|container| ServiceReadiness {
            name: container.name.clone(),
            status: container.status,
            ready: container.is_running(),
        })
        .collect();
    if let Some(previous) = previous {
        for container in previous.containers() {
            if current.find(&container.name).is_none() {
                services.push(ServiceReadiness {
                    name: container.name.clone(),
                    status: ContainerStatus::Absent,
                    ready: false,
                });
            }
        }
    }
    services
}
