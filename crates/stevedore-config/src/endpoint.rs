use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::{Host, Url};

/// Transport spoken by the managed service's public endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointScheme {
    /// Plain HTTP; readiness probes issue a `GET` after connecting.
    Http,
    /// HTTPS; readiness probes stop at the TCP handshake.
    Https,
    /// Bare TCP listener.
    Tcp,
}

impl EndpointScheme {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
            Self::Tcp => "tcp",
        }
    }
}

/// Externally reachable address of the managed server.
///
/// Serialised as a URL string so configuration files and environment
/// variables share one representation: `http://localhost:8050/sse`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct ServiceEndpoint {
    scheme: EndpointScheme,
    host: String,
    port: u16,
    path: String,
}

impl ServiceEndpoint {
    /// Builds an HTTP endpoint.
    #[must_use]
    pub fn http(host: impl Into<String>, port: u16, path: impl Into<String>) -> Self {
        Self {
            scheme: EndpointScheme::Http,
            host: host.into(),
            port,
            path: normalise_path(path.into()),
        }
    }

    /// Builds a bare TCP endpoint.
    #[must_use]
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme: EndpointScheme::Tcp,
            host: host.into(),
            port,
            path: String::new(),
        }
    }

    /// Transport scheme.
    #[must_use]
    pub const fn scheme(&self) -> EndpointScheme {
        self.scheme
    }

    /// Host name or address; IPv6 literals carry no brackets.
    #[must_use]
    pub fn host(&self) -> &str {
        self.host.as_str()
    }

    /// `host:port`, bracketing IPv6 literals.
    #[must_use]
    pub fn authority(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// TCP port the service listens on.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Request path; empty for TCP endpoints.
    #[must_use]
    pub fn path(&self) -> &str {
        self.path.as_str()
    }
}

fn normalise_path(path: String) -> String {
    if path.is_empty() || path.starts_with('/') {
        path
    } else {
        format!("/{path}")
    }
}

impl fmt::Display for ServiceEndpoint {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "{}://{}{}",
            self.scheme.as_str(),
            self.authority(),
            self.path
        )
    }
}

impl FromStr for ServiceEndpoint {
    type Err = EndpointParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let url = Url::parse(input)?;
        let scheme = match url.scheme() {
            "http" => EndpointScheme::Http,
            "https" => EndpointScheme::Https,
            "tcp" => EndpointScheme::Tcp,
            other => return Err(EndpointParseError::UnsupportedScheme(other.to_owned())),
        };
        let host = match url.host() {
            Some(Host::Ipv6(address)) => address.to_string(),
            Some(Host::Ipv4(address)) => address.to_string(),
            Some(Host::Domain(domain)) if !domain.is_empty() => domain.to_owned(),
            Some(Host::Domain(_)) | None => {
                return Err(EndpointParseError::MissingHost(input.to_owned()));
            }
        };
        let port = url
            .port_or_known_default()
            .ok_or_else(|| EndpointParseError::MissingPort(input.to_owned()))?;
        let path = match scheme {
            EndpointScheme::Tcp => String::new(),
            EndpointScheme::Http | EndpointScheme::Https => url.path().to_owned(),
        };
        Ok(Self {
            scheme,
            host,
            port,
            path,
        })
    }
}

impl TryFrom<String> for ServiceEndpoint {
    type Error = EndpointParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ServiceEndpoint> for String {
    fn from(endpoint: ServiceEndpoint) -> Self {
        endpoint.to_string()
    }
}

/// Errors encountered while parsing a [`ServiceEndpoint`] from text.
#[derive(Debug, Error)]
pub enum EndpointParseError {
    /// Scheme was not recognised.
    #[error("unsupported endpoint scheme '{0}'")]
    UnsupportedScheme(String),
    /// Host name was missing.
    #[error("missing host in '{0}'")]
    MissingHost(String),
    /// Port was missing and the scheme has no well-known default.
    #[error("missing port in '{0}'")]
    MissingPort(String),
    /// URL failed to parse.
    #[error(transparent)]
    Url(#[from] url::ParseError),
}
