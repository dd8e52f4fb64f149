//! Controller endpoint URIs.
//!
//! A controller is addressed as `scheme://host[:port]`. The scheme selects
//! the transport:
//!
//! | scheme                  | transport | default port |
//! |-------------------------|-----------|--------------|
//! | `linstor`, `plain`      | TCP       | 3376         |
//! | `linstor+ssl`, `ssl`    | TLS       | 3377         |
//!
//! A bare `host[:port]` is treated as `linstor://host[:port]`. Several
//! controllers can be given as a comma-separated list (the format of the
//! `LS_CONTROLLERS` environment variable).

use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use url::Url;

/// Default port of the plain text controller listener.
pub const DEFAULT_PLAIN_PORT: u16 = 3376;

/// Default port of the TLS controller listener.
pub const DEFAULT_SSL_PORT: u16 = 3377;

/// Error returned for a malformed controller URI.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid controller uri '{uri}': {reason}")]
pub struct EndpointError {
    /// The rejected input.
    pub uri: String,
    /// Why it was rejected.
    pub reason: String,
}

impl EndpointError {
    fn new(uri: &str, reason: impl Into<String>) -> Self {
        Self {
            uri: uri.to_string(),
            reason: reason.into(),
        }
    }
}

/// Transport used to reach a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// Unencrypted TCP.
    Plain,
    /// TLS over TCP.
    Ssl,
}

impl TransportKind {
    /// Port used when the URI does not name one.
    pub fn default_port(self) -> u16 {
        match self {
            Self::Plain => DEFAULT_PLAIN_PORT,
            Self::Ssl => DEFAULT_SSL_PORT,
        }
    }

    /// Canonical scheme name.
    pub fn scheme(self) -> &'static str {
        match self {
            Self::Plain => "linstor",
            Self::Ssl => "linstor+ssl",
        }
    }

    fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme {
            "linstor" | "plain" => Some(Self::Plain),
            "linstor+ssl" | "ssl" => Some(Self::Ssl),
            _ => None,
        }
    }
}

/// A parsed controller address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ControllerEndpoint {
    /// Transport selected by the scheme.
    pub transport: TransportKind,
    /// Host name or IP address (IPv6 without brackets).
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl ControllerEndpoint {
    /// Creates an endpoint from its parts.
    pub fn new(transport: TransportKind, host: impl Into<String>, port: u16) -> Self {
        Self {
            transport,
            host: host.into(),
            port,
        }
    }

    /// Plain endpoint on the default port.
    pub fn plain(host: impl Into<String>) -> Self {
        Self::new(TransportKind::Plain, host, DEFAULT_PLAIN_PORT)
    }

    /// Whether the connection must be wrapped in TLS.
    pub fn is_ssl(&self) -> bool {
        self.transport == TransportKind::Ssl
    }

    /// `host:port` form accepted by `TcpStream::connect`.
    pub fn socket_addr(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Display for ControllerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.transport.scheme(), self.socket_addr())
    }
}

impl FromStr for ControllerEndpoint {
    type Err = EndpointError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(EndpointError::new(input, "empty address"));
        }

        let with_scheme = if trimmed.contains("://") {
            trimmed.to_string()
        } else {
            format!("linstor://{trimmed}")
        };

        let url = Url::parse(&with_scheme).map_err(|e| EndpointError::new(input, e.to_string()))?;

        let transport = TransportKind::from_scheme(url.scheme()).ok_or_else(|| {
            EndpointError::new(input, format!("unknown scheme '{}'", url.scheme()))
        })?;

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| EndpointError::new(input, "missing host"))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');

        if !(url.path().is_empty() || url.path() == "/") || url.query().is_some() {
            return Err(EndpointError::new(input, "unexpected path or query"));
        }

        let port = url.port().unwrap_or_else(|| transport.default_port());

        Ok(Self::new(transport, host, port))
    }
}

/// Parses a comma-separated controller list, skipping empty entries.
///
/// # Errors
///
/// Returns the first entry that fails to parse, or an error if the list
/// contains no controller at all.
pub fn parse_controller_list(list: &str) -> Result<Vec<ControllerEndpoint>, EndpointError> {
    let endpoints = list
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(ControllerEndpoint::from_str)
        .collect::<Result<Vec<_>, _>>()?;

    if endpoints.is_empty() {
        return Err(EndpointError::new(list, "no controllers given"));
    }
    Ok(endpoints)
}
