//! Client error types.

use std::io;

use thiserror::Error;

use linstor_core::EndpointError;
use linstor_protocol::{ApiCallResponses, ProtocolError};

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur in the client.
///
/// `Network`, `Protocol`, `IncompatibleVersion` and `Tls` are fatal for the
/// connection they happened on. `Api` and `UnexpectedReply` concern a single
/// request; the connection keeps serving others.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport failure: connect refused, reset, write failure, not connected.
    #[error("network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<io::Error>,
    },

    /// Framing or decoding failure.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Controller speaks an API version outside the supported range.
    #[error("incompatible controller API version {server} (supported: {min}..={max})")]
    IncompatibleVersion { server: u32, min: u32, max: u32 },

    /// TLS setup or negotiation failed.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Malformed controller address.
    #[error(transparent)]
    InvalidEndpoint(#[from] EndpointError),

    /// The connection closed while, or before, waiting for a reply.
    #[error("connection closed: {reason}")]
    ConnectionClosed { reason: String },

    /// An operation did not finish in time.
    #[error("timeout during {operation}")]
    Timeout { operation: String },

    /// The controller answered with error responses.
    #[error("controller returned an error:\n{0}")]
    Api(ApiCallResponses),

    /// The controller answered with a reply of the wrong kind.
    #[error("unexpected reply to {request}: got {received}")]
    UnexpectedReply {
        request: &'static str,
        received: &'static str,
    },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Command output could not be rendered.
    #[error("failed to render output: {0}")]
    Output(#[from] serde_json::Error),
}

impl ClientError {
    /// Creates a network error without an underlying IO error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a network error caused by `source`.
    pub fn network_io(message: impl Into<String>, source: io::Error) -> Self {
        Self::Network {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Creates a timeout error.
    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    /// Creates a connection closed error.
    pub fn closed(reason: impl Into<String>) -> Self {
        Self::ConnectionClosed {
            reason: reason.into(),
        }
    }

    /// Whether retrying against another controller could help.
    pub fn is_connection_failure(&self) -> bool {
        matches!(
            self,
            Self::Network { .. }
                | Self::Tls(_)
                | Self::Timeout { .. }
                | Self::ConnectionClosed { .. }
                | Self::Protocol(_)
                | Self::IncompatibleVersion { .. }
        )
    }
}
