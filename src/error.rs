//! Probe protocol error types.
//!
//! # Error Classification
//!
//! - **Configuration**: `UnsupportedTransport`, `InvalidAddress`, `Config` are
//!   raised before any socket is created.
//! - **Transport**: `Connection`, `Send`, `Recv` wrap the underlying
//!   [`std::io::Error`] via `#[source]` so the full chain stays visible.
//! - **Protocol**: `InvalidMessage` (malformed frame), `InvalidResponse`
//!   (agent answered with a non-OK status), `ApmAgentError` /
//!   `ApmStatusFalse` (agent-reported failure) and `Protocol` (state misuse).
//!
//! Nothing in this crate retries. A caller that wants to retry opens a new
//! [`Connection`](crate::Connection).

use thiserror::Error;

/// Probe protocol errors.
#[derive(Error, Debug)]
pub enum ProbeError {
    /// The agent socket uses a scheme other than `unix` or `tcp`.
    #[error("Unsupported socket type. [{0}]")]
    UnsupportedTransport(String),

    /// The agent socket string could not be resolved to an address.
    #[error("Invalid agent socket '{address}': {reason}")]
    InvalidAddress {
        /// Address as given by the caller.
        address: String,
        /// What was wrong with it.
        reason: String,
    },

    /// Connecting to the agent failed.
    #[error("Agent connection failed.[{source}][{address}]")]
    Connection {
        /// Address as given by the caller.
        address: String,
        /// Underlying socket error.
        #[source]
        source: std::io::Error,
    },

    /// Writing to the agent failed.
    #[error("Agent send data failed.[{source}][{payload}]")]
    Send {
        /// Unsent remainder of the payload, for diagnostics.
        payload: String,
        /// Underlying socket error.
        #[source]
        source: std::io::Error,
    },

    /// Reading from the agent failed, timed out, or the agent hung up.
    #[error("Agent recv data failed.[{0}]")]
    Recv(#[source] std::io::Error),

    /// A frame could not be decoded.
    #[error("Invalid message format: {0}")]
    InvalidMessage(String),

    /// The agent answered with an error status.
    #[error("Invalid response received from Agent. [{0}]")]
    InvalidResponse(String),

    /// The agent replied `Blackfire-Error` to an APM exchange.
    #[error("Agent could not send APM trace. reason={0}")]
    ApmAgentError(String),

    /// The agent replied `success=false` to an APM exchange.
    #[error("{0}")]
    ApmStatusFalse(String),

    /// Connection used out of order (e.g. connect twice, send before connect).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),

    /// I/O error outside of the agent socket (e.g. saving a message).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for probe operations
pub type Result<T> = std::result::Result<T, ProbeError>;

impl From<toml::de::Error> for ProbeError {
    fn from(err: toml::de::Error) -> Self {
        ProbeError::Config(err.to_string())
    }
}

impl ProbeError {
    /// True for errors raised by the agent socket itself.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ProbeError::Connection { .. } | ProbeError::Send { .. } | ProbeError::Recv(_)
        )
    }
}
