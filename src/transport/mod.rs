//! Transport layer for the agent socket.
//!
//! Provides:
//! - **Address resolution**: `unix://<path>` and `tcp://<host>:<port>` strings
//!   into an [`AgentAddress`], IPv6 selected by a bracketed host
//! - **Streams**: [`AgentStream`] over TCP or Unix Domain Sockets
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │               Connection                 │
//! │   (chunked send, frame-aware receive)    │
//! └──────────────────┬──────────────────────┘
//!                    │
//!          ┌────────┴────────┐
//!          ▼                 ▼
//! ┌─────────────────┐ ┌─────────────────┐
//! │   TcpStream     │ │   UnixStream    │
//! │ (v4/v6, nodelay)│ │  (unix only)    │
//! └─────────────────┘ └─────────────────┘
//! ```

mod address;
mod stream;

pub use address::{AddressFamily, AgentAddress};
pub use stream::AgentStream;

/// Transport kind of an agent socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// `unix://`
    Unix,
    /// `tcp://`
    Tcp,
}

impl TransportKind {
    /// URL scheme of this transport.
    pub fn scheme(&self) -> &'static str {
        match self {
            Self::Unix => "unix",
            Self::Tcp => "tcp",
        }
    }
}

impl From<&AgentAddress> for TransportKind {
    fn from(address: &AgentAddress) -> Self {
        match address {
            AgentAddress::Unix(_) => Self::Unix,
            AgentAddress::Tcp { .. } => Self::Tcp,
        }
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.scheme())
    }
}

impl std::str::FromStr for TransportKind {
    type Err = crate::error::ProbeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "unix" => Ok(Self::Unix),
            "tcp" => Ok(Self::Tcp),
            other => Err(crate::error::ProbeError::UnsupportedTransport(other.to_string())),
        }
    }
}
