//! Configuration management.
//!
//! Two kinds of configuration exist:
//! - [`SessionConfig`]: the signed query of one profile, fixed for a handshake
//! - [`ProbeConfig`]: where the agent listens and how long to wait for it,
//!   loaded from a TOML file and/or environment variables

mod session;

pub use session::{ServerCredentials, SessionConfig, SERVER_ID_ENV, SERVER_TOKEN_ENV};

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::connection::Connection;
use crate::error::{ProbeError, Result};

/// Environment variable overriding the agent socket
pub const AGENT_SOCKET_ENV: &str = "BLACKFIRE_AGENT_SOCKET";

/// Environment variable overriding the agent timeout, in seconds
pub const AGENT_TIMEOUT_ENV: &str = "BLACKFIRE_AGENT_TIMEOUT";

/// Main configuration struct
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Agent connection settings
    #[serde(default)]
    pub agent: AgentConfig,
}

impl ProbeConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| ProbeError::Config(format!("Failed to read config file: {e}")))?;

        Ok(toml::from_str(&content)?)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(socket) = std::env::var(AGENT_SOCKET_ENV) {
            if !socket.is_empty() {
                config.agent.socket = socket;
            }
        }
        if let Ok(timeout) = std::env::var(AGENT_TIMEOUT_ENV) {
            match timeout.parse::<f64>() {
                Ok(secs) if secs.is_finite() && secs > 0.0 => config.agent.timeout_secs = secs,
                _ => tracing::warn!("Ignoring invalid {}={:?}.", AGENT_TIMEOUT_ENV, timeout),
            }
        }

        config
    }

    /// Default location of the config file
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("blackfire").join("probe.toml"))
    }

    /// Merge with another config (other takes precedence where it differs from defaults)
    pub fn merge(self, other: Self) -> Self {
        let defaults = AgentConfig::default();
        Self {
            agent: AgentConfig {
                socket: if other.agent.socket != defaults.socket {
                    other.agent.socket
                } else {
                    self.agent.socket
                },
                timeout_secs: if other.agent.timeout_secs != defaults.timeout_secs {
                    other.agent.timeout_secs
                } else {
                    self.agent.timeout_secs
                },
            },
        }
    }
}

/// Agent connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Agent socket, `unix://<path>` or `tcp://<host>:<port>`
    pub socket: String,

    /// Timeout of every socket operation, in seconds
    pub timeout_secs: f64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            socket: default_agent_socket().to_string(),
            timeout_secs: 0.25,
        }
    }
}

impl AgentConfig {
    /// Timeout as a duration
    pub fn timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.timeout_secs).unwrap_or(Duration::from_millis(250))
    }

    /// Create an unconnected [`Connection`] to the configured agent
    pub fn connection(&self) -> Result<Connection> {
        Connection::new(&self.socket, self.timeout())
    }
}

/// Platform default agent socket
pub fn default_agent_socket() -> &'static str {
    if cfg!(target_os = "linux") {
        "unix:///var/run/blackfire/agent.sock"
    } else if cfg!(target_os = "macos") {
        "unix:///usr/local/var/run/blackfire-agent.sock"
    } else {
        "tcp://127.0.0.1:8307"
    }
}
