//! # Probe ↔ Agent handshake protocol
//!
//! Client side of the line-oriented protocol an instrumentation probe speaks
//! with its local profiling agent before a profile is recorded.
//!
//! ## Features
//!
//! - **Transports**: Unix Domain Sockets and TCP (IPv4/IPv6), per-operation
//!   timeout, `TCP_NODELAY`
//! - **Framing**: chunked writes, reads reassembled until a frame marker
//! - **Messages**: requests with ordered headers, simple and multi-section
//!   (APM) responses
//! - **Handshake**: hello, optional configuration upload, directive merge
//!
//! ## Protocol Overview
//!
//! ```text
//! Probe                                   Agent
//!    |                                       |
//!    |------ hello (query, features) ------>|
//!    |<----- Blackfire-Response ------------|
//!    |                                       |
//!    |------ .blackfire.yml (optional) ---->|
//!    |<----- Blackfire-Response ------------|  directives merged
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use bf_probe::{Connection, Directives, Handshake, SessionConfig};
//!
//! let config = SessionConfig::from_query(&query)?;
//! let handshake = Handshake::new(&config).with_blackfire_yml(Some(&yml));
//!
//! let mut conn = Connection::new("unix:///var/run/blackfire/agent.sock", Duration::from_millis(250))?;
//! conn.connect(Some(&handshake)).await?;
//!
//! let response = conn.agent_response().unwrap();
//! let selectors = response.timespan_selectors();
//! let functions = response.instrumented_functions();
//! ```
//!
//! ## Modules
//!
//! - [`protocol`]: wire constants and message model
//! - [`transport`]: agent address resolution and streams
//! - [`connection`]: socket lifecycle and handshake
//! - [`config`]: session and probe configuration
//! - [`error`]: error types and result alias

pub mod config;
pub mod connection;
pub mod error;
pub mod protocol;
pub mod transport;

// Re-exports for convenience
pub use config::{AgentConfig, ProbeConfig, ServerCredentials, SessionConfig};
pub use connection::{Connection, ConnectionState, Handshake};
pub use error::{ProbeError, Result};
pub use protocol::{
    ApmRequest, ApmResponse, ArgId, ArgMap, Directives, InstrumentedFunctions, Message, Request,
    Response, StatusCode, TimespanSelectors,
};
pub use transport::{AddressFamily, AgentAddress, TransportKind};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
