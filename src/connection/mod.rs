//! Agent connection: socket lifecycle and the handshake exchange.
//!
//! # State Machine
//!
//! ```text
//!                 connect()                 connect(Some(handshake))
//!     [Created] ────────────> [Connected] ───────────────────> [HelloSent]
//!         │                        │                               │
//!         │                        │                  blackfire_yml=true
//!         │                        │                               v
//!         │                        │       [Established] <──── [ConfigSent]
//!         │                        │             │   ^             │
//!         │ close()                │ close()     │   └─────────────┘ (no upload)
//!         v                        v             v
//!     [Closed] <─────────────────────────────────┘  (also on any failure)
//! ```
//!
//! Every blocking operation is bounded by the connection timeout. A timeout
//! is reported as the operation's error, never as a partial result.
//!
//! The socket belongs to the `Connection`: dropping it closes the socket, so
//! it is released on every exit path, including `?` returns mid-handshake.

pub mod handshake;

pub use handshake::Handshake;

use std::future::Future;
use std::io;
use std::time::Duration;

use bytes::{Bytes, BytesMut};

use crate::error::{ProbeError, Result};
use crate::protocol::{
    Directives, Message, Response, HEADER_MARKER, MARKER, MAX_RECV_SIZE, MAX_SEND_SIZE,
};
use crate::transport::{AgentAddress, AgentStream, TransportKind};

/// Marker promising a header-only reply
const BLACKFIRE_YML_MARKER: &[u8] = b"blackfire_yml=true";

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Address resolved, no socket yet
    Created,
    /// Socket open, no handshake run
    Connected,
    /// Hello request sent, waiting for the agent
    HelloSent,
    /// Configuration payload sent, waiting for the agent
    ConfigSent,
    /// Handshake complete, merged response available
    Established,
    /// Socket released
    Closed,
}

/// A connection to the agent.
///
/// Not meant to be shared: every I/O method takes `&mut self`.
#[derive(Debug)]
pub struct Connection {
    agent_socket: String,
    address: AgentAddress,
    timeout: Duration,
    stream: Option<AgentStream>,
    state: ConnectionState,
    agent_response: Option<Response>,
}

impl Connection {
    /// Create a connection to `agent_socket`. No I/O happens here.
    ///
    /// Fails with [`ProbeError::UnsupportedTransport`] for schemes other than
    /// `unix` and `tcp`.
    pub fn new(agent_socket: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            agent_socket: agent_socket.to_string(),
            address: AgentAddress::parse(agent_socket)?,
            timeout,
            stream: None,
            state: ConnectionState::Created,
            agent_response: None,
        })
    }

    /// Resolved agent address
    pub fn address(&self) -> &AgentAddress {
        &self.address
    }

    /// Transport of the agent socket
    pub fn transport(&self) -> TransportKind {
        TransportKind::from(&self.address)
    }

    /// Timeout applied to every socket operation
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Current state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Check if the connection has been closed
    pub fn is_closed(&self) -> bool {
        self.state == ConnectionState::Closed
    }

    /// Merged agent response of a completed handshake
    pub fn agent_response(&self) -> Option<&Response> {
        self.agent_response.as_ref()
    }

    /// Open the socket and, when `handshake` is given, run the handshake.
    ///
    /// On failure the socket is closed before the error is returned.
    pub async fn connect(&mut self, handshake: Option<&Handshake<'_>>) -> Result<()> {
        if self.state != ConnectionState::Created {
            return Err(ProbeError::Protocol(format!(
                "cannot connect in state {:?}",
                self.state
            )));
        }

        tracing::debug!("Connecting to agent at {}.", self.address);
        let stream = match bounded(self.timeout, AgentStream::connect(&self.address)).await {
            Ok(stream) => stream,
            Err(source) => {
                self.close();
                return Err(ProbeError::Connection {
                    address: self.agent_socket.clone(),
                    source,
                });
            }
        };
        self.stream = Some(stream);
        self.state = ConnectionState::Connected;

        if let Some(handshake) = handshake {
            if let Err(err) = self.write_prolog(handshake).await {
                self.close();
                return Err(err);
            }
        }

        Ok(())
    }

    /// Write `data` in chunks of at most [`MAX_SEND_SIZE`] bytes.
    pub async fn send(&mut self, data: &[u8]) -> Result<()> {
        let timeout = self.timeout;
        let stream = self.stream_mut()?;

        for (index, chunk) in data.chunks(MAX_SEND_SIZE).enumerate() {
            if let Err(source) = bounded(timeout, stream.write_all(chunk)).await {
                let unsent = &data[index * MAX_SEND_SIZE..];
                return Err(ProbeError::Send {
                    payload: String::from_utf8_lossy(unsent).into_owned(),
                    source,
                });
            }
        }

        Ok(())
    }

    /// Read one complete frame.
    ///
    /// Reads of at most [`MAX_RECV_SIZE`] bytes are accumulated until the
    /// buffer ends with `\n\n`, or ends with `\n` after announcing
    /// `blackfire_yml=true` (a header-only reply). The agent closing the
    /// socket first is an error.
    pub async fn recv(&mut self) -> Result<Bytes> {
        let timeout = self.timeout;
        let stream = self.stream_mut()?;

        let mut result = BytesMut::with_capacity(MAX_RECV_SIZE);
        let mut chunk = [0u8; MAX_RECV_SIZE];
        let mut header_only = false;
        loop {
            let read = bounded(timeout, stream.read(&mut chunk))
                .await
                .map_err(ProbeError::Recv)?;
            if read == 0 {
                return Err(ProbeError::Recv(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "Agent closed the connection.",
                )));
            }
            // Only the new bytes, plus enough overlap to catch a split marker.
            let scan_from = result.len().saturating_sub(BLACKFIRE_YML_MARKER.len() - 1);
            result.extend_from_slice(&chunk[..read]);
            header_only = header_only || contains_blackfire_yml_marker(&result[scan_from..]);

            if header_only && result.ends_with(HEADER_MARKER) {
                break;
            }
            if result.ends_with(MARKER) {
                break;
            }
        }

        Ok(result.freeze())
    }

    /// Release the socket. Safe to call any number of times, before or after
    /// `connect`.
    pub fn close(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }

        let had_socket = self.stream.take().is_some();
        self.state = ConnectionState::Closed;

        if had_socket {
            tracing::debug!("Agent connection closed.");
        }
    }

    fn stream_mut(&mut self) -> Result<&mut AgentStream> {
        self.stream
            .as_mut()
            .ok_or_else(|| ProbeError::Protocol("agent connection is not open".to_string()))
    }

    async fn write_prolog(&mut self, handshake: &Handshake<'_>) -> Result<()> {
        let hello_req = handshake.hello_request().to_bytes();
        self.send(&hello_req).await?;
        self.state = ConnectionState::HelloSent;
        tracing::debug!("SEND hello_req ('{}')", String::from_utf8_lossy(&hello_req));

        let response_raw = self.recv().await?;
        let mut agent_response = Response::from_bytes(&response_raw)?;
        if !agent_response.is_ok() {
            return Err(ProbeError::InvalidResponse(agent_response.to_string()));
        }
        tracing::debug!("RECV hello_req response. ('{}')", agent_response);

        if agent_response.status("blackfire_yml") == Some("true") {
            let request = handshake.blackfire_yml_request().ok_or_else(|| {
                ProbeError::Protocol(
                    "agent asked for the configuration payload but none is available".to_string(),
                )
            })?;
            let blackfire_yml_req = request.to_bytes();
            self.send(&blackfire_yml_req).await?;
            self.state = ConnectionState::ConfigSent;
            tracing::debug!(
                "SEND blackfire_yml_req ('{}')",
                String::from_utf8_lossy(&blackfire_yml_req)
            );

            // Fn-args, constants and metric definitions may change once the
            // agent has seen the payload.
            let response_raw = self.recv().await?;
            let blackfire_yml_response = Response::from_bytes(&response_raw)?;
            if !blackfire_yml_response.is_ok() {
                return Err(ProbeError::InvalidResponse(format!(
                    "blackfire_yml request: {blackfire_yml_response}"
                )));
            }
            tracing::debug!(
                "RECV blackfire_yml_req response. ('{}')",
                String::from_utf8_lossy(&blackfire_yml_response.to_bytes())
            );

            agent_response
                .args_mut()
                .update(blackfire_yml_response.args().clone());
        }

        self.agent_response = Some(agent_response);
        self.state = ConnectionState::Established;
        Ok(())
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

/// Run a socket operation under `timeout`, expiry being a `TimedOut` error.
async fn bounded<T, F>(timeout: Duration, operation: F) -> io::Result<T>
where
    F: Future<Output = io::Result<T>>,
{
    match tokio::time::timeout(timeout, operation).await {
        Ok(result) => result,
        Err(_) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("timed out after {timeout:?}"),
        )),
    }
}

fn contains_blackfire_yml_marker(window: &[u8]) -> bool {
    window
        .windows(BLACKFIRE_YML_MARKER.len())
        .any(|w| w == BLACKFIRE_YML_MARKER)
}
