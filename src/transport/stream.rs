//! Connected agent socket.
//!
//! - TCP (v4/v6): `TCP_NODELAY` is requested on connect, best effort.
//! - Unix: Unix Domain Socket, unavailable on other platforms.

use std::io;
use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
#[cfg(unix)]
use tokio::net::UnixStream;

use super::{AddressFamily, AgentAddress};

/// A stream socket connected to the agent
#[derive(Debug)]
pub enum AgentStream {
    /// TCP connection
    Tcp(TcpStream),
    /// Unix Domain Socket connection
    #[cfg(unix)]
    Unix(UnixStream),
}

impl AgentStream {
    /// Open a stream to `address`.
    ///
    /// For TCP, only resolved addresses of the requested family are tried.
    pub async fn connect(address: &AgentAddress) -> io::Result<Self> {
        match address {
            AgentAddress::Tcp { host, port, family } => {
                let candidates: Vec<SocketAddr> = tokio::net::lookup_host((host.as_str(), *port))
                    .await?
                    .filter(|addr| match family {
                        AddressFamily::Inet => addr.is_ipv4(),
                        AddressFamily::Inet6 => addr.is_ipv6(),
                    })
                    .collect();
                if candidates.is_empty() {
                    return Err(io::Error::new(
                        io::ErrorKind::AddrNotAvailable,
                        format!("no {family:?} address for {host}"),
                    ));
                }

                let stream = TcpStream::connect(candidates.as_slice()).await?;
                // Small frames go out immediately; failing to set it is harmless.
                let _ = stream.set_nodelay(true);
                Ok(Self::Tcp(stream))
            }
            #[cfg(unix)]
            AgentAddress::Unix(path) => Ok(Self::Unix(UnixStream::connect(path).await?)),
            #[cfg(not(unix))]
            AgentAddress::Unix(path) => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("unix sockets are not available here: {}", path.display()),
            )),
        }
    }

    /// Write the whole buffer
    pub async fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        match self {
            Self::Tcp(stream) => stream.write_all(buf).await,
            #[cfg(unix)]
            Self::Unix(stream) => stream.write_all(buf).await,
        }
    }

    /// Read up to `buf.len()` bytes, returning 0 once the peer has closed
    pub async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(stream) => stream.read(buf).await,
            #[cfg(unix)]
            Self::Unix(stream) => stream.read(buf).await,
        }
    }

    /// Check if the TCP stream has `TCP_NODELAY` set
    pub fn nodelay(&self) -> Option<bool> {
        match self {
            Self::Tcp(stream) => stream.nodelay().ok(),
            #[cfg(unix)]
            Self::Unix(_) => None,
        }
    }
}
