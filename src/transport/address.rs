//! Agent socket address resolution.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use url::Url;

use crate::error::{ProbeError, Result};

/// Internet address family of a TCP agent socket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressFamily {
    /// IPv4 (`AF_INET`)
    Inet,
    /// IPv6 (`AF_INET6`), selected by a bracketed host
    Inet6,
}

/// A resolved agent socket address.
///
/// | Syntax                 | Result                               |
/// |------------------------|--------------------------------------|
/// | `unix:///path/to/sock` | `Unix("/path/to/sock")`              |
/// | `tcp://127.0.0.1:8307` | `Tcp { "127.0.0.1", 8307, Inet }`    |
/// | `tcp://[::1]:8307`     | `Tcp { "::1", 8307, Inet6 }`         |
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentAddress {
    /// Unix-domain socket path
    Unix(PathBuf),
    /// TCP host and port
    Tcp {
        /// Host name or literal address, without brackets
        host: String,
        /// Port number
        port: u16,
        /// Address family to connect with
        family: AddressFamily,
    },
}

impl AgentAddress {
    /// Parse an agent socket string.
    ///
    /// Schemes other than `unix` and `tcp` fail with
    /// [`ProbeError::UnsupportedTransport`].
    pub fn parse(address: &str) -> Result<Self> {
        let invalid = |reason: &str| ProbeError::InvalidAddress {
            address: address.to_string(),
            reason: reason.to_string(),
        };

        let (scheme, rest) = address
            .split_once("://")
            .ok_or_else(|| invalid("expected <scheme>://"))?;
        match scheme.to_ascii_lowercase().as_str() {
            "unix" => {
                // The path is kept as written: no percent-encoding, no dot-segment removal.
                let rest = rest.split(['?', '#']).next().unwrap_or_default();
                let path = rest.find('/').map_or("", |start| &rest[start..]);
                if path.is_empty() || path == "/" {
                    return Err(invalid("missing socket path"));
                }
                Ok(Self::Unix(PathBuf::from(path)))
            }
            "tcp" => {
                let url = Url::parse(address).map_err(|e| invalid(&e.to_string()))?;
                let host = url.host_str().ok_or_else(|| invalid("missing host"))?;
                let port = url.port().ok_or_else(|| invalid("missing port"))?;

                // Hosts may contain colons themselves, hence the brackets.
                let (host, family) = match host.strip_prefix('[').and_then(|h| h.strip_suffix(']')) {
                    Some(inner) => (inner.to_string(), AddressFamily::Inet6),
                    None => (host.to_string(), AddressFamily::Inet),
                };
                if host.is_empty() {
                    return Err(invalid("missing host"));
                }

                Ok(Self::Tcp { host, port, family })
            }
            _ => Err(ProbeError::UnsupportedTransport(scheme.to_string())),
        }
    }

    /// Check if this is a Unix-domain socket
    pub fn is_unix(&self) -> bool {
        matches!(self, Self::Unix(_))
    }
}

impl FromStr for AgentAddress {
    type Err = ProbeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for AgentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix(path) => write!(f, "unix://{}", path.display()),
            Self::Tcp {
                host,
                port,
                family: AddressFamily::Inet6,
            } => write!(f, "tcp://[{host}]:{port}"),
            Self::Tcp { host, port, .. } => write!(f, "tcp://{host}:{port}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_unix() {
        assert_eq!(
            AgentAddress::parse("unix:///var/run/blackfire/agent.sock").unwrap(),
            AgentAddress::Unix(PathBuf::from("/var/run/blackfire/agent.sock"))
        );
    }

    #[test]
    fn test_parse_unix_path_kept_verbatim() {
        assert_eq!(
            AgentAddress::parse("unix:///tmp/agent dir/agent.sock").unwrap(),
            AgentAddress::Unix(PathBuf::from("/tmp/agent dir/agent.sock"))
        );
        assert_eq!(
            AgentAddress::parse("unix:///tmp/café/agent.sock").unwrap(),
            AgentAddress::Unix(PathBuf::from("/tmp/café/agent.sock"))
        );
        assert_eq!(
            AgentAddress::parse("unix:///run/agent%20x.sock?timeout=1#frag").unwrap(),
            AgentAddress::Unix(PathBuf::from("/run/agent%20x.sock"))
        );
    }

    #[test]
    fn test_scheme_is_case_insensitive() {
        assert_eq!(
            AgentAddress::parse("TCP://127.0.0.1:8307").unwrap(),
            AgentAddress::parse("tcp://127.0.0.1:8307").unwrap()
        );
        assert!(AgentAddress::parse("Unix:///var/run/agent.sock").unwrap().is_unix());

        let err = AgentAddress::parse("HTTP://127.0.0.1:8307").unwrap_err();
        assert!(matches!(err, ProbeError::UnsupportedTransport(ref s) if s == "HTTP"));
    }

    #[test]
    fn test_parse_tcp_v4() {
        assert_eq!(
            AgentAddress::parse("tcp://127.0.0.1:8307").unwrap(),
            AgentAddress::Tcp {
                host: "127.0.0.1".to_string(),
                port: 8307,
                family: AddressFamily::Inet,
            }
        );
    }

    #[test]
    fn test_parse_tcp_hostname() {
        let address = AgentAddress::parse("tcp://agent.local:10666").unwrap();
        assert_eq!(address.to_string(), "tcp://agent.local:10666");
        assert!(!address.is_unix());
    }

    #[test]
    fn test_parse_tcp_v6() {
        assert_eq!(
            AgentAddress::parse("tcp://[::]:10666").unwrap(),
            AgentAddress::Tcp {
                host: "::".to_string(),
                port: 10666,
                family: AddressFamily::Inet6,
            }
        );
        assert_eq!(
            AgentAddress::parse("tcp://[::1]:8307").unwrap().to_string(),
            "tcp://[::1]:8307"
        );
    }

    #[test]
    fn test_unsupported_scheme() {
        let err = AgentAddress::parse("udp://127.0.0.1:8307").unwrap_err();
        assert!(matches!(err, ProbeError::UnsupportedTransport(ref s) if s == "udp"));
        assert!(err.to_string().contains("Unsupported socket type"));
    }

    #[test]
    fn test_invalid_addresses() {
        for address in ["tcp://127.0.0.1", "127.0.0.1:8307", "unix://", "tcp://:8307"] {
            let err = AgentAddress::parse(address).unwrap_err();
            assert!(
                matches!(err, ProbeError::InvalidAddress { .. }),
                "{address} gave {err:?}"
            );
        }
    }

    proptest! {
        #[test]
        fn prop_tcp_v4_roundtrip(a in 0u8.., b in 0u8.., c in 0u8.., d in 0u8.., port in 1u16..) {
            let host = format!("{a}.{b}.{c}.{d}");
            let address = AgentAddress::parse(&format!("tcp://{host}:{port}")).unwrap();
            prop_assert_eq!(address, AgentAddress::Tcp { host, port, family: AddressFamily::Inet });
        }

        #[test]
        fn prop_unix_path_preserved(segments in proptest::collection::vec("[a-z0-9_ é-]{1,12}", 1..5)) {
            let path = format!("/{}", segments.join("/"));
            let address = AgentAddress::parse(&format!("unix://{path}")).unwrap();
            prop_assert_eq!(address, AgentAddress::Unix(PathBuf::from(path)));
        }

        #[test]
        fn prop_unknown_scheme_rejected(scheme in "[a-s]{1,8}") {
            let result = AgentAddress::parse(&format!("{scheme}://somewhere:1"));
            prop_assert!(matches!(result, Err(ProbeError::UnsupportedTransport(_))), "{:?}", result);
        }
    }
}
