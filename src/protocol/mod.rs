//! Probe ↔ agent wire protocol.
//!
//! The protocol is line oriented text. A frame is a set of `name: value`
//! lines terminated by a blank line, optionally followed by a body.
//!
//! # Message Flow
//!
//! ```text
//! Probe                               Agent
//!    |                                   |
//!    |--- Blackfire-Query / -Probe ---->|  hello request
//!    |<-- Blackfire-Response: ... ------|  simple response (+ directives)
//!    |                                   |
//!    |--- blackfire-yaml-size + body -->|  only if the agent asked for it
//!    |<-- Blackfire-Response: ... ------|  follow-up directives
//! ```
//!
//! # Dialects
//!
//! | Type          | Direction      | Framing                               |
//! |---------------|----------------|---------------------------------------|
//! | `Request`     | Probe→Agent    | headers, blank line, optional body    |
//! | `ApmRequest`  | Probe→Agent    | `file-format` first, always `\n\n`    |
//! | `Response`    | Agent→Probe    | status line + `key: value` lines      |
//! | `ApmResponse` | Agent→Probe    | status line + args + `key-page(` blocks |

mod apm;
mod args;
mod directives;
mod message;
mod request;
mod response;

pub use apm::ApmResponse;
pub use args::ArgMap;
pub use directives::{ArgId, Directives, InstrumentedFunctions, TimespanSelectors};
pub use message::Message;
pub use request::{ApmRequest, Request, FILE_FORMAT_HEADER, PROBE_HEADER, QUERY_HEADER};
pub use response::{Response, StatusCode};

use crate::error::{ProbeError, Result};

/// Maximum bytes handed to the socket per write
pub const MAX_SEND_SIZE: usize = 4096;

/// Maximum bytes requested from the socket per read
pub const MAX_RECV_SIZE: usize = 4096;

/// Text encoding of every frame
pub const ENCODING: &str = "utf-8";

/// Terminates a header-only frame
pub const HEADER_MARKER: &[u8] = b"\n";

/// Terminates a full frame
pub const MARKER: &[u8] = b"\n\n";

/// Status line type token of a failed exchange
pub const ERROR_STATUS: &str = "Blackfire-Error";

/// Status line type token of a successful exchange
pub const RESPONSE_STATUS: &str = "Blackfire-Response";

/// Decode a frame received from the socket.
///
/// Invalid UTF-8 is rejected instead of being dropped, so a frame is never
/// silently altered on its way in.
pub fn decode_frame(data: &[u8]) -> Result<&str> {
    std::str::from_utf8(data).map_err(|e| {
        ProbeError::InvalidMessage(format!("frame is not valid {ENCODING}: {e}"))
    })
}

/// Parse a `key=value&key=value` status value.
///
/// `+` decodes to a space and `%XX` escapes are resolved. Pairs with an empty
/// value are dropped and a repeated key keeps its last value.
pub fn parse_status_value(value: &str) -> std::collections::HashMap<String, String> {
    url::form_urlencoded::parse(value.as_bytes())
        .filter(|(_, v)| !v.is_empty())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

/// Split a `key: value` line on its first colon, trimming both sides.
pub(crate) fn split_arg_line(line: &str) -> Option<(&str, &str)> {
    line.split_once(':').map(|(k, v)| (k.trim(), v.trim()))
}
