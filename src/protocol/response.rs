//! Simple agent response.
//!
//! ```text
//! Blackfire-Response: blackfire_yml=true&continue=true
//! Blackfire-Fn-Args: file_get_contents 1,2
//! Blackfire-Timespan: ^PDO::
//! ```

use std::collections::HashMap;
use std::fmt;

use super::{
    decode_frame, parse_status_value, split_arg_line, ArgMap, Directives, Message, ERROR_STATUS,
    RESPONSE_STATUS,
};
use crate::error::{ProbeError, Result};

/// Outcome announced by the status line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatusCode {
    /// `Blackfire-Response`
    #[default]
    Ok,
    /// `Blackfire-Error`
    Error,
}

/// A simple key/value response from the agent
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    status_code: StatusCode,
    status_val: String,
    status_val_dict: HashMap<String, String>,
    args: ArgMap,
}

impl Response {
    /// Create a response with the given status and no arguments
    pub fn new(status_code: StatusCode, status_val: impl Into<String>) -> Self {
        let status_val = status_val.into();
        Self {
            status_code,
            status_val_dict: parse_status_value(&status_val),
            status_val,
            args: ArgMap::new(),
        }
    }

    /// Append an argument line
    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.args.push(key, value);
        self
    }

    /// Parse a response frame.
    ///
    /// Every non-blank line must contain a colon; a line without one makes the
    /// whole frame invalid.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let raw = decode_frame(data)?.trim();
        let mut lines = raw.split('\n');

        let status_line = lines.next().unwrap_or_default();
        let (resp_type, resp_val) = split_arg_line(status_line).ok_or_else(|| {
            ProbeError::InvalidMessage(format!("Missing status line in response. [{raw}]"))
        })?;

        let status_code = if resp_type == ERROR_STATUS {
            StatusCode::Error
        } else {
            StatusCode::Ok
        };
        let mut response = Self::new(status_code, resp_val);

        for line in lines {
            if line.trim().is_empty() {
                continue;
            }
            let (key, value) = split_arg_line(line).ok_or_else(|| {
                ProbeError::InvalidMessage(format!("Malformed response line '{line}'. [{raw}]"))
            })?;
            response.args.push(key, value);
        }

        Ok(response)
    }

    /// Status announced by the agent
    pub fn status_code(&self) -> StatusCode {
        self.status_code
    }

    /// Check if the agent answered `Blackfire-Response`
    pub fn is_ok(&self) -> bool {
        self.status_code == StatusCode::Ok
    }

    /// Raw status value
    pub fn status_val(&self) -> &str {
        &self.status_val
    }

    /// Status value parsed as a query string
    pub fn status_val_dict(&self) -> &HashMap<String, String> {
        &self.status_val_dict
    }

    /// Look up one status value entry
    pub fn status(&self, key: &str) -> Option<&str> {
        self.status_val_dict.get(key).map(String::as_str)
    }

    /// Mutable access to the argument map, used to merge follow-up responses
    pub fn args_mut(&mut self) -> &mut ArgMap {
        &mut self.args
    }
}

impl Directives for Response {
    const TIMESPAN_KEY: &'static str = "Blackfire-Timespan";
    const FN_ARGS_KEY: &'static str = "Blackfire-Fn-Args";

    fn args(&self) -> &ArgMap {
        &self.args
    }
}

impl Message for Response {
    fn to_bytes(&self) -> Vec<u8> {
        let mut result = match self.status_code {
            StatusCode::Error => format!("{ERROR_STATUS}: "),
            StatusCode::Ok => format!("{RESPONSE_STATUS}: "),
        };
        result.push_str(&self.status_val);

        if !self.args.is_empty() {
            result.push('\n');
        }
        for (key, values) in self.args.iter() {
            for value in values {
                result.push_str(&format!("{key}: {value}\n"));
            }
        }

        result.into_bytes()
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "status_code={:?}, args={:?}, status_val={}",
            self.status_code, self.args, self.status_val
        )
    }
}
