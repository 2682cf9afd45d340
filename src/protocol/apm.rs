//! Multi-section (APM) agent response.
//!
//! ```text
//! Blackfire-Response: success=true&update_config=false
//! timespan: =mysql_connect
//! fn-args: PDO::query 1
//! key-page(
//! key: 3b1b2ad1
//! ttl: 120
//! )
//! ```
//!
//! A failed exchange never produces an `ApmResponse`: `Blackfire-Error` and
//! `success=false` status lines are turned into errors while parsing.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use super::{decode_frame, parse_status_value, split_arg_line, ArgMap, Directives, ERROR_STATUS};
use crate::error::{ProbeError, Result};

/// Opens a page block
pub const KEY_PAGE_START: &str = "key-page(";

/// Closes a page block
pub const KEY_PAGE_END: &str = ")";

const NO_ERROR_TEXT: &str = "status=False and no error received from Agent.";

/// A parsed multi-section response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApmResponse {
    raw_data: String,
    status_val: String,
    status_val_dict: HashMap<String, String>,
    update_config: bool,
    args: ArgMap,
    key_pages: Vec<BTreeMap<String, String>>,
}

impl ApmResponse {
    /// Parse a multi-section response frame.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let raw_data = decode_frame(data)?.trim().to_string();
        let mut lines = raw_data.split('\n');

        let status_line = lines.next().unwrap_or_default();
        let (resp_type, resp_val) = split_arg_line(status_line).ok_or_else(|| {
            ProbeError::InvalidMessage(format!("Missing status line in APM response. [{raw_data}]"))
        })?;

        if resp_type == ERROR_STATUS {
            return Err(ProbeError::ApmAgentError(resp_val.to_string()));
        }

        let status_val = resp_val.to_string();
        let status_val_dict = parse_status_value(&status_val);

        let success = status_val_dict.get("success").ok_or_else(|| {
            ProbeError::InvalidMessage(format!("APM response has no success status. [{status_val}]"))
        })?;
        if success.contains("false") {
            let reason = status_val_dict
                .get("error")
                .cloned()
                .unwrap_or_else(|| NO_ERROR_TEXT.to_string());
            return Err(ProbeError::ApmStatusFalse(reason));
        }

        let update_config = status_val_dict
            .get("update_config")
            .is_some_and(|v| v != "false");

        let mut args = ArgMap::new();
        let mut key_pages = Vec::new();
        let mut key_page: Option<BTreeMap<String, String>> = None;

        for line in lines {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if line.starts_with(KEY_PAGE_START) {
                if key_page.is_some() {
                    tracing::warn!("Unterminated key-page discarded.");
                }
                key_page = Some(BTreeMap::new());
                continue;
            }
            if line.starts_with(KEY_PAGE_END) {
                let page = key_page.take().ok_or_else(|| {
                    ProbeError::InvalidMessage(format!(
                        "key-page closed without being opened. [{raw_data}]"
                    ))
                })?;
                key_pages.push(page);
                continue;
            }

            let (key, value) = split_arg_line(line).ok_or_else(|| {
                ProbeError::InvalidMessage(format!("Malformed APM response line '{line}'."))
            })?;
            match key_page.as_mut() {
                Some(page) => {
                    page.insert(key.to_string(), value.to_string());
                }
                None => args.push(key, value),
            }
        }

        if key_page.is_some() {
            tracing::warn!("Unterminated key-page discarded.");
        }

        Ok(Self {
            raw_data,
            status_val,
            status_val_dict,
            update_config,
            args,
            key_pages,
        })
    }

    /// Response text as received, trimmed
    pub fn raw_data(&self) -> &str {
        &self.raw_data
    }

    /// Raw status value
    pub fn status_val(&self) -> &str {
        &self.status_val
    }

    /// Status value parsed as a query string
    pub fn status_val_dict(&self) -> &HashMap<String, String> {
        &self.status_val_dict
    }

    /// Check if the agent asked the probe to refresh its configuration
    pub fn update_config(&self) -> bool {
        self.update_config
    }

    /// Page blocks in the order received
    pub fn key_pages(&self) -> &[BTreeMap<String, String>] {
        &self.key_pages
    }
}

impl Directives for ApmResponse {
    const TIMESPAN_KEY: &'static str = "timespan";
    const FN_ARGS_KEY: &'static str = "fn-args";

    fn args(&self) -> &ArgMap {
        &self.args
    }
}

impl fmt::Display for ApmResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw_data)
    }
}
