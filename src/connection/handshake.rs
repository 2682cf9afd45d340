//! Hello / configuration-upload messages of the handshake.
//!
//! The exchange itself runs in [`Connection::connect`](super::Connection::connect);
//! this module only decides what the probe says.

use crate::config::{ServerCredentials, SessionConfig};
use crate::protocol::{Request, PROBE_HEADER, QUERY_HEADER};

/// Runtime identity announced in `Blackfire-Probe`
pub const PROBE_RUNTIME: &str = concat!("rust-", env!("CARGO_PKG_VERSION"));

/// Header carrying the server credentials
pub const AUTH_HEADER: &str = "Blackfire-Auth";

/// Header announcing the configuration payload size
pub const YAML_SIZE_HEADER: &str = "Blackfire-Yaml-Size";

/// Inputs of one handshake.
///
/// Server credentials are read from the environment once, when the handshake
/// is created.
#[derive(Debug, Clone)]
pub struct Handshake<'a> {
    config: &'a SessionConfig,
    blackfire_yml: Option<&'a str>,
    credentials: Option<ServerCredentials>,
    runtime: String,
}

impl<'a> Handshake<'a> {
    /// Create a handshake for `config`
    pub fn new(config: &'a SessionConfig) -> Self {
        Self {
            config,
            blackfire_yml: None,
            credentials: ServerCredentials::from_env(),
            runtime: PROBE_RUNTIME.to_string(),
        }
    }

    /// Configuration payload to offer the agent
    pub fn with_blackfire_yml(mut self, content: Option<&'a str>) -> Self {
        self.blackfire_yml = content;
        self
    }

    /// Override the server credentials
    pub fn with_credentials(mut self, credentials: Option<ServerCredentials>) -> Self {
        self.credentials = credentials;
        self
    }

    /// Override the runtime identity
    pub fn with_runtime(mut self, runtime: impl Into<String>) -> Self {
        self.runtime = runtime.into();
        self
    }

    /// Session configuration of this handshake
    pub fn config(&self) -> &SessionConfig {
        self.config
    }

    /// Payload to upload, if the `flag_yml` flag allows it and one exists
    pub fn blackfire_yml(&self) -> Option<&'a str> {
        if !self.config.flag("flag_yml", true) {
            return None;
        }
        self.blackfire_yml.filter(|content| !content.is_empty())
    }

    /// Value of the `Blackfire-Probe` header.
    pub fn probe_header(&self) -> String {
        let mut header = format!("{}, config", self.runtime);

        if self.config.flag("flag_timespan", false) {
            header.push_str(", timespan");
        }
        // Having no payload is expected even with the flag on.
        if self.blackfire_yml().is_some() {
            header.push_str(", blackfire_yml");
        }
        // The agent will not wait for more data once it sees noop.
        if self.config.blackfire_yml_asked {
            header.push_str(", noop");
        }
        if self.config.flag("no_pruning", false) {
            header.push_str(", no_pruning");
        }
        if self.config.flag("no_anon", false) {
            header.push_str(", no_anon");
        }

        header
    }

    /// First request of the handshake
    pub fn hello_request(&self) -> Request {
        let mut request = Request::new()
            .with_header(QUERY_HEADER, self.config.query_header())
            .with_header(PROBE_HEADER, self.probe_header());
        if let Some(credentials) = &self.credentials {
            request.set_header(AUTH_HEADER, credentials.auth_header());
        }
        request
    }

    /// Configuration upload, if there is a payload to upload
    pub fn blackfire_yml_request(&self) -> Option<Request> {
        self.blackfire_yml().map(|content| {
            Request::new()
                .with_header(YAML_SIZE_HEADER, content.len())
                .with_body(content)
        })
    }
}
