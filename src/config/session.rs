//! Per-profile session configuration.

use std::collections::HashMap;

use crate::error::{ProbeError, Result};

/// Environment variable holding the server id
pub const SERVER_ID_ENV: &str = "BLACKFIRE_SERVER_ID";

/// Environment variable holding the server token
pub const SERVER_TOKEN_ENV: &str = "BLACKFIRE_SERVER_TOKEN";

const SIGNATURE_MARKER: &str = "&signature=";

/// Session parameters of one profile, fixed for the whole handshake.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionConfig {
    /// Signed challenge, as received
    pub challenge_raw: String,
    /// Signature of the challenge
    pub signature: String,
    /// Remaining query arguments, as received
    pub args_raw: String,
    /// Decoded query arguments, including the feature flags
    pub args: HashMap<String, String>,
    /// The configuration payload was already requested out-of-band
    pub blackfire_yml_asked: bool,
}

impl SessionConfig {
    /// Create a session from its raw parts.
    pub fn new(
        challenge_raw: impl Into<String>,
        signature: impl Into<String>,
        args_raw: impl Into<String>,
    ) -> Self {
        let args_raw = args_raw.into();
        Self {
            challenge_raw: challenge_raw.into(),
            signature: signature.into(),
            args: decode_args(&args_raw),
            args_raw,
            blackfire_yml_asked: false,
        }
    }

    /// Parse a full query of the form `<challenge>&signature=<sig>&<args>`.
    pub fn from_query(query: &str) -> Result<Self> {
        let (challenge, rest) = query.split_once(SIGNATURE_MARKER).ok_or_else(|| {
            ProbeError::Config(format!("query has no signature. [{query}]"))
        })?;
        let (signature, args_raw) = rest.split_once('&').unwrap_or((rest, ""));
        if signature.is_empty() {
            return Err(ProbeError::Config(format!("query has an empty signature. [{query}]")));
        }

        Ok(Self::new(challenge, signature, args_raw))
    }

    /// Set a flag argument
    pub fn with_flag(mut self, name: &str, enabled: bool) -> Self {
        self.args
            .insert(name.to_string(), if enabled { "1" } else { "0" }.to_string());
        self
    }

    /// Record that the configuration payload was already requested
    pub fn with_blackfire_yml_asked(mut self, asked: bool) -> Self {
        self.blackfire_yml_asked = asked;
        self
    }

    /// Read a `"0"`/`"1"` flag, falling back to `default` when absent.
    ///
    /// Any other integer counts as enabled when non-zero. A value that is not
    /// an integer is logged and treated as absent.
    pub fn flag(&self, name: &str, default: bool) -> bool {
        match self.args.get(name) {
            None => default,
            Some(value) => match value.trim().parse::<i64>() {
                Ok(n) => n != 0,
                Err(_) => {
                    tracing::warn!("Ignoring non-integer flag {}={:?}.", name, value);
                    default
                }
            },
        }
    }

    /// Value of the `Blackfire-Query` header
    pub fn query_header(&self) -> String {
        format!(
            "{}&signature={}&{}",
            self.challenge_raw, self.signature, self.args_raw
        )
    }
}

fn decode_args(args_raw: &str) -> HashMap<String, String> {
    url::form_urlencoded::parse(args_raw.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

/// Server credentials attached as `Blackfire-Auth`.
#[derive(Clone, PartialEq, Eq)]
pub struct ServerCredentials {
    /// Server id
    pub id: String,
    /// Server token
    pub token: String,
}

impl ServerCredentials {
    /// Create credentials; both parts must be non-empty
    pub fn new(id: impl Into<String>, token: impl Into<String>) -> Option<Self> {
        let id = id.into();
        let token = token.into();
        if id.is_empty() || token.is_empty() {
            return None;
        }
        Some(Self { id, token })
    }

    /// Read both parts from the environment
    pub fn from_env() -> Option<Self> {
        let id = std::env::var(SERVER_ID_ENV).ok()?;
        let token = std::env::var(SERVER_TOKEN_ENV).ok()?;
        Self::new(id, token)
    }

    /// Value of the `Blackfire-Auth` header
    pub fn auth_header(&self) -> String {
        format!("{}:{}", self.id, self.token)
    }
}

impl std::fmt::Debug for ServerCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerCredentials")
            .field("id", &self.id)
            .field("token", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_query() {
        let config = SessionConfig::from_query(
            "expires=1700000000&userId=42&signature=abcdef&flag_timespan=1&no_pruning=0&profile_title=My+page",
        )
        .unwrap();

        assert_eq!(config.challenge_raw, "expires=1700000000&userId=42");
        assert_eq!(config.signature, "abcdef");
        assert_eq!(config.args_raw, "flag_timespan=1&no_pruning=0&profile_title=My+page");
        assert_eq!(config.args["profile_title"], "My page");
        assert!(config.flag("flag_timespan", false));
        assert!(!config.flag("no_pruning", true));
        assert!(config.flag("flag_yml", true));
    }

    #[test]
    fn test_from_query_without_args() {
        let config = SessionConfig::from_query("c=1&signature=sig").unwrap();
        assert_eq!(config.signature, "sig");
        assert_eq!(config.args_raw, "");
        assert_eq!(config.query_header(), "c=1&signature=sig&");
    }

    #[test]
    fn test_from_query_requires_signature() {
        assert!(matches!(
            SessionConfig::from_query("c=1&flag_yml=0"),
            Err(ProbeError::Config(_))
        ));
        assert!(matches!(
            SessionConfig::from_query("c=1&signature=&x=1"),
            Err(ProbeError::Config(_))
        ));
    }

    #[test]
    fn test_flag_parsing() {
        let mut config = SessionConfig::new("c", "s", "a=1&b=0&c=2&d=yes");
        assert!(config.flag("a", false));
        assert!(!config.flag("b", true));
        assert!(config.flag("c", false));
        assert!(config.flag("d", true));
        assert!(!config.flag("d", false));

        config = config.with_flag("b", true);
        assert!(config.flag("b", false));
    }

    #[test]
    fn test_query_header() {
        let config = SessionConfig::new("challenge", "sig", "flag_yml=0");
        assert_eq!(config.query_header(), "challenge&signature=sig&flag_yml=0");
    }

    #[test]
    fn test_credentials_need_both_parts() {
        assert!(ServerCredentials::new("id", "").is_none());
        assert!(ServerCredentials::new("", "token").is_none());

        let creds = ServerCredentials::new("id", "token").unwrap();
        assert_eq!(creds.auth_header(), "id:token");
        assert!(!format!("{creds:?}").contains("\"token\""));
    }

    #[test]
    fn test_credentials_from_env() {
        std::env::set_var(SERVER_ID_ENV, "env-id");
        std::env::set_var(SERVER_TOKEN_ENV, "env-token");
        let creds = ServerCredentials::from_env().unwrap();
        assert_eq!(creds.auth_header(), "env-id:env-token");

        std::env::set_var(SERVER_TOKEN_ENV, "");
        assert!(ServerCredentials::from_env().is_none());

        std::env::remove_var(SERVER_TOKEN_ENV);
        assert!(ServerCredentials::from_env().is_none());

        std::env::remove_var(SERVER_ID_ENV);
    }
}
