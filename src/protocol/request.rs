//! Probe → agent requests.
//!
//! Two framings exist and are kept apart on purpose:
//!
//! - [`Request`]: `file-format` and `Blackfire-Query` lead when present, a
//!   blank line closes the headers, the body follows verbatim.
//! - [`ApmRequest`]: `file-format` always leads and the frame always ends with
//!   `\n\n`, with or without a body.

use std::fmt;

use serde_json::json;

use super::{decode_frame, Message};
use crate::error::{ProbeError, Result};

/// Header holding the signed query
pub const QUERY_HEADER: &str = "Blackfire-Query";

/// Header describing the probe runtime and its enabled features
pub const PROBE_HEADER: &str = "Blackfire-Probe";

/// Header naming the payload format
pub const FILE_FORMAT_HEADER: &str = "file-format";

/// Headers that keep their case; every other name is lower-cased.
const RESERVED_HEADERS: [&str; 2] = [QUERY_HEADER, PROBE_HEADER];

fn normalize_name(name: &str) -> String {
    if RESERVED_HEADERS.contains(&name) {
        name.to_string()
    } else {
        name.to_lowercase()
    }
}

/// Ordered header list with case-folded names
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Headers(Vec<(String, String)>);

impl Headers {
    fn insert(&mut self, name: &str, value: String) {
        let name = normalize_name(name);
        match self.0.iter_mut().find(|(k, _)| *k == name) {
            Some((_, existing)) => *existing = value,
            None => self.0.push((name, value)),
        }
    }

    fn get(&self, name: &str) -> Option<&str> {
        let name = normalize_name(name);
        self.0
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }

    fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// A request frame sent to the agent
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Request {
    headers: Headers,
    body: Option<String>,
}

impl Request {
    /// Create an empty request
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a header, replacing any previous value for the same name
    pub fn with_header(mut self, name: &str, value: impl ToString) -> Self {
        self.set_header(name, value);
        self
    }

    /// Set the body
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Add a header, replacing any previous value for the same name
    pub fn set_header(&mut self, name: &str, value: impl ToString) {
        self.headers.insert(name, value.to_string());
    }

    /// Look up a header by name, using the same case folding as insertion
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Iterate headers in stored order
    pub fn headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter()
    }

    /// Request body, if any
    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    /// Parse a request frame.
    ///
    /// The frame is split on blank lines. One segment is headers only, two
    /// are headers and body, three are headers and a body made of two
    /// sections (timing breakdown and trace) rejoined with a newline. Any
    /// other layout is rejected.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let text = decode_frame(data)?;
        let segments: Vec<&str> = text.split("\n\n").collect();

        let (header_lines, body) = match segments.as_slice() {
            [headers] => (*headers, None),
            [headers, body] => (*headers, Some((*body).to_string())),
            [headers, timespan, trace] => (*headers, Some(format!("{timespan}\n{trace}"))),
            _ => {
                return Err(ProbeError::InvalidMessage(format!(
                    "Invalid request message with {} sections. [{}]",
                    segments.len(),
                    text
                )))
            }
        };

        let mut request = Self::new();
        for line in header_lines.split('\n') {
            if let Some((name, value)) = line.split_once(':') {
                request.set_header(name.trim(), value.trim());
            }
        }
        request.body = body.filter(|b| !b.is_empty());

        Ok(request)
    }
}

impl Message for Request {
    fn to_bytes(&self) -> Vec<u8> {
        let mut result = String::new();

        // The agent reads the first line positionally in some modes.
        if let Some(format) = self.header(FILE_FORMAT_HEADER) {
            result.push_str(&format!("{FILE_FORMAT_HEADER}: {format}\n"));
        }
        if let Some(query) = self.header(QUERY_HEADER) {
            result.push_str(&format!("{QUERY_HEADER}: {query}\n"));
        }
        for (name, value) in self.headers() {
            if name == QUERY_HEADER || name == FILE_FORMAT_HEADER {
                continue;
            }
            result.push_str(&format!("{name}: {value}\n"));
        }
        if !self.headers.0.is_empty() {
            result.push('\n');
        }
        if let Some(body) = self.body.as_deref() {
            result.push_str(body);
        }

        result.into_bytes()
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let headers: serde_json::Map<String, serde_json::Value> = self
            .headers()
            .map(|(k, v)| (k.to_string(), json!(v)))
            .collect();
        let container = json!({ "headers": headers, "data": self.body });
        match serde_json::to_string_pretty(&container) {
            Ok(text) => f.write_str(&text),
            Err(_) => Err(fmt::Error),
        }
    }
}

/// A request frame in the APM dialect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApmRequest {
    file_format: String,
    headers: Headers,
    body: Option<String>,
}

impl ApmRequest {
    /// Create an APM request for the given payload format
    pub fn new(file_format: impl Into<String>) -> Self {
        Self {
            file_format: file_format.into(),
            headers: Headers::default(),
            body: None,
        }
    }

    /// Add a header. A `file-format` header replaces the payload format.
    pub fn with_header(mut self, name: &str, value: impl ToString) -> Self {
        let value = value.to_string();
        if normalize_name(name) == FILE_FORMAT_HEADER {
            self.file_format = value;
        } else {
            self.headers.insert(name, value);
        }
        self
    }

    /// Set the body
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Payload format announced on the first line
    pub fn file_format(&self) -> &str {
        &self.file_format
    }

    /// Look up a header by name
    pub fn header(&self, name: &str) -> Option<&str> {
        if normalize_name(name) == FILE_FORMAT_HEADER {
            return Some(&self.file_format);
        }
        self.headers.get(name)
    }
}

impl Message for ApmRequest {
    fn to_bytes(&self) -> Vec<u8> {
        let mut result = format!("{FILE_FORMAT_HEADER}: {}\n", self.file_format);
        for (name, value) in self.headers.iter() {
            result.push_str(&format!("{name}: {value}\n"));
        }
        if let Some(body) = self.body.as_deref() {
            result.push_str(body);
        }
        result.push_str("\n\n");

        result.into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_reserved_headers_keep_case() {
        let request = Request::new()
            .with_header("Blackfire-Query", "q")
            .with_header("Blackfire-Probe", "rust, config")
            .with_header("Blackfire-Yaml-Size", 12);

        let names: Vec<&str> = request.headers().map(|(k, _)| k).collect();
        assert_eq!(names, ["Blackfire-Query", "Blackfire-Probe", "blackfire-yaml-size"]);
        assert_eq!(request.header("BLACKFIRE-YAML-SIZE"), Some("12"));
    }

    #[test]
    fn test_leading_headers_order() {
        let request = Request::new()
            .with_header("A", "b")
            .with_header("Blackfire-Query", "q")
            .with_header("file-format", "x");

        let bytes = request.to_bytes();
        assert_eq!(bytes, b"file-format: x\nBlackfire-Query: q\na: b\n\n");
    }

    #[test]
    fn test_body_follows_blank_line() {
        let request = Request::new()
            .with_header("Blackfire-Yaml-Size", 9)
            .with_body("tests: {}");
        assert_eq!(request.to_bytes(), b"blackfire-yaml-size: 9\n\ntests: {}");
    }

    #[test]
    fn test_empty_request_is_empty() {
        assert!(Request::new().to_bytes().is_empty());
        assert_eq!(Request::new().with_body("raw").to_bytes(), b"raw");
    }

    #[test]
    fn test_roundtrip_headers_only() {
        let request = Request::new()
            .with_header("file-format", "x")
            .with_header("Blackfire-Query", "q")
            .with_header("A", "b");

        let parsed = Request::from_bytes(&request.to_bytes()).unwrap();
        assert_eq!(parsed.header("file-format"), Some("x"));
        assert_eq!(parsed.header("Blackfire-Query"), Some("q"));
        assert_eq!(parsed.header("a"), Some("b"));
        assert_eq!(parsed.header("A"), Some("b"));
        assert_eq!(parsed.body(), None);
    }

    #[test]
    fn test_parse_with_body() {
        let parsed = Request::from_bytes(b"file-format: BlackfireProbe\nCost-Dimensions: wt\n\nmain()//1 10").unwrap();
        assert_eq!(parsed.header("cost-dimensions"), Some("wt"));
        assert_eq!(parsed.body(), Some("main()//1 10"));
    }

    #[test]
    fn test_parse_three_sections_rejoins_body() {
        let parsed =
            Request::from_bytes(b"file-format: BlackfireProbe\n\nThreshold-1-start: 1\n\nmain()//1 10")
                .unwrap();
        assert_eq!(parsed.body(), Some("Threshold-1-start: 1\nmain()//1 10"));
    }

    #[test]
    fn test_parse_rejects_four_sections() {
        let err = Request::from_bytes(b"a: b\n\nc\n\nd\n\ne").unwrap_err();
        assert!(matches!(err, ProbeError::InvalidMessage(_)));
    }

    #[test]
    fn test_parse_ignores_lines_without_colon() {
        let parsed = Request::from_bytes(b"a: b\ngarbage\nc: d:e").unwrap();
        assert_eq!(parsed.header("a"), Some("b"));
        assert_eq!(parsed.header("c"), Some("d:e"));
        assert_eq!(parsed.headers().count(), 2);
    }

    #[test]
    fn test_display_is_json() {
        let request = Request::new().with_header("a", "b").with_body("x");
        let value: serde_json::Value = serde_json::from_str(&request.to_string()).unwrap();
        assert_eq!(value["headers"]["a"], "b");
        assert_eq!(value["data"], "x");
    }

    #[test]
    fn test_apm_request_always_terminated() {
        let request = ApmRequest::new("BlackfireApm").with_header("sample-rate", "1.0");
        assert_eq!(
            request.to_bytes(),
            b"file-format: BlackfireApm\nsample-rate: 1.0\n\n\n"
        );

        let with_body = ApmRequest::new("BlackfireApmTrace")
            .with_header("Content-Length", 4)
            .with_body("data");
        assert_eq!(
            with_body.to_bytes(),
            b"file-format: BlackfireApmTrace\ncontent-length: 4\ndata\n\n"
        );
    }

    #[test]
    fn test_apm_request_file_format_header_is_first_line() {
        let request = ApmRequest::new("a").with_header("x", "y").with_header("File-Format", "b");
        assert_eq!(request.file_format(), "b");
        assert_eq!(request.header("file-format"), Some("b"));
        assert!(request.to_bytes().starts_with(b"file-format: b\nx: y\n"));
    }

    proptest! {
        #[test]
        fn prop_leading_headers_come_first(
            names in proptest::collection::vec("[a-z]{1,8}", 0..6),
            query_at in 0usize..6,
            format_at in 0usize..6,
        ) {
            let mut request = Request::new();
            for (i, name) in names.iter().enumerate() {
                if i == query_at {
                    request.set_header(QUERY_HEADER, "q");
                }
                if i == format_at {
                    request.set_header(FILE_FORMAT_HEADER, "f");
                }
                request.set_header(name, "v");
            }
            request.set_header(QUERY_HEADER, "q");
            request.set_header(FILE_FORMAT_HEADER, "f");

            let bytes = request.to_bytes();
            prop_assert!(bytes.starts_with(b"file-format: f\nBlackfire-Query: q\n"));
            prop_assert!(bytes.ends_with(b"\n\n"));
        }
    }
}
