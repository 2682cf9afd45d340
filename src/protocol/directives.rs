//! Instrumentation directives carried by agent responses.
//!
//! Both response dialects expose the same accessors over their argument map;
//! only the key names differ. A malformed directive never fails the frame it
//! came in: it is logged, skipped and reported in the accessor's `ignored`
//! list.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use super::ArgMap;

/// One entry of a function's argument list
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum ArgId {
    /// Positional argument index
    Index(u32),
    /// Named argument token
    Name(String),
}

impl ArgId {
    fn parse(token: &str) -> Self {
        if !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(index) = token.parse() {
                return Self::Index(index);
            }
        }
        Self::Name(token.to_string())
    }
}

/// Timespan selectors split by match kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TimespanSelectors {
    /// `^` selectors, matched as prefixes
    pub prefix: BTreeSet<String>,
    /// `=` selectors, matched exactly
    pub exact: BTreeSet<String>,
    /// Selectors without a known sigil
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ignored: Vec<String>,
}

impl TimespanSelectors {
    /// Check a function name against both selector sets
    pub fn matches(&self, name: &str) -> bool {
        self.exact.contains(name) || self.prefix.iter().any(|p| name.starts_with(p.as_str()))
    }
}

/// Functions whose arguments must be captured
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InstrumentedFunctions {
    /// Function name to the ordered list of captured arguments
    pub functions: BTreeMap<String, Vec<ArgId>>,
    /// Directives that were skipped
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ignored: Vec<String>,
}

/// Directive accessors shared by both response dialects.
pub trait Directives {
    /// Key of timespan selector lines
    const TIMESPAN_KEY: &'static str;
    /// Key of function argument lines
    const FN_ARGS_KEY: &'static str;
    /// Key of constant lines
    const CONSTANTS_KEY: &'static str = "Blackfire-Const";

    /// Argument map of the response
    fn args(&self) -> &ArgMap;

    /// Timespan selectors, grouped by sigil.
    fn timespan_selectors(&self) -> TimespanSelectors {
        parse_timespan_selectors(self.args().get(Self::TIMESPAN_KEY))
    }

    /// Constants the agent wants reported, as sent.
    fn constants(&self) -> &[String] {
        self.args().get(Self::CONSTANTS_KEY)
    }

    /// Function argument directives.
    fn instrumented_functions(&self) -> InstrumentedFunctions {
        parse_instrumented_functions(self.args().get(Self::FN_ARGS_KEY))
    }
}

/// Group selectors by their leading `^` or `=` sigil.
pub(crate) fn parse_timespan_selectors(selectors: &[String]) -> TimespanSelectors {
    let mut result = TimespanSelectors::default();

    for selector in selectors {
        if let Some(rest) = selector.strip_prefix('^') {
            result.prefix.insert(rest.to_string());
        } else if let Some(rest) = selector.strip_prefix('=') {
            result.exact.insert(rest.to_string());
        } else {
            tracing::warn!("Ignoring invalid timespan selector '{}'.", selector);
            result.ignored.push(selector.clone());
        }
    }

    result
}

/// Build the function → argument list map.
///
/// Each directive is `<function> <id>,<id>,...`; the function part may itself
/// contain spaces, so the split happens on the last whitespace run.
pub(crate) fn parse_instrumented_functions(directives: &[String]) -> InstrumentedFunctions {
    let mut result = InstrumentedFunctions::default();

    for directive in directives {
        let Some((name, ids)) = directive.trim_end().rsplit_once(char::is_whitespace) else {
            tracing::warn!("Ignoring malformed fn-args directive '{}'.", directive);
            result.ignored.push(directive.clone());
            continue;
        };
        let name = name.trim();

        if result.functions.contains_key(name) {
            tracing::warn!(
                "Function '{}' is already instrumented. Ignoring fn-args directive {}.",
                name,
                directive
            );
            result.ignored.push(directive.clone());
            continue;
        }

        let ids = ids.trim().split(',').map(ArgId::parse).collect();
        result.functions.insert(name.to_string(), ids);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_timespan_selectors() {
        let selectors = parse_timespan_selectors(&strings(&["^PDO::", "=mysql_connect", "bogus"]));

        assert_eq!(selectors.prefix, BTreeSet::from(["PDO::".to_string()]));
        assert_eq!(selectors.exact, BTreeSet::from(["mysql_connect".to_string()]));
        assert_eq!(selectors.ignored, ["bogus"]);
    }

    #[test]
    fn test_timespan_empty_selector_ignored() {
        let selectors = parse_timespan_selectors(&strings(&["", "^"]));
        assert_eq!(selectors.ignored, [""]);
        assert!(selectors.prefix.contains(""));
    }

    #[test]
    fn test_timespan_matches() {
        let selectors = parse_timespan_selectors(&strings(&["^PDO::", "=mysql_connect"]));
        assert!(selectors.matches("PDO::query"));
        assert!(selectors.matches("mysql_connect"));
        assert!(!selectors.matches("mysql_connect_db"));
    }

    #[test]
    fn test_instrumented_functions_mixed_ids() {
        let funcs = parse_instrumented_functions(&strings(&[
            "file_get_contents 1,2",
            "PDO::query 1",
            "requests.Session.send  request,0",
        ]));

        assert_eq!(
            funcs.functions["file_get_contents"],
            [ArgId::Index(1), ArgId::Index(2)]
        );
        assert_eq!(funcs.functions["PDO::query"], [ArgId::Index(1)]);
        assert_eq!(
            funcs.functions["requests.Session.send"],
            [ArgId::Name("request".to_string()), ArgId::Index(0)]
        );
        assert!(funcs.ignored.is_empty());
    }

    #[test]
    fn test_instrumented_functions_duplicate_and_malformed() {
        let funcs = parse_instrumented_functions(&strings(&["foo 0,1", "foo 2", "lonely"]));

        assert_eq!(funcs.functions.len(), 1);
        assert_eq!(funcs.functions["foo"], [ArgId::Index(0), ArgId::Index(1)]);
        assert_eq!(funcs.ignored, ["foo 2", "lonely"]);
    }

    #[test]
    fn test_arg_id_overflow_stays_a_name() {
        assert_eq!(ArgId::parse("7"), ArgId::Index(7));
        assert_eq!(
            ArgId::parse("99999999999"),
            ArgId::Name("99999999999".to_string())
        );
        assert_eq!(ArgId::parse("-1"), ArgId::Name("-1".to_string()));
    }

    #[test]
    fn test_serialize_instrumented_functions() {
        let funcs = parse_instrumented_functions(&strings(&["foo 0,bar"]));
        let json = serde_json::to_value(&funcs).unwrap();
        assert_eq!(json, serde_json::json!({ "functions": { "foo": [0, "bar"] } }));
    }
}
