//! Ordered multi-valued argument map.

use serde::ser::{Serialize, SerializeMap, Serializer};

/// Directive arguments carried by an agent response.
///
/// Keys keep their first-seen order and every key keeps all of its values in
/// arrival order, so `fn-args` or `timespan` lines can repeat without
/// overwriting each other.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArgMap {
    entries: Vec<(String, Vec<String>)>,
}

impl ArgMap {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value under `key`
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, values)) => values.push(value),
            None => self.entries.push((key, vec![value])),
        }
    }

    /// All values stored under `key`, empty if the key is absent
    pub fn get(&self, key: &str) -> &[String] {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, values)| values.as_slice())
            .unwrap_or(&[])
    }

    /// Check if `key` has at least one value
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Replace the values of every key present in `other`.
    ///
    /// Keys only `other` knows are appended after the existing ones.
    pub fn update(&mut self, other: ArgMap) {
        for (key, values) in other.entries {
            match self.entries.iter_mut().find(|(k, _)| *k == key) {
                Some((_, existing)) => *existing = values,
                None => self.entries.push((key, values)),
            }
        }
    }

    /// Iterate keys with their values in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(k, values)| (k.as_str(), values.as_slice()))
    }

    /// Number of distinct keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the map holds no keys
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for ArgMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, values) in &self.entries {
            map.serialize_entry(key, values)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeated_keys_accumulate() {
        let mut args = ArgMap::new();
        args.push("fn-args", "file_get_contents 1,2");
        args.push("timespan", "=mysql_connect");
        args.push("fn-args", "PDO::query 1");

        assert_eq!(args.len(), 2);
        assert_eq!(
            args.get("fn-args"),
            ["file_get_contents 1,2", "PDO::query 1"]
        );
        assert!(args.get("missing").is_empty());
    }

    #[test]
    fn test_update_replaces_and_appends() {
        let mut first = ArgMap::new();
        first.push("Blackfire-Fn-Args", "old 1");
        first.push("Blackfire-Keys", "k");

        let mut second = ArgMap::new();
        second.push("Blackfire-Fn-Args", "new 2");
        second.push("Blackfire-Const", "python_version");

        first.update(second);

        let keys: Vec<&str> = first.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ["Blackfire-Fn-Args", "Blackfire-Keys", "Blackfire-Const"]);
        assert_eq!(first.get("Blackfire-Fn-Args"), ["new 2"]);
        assert_eq!(first.get("Blackfire-Keys"), ["k"]);
    }

    #[test]
    fn test_serializes_as_json_object() {
        let mut args = ArgMap::new();
        args.push("a", "1");
        args.push("a", "2");
        let json = serde_json::to_string(&args).unwrap();
        assert_eq!(json, r#"{"a":["1","2"]}"#);
    }
}
