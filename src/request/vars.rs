//! Flat environment-variable map handed to executed scripts.
//!
//! Every key is `<PREFIX>_<SUFFIX>`. The suffixes are a contract with the
//! scripts reading them:
//!
//! | Suffix                    | Source                          |
//! |---------------------------|---------------------------------|
//! | `URL_PATH`                | request path                    |
//! | `URL_SEGMENT_<i>`         | path segment `i`, zero-based    |
//! | `URL_SEGMENT_COUNT`       | number of path segments         |
//! | `PARAM_<name>`            | path parameter                  |
//! | `PATH_PARAMS_JSON`        | all path parameters as JSON     |
//! | `QUERY_<name>`            | first query value               |
//! | `FORM_<name>`             | first form value                |
//! | `JSON_<name>`             | top-level JSON body field       |
//! | `JSON_BODY`               | raw JSON body                   |
//! | `HEADER_<UPPER_SNAKE>`    | request header                  |
//! | `VAR_<name>`              | render callback value           |

use std::collections::BTreeMap;
use std::collections::btree_map;

use serde_json::Value;

pub(crate) const URL_PATH: &str = "URL_PATH";
pub(crate) const URL_SEGMENT: &str = "URL_SEGMENT_";
pub(crate) const URL_SEGMENT_COUNT: &str = "URL_SEGMENT_COUNT";
pub(crate) const PARAM: &str = "PARAM_";
pub(crate) const PATH_PARAMS_JSON: &str = "PATH_PARAMS_JSON";
pub(crate) const QUERY: &str = "QUERY_";
pub(crate) const FORM: &str = "FORM_";
pub(crate) const JSON: &str = "JSON_";
pub(crate) const JSON_BODY: &str = "JSON_BODY";
pub(crate) const HEADER: &str = "HEADER_";
pub(crate) const VAR: &str = "VAR_";

/// Ordered map of prefixed environment variables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvVars {
    prefix: String,
    vars: BTreeMap<String, String>,
}

impl EnvVars {
    /// An empty map whose keys are prefixed with `prefix`.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            vars: BTreeMap::new(),
        }
    }

    /// The key prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Full key for `suffix`.
    pub fn key(&self, suffix: &str) -> String {
        format!("{}_{}", self.prefix, suffix)
    }

    /// Set `<PREFIX>_<suffix>`, replacing any previous value.
    pub fn set(&mut self, suffix: &str, value: impl Into<String>) {
        self.vars.insert(self.key(suffix), value.into());
    }

    /// Set `<PREFIX>_<suffix>` unless it is already present.
    ///
    /// Returns whether the value was inserted.
    pub fn set_if_absent(&mut self, suffix: &str, value: impl Into<String>) -> bool {
        match self.vars.entry(self.key(suffix)) {
            btree_map::Entry::Occupied(_) => false,
            btree_map::Entry::Vacant(slot) => {
                slot.insert(value.into());
                true
            }
        }
    }

    /// Set `<PREFIX>_<suffix>` from a JSON value: strings raw, anything else serialized.
    pub fn set_json(&mut self, suffix: &str, value: &Value) {
        self.set(suffix, json_scalar(value));
    }

    /// Value of `<PREFIX>_<suffix>`.
    pub fn get(&self, suffix: &str) -> Option<&str> {
        self.vars.get(&self.key(suffix)).map(String::as_str)
    }

    /// Value of a full key.
    pub fn get_raw(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Get the number of variables.
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Iterate over full keys and values in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// The underlying map of full keys.
    pub fn into_map(self) -> BTreeMap<String, String> {
        self.vars
    }
}

impl<'a> IntoIterator for &'a EnvVars {
    type Item = (&'a String, &'a String);
    type IntoIter = btree_map::Iter<'a, String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.vars.iter()
    }
}

/// `Content-Type` becomes `CONTENT_TYPE`.
pub fn header_suffix(name: &str) -> String {
    name.to_ascii_uppercase().replace('-', "_")
}

/// Strings pass through raw, every other value is serialized as JSON.
pub fn json_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_prefixed_keys() {
        let mut vars = EnvVars::new("APP");
        vars.set("URL_PATH", "/a");
        assert_eq!(vars.get_raw("APP_URL_PATH"), Some("/a"));
        assert_eq!(vars.get("URL_PATH"), Some("/a"));
    }

    #[test]
    fn test_set_if_absent() {
        let mut vars = EnvVars::new("P");
        assert!(vars.set_if_absent("FORM_a", "1"));
        assert!(!vars.set_if_absent("FORM_a", "2"));
        assert_eq!(vars.get("FORM_a"), Some("1"));
    }

    #[test]
    fn test_json_scalar() {
        assert_eq!(json_scalar(&json!("plain")), "plain");
        assert_eq!(json_scalar(&json!(42)), "42");
        assert_eq!(json_scalar(&json!(true)), "true");
        assert_eq!(json_scalar(&json!({"a": [1, 2]})), r#"{"a":[1,2]}"#);
        assert_eq!(json_scalar(&Value::Null), "null");
    }

    #[test]
    fn test_header_suffix() {
        assert_eq!(header_suffix("content-type"), "CONTENT_TYPE");
        assert_eq!(header_suffix("X-Request-Id"), "X_REQUEST_ID");
    }
}
