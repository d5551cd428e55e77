//! Ordered nested key-value documents with dotted-path addressing.
//!
//! Job parameters and outputs are free-form JSON documents whose keys are
//! addressed by dotted paths (e.g. `depthFilter.comparison`). `set` creates
//! intermediate objects on demand; `get` walks objects and array indices.
//! Key order is preserved.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A nested key-value document rooted at a JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub struct Document(Value);

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// An empty document (`{}`).
    pub fn new() -> Self {
        Self(Value::Object(Map::new()))
    }

    /// Build a document from a JSON value. Anything but an object becomes
    /// an empty document.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(Value::Object(map)),
            _ => Self::new(),
        }
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        matches!(&self.0, Value::Object(map) if map.is_empty())
    }

    /// Get the value at a dotted path, walking nested objects and numeric
    /// array indices.
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut current = &self.0;
        for segment in path.split('.') {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Get the value at a dotted path, falling back to `default` when the
    /// path is absent or null.
    pub fn get_or(&self, path: &str, default: Value) -> Value {
        match self.get(path) {
            Some(Value::Null) | None => default,
            Some(value) => value.clone(),
        }
    }

    /// Set the value at a dotted path, creating intermediate objects as
    /// needed. Non-object intermediates are replaced.
    pub fn set(&mut self, path: &str, value: impl Into<Value>) {
        let segments: Vec<&str> = path.split('.').collect();
        set_path(&mut self.0, &segments, value.into());
    }

    /// Set multiple dotted-path entries at once.
    pub fn set_many<P, V, I>(&mut self, entries: I)
    where
        P: AsRef<str>,
        V: Into<Value>,
        I: IntoIterator<Item = (P, V)>,
    {
        for (path, value) in entries {
            self.set(path.as_ref(), value);
        }
    }

    /// Build an object keyed by the requested dotted paths, filling absent
    /// paths with `default`.
    pub fn slice(&self, paths: &[&str], default: Value) -> Value {
        let mut out = Map::new();
        for path in paths {
            out.insert(path.to_string(), self.get_or(path, default.clone()));
        }
        Value::Object(out)
    }

    // -----------------------------------------------------------------------
    // Typed accessors with lenient coercion
    // -----------------------------------------------------------------------

    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(Value::as_str)
    }

    /// Boolean coercion: JSON booleans, 0/1 numbers and the usual string
    /// spellings all count.
    pub fn get_bool_or(&self, path: &str, default: bool) -> bool {
        match self.get(path) {
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(default),
            Some(Value::String(s)) => match s.as_str() {
                "" | "0" | "false" => false,
                "1" | "true" => true,
                _ => default,
            },
            _ => default,
        }
    }

    pub fn get_i64_or(&self, path: &str, default: i64) -> i64 {
        match self.get(path) {
            Some(Value::Number(n)) => n.as_i64().unwrap_or(default),
            Some(Value::String(s)) => s.parse().unwrap_or(default),
            _ => default,
        }
    }

    pub fn get_f64_or(&self, path: &str, default: f64) -> f64 {
        match self.get(path) {
            Some(Value::Number(n)) => n.as_f64().unwrap_or(default),
            Some(Value::String(s)) => s.parse().unwrap_or(default),
            _ => default,
        }
    }
}

fn set_path(target: &mut Value, segments: &[&str], value: Value) {
    let Some((head, rest)) = segments.split_first() else {
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(map) = target {
        if rest.is_empty() {
            map.insert((*head).to_string(), value);
        } else {
            let child = map
                .entry((*head).to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            set_path(child, rest, value);
        }
    }
}

impl From<Value> for Document {
    fn from(value: Value) -> Self {
        Self::from_value(value)
    }
}

impl From<Document> for Value {
    fn from(doc: Document) -> Self {
        doc.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_dotted_path_creates_nesting() {
        let mut doc = Document::new();
        doc.set("a.b", 1);
        assert_eq!(doc.get("a.b"), Some(&json!(1)));
        assert_eq!(doc.as_value(), &json!({"a": {"b": 1}}));
    }

    #[test]
    fn set_overwrites_existing_leaf() {
        let mut doc = Document::from_value(json!({"a": {"b": 1}}));
        doc.set("a.b", 2);
        assert_eq!(doc.get("a.b"), Some(&json!(2)));
    }

    #[test]
    fn get_walks_array_indices() {
        let doc = Document::from_value(json!({"jobs": [10, 20]}));
        assert_eq!(doc.get("jobs.1"), Some(&json!(20)));
        assert_eq!(doc.get("jobs.5"), None);
    }

    #[test]
    fn get_or_falls_back_on_missing_and_null() {
        let doc = Document::from_value(json!({"a": null}));
        assert_eq!(doc.get_or("a", json!(7)), json!(7));
        assert_eq!(doc.get_or("b", json!(7)), json!(7));
    }

    #[test]
    fn slice_keys_by_dotted_path() {
        let mut doc = Document::new();
        doc.set("x.y", 2);
        let slice = doc.slice(&["x.y", "missing"], json!(0));
        assert_eq!(slice, json!({"x.y": 2, "missing": 0}));
    }

    #[test]
    fn set_many_applies_flat_dotted_entries() {
        let mut doc = Document::new();
        doc.set_many([("a.b", json!(1)), ("c", json!("z"))]);
        assert_eq!(doc.get("a.b"), Some(&json!(1)));
        assert_eq!(doc.get_str("c"), Some("z"));
    }

    #[test]
    fn non_object_roots_become_empty() {
        let doc = Document::from_value(json!([1, 2, 3]));
        assert!(doc.is_empty());
    }

    #[test]
    fn preserves_insertion_order() {
        let mut doc = Document::new();
        doc.set("z", 1);
        doc.set("a", 2);
        let keys: Vec<&String> = doc.as_value().as_object().unwrap().keys().collect();
        assert_eq!(keys, ["z", "a"]);
    }

    #[test]
    fn bool_coercion() {
        let doc = Document::from_value(json!({"a": "1", "b": 0, "c": true, "d": ""}));
        assert!(doc.get_bool_or("a", false));
        assert!(!doc.get_bool_or("b", true));
        assert!(doc.get_bool_or("c", false));
        assert!(!doc.get_bool_or("d", true));
        assert!(doc.get_bool_or("missing", true));
    }

    #[test]
    fn numeric_coercion_from_strings() {
        let doc = Document::from_value(json!({"threads": "4", "value": "0.4"}));
        assert_eq!(doc.get_i64_or("threads", 1), 4);
        assert!((doc.get_f64_or("value", 0.0) - 0.4).abs() < f64::EPSILON);
    }
}
