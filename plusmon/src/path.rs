//! Dotted path traversal of JSON status documents.
//!
//! A path such as `responses.2xx` names a leaf by walking one segment at a
//! time: object members by key, array elements by decimal index. Any miss along
//! the way yields `None`. Fields that only exist in some NGINX Plus releases
//! are therefore simply not reported by older servers.

use serde_json::Value;

/// Walk `path` through `document`, returning the leaf it names.
///
/// Returns `None` if any segment is missing, if an array segment is not a
/// valid index, or if the walk reaches a scalar before the path is exhausted.
#[must_use]
pub fn extract<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(document, step)
}

/// Walk `path` and return the leaf only if it is a JSON number.
#[must_use]
pub fn extract_f64(document: &Value, path: &str) -> Option<f64> {
    extract(document, path).and_then(Value::as_f64)
}

/// Walk `path` and render the leaf as a dimension value.
///
/// Strings are taken verbatim, numbers and booleans are rendered in their JSON
/// form. Null, objects and arrays do not name a dimension.
#[must_use]
pub fn extract_string(document: &Value, path: &str) -> Option<String> {
    extract(document, path).and_then(render)
}

/// Render a scalar the way [`extract_string`] does.
#[must_use]
pub fn render(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn step<'a>(node: &'a Value, segment: &str) -> Option<&'a Value> {
    match node {
        Value::Object(members) => members.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|idx| items.get(idx)),
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => None,
    }
}
