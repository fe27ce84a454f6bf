// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use serde_json::{Map, Value};

// Layer 3: Internal module imports
// (none)

/// Envelope payload: an opaque JSON object.
///
/// Behaviors validate the shape they expect per envelope kind; the runtime
/// itself never interprets payloads beyond the `error_code` convention.
pub type Payload = Map<String, Value>;

/// Build a payload from key/value pairs.
///
/// # Example
/// ```rust
/// use serde_json::json;
/// use weft_rt::message::payload;
///
/// let p = payload::pairs([("operation", json!("increment")), ("params", json!([]))]);
/// assert_eq!(p.get("operation").and_then(|v| v.as_str()), Some("increment"));
/// ```
pub fn pairs<const N: usize>(entries: [(&str, Value); N]) -> Payload {
    let mut payload = Payload::new();
    for (key, value) in entries {
        payload.insert(key.to_owned(), value);
    }
    payload
}

/// Read a string field.
pub fn str_field<'a>(payload: &'a Payload, key: &str) -> Option<&'a str> {
    payload.get(key).and_then(Value::as_str)
}

/// Read a boolean field, defaulting to `false` when absent.
pub fn bool_field(payload: &Payload, key: &str) -> bool {
    payload.get(key).and_then(Value::as_bool).unwrap_or(false)
}

/// Read an unsigned integer field.
pub fn u64_field(payload: &Payload, key: &str) -> Option<u64> {
    payload.get(key).and_then(Value::as_u64)
}

/// Read a nested object field, returning an empty object when absent.
pub fn object_field(payload: &Payload, key: &str) -> Payload {
    payload
        .get(key)
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}
