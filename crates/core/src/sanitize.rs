//! Persisted-payload sanitization.
//!
//! Generation rows keep a copy of the input, output, and the request body
//! actually sent to the provider. Raw media payloads (base64 blobs, inline
//! bytes) must never land in those relational columns, so any oversized
//! string that is not a URL and not an always-keep text field is replaced
//! by a size marker before storage.

use serde_json::Value;

/// Strings longer than this are candidates for removal, in bytes.
pub const LARGE_STRING_THRESHOLD: usize = 2048;

/// Keys whose string values are kept regardless of length.
const KEEP_KEYS: &[&str] = &["prompt", "text", "negative_prompt"];

/// Recursively replace oversized non-URL strings with
/// `[LARGE_DATA_REMOVED_<n>_BYTES]` markers.
pub fn sanitize_payload(value: &Value) -> Value {
    sanitize_inner(value, None)
}

fn sanitize_inner(value: &Value, key: Option<&str>) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), sanitize_inner(v, Some(k))))
                .collect(),
        ),
        Value::Array(items) => {
            Value::Array(items.iter().map(|v| sanitize_inner(v, key)).collect())
        }
        Value::String(s) => {
            if should_remove(s, key) {
                Value::String(format!("[LARGE_DATA_REMOVED_{}_BYTES]", s.len()))
            } else {
                value.clone()
            }
        }
        other => other.clone(),
    }
}

fn should_remove(s: &str, key: Option<&str>) -> bool {
    if s.len() <= LARGE_STRING_THRESHOLD {
        return false;
    }
    if let Some(key) = key {
        if KEEP_KEYS.contains(&key) {
            return false;
        }
    }
    !is_url(s)
}

/// Fetchable URLs are kept. `data:` URIs are deliberately not URLs here;
/// they are exactly the inline payloads this module exists to remove.
fn is_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://") || s.starts_with("gs://")
}
