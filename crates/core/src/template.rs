//! Provider request-template rendering.
//!
//! A provider's `request_template` is a nested JSON document whose string
//! leaves may contain `{{field}}` placeholders. Rendering substitutes each
//! placeholder with the value from a flat field map, preserving types when
//! a leaf is exactly one placeholder and stringifying when a placeholder is
//! embedded inside a longer string.
//!
//! Templates are parsed into a small segment AST once per string leaf, so
//! substitution never does multi-pass string surgery on serialized JSON.

use std::collections::HashSet;

use base64::Engine as _;
use serde_json::{Map, Value};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Media objects
// ---------------------------------------------------------------------------

/// Image-like file extensions recognized when deciding whether a URL is a
/// media reference.
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "gif", "bmp"];

/// How a media object carries its content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaContent {
    /// Base64-encoded bytes, inlined into the request.
    Inline(String),
    /// A URL the provider can fetch.
    Uri(String),
}

/// A substituted media value, e.g. an input image.
///
/// Serialized as `{"mimeType": ..., "inlineData": ...}` or
/// `{"mimeType": ..., "fileUri": ...}` depending on the content kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaObject {
    pub mime_type: String,
    pub content: MediaContent,
}

impl MediaObject {
    /// Build the JSON representation of this media object.
    pub fn to_value(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("mimeType".into(), Value::String(self.mime_type.clone()));
        match &self.content {
            MediaContent::Inline(data) => {
                obj.insert("inlineData".into(), Value::String(data.clone()));
            }
            MediaContent::Uri(uri) => {
                obj.insert("fileUri".into(), Value::String(uri.clone()));
            }
        }
        Value::Object(obj)
    }

    /// The raw content string, used for de-duplication.
    fn content_key(&self) -> &str {
        match &self.content {
            MediaContent::Inline(data) => data,
            MediaContent::Uri(uri) => uri,
        }
    }
}

/// Detect whether a string value is an image reference (data URI or a URL
/// with an image-like extension) and convert it to a [`MediaObject`].
pub fn media_from_str(value: &str) -> Option<MediaObject> {
    if let Some(rest) = value.strip_prefix("data:") {
        let (mime, payload) = rest.split_once(';')?;
        if !mime.starts_with("image/") {
            return None;
        }
        let data = payload.strip_prefix("base64,")?;
        // Reject data URIs whose payload is not actually base64.
        if base64::engine::general_purpose::STANDARD.decode(data).is_err() {
            return None;
        }
        return Some(MediaObject {
            mime_type: mime.to_string(),
            content: MediaContent::Inline(data.to_string()),
        });
    }

    if value.starts_with("http://") || value.starts_with("https://") || value.starts_with("gs://") {
        let path = value.split(['?', '#']).next().unwrap_or(value);
        let ext = path.rsplit('.').next()?.to_ascii_lowercase();
        if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            let mime = match ext.as_str() {
                "jpg" => "image/jpeg".to_string(),
                other => format!("image/{other}"),
            };
            return Some(MediaObject {
                mime_type: mime,
                content: MediaContent::Uri(value.to_string()),
            });
        }
    }

    None
}

// ---------------------------------------------------------------------------
// Placeholder AST
// ---------------------------------------------------------------------------

/// Optional coercion applied to a placeholder, e.g. `{{count|int}}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cast {
    None,
    Int,
}

/// One parsed piece of a string leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder { name: String, cast: Cast },
}

/// Parse a string leaf into literal and placeholder segments.
fn parse_segments(input: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut rest = input;

    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            // Unterminated marker: keep the remainder as a literal.
            break;
        };
        if start > 0 {
            segments.push(Segment::Literal(rest[..start].to_string()));
        }
        let inner = after[..end].trim();
        let (name, cast) = match inner.split_once('|') {
            Some((name, "int")) => (name.trim(), Cast::Int),
            Some((name, _)) => (name.trim(), Cast::None),
            None => (inner, Cast::None),
        };
        segments.push(Segment::Placeholder {
            name: name.to_string(),
            cast,
        });
        rest = &after[end + 2..];
    }

    if !rest.is_empty() {
        segments.push(Segment::Literal(rest.to_string()));
    }
    segments
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Result of rendering a request template.
#[derive(Debug, Clone)]
pub struct Rendered {
    /// The substituted payload, guaranteed to be valid JSON.
    pub payload: Value,
    /// Media objects substituted via placeholders, in substitution order.
    pub media: Vec<MediaObject>,
}

/// Mutable state threaded through a render pass.
struct RenderState<'a> {
    fields: &'a Map<String, Value>,
    /// Field names consumed by at least one placeholder.
    consumed: HashSet<String>,
    media: Vec<MediaObject>,
}

/// Render `template` against `fields`.
///
/// Substitution rules:
/// - a leaf that is exactly one `"{{name}}"` placeholder is replaced by the
///   typed field value (objects, arrays, numbers, and booleans survive);
/// - a placeholder embedded in a longer string is replaced by the value's
///   string form;
/// - `{{name|int}}` forces integer coercion;
/// - string values that look like serialized JSON are decoded before
///   substitution, unwrapping accidentally-stringified structured fields;
/// - an unmatched whole-leaf placeholder removes the surrounding object
///   entry (or array element) so the payload never carries a null hole;
/// - image-bearing string values become media objects and are recorded in
///   [`Rendered::media`].
///
/// After substitution, any image-bearing field that no placeholder consumed
/// is appended to the payload's first `parts` array (when one exists),
/// de-duplicated by content.
pub fn render(template: &Value, fields: &Map<String, Value>) -> Result<Rendered, CoreError> {
    if !matches!(template, Value::Object(_) | Value::Array(_)) {
        return Err(CoreError::Configuration(
            "request template must be a JSON object or array".to_string(),
        ));
    }

    let mut state = RenderState {
        fields,
        consumed: HashSet::new(),
        media: Vec::new(),
    };

    let payload = render_value(template, &mut state)?.ok_or_else(|| {
        CoreError::Validation("could not construct a valid provider payload".to_string())
    })?;

    let mut rendered = Rendered {
        payload,
        media: state.media,
    };
    append_unconsumed_media(&mut rendered, fields, &state.consumed);
    Ok(rendered)
}

/// Render one node. `None` means the node resolved to an unmatched
/// placeholder and should be dropped by its parent.
fn render_value(node: &Value, state: &mut RenderState<'_>) -> Result<Option<Value>, CoreError> {
    match node {
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, value) in map {
                if let Some(rendered) = render_value(value, state)? {
                    out.insert(key.clone(), rendered);
                }
            }
            Ok(Some(Value::Object(out)))
        }
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                if let Some(rendered) = render_value(item, state)? {
                    out.push(rendered);
                }
            }
            Ok(Some(Value::Array(out)))
        }
        Value::String(s) => render_string_leaf(s, state),
        other => Ok(Some(other.clone())),
    }
}

/// Render a string leaf according to the whole-leaf / embedded rules.
fn render_string_leaf(
    leaf: &str,
    state: &mut RenderState<'_>,
) -> Result<Option<Value>, CoreError> {
    let segments = parse_segments(leaf);

    // Exactly one placeholder and no literals: typed substitution.
    if let [Segment::Placeholder { name, cast }] = segments.as_slice() {
        state.consumed.insert(name.clone());
        let Some(raw) = state.fields.get(name) else {
            return Ok(None);
        };
        let value = decode_stringified(raw);
        if *cast == Cast::Int {
            return Ok(Some(Value::from(coerce_int(name, &value)?)));
        }
        if let Value::String(s) = &value {
            if let Some(media) = media_from_str(s) {
                let json = media.to_value();
                state.media.push(media);
                return Ok(Some(json));
            }
        }
        return Ok(Some(value));
    }

    // No placeholders at all: plain literal.
    if segments
        .iter()
        .all(|s| matches!(s, Segment::Literal(_)))
    {
        return Ok(Some(Value::String(leaf.to_string())));
    }

    // Mixed literals and placeholders: build a string.
    let mut out = String::new();
    for segment in &segments {
        match segment {
            Segment::Literal(text) => out.push_str(text),
            Segment::Placeholder { name, cast } => {
                state.consumed.insert(name.clone());
                match state.fields.get(name) {
                    None => {}
                    Some(raw) => {
                        let value = decode_stringified(raw);
                        if *cast == Cast::Int {
                            out.push_str(&coerce_int(name, &value)?.to_string());
                        } else {
                            out.push_str(&stringify(&value));
                        }
                    }
                }
            }
        }
    }
    Ok(Some(Value::String(out)))
}

/// Unwrap a string value that is itself serialized JSON (`"[...]"` or
/// `"{...}"`). Anything else is returned unchanged.
///
/// Also used by workflow step configs, whose static values arrive
/// JSON-encoded more often than not.
pub fn decode_stringified(value: &Value) -> Value {
    if let Value::String(s) = value {
        let trimmed = s.trim();
        if (trimmed.starts_with('[') && trimmed.ends_with(']'))
            || (trimmed.starts_with('{') && trimmed.ends_with('}'))
        {
            if let Ok(parsed) = serde_json::from_str::<Value>(trimmed) {
                return parsed;
            }
        }
    }
    value.clone()
}

/// Force a value into an `i64` for the `|int` cast.
fn coerce_int(name: &str, value: &Value) -> Result<i64, CoreError> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(i)
            } else if let Some(f) = n.as_f64() {
                Ok(f.trunc() as i64)
            } else {
                Err(CoreError::Validation(format!(
                    "field '{name}' cannot be coerced to an integer"
                )))
            }
        }
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .or_else(|_| s.trim().parse::<f64>().map(|f| f.trunc() as i64))
            .map_err(|_| {
                CoreError::Validation(format!(
                    "field '{name}' value '{s}' cannot be coerced to an integer"
                ))
            }),
        other => Err(CoreError::Validation(format!(
            "field '{name}' of type {} cannot be coerced to an integer",
            type_name(other)
        ))),
    }
}

/// String form of a value for embedded substitution.
fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ---------------------------------------------------------------------------
// Auto-append of unconsumed media
// ---------------------------------------------------------------------------

/// Append image-bearing fields that no placeholder consumed into the
/// payload's first `parts` array, de-duplicated by content.
///
/// Providers with a `parts`-shaped request accept any number of trailing
/// media entries, so images uploaded without a dedicated template slot are
/// still sent.
fn append_unconsumed_media(
    rendered: &mut Rendered,
    fields: &Map<String, Value>,
    consumed: &HashSet<String>,
) {
    let mut pending: Vec<MediaObject> = Vec::new();
    for (name, value) in fields {
        if consumed.contains(name) {
            continue;
        }
        collect_media(value, &mut pending);
    }
    if pending.is_empty() {
        return;
    }

    let Some(parts) = find_parts_array(&mut rendered.payload) else {
        return;
    };

    let existing: HashSet<String> = parts
        .iter()
        .filter_map(|part| {
            part.get("fileUri")
                .or_else(|| part.get("inlineData"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .collect();

    for media in pending {
        if existing.contains(media.content_key()) {
            continue;
        }
        if rendered.media.iter().any(|m| m.content_key() == media.content_key()) {
            continue;
        }
        parts.push(media.to_value());
        rendered.media.push(media);
    }
}

/// Collect media objects from a field value (string or array of strings).
fn collect_media(value: &Value, out: &mut Vec<MediaObject>) {
    match value {
        Value::String(s) => {
            if let Some(media) = media_from_str(s) {
                if !out.contains(&media) {
                    out.push(media);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_media(item, out);
            }
        }
        _ => {}
    }
}

/// Depth-first search for the first `"parts"` key holding an array.
fn find_parts_array(value: &mut Value) -> Option<&mut Vec<Value>> {
    match value {
        Value::Object(map) => {
            let has_parts = matches!(map.get("parts"), Some(Value::Array(_)));
            if has_parts {
                match map.get_mut("parts") {
                    Some(Value::Array(parts)) => Some(parts),
                    _ => None,
                }
            } else {
                map.iter_mut()
                    .find_map(|(_, child)| find_parts_array(child))
            }
        }
        Value::Array(items) => items.iter_mut().find_map(find_parts_array),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
