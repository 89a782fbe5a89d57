//! Input field coercion and provider field mapping.
//!
//! Provider schemas declare a type per input field; values arriving from
//! the workflow layer are often stringly-typed and must be coerced before
//! templating. After coercion, standard field names are renamed to the
//! provider's field names via the schema's mapping table.

use serde_json::{Map, Value};

/// Reserved field carrying the ordered image list assembled by the
/// workflow engine. Always passes through field mapping unchanged.
pub const IMAGE_LIST_FIELD: &str = "__image_list";

/// Declared type of a schema input field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Text,
    Number,
    Integer,
    Boolean,
    File,
}

impl FieldType {
    /// Parse a schema type string. Unknown strings fall back to `Text`,
    /// which leaves the value untouched.
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "number" | "float" => Self::Number,
            "integer" | "int" => Self::Integer,
            "boolean" | "bool" => Self::Boolean,
            "file" | "image" | "video" => Self::File,
            _ => Self::Text,
        }
    }
}

/// Coerce a single value to its declared type.
///
/// Only string values are rewritten; values already of the right type pass
/// through, and strings that fail to parse are kept verbatim so the
/// provider sees exactly what the user sent.
pub fn coerce_value(field_type: FieldType, value: Value) -> Value {
    match (field_type, &value) {
        (FieldType::Number, Value::String(s)) => match s.trim().parse::<f64>() {
            Ok(f) => serde_json::Number::from_f64(f)
                .map(Value::Number)
                .unwrap_or(value),
            Err(_) => value,
        },
        (FieldType::Integer, Value::String(s)) => match s.trim().parse::<i64>() {
            Ok(i) => Value::from(i),
            Err(_) => value,
        },
        (FieldType::Boolean, Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Value::Bool(true),
            "false" | "0" | "no" => Value::Bool(false),
            _ => value,
        },
        _ => value,
    }
}

/// Rename standard field names to provider field names.
///
/// Fields absent from the mapping pass through unchanged, which keeps the
/// payload forward-compatible with providers that accept extra fields.
/// [`IMAGE_LIST_FIELD`] always passes through regardless of mapping.
pub fn apply_field_mapping(
    input: Map<String, Value>,
    mapping: &Map<String, Value>,
) -> Map<String, Value> {
    let mut out = Map::with_capacity(input.len());
    for (name, value) in input {
        if name == IMAGE_LIST_FIELD {
            out.insert(name, value);
            continue;
        }
        let target = mapping
            .get(&name)
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or(name);
        out.insert(target, value);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numeric_strings_are_coerced() {
        assert_eq!(
            coerce_value(FieldType::Number, json!("1.5")),
            json!(1.5)
        );
        assert_eq!(coerce_value(FieldType::Integer, json!("42")), json!(42));
    }

    #[test]
    fn boolean_strings_are_coerced() {
        assert_eq!(coerce_value(FieldType::Boolean, json!("true")), json!(true));
        assert_eq!(coerce_value(FieldType::Boolean, json!("0")), json!(false));
    }

    #[test]
    fn unparsable_strings_are_kept_verbatim() {
        assert_eq!(
            coerce_value(FieldType::Number, json!("wide")),
            json!("wide")
        );
    }

    #[test]
    fn typed_values_pass_through() {
        assert_eq!(coerce_value(FieldType::Number, json!(7)), json!(7));
        assert_eq!(coerce_value(FieldType::Boolean, json!(false)), json!(false));
    }

    #[test]
    fn field_type_parse_is_lenient() {
        assert_eq!(FieldType::parse("INT"), FieldType::Integer);
        assert_eq!(FieldType::parse("image"), FieldType::File);
        assert_eq!(FieldType::parse("mystery"), FieldType::Text);
    }

    #[test]
    fn mapping_renames_and_passes_through() {
        let input = json!({"prompt": "hi", "steps": 20})
            .as_object()
            .unwrap()
            .clone();
        let mapping = json!({"prompt": "text_input"}).as_object().unwrap().clone();
        let out = apply_field_mapping(input, &mapping);
        assert_eq!(out.get("text_input"), Some(&json!("hi")));
        assert_eq!(out.get("steps"), Some(&json!(20)));
        assert!(!out.contains_key("prompt"));
    }

    #[test]
    fn image_list_field_ignores_mapping() {
        let input = json!({IMAGE_LIST_FIELD: ["a.png"]})
            .as_object()
            .unwrap()
            .clone();
        let mapping = json!({IMAGE_LIST_FIELD: "images"})
            .as_object()
            .unwrap()
            .clone();
        let out = apply_field_mapping(input, &mapping);
        assert!(out.contains_key(IMAGE_LIST_FIELD));
        assert!(!out.contains_key("images"));
    }
}
