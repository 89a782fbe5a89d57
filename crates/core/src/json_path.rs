//! Dot-path lookup into JSON values.
//!
//! Response paths (`"data.0.url"`) and workflow history lookups
//! (`"result"`, `"output.images.1"`) share this helper. Numeric components
//! index arrays; everything else keys into objects.

use serde_json::Value;

/// Look up `path` inside `value`. Returns `None` when any component is
/// missing or the shape does not match.
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for component in path.split('.') {
        if component.is_empty() {
            return None;
        }
        current = match current {
            Value::Object(map) => map.get(component)?,
            Value::Array(items) => {
                let index: usize = component.parse().ok()?;
                items.get(index)?
            }
            _ => return None,
        };
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn looks_up_nested_objects() {
        let v = json!({"a": {"b": {"c": 1}}});
        assert_eq!(lookup(&v, "a.b.c"), Some(&json!(1)));
    }

    #[test]
    fn numeric_components_index_arrays() {
        let v = json!({"data": [{"url": "u0"}, {"url": "u1"}]});
        assert_eq!(lookup(&v, "data.1.url"), Some(&json!("u1")));
    }

    #[test]
    fn missing_component_is_none() {
        let v = json!({"a": 1});
        assert_eq!(lookup(&v, "a.b"), None);
        assert_eq!(lookup(&v, "z"), None);
    }

    #[test]
    fn non_numeric_index_into_array_is_none() {
        let v = json!([1, 2, 3]);
        assert_eq!(lookup(&v, "first"), None);
    }

    #[test]
    fn single_component_path() {
        let v = json!({"result": "ok"});
        assert_eq!(lookup(&v, "result"), Some(&json!("ok")));
    }
}
