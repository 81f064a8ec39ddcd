//! Minimal JSON Schema validation for tool arguments.
//!
//! Supports the subset tool schemas actually use: `type` (single or list),
//! `enum`, `required`, `properties`, `items` and `additionalProperties: false`.
//! Unknown keywords are ignored.

use serde_json::Value;

/// Validate `value` against `schema`.
///
/// Returns every violation found, each prefixed with the JSON path of the
/// offending value.
///
/// # Example
/// ```
/// use serde_json::json;
/// use steward::tools::schema::validate;
///
/// let schema = json!({
///     "type": "object",
///     "properties": { "path": { "type": "string" } },
///     "required": ["path"]
/// });
/// assert!(validate(&schema, &json!({"path": "a.txt"})).is_ok());
///
/// let errors = validate(&schema, &json!({"path": 3})).unwrap_err();
/// assert_eq!(errors, vec!["$.path: expected string, got integer"]);
/// ```
pub fn validate(schema: &Value, value: &Value) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();
    check(schema, value, "$", &mut errors);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check(schema: &Value, value: &Value, path: &str, errors: &mut Vec<String>) {
    let Some(schema) = schema.as_object() else {
        return;
    };

    if let Some(expected) = schema.get("type") {
        let allowed: Vec<&str> = match expected {
            Value::String(t) => vec![t.as_str()],
            Value::Array(ts) => ts.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        };
        if !allowed.is_empty() && !allowed.iter().any(|t| type_matches(t, value)) {
            errors.push(format!(
                "{}: expected {}, got {}",
                path,
                allowed.join(" or "),
                type_name(value)
            ));
            return;
        }
    }

    if let Some(Value::Array(options)) = schema.get("enum") {
        if !options.contains(value) {
            let listed: Vec<String> = options.iter().map(Value::to_string).collect();
            errors.push(format!(
                "{}: {} is not one of [{}]",
                path,
                value,
                listed.join(", ")
            ));
        }
    }

    if let Value::Object(map) = value {
        let properties = schema.get("properties").and_then(Value::as_object);

        if let Some(Value::Array(required)) = schema.get("required") {
            for name in required.iter().filter_map(Value::as_str) {
                if !map.contains_key(name) {
                    errors.push(format!("{}: missing required property '{}'", path, name));
                }
            }
        }

        for (key, child) in map {
            let child_path = format!("{}.{}", path, key);
            match properties.and_then(|p| p.get(key)) {
                Some(child_schema) => check(child_schema, child, &child_path, errors),
                None => {
                    if schema.get("additionalProperties") == Some(&Value::Bool(false)) {
                        errors.push(format!("{}: unexpected property", child_path));
                    }
                }
            }
        }
    }

    if let (Value::Array(items), Some(item_schema)) = (value, schema.get("items")) {
        for (i, item) in items.iter().enumerate() {
            check(item_schema, item, &format!("{}[{}]", path, i), errors);
        }
    }
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn file_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string" },
                "mode": { "type": "string", "enum": ["overwrite", "append"] },
                "lines": { "type": "array", "items": { "type": "integer" } },
                "timeout": { "type": ["integer", "null"] }
            },
            "required": ["path"],
            "additionalProperties": false
        })
    }

    #[test]
    fn test_valid_arguments() {
        let args = json!({"path": "a", "mode": "append", "lines": [1, 2], "timeout": null});
        assert!(validate(&file_schema(), &args).is_ok());
    }

    #[test]
    fn test_missing_required() {
        let errors = validate(&file_schema(), &json!({})).unwrap_err();
        assert_eq!(errors, vec!["$: missing required property 'path'"]);
    }

    #[test]
    fn test_wrong_root_type() {
        let errors = validate(&file_schema(), &json!("a.txt")).unwrap_err();
        assert_eq!(errors, vec!["$: expected object, got string"]);
    }

    #[test]
    fn test_enum_and_items_and_extra() {
        let args = json!({"path": "a", "mode": "truncate", "lines": [1, "x"], "force": true});
        let errors = validate(&file_schema(), &args).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().any(|e| e.starts_with("$.mode:")));
        assert!(errors.iter().any(|e| e == "$.lines[1]: expected integer, got string"));
        assert!(errors.iter().any(|e| e == "$.force: unexpected property"));
    }

    #[test]
    fn test_number_accepts_integer_but_not_reverse() {
        assert!(validate(&json!({"type": "number"}), &json!(3)).is_ok());
        assert!(validate(&json!({"type": "integer"}), &json!(3.5)).is_err());
    }

    #[test]
    fn test_empty_schema_accepts_anything() {
        assert!(validate(&json!({}), &json!({"anything": [1, 2]})).is_ok());
        assert!(validate(&Value::Null, &json!(1)).is_ok());
    }
}
