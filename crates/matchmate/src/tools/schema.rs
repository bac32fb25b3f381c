//! Structural validation of tool inputs against the JSON schema subset our tools declare:
//! `type`, `properties`, `required`, `enum`, `items` and `additionalProperties: false`.

use serde_json::Value;

use crate::errors::{AgentError, AgentResult};

/// Check `input` against `schema`, returning the first violation found
pub fn validate(schema: &Value, input: &Value) -> AgentResult<()> {
    validate_at(schema, input, "input")
}

fn validate_at(schema: &Value, value: &Value, path: &str) -> AgentResult<()> {
    if let Some(allowed) = schema.get("enum").and_then(Value::as_array) {
        if !allowed.contains(value) {
            return Err(violation(path, format!("must be one of {}", Value::from(allowed.clone()))));
        }
    }

    if let Some(expected) = schema.get("type").and_then(Value::as_str) {
        if !type_matches(expected, value) {
            return Err(violation(path, format!("expected {}", expected)));
        }
    }

    if let Some(object) = value.as_object() {
        if let Some(required) = schema.get("required").and_then(Value::as_array) {
            for field in required.iter().filter_map(Value::as_str) {
                if !object.contains_key(field) {
                    return Err(violation(path, format!("missing required field `{}`", field)));
                }
            }
        }

        let properties = schema.get("properties").and_then(Value::as_object);
        let closed = schema.get("additionalProperties") == Some(&Value::Bool(false));

        for (key, field_value) in object {
            match properties.and_then(|props| props.get(key)) {
                Some(field_schema) => {
                    validate_at(field_schema, field_value, &format!("{}.{}", path, key))?;
                }
                None if closed => {
                    return Err(violation(path, format!("unexpected field `{}`", key)));
                }
                None => {}
            }
        }
    }

    if let (Some(items), Some(array)) = (schema.get("items"), value.as_array()) {
        for (index, item) in array.iter().enumerate() {
            validate_at(items, item, &format!("{}[{}]", path, index))?;
        }
    }

    Ok(())
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        // Unknown type keywords are not ours to enforce
        _ => true,
    }
}

fn violation(path: &str, reason: String) -> AgentError {
    AgentError::InvalidParameters(format!("{}: {}", path, reason))
}
