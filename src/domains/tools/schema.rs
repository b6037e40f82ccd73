//! Argument schemas.
//!
//! Schemas are generated from parameter types with `schemars`. Before a
//! handler is bound, the raw arguments are checked against the schema's
//! top level: required properties present, each value of the declared type
//! or coercible to it, numeric bounds respected, no unknown properties when
//! the schema closes them.

use schemars::JsonSchema;
use serde_json::{Map, Number, Value};

/// Generate the published schema for a parameter type.
pub fn schema_for<T: JsonSchema>() -> Value {
    let schema = schemars::schema_for!(T);
    let mut value = serde_json::to_value(&schema).unwrap_or_else(|_| Value::Object(Map::new()));
    if let Some(object) = value.as_object_mut() {
        object.remove("$schema");
        object.remove("title");
        object
            .entry("type")
            .or_insert_with(|| Value::String("object".to_string()));
    }
    value
}

/// Validate and coerce call arguments.
///
/// Returns the (possibly coerced) argument map, or every problem found.
pub fn validate_arguments(schema: &Value, arguments: Option<Value>) -> Result<Map<String, Value>, Vec<String>> {
    let mut arguments = match arguments {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map,
        Some(other) => {
            return Err(vec![format!(
                "arguments must be an object, got {}",
                type_name(&other)
            )]);
        }
    };

    let mut problems = Vec::new();
    let empty = Map::new();
    let properties = schema
        .get("properties")
        .and_then(Value::as_object)
        .unwrap_or(&empty);

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for name in required.iter().filter_map(Value::as_str) {
            match arguments.get(name) {
                None | Some(Value::Null) => {
                    problems.push(format!("missing required argument '{}'", name))
                }
                Some(_) => {}
            }
        }
    }

    let closed = schema.get("additionalProperties") == Some(&Value::Bool(false));

    for (name, value) in arguments.iter_mut() {
        let Some(property) = properties.get(name) else {
            if closed {
                problems.push(format!("unknown argument '{}'", name));
            }
            continue;
        };
        if let Err(problem) = check_property(property, value) {
            problems.push(format!("argument '{}' {}", name, problem));
        }
    }

    if problems.is_empty() {
        Ok(arguments)
    } else {
        Err(problems)
    }
}

fn check_property(property: &Value, value: &mut Value) -> Result<(), String> {
    let expected: Vec<&str> = match property.get("type") {
        Some(Value::String(t)) => vec![t.as_str()],
        Some(Value::Array(types)) => types.iter().filter_map(Value::as_str).collect(),
        // No declared type ($ref, anyOf, any value): nothing to check here
        _ => return Ok(()),
    };

    if !expected.iter().any(|t| matches_type(t, value)) {
        let coerced = expected.iter().find_map(|t| coerce(t, value));
        match coerced {
            Some(new_value) => *value = new_value,
            None => {
                return Err(format!(
                    "must be {}, got {}",
                    expected.join(" or "),
                    type_name(value)
                ));
            }
        }
    }

    check_bounds(property, value)
}

fn matches_type(expected: &str, value: &Value) -> bool {
    match expected {
        "null" => value.is_null(),
        "boolean" => value.is_boolean(),
        "string" => value.is_string(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        _ => true,
    }
}

fn coerce(expected: &str, value: &Value) -> Option<Value> {
    match (expected, value) {
        ("integer", Value::String(s)) => {
            let s = s.trim();
            s.parse::<i64>()
                .map(Value::from)
                .or_else(|_| s.parse::<u64>().map(Value::from))
                .ok()
        }
        ("integer", Value::Number(n)) => {
            let f = n.as_f64()?;
            (f.fract() == 0.0 && f.abs() < 9.0e15).then(|| Value::from(f as i64))
        }
        ("number", Value::String(s)) => {
            let f = s.trim().parse::<f64>().ok()?;
            Number::from_f64(f).map(Value::Number)
        }
        ("boolean", Value::String(s)) => match s.trim().to_lowercase().as_str() {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            _ => None,
        },
        ("string", Value::Number(n)) => Some(Value::String(n.to_string())),
        ("string", Value::Bool(b)) => Some(Value::String(b.to_string())),
        _ => None,
    }
}

fn check_bounds(property: &Value, value: &Value) -> Result<(), String> {
    let Some(number) = value.as_f64() else {
        return Ok(());
    };
    if let Some(minimum) = property.get("minimum").and_then(Value::as_f64) {
        if number < minimum {
            return Err(format!("must be at least {}", minimum));
        }
    }
    if let Some(maximum) = property.get("maximum").and_then(Value::as_f64) {
        if number > maximum {
            return Err(format!("must be at most {}", maximum));
        }
    }
    Ok(())
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
