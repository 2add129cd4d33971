//! Field sanitization for delimited archive rows.
//!
//! Every field of every post passes through here before it is written, so
//! the archive delimiter never appears inside a field and rows never span
//! lines.

use serde_json::{Map, Value};

/// Character substituted for the delimiter. A comma, unless the delimiter
/// itself is a comma.
pub fn replacement_for(delimiter: char) -> char {
    if delimiter == ',' {
        ';'
    } else {
        ','
    }
}

/// Replace the delimiter and collapse whitespace runs to single spaces.
pub fn sanitize_str(s: &str, delimiter: char) -> String {
    let replaced = s.replace(delimiter, &replacement_for(delimiter).to_string());
    replaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Sanitize an arbitrary JSON value.
///
/// Strings are sanitized directly. Anything else is serialized to JSON,
/// sanitized as text, and parsed back; embedded delimiters inside nested
/// strings become the replacement character.
pub fn sanitize_value(value: &Value, delimiter: char) -> Value {
    match value {
        Value::String(s) => Value::String(sanitize_str(s, delimiter)),
        Value::Null | Value::Bool(_) | Value::Number(_) => value.clone(),
        _ => {
            let dump = value.to_string();
            let cleaned = sanitize_str(&dump, delimiter);
            serde_json::from_str(&cleaned).unwrap_or(Value::String(cleaned))
        }
    }
}

/// Sanitize every field of a post in place.
pub fn sanitize_fields(fields: &mut Map<String, Value>, delimiter: char) {
    for value in fields.values_mut() {
        *value = sanitize_value(value, delimiter);
    }
}
