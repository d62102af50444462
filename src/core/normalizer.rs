// src/core/normalizer.rs

//! Converts the target's raw, loosely-typed output into the canonical result
//! shape. The scripting layers have two different ways of saying "nothing
//! here" — the AppleScript `missing value` marker and an absent property —
//! plus empty strings where a date slot was never set. All of them collapse
//! to JSON null so upstream consumers only handle one absence.

use serde_json::Value;

/// The marker AppleScript substitutes for unset object properties when a
/// value crosses the scripting boundary as text.
const MISSING_VALUE: &str = "missing value";

/// Parses and scrubs one script's stdout. Empty output is a valid null
/// payload (e.g. a delete that returns nothing), not an error.
pub fn normalize_output(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(parsed) => scrub(parsed),
        // Not JSON: a bare scalar from a diagnostic or legacy script.
        Err(_) => coerce_scalar(trimmed),
    }
}

fn scrub(value: Value) -> Value {
    match value {
        Value::String(s) if s == MISSING_VALUE => Value::Null,
        Value::Array(items) => Value::Array(items.into_iter().map(scrub).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, member)| {
                    let cleaned = if is_empty_date(&key, &member) {
                        Value::Null
                    } else {
                        scrub(member)
                    };
                    (key, cleaned)
                })
                .collect(),
        ),
        other => other,
    }
}

fn is_empty_date(key: &str, value: &Value) -> bool {
    let date_keyed = key.ends_with("Date") || key.ends_with("_date");
    date_keyed && matches!(value, Value::String(s) if s.is_empty())
}

fn coerce_scalar(text: &str) -> Value {
    if text == MISSING_VALUE {
        return Value::Null;
    }
    if let Ok(b) = text.parse::<bool>() {
        return Value::Bool(b);
    }
    if let Ok(n) = text.parse::<i64>() {
        return Value::Number(n.into());
    }
    if let Ok(f) = text.parse::<f64>() {
        if let Some(n) = serde_json::Number::from_f64(f) {
            return Value::Number(n);
        }
    }
    Value::String(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_output_is_null_not_error() {
        assert_eq!(normalize_output(""), Value::Null);
        assert_eq!(normalize_output("  \n"), Value::Null);
    }

    #[test]
    fn test_missing_value_sentinel_becomes_null() {
        let raw = r#"{"name": "Call dentist", "note": "missing value"}"#;
        assert_eq!(
            normalize_output(raw),
            json!({"name": "Call dentist", "note": null})
        );
    }

    #[test]
    fn test_sentinel_is_scrubbed_recursively() {
        let raw = r#"[{"tags": ["missing value", "home"]}]"#;
        assert_eq!(normalize_output(raw), json!([{"tags": [null, "home"]}]));
    }

    #[test]
    fn test_empty_date_string_becomes_null() {
        let raw = r#"{"dueDate": "", "name": ""}"#;
        // Only date-keyed members are affected; an empty name is an empty name.
        assert_eq!(normalize_output(raw), json!({"dueDate": null, "name": ""}));
    }

    #[test]
    fn test_bare_number_output_is_coerced() {
        assert_eq!(normalize_output("42\n"), json!(42));
        assert_eq!(normalize_output("true"), json!(true));
    }

    #[test]
    fn test_non_json_text_survives_as_string() {
        assert_eq!(normalize_output("two words"), json!("two words"));
    }
}
