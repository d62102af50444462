// src/core/fingerprint.rs

//! Canonical cache-key derivation.
//!
//! Two logically-equivalent requests must land on the same cache entry no
//! matter how the caller spelled them: object key order is irrelevant, and
//! `"2026-08-06"`, `"2026-08-06T00:00:00Z"` and `"2026-08-06T02:00:00+02:00"`
//! are the same instant. Canonicalization happens before hashing so the
//! fingerprint inherits that stability.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::models::EntityType;

const HASH_TRUNCATE_LENGTH: usize = 16; // 16 bytes = 32 hex characters

lazy_static! {
    // Cheap shape check before attempting a real parse.
    static ref DATE_LIKE_RE: Regex =
        Regex::new(r"^\d{4}-\d{2}-\d{2}([T ].+)?$").expect("static regex");
}

/// Derives the cache fingerprint for `params` scoped to an entity type.
pub fn fingerprint(entity: EntityType, params: &Value) -> String {
    let keyed = format!("{}:{}", entity.as_str(), canonicalize(params));
    let hash = blake3::hash(keyed.as_bytes());
    hex::encode(hash.as_bytes().get(..HASH_TRUNCATE_LENGTH).unwrap_or_default())
}

/// Renders a JSON value in canonical form: object keys sorted, null members
/// dropped, date-like strings rewritten as RFC3339 UTC.
pub fn canonicalize(value: &Value) -> String {
    canonical_value(value).to_string()
}

fn canonical_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted = BTreeMap::new();
            for (key, member) in map {
                if member.is_null() {
                    continue;
                }
                sorted.insert(key.clone(), canonical_value(member));
            }
            Value::Object(sorted.into_iter().collect())
        }
        Value::Array(items) => Value::Array(items.iter().map(canonical_value).collect()),
        Value::String(s) => match normalize_date(s) {
            Some(normalized) => Value::String(normalized),
            None => Value::String(s.clone()),
        },
        other => other.clone(),
    }
}

/// Rewrites a date-like string as RFC3339 UTC with second precision.
/// Returns `None` when the string is not a date (or not parseable as one),
/// which callers treat as "leave it alone".
pub fn normalize_date(raw: &str) -> Option<String> {
    if !DATE_LIKE_RE.is_match(raw) {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc).to_rfc3339_opts(SecondsFormat::Secs, true));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.and_utc().to_rfc3339_opts(SecondsFormat::Secs, true));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        let midnight = date.and_hms_opt(0, 0, 0)?;
        return Some(midnight.and_utc().to_rfc3339_opts(SecondsFormat::Secs, true));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fingerprint_ignores_key_order() {
        let a: Value =
            serde_json::from_str(r#"{"completed": false, "project": "Work", "flagged": true}"#)
                .unwrap();
        let b: Value =
            serde_json::from_str(r#"{"flagged": true, "completed": false, "project": "Work"}"#)
                .unwrap();
        assert_eq!(
            fingerprint(EntityType::Task, &a),
            fingerprint(EntityType::Task, &b)
        );
    }

    #[test]
    fn test_fingerprint_unifies_equivalent_date_spellings() {
        let bare = json!({"due_before": "2026-08-06"});
        let utc = json!({"due_before": "2026-08-06T00:00:00Z"});
        let offset = json!({"due_before": "2026-08-06T02:00:00+02:00"});
        assert_eq!(
            fingerprint(EntityType::Task, &bare),
            fingerprint(EntityType::Task, &utc)
        );
        assert_eq!(
            fingerprint(EntityType::Task, &utc),
            fingerprint(EntityType::Task, &offset)
        );
    }

    #[test]
    fn test_fingerprint_drops_null_members() {
        let explicit = json!({"completed": false, "project": null});
        let absent = json!({"completed": false});
        assert_eq!(
            fingerprint(EntityType::Task, &explicit),
            fingerprint(EntityType::Task, &absent)
        );
    }

    #[test]
    fn test_fingerprint_separates_entity_types() {
        let filter = json!({"completed": false});
        assert_ne!(
            fingerprint(EntityType::Task, &filter),
            fingerprint(EntityType::Project, &filter)
        );
    }

    #[test]
    fn test_fingerprint_length_is_truncated_hash() {
        let fp = fingerprint(EntityType::Tag, &json!({}));
        assert_eq!(fp.len(), HASH_TRUNCATE_LENGTH * 2);
    }

    #[test]
    fn test_normalize_date_leaves_non_dates_alone() {
        assert_eq!(normalize_date("Work"), None);
        assert_eq!(normalize_date("2026-13-99"), None);
        assert_eq!(normalize_date(""), None);
    }

    #[test]
    fn test_normalize_date_accepts_space_separator() {
        assert_eq!(
            normalize_date("2026-08-06 09:30:00").as_deref(),
            Some("2026-08-06T09:30:00Z")
        );
    }
}
