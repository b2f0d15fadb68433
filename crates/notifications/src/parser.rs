//! Wire payload parsing.
//!
//! Producers are loosely typed: identifiers may arrive as JSON numbers and
//! timestamps in several shapes. Only `type` and `message` are mandatory.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::error::ParseError;
use crate::model::{Notification, NotificationType};

/// Parse a single frame body into a notification.
///
/// A missing `id` is replaced with a fresh UUID and a missing or unreadable
/// `timestamp` with the current time.
pub fn parse(raw: &str) -> Result<Notification, ParseError> {
    parse_at(raw, Utc::now())
}

/// Like [`parse`], with an explicit receipt time.
pub fn parse_at(raw: &str, received_at: DateTime<Utc>) -> Result<Notification, ParseError> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| ParseError::InvalidJson(e.to_string()))?;
    let Value::Object(obj) = value else {
        return Err(ParseError::NotAnObject);
    };

    let kind = obj
        .get("type")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(NotificationType::from_tag)
        .ok_or(ParseError::MissingType)?;

    let message = obj
        .get("message")
        .and_then(Value::as_str)
        .ok_or(ParseError::MissingMessage)?
        .to_string();

    let id = string_field(&obj, "id")
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let metadata = match obj.get("metadata") {
        Some(Value::Object(map)) => map
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect::<HashMap<_, _>>(),
        _ => HashMap::new(),
    };

    let timestamp = obj
        .get("timestamp")
        .and_then(parse_timestamp)
        .unwrap_or(received_at);

    Ok(Notification {
        id,
        kind,
        title: string_field(&obj, "title").unwrap_or_default(),
        message,
        user_id: string_field(&obj, "userId"),
        order_id: string_field(&obj, "orderId"),
        metadata,
        read: false,
        timestamp,
    })
}

/// Read a field that should be a string but may have been sent as a number.
fn string_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    match obj.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Accepts RFC 3339, offset-less ISO-8601 (taken as UTC) and epoch milliseconds.
fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
                return Some(ts.with_timezone(&Utc));
            }
            NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc())
        }
        Value::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    }
}
