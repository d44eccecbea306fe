// [libs/infra/db/src/mapping.rs]
//! Small row<->domain conversion helpers shared by every repository.
//! SQLite has no native timestamp/array/bool type, so every repository
//! marshals through these instead of reinventing the conversion per query.

use chrono::{DateTime, NaiveDate, Utc};

use crate::errors::DbError;

pub fn datetime_to_text(value: DateTime<Utc>) -> String {
    value.to_rfc3339()
}

pub fn text_to_datetime(raw: &str) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DbError::MappingError(format!("invalid timestamp '{}': {}", raw, e)))
}

pub fn date_to_text(value: NaiveDate) -> String {
    value.format("%Y-%m-%d").to_string()
}

pub fn text_to_date(raw: &str) -> Result<NaiveDate, DbError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| DbError::MappingError(format!("invalid date '{}': {}", raw, e)))
}

pub fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}

pub fn int_to_bool(value: i64) -> bool {
    value != 0
}

pub fn strings_to_json(values: &[String]) -> String {
    if values.is_empty() {
        return String::new();
    }
    serde_json::to_string(values).unwrap_or_default()
}

pub fn json_to_strings(raw: &str) -> Vec<String> {
    if raw.is_empty() {
        return Vec::new();
    }
    serde_json::from_str(raw).unwrap_or_default()
}
