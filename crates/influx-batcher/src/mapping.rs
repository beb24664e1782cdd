// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! JSON record mapping to measurements.
//!
//! One record per line:
//!
//! ```json
//! {"database": "app", "name": "requests",
//!  "tags": {"handler": "users"},
//!  "fields": {"duration": 0.012, "status_code": 200, "cache": {"hit": true}},
//!  "timestamp": 1500000000123}
//! ```
//!
//! Tags are always stringified. Fields keep their JSON type; nested objects
//! are flattened with dot-joined keys (`cache.hit`). `timestamp` is epoch
//! milliseconds and defaults to now.

use crate::error::MeasurementError;
use crate::line_protocol::FieldValue;
use crate::measurement::Measurement;
use chrono::{TimeZone, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

/// A record could not be turned into a measurement.
#[derive(Debug, Error)]
pub enum MappingError {
    #[error("invalid JSON record: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Measurement(#[from] MeasurementError),
}

/// One decoded input record.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Record {
    pub database: String,
    pub name: String,
    #[serde(default)]
    pub tags: Map<String, Value>,
    #[serde(default)]
    pub fields: Map<String, Value>,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

impl Record {
    /// Decode a single JSON line.
    pub fn from_json(line: &str) -> Result<Self, MappingError> {
        Ok(serde_json::from_str(line)?)
    }

    /// Build a measurement whose tags start from `base_tags`.
    pub fn into_measurement(
        self,
        base_tags: &BTreeMap<String, String>,
    ) -> Result<Measurement, MeasurementError> {
        let mut m = Measurement::with_base_tags(self.database, self.name, base_tags);

        for (key, value) in &self.tags {
            if let Some(s) = json_to_string(value) {
                m.set_tag(key.as_str(), s);
            }
        }

        let mut fields = Vec::new();
        flatten_fields("", &self.fields, &mut fields)?;
        for (key, value) in fields {
            m.set_field(key, value)?;
        }

        if let Some(ms) = self.timestamp {
            let ts = Utc.timestamp_millis_opt(ms).single().ok_or_else(|| {
                MeasurementError::InvalidValue {
                    field: "timestamp".to_string(),
                    reason: format!("{} is out of range", ms),
                }
            })?;
            m.set_timestamp(ts);
        }

        m.validate()?;
        Ok(m)
    }
}

/// Decode one line and build its measurement.
pub fn parse_line(
    line: &str,
    base_tags: &BTreeMap<String, String>,
) -> Result<Measurement, MappingError> {
    Ok(Record::from_json(line)?.into_measurement(base_tags)?)
}

fn flatten_fields(
    prefix: &str,
    object: &Map<String, Value>,
    out: &mut Vec<(String, FieldValue)>,
) -> Result<(), MeasurementError> {
    for (key, value) in object {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        match value {
            Value::Object(nested) => flatten_fields(&path, nested, out)?,
            other => {
                let field = json_to_field_value(other).ok_or_else(|| {
                    MeasurementError::InvalidValue {
                        field: path.clone(),
                        reason: format!("unsupported JSON value {}", other),
                    }
                })?;
                out.push((path, field));
            }
        }
    }
    Ok(())
}

/// Convert a JSON value to a tag value.
fn json_to_string(val: &Value) -> Option<String> {
    match val {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        // Arrays and objects are not valid tag values
        _ => None,
    }
}

/// Convert a JSON value to a field value with type inference.
fn json_to_field_value(val: &Value) -> Option<FieldValue> {
    match val {
        Value::Number(n) => match n.as_i64() {
            Some(i) => Some(FieldValue::Integer(i)),
            None => n.as_f64().map(FieldValue::Float),
        },
        Value::String(s) => Some(FieldValue::String(s.clone())),
        Value::Bool(b) => Some(FieldValue::Boolean(*b)),
        _ => None,
    }
}
