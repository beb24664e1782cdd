// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! A single data point destined for InfluxDB.
//!
//! A [`Measurement`] is built by a producer, mutated through the setters,
//! then handed to [`Engine::add_measurement`](crate::Engine::add_measurement),
//! which encodes it immediately. The engine never keeps a reference to the
//! measurement itself.

use crate::error::MeasurementError;
use crate::line_protocol::{self, FieldValue};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};

/// One row in an InfluxDB database.
///
/// ```
/// use influx_batcher::Measurement;
///
/// let mut m = Measurement::new("example", "measurement-name");
/// m.set_tag("foo", "bar");
/// m.set_field("baz", 1.05).unwrap();
/// assert!(m.marshall().starts_with("measurement-name,foo=bar baz=1.05 "));
/// ```
#[derive(Debug, Clone)]
pub struct Measurement {
    database: String,
    name: String,
    tags: BTreeMap<String, String>,
    fields: BTreeMap<String, FieldValue>,
    timestamp: DateTime<Utc>,
}

impl Measurement {
    /// Create an empty measurement timestamped now.
    pub fn new(database: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            name: name.into(),
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    /// Create a measurement whose tags start as a copy of `base_tags`.
    pub fn with_base_tags(
        database: impl Into<String>,
        name: impl Into<String>,
        base_tags: &BTreeMap<String, String>,
    ) -> Self {
        let mut m = Self::new(database, name);
        m.tags = base_tags.clone();
        m
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Set the value of a field.
    ///
    /// Non-finite floats cannot be represented in Line Protocol and are
    /// rejected with [`MeasurementError::InvalidValue`].
    pub fn set_field(
        &mut self,
        name: impl Into<String>,
        value: impl Into<FieldValue>,
    ) -> Result<&mut Self, MeasurementError> {
        let name = name.into();
        let value = value.into();
        if let FieldValue::Float(v) = value {
            if !v.is_finite() {
                tracing::debug!("Invalid field value for {}: {}", name, v);
                return Err(MeasurementError::InvalidValue {
                    field: name,
                    reason: format!("{} is not a finite number", v),
                });
            }
        }
        self.fields.insert(name, value);
        Ok(self)
    }

    /// Set a tag, replacing any existing value.
    pub fn set_tag(&mut self, name: impl Into<String>, value: impl ToString) -> &mut Self {
        self.tags.insert(name.into(), value.to_string());
        self
    }

    /// Set several tags, replacing existing values with the same names.
    pub fn set_tags<I, K, V>(&mut self, tags: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToString,
    {
        for (key, value) in tags {
            self.set_tag(key, value);
        }
        self
    }

    /// Override the timestamp.
    pub fn set_timestamp(&mut self, timestamp: DateTime<Utc>) -> &mut Self {
        self.timestamp = timestamp;
        self
    }

    /// Time a block of work.
    ///
    /// The returned guard records the elapsed wall-clock seconds in field
    /// `name` when dropped. It dereferences to the measurement so tags and
    /// fields can still be set while the timer runs.
    pub fn duration(&mut self, name: impl Into<String>) -> DurationGuard<'_> {
        DurationGuard {
            measurement: self,
            name: name.into(),
            start: Utc::now(),
        }
    }

    /// Run `f` and record how long it took in field `name`.
    pub fn time<R>(&mut self, name: impl Into<String>, f: impl FnOnce() -> R) -> R {
        let _guard = self.duration(name);
        f()
    }

    /// Check that the measurement can be submitted.
    pub fn validate(&self) -> Result<(), MeasurementError> {
        if self.database.is_empty() {
            return Err(MeasurementError::NoDatabase(self.name.clone()));
        }
        if self.fields.is_empty() {
            return Err(MeasurementError::NoFields {
                database: self.database.clone(),
                name: self.name.clone(),
            });
        }
        Ok(())
    }

    /// Render the measurement as one Line Protocol record with a
    /// millisecond timestamp.
    pub fn marshall(&self) -> String {
        line_protocol::encode_line(
            &self.name,
            &self.tags,
            &self.fields,
            self.timestamp.timestamp_millis(),
        )
    }
}

/// Scoped timer returned by [`Measurement::duration`].
pub struct DurationGuard<'a> {
    measurement: &'a mut Measurement,
    name: String,
    start: DateTime<Utc>,
}

impl Deref for DurationGuard<'_> {
    type Target = Measurement;

    fn deref(&self) -> &Measurement {
        self.measurement
    }
}

impl DerefMut for DurationGuard<'_> {
    fn deref_mut(&mut self) -> &mut Measurement {
        self.measurement
    }
}

impl Drop for DurationGuard<'_> {
    fn drop(&mut self) {
        // Wall clock may step backwards; never record a negative duration.
        let end = Utc::now().max(self.start);
        let elapsed = (end - self.start).to_std().unwrap_or_default();
        self.measurement.fields.insert(
            std::mem::take(&mut self.name),
            FieldValue::Float(elapsed.as_secs_f64()),
        );
    }
}
