//! ## querywatch-core::measurement
//! **Normalized output records**
//!
//! A [`Measurement`] is what modules publish and reporters forward. It is
//! immutable once built and travels behind an `Arc`, so every subscribed
//! reporter reads the same instance.
//!
//! Two variants exist:
//! - *simple*: one numeric value, plus optional auxiliary fields
//! - *complex*: no single value, only named numeric or string fields
//!
//! Wire encodings live in [`encode`].

pub mod encode;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Unit of a measurement timestamp, and of configured periods.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TimeUnit {
    Nanoseconds,
    Microseconds,
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeUnit::Nanoseconds => "NANOSECONDS",
            TimeUnit::Microseconds => "MICROSECONDS",
            TimeUnit::Milliseconds => "MILLISECONDS",
            TimeUnit::Seconds => "SECONDS",
            TimeUnit::Minutes => "MINUTES",
            TimeUnit::Hours => "HOURS",
            TimeUnit::Days => "DAYS",
        }
    }

    /// `amount` of this unit as a [`Duration`].
    pub fn to_duration(&self, amount: u64) -> Duration {
        match self {
            TimeUnit::Nanoseconds => Duration::from_nanos(amount),
            TimeUnit::Microseconds => Duration::from_micros(amount),
            TimeUnit::Milliseconds => Duration::from_millis(amount),
            TimeUnit::Seconds => Duration::from_secs(amount),
            TimeUnit::Minutes => Duration::from_secs(amount.saturating_mul(60)),
            TimeUnit::Hours => Duration::from_secs(amount.saturating_mul(3_600)),
            TimeUnit::Days => Duration::from_secs(amount.saturating_mul(86_400)),
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unit = match s.to_ascii_uppercase().as_str() {
            "NANOSECONDS" => TimeUnit::Nanoseconds,
            "MICROSECONDS" => TimeUnit::Microseconds,
            "MILLISECONDS" => TimeUnit::Milliseconds,
            "SECONDS" => TimeUnit::Seconds,
            "MINUTES" => TimeUnit::Minutes,
            "HOURS" => TimeUnit::Hours,
            "DAYS" => TimeUnit::Days,
            other => return Err(format!("unknown time unit '{other}'")),
        };
        Ok(unit)
    }
}

/// Value of a named field.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Number(f64),
    Text(String),
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Number(value)
    }
}

impl From<u64> for FieldValue {
    fn from(value: u64) -> Self {
        FieldValue::Number(value as f64)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Number(if value { 1.0 } else { 0.0 })
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

/// Discriminates simple from complex measurements.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MeasurementKind {
    Simple(f64),
    Complex,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Measurement {
    name: String,
    kind: MeasurementKind,
    time: i64,
    time_unit: TimeUnit,
    tags: BTreeMap<String, String>,
    fields: BTreeMap<String, FieldValue>,
}

impl Measurement {
    /// Starts a simple measurement stamped with the current time in milliseconds.
    pub fn simple(name: impl Into<String>, value: f64) -> MeasurementBuilder {
        MeasurementBuilder::new(name.into(), MeasurementKind::Simple(value))
    }

    /// Starts a complex measurement stamped with the current time in milliseconds.
    pub fn complex(name: impl Into<String>) -> MeasurementBuilder {
        MeasurementBuilder::new(name.into(), MeasurementKind::Complex)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> MeasurementKind {
        self.kind
    }

    /// The numeric value; `None` for complex measurements.
    pub fn value(&self) -> Option<f64> {
        match self.kind {
            MeasurementKind::Simple(value) => Some(value),
            MeasurementKind::Complex => None,
        }
    }

    pub fn is_simple(&self) -> bool {
        matches!(self.kind, MeasurementKind::Simple(_))
    }

    pub fn time(&self) -> i64 {
        self.time
    }

    pub fn time_unit(&self) -> TimeUnit {
        self.time_unit
    }

    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    pub fn field(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }
}

/// Accumulates tags and fields; [`MeasurementBuilder::build`] freezes the result.
#[derive(Debug)]
pub struct MeasurementBuilder {
    inner: Measurement,
}

impl MeasurementBuilder {
    fn new(name: String, kind: MeasurementKind) -> Self {
        Self {
            inner: Measurement {
                name,
                kind,
                time: chrono::Utc::now().timestamp_millis(),
                time_unit: TimeUnit::Milliseconds,
                tags: BTreeMap::new(),
                fields: BTreeMap::new(),
            },
        }
    }

    pub fn at(mut self, time: i64, unit: TimeUnit) -> Self {
        self.inner.time = time;
        self.inner.time_unit = unit;
        self
    }

    /// Adds a tag. A repeated key replaces the earlier value.
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.inner.tags.insert(key.into(), value.into());
        self
    }

    pub fn tags<K, V>(mut self, tags: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.inner
            .tags
            .extend(tags.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.inner.fields.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> Measurement {
        self.inner
    }
}
