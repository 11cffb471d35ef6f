//! Wire encodings for [`Measurement`].
//!
//! - [`Measurement::to_json`]: the object existing JSON consumers parse
//! - [`Measurement::to_line_protocol`]: `name,tags fields time` for line-protocol sinks
//! - `Display`: human-readable form for logs
//!
//! The JSON encoder writes strings between quotes as-is. A quote or backslash
//! inside a tag or field value produces invalid JSON. Consumers depend on the
//! byte layout, so this stays until they can take escaped output.

use std::fmt::{self, Write};

use super::{FieldValue, Measurement, MeasurementKind};

fn number(value: f64) -> String {
    if value.is_finite() {
        format!("{value:?}")
    } else {
        "null".to_string()
    }
}

impl Measurement {
    /// `{"name":..,"value":..,"time":..,"timeUnit":..,"tags":{..},"fields":{..}}`
    ///
    /// `value` is `null` for complex measurements.
    pub fn to_json(&self) -> String {
        let mut out = String::with_capacity(128);
        let value = self.value().map(number).unwrap_or_else(|| "null".to_string());

        let _ = write!(
            out,
            "{{\"name\":\"{}\",\"value\":{},\"time\":{},\"timeUnit\":\"{}\",\"tags\":{{",
            self.name(),
            value,
            self.time(),
            self.time_unit()
        );

        for (i, (key, val)) in self.tags().iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            let _ = write!(out, "\"{key}\":\"{val}\"");
        }

        out.push_str("},\"fields\":{");
        for (i, (key, val)) in self.fields().iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            match val {
                FieldValue::Number(n) => {
                    let _ = write!(out, "\"{key}\":{}", number(*n));
                }
                FieldValue::Text(s) => {
                    let _ = write!(out, "\"{key}\":\"{s}\"");
                }
            }
        }
        out.push_str("}}");
        out
    }

    /// `name,tag=value,... field=value,... time`
    ///
    /// Simple measurements write their value as the `value` field ahead of the
    /// auxiliary fields. Text fields are quoted, numbers are bare.
    pub fn to_line_protocol(&self) -> String {
        let mut out = escape_key(self.name());

        for (key, val) in self.tags() {
            let _ = write!(out, ",{}={}", escape_key(key), escape_key(val));
        }

        out.push(' ');
        let mut first = true;
        if let MeasurementKind::Simple(value) = self.kind() {
            let _ = write!(out, "value={}", line_number(value));
            first = false;
        }
        for (key, val) in self.fields() {
            if !first {
                out.push(',');
            }
            first = false;
            match val {
                FieldValue::Number(n) => {
                    let _ = write!(out, "{}={}", escape_key(key), line_number(*n));
                }
                FieldValue::Text(s) => {
                    let _ = write!(out, "{}=\"{}\"", escape_key(key), s.replace('"', "\\\""));
                }
            }
        }

        let _ = write!(out, " {}", self.time());
        out
    }
}

fn line_number(value: f64) -> String {
    if value.is_finite() {
        format!("{value:?}")
    } else {
        "0.0".to_string()
    }
}

/// Line protocol treats commas, spaces and equals signs as delimiters.
fn escape_key(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, ',' | ' ' | '=') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Number(n) => write!(f, "{n:?}"),
            FieldValue::Text(s) => f.write_str(s),
        }
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (kind, value) = match self.kind() {
            MeasurementKind::Simple(v) => ("SIMPLE", format!("{v:?}")),
            MeasurementKind::Complex => ("COMPLEX", "null".to_string()),
        };
        write!(
            f,
            "Measurement [name={}, type={}, value={}, time={}, timeUnit={}, tags={{",
            self.name(),
            kind,
            value,
            self.time(),
            self.time_unit()
        )?;
        for (i, (k, v)) in self.tags().iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{k}={v}")?;
        }
        f.write_str("}, fields={")?;
        for (i, (k, v)) in self.fields().iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{k}={v}")?;
        }
        f.write_str("}]")
    }
}
