//! InfluxDB-style line protocol encoding.
//!
//! ```text
//! table,tag_a=1,tag_b=x field_a=1i,field_b="text",field_c=t 1700000000000000000\n
//! ```
//!
//! Encoding is pure and total: every input produces a line ending in exactly
//! one `\n`. Tags and fields are emitted in sorted key order so identical
//! inputs always encode to identical bytes.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde_json::Value;

/// A typed field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Rendered with an `i` suffix.
    Integer(i64),
    /// Rendered with an `i` suffix when integer-valued, bare otherwise.
    Float(f64),
    /// Rendered as `t` / `f`.
    Bool(bool),
    /// Rendered quoted and escaped.
    Str(String),
    /// Rendered as an empty string.
    Null,
}

/// Sorted field set of a point.
pub type Fields = BTreeMap<String, FieldValue>;

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Integer(v)
    }
}

impl From<u64> for FieldValue {
    fn from(v: u64) -> Self {
        i64::try_from(v)
            .map(FieldValue::Integer)
            .unwrap_or(FieldValue::Float(v as f64))
    }
}

impl From<usize> for FieldValue {
    fn from(v: usize) -> Self {
        FieldValue::from(v as u64)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Str(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Str(v)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(FieldValue::Null)
    }
}

impl From<&Value> for FieldValue {
    fn from(v: &Value) -> Self {
        match v {
            Value::Null => FieldValue::Null,
            Value::Bool(b) => FieldValue::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => FieldValue::Integer(i),
                None => FieldValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => FieldValue::Str(s.clone()),
            other => FieldValue::Str(other.to_string()),
        }
    }
}

/// A point ready for encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub table: String,
    pub tags: BTreeMap<String, String>,
    pub fields: Fields,
    pub timestamp_nanos: Option<i64>,
}

impl Point {
    /// Start a point for `table` with no tags, fields, or timestamp.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            tags: BTreeMap::new(),
            fields: Fields::new(),
            timestamp_nanos: None,
        }
    }

    /// Add a tag.
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Add a field.
    pub fn field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Set an explicit timestamp in nanoseconds since the epoch.
    pub fn timestamp_nanos(mut self, nanos: i64) -> Self {
        self.timestamp_nanos = Some(nanos);
        self
    }

    /// Stamp the point with `at`.
    pub fn at(self, at: DateTime<Utc>) -> Self {
        match at.timestamp_nanos_opt() {
            Some(nanos) => self.timestamp_nanos(nanos),
            None => self,
        }
    }

    /// Whether the point carries at least one field.
    pub fn has_fields(&self) -> bool {
        !self.fields.is_empty()
    }

    /// Encode the point as one line.
    pub fn to_line(&self) -> String {
        build_line(&self.table, &self.tags, &self.fields, self.timestamp_nanos)
    }
}

/// Encode one line-protocol line.
///
/// Tags with empty values are omitted because the wire format cannot carry
/// them. Non-finite floats are treated as null.
pub fn build_line(
    table: &str,
    tags: &BTreeMap<String, String>,
    fields: &Fields,
    timestamp_nanos: Option<i64>,
) -> String {
    let mut line = escape_key(table);

    for (key, value) in tags {
        if value.is_empty() {
            continue;
        }
        line.push(',');
        line.push_str(&escape_key(key));
        line.push('=');
        line.push_str(&escape_key(value));
    }

    let mut first = true;
    for (key, value) in fields {
        line.push(if first { ' ' } else { ',' });
        first = false;
        line.push_str(&escape_key(key));
        line.push('=');
        line.push_str(&format_field(value));
    }

    if let Some(ts) = timestamp_nanos {
        let _ = write!(line, " {}", ts);
    }

    line.push('\n');
    line
}

/// Escape a table name, tag key, tag value, or field key.
pub fn escape_key(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\\' | ',' | '=' | ' ' => {
                out.push('\\');
                out.push(c);
            }
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out
}

/// Escape the body of a quoted string field.
pub fn escape_string_field(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 2);
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out
}

/// Render one field value.
pub fn format_field(value: &FieldValue) -> String {
    match value {
        FieldValue::Integer(i) => format!("{}i", i),
        FieldValue::Float(f) if !f.is_finite() => "\"\"".to_string(),
        FieldValue::Float(f) if is_integer_valued(*f) => format!("{}i", *f as i64),
        FieldValue::Float(f) => format!("{}", f),
        FieldValue::Bool(true) => "t".to_string(),
        FieldValue::Bool(false) => "f".to_string(),
        FieldValue::Str(s) => format!("\"{}\"", escape_string_field(s)),
        FieldValue::Null => "\"\"".to_string(),
    }
}

fn is_integer_valued(f: f64) -> bool {
    f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64
}
