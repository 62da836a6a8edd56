//! Parser for RouterOS `print detail` style output
//!
//! RouterOS prints one `key: value` pair per line. A line starting with
//! `Flags:` opens a new record; output without any flags header is a single
//! record (e.g. `/system resource print`).
//!
//! ```text
//! Flags: X - disabled, R - running
//!  name: ether1
//!  type: ether
//!  mtu: 1500
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::trace;

const RECORD_SEPARATOR: &str = "Flags:";

/// A single typed field value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Int(v) => Some(*v),
            FieldValue::Float(v) => Some(*v as i64),
            FieldValue::Str(s) => s.parse().ok(),
            FieldValue::Bool(_) => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Int(v) => Some(*v as f64),
            FieldValue::Float(v) => Some(*v),
            FieldValue::Str(s) => s.parse().ok(),
            FieldValue::Bool(_) => None,
        }
    }

    /// RouterOS reports flags as `true`/`yes`
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            FieldValue::Str(s) => match s.to_ascii_lowercase().as_str() {
                "true" | "yes" => Some(true),
                "false" | "no" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// Render the value the way it would appear in command output
    pub fn to_text(&self) -> String {
        match self {
            FieldValue::Bool(b) => b.to_string(),
            FieldValue::Int(v) => v.to_string(),
            FieldValue::Float(v) => v.to_string(),
            FieldValue::Str(s) => s.clone(),
        }
    }
}

/// One parsed record: normalized field name to typed value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: BTreeMap<String, FieldValue>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: FieldValue) {
        self.fields.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    /// String view of a field; numeric and boolean values are rendered
    pub fn text(&self, key: &str) -> Option<String> {
        self.fields.get(key).map(FieldValue::to_text)
    }

    /// Like [`Record::text`] but empty when missing
    pub fn text_or_default(&self, key: &str) -> String {
        self.text(key).unwrap_or_default()
    }

    pub fn int(&self, key: &str) -> Option<i64> {
        self.fields.get(key).and_then(FieldValue::as_i64)
    }

    pub fn float(&self, key: &str) -> Option<f64> {
        self.fields.get(key).and_then(FieldValue::as_f64)
    }

    pub fn flag(&self, key: &str) -> bool {
        self.fields
            .get(key)
            .and_then(FieldValue::as_bool)
            .unwrap_or(false)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[derive(Debug, Clone, Copy)]
enum NumericKind {
    Int(i64),
    Float(f64),
}

/// Fields coerced to numbers, with the value used when coercion fails
const NUMERIC_FIELDS: &[(&str, NumericKind)] = &[
    ("mtu", NumericKind::Int(1500)),
    ("actual_mtu", NumericKind::Int(1500)),
    ("l2mtu", NumericKind::Int(0)),
    ("priority", NumericKind::Int(0)),
    ("cpu_count", NumericKind::Int(1)),
    ("frequency", NumericKind::Int(0)),
    ("tx_ccq", NumericKind::Float(0.0)),
    ("rx_ccq", NumericKind::Float(0.0)),
];

/// Lower-case the key and map spaces and hyphens to underscores
pub fn normalize_key(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|c| match c {
            ' ' | '-' => '_',
            c => c.to_ascii_lowercase(),
        })
        .collect()
}

fn coerce(key: &str, raw: &str) -> FieldValue {
    let numeric = NUMERIC_FIELDS
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, kind)| *kind);

    match numeric {
        Some(NumericKind::Int(default)) => FieldValue::Int(raw.parse().unwrap_or(default)),
        Some(NumericKind::Float(default)) => FieldValue::Float(raw.parse().unwrap_or(default)),
        None => match raw {
            "true" => FieldValue::Bool(true),
            "false" => FieldValue::Bool(false),
            _ => FieldValue::Str(raw.to_string()),
        },
    }
}

/// Parse multi-line command output into an ordered list of records
///
/// Total over all inputs: malformed lines are skipped and empty records are
/// dropped, so the result may be empty but never an error.
pub fn parse_records(text: &str) -> Vec<Record> {
    let mut records = Vec::new();
    let mut current = Record::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if line.starts_with(RECORD_SEPARATOR) {
            if !current.is_empty() {
                records.push(std::mem::take(&mut current));
            }
            continue;
        }

        let Some((raw_key, raw_value)) = line.split_once(':') else {
            trace!("skipping line without separator: {line}");
            continue;
        };

        let key = normalize_key(raw_key);
        if key.is_empty() {
            trace!("skipping line with empty key: {line}");
            continue;
        }

        let value = coerce(&key, raw_value.trim());
        current.insert(key, value);
    }

    if !current.is_empty() {
        records.push(current);
    }

    records
}

/// Render records back into `key: value` text, one `Flags:` header per record
pub fn render_records(records: &[Record]) -> String {
    let mut out = String::new();
    for record in records {
        out.push_str(RECORD_SEPARATOR);
        out.push('\n');
        for (key, value) in record.iter() {
            out.push_str(key);
            out.push_str(": ");
            out.push_str(&value.to_text());
            out.push('\n');
        }
    }
    out
}
