//! Row values moved from MySQL to PostgreSQL.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;

/// A single column value as decoded from the source.
///
/// Raw byte strings for textual columns are decoded to [`SqlValue::Text`]
/// by the reader; only genuinely binary columns stay as [`SqlValue::Bytes`].
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    F32(f32),
    F64(f64),
    Decimal(Decimal),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Render the value in PostgreSQL text input format, `None` for NULL.
    pub fn to_pg_text(&self) -> Option<String> {
        let text = match self {
            SqlValue::Null => return None,
            SqlValue::Bool(b) => if *b { "t" } else { "f" }.to_string(),
            SqlValue::Int(i) => i.to_string(),
            SqlValue::UInt(u) => u.to_string(),
            SqlValue::F32(f) if f.is_finite() => f.to_string(),
            SqlValue::F32(f) => format_float(*f as f64),
            SqlValue::F64(f) => format_float(*f),
            SqlValue::Decimal(d) => d.to_string(),
            SqlValue::Text(s) => s.clone(),
            SqlValue::Bytes(b) => format!("\\x{}", hex::encode(b)),
            SqlValue::Date(d) => d.format("%Y-%m-%d").to_string(),
            SqlValue::Time(t) => t.format("%H:%M:%S%.f").to_string(),
            SqlValue::DateTime(dt) => dt.format("%Y-%m-%d %H:%M:%S%.f").to_string(),
        };
        Some(text)
    }
}

fn format_float(f: f64) -> String {
    if f.is_nan() {
        "NaN".to_string()
    } else if f.is_infinite() {
        if f > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else {
        f.to_string()
    }
}

/// One source row, values in column order.
pub type Row = Vec<SqlValue>;

/// Keyset cursor value taken from the primary-key column of the last row.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum PkValue {
    Int(i64),
    UInt(u64),
    Text(String),
    /// Binary keys, compared bytewise like MySQL does.
    Bytes(Vec<u8>),
}

impl PkValue {
    /// Derive a cursor from a row value. NULL cannot act as a cursor.
    pub fn from_value(value: &SqlValue) -> Option<Self> {
        match value {
            SqlValue::Null => None,
            SqlValue::Int(i) => Some(PkValue::Int(*i)),
            SqlValue::UInt(u) => Some(PkValue::UInt(*u)),
            SqlValue::Bool(b) => Some(PkValue::Int(*b as i64)),
            SqlValue::Bytes(b) => Some(PkValue::Bytes(b.clone())),
            other => other.to_pg_text().map(PkValue::Text),
        }
    }
}

impl std::fmt::Display for PkValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PkValue::Int(v) => write!(f, "{}", v),
            PkValue::UInt(v) => write!(f, "{}", v),
            PkValue::Text(v) => write!(f, "{}", v),
            PkValue::Bytes(v) => write!(f, "\\x{}", hex::encode(v)),
        }
    }
}
