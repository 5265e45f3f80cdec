//! Result normalization
//!
//! Flattens driver rows into `{rows, fields}`. Scalars keep their JSON type;
//! every compound value (arrays, json, geometric, ranges, composites, enums)
//! is rendered to text.

use bigdecimal::BigDecimal;
use rust_decimal::Decimal;
use sqlx::postgres::{PgColumn, PgRow, PgValueFormat, PgValueRef, Postgres};
use sqlx::{Column, Row, TypeInfo, ValueRef};
use uuid::Uuid;

use crate::engine::types::{Row as JsonRow, Value};

/// Column names in declared order, duplicates included.
pub fn field_names(columns: &[PgColumn]) -> Vec<String> {
    columns.iter().map(|c| c.name().to_string()).collect()
}

/// Converts a driver row into a JSON object keyed by column name.
pub fn normalize_row(row: &PgRow) -> JsonRow {
    let mut out = JsonRow::with_capacity(row.columns().len());
    for col in row.columns() {
        let value = extract_value(row, col.ordinal());
        out.insert(col.name().to_string(), value.into());
    }
    out
}

/// Normalizes a row set. `described` supplies the columns when no rows came back.
pub fn normalize(rows: &[PgRow], described: Option<&[PgColumn]>) -> (Vec<JsonRow>, Vec<String>) {
    let fields = match rows.first() {
        Some(first) => field_names(first.columns()),
        None => described.map(field_names).unwrap_or_default(),
    };
    (rows.iter().map(normalize_row).collect(), fields)
}

/// Extracts a value from a PgRow at the given index
pub fn extract_value(row: &PgRow, idx: usize) -> Value {
    let Ok(raw) = row.try_get_raw(idx) else {
        return Value::Null;
    };
    if raw.is_null() {
        return Value::Null;
    }

    let type_name = raw.type_info().name().to_string();
    match type_name.as_str() {
        "BOOL" => row
            .try_get::<bool, _>(idx)
            .map(Value::Bool)
            .unwrap_or_else(|_| raw_text(raw)),
        "INT2" => row
            .try_get::<i16, _>(idx)
            .map(|i| Value::Int(i as i64))
            .unwrap_or_else(|_| raw_text(raw)),
        "INT4" => row
            .try_get::<i32, _>(idx)
            .map(|i| Value::Int(i as i64))
            .unwrap_or_else(|_| raw_text(raw)),
        "INT8" => row
            .try_get::<i64, _>(idx)
            .map(Value::Int)
            .unwrap_or_else(|_| raw_text(raw)),
        "FLOAT4" => row
            .try_get::<f32, _>(idx)
            .map(|f| float_value(f as f64))
            .unwrap_or_else(|_| raw_text(raw)),
        "FLOAT8" => row
            .try_get::<f64, _>(idx)
            .map(float_value)
            .unwrap_or_else(|_| raw_text(raw)),
        "BYTEA" => row
            .try_get::<Vec<u8>, _>(idx)
            .map(|bytes| Value::Text(bytea_hex(&bytes)))
            .unwrap_or_else(|_| raw_text(raw)),
        _ => stringify(row, idx, raw),
    }
}

/// Finite floats stay numeric; NaN and infinities use PostgreSQL's spelling.
pub fn float_value(f: f64) -> Value {
    if f.is_finite() {
        Value::Float(f)
    } else if f.is_nan() {
        Value::Text("NaN".to_string())
    } else if f.is_sign_positive() {
        Value::Text("Infinity".to_string())
    } else {
        Value::Text("-Infinity".to_string())
    }
}

/// `\x`-prefixed lowercase hex, the server's default bytea output.
pub fn bytea_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;

    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("\\x");
    for b in bytes {
        let _ = write!(out, "{:02x}", b);
    }
    out
}

/// Text-format values are taken verbatim from the server. Binary-format
/// values (from parameterized statements) go through the typed decoders.
fn stringify(row: &PgRow, idx: usize, raw: PgValueRef<'_>) -> Value {
    if matches!(raw.format(), PgValueFormat::Text) {
        return raw_text(raw);
    }

    if let Ok(v) = row.try_get::<String, _>(idx) {
        return Value::Text(v);
    }
    if let Ok(v) = row.try_get::<BigDecimal, _>(idx) {
        return Value::Text(v.to_string());
    }
    if let Ok(v) = row.try_get::<Decimal, _>(idx) {
        return Value::Text(v.to_string());
    }
    if let Ok(v) = row.try_get::<Uuid, _>(idx) {
        return Value::Text(v.to_string());
    }
    if let Ok(v) = row.try_get::<serde_json::Value, _>(idx) {
        return Value::Text(v.to_string());
    }
    if let Ok(v) = row.try_get::<chrono::DateTime<chrono::Utc>, _>(idx) {
        return Value::Text(v.to_rfc3339());
    }
    if let Ok(v) = row.try_get::<chrono::NaiveDateTime, _>(idx) {
        return Value::Text(v.format("%Y-%m-%d %H:%M:%S%.f").to_string());
    }
    if let Ok(v) = row.try_get::<chrono::NaiveDate, _>(idx) {
        return Value::Text(v.format("%Y-%m-%d").to_string());
    }
    if let Ok(v) = row.try_get::<chrono::NaiveTime, _>(idx) {
        return Value::Text(v.format("%H:%M:%S%.f").to_string());
    }
    if let Ok(v) = row.try_get::<Vec<String>, _>(idx) {
        return Value::Text(array_literal(v));
    }
    if let Ok(v) = row.try_get::<Vec<i64>, _>(idx) {
        return Value::Text(array_literal(v));
    }
    if let Ok(v) = row.try_get::<Vec<i32>, _>(idx) {
        return Value::Text(array_literal(v));
    }

    raw_text(raw)
}

fn raw_text(raw: PgValueRef<'_>) -> Value {
    if let Ok(text) = raw.as_str() {
        return Value::Text(text.to_string());
    }
    match raw.as_bytes() {
        Ok(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
        Err(_) => Value::Null,
    }
}

fn array_literal<T: ToString>(items: Vec<T>) -> String {
    let inner: Vec<String> = items.iter().map(|i| i.to_string()).collect();
    format!("{{{}}}", inner.join(","))
}

/// Bind a Value to a Postgres query
pub(crate) fn bind_param<'q>(
    query: sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments>,
    value: &'q Value,
) -> sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments> {
    match value {
        Value::Null => query.bind(Option::<String>::None),
        Value::Bool(b) => query.bind(b),
        Value::Int(i) => query.bind(i),
        Value::Float(f) => query.bind(f),
        Value::Text(s) => query.bind(s),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_value() {
        assert_eq!(float_value(1.25), Value::Float(1.25));
        assert_eq!(float_value(f64::NAN), Value::Text("NaN".into()));
        assert_eq!(float_value(f64::INFINITY), Value::Text("Infinity".into()));
        assert_eq!(float_value(f64::NEG_INFINITY), Value::Text("-Infinity".into()));
    }

    #[test]
    fn test_bytea_hex() {
        assert_eq!(bytea_hex(&[]), "\\x");
        assert_eq!(bytea_hex(&[0xde, 0xad, 0x00, 0x0f]), "\\xdead000f");
    }

    #[test]
    fn test_array_literal() {
        assert_eq!(array_literal(vec![1, 2, 3]), "{1,2,3}");
        assert_eq!(array_literal(Vec::<i64>::new()), "{}");
    }

    #[test]
    fn test_normalize_empty_without_description() {
        let (rows, fields) = normalize(&[], None);
        assert!(rows.is_empty());
        assert!(fields.is_empty());
    }
}
