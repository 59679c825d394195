//! Typed cells and records shared by every import path, plus their SQL and
//! JSON conversions.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::types::{ToSql, ToSqlOutput, Value as SqlValue, ValueRef};
use rust_decimal::Decimal;
use serde_json::{Map, Value};

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A canonical record keyed by destination column name.
pub type Record = BTreeMap<String, Cell>;

/// One field of a canonical record.
///
/// Values enter as `Text`, `Integer`, `Decimal`, `Bool` or `Composite` straight
/// from JSON and are narrowed to `Date`/`DateTime`/`Decimal` by normalization
/// and validation.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Bool(bool),
    Integer(i64),
    Decimal(Decimal),
    Text(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Composite(Value),
}

impl Cell {
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Null => Cell::Null,
            Value::Bool(b) => Cell::Bool(b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Cell::Integer(i)
                } else {
                    let text = n.to_string();
                    Decimal::from_str(&text)
                        .or_else(|_| Decimal::from_scientific(&text))
                        .map(Cell::Decimal)
                        .unwrap_or(Cell::Text(text))
                }
            }
            Value::String(s) => Cell::Text(s),
            composite @ (Value::Array(_) | Value::Object(_)) => Cell::Composite(composite),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    pub fn is_composite(&self) -> bool {
        matches!(self, Cell::Composite(_))
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Cell::Null => Value::Null,
            Cell::Bool(b) => Value::Bool(*b),
            Cell::Integer(i) => Value::from(*i),
            Cell::Decimal(d) => Value::String(d.normalize().to_string()),
            Cell::Text(s) => Value::String(s.clone()),
            Cell::Date(d) => Value::String(d.format(DATE_FORMAT).to_string()),
            Cell::DateTime(dt) => Value::String(dt.format(DATETIME_FORMAT).to_string()),
            Cell::Composite(v) => v.clone(),
        }
    }

    pub fn as_display(&self) -> String {
        match self {
            Cell::Null => String::new(),
            Cell::Bool(b) => b.to_string(),
            Cell::Integer(i) => i.to_string(),
            Cell::Decimal(d) => d.normalize().to_string(),
            Cell::Text(s) => s.clone(),
            Cell::Date(d) => d.format(DATE_FORMAT).to_string(),
            Cell::DateTime(dt) => dt.format(DATETIME_FORMAT).to_string(),
            Cell::Composite(v) => v.to_string(),
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

impl From<Option<Decimal>> for Cell {
    fn from(value: Option<Decimal>) -> Self {
        value.map(Cell::Decimal).unwrap_or(Cell::Null)
    }
}

impl From<Option<String>> for Cell {
    fn from(value: Option<String>) -> Self {
        value.map(Cell::Text).unwrap_or(Cell::Null)
    }
}

impl From<Option<NaiveDate>> for Cell {
    fn from(value: Option<NaiveDate>) -> Self {
        value.map(Cell::Date).unwrap_or(Cell::Null)
    }
}

impl From<Option<NaiveDateTime>> for Cell {
    fn from(value: Option<NaiveDateTime>) -> Self {
        value.map(Cell::DateTime).unwrap_or(Cell::Null)
    }
}

impl ToSql for Cell {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Cell::Null => ToSqlOutput::Owned(SqlValue::Null),
            Cell::Bool(b) => ToSqlOutput::Owned(SqlValue::Integer(i64::from(*b))),
            Cell::Integer(i) => ToSqlOutput::Owned(SqlValue::Integer(*i)),
            Cell::Decimal(d) => ToSqlOutput::Owned(SqlValue::Text(d.normalize().to_string())),
            Cell::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Cell::Date(d) => ToSqlOutput::Owned(SqlValue::Text(d.format(DATE_FORMAT).to_string())),
            Cell::DateTime(dt) => {
                ToSqlOutput::Owned(SqlValue::Text(dt.format(DATETIME_FORMAT).to_string()))
            }
            Cell::Composite(v) => ToSqlOutput::Owned(SqlValue::Text(v.to_string())),
        })
    }
}

/// A decoded stream element before it is known to be a row.
#[derive(Debug, Clone, PartialEq)]
pub enum RawElement {
    Object(Map<String, Value>),
    Array(Vec<Value>),
    Scalar(Value),
    Null,
}

impl RawElement {
    pub fn kind(&self) -> &'static str {
        match self {
            RawElement::Object(_) => "object",
            RawElement::Array(_) => "array",
            RawElement::Scalar(_) => "scalar",
            RawElement::Null => "null",
        }
    }

    pub fn into_json(self) -> Value {
        match self {
            RawElement::Object(map) => Value::Object(map),
            RawElement::Array(items) => Value::Array(items),
            RawElement::Scalar(v) => v,
            RawElement::Null => Value::Null,
        }
    }
}

impl From<Value> for RawElement {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => RawElement::Object(map),
            Value::Array(items) => RawElement::Array(items),
            Value::Null => RawElement::Null,
            scalar => RawElement::Scalar(scalar),
        }
    }
}

pub fn record_to_json(record: &Record) -> Value {
    Value::Object(
        record
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect(),
    )
}
