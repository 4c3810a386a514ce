//! Conversions between record field types and SQLite values.
//!
//! # Responsibility
//! - Bind typed field values as SQLite parameters.
//! - Coerce raw column values into declared field types.
//!
//! # Invariants
//! - UUIDs are stored as hyphenated lower-case text.
//! - Date-times are stored as `YYYY-MM-DD HH:MM:SS[.fff]` text.
//! - Integer date-time values are read as Unix epoch milliseconds.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rusqlite::types::Value;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use uuid::Uuid;

const DATE_TIME_STORAGE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";
const DATE_STORAGE_FORMAT: &str = "%Y-%m-%d";
const DATE_TIME_PARSE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// Failure to coerce one raw value into a field type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoercionError {
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
    Parse {
        expected: &'static str,
        value: String,
    },
    OutOfRange {
        expected: &'static str,
        value: String,
    },
    UnknownField(String),
}

impl Display for CoercionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TypeMismatch { expected, found } => {
                write!(f, "expected {expected}, found {found}")
            }
            Self::Parse { expected, value } => write!(f, "cannot parse `{value}` as {expected}"),
            Self::OutOfRange { expected, value } => {
                write!(f, "value `{value}` is out of range for {expected}")
            }
            Self::UnknownField(field) => write!(f, "unknown field `{field}`"),
        }
    }
}

impl Error for CoercionError {}

/// A field type that can be bound as a parameter and read back from a row.
pub trait ColumnValue: Sized {
    fn to_sql_value(&self) -> Value;
    fn from_sql_value(value: Value) -> Result<Self, CoercionError>;
}

/// A primary-key type the repository can mint on insert.
pub trait EntityKey: ColumnValue + Clone + Debug + PartialEq + Send + Sync + 'static {
    fn generate() -> Self;
}

impl EntityKey for Uuid {
    fn generate() -> Self {
        Uuid::new_v4()
    }
}

impl EntityKey for String {
    fn generate() -> Self {
        Uuid::new_v4().to_string()
    }
}

/// Short type label for diagnostics.
pub fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Integer(_) => "integer",
        Value::Real(_) => "real",
        Value::Text(_) => "text",
        Value::Blob(_) => "blob",
    }
}

impl<T: ColumnValue> ColumnValue for Option<T> {
    fn to_sql_value(&self) -> Value {
        match self {
            Some(value) => value.to_sql_value(),
            None => Value::Null,
        }
    }

    fn from_sql_value(value: Value) -> Result<Self, CoercionError> {
        match value {
            Value::Null => Ok(None),
            other => T::from_sql_value(other).map(Some),
        }
    }
}

impl ColumnValue for String {
    fn to_sql_value(&self) -> Value {
        Value::Text(self.clone())
    }

    fn from_sql_value(value: Value) -> Result<Self, CoercionError> {
        match value {
            Value::Text(text) => Ok(text),
            Value::Integer(number) => Ok(number.to_string()),
            Value::Real(number) => Ok(number.to_string()),
            Value::Blob(bytes) => String::from_utf8(bytes).map_err(|_| CoercionError::TypeMismatch {
                expected: "text",
                found: "non-utf8 blob",
            }),
            Value::Null => Err(mismatch("text", &Value::Null)),
        }
    }
}

impl ColumnValue for i64 {
    fn to_sql_value(&self) -> Value {
        Value::Integer(*self)
    }

    fn from_sql_value(value: Value) -> Result<Self, CoercionError> {
        match value {
            Value::Integer(number) => Ok(number),
            Value::Real(number)
                if number.fract() == 0.0
                    && number >= i64::MIN as f64
                    && number <= i64::MAX as f64 =>
            {
                Ok(number as i64)
            }
            Value::Real(number) => Err(CoercionError::OutOfRange {
                expected: "integer",
                value: number.to_string(),
            }),
            Value::Text(text) => text.trim().parse().map_err(|_| CoercionError::Parse {
                expected: "integer",
                value: text,
            }),
            other => Err(mismatch("integer", &other)),
        }
    }
}

impl ColumnValue for i32 {
    fn to_sql_value(&self) -> Value {
        Value::Integer(i64::from(*self))
    }

    fn from_sql_value(value: Value) -> Result<Self, CoercionError> {
        let wide = i64::from_sql_value(value)?;
        i32::try_from(wide).map_err(|_| CoercionError::OutOfRange {
            expected: "32-bit integer",
            value: wide.to_string(),
        })
    }
}

impl ColumnValue for f64 {
    fn to_sql_value(&self) -> Value {
        Value::Real(*self)
    }

    fn from_sql_value(value: Value) -> Result<Self, CoercionError> {
        match value {
            Value::Real(number) => Ok(number),
            Value::Integer(number) => Ok(number as f64),
            Value::Text(text) => text.trim().parse().map_err(|_| CoercionError::Parse {
                expected: "real",
                value: text,
            }),
            other => Err(mismatch("real", &other)),
        }
    }
}

impl ColumnValue for bool {
    fn to_sql_value(&self) -> Value {
        Value::Integer(i64::from(*self))
    }

    fn from_sql_value(value: Value) -> Result<Self, CoercionError> {
        match value {
            Value::Integer(number) => Ok(number != 0),
            Value::Text(text) => match text.trim().to_ascii_lowercase().as_str() {
                "1" | "true" => Ok(true),
                "0" | "false" => Ok(false),
                _ => Err(CoercionError::Parse {
                    expected: "boolean",
                    value: text,
                }),
            },
            other => Err(mismatch("boolean", &other)),
        }
    }
}

impl ColumnValue for Uuid {
    fn to_sql_value(&self) -> Value {
        Value::Text(self.hyphenated().to_string())
    }

    fn from_sql_value(value: Value) -> Result<Self, CoercionError> {
        match value {
            Value::Text(text) => Uuid::parse_str(text.trim()).map_err(|_| CoercionError::Parse {
                expected: "uuid",
                value: text,
            }),
            Value::Blob(bytes) => Uuid::from_slice(&bytes).map_err(|_| CoercionError::Parse {
                expected: "uuid",
                value: format!("<{} byte blob>", bytes.len()),
            }),
            other => Err(mismatch("uuid", &other)),
        }
    }
}

impl ColumnValue for NaiveDateTime {
    fn to_sql_value(&self) -> Value {
        Value::Text(self.format(DATE_TIME_STORAGE_FORMAT).to_string())
    }

    fn from_sql_value(value: Value) -> Result<Self, CoercionError> {
        match value {
            Value::Text(text) => parse_date_time(&text).ok_or(CoercionError::Parse {
                expected: "date-time",
                value: text,
            }),
            Value::Integer(millis) => DateTime::from_timestamp_millis(millis)
                .map(|value| value.naive_utc())
                .ok_or(CoercionError::OutOfRange {
                    expected: "date-time",
                    value: millis.to_string(),
                }),
            other => Err(mismatch("date-time", &other)),
        }
    }
}

impl ColumnValue for NaiveDate {
    fn to_sql_value(&self) -> Value {
        Value::Text(self.format(DATE_STORAGE_FORMAT).to_string())
    }

    fn from_sql_value(value: Value) -> Result<Self, CoercionError> {
        match value {
            Value::Text(text) => NaiveDate::parse_from_str(text.trim(), DATE_STORAGE_FORMAT)
                .ok()
                .or_else(|| parse_date_time(&text).map(|value| value.date()))
                .ok_or(CoercionError::Parse {
                    expected: "date",
                    value: text,
                }),
            other => NaiveDateTime::from_sql_value(other).map(|value| value.date()),
        }
    }
}

fn parse_date_time(text: &str) -> Option<NaiveDateTime> {
    let trimmed = text.trim();
    DATE_TIME_PARSE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
        .or_else(|| {
            DateTime::parse_from_rfc3339(trimmed)
                .ok()
                .map(|value| value.naive_utc())
        })
        .or_else(|| {
            NaiveDate::parse_from_str(trimmed, DATE_STORAGE_FORMAT)
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

fn mismatch(expected: &'static str, found: &Value) -> CoercionError {
    CoercionError::TypeMismatch {
        expected,
        found: value_kind(found),
    }
}
