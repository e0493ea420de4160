//! Logical column types and the values stored in them.
//!
//! A [`LogicalType`] describes what a column holds independently of how the
//! database stores it; the storage mapping lives in the codec table of the
//! SQLite backend. A [`Value`] is the instance-level data bound to a column,
//! either read from a row or supplied to a query.

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};

use crate::error::ValueError;

/// Logical type of a declared column.
///
/// # Examples
///
/// ```
/// use microlite_core::LogicalType;
///
/// assert_eq!(LogicalType::Text.codec_name(), "TEXT");
/// assert_eq!(LogicalType::Reference("artist".into()).codec_name(), "INTEGER");
/// assert!(LogicalType::Reference("artist".into()).is_reference());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LogicalType {
    /// 64-bit signed integer.
    Integer,
    /// Double precision float.
    Real,
    /// UTF-8 text.
    Text,
    /// Raw bytes.
    Blob,
    /// Boolean, stored as 0/1.
    Boolean,
    /// Calendar date without time zone.
    Date,
    /// Date and time without time zone.
    DateTime,
    /// Signed duration with whole-second precision.
    Duration,
    /// Arbitrary JSON document.
    Json,
    /// Key of a row in another table.
    Reference(String),
    /// User-defined type resolved through a registered codec.
    Custom(String),
}

impl LogicalType {
    /// Name under which the codec for this type is registered.
    ///
    /// References share the integer codec since they store the referenced
    /// row's key.
    pub fn codec_name(&self) -> &str {
        match self {
            LogicalType::Integer | LogicalType::Reference(_) => "INTEGER",
            LogicalType::Real => "REAL",
            LogicalType::Text => "TEXT",
            LogicalType::Blob => "BLOB",
            LogicalType::Boolean => "BOOLEAN",
            LogicalType::Date => "DATE",
            LogicalType::DateTime => "DATETIME",
            LogicalType::Duration => "DURATION",
            LogicalType::Json => "JSON",
            LogicalType::Custom(name) => name,
        }
    }

    /// Returns the referenced table for reference types.
    pub fn referenced_table(&self) -> Option<&str> {
        match self {
            LogicalType::Reference(table) => Some(table),
            _ => None,
        }
    }

    /// Returns `true` for [`LogicalType::Reference`].
    pub fn is_reference(&self) -> bool {
        matches!(self, LogicalType::Reference(_))
    }
}

impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalType::Reference(table) => write!(f, "REFERENCE({table})"),
            other => f.write_str(other.codec_name()),
        }
    }
}

/// Action taken on a referencing row when the referenced row changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ForeignKeyAction {
    Restrict,
    SetNull,
    SetDefault,
    Cascade,
}

impl ForeignKeyAction {
    /// SQL spelling of the action.
    pub fn as_sql(&self) -> &'static str {
        match self {
            ForeignKeyAction::Restrict => "RESTRICT",
            ForeignKeyAction::SetNull => "SET NULL",
            ForeignKeyAction::SetDefault => "SET DEFAULT",
            ForeignKeyAction::Cascade => "CASCADE",
        }
    }
}

/// A value bound to a column.
///
/// # Examples
///
/// ```
/// use microlite_core::Value;
///
/// let v: Value = "Johannes Vermeer".into();
/// assert_eq!(v, Value::Text("Johannes Vermeer".to_string()));
///
/// let none: Value = Option::<i64>::None.into();
/// assert!(none.is_null());
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
    Boolean(bool),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Duration(TimeDelta),
    Json(serde_json::Value),
}

impl Value {
    /// Returns `true` for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short name of the variant, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Integer(_) => "integer",
            Value::Real(_) => "real",
            Value::Text(_) => "text",
            Value::Blob(_) => "blob",
            Value::Boolean(_) => "boolean",
            Value::Date(_) => "date",
            Value::DateTime(_) => "datetime",
            Value::Duration(_) => "duration",
            Value::Json(_) => "json",
        }
    }

    /// Extracts a typed value.
    pub fn to<T: FromValue>(&self) -> Result<T, ValueError> {
        T::from_value(self)
    }
}

macro_rules! impl_from_for_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v.into())
                }
            }
        )*
    };
}

impl_from_for_value! {
    i64 => Integer,
    i32 => Integer,
    u32 => Integer,
    f64 => Real,
    String => Text,
    &str => Text,
    Vec<u8> => Blob,
    bool => Boolean,
    NaiveDate => Date,
    NaiveDateTime => DateTime,
    TimeDelta => Duration,
    serde_json::Value => Json,
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Conversion from a [`Value`] into a Rust type.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Result<Self, ValueError>;
}

fn mismatch(expected: &'static str, found: &Value) -> ValueError {
    ValueError::TypeMismatch {
        expected,
        found: found.kind(),
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self, ValueError> {
        Ok(value.clone())
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Result<Self, ValueError> {
        match value {
            Value::Integer(i) => Ok(*i),
            other => Err(mismatch("integer", other)),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> Result<Self, ValueError> {
        let wide = i64::from_value(value)?;
        i32::try_from(wide).map_err(|_| ValueError::OutOfRange(wide.to_string()))
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self, ValueError> {
        match value {
            Value::Real(r) => Ok(*r),
            Value::Integer(i) => Ok(*i as f64),
            other => Err(mismatch("real", other)),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self, ValueError> {
        match value {
            Value::Boolean(b) => Ok(*b),
            other => Err(mismatch("boolean", other)),
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self, ValueError> {
        match value {
            Value::Text(s) => Ok(s.clone()),
            other => Err(mismatch("text", other)),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> Result<Self, ValueError> {
        match value {
            Value::Blob(b) => Ok(b.clone()),
            other => Err(mismatch("blob", other)),
        }
    }
}

impl FromValue for NaiveDate {
    fn from_value(value: &Value) -> Result<Self, ValueError> {
        match value {
            Value::Date(d) => Ok(*d),
            other => Err(mismatch("date", other)),
        }
    }
}

impl FromValue for NaiveDateTime {
    fn from_value(value: &Value) -> Result<Self, ValueError> {
        match value {
            Value::DateTime(dt) => Ok(*dt),
            other => Err(mismatch("datetime", other)),
        }
    }
}

impl FromValue for TimeDelta {
    fn from_value(value: &Value) -> Result<Self, ValueError> {
        match value {
            Value::Duration(d) => Ok(*d),
            other => Err(mismatch("duration", other)),
        }
    }
}

impl FromValue for serde_json::Value {
    fn from_value(value: &Value) -> Result<Self, ValueError> {
        match value {
            Value::Json(j) => Ok(j.clone()),
            other => Err(mismatch("json", other)),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self, ValueError> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}
