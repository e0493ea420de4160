//! Conversion between logical [`Value`]s and SQLite storage values.
//!
//! Every [`LogicalType`] is stored through a [`Codec`] looked up by the
//! type's codec name in a [`CodecTable`]. The table comes with codecs for
//! the built-in types and can be extended with codecs for
//! [`LogicalType::Custom`] types, or have built-ins replaced.
//!
//! | Type       | Declared SQL type | Storage                         |
//! |------------|-------------------|---------------------------------|
//! | `Integer`  | `INTEGER`         | integer                         |
//! | `Real`     | `REAL`            | real (integers are widened)     |
//! | `Text`     | `TEXT`            | text                            |
//! | `Blob`     | `BLOB`            | blob                            |
//! | `Boolean`  | `BOOLEAN`         | integer 0/1                     |
//! | `Date`     | `DATE`            | text `YYYY-MM-DD`               |
//! | `DateTime` | `DATETIME`        | text `YYYY-MM-DDTHH:MM:SS[.f]`  |
//! | `Duration` | `DURATION`        | integer seconds                 |
//! | `Json`     | `TEXT`            | serialized JSON text            |
//!
//! `NULL` bypasses codecs entirely in both directions.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use microlite_core::{LogicalType, Schema, SchemaError, Value};
pub use rusqlite::types::Value as SqlValue;

use crate::error::{Result, SqliteError};

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Encodes and decodes values of one logical type.
///
/// Codecs never see `NULL`; the [`CodecTable`] handles it before dispatch.
pub trait Codec: Send + Sync {
    /// Type name used in `CREATE TABLE`.
    fn sql_type(&self) -> &str;

    /// Converts a value into its storage form.
    fn encode(&self, value: &Value) -> std::result::Result<SqlValue, String>;

    /// Converts a stored value back into a logical value.
    fn decode(&self, raw: SqlValue) -> std::result::Result<Value, String>;
}

fn cannot_encode(value: &Value, sql_type: &str) -> String {
    format!("cannot store {} value in a {sql_type} column", value.kind())
}

fn cannot_decode(raw: &SqlValue, sql_type: &str) -> String {
    format!("cannot read {:?} from a {sql_type} column", raw.data_type())
}

struct IntegerCodec;

impl Codec for IntegerCodec {
    fn sql_type(&self) -> &str {
        "INTEGER"
    }

    fn encode(&self, value: &Value) -> std::result::Result<SqlValue, String> {
        match value {
            Value::Integer(i) => Ok(SqlValue::Integer(*i)),
            other => Err(cannot_encode(other, self.sql_type())),
        }
    }

    fn decode(&self, raw: SqlValue) -> std::result::Result<Value, String> {
        match raw {
            SqlValue::Integer(i) => Ok(Value::Integer(i)),
            other => Err(cannot_decode(&other, self.sql_type())),
        }
    }
}

struct RealCodec;

impl Codec for RealCodec {
    fn sql_type(&self) -> &str {
        "REAL"
    }

    fn encode(&self, value: &Value) -> std::result::Result<SqlValue, String> {
        match value {
            Value::Real(r) => Ok(SqlValue::Real(*r)),
            Value::Integer(i) => Ok(SqlValue::Real(*i as f64)),
            other => Err(cannot_encode(other, self.sql_type())),
        }
    }

    fn decode(&self, raw: SqlValue) -> std::result::Result<Value, String> {
        match raw {
            SqlValue::Real(r) => Ok(Value::Real(r)),
            SqlValue::Integer(i) => Ok(Value::Real(i as f64)),
            other => Err(cannot_decode(&other, self.sql_type())),
        }
    }
}

struct TextCodec;

impl Codec for TextCodec {
    fn sql_type(&self) -> &str {
        "TEXT"
    }

    fn encode(&self, value: &Value) -> std::result::Result<SqlValue, String> {
        match value {
            Value::Text(s) => Ok(SqlValue::Text(s.clone())),
            other => Err(cannot_encode(other, self.sql_type())),
        }
    }

    fn decode(&self, raw: SqlValue) -> std::result::Result<Value, String> {
        match raw {
            SqlValue::Text(s) => Ok(Value::Text(s)),
            other => Err(cannot_decode(&other, self.sql_type())),
        }
    }
}

struct BlobCodec;

impl Codec for BlobCodec {
    fn sql_type(&self) -> &str {
        "BLOB"
    }

    fn encode(&self, value: &Value) -> std::result::Result<SqlValue, String> {
        match value {
            Value::Blob(b) => Ok(SqlValue::Blob(b.clone())),
            other => Err(cannot_encode(other, self.sql_type())),
        }
    }

    fn decode(&self, raw: SqlValue) -> std::result::Result<Value, String> {
        match raw {
            SqlValue::Blob(b) => Ok(Value::Blob(b)),
            other => Err(cannot_decode(&other, self.sql_type())),
        }
    }
}

struct BooleanCodec;

impl Codec for BooleanCodec {
    fn sql_type(&self) -> &str {
        "BOOLEAN"
    }

    fn encode(&self, value: &Value) -> std::result::Result<SqlValue, String> {
        match value {
            Value::Boolean(b) => Ok(SqlValue::Integer(i64::from(*b))),
            other => Err(cannot_encode(other, self.sql_type())),
        }
    }

    fn decode(&self, raw: SqlValue) -> std::result::Result<Value, String> {
        match raw {
            SqlValue::Integer(i) => Ok(Value::Boolean(i != 0)),
            other => Err(cannot_decode(&other, self.sql_type())),
        }
    }
}

struct DateCodec;

impl Codec for DateCodec {
    fn sql_type(&self) -> &str {
        "DATE"
    }

    fn encode(&self, value: &Value) -> std::result::Result<SqlValue, String> {
        match value {
            Value::Date(d) => Ok(SqlValue::Text(d.format(DATE_FORMAT).to_string())),
            other => Err(cannot_encode(other, self.sql_type())),
        }
    }

    fn decode(&self, raw: SqlValue) -> std::result::Result<Value, String> {
        match raw {
            SqlValue::Text(s) => NaiveDate::parse_from_str(&s, DATE_FORMAT)
                .map(Value::Date)
                .map_err(|e| format!("invalid date '{s}': {e}")),
            other => Err(cannot_decode(&other, self.sql_type())),
        }
    }
}

struct DateTimeCodec;

impl Codec for DateTimeCodec {
    fn sql_type(&self) -> &str {
        "DATETIME"
    }

    fn encode(&self, value: &Value) -> std::result::Result<SqlValue, String> {
        match value {
            Value::DateTime(dt) => Ok(SqlValue::Text(dt.format(DATETIME_FORMAT).to_string())),
            other => Err(cannot_encode(other, self.sql_type())),
        }
    }

    fn decode(&self, raw: SqlValue) -> std::result::Result<Value, String> {
        match raw {
            // SQLite's own datetime() functions use a space separator.
            SqlValue::Text(s) => NaiveDateTime::parse_from_str(&s, DATETIME_FORMAT)
                .or_else(|_| NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S%.f"))
                .map(Value::DateTime)
                .map_err(|e| format!("invalid datetime '{s}': {e}")),
            other => Err(cannot_decode(&other, self.sql_type())),
        }
    }
}

struct DurationCodec;

impl Codec for DurationCodec {
    fn sql_type(&self) -> &str {
        "DURATION"
    }

    fn encode(&self, value: &Value) -> std::result::Result<SqlValue, String> {
        match value {
            Value::Duration(d) => Ok(SqlValue::Integer(d.num_seconds())),
            other => Err(cannot_encode(other, self.sql_type())),
        }
    }

    fn decode(&self, raw: SqlValue) -> std::result::Result<Value, String> {
        match raw {
            SqlValue::Integer(secs) => TimeDelta::try_seconds(secs)
                .map(Value::Duration)
                .ok_or_else(|| format!("duration of {secs} seconds is out of range")),
            other => Err(cannot_decode(&other, self.sql_type())),
        }
    }
}

struct JsonCodec;

impl Codec for JsonCodec {
    fn sql_type(&self) -> &str {
        "TEXT"
    }

    fn encode(&self, value: &Value) -> std::result::Result<SqlValue, String> {
        match value {
            Value::Json(j) => Ok(SqlValue::Text(j.to_string())),
            other => Err(cannot_encode(other, "JSON")),
        }
    }

    fn decode(&self, raw: SqlValue) -> std::result::Result<Value, String> {
        match raw {
            SqlValue::Text(s) => serde_json::from_str(&s)
                .map(Value::Json)
                .map_err(|e| format!("invalid JSON document: {e}")),
            other => Err(cannot_decode(&other, "JSON")),
        }
    }
}

/// Codecs keyed by [`LogicalType::codec_name`].
///
/// # Examples
///
/// ```
/// use microlite_core::{LogicalType, Value};
/// use microlite_sqlite::{CodecTable, SqlValue};
///
/// let codecs = CodecTable::new();
/// let stored = codecs.encode(&LogicalType::Boolean, &Value::Boolean(true)).unwrap();
/// assert_eq!(stored, SqlValue::Integer(1));
/// assert_eq!(codecs.sql_type(&LogicalType::Date).unwrap(), "DATE");
/// ```
#[derive(Clone)]
pub struct CodecTable {
    codecs: HashMap<String, Arc<dyn Codec>>,
}

impl Default for CodecTable {
    fn default() -> Self {
        let mut table = Self {
            codecs: HashMap::new(),
        };
        table
            .register("INTEGER", IntegerCodec)
            .register("REAL", RealCodec)
            .register("TEXT", TextCodec)
            .register("BLOB", BlobCodec)
            .register("BOOLEAN", BooleanCodec)
            .register("DATE", DateCodec)
            .register("DATETIME", DateTimeCodec)
            .register("DURATION", DurationCodec)
            .register("JSON", JsonCodec);
        table
    }
}

impl fmt::Debug for CodecTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.codecs.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("CodecTable").field("codecs", &names).finish()
    }
}

impl CodecTable {
    /// Creates a table holding the built-in codecs.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `codec` under `name`, replacing any existing codec.
    pub fn register(&mut self, name: impl Into<String>, codec: impl Codec + 'static) -> &mut Self {
        self.codecs.insert(name.into(), Arc::new(codec));
        self
    }

    pub fn get(&self, ty: &LogicalType) -> Option<&dyn Codec> {
        self.codecs.get(ty.codec_name()).map(|c| c.as_ref())
    }

    fn codec(&self, ty: &LogicalType) -> Result<&dyn Codec> {
        self.get(ty)
            .ok_or_else(|| SqliteError::ParameterError(format!("no codec registered for type {ty}")))
    }

    /// Declared SQL type for columns of `ty`.
    pub fn sql_type(&self, ty: &LogicalType) -> Result<&str> {
        Ok(self.codec(ty)?.sql_type())
    }

    /// Encodes a value bound to a column of type `ty`.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::ParameterError`] when the codec does not accept
    /// the value's variant.
    pub fn encode(&self, ty: &LogicalType, value: &Value) -> Result<SqlValue> {
        if value.is_null() {
            return Ok(SqlValue::Null);
        }
        self.codec(ty)?
            .encode(value)
            .map_err(SqliteError::ParameterError)
    }

    /// Decodes a stored value read from a column of type `ty`.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::ConversionError`] when the stored value cannot
    /// be decoded.
    pub fn decode(&self, ty: &LogicalType, raw: SqlValue) -> Result<Value> {
        if matches!(raw, SqlValue::Null) {
            return Ok(Value::Null);
        }
        self.codec(ty)?
            .decode(raw)
            .map_err(SqliteError::ConversionError)
    }

    /// Renders `value` as an SQL literal for use in DDL defaults.
    ///
    /// Returns `None` for `NULL`.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::ParameterError`] for values the codec rejects
    /// and for non-finite reals, which have no SQL literal.
    pub fn literal(&self, ty: &LogicalType, value: &Value) -> Result<Option<String>> {
        let literal = match self.encode(ty, value)? {
            SqlValue::Null => return Ok(None),
            SqlValue::Integer(i) => i.to_string(),
            SqlValue::Real(r) if !r.is_finite() => {
                return Err(SqliteError::ParameterError(format!(
                    "default {r} has no SQL literal"
                )));
            }
            SqlValue::Real(r) => format!("{r:?}"),
            SqlValue::Text(s) => format!("'{}'", s.replace('\'', "''")),
            SqlValue::Blob(b) => {
                let hex: String = b.iter().map(|byte| format!("{byte:02X}")).collect();
                format!("X'{hex}'")
            }
        };
        Ok(Some(literal))
    }

    /// Checks that every declared column type has a codec.
    pub fn check_schema(&self, schema: &Schema) -> Result<()> {
        for table in schema.tables() {
            for field in table.fields() {
                if self.get(field.logical_type()).is_none() {
                    return Err(SchemaError::UnsupportedType {
                        table: table.name().to_string(),
                        column: field.name().to_string(),
                        ty: field.logical_type().to_string(),
                    }
                    .into());
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use microlite_core::{Field, ModelDecl, Registry};

    struct UpperCodec;

    impl Codec for UpperCodec {
        fn sql_type(&self) -> &str {
            "TEXT"
        }

        fn encode(&self, value: &Value) -> std::result::Result<SqlValue, String> {
            match value {
                Value::Text(s) => Ok(SqlValue::Text(s.to_uppercase())),
                other => Err(format!("unsupported {}", other.kind())),
            }
        }

        fn decode(&self, raw: SqlValue) -> std::result::Result<Value, String> {
            match raw {
                SqlValue::Text(s) => Ok(Value::Text(s.to_lowercase())),
                _ => Err("expected text".to_string()),
            }
        }
    }

    #[test]
    fn test_boolean_round_trip() {
        let codecs = CodecTable::new();
        let stored = codecs
            .encode(&LogicalType::Boolean, &Value::Boolean(false))
            .unwrap();
        assert_eq!(stored, SqlValue::Integer(0));
        assert_eq!(
            codecs.decode(&LogicalType::Boolean, SqlValue::Integer(1)).unwrap(),
            Value::Boolean(true)
        );
    }

    #[test]
    fn test_date_storage() {
        let codecs = CodecTable::new();
        let date = NaiveDate::from_ymd_opt(1000, 1, 1).unwrap();
        let stored = codecs.encode(&LogicalType::Date, &Value::Date(date)).unwrap();
        assert_eq!(stored, SqlValue::Text("1000-01-01".into()));
        assert_eq!(
            codecs.decode(&LogicalType::Date, stored).unwrap(),
            Value::Date(date)
        );
    }

    #[test]
    fn test_datetime_accepts_space_separator() {
        let codecs = CodecTable::new();
        let decoded = codecs
            .decode(
                &LogicalType::DateTime,
                SqlValue::Text("2024-03-01 12:30:00".into()),
            )
            .unwrap();
        let expected = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(12, 30, 0)
            .unwrap();
        assert_eq!(decoded, Value::DateTime(expected));
    }

    #[test]
    fn test_duration_truncates_to_seconds() {
        let codecs = CodecTable::new();
        let d = TimeDelta::milliseconds(90_500);
        let stored = codecs.encode(&LogicalType::Duration, &Value::Duration(d)).unwrap();
        assert_eq!(stored, SqlValue::Integer(90));
    }

    #[test]
    fn test_json_stored_as_text() {
        let codecs = CodecTable::new();
        let doc = serde_json::json!({"tags": ["oil", "canvas"]});
        let stored = codecs
            .encode(&LogicalType::Json, &Value::Json(doc.clone()))
            .unwrap();
        assert!(matches!(stored, SqlValue::Text(_)));
        assert_eq!(codecs.decode(&LogicalType::Json, stored).unwrap(), Value::Json(doc));
        assert_eq!(codecs.sql_type(&LogicalType::Json).unwrap(), "TEXT");
    }

    #[test]
    fn test_null_bypasses_codecs() {
        let codecs = CodecTable::new();
        assert_eq!(
            codecs.encode(&LogicalType::Date, &Value::Null).unwrap(),
            SqlValue::Null
        );
        assert_eq!(
            codecs.decode(&LogicalType::Date, SqlValue::Null).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn test_mismatched_value_is_parameter_error() {
        let codecs = CodecTable::new();
        let err = codecs
            .encode(&LogicalType::Date, &Value::Blob(vec![1]))
            .unwrap_err();
        assert!(matches!(err, SqliteError::ParameterError(_)));
    }

    #[test]
    fn test_undecodable_value_is_conversion_error() {
        let codecs = CodecTable::new();
        let err = codecs
            .decode(&LogicalType::Date, SqlValue::Text("yesterday".into()))
            .unwrap_err();
        assert!(matches!(err, SqliteError::ConversionError(_)));
    }

    #[test]
    fn test_literals() {
        let codecs = CodecTable::new();
        assert_eq!(
            codecs.literal(&LogicalType::Text, &"it's".into()).unwrap(),
            Some("'it''s'".to_string())
        );
        assert_eq!(
            codecs.literal(&LogicalType::Integer, &Value::Integer(-3)).unwrap(),
            Some("-3".to_string())
        );
        assert_eq!(
            codecs.literal(&LogicalType::Real, &Value::Real(1.5)).unwrap(),
            Some("1.5".to_string())
        );
        assert_eq!(
            codecs.literal(&LogicalType::Blob, &Value::Blob(vec![0xAB, 0x01])).unwrap(),
            Some("X'AB01'".to_string())
        );
        assert_eq!(codecs.literal(&LogicalType::Text, &Value::Null).unwrap(), None);
    }

    #[test]
    fn test_non_finite_real_has_no_literal() {
        let codecs = CodecTable::new();
        for r in [f64::INFINITY, f64::NEG_INFINITY, f64::NAN] {
            let err = codecs.literal(&LogicalType::Real, &Value::Real(r)).unwrap_err();
            assert!(matches!(err, SqliteError::ParameterError(_)));
        }
    }

    #[test]
    fn test_custom_codec() {
        let mut codecs = CodecTable::new();
        codecs.register("SHOUT", UpperCodec);
        let ty = LogicalType::Custom("SHOUT".into());
        assert_eq!(
            codecs.encode(&ty, &"eye".into()).unwrap(),
            SqlValue::Text("EYE".into())
        );
        assert_eq!(
            codecs.decode(&ty, SqlValue::Text("EYE".into())).unwrap(),
            Value::from("eye")
        );
    }

    #[test]
    fn test_check_schema_reports_missing_codec() {
        let mut registry = Registry::new();
        registry
            .register(ModelDecl::new("newt").field(Field::custom("field", "SHOUT")))
            .unwrap();
        let schema = registry.freeze().unwrap();

        let err = CodecTable::new().check_schema(&schema).unwrap_err();
        assert!(matches!(
            err,
            SqliteError::SchemaError(SchemaError::UnsupportedType { .. })
        ));

        let mut codecs = CodecTable::new();
        codecs.register("SHOUT", UpperCodec);
        assert!(codecs.check_schema(&schema).is_ok());
    }
}
