//! Materialized rows and lazy reference resolution.
//!
//! A [`Row`] holds one value per declared column of its table plus the key.
//! Reference columns start out holding the raw key of the target row; the
//! target is fetched on first access through [`Row::reference`] and kept in
//! the cell, so later accesses run no query.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use microlite_core::{FromValue, KEY_COLUMN, Query, QueryError, SchemaField, TableDef, Value};

use crate::codec::{CodecTable, SqlValue};
use crate::error::{Result, SqliteError};
use crate::session::Database;

/// State of a reference column.
#[derive(Debug, Clone, PartialEq)]
pub enum Reference {
    Null,
    /// Key of a target row that has not been fetched yet.
    Unresolved(i64),
    /// The fetched or assigned target row.
    Resolved(Box<Row>),
}

impl Reference {
    /// Key stored for this reference; `None` for `Null` or an unsaved target.
    pub fn key(&self) -> Option<i64> {
        match self {
            Reference::Null => None,
            Reference::Unresolved(key) => Some(*key),
            Reference::Resolved(row) => row.key(),
        }
    }
}

/// Value of one declared column.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Plain(Value),
    Reference(Reference),
}

impl Cell {
    fn from_value(table: &TableDef, column: &str, is_reference: bool, value: Value) -> Result<Self> {
        if !is_reference {
            return Ok(Cell::Plain(value));
        }
        match value {
            Value::Null => Ok(Cell::Reference(Reference::Null)),
            Value::Integer(key) => Ok(Cell::Reference(Reference::Unresolved(key))),
            other => Err(SqliteError::ParameterError(format!(
                "reference column '{}.{column}' needs a key, got {} value",
                table.name(),
                other.kind()
            ))),
        }
    }

    fn value(&self) -> Cow<'_, Value> {
        match self {
            Cell::Plain(value) => Cow::Borrowed(value),
            Cell::Reference(reference) => Cow::Owned(Value::from(reference.key())),
        }
    }
}

/// One row of a table, saved or not.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    table: Arc<TableDef>,
    key: Option<i64>,
    cells: Vec<Cell>,
}

impl Row {
    /// Unsaved row holding the declared defaults.
    pub fn new(table: Arc<TableDef>) -> Self {
        let cells = table
            .fields()
            .iter()
            .map(|field| match (field.logical_type().is_reference(), field.default_value()) {
                (false, value) => Cell::Plain(value.clone()),
                (true, Value::Integer(key)) => Cell::Reference(Reference::Unresolved(*key)),
                (true, _) => Cell::Reference(Reference::Null),
            })
            .collect();
        Self {
            table,
            key: None,
            cells,
        }
    }

    /// Builds a row from a raw result row in declared column order, key last.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::ConversionError`] if the row has the wrong
    /// width, the key is not an integer, or a value fails to decode.
    pub fn materialize(table: Arc<TableDef>, raw: Vec<SqlValue>, codecs: &CodecTable) -> Result<Self> {
        let width = table.fields().len() + 1;
        if raw.len() != width {
            return Err(SqliteError::ConversionError(format!(
                "expected {width} columns for table '{}', got {}",
                table.name(),
                raw.len()
            )));
        }

        let mut raw = raw.into_iter();
        let mut cells = Vec::with_capacity(width - 1);
        for field in table.fields() {
            let value = raw.next().unwrap_or(SqlValue::Null);
            let cell = if field.logical_type().is_reference() {
                match value {
                    SqlValue::Null => Cell::Reference(Reference::Null),
                    SqlValue::Integer(key) => Cell::Reference(Reference::Unresolved(key)),
                    other => {
                        return Err(SqliteError::ConversionError(format!(
                            "reference column '{}.{}' holds {:?}",
                            table.name(),
                            field.name(),
                            other.data_type()
                        )));
                    }
                }
            } else {
                Cell::Plain(codecs.decode(field.logical_type(), value)?)
            };
            cells.push(cell);
        }

        let key = match raw.next() {
            Some(SqlValue::Integer(key)) => Some(key),
            other => {
                return Err(SqliteError::ConversionError(format!(
                    "invalid key for table '{}': {other:?}",
                    table.name()
                )));
            }
        };

        Ok(Self { table, key, cells })
    }

    pub fn table(&self) -> &Arc<TableDef> {
        &self.table
    }

    /// Key of the row; `None` until it is saved.
    pub fn key(&self) -> Option<i64> {
        self.key
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    fn index(&self, column: &str) -> Result<usize> {
        self.table
            .fields()
            .iter()
            .position(|f| f.name() == column)
            .ok_or_else(|| self.unknown_column(column))
    }

    fn unknown_column(&self, column: &str) -> SqliteError {
        QueryError::UnknownColumn {
            table: self.table.name().to_string(),
            column: column.to_string(),
        }
        .into()
    }

    /// Current value of `column`. References yield their key.
    pub fn value(&self, column: &str) -> Result<Value> {
        if column == KEY_COLUMN {
            return Ok(Value::from(self.key));
        }
        Ok(self.cells[self.index(column)?].value().into_owned())
    }

    /// Extracts `column` as `T`.
    ///
    /// ```
    /// # use microlite_core::{Field, ModelDecl, Registry};
    /// # use microlite_sqlite::initialize_database;
    /// # let mut registry = Registry::new();
    /// # registry.register(ModelDecl::new("artist").field(Field::text("style").default("Unknown"))).unwrap();
    /// # let db = initialize_database(":memory:", &registry, false).unwrap();
    /// let artist = db.new_row("artist").unwrap();
    /// assert_eq!(artist.get::<String>("style").unwrap(), "Unknown");
    /// assert_eq!(artist.get::<Option<i64>>("id").unwrap(), None);
    /// ```
    pub fn get<T: FromValue>(&self, column: &str) -> Result<T> {
        if column == KEY_COLUMN {
            return Ok(Value::from(self.key).to::<T>()?);
        }
        Ok(self.cells[self.index(column)?].value().to::<T>()?)
    }

    /// Assigns `column`. Setting a reference column to an integer stores the
    /// target key; setting the key column changes which row is addressed.
    pub fn set(&mut self, column: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        if column == KEY_COLUMN {
            self.key = match value {
                Value::Null => None,
                Value::Integer(key) => Some(key),
                other => {
                    return Err(SqliteError::ParameterError(format!(
                        "key of table '{}' must be an integer, got {} value",
                        self.table.name(),
                        other.kind()
                    )));
                }
            };
            return Ok(());
        }

        let index = self.index(column)?;
        let is_reference = self.table.fields()[index].logical_type().is_reference();
        self.cells[index] = Cell::from_value(&self.table, column, is_reference, value)?;
        Ok(())
    }

    /// Points reference `column` at `target`.
    ///
    /// The target need not be saved yet, but must be before this row is.
    pub fn set_reference(&mut self, column: &str, target: Row) -> Result<()> {
        let index = self.index(column)?;
        let expected = self.referenced_table(index, column)?;
        if target.table.name() != expected {
            return Err(QueryError::ReferenceMismatch {
                table: self.table.name().to_string(),
                column: column.to_string(),
                expected: expected.to_string(),
                found: target.table.name().to_string(),
            }
            .into());
        }
        self.cells[index] = Cell::Reference(Reference::Resolved(Box::new(target)));
        Ok(())
    }

    fn referenced_table(&self, index: usize, column: &str) -> Result<&str> {
        self.table.fields()[index]
            .logical_type()
            .referenced_table()
            .ok_or_else(|| {
                QueryError::NotAReference {
                    table: self.table.name().to_string(),
                    column: column.to_string(),
                }
                .into()
            })
    }

    /// Row referenced by `column`, fetched on first access.
    ///
    /// Returns `None` when the reference is `NULL`.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::LookupError`] if the referenced row does not
    /// exist, and a query error if `column` is not a reference.
    pub fn reference(&mut self, db: &Database, column: &str) -> Result<Option<&Row>> {
        Ok(self.reference_mut(db, column)?.map(|row| &*row))
    }

    /// Like [`Row::reference`], for modifying or following the target.
    pub fn reference_mut(&mut self, db: &Database, column: &str) -> Result<Option<&mut Row>> {
        let index = self.index(column)?;
        let target = self.referenced_table(index, column)?.to_string();

        if let Cell::Reference(Reference::Unresolved(key)) = self.cells[index] {
            let row = db.lookup(&target, key)?;
            self.cells[index] = Cell::Reference(Reference::Resolved(Box::new(row)));
        }
        match &mut self.cells[index] {
            Cell::Reference(Reference::Resolved(row)) => Ok(Some(row.as_mut())),
            _ => Ok(None),
        }
    }

    fn encode(&self, db: &Database) -> Result<Vec<SqlValue>> {
        self.table
            .fields()
            .iter()
            .zip(&self.cells)
            .map(|(field, cell)| match cell {
                Cell::Plain(value) => db.codecs().encode(field.logical_type(), value),
                Cell::Reference(Reference::Null) => Ok(SqlValue::Null),
                Cell::Reference(Reference::Unresolved(key)) => Ok(SqlValue::Integer(*key)),
                Cell::Reference(Reference::Resolved(row)) => match row.key() {
                    Some(key) => Ok(SqlValue::Integer(key)),
                    None => Err(SqliteError::ParameterError(format!(
                        "'{}.{}' refers to an unsaved {} row",
                        self.table.name(),
                        field.name(),
                        row.table.name()
                    ))),
                },
            })
            .collect()
    }

    /// Inserts the row, or updates it by key if it has one.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::LookupError`] if the row has a key but no such
    /// row exists, and [`SqliteError::ParameterError`] if a value does not
    /// fit its column.
    pub fn save(&mut self, db: &Database) -> Result<()> {
        match self.key {
            None => self.insert(db),
            Some(key) => self.update(db, key),
        }
    }

    /// Inserts the row, including its key if one is set.
    pub fn insert(&mut self, db: &Database) -> Result<()> {
        let mut params = self.encode(db)?;
        let mut columns: Vec<&str> = self.table.fields().iter().map(|f| f.name()).collect();
        if let Some(key) = self.key {
            columns.push(KEY_COLUMN);
            params.push(SqlValue::Integer(key));
        }

        let sql = if columns.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", self.table.name())
        } else {
            let placeholders = vec!["?"; columns.len()].join(", ");
            format!(
                "INSERT INTO {} ({}) VALUES ({placeholders})",
                self.table.name(),
                columns.join(", ")
            )
        };
        db.execute(&sql, &params)?;
        self.key = Some(db.last_insert_rowid());
        Ok(())
    }

    fn update(&mut self, db: &Database, key: i64) -> Result<()> {
        let changed = if self.table.fields().is_empty() {
            let by_key = Query::all(self.table.name()).and(self.key_field().eq(key));
            db.count(&by_key)? as usize
        } else {
            let mut params = self.encode(db)?;
            params.push(SqlValue::Integer(key));
            let sets: Vec<String> = self
                .table
                .fields()
                .iter()
                .map(|f| format!("{} = ?", f.name()))
                .collect();
            let sql = format!(
                "UPDATE {} SET {} WHERE {KEY_COLUMN} = ?",
                self.table.name(),
                sets.join(", ")
            );
            db.execute(&sql, &params)?
        };

        if changed == 0 {
            return Err(SqliteError::LookupError(format!(
                "{} row with id {key} does not exist",
                self.table.name()
            )));
        }
        Ok(())
    }

    /// Deletes the row by key and clears the key.
    ///
    /// Returns whether a row was removed; unsaved rows remove nothing.
    pub fn delete(&mut self, db: &Database) -> Result<bool> {
        let Some(key) = self.key else {
            return Ok(false);
        };
        let sql = format!("DELETE FROM {} WHERE {KEY_COLUMN} = ?", self.table.name());
        let removed = db.execute(&sql, &[SqlValue::Integer(key)])?;
        self.key = None;
        Ok(removed > 0)
    }

    fn key_field(&self) -> SchemaField {
        SchemaField::owned(self.table.name(), KEY_COLUMN)
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.key {
            Some(key) => write!(f, "<{} id={key}>", self.table.name()),
            None => write!(f, "<{} unsaved>", self.table.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DatabaseConfig;
    use chrono::NaiveDate;
    use microlite_core::{Field, ModelDecl, Registry};

    fn open() -> Database {
        let mut registry = Registry::new();
        registry
            .register(
                ModelDecl::new("artist")
                    .field(Field::text("name").default("NA"))
                    .field(Field::date("birthday")),
            )
            .unwrap();
        registry
            .register(
                ModelDecl::new("painting")
                    .field(Field::reference("artist", "artist"))
                    .field(Field::text("title").default("Untitled")),
            )
            .unwrap();
        registry.register(ModelDecl::new("marker")).unwrap();
        Database::open(DatabaseConfig::in_memory(), &registry).unwrap()
    }

    #[test]
    fn test_new_row_has_defaults() {
        let db = open();
        let row = db.new_row("artist").unwrap();
        assert_eq!(row.key(), None);
        assert_eq!(row.value("name").unwrap(), Value::Text("NA".into()));
        assert_eq!(row.value("birthday").unwrap(), Value::Null);
        assert_eq!(row.to_string(), "<artist unsaved>");
    }

    #[test]
    fn test_materialize() {
        let db = open();
        let table = db.table("painting").unwrap().clone();
        let raw = vec![SqlValue::Integer(7), SqlValue::Text("Sunflowers".into()), SqlValue::Integer(3)];
        let row = Row::materialize(table, raw, db.codecs()).unwrap();
        assert_eq!(row.key(), Some(3));
        assert_eq!(row.cells()[0], Cell::Reference(Reference::Unresolved(7)));
        assert_eq!(row.get::<String>("title").unwrap(), "Sunflowers");
        assert_eq!(row.get::<i64>("artist").unwrap(), 7);
    }

    #[test]
    fn test_materialize_rejects_wrong_width() {
        let db = open();
        let table = db.table("painting").unwrap().clone();
        let err = Row::materialize(table, vec![SqlValue::Integer(1)], db.codecs()).unwrap_err();
        assert!(matches!(err, SqliteError::ConversionError(_)));
    }

    #[test]
    fn test_insert_then_update() {
        let db = open();
        let mut artist = db.new_row("artist").unwrap();
        artist.set("name", "Vermeer").unwrap();
        artist
            .set("birthday", NaiveDate::from_ymd_opt(1632, 10, 31).unwrap())
            .unwrap();
        artist.save(&db).unwrap();
        let key = artist.key().unwrap();

        artist.set("name", "Johannes Vermeer").unwrap();
        artist.save(&db).unwrap();
        assert_eq!(artist.key(), Some(key));

        let stored = db.lookup("artist", key).unwrap();
        assert_eq!(stored.get::<String>("name").unwrap(), "Johannes Vermeer");
        assert_eq!(
            stored.get::<NaiveDate>("birthday").unwrap(),
            NaiveDate::from_ymd_opt(1632, 10, 31).unwrap()
        );
    }

    #[test]
    fn test_update_of_missing_row_is_lookup_error() {
        let db = open();
        let mut artist = db.new_row("artist").unwrap();
        artist.set("id", 42).unwrap();
        assert!(matches!(artist.save(&db), Err(SqliteError::LookupError(_))));
    }

    #[test]
    fn test_insert_with_explicit_key() {
        let db = open();
        let mut artist = db.new_row("artist").unwrap();
        artist.set("id", 42).unwrap();
        artist.insert(&db).unwrap();
        assert_eq!(artist.key(), Some(42));
        assert_eq!(db.lookup("artist", 42).unwrap().key(), Some(42));
    }

    #[test]
    fn test_table_without_fields() {
        let db = open();
        let mut marker = db.new_row("marker").unwrap();
        marker.save(&db).unwrap();
        marker.save(&db).unwrap();
        assert!(marker.delete(&db).unwrap());
        assert_eq!(marker.key(), None);
    }

    #[test]
    fn test_unsaved_reference_target() {
        let db = open();
        let artist = db.new_row("artist").unwrap();
        let mut painting = db.new_row("painting").unwrap();
        painting.set_reference("artist", artist).unwrap();
        assert!(matches!(painting.save(&db), Err(SqliteError::ParameterError(_))));
    }

    #[test]
    fn test_set_reference_checks_target_table() {
        let db = open();
        let other = db.new_row("painting").unwrap();
        let mut painting = db.new_row("painting").unwrap();
        assert!(matches!(
            painting.set_reference("artist", other),
            Err(SqliteError::QueryError(QueryError::ReferenceMismatch { .. }))
        ));
        assert!(matches!(
            painting.reference(&db, "title"),
            Err(SqliteError::QueryError(QueryError::NotAReference { .. }))
        ));
    }

    #[test]
    fn test_null_reference() {
        let db = open();
        let mut painting = db.new_row("painting").unwrap();
        assert!(painting.reference(&db, "artist").unwrap().is_none());
        assert_eq!(db.statement_count(), 0);
    }

    #[test]
    fn test_unknown_column() {
        let db = open();
        let mut row = db.new_row("artist").unwrap();
        assert!(matches!(
            row.set("style", "Baroque"),
            Err(SqliteError::QueryError(QueryError::UnknownColumn { .. }))
        ));
    }

    #[test]
    fn test_delete_unsaved_row() {
        let db = open();
        let mut row = db.new_row("artist").unwrap();
        assert!(!row.delete(&db).unwrap());
    }
}
