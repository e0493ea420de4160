//! Execution of query expressions against a [`Database`].
//!
//! A [`Query`] is only a description; nothing runs until one of the methods
//! here is called. [`Database::iter`] executes the compiled `SELECT` when
//! called and returns a [`RowIter`] that decodes the buffered rows one at a
//! time. Each call executes again, so iterating a query twice sees any
//! changes made in between.
//!
//! # Example
//!
//! ```
//! use microlite_core::{Field, ModelDecl, Order, Query, Registry, SchemaField};
//! use microlite_sqlite::initialize_database;
//!
//! const NAME: SchemaField = SchemaField::new("artist", "name");
//!
//! let mut registry = Registry::new();
//! registry
//!     .register(ModelDecl::new("artist").field(Field::text("name").default("NA")))
//!     .unwrap();
//! let db = initialize_database(":memory:", &registry, false).unwrap();
//!
//! for name in ["Vermeer", "Rembrandt", "Hals"] {
//!     let mut artist = db.new_row("artist").unwrap();
//!     artist.set("name", name).unwrap();
//!     artist.save(&db).unwrap();
//! }
//!
//! let query = Query::all("artist").order_by(NAME, Order::Asc);
//! let names: Vec<String> = db
//!     .iter(&query)
//!     .unwrap()
//!     .map(|row| row.and_then(|r| r.get("name")))
//!     .collect::<Result<_, _>>()
//!     .unwrap();
//! assert_eq!(names, ["Hals", "Rembrandt", "Vermeer"]);
//!
//! assert_eq!(db.count(&NAME.ne("Hals")).unwrap(), 2);
//! ```

use std::sync::Arc;

use microlite_core::{CompiledQuery, KEY_COLUMN, Query, QueryError, SchemaField, TableDef, Value};

use crate::codec::{CodecTable, SqlValue};
use crate::error::{Result, SqliteError};
use crate::row::Row;
use crate::session::Database;

/// Lazily decoding iterator over the result of one query execution.
pub struct RowIter<'db> {
    table: Arc<TableDef>,
    codecs: &'db CodecTable,
    rows: std::vec::IntoIter<Vec<SqlValue>>,
}

impl Iterator for RowIter<'_> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        let raw = self.rows.next()?;
        Some(Row::materialize(self.table.clone(), raw, self.codecs))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.rows.size_hint()
    }
}

impl ExactSizeIterator for RowIter<'_> {}

fn capped(query: &Query, cap: u64) -> Query {
    let limit = query.limit_value().map_or(cap, |limit| limit.min(cap));
    query.clone().limit(limit)
}

impl Database {
    fn run(&self, compiled: &CompiledQuery) -> Result<Vec<Vec<SqlValue>>> {
        let params = self.encode_binds(&compiled.binds)?;
        self.query_raw(&compiled.sql, &params)
    }

    fn run_update(&self, compiled: &CompiledQuery) -> Result<usize> {
        let params = self.encode_binds(&compiled.binds)?;
        self.execute(&compiled.sql, &params)
    }

    /// Executes `query` and returns an iterator over its rows.
    pub fn iter(&self, query: &Query) -> Result<RowIter<'_>> {
        let compiled = query.compile(self.schema())?;
        let rows = self.run(&compiled)?;
        Ok(RowIter {
            table: self.table(query.table())?.clone(),
            codecs: self.codecs(),
            rows: rows.into_iter(),
        })
    }

    pub fn all(&self, query: &Query) -> Result<Vec<Row>> {
        self.iter(query)?.collect()
    }

    /// First row of `query`, if any.
    pub fn first(&self, query: &Query) -> Result<Option<Row>> {
        self.iter(&capped(query, 1))?.next().transpose()
    }

    /// The single row matching `query`.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::LookupError`] if no row matches and
    /// [`QueryError::MultipleRows`] if more than one does.
    pub fn get(&self, query: &Query) -> Result<Row> {
        let mut rows = self.iter(&capped(query, 2))?;
        match (rows.next(), rows.next()) {
            (Some(row), None) => row,
            (None, _) => Err(SqliteError::LookupError(format!(
                "no {} row matches the query",
                query.table()
            ))),
            (Some(_), Some(_)) => Err(QueryError::MultipleRows {
                table: query.table().to_string(),
                count: self.count(query)? as usize,
            }
            .into()),
        }
    }

    /// Row of `table` with key `key`.
    pub fn lookup(&self, table: &str, key: i64) -> Result<Row> {
        let query = Query::all(table).and(SchemaField::owned(table, KEY_COLUMN).eq(key));
        self.first(&query)?.ok_or_else(|| {
            SqliteError::LookupError(format!("{table} row with id {key} does not exist"))
        })
    }

    /// Number of rows matching `query`.
    pub fn count(&self, query: &Query) -> Result<u64> {
        let compiled = query.compile_count(self.schema())?;
        let rows = self.run(&compiled)?;
        match rows.first().and_then(|row| row.first()) {
            Some(SqlValue::Integer(n)) => Ok(u64::try_from(*n).unwrap_or(0)),
            other => Err(SqliteError::ConversionError(format!(
                "unexpected COUNT(*) result {other:?}"
            ))),
        }
    }

    pub fn exists(&self, query: &Query) -> Result<bool> {
        Ok(self.first(query)?.is_some())
    }

    /// Deletes the rows matching `query` and returns how many were removed.
    pub fn delete_matching(&self, query: &Query) -> Result<usize> {
        self.run_update(&query.compile_delete(self.schema())?)
    }

    /// Assigns `assignments` on every row matching `query`.
    ///
    /// Returns the number of rows changed.
    pub fn update_matching(&self, query: &Query, assignments: &[(SchemaField, Value)]) -> Result<usize> {
        self.run_update(&query.compile_update(self.schema(), assignments)?)
    }

    /// The single row matching `query`, created from its equality clauses
    /// when there is none.
    ///
    /// Returns the row and whether it was created. Columns not constrained
    /// by equality keep their defaults.
    pub fn get_or_create(&self, query: &Query) -> Result<(Row, bool)> {
        match self.get(query) {
            Ok(row) => Ok((row, false)),
            Err(SqliteError::LookupError(_)) => {
                let mut row = self.new_row(query.table())?;
                for (field, value) in query.equalities() {
                    row.set(field.column(), value.clone())?;
                }
                row.insert(self)?;
                Ok((row, true))
            }
            Err(err) => Err(err),
        }
    }
}
