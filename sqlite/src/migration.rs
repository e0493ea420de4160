//! Reconciliation of the declared schema with the live database.
//!
//! [`MigrationEngine`] compares each declared [`TableDef`] with a
//! [`LiveSchema`] snapshot and classifies it as missing, matching or
//! divergent. Missing tables are created. Divergent tables are only touched
//! when migrations are allowed, and then only additively: declared columns
//! absent from the database are added with `ALTER TABLE .. ADD COLUMN`.
//!
//! # Policy
//!
//! - Columns present in the database but no longer declared are kept; they
//!   are reported and logged, never dropped.
//! - Columns whose type, nullability or default changed are refused with
//!   [`MigrationError::Unsupported`]; existing data is never coerced.
//! - Adding a `NOT NULL` column without a default is refused, since existing
//!   rows would violate it.
//!
//! The complete plan is computed before any statement runs. All statements
//! run in a single transaction, so a failure leaves the previous schema in
//! place. SQLite supports transactional DDL; this guarantee depends on it.
//!
//! # Example
//!
//! ```
//! use microlite_core::{Field, ModelDecl, Registry};
//! use microlite_sqlite::{CodecTable, LiveSchema, MigrationEngine};
//! use rusqlite::Connection;
//!
//! let mut registry = Registry::new();
//! registry
//!     .register(ModelDecl::new("artist").field(Field::text("name").default("NA")))
//!     .unwrap();
//! let tables = registry.all_tables().unwrap();
//!
//! let conn = Connection::open_in_memory().unwrap();
//! let codecs = CodecTable::new();
//! let engine = MigrationEngine::new(&conn, &codecs);
//!
//! let live = LiveSchema::introspect(&conn).unwrap();
//! let report = engine.reconcile(&tables, &live, false).unwrap();
//! assert_eq!(report.created, ["artist"]);
//!
//! // Nothing left to do the second time around.
//! let live = LiveSchema::introspect(&conn).unwrap();
//! assert_eq!(engine.reconcile(&tables, &live, false).unwrap().ddl_statements, 0);
//! ```

use std::fmt;
use std::sync::Arc;

use microlite_core::TableDef;
use rusqlite::Connection;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::codec::CodecTable;
use crate::error::Result;
use crate::schema::{ColumnSpec, LiveSchema, add_column_sql, create_table_sql, declared_columns};

/// Failures specific to schema reconciliation.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Declared and live schema differ and migrations are disabled.
    #[error("migrations needed, but not allowed:\n{}", format_drift(.0))]
    NotAllowed(Vec<TableDrift>),

    /// The required change is outside the additive migration policy.
    #[error("cannot migrate column '{table}.{column}': {reason}")]
    Unsupported {
        table: String,
        column: String,
        reason: String,
    },

    /// A DDL statement failed; the transaction was rolled back.
    #[error("failed to migrate table '{table}' with `{statement}`: {source}")]
    Failed {
        table: String,
        statement: String,
        source: rusqlite::Error,
    },
}

fn format_drift(drift: &[TableDrift]) -> String {
    drift
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Difference of a single column between declaration and database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnDiff {
    /// Declared but absent from the database.
    Added(ColumnSpec),
    /// Present in both with different definitions.
    Changed {
        declared: ColumnSpec,
        live: ColumnSpec,
        differences: Vec<String>,
    },
    /// Present in the database but no longer declared.
    Retained(ColumnSpec),
}

impl ColumnDiff {
    fn requires_migration(&self) -> bool {
        !matches!(self, ColumnDiff::Retained(_))
    }
}

/// Classification of one declared table against the live schema.
#[derive(Debug, Clone, PartialEq)]
pub enum TableDiff<'a> {
    Missing(&'a TableDef),
    Matching(&'a TableDef),
    Divergent {
        table: &'a TableDef,
        columns: Vec<ColumnDiff>,
    },
}

impl<'a> TableDiff<'a> {
    pub fn table(&self) -> &'a TableDef {
        match *self {
            TableDiff::Missing(table) | TableDiff::Matching(table) => table,
            TableDiff::Divergent { table, .. } => table,
        }
    }

    /// Whether the table needs DDL beyond creation.
    ///
    /// Tables whose only difference is retained columns are compatible.
    pub fn requires_migration(&self) -> bool {
        match self {
            TableDiff::Divergent { columns, .. } => columns.iter().any(ColumnDiff::requires_migration),
            _ => false,
        }
    }

    /// Summary of the changes a divergent table needs.
    pub fn drift(&self) -> Option<TableDrift> {
        match self {
            TableDiff::Divergent { table, columns } if self.requires_migration() => Some(TableDrift {
                table: table.name().to_string(),
                columns: columns.clone(),
            }),
            _ => None,
        }
    }
}

/// Column differences of one table, reported when migrations are refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDrift {
    pub table: String,
    pub columns: Vec<ColumnDiff>,
}

impl fmt::Display for TableDrift {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut added = Vec::new();
        let mut changed = Vec::new();
        let mut retained = Vec::new();
        for column in &self.columns {
            match column {
                ColumnDiff::Added(spec) => added.push(spec.name.clone()),
                ColumnDiff::Changed {
                    declared,
                    differences,
                    ..
                } => changed.push(format!("{}: {}", declared.name, differences.join(", "))),
                ColumnDiff::Retained(spec) => retained.push(spec.name.clone()),
            }
        }

        write!(f, "{:>16}:", self.table)?;
        if !added.is_empty() {
            write!(f, " +({})", added.join(", "))?;
        }
        if !changed.is_empty() {
            write!(f, " ~({})", changed.join("; "))?;
        }
        if !retained.is_empty() {
            write!(f, " -({})", retained.join(", "))?;
        }
        Ok(())
    }
}

/// What a reconciliation run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Tables created from scratch.
    pub created: Vec<String>,
    /// Tables that received new columns, with the column names.
    pub altered: Vec<(String, Vec<String>)>,
    /// Undeclared columns left in place, as `(table, column)`.
    pub retained: Vec<(String, String)>,
    /// Number of DDL statements executed.
    pub ddl_statements: usize,
}

impl MigrationReport {
    /// Whether existing tables were altered.
    pub fn migrated(&self) -> bool {
        !self.altered.is_empty()
    }
}

/// Applies the declared schema to a connection.
pub struct MigrationEngine<'a> {
    conn: &'a Connection,
    codecs: &'a CodecTable,
}

impl<'a> MigrationEngine<'a> {
    pub fn new(conn: &'a Connection, codecs: &'a CodecTable) -> Self {
        Self { conn, codecs }
    }

    /// Classifies every declared table against `live`.
    pub fn plan<'t>(&self, declared: &'t [Arc<TableDef>], live: &LiveSchema) -> Result<Vec<TableDiff<'t>>> {
        declared
            .iter()
            .map(|table| self.diff_table(table, live))
            .collect()
    }

    fn diff_table<'t>(&self, table: &'t TableDef, live: &LiveSchema) -> Result<TableDiff<'t>> {
        let Some(live_columns) = live.table(table.name()) else {
            return Ok(TableDiff::Missing(table));
        };

        let declared = declared_columns(table, self.codecs)?;
        let mut columns = Vec::new();
        for column in &declared {
            match live_columns.iter().find(|c| c.name == column.name) {
                None => columns.push(ColumnDiff::Added(column.clone())),
                Some(existing) => {
                    let differences = column.differences(existing);
                    if !differences.is_empty() {
                        columns.push(ColumnDiff::Changed {
                            declared: column.clone(),
                            live: existing.clone(),
                            differences,
                        });
                    }
                }
            }
        }
        for existing in live_columns {
            if !declared.iter().any(|c| c.name == existing.name) {
                columns.push(ColumnDiff::Retained(existing.clone()));
            }
        }

        if columns.is_empty() {
            Ok(TableDiff::Matching(table))
        } else {
            Ok(TableDiff::Divergent { table, columns })
        }
    }

    /// Brings the database in line with `declared`.
    ///
    /// `declared` must be in dependency order, as returned by
    /// [`Registry::all_tables`](microlite_core::Registry::all_tables).
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError::NotAllowed`] without executing anything if a
    /// table needs migration and `allow_migrations` is false,
    /// [`MigrationError::Unsupported`] if a change falls outside the additive
    /// policy, and [`MigrationError::Failed`] if a statement fails.
    pub fn reconcile(
        &self,
        declared: &[Arc<TableDef>],
        live: &LiveSchema,
        allow_migrations: bool,
    ) -> Result<MigrationReport> {
        let plan = self.plan(declared, live)?;

        let drift: Vec<TableDrift> = plan.iter().filter_map(TableDiff::drift).collect();
        if !drift.is_empty() && !allow_migrations {
            return Err(MigrationError::NotAllowed(drift).into());
        }

        let mut report = MigrationReport::default();
        let mut statements: Vec<(&str, String)> = Vec::new();
        for diff in &plan {
            let table = diff.table();
            match diff {
                TableDiff::Missing(_) => {
                    statements.push((table.name(), create_table_sql(table, self.codecs)?));
                    report.created.push(table.name().to_string());
                }
                TableDiff::Matching(_) => debug!(table = table.name(), "table ok"),
                TableDiff::Divergent { columns, .. } => {
                    let mut added = Vec::new();
                    for column in columns {
                        match column {
                            ColumnDiff::Added(spec) => {
                                statements.push((table.name(), self.add_column(table, spec)?));
                                added.push(spec.name.clone());
                            }
                            ColumnDiff::Changed {
                                declared,
                                differences,
                                ..
                            } => {
                                return Err(MigrationError::Unsupported {
                                    table: table.name().to_string(),
                                    column: declared.name.clone(),
                                    reason: format!(
                                        "existing columns are never altered ({})",
                                        differences.join(", ")
                                    ),
                                }
                                .into());
                            }
                            ColumnDiff::Retained(spec) => {
                                warn!(
                                    table = table.name(),
                                    column = %spec.name,
                                    "column is no longer declared; keeping it"
                                );
                                report
                                    .retained
                                    .push((table.name().to_string(), spec.name.clone()));
                            }
                        }
                    }
                    if !added.is_empty() {
                        report.altered.push((table.name().to_string(), added));
                    }
                }
            }
        }

        if statements.is_empty() {
            return Ok(report);
        }

        let tx = self.conn.unchecked_transaction()?;
        for (table, statement) in &statements {
            debug!(%statement, "executing migration statement");
            tx.execute_batch(statement)
                .map_err(|source| MigrationError::Failed {
                    table: table.to_string(),
                    statement: statement.clone(),
                    source,
                })?;
        }
        tx.commit()?;
        report.ddl_statements = statements.len();

        for table in &report.created {
            info!(table = %table, "created table");
        }
        for (table, columns) in &report.altered {
            info!(table = %table, columns = %columns.join(", "), "added columns");
        }
        Ok(report)
    }

    fn add_column(&self, table: &TableDef, spec: &ColumnSpec) -> Result<String> {
        let unsupported = |reason: &str| MigrationError::Unsupported {
            table: table.name().to_string(),
            column: spec.name.clone(),
            reason: reason.to_string(),
        };
        let Some(field) = table.field(&spec.name) else {
            return Err(unsupported("the key column cannot be added to an existing table").into());
        };
        if field.is_not_null() && field.default_value().is_null() {
            return Err(unsupported("a NOT NULL column needs a default to be added").into());
        }
        add_column_sql(table, field, self.codecs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SqliteError;
    use microlite_core::{Field, ModelDecl, Registry};

    fn tables(decls: Vec<ModelDecl>) -> Vec<Arc<TableDef>> {
        let mut registry = Registry::new();
        for decl in decls {
            registry.register(decl).unwrap();
        }
        registry.all_tables().unwrap()
    }

    fn artist_v1() -> ModelDecl {
        ModelDecl::new("artist").field(Field::text("name").default("NA"))
    }

    fn artist_v2() -> ModelDecl {
        artist_v1().field(Field::text("style").default("Unknown"))
    }

    fn reconcile(conn: &Connection, declared: &[Arc<TableDef>], allow: bool) -> Result<MigrationReport> {
        let codecs = CodecTable::new();
        let live = LiveSchema::introspect(conn)?;
        MigrationEngine::new(conn, &codecs).reconcile(declared, &live, allow)
    }

    #[test]
    fn test_plan_classification() {
        let conn = Connection::open_in_memory().unwrap();
        reconcile(&conn, &tables(vec![artist_v1()]), false).unwrap();

        let codecs = CodecTable::new();
        let engine = MigrationEngine::new(&conn, &codecs);
        let live = LiveSchema::introspect(&conn).unwrap();

        let declared = tables(vec![artist_v1(), ModelDecl::new("album")]);
        let plan = engine.plan(&declared, &live).unwrap();
        assert!(matches!(plan[0], TableDiff::Matching(_)));
        assert!(matches!(plan[1], TableDiff::Missing(_)));

        let declared = tables(vec![artist_v2()]);
        let plan = engine.plan(&declared, &live).unwrap();
        match &plan[0] {
            TableDiff::Divergent { columns, .. } => {
                assert_eq!(columns.len(), 1);
                assert!(matches!(&columns[0], ColumnDiff::Added(spec) if spec.name == "style"));
            }
            other => panic!("expected divergent table, got {other:?}"),
        }
        assert!(plan[0].requires_migration());
    }

    #[test]
    fn test_creates_missing_tables() {
        let conn = Connection::open_in_memory().unwrap();
        let report = reconcile(&conn, &tables(vec![artist_v2()]), false).unwrap();
        assert_eq!(report.created, ["artist"]);
        assert_eq!(report.ddl_statements, 1);
        assert!(!report.migrated());
    }

    #[test]
    fn test_second_reconcile_is_noop() {
        let conn = Connection::open_in_memory().unwrap();
        let declared = tables(vec![artist_v2()]);
        reconcile(&conn, &declared, true).unwrap();
        let report = reconcile(&conn, &declared, true).unwrap();
        assert_eq!(report, MigrationReport::default());
    }

    #[test]
    fn test_divergence_refused_without_permission() {
        let conn = Connection::open_in_memory().unwrap();
        reconcile(&conn, &tables(vec![artist_v1()]), false).unwrap();
        let before = LiveSchema::introspect(&conn).unwrap();

        let declared = tables(vec![artist_v2(), ModelDecl::new("album")]);
        let err = reconcile(&conn, &declared, false).unwrap_err();
        match err {
            SqliteError::MigrationError(MigrationError::NotAllowed(drift)) => {
                assert_eq!(drift.len(), 1);
                assert_eq!(drift[0].table, "artist");
                assert!(drift[0].to_string().contains("+(style)"));
            }
            other => panic!("unexpected error: {other}"),
        }

        // Not even the missing table was created.
        assert_eq!(LiveSchema::introspect(&conn).unwrap(), before);
    }

    #[test]
    fn test_adds_columns_when_allowed() {
        let conn = Connection::open_in_memory().unwrap();
        reconcile(&conn, &tables(vec![artist_v1()]), false).unwrap();
        conn.execute("INSERT INTO artist (name) VALUES ('Vermeer')", [])
            .unwrap();

        let report = reconcile(&conn, &tables(vec![artist_v2()]), true).unwrap();
        assert_eq!(report.altered, [("artist".to_string(), vec!["style".to_string()])]);

        let style: String = conn
            .query_row("SELECT style FROM artist WHERE name = 'Vermeer'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(style, "Unknown");
    }

    #[test]
    fn test_retained_columns_are_kept() {
        let conn = Connection::open_in_memory().unwrap();
        reconcile(&conn, &tables(vec![artist_v2()]), false).unwrap();

        let report = reconcile(&conn, &tables(vec![artist_v1()]), false).unwrap();
        assert_eq!(report.retained, [("artist".to_string(), "style".to_string())]);
        assert_eq!(report.ddl_statements, 0);

        let live = LiveSchema::introspect(&conn).unwrap();
        assert!(live.table("artist").unwrap().iter().any(|c| c.name == "style"));
    }

    #[test]
    fn test_changed_column_refused() {
        let conn = Connection::open_in_memory().unwrap();
        reconcile(&conn, &tables(vec![artist_v1()]), false).unwrap();

        let retyped = ModelDecl::new("artist").field(Field::integer("name"));
        let err = reconcile(&conn, &tables(vec![retyped]), true).unwrap_err();
        assert!(matches!(
            err,
            SqliteError::MigrationError(MigrationError::Unsupported { ref column, .. }) if column == "name"
        ));
    }

    #[test]
    fn test_not_null_without_default_refused() {
        let conn = Connection::open_in_memory().unwrap();
        reconcile(&conn, &tables(vec![artist_v1()]), false).unwrap();

        let strict = artist_v1().field(Field::text("country").not_null());
        let err = reconcile(&conn, &tables(vec![strict]), true).unwrap_err();
        assert!(matches!(
            err,
            SqliteError::MigrationError(MigrationError::Unsupported { .. })
        ));
    }

    #[test]
    fn test_failure_rolls_back_earlier_statements() {
        let conn = Connection::open_in_memory().unwrap();
        // A view occupies the name, so CREATE TABLE for it fails.
        conn.execute_batch("CREATE VIEW blocked AS SELECT 1 AS x").unwrap();

        let declared = tables(vec![artist_v1(), ModelDecl::new("blocked")]);
        let err = reconcile(&conn, &declared, true).unwrap_err();
        assert!(matches!(
            err,
            SqliteError::MigrationError(MigrationError::Failed { ref table, .. }) if table == "blocked"
        ));
        assert!(!LiveSchema::introspect(&conn).unwrap().contains("artist"));
    }
}
