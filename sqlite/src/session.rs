//! The database session: one connection bound to a frozen schema.
//!
//! A [`Database`] is opened against a [`Registry`]. Opening freezes the
//! registry, checks that every declared type has a codec, applies the
//! connection pragmas and reconciles the declared tables with the live
//! database. After that the schema no longer changes for the life of the
//! session.
//!
//! Every data statement runs through the session, which logs it and counts
//! it; see [`Database::statement_count`].

use std::cell::Cell;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use microlite_core::{Bind, QueryError, Registry, Schema, TableDef};
use rusqlite::{Connection, params_from_iter};
use tracing::{debug, error, info};

use crate::codec::{CodecTable, SqlValue};
use crate::config::DatabaseConfig;
use crate::error::Result;
use crate::migration::{MigrationEngine, MigrationReport};
use crate::row::Row;
use crate::schema::LiveSchema;

/// Opens the database at `path` and reconciles it with `registry`.
///
/// Pass `":memory:"` for a private in-memory database.
///
/// # Errors
///
/// Fails if the declarations are invalid, a declared type has no codec, or
/// the live schema cannot be reconciled under `allow_migrations`.
///
/// # Example
///
/// ```
/// use microlite_core::{Field, ModelDecl, Query, Registry};
/// use microlite_sqlite::initialize_database;
///
/// let mut registry = Registry::new();
/// registry
///     .register(ModelDecl::new("artist").field(Field::text("name").default("NA")))
///     .unwrap();
///
/// let db = initialize_database(":memory:", &registry, false).unwrap();
/// let mut artist = db.new_row("artist").unwrap();
/// artist.set("name", "Vermeer").unwrap();
/// artist.save(&db).unwrap();
///
/// assert_eq!(db.count(&Query::all("artist")).unwrap(), 1);
/// ```
pub fn initialize_database(
    path: impl AsRef<Path>,
    registry: &Registry,
    allow_migrations: bool,
) -> Result<Database> {
    let config = DatabaseConfig::new(path.as_ref()).allow_migrations(allow_migrations);
    Database::open(config, registry)
}

/// An open connection with its schema and codecs.
///
/// `Database` is `Send` but not `Sync`: use one session per thread.
#[derive(Debug)]
pub struct Database {
    conn: Connection,
    schema: Arc<Schema>,
    codecs: Arc<CodecTable>,
    config: DatabaseConfig,
    statements: Cell<u64>,
}

impl Database {
    /// Opens a session with the built-in codecs.
    pub fn open(config: DatabaseConfig, registry: &Registry) -> Result<Self> {
        Self::open_with_codecs(config, registry, CodecTable::new())
    }

    /// Opens a session using `codecs` for value conversion.
    pub fn open_with_codecs(
        config: DatabaseConfig,
        registry: &Registry,
        codecs: CodecTable,
    ) -> Result<Self> {
        let schema = registry.freeze()?;
        codecs.check_schema(&schema)?;

        let conn = if config.is_in_memory() {
            Connection::open_in_memory()?
        } else {
            Connection::open(&config.path)?
        };
        if config.enforce_foreign_keys {
            conn.execute_batch("PRAGMA foreign_keys = ON")?;
        }
        if let Some(ms) = config.busy_timeout_ms {
            conn.busy_timeout(Duration::from_millis(ms))?;
        }
        debug!(path = %config.path.display(), tables = schema.len(), "opened database");

        let db = Self {
            conn,
            schema: Arc::new(schema),
            codecs: Arc::new(codecs),
            config,
            statements: Cell::new(0),
        };
        db.reconcile(db.config.allow_migrations)?;
        Ok(db)
    }

    /// Reconciles the live database with the session's schema.
    ///
    /// Runs automatically when the session opens; calling it again with
    /// unchanged declarations executes no DDL.
    pub fn reconcile(&self, allow_migrations: bool) -> Result<MigrationReport> {
        let live = LiveSchema::introspect(&self.conn)?;
        let engine = MigrationEngine::new(&self.conn, &self.codecs);
        let report = engine.reconcile(self.schema.tables(), &live, allow_migrations)?;

        if report.migrated() && self.config.vacuum_after_migration {
            self.conn.execute_batch("VACUUM")?;
            info!("vacuumed database after migration");
        }
        if report.ddl_statements > 0 {
            info!(
                created = report.created.len(),
                altered = report.altered.len(),
                statements = report.ddl_statements,
                "schema reconciled"
            );
        }
        Ok(report)
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn codecs(&self) -> &CodecTable {
        &self.codecs
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Definition of `name`, or [`QueryError::UnknownTable`].
    pub fn table(&self, name: &str) -> Result<&Arc<TableDef>> {
        self.schema
            .table(name)
            .ok_or_else(|| QueryError::UnknownTable(name.to_string()).into())
    }

    /// Builds an unsaved row of `table` holding the declared defaults.
    pub fn new_row(&self, table: &str) -> Result<Row> {
        Ok(Row::new(self.table(table)?.clone()))
    }

    /// Number of data statements executed by this session.
    ///
    /// Schema reconciliation is not counted.
    pub fn statement_count(&self) -> u64 {
        self.statements.get()
    }

    /// Runs `f` inside a transaction, committing if it returns `Ok`.
    ///
    /// The transaction rolls back when `f` fails. Transactions do not nest.
    pub fn transaction<T>(&self, f: impl FnOnce(&Self) -> Result<T>) -> Result<T> {
        let tx = self.conn.unchecked_transaction()?;
        let value = f(self)?;
        tx.commit()?;
        Ok(value)
    }

    /// The underlying connection, for statements outside the mapper.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn into_connection(self) -> Connection {
        self.conn
    }

    pub(crate) fn encode_binds(&self, binds: &[Bind]) -> Result<Vec<SqlValue>> {
        binds
            .iter()
            .map(|bind| self.codecs.encode(&bind.ty, &bind.value))
            .collect()
    }

    /// Executes a statement that returns no rows.
    pub(crate) fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<usize> {
        self.statements.set(self.statements.get() + 1);
        debug!(%sql, ?params, "execute");
        self.conn
            .execute(sql, params_from_iter(params.iter()))
            .map_err(|err| {
                error!(%sql, ?params, %err, "statement failed");
                err.into()
            })
    }

    /// Runs a query and buffers its raw rows.
    pub(crate) fn query_raw(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Vec<SqlValue>>> {
        self.statements.set(self.statements.get() + 1);
        debug!(%sql, ?params, "query");
        self.fetch(sql, params).map_err(|err| {
            error!(%sql, ?params, %err, "query failed");
            err.into()
        })
    }

    fn fetch(&self, sql: &str, params: &[SqlValue]) -> rusqlite::Result<Vec<Vec<SqlValue>>> {
        let mut stmt = self.conn.prepare_cached(sql)?;
        let width = stmt.column_count();
        let rows = stmt.query_map(params_from_iter(params.iter()), |row| {
            (0..width)
                .map(|i| row.get::<_, SqlValue>(i))
                .collect::<rusqlite::Result<Vec<_>>>()
        })?;
        rows.collect()
    }

    pub(crate) fn last_insert_rowid(&self) -> i64 {
        self.conn.last_insert_rowid()
    }
}
