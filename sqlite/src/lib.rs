//! SQLite backend for microlite.
//!
//! This crate turns the declarations and query expressions of
//! [`microlite_core`] into a working database session: it creates and
//! migrates tables, executes queries and materializes their rows, resolving
//! references between tables on demand.
//!
//! # Architecture
//!
//! - **`codec`**: conversion between logical values and SQLite storage
//! - **`schema`**: DDL rendering and live-schema introspection
//! - **`migration`**: reconciliation of declared and live tables
//! - **`session`**: the [`Database`] session and its configuration
//! - **`query`**: query execution ([`Database::iter`], [`Database::count`], ...)
//! - **`row`**: materialized [`Row`]s with lazy reference resolution
//!
//! # Quick start
//!
//! ```
//! use microlite_core::{Field, ModelDecl, Registry, SchemaField};
//! use microlite_sqlite::initialize_database;
//!
//! let mut registry = Registry::new();
//! registry
//!     .register(ModelDecl::new("artist").field(Field::text("name").default("NA")))
//!     .unwrap();
//! registry
//!     .register(
//!         ModelDecl::new("painting")
//!             .field(Field::reference("artist", "artist"))
//!             .field(Field::text("title").not_null()),
//!     )
//!     .unwrap();
//!
//! let db = initialize_database(":memory:", &registry, false).unwrap();
//!
//! let mut artist = db.new_row("artist").unwrap();
//! artist.set("name", "Vermeer").unwrap();
//! artist.save(&db).unwrap();
//!
//! let mut painting = db.new_row("painting").unwrap();
//! painting.set("title", "The Milkmaid").unwrap();
//! painting.set_reference("artist", artist).unwrap();
//! painting.save(&db).unwrap();
//!
//! let title = SchemaField::new("painting", "title");
//! let mut found = db.get(&title.eq("The Milkmaid")).unwrap();
//! let painter = found.reference(&db, "artist").unwrap().unwrap();
//! assert_eq!(painter.get::<String>("name").unwrap(), "Vermeer");
//! ```
//!
//! # Migrations
//!
//! Missing tables are always created. Existing tables that lack declared
//! columns are only altered when migrations are allowed, and then only by
//! adding columns; see [`MigrationEngine`].

mod codec;
mod config;
mod error;
mod migration;
mod query;
mod row;
mod schema;
mod session;

pub use codec::{Codec, CodecTable, SqlValue};
pub use config::{DatabaseConfig, IN_MEMORY};
pub use error::{Result, SqliteError};
pub use migration::{
    ColumnDiff, MigrationEngine, MigrationError, MigrationReport, TableDiff, TableDrift,
};
pub use query::RowIter;
pub use row::{Cell, Reference, Row};
pub use schema::{
    ColumnSpec, LiveSchema, add_column_sql, create_table_sql, declared_columns, introspect_table,
};
pub use session::{Database, initialize_database};
