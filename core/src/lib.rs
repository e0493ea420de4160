//! Schema model, registry and query expressions for microlite.
//!
//! This crate holds everything that does not touch a database:
//!
//! - [`Field`]: declaration of one column (type, default, nullability,
//!   foreign-key actions).
//! - [`ModelDecl`] and [`Model`]: declarative tables, with abstract
//!   declarations (names starting with `_`) contributing inherited fields.
//! - [`Registry`]: turns declarations into [`TableDef`]s, checks names and
//!   references, and orders tables so referenced tables come first.
//! - [`SchemaField`] and [`Query`]: class-level handles and the immutable
//!   expressions built from them, compiled to parameterized SQL.
//!
//! The SQLite backend (`microlite-sqlite`) reconciles the declared schema
//! with a live database and executes compiled queries.
//!
//! # Example
//!
//! ```
//! use microlite_core::*;
//!
//! struct Artist;
//!
//! impl Artist {
//!     const NAME: SchemaField = SchemaField::new("artist", "name");
//! }
//!
//! impl Model for Artist {
//!     const TABLE: &'static str = "artist";
//!
//!     fn declare() -> ModelDecl {
//!         ModelDecl::new(Self::TABLE)
//!             .field(Field::text("name").default("NA"))
//!             .field(Field::text("style").default("Unknown"))
//!     }
//! }
//!
//! let mut registry = Registry::new();
//! registry.register_model::<Artist>().unwrap();
//! let schema = registry.freeze().unwrap();
//!
//! let compiled = Artist::NAME.eq("Johannes Vermeer").compile(&schema).unwrap();
//! assert_eq!(compiled.sql, "SELECT name, style, id FROM artist WHERE name = ?");
//! ```

mod error;
mod field;
mod model;
mod query;
mod registry;
mod types;

pub use error::{QueryError, SchemaError, ValueError};
pub use field::{Field, KEY_COLUMN, SchemaField};
pub use model::{Model, ModelDecl};
pub use query::{Bind, Clause, CompiledQuery, Operator, Order, Predicate, Query};
pub use registry::{Registry, Schema, TableDef, validate_identifier};
pub use types::{ForeignKeyAction, FromValue, LogicalType, Value};
