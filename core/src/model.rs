//! Model declarations.
//!
//! A [`ModelDecl`] is the declarative form of a table: a name, the field
//! descriptors it owns and the abstract declarations it extends. A
//! declaration whose name starts with `_` is abstract; it only contributes
//! its fields to the tables that extend it.
//!
//! Types implementing [`Model`] tie a Rust type to its declaration and
//! usually expose [`SchemaField`] constants for building queries.

use crate::field::{Field, SchemaField};
use crate::query::Query;

/// Declarative description of a table or abstract field group.
///
/// # Examples
///
/// ```
/// use microlite_core::{Field, ModelDecl};
///
/// let timestamps = ModelDecl::new("_timestamped").field(Field::datetime("created_at"));
/// assert!(timestamps.is_abstract());
///
/// let artist = ModelDecl::new("artist")
///     .extends(timestamps)
///     .field(Field::text("name").default("NA"));
/// assert!(!artist.is_abstract());
/// assert_eq!(artist.parents().len(), 1);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ModelDecl {
    name: String,
    parents: Vec<ModelDecl>,
    fields: Vec<Field>,
}

impl ModelDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parents: Vec::new(),
            fields: Vec::new(),
        }
    }

    /// Adds an abstract declaration whose fields precede this one's own.
    pub fn extends(mut self, parent: ModelDecl) -> Self {
        self.parents.push(parent);
        self
    }

    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parents(&self) -> &[ModelDecl] {
        &self.parents
    }

    /// Fields declared directly on this declaration.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Abstract declarations are named with a leading underscore.
    pub fn is_abstract(&self) -> bool {
        self.name.starts_with('_')
    }
}

/// A Rust type backed by a table.
///
/// # Examples
///
/// ```
/// use microlite_core::{Field, Model, ModelDecl, SchemaField};
///
/// struct Artist;
///
/// impl Artist {
///     const NAME: SchemaField = SchemaField::new("artist", "name");
/// }
///
/// impl Model for Artist {
///     const TABLE: &'static str = "artist";
///
///     fn declare() -> ModelDecl {
///         ModelDecl::new(Self::TABLE).field(Field::text("name").default("NA"))
///     }
/// }
///
/// assert!(Artist::all().clauses().is_empty());
/// assert_eq!(Artist::key().column(), "id");
/// ```
pub trait Model {
    /// Table name; must match the name given to [`Model::declare`].
    const TABLE: &'static str;

    fn declare() -> ModelDecl;

    /// Query over every row of the table.
    fn all() -> Query {
        Query::all(Self::TABLE)
    }

    /// Handle to the table's key column.
    fn key() -> SchemaField {
        SchemaField::key(Self::TABLE)
    }
}
