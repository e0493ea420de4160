//! Error types for schema registration, query compilation and value
//! extraction.

use thiserror::Error;

/// Errors raised while building the declared schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// Table or column name is empty, contains characters other than
    /// ASCII alphanumerics and underscores, or is an SQL keyword.
    #[error("invalid identifier '{0}': must be non-empty, start with a letter or underscore, contain only alphanumeric characters and underscores, and not be an SQL keyword")]
    InvalidIdentifier(String),

    /// Two non-abstract declarations share a table name.
    #[error("duplicate table: {0}")]
    DuplicateTable(String),

    /// A declaration names the same column twice.
    #[error("duplicate column '{column}' in table '{table}'")]
    DuplicateColumn { table: String, column: String },

    /// A declared column uses the implicit key column name.
    #[error("column name '{column}' in table '{table}' is reserved for the row key")]
    ReservedColumn { table: String, column: String },

    /// A reference field targets something that is not a registered table.
    #[error("column '{table}.{column}' references unknown table '{target}'")]
    DanglingReference {
        table: String,
        column: String,
        target: String,
    },

    /// Tables reference each other so no creation order exists.
    #[error("reference cycle between tables: {}", .0.join(" -> "))]
    ReferenceCycle(Vec<String>),

    /// No codec is registered for a declared logical type.
    #[error("no codec registered for type '{ty}' of column '{table}.{column}'")]
    UnsupportedType {
        table: String,
        column: String,
        ty: String,
    },
}

/// Errors raised when a query expression is compiled.
///
/// Building an expression never fails; these surface when the expression is
/// compiled against a [`Schema`](crate::Schema), which happens on execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// The target table is not part of the schema.
    #[error("unknown table: {0}")]
    UnknownTable(String),

    /// A clause names a column the table does not declare.
    #[error("unknown column '{column}' in table '{table}'")]
    UnknownColumn { table: String, column: String },

    /// A clause belongs to a different table than the query target.
    #[error("clause on '{clause_table}.{column}' cannot be applied to a query on '{table}'")]
    MixedTables {
        table: String,
        clause_table: String,
        column: String,
    },

    /// A related lookup was attempted through a non-reference column.
    #[error("column '{table}.{column}' is not a reference")]
    NotAReference { table: String, column: String },

    /// A related lookup's inner query targets the wrong table.
    #[error("column '{table}.{column}' references '{expected}', but the related query targets '{found}'")]
    ReferenceMismatch {
        table: String,
        column: String,
        expected: String,
        found: String,
    },

    /// An update was compiled without any assignments.
    #[error("update on '{0}' has no assignments")]
    EmptyUpdate(String),

    /// A single-row lookup matched more than one row.
    #[error("expected exactly one row from '{table}', found {count}")]
    MultipleRows { table: String, count: usize },
}

/// Errors raised when extracting a typed value from a [`Value`](crate::Value).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    #[error("expected {expected} value, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("value out of range: {0}")]
    OutOfRange(String),
}
