//! Schema registry and table definitions.
//!
//! The [`Registry`] turns [`ModelDecl`]s into [`TableDef`]s. Abstract
//! declarations are skipped, inherited fields are copied into each concrete
//! table, and [`Registry::all_tables`] orders the result so that a
//! referenced table always comes before the tables referencing it.
//!
//! A registry is an ordinary value populated by an explicit initialization
//! pass. [`Registry::freeze`] produces the immutable [`Schema`] shared by the
//! rest of the system, and [`Registry::reset`] clears it again.
//!
//! # Examples
//!
//! ```
//! use microlite_core::{Field, ModelDecl, Registry};
//!
//! let mut registry = Registry::new();
//! registry
//!     .register(ModelDecl::new("painting").field(Field::reference("artist", "artist")))
//!     .unwrap();
//! registry
//!     .register(ModelDecl::new("artist").field(Field::text("name")))
//!     .unwrap();
//!
//! let schema = registry.freeze().unwrap();
//! let names: Vec<_> = schema.tables().iter().map(|t| t.name()).collect();
//! assert_eq!(names, ["artist", "painting"]);
//! ```

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::error::SchemaError;
use crate::field::{Field, KEY_COLUMN};
use crate::model::{Model, ModelDecl};
use crate::types::LogicalType;

/// Words SQLite reserves or parses specially. Identifiers are emitted
/// unquoted, so none of these may name a table or column.
const SQL_KEYWORDS: &[&str] = &[
    "abort", "action", "add", "after", "all", "alter", "always", "analyze", "and", "as", "asc",
    "attach", "autoincrement", "before", "begin", "between", "by", "cascade", "case", "cast",
    "check", "collate", "column", "commit", "conflict", "constraint", "create", "cross",
    "current", "current_date", "current_time", "current_timestamp", "database", "default",
    "deferrable", "deferred", "delete", "desc", "detach", "distinct", "do", "drop", "each",
    "else", "end", "escape", "except", "exclude", "exclusive", "exists", "explain", "fail",
    "filter", "first", "following", "for", "foreign", "from", "full", "generated", "glob",
    "group", "groups", "having", "if", "ignore", "immediate", "in", "index", "indexed",
    "initially", "inner", "insert", "instead", "intersect", "into", "is", "isnull", "join",
    "key", "last", "left", "like", "limit", "match", "materialized", "natural", "no", "not",
    "nothing", "notnull", "null", "nulls", "of", "offset", "on", "or", "order", "others",
    "outer", "over", "partition", "plan", "pragma", "preceding", "primary", "query", "raise",
    "range", "recursive", "references", "regexp", "reindex", "release", "rename", "replace",
    "restrict", "returning", "right", "rollback", "row", "rows", "savepoint", "select", "set",
    "table", "temp", "temporary", "then", "ties", "to", "transaction", "trigger", "unbounded",
    "union", "unique", "update", "using", "vacuum", "values", "view", "virtual", "when",
    "where", "window", "with", "without",
];

/// Validates that a table or column name is a plain SQL identifier.
///
/// SQLite compares identifiers case-insensitively, and so does the keyword
/// check.
pub fn validate_identifier(name: &str) -> Result<(), SchemaError> {
    let mut chars = name.chars();
    let valid_start = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_');
    if !valid_start
        || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        || SQL_KEYWORDS.iter().any(|k| k.eq_ignore_ascii_case(name))
    {
        return Err(SchemaError::InvalidIdentifier(name.to_string()));
    }
    Ok(())
}

/// Definition of a concrete table derived from a declaration.
///
/// Columns are the inherited fields, then the table's own fields, then the
/// implicit key column [`KEY_COLUMN`].
#[derive(Debug, Clone, PartialEq)]
pub struct TableDef {
    name: String,
    fields: Vec<Field>,
    parents: Vec<String>,
}

impl TableDef {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared fields in column order, without the key column.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Names of the declarations this table extends.
    pub fn parents(&self) -> &[String] {
        &self.parents
    }

    pub fn field(&self, column: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name() == column)
    }

    /// Column names in select order, ending with the key column.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .map(Field::name)
            .chain(std::iter::once(KEY_COLUMN))
    }

    /// Position of `column` in [`column_names`](Self::column_names).
    pub fn position(&self, column: &str) -> Option<usize> {
        if column == KEY_COLUMN {
            return Some(self.fields.len());
        }
        self.fields.iter().position(|f| f.name() == column)
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.position(column).is_some()
    }

    /// Logical type of `column`; the key column is an integer.
    pub fn column_type(&self, column: &str) -> Option<&LogicalType> {
        if column == KEY_COLUMN {
            return Some(&LogicalType::Integer);
        }
        self.field(column).map(Field::logical_type)
    }

    /// Reference fields paired with the table they point to.
    pub fn references(&self) -> impl Iterator<Item = (&Field, &str)> {
        self.fields
            .iter()
            .filter_map(|f| f.logical_type().referenced_table().map(|t| (f, t)))
    }
}

impl fmt::Display for TableDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Collects table definitions from model declarations.
#[derive(Debug, Default)]
pub struct Registry {
    tables: Vec<Arc<TableDef>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a declaration.
    ///
    /// Returns `None` for abstract declarations.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::DuplicateTable`] if a table with the same name
    /// is already registered, and identifier or column errors for malformed
    /// declarations.
    pub fn register(&mut self, decl: ModelDecl) -> Result<Option<Arc<TableDef>>, SchemaError> {
        if decl.is_abstract() {
            return Ok(None);
        }
        validate_identifier(decl.name())?;
        if self.tables.iter().any(|t| t.name().eq_ignore_ascii_case(decl.name())) {
            return Err(SchemaError::DuplicateTable(decl.name().to_string()));
        }

        let fields = collect_fields(&decl)?
            .into_iter()
            .map(|f| f.bind_to(decl.name()))
            .collect();
        let table = Arc::new(TableDef {
            name: decl.name().to_string(),
            fields,
            parents: decl.parents().iter().map(|p| p.name().to_string()).collect(),
        });
        self.tables.push(Arc::clone(&table));
        Ok(Some(table))
    }

    /// Registers the declaration of `M`.
    pub fn register_model<M: Model>(&mut self) -> Result<Option<Arc<TableDef>>, SchemaError> {
        self.register(M::declare())
    }

    /// Returns every registered table, referenced tables first.
    ///
    /// Tables without a dependency between them keep registration order.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::DanglingReference`] if a reference targets an
    /// unregistered or abstract table, and [`SchemaError::ReferenceCycle`] if
    /// distinct tables reference each other in a cycle.
    pub fn all_tables(&self) -> Result<Vec<Arc<TableDef>>, SchemaError> {
        let index: HashMap<&str, usize> = self
            .tables
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name(), i))
            .collect();

        for table in &self.tables {
            for (field, target) in table.references() {
                if !index.contains_key(target) {
                    return Err(SchemaError::DanglingReference {
                        table: table.name().to_string(),
                        column: field.name().to_string(),
                        target: target.to_string(),
                    });
                }
            }
        }

        let mut sorter = DependencySort {
            tables: &self.tables,
            index: &index,
            state: vec![Visit::New; self.tables.len()],
            path: Vec::new(),
            order: Vec::with_capacity(self.tables.len()),
        };
        for i in 0..self.tables.len() {
            sorter.visit(i)?;
        }
        Ok(sorter.order)
    }

    /// Validates the registrations and produces the immutable schema.
    pub fn freeze(&self) -> Result<Schema, SchemaError> {
        Ok(Schema::new(self.all_tables()?))
    }

    /// Removes every registration.
    pub fn reset(&mut self) {
        self.tables.clear();
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Resolves the inherited-then-own field list of a declaration.
///
/// A field redeclared by a descendant replaces the inherited one in place.
fn collect_fields(decl: &ModelDecl) -> Result<Vec<Field>, SchemaError> {
    let mut fields: Vec<Field> = Vec::new();
    for parent in decl.parents() {
        for field in collect_fields(parent)? {
            merge_field(&mut fields, field);
        }
    }

    let mut own = HashSet::new();
    for field in decl.fields() {
        validate_identifier(field.name())?;
        if field.name().eq_ignore_ascii_case(KEY_COLUMN) {
            return Err(SchemaError::ReservedColumn {
                table: decl.name().to_string(),
                column: field.name().to_string(),
            });
        }
        if !own.insert(field.name().to_ascii_lowercase()) {
            return Err(SchemaError::DuplicateColumn {
                table: decl.name().to_string(),
                column: field.name().to_string(),
            });
        }
        merge_field(&mut fields, field.clone());
    }
    Ok(fields)
}

fn merge_field(fields: &mut Vec<Field>, field: Field) {
    match fields.iter_mut().find(|f| f.name().eq_ignore_ascii_case(field.name())) {
        Some(slot) => *slot = field,
        None => fields.push(field),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visit {
    New,
    InProgress,
    Done,
}

struct DependencySort<'a> {
    tables: &'a [Arc<TableDef>],
    index: &'a HashMap<&'a str, usize>,
    state: Vec<Visit>,
    path: Vec<usize>,
    order: Vec<Arc<TableDef>>,
}

impl DependencySort<'_> {
    fn visit(&mut self, i: usize) -> Result<(), SchemaError> {
        match self.state[i] {
            Visit::Done => return Ok(()),
            Visit::InProgress => {
                let start = self.path.iter().position(|&p| p == i).unwrap_or(0);
                let mut cycle: Vec<String> = self.path[start..]
                    .iter()
                    .map(|&p| self.tables[p].name().to_string())
                    .collect();
                cycle.push(self.tables[i].name().to_string());
                return Err(SchemaError::ReferenceCycle(cycle));
            }
            Visit::New => {}
        }

        self.state[i] = Visit::InProgress;
        self.path.push(i);
        let table = Arc::clone(&self.tables[i]);
        for (_, target) in table.references() {
            let j = self.index[target];
            if j != i {
                self.visit(j)?;
            }
        }
        self.path.pop();
        self.state[i] = Visit::Done;
        self.order.push(table);
        Ok(())
    }
}

/// Frozen set of table definitions in dependency order.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    tables: Vec<Arc<TableDef>>,
    index: HashMap<String, usize>,
}

impl Schema {
    fn new(tables: Vec<Arc<TableDef>>) -> Self {
        let index = tables
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name().to_string(), i))
            .collect();
        Self { tables, index }
    }

    /// Tables in dependency order.
    pub fn tables(&self) -> &[Arc<TableDef>] {
        &self.tables
    }

    pub fn table(&self, name: &str) -> Option<&Arc<TableDef>> {
        self.index.get(name).map(|&i| &self.tables[i])
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
