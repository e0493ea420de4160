//! Field descriptors and class-level field handles.
//!
//! A [`Field`] declares one column: its logical type, default value,
//! nullability and, for references, the foreign-key actions. Fields are
//! collected into a [`ModelDecl`](crate::ModelDecl) and copied into each
//! concrete table at registration time.
//!
//! A [`SchemaField`] is the handle used to build query expressions. It only
//! names a `table.column` pair and carries no data, which keeps class-level
//! access (building predicates) apart from instance-level access (reading
//! a row's [`Value`]).

use std::borrow::Cow;
use std::fmt;

use crate::types::{ForeignKeyAction, LogicalType, Value};

/// Name of the implicit integer primary key present on every table.
pub const KEY_COLUMN: &str = "id";

/// Declaration of a single column.
///
/// # Examples
///
/// ```
/// use microlite_core::{Field, LogicalType, Value};
///
/// let name = Field::text("name").default("NA").not_null();
/// assert_eq!(name.name(), "name");
/// assert_eq!(name.logical_type(), &LogicalType::Text);
/// assert_eq!(name.default_value(), &Value::Text("NA".into()));
/// assert!(name.is_not_null());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    name: String,
    ty: LogicalType,
    default: Value,
    not_null: bool,
    on_delete: Option<ForeignKeyAction>,
    on_update: Option<ForeignKeyAction>,
    table: String,
}

impl Field {
    /// Creates a nullable field without a default.
    pub fn new(name: impl Into<String>, ty: LogicalType) -> Self {
        Self {
            name: name.into(),
            ty,
            default: Value::Null,
            not_null: false,
            on_delete: None,
            on_update: None,
            table: String::new(),
        }
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, LogicalType::Integer)
    }

    pub fn real(name: impl Into<String>) -> Self {
        Self::new(name, LogicalType::Real)
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, LogicalType::Text)
    }

    pub fn blob(name: impl Into<String>) -> Self {
        Self::new(name, LogicalType::Blob)
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, LogicalType::Boolean)
    }

    pub fn date(name: impl Into<String>) -> Self {
        Self::new(name, LogicalType::Date)
    }

    pub fn datetime(name: impl Into<String>) -> Self {
        Self::new(name, LogicalType::DateTime)
    }

    pub fn duration(name: impl Into<String>) -> Self {
        Self::new(name, LogicalType::Duration)
    }

    pub fn json(name: impl Into<String>) -> Self {
        Self::new(name, LogicalType::Json)
    }

    /// A column holding the key of a row in `target`.
    pub fn reference(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(name, LogicalType::Reference(target.into()))
    }

    /// A column whose storage is handled by the codec registered as `ty`.
    pub fn custom(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self::new(name, LogicalType::Custom(ty.into()))
    }

    /// Sets the value used for new rows and as the column's SQL default.
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = value.into();
        self
    }

    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    pub fn on_delete(mut self, action: ForeignKeyAction) -> Self {
        self.on_delete = Some(action);
        self
    }

    pub fn on_update(mut self, action: ForeignKeyAction) -> Self {
        self.on_update = Some(action);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn logical_type(&self) -> &LogicalType {
        &self.ty
    }

    pub fn default_value(&self) -> &Value {
        &self.default
    }

    pub fn is_not_null(&self) -> bool {
        self.not_null
    }

    pub fn on_delete_action(&self) -> Option<ForeignKeyAction> {
        self.on_delete
    }

    pub fn on_update_action(&self) -> Option<ForeignKeyAction> {
        self.on_update
    }

    /// Table this field belongs to. Empty until the field is registered.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Returns a query handle for this field.
    pub fn handle(&self) -> SchemaField {
        SchemaField::owned(self.table.clone(), self.name.clone())
    }

    pub(crate) fn bind_to(mut self, table: &str) -> Self {
        self.table = table.to_string();
        self
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Class-level handle to a `table.column` pair.
///
/// Handles can be built in `const` context, so models usually expose them as
/// associated constants and build predicates from those:
///
/// ```
/// use microlite_core::SchemaField;
///
/// struct Artist;
///
/// impl Artist {
///     const NAME: SchemaField = SchemaField::new("artist", "name");
/// }
///
/// let query = Artist::NAME.eq("Johannes Vermeer");
/// assert_eq!(query.table(), "artist");
/// assert_eq!(query.clauses().len(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SchemaField {
    table: Cow<'static, str>,
    column: Cow<'static, str>,
}

impl SchemaField {
    pub const fn new(table: &'static str, column: &'static str) -> Self {
        Self {
            table: Cow::Borrowed(table),
            column: Cow::Borrowed(column),
        }
    }

    pub fn owned(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: Cow::Owned(table.into()),
            column: Cow::Owned(column.into()),
        }
    }

    /// Handle to the key column of `table`.
    pub const fn key(table: &'static str) -> Self {
        Self::new(table, KEY_COLUMN)
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn column(&self) -> &str {
        &self.column
    }
}

impl fmt::Display for SchemaField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.column)
    }
}
