//! Lazy query expressions.
//!
//! A [`Query`] is an immutable list of clauses against one target table.
//! Clauses are created from [`SchemaField`] handles (`eq`, `lt`, `is_in`,
//! ...) and combined with [`Query::and`]; nothing touches the database
//! until the query is compiled and executed by a backend.
//!
//! Compilation checks every clause against a [`Schema`] and produces SQL
//! text with `?` placeholders plus the ordered [`Bind`] values. Values are
//! never written into the SQL text.
//!
//! # Examples
//!
//! ```
//! use microlite_core::{Field, ModelDecl, Registry, SchemaField, Value};
//!
//! const NAME: SchemaField = SchemaField::new("artist", "name");
//! const STYLE: SchemaField = SchemaField::new("artist", "style");
//!
//! let mut registry = Registry::new();
//! registry
//!     .register(
//!         ModelDecl::new("artist")
//!             .field(Field::text("name"))
//!             .field(Field::text("style")),
//!     )
//!     .unwrap();
//! let schema = registry.freeze().unwrap();
//!
//! let compiled = NAME.eq("a").and(STYLE.eq("b")).compile(&schema).unwrap();
//! assert_eq!(
//!     compiled.sql,
//!     "SELECT name, style, id FROM artist WHERE name = ? AND style = ?"
//! );
//! let values: Vec<_> = compiled.binds.iter().map(|b| &b.value).collect();
//! assert_eq!(values, [&Value::from("a"), &Value::from("b")]);
//! ```

use std::fmt;
use std::ops::Range;

use crate::error::QueryError;
use crate::field::{KEY_COLUMN, SchemaField};
use crate::registry::{Schema, TableDef};
use crate::types::{LogicalType, Value};

/// Comparison operator of a clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Operator {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "<>",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
        }
    }
}

/// Condition applied to a clause's column.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Compare(Operator, Value),
    In(Vec<Value>),
    IsNull,
    IsNotNull,
    /// The referenced row matches the inner query.
    Related(Box<Query>),
}

/// One `column predicate` pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    field: SchemaField,
    predicate: Predicate,
}

impl Clause {
    pub fn field(&self) -> &SchemaField {
        &self.field
    }

    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    #[default]
    Asc,
    Desc,
}

impl SchemaField {
    fn clause(&self, predicate: Predicate) -> Query {
        Query {
            table: self.table().to_string(),
            clauses: vec![Clause {
                field: self.clone(),
                predicate,
            }],
            ordering: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    fn compare(&self, op: Operator, value: Value) -> Query {
        self.clause(Predicate::Compare(op, value))
    }

    /// `column = value`; a null value becomes `column IS NULL`.
    pub fn eq(&self, value: impl Into<Value>) -> Query {
        match value.into() {
            Value::Null => self.is_null(),
            value => self.compare(Operator::Eq, value),
        }
    }

    /// `column <> value`; a null value becomes `column IS NOT NULL`.
    pub fn ne(&self, value: impl Into<Value>) -> Query {
        match value.into() {
            Value::Null => self.is_not_null(),
            value => self.compare(Operator::Ne, value),
        }
    }

    pub fn lt(&self, value: impl Into<Value>) -> Query {
        self.compare(Operator::Lt, value.into())
    }

    pub fn le(&self, value: impl Into<Value>) -> Query {
        self.compare(Operator::Le, value.into())
    }

    pub fn gt(&self, value: impl Into<Value>) -> Query {
        self.compare(Operator::Gt, value.into())
    }

    pub fn ge(&self, value: impl Into<Value>) -> Query {
        self.compare(Operator::Ge, value.into())
    }

    /// `column IN (values...)`.
    pub fn is_in<I, V>(&self, values: I) -> Query
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.clause(Predicate::In(values.into_iter().map(Into::into).collect()))
    }

    pub fn is_null(&self) -> Query {
        self.clause(Predicate::IsNull)
    }

    pub fn is_not_null(&self) -> Query {
        self.clause(Predicate::IsNotNull)
    }

    /// Matches rows whose referenced row satisfies `related`.
    ///
    /// Only valid on reference columns; `related` must target the referenced
    /// table. Ordering and limits on `related` are ignored.
    pub fn matches(&self, related: Query) -> Query {
        self.clause(Predicate::Related(Box::new(related)))
    }
}

/// Immutable query expression over one table.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    table: String,
    clauses: Vec<Clause>,
    ordering: Vec<(SchemaField, Order)>,
    limit: Option<u64>,
    offset: Option<u64>,
}

/// A value bound to a placeholder, with the logical type of its column.
#[derive(Debug, Clone, PartialEq)]
pub struct Bind {
    pub ty: LogicalType,
    pub value: Value,
}

/// SQL text plus the values for its placeholders, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub sql: String,
    pub binds: Vec<Bind>,
}

impl fmt::Display for CompiledQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

impl Query {
    /// Query over every row of `table`.
    pub fn all(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            clauses: Vec::new(),
            ordering: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    /// Conjunction of both queries.
    ///
    /// Clauses and ordering keep their order, `self` first; `self`'s target
    /// table, limit and offset win when both are set.
    pub fn and(mut self, other: Query) -> Query {
        self.clauses.extend(other.clauses);
        self.ordering.extend(other.ordering);
        self.limit = self.limit.or(other.limit);
        self.offset = self.offset.or(other.offset);
        self
    }

    pub fn order_by(mut self, field: SchemaField, order: Order) -> Query {
        self.ordering.push((field, order));
        self
    }

    pub fn limit(mut self, limit: u64) -> Query {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Query {
        self.offset = Some(offset);
        self
    }

    /// Restricts the result to rows `range.start..range.end`.
    pub fn slice(self, range: Range<u64>) -> Query {
        let len = range.end.saturating_sub(range.start);
        self.offset(range.start).limit(len)
    }

    /// Restricts the result to the row at `index`.
    pub fn at(self, index: u64) -> Query {
        self.offset(index).limit(1)
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn ordering(&self) -> &[(SchemaField, Order)] {
        &self.ordering
    }

    pub fn limit_value(&self) -> Option<u64> {
        self.limit
    }

    pub fn offset_value(&self) -> Option<u64> {
        self.offset
    }

    /// Columns constrained by plain equality, in clause order.
    pub fn equalities(&self) -> impl Iterator<Item = (&SchemaField, &Value)> {
        self.clauses.iter().filter_map(|c| match &c.predicate {
            Predicate::Compare(Operator::Eq, value) => Some((&c.field, value)),
            _ => None,
        })
    }

    /// Compiles a `SELECT` of every declared column plus the key.
    pub fn compile(&self, schema: &Schema) -> Result<CompiledQuery, QueryError> {
        let table = self.target(schema)?;
        let mut binds = Vec::new();
        let filter = self.filter_sql(table, schema, &mut binds)?;
        let tail = self.tail_sql(table, &mut binds)?;
        let columns: Vec<&str> = table.column_names().collect();
        let sql = format!(
            "SELECT {} FROM {}{filter}{tail}",
            columns.join(", "),
            table.name()
        );
        Ok(CompiledQuery { sql, binds })
    }

    /// Compiles a `SELECT COUNT(*)` over the matching rows.
    pub fn compile_count(&self, schema: &Schema) -> Result<CompiledQuery, QueryError> {
        let table = self.target(schema)?;
        let mut binds = Vec::new();
        let restriction = self.restriction_sql(table, schema, &mut binds)?;
        let sql = format!("SELECT COUNT(*) FROM {}{restriction}", table.name());
        Ok(CompiledQuery { sql, binds })
    }

    /// Compiles a `DELETE` of the matching rows.
    pub fn compile_delete(&self, schema: &Schema) -> Result<CompiledQuery, QueryError> {
        let table = self.target(schema)?;
        let mut binds = Vec::new();
        let restriction = self.restriction_sql(table, schema, &mut binds)?;
        let sql = format!("DELETE FROM {}{restriction}", table.name());
        Ok(CompiledQuery { sql, binds })
    }

    /// Compiles an `UPDATE` assigning `assignments` on the matching rows.
    pub fn compile_update(
        &self,
        schema: &Schema,
        assignments: &[(SchemaField, Value)],
    ) -> Result<CompiledQuery, QueryError> {
        let table = self.target(schema)?;
        if assignments.is_empty() {
            return Err(QueryError::EmptyUpdate(table.name().to_string()));
        }

        let mut binds = Vec::with_capacity(assignments.len());
        let mut sets = Vec::with_capacity(assignments.len());
        for (field, value) in assignments {
            let ty = self.check_column(table, field)?;
            sets.push(format!("{} = ?", field.column()));
            binds.push(Bind {
                ty: ty.clone(),
                value: value.clone(),
            });
        }

        let restriction = self.restriction_sql(table, schema, &mut binds)?;
        let sql = format!(
            "UPDATE {} SET {}{restriction}",
            table.name(),
            sets.join(", ")
        );
        Ok(CompiledQuery { sql, binds })
    }

    fn target<'s>(&self, schema: &'s Schema) -> Result<&'s TableDef, QueryError> {
        schema
            .table(&self.table)
            .map(|t| t.as_ref())
            .ok_or_else(|| QueryError::UnknownTable(self.table.clone()))
    }

    fn check_column<'t>(
        &self,
        table: &'t TableDef,
        field: &SchemaField,
    ) -> Result<&'t LogicalType, QueryError> {
        if field.table() != table.name() {
            return Err(QueryError::MixedTables {
                table: table.name().to_string(),
                clause_table: field.table().to_string(),
                column: field.column().to_string(),
            });
        }
        table
            .column_type(field.column())
            .ok_or_else(|| QueryError::UnknownColumn {
                table: table.name().to_string(),
                column: field.column().to_string(),
            })
    }

    /// ` WHERE ...` for the clauses, or an empty string.
    fn filter_sql(
        &self,
        table: &TableDef,
        schema: &Schema,
        binds: &mut Vec<Bind>,
    ) -> Result<String, QueryError> {
        let mut parts = Vec::with_capacity(self.clauses.len());
        for clause in &self.clauses {
            let ty = self.check_column(table, &clause.field)?;
            let column = clause.field.column();
            let part = match &clause.predicate {
                Predicate::Compare(op, value) => {
                    binds.push(Bind {
                        ty: ty.clone(),
                        value: value.clone(),
                    });
                    format!("{column} {} ?", op.as_sql())
                }
                Predicate::In(values) => {
                    binds.extend(values.iter().map(|value| Bind {
                        ty: ty.clone(),
                        value: value.clone(),
                    }));
                    let placeholders = vec!["?"; values.len()].join(", ");
                    format!("{column} IN ({placeholders})")
                }
                Predicate::IsNull => format!("{column} IS NULL"),
                Predicate::IsNotNull => format!("{column} IS NOT NULL"),
                Predicate::Related(inner) => {
                    let Some(target) = ty.referenced_table() else {
                        return Err(QueryError::NotAReference {
                            table: table.name().to_string(),
                            column: column.to_string(),
                        });
                    };
                    if inner.table != target {
                        return Err(QueryError::ReferenceMismatch {
                            table: table.name().to_string(),
                            column: column.to_string(),
                            expected: target.to_string(),
                            found: inner.table.clone(),
                        });
                    }
                    let inner_table = inner.target(schema)?;
                    let inner_filter = inner.filter_sql(inner_table, schema, binds)?;
                    format!("{column} IN (SELECT {KEY_COLUMN} FROM {target}{inner_filter})")
                }
            };
            parts.push(part);
        }

        if parts.is_empty() {
            Ok(String::new())
        } else {
            Ok(format!(" WHERE {}", parts.join(" AND ")))
        }
    }

    /// ` ORDER BY ... LIMIT ? OFFSET ?` as far as set.
    fn tail_sql(&self, table: &TableDef, binds: &mut Vec<Bind>) -> Result<String, QueryError> {
        let mut sql = String::new();
        if !self.ordering.is_empty() {
            let mut terms = Vec::with_capacity(self.ordering.len());
            for (field, order) in &self.ordering {
                self.check_column(table, field)?;
                let direction = match order {
                    Order::Asc => "ASC",
                    Order::Desc => "DESC",
                };
                terms.push(format!("{} {direction}", field.column()));
            }
            sql.push_str(" ORDER BY ");
            sql.push_str(&terms.join(", "));
        }

        if self.limit.is_some() || self.offset.is_some() {
            // SQLite only accepts OFFSET after LIMIT; -1 means unbounded.
            let limit = self
                .limit
                .map_or(-1, |l| i64::try_from(l).unwrap_or(i64::MAX));
            sql.push_str(" LIMIT ?");
            binds.push(Bind {
                ty: LogicalType::Integer,
                value: Value::Integer(limit),
            });
            if let Some(offset) = self.offset {
                sql.push_str(" OFFSET ?");
                binds.push(Bind {
                    ty: LogicalType::Integer,
                    value: Value::Integer(i64::try_from(offset).unwrap_or(i64::MAX)),
                });
            }
        }
        Ok(sql)
    }

    /// Row restriction for statements that cannot carry ORDER BY or LIMIT
    /// directly.
    fn restriction_sql(
        &self,
        table: &TableDef,
        schema: &Schema,
        binds: &mut Vec<Bind>,
    ) -> Result<String, QueryError> {
        let filter = self.filter_sql(table, schema, binds)?;
        let tail = self.tail_sql(table, binds)?;
        if tail.is_empty() {
            return Ok(filter);
        }
        Ok(format!(
            " WHERE {KEY_COLUMN} IN (SELECT {KEY_COLUMN} FROM {}{filter}{tail})",
            table.name()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Field, ModelDecl, Registry};

    const NAME: SchemaField = SchemaField::new("artist", "name");
    const STYLE: SchemaField = SchemaField::new("artist", "style");
    const BIRTHDAY: SchemaField = SchemaField::new("artist", "birthday");
    const ALBUM_ARTIST: SchemaField = SchemaField::new("album", "artist");
    const TITLE: SchemaField = SchemaField::new("album", "title");

    fn schema() -> Schema {
        let mut registry = Registry::new();
        registry
            .register(
                ModelDecl::new("artist")
                    .field(Field::text("name").default("NA"))
                    .field(Field::text("style").default("Unknown"))
                    .field(Field::date("birthday")),
            )
            .unwrap();
        registry
            .register(
                ModelDecl::new("album")
                    .field(Field::reference("artist", "artist").not_null())
                    .field(Field::text("title").not_null()),
            )
            .unwrap();
        registry.freeze().unwrap()
    }

    #[test]
    fn test_building_is_pure() {
        let q = NAME.eq("x");
        let combined = q.clone().and(STYLE.eq("y"));
        assert_eq!(q.clauses().len(), 1);
        assert_eq!(combined.clauses().len(), 2);
        assert_eq!(combined.table(), "artist");
    }

    #[test]
    fn test_all_rows_has_no_where() {
        let compiled = Query::all("artist").compile(&schema()).unwrap();
        assert_eq!(compiled.sql, "SELECT name, style, birthday, id FROM artist");
        assert!(compiled.binds.is_empty());
        assert_eq!(compiled.to_string(), compiled.sql);
    }

    #[test]
    fn test_two_clauses_two_placeholders_in_order() {
        let compiled = NAME.eq("a").and(STYLE.eq("b")).compile(&schema()).unwrap();
        assert_eq!(compiled.sql.matches('?').count(), 2);
        assert_eq!(compiled.binds[0].value, Value::from("a"));
        assert_eq!(compiled.binds[1].value, Value::from("b"));
        assert_eq!(compiled.binds[0].ty, LogicalType::Text);
    }

    #[test]
    fn test_values_never_interpolated() {
        let hostile = "'; DROP TABLE artist; --";
        let compiled = NAME.eq(hostile).compile(&schema()).unwrap();
        assert!(!compiled.sql.contains("DROP"));
        assert_eq!(compiled.binds[0].value, Value::from(hostile));
    }

    #[test]
    fn test_operators() {
        let schema = schema();
        let cases = [
            (NAME.ne("x"), "name <> ?"),
            (NAME.lt("x"), "name < ?"),
            (NAME.le("x"), "name <= ?"),
            (NAME.gt("x"), "name > ?"),
            (NAME.ge("x"), "name >= ?"),
            (NAME.eq(Value::Null), "name IS NULL"),
            (NAME.ne(Option::<String>::None), "name IS NOT NULL"),
        ];
        for (query, expected) in cases {
            let sql = query.compile(&schema).unwrap().sql;
            assert!(sql.ends_with(expected), "{sql} should end with {expected}");
        }
    }

    #[test]
    fn test_membership() {
        let compiled = NAME.is_in(["a", "b", "c"]).compile(&schema()).unwrap();
        assert!(compiled.sql.ends_with("WHERE name IN (?, ?, ?)"));
        assert_eq!(compiled.binds.len(), 3);
    }

    #[test]
    fn test_key_column_is_queryable() {
        let compiled = SchemaField::key("artist").eq(3).compile(&schema()).unwrap();
        assert!(compiled.sql.ends_with("WHERE id = ?"));
        assert_eq!(compiled.binds[0].ty, LogicalType::Integer);
    }

    #[test]
    fn test_unknown_column_is_reported_at_compile() {
        let query = SchemaField::new("artist", "nope").eq(1);
        assert_eq!(
            query.compile(&schema()).unwrap_err(),
            QueryError::UnknownColumn {
                table: "artist".into(),
                column: "nope".into()
            }
        );
    }

    #[test]
    fn test_unknown_table() {
        let err = Query::all("ghost").compile(&schema()).unwrap_err();
        assert_eq!(err, QueryError::UnknownTable("ghost".into()));
    }

    #[test]
    fn test_mixed_tables_rejected() {
        let err = NAME.eq("a").and(TITLE.eq("b")).compile(&schema()).unwrap_err();
        assert!(matches!(err, QueryError::MixedTables { .. }));
    }

    #[test]
    fn test_related_lookup() {
        let bd = chrono::NaiveDate::from_ymd_opt(1995, 10, 21).unwrap();
        let compiled = ALBUM_ARTIST
            .matches(BIRTHDAY.ne(bd))
            .and(TITLE.ne("x"))
            .compile(&schema())
            .unwrap();
        assert_eq!(
            compiled.sql,
            "SELECT artist, title, id FROM album \
             WHERE artist IN (SELECT id FROM artist WHERE birthday <> ?) AND title <> ?"
        );
        assert_eq!(compiled.binds[0].ty, LogicalType::Date);
        assert_eq!(compiled.binds[1].value, Value::from("x"));
    }

    #[test]
    fn test_related_lookup_requires_reference() {
        let err = TITLE.matches(NAME.eq("a")).compile(&schema()).unwrap_err();
        assert!(matches!(err, QueryError::NotAReference { .. }));

        let err = ALBUM_ARTIST
            .matches(TITLE.eq("a"))
            .compile(&schema())
            .unwrap_err();
        assert!(matches!(err, QueryError::ReferenceMismatch { .. }));
    }

    #[test]
    fn test_order_and_slice() {
        let compiled = Query::all("artist")
            .order_by(NAME, Order::Desc)
            .slice(2..5)
            .compile(&schema())
            .unwrap();
        assert!(compiled.sql.ends_with("ORDER BY name DESC LIMIT ? OFFSET ?"));
        assert_eq!(compiled.binds[0].value, Value::Integer(3));
        assert_eq!(compiled.binds[1].value, Value::Integer(2));
    }

    #[test]
    fn test_offset_without_limit() {
        let compiled = Query::all("artist").offset(4).compile(&schema()).unwrap();
        assert!(compiled.sql.ends_with("LIMIT ? OFFSET ?"));
        assert_eq!(compiled.binds[0].value, Value::Integer(-1));
    }

    #[test]
    fn test_index_is_limit_one() {
        let query = Query::all("artist").at(7);
        assert_eq!(query.limit_value(), Some(1));
        assert_eq!(query.offset_value(), Some(7));
    }

    #[test]
    fn test_count_and_delete() {
        let schema = schema();
        let count = NAME.eq("a").compile_count(&schema).unwrap();
        assert_eq!(count.sql, "SELECT COUNT(*) FROM artist WHERE name = ?");

        let delete = NAME.eq("a").limit(1).compile_delete(&schema).unwrap();
        assert_eq!(
            delete.sql,
            "DELETE FROM artist WHERE id IN (SELECT id FROM artist WHERE name = ? LIMIT ?)"
        );
        assert_eq!(delete.binds.len(), 2);
    }

    #[test]
    fn test_update_binds_assignments_first() {
        let compiled = NAME
            .eq("a")
            .compile_update(&schema(), &[(STYLE, Value::from("Baroque"))])
            .unwrap();
        assert_eq!(compiled.sql, "UPDATE artist SET style = ? WHERE name = ?");
        assert_eq!(compiled.binds[0].value, Value::from("Baroque"));
        assert_eq!(compiled.binds[1].value, Value::from("a"));
    }

    #[test]
    fn test_empty_update_rejected() {
        let err = Query::all("artist").compile_update(&schema(), &[]).unwrap_err();
        assert_eq!(err, QueryError::EmptyUpdate("artist".into()));
    }

    #[test]
    fn test_equalities() {
        let query = NAME.eq("a").and(STYLE.ne("b")).and(BIRTHDAY.is_null());
        let eqs: Vec<_> = query.equalities().collect();
        assert_eq!(eqs, [(&NAME, &Value::from("a"))]);
    }
}
