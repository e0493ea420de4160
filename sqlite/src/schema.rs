//! DDL generation for declared tables and introspection of the live schema.
//!
//! Declared tables are rendered into `CREATE TABLE` and
//! `ALTER TABLE .. ADD COLUMN` statements with column types taken from the
//! [`CodecTable`]. The live database is read back through
//! `pragma_table_info` into the same [`ColumnSpec`] shape, so declared and
//! live columns can be compared directly.
//!
//! # Column layout
//!
//! Every table has its declared fields in order, followed by the key column
//! `id INTEGER PRIMARY KEY NOT NULL`. Reference fields are integer columns
//! with a `REFERENCES target(id)` constraint.

use std::collections::BTreeMap;

use microlite_core::{Field, KEY_COLUMN, TableDef};
use rusqlite::{Connection, params};

use crate::codec::CodecTable;
use crate::error::Result;

/// Shape of one column, as declared or as found in the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: String,
    pub sql_type: String,
    pub not_null: bool,
    /// Default expression text, without surrounding parentheses.
    pub default: Option<String>,
    pub primary_key: bool,
}

impl ColumnSpec {
    fn key() -> Self {
        Self {
            name: KEY_COLUMN.to_string(),
            sql_type: "INTEGER".to_string(),
            not_null: true,
            default: None,
            primary_key: true,
        }
    }

    /// Describes how `live` differs from this declared column.
    ///
    /// Types compare case-insensitively; an empty list means the columns
    /// match.
    pub fn differences(&self, live: &ColumnSpec) -> Vec<String> {
        let mut diffs = Vec::new();
        if !self.sql_type.eq_ignore_ascii_case(&live.sql_type) {
            diffs.push(format!("type {} -> {}", live.sql_type, self.sql_type));
        }
        if self.not_null != live.not_null {
            let label = |b: bool| if b { "NOT NULL" } else { "NULL" };
            diffs.push(format!("{} -> {}", label(live.not_null), label(self.not_null)));
        }
        let declared = self.default.as_deref().map(strip_parens);
        let existing = live.default.as_deref().map(strip_parens);
        if declared != existing {
            diffs.push(format!(
                "default {} -> {}",
                existing.unwrap_or("NULL"),
                declared.unwrap_or("NULL")
            ));
        }
        if self.primary_key != live.primary_key {
            diffs.push("primary key changed".to_string());
        }
        diffs
    }
}

fn strip_parens(mut s: &str) -> &str {
    s = s.trim();
    while s.len() >= 2 && s.starts_with('(') && s.ends_with(')') {
        s = s[1..s.len() - 1].trim();
    }
    s
}

/// Declared columns of `table`, key column last.
pub fn declared_columns(table: &TableDef, codecs: &CodecTable) -> Result<Vec<ColumnSpec>> {
    let mut columns = Vec::with_capacity(table.fields().len() + 1);
    for field in table.fields() {
        columns.push(ColumnSpec {
            name: field.name().to_string(),
            sql_type: codecs.sql_type(field.logical_type())?.to_string(),
            not_null: field.is_not_null(),
            default: codecs.literal(field.logical_type(), field.default_value())?,
            primary_key: false,
        });
    }
    columns.push(ColumnSpec::key());
    Ok(columns)
}

/// Renders the column definition used in `CREATE TABLE` and `ADD COLUMN`.
pub fn column_definition(field: &Field, codecs: &CodecTable) -> Result<String> {
    let ty = field.logical_type();
    let mut def = format!("{} {}", field.name(), codecs.sql_type(ty)?);
    if let Some(default) = codecs.literal(ty, field.default_value())? {
        def.push_str(" DEFAULT ");
        def.push_str(&default);
    }
    if field.is_not_null() {
        def.push_str(" NOT NULL");
    }
    if let Some(target) = ty.referenced_table() {
        def.push_str(&format!(" REFERENCES {target}({KEY_COLUMN})"));
        if let Some(action) = field.on_delete_action() {
            def.push_str(&format!(" ON DELETE {}", action.as_sql()));
        }
        if let Some(action) = field.on_update_action() {
            def.push_str(&format!(" ON UPDATE {}", action.as_sql()));
        }
    }
    Ok(def)
}

/// Generates the `CREATE TABLE` statement for `table`.
///
/// This is the table's definitional form; its bare name is the canonical
/// one.
pub fn create_table_sql(table: &TableDef, codecs: &CodecTable) -> Result<String> {
    let mut columns = Vec::with_capacity(table.fields().len() + 1);
    for field in table.fields() {
        columns.push(column_definition(field, codecs)?);
    }
    columns.push(format!("{KEY_COLUMN} INTEGER PRIMARY KEY NOT NULL"));
    Ok(format!(
        "CREATE TABLE {} ({})",
        table.name(),
        columns.join(", ")
    ))
}

/// Generates the statement adding `field` to an existing table.
pub fn add_column_sql(table: &TableDef, field: &Field, codecs: &CodecTable) -> Result<String> {
    Ok(format!(
        "ALTER TABLE {} ADD COLUMN {}",
        table.name(),
        column_definition(field, codecs)?
    ))
}

/// Snapshot of the tables and columns present in a database.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiveSchema {
    tables: BTreeMap<String, Vec<ColumnSpec>>,
}

impl LiveSchema {
    /// Reads every user table and its columns.
    ///
    /// SQLite's internal `sqlite_*` tables are skipped.
    pub fn introspect(conn: &Connection) -> Result<Self> {
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\' \
             ORDER BY name",
        )?;
        let names: Vec<String> = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut tables = BTreeMap::new();
        for name in names {
            let columns = introspect_table(conn, &name)?;
            tables.insert(name, columns);
        }
        Ok(Self { tables })
    }

    /// Columns of `table` in table order, if the table exists.
    pub fn table(&self, name: &str) -> Option<&[ColumnSpec]> {
        self.tables.get(name).map(Vec::as_slice)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }
}

/// Reads the columns of one table; empty if the table does not exist.
pub fn introspect_table(conn: &Connection, table: &str) -> Result<Vec<ColumnSpec>> {
    let mut stmt = conn.prepare(
        "SELECT name, type, \"notnull\", dflt_value, pk FROM pragma_table_info(?1) ORDER BY cid",
    )?;
    let columns = stmt
        .query_map(params![table], |row| {
            Ok(ColumnSpec {
                name: row.get(0)?,
                sql_type: row.get(1)?,
                not_null: row.get::<_, i64>(2)? != 0,
                default: row.get(3)?,
                primary_key: row.get::<_, i64>(4)? != 0,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use microlite_core::{ForeignKeyAction, ModelDecl, Registry, Schema};

    fn schema() -> Schema {
        let mut registry = Registry::new();
        registry
            .register(
                ModelDecl::new("artist")
                    .field(Field::text("name").default("NA"))
                    .field(Field::text("style").default("Unknown"))
                    .field(Field::date("birthday").not_null().default(
                        chrono::NaiveDate::from_ymd_opt(1000, 1, 1).unwrap(),
                    )),
            )
            .unwrap();
        registry
            .register(
                ModelDecl::new("painting")
                    .field(
                        Field::reference("artist", "artist")
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .field(Field::text("title").not_null()),
            )
            .unwrap();
        registry.freeze().unwrap()
    }

    #[test]
    fn test_create_table_sql() {
        let schema = schema();
        let codecs = CodecTable::new();
        assert_eq!(
            create_table_sql(schema.table("artist").unwrap(), &codecs).unwrap(),
            "CREATE TABLE artist (name TEXT DEFAULT 'NA', style TEXT DEFAULT 'Unknown', \
             birthday DATE DEFAULT '1000-01-01' NOT NULL, id INTEGER PRIMARY KEY NOT NULL)"
        );
        assert_eq!(
            create_table_sql(schema.table("painting").unwrap(), &codecs).unwrap(),
            "CREATE TABLE painting (artist INTEGER REFERENCES artist(id) ON DELETE CASCADE, \
             title TEXT NOT NULL, id INTEGER PRIMARY KEY NOT NULL)"
        );
    }

    #[test]
    fn test_add_column_sql() {
        let schema = schema();
        let table = schema.table("artist").unwrap();
        let sql = add_column_sql(table, table.field("style").unwrap(), &CodecTable::new()).unwrap();
        assert_eq!(sql, "ALTER TABLE artist ADD COLUMN style TEXT DEFAULT 'Unknown'");
    }

    #[test]
    fn test_introspection_matches_declaration() {
        let schema = schema();
        let codecs = CodecTable::new();
        let conn = Connection::open_in_memory().unwrap();
        for table in schema.tables() {
            conn.execute_batch(&create_table_sql(table, &codecs).unwrap())
                .unwrap();
        }

        let live = LiveSchema::introspect(&conn).unwrap();
        let names: Vec<_> = live.table_names().collect();
        assert_eq!(names, ["artist", "painting"]);

        for table in schema.tables() {
            let declared = declared_columns(table, &codecs).unwrap();
            let actual = live.table(table.name()).unwrap();
            assert_eq!(declared.len(), actual.len());
            for (d, a) in declared.iter().zip(actual) {
                assert_eq!(d.name, a.name);
                assert!(d.differences(a).is_empty(), "{:?}", d.differences(a));
            }
        }
    }

    #[test]
    fn test_missing_table_introspects_empty() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(introspect_table(&conn, "nothing").unwrap().is_empty());
        assert!(!LiveSchema::introspect(&conn).unwrap().contains("nothing"));
    }

    #[test]
    fn test_differences() {
        let declared = ColumnSpec {
            name: "style".into(),
            sql_type: "TEXT".into(),
            not_null: true,
            default: Some("'Unknown'".into()),
            primary_key: false,
        };
        let mut live = declared.clone();
        live.sql_type = "text".into();
        live.default = Some("('Unknown')".into());
        assert!(declared.differences(&live).is_empty());

        live.sql_type = "INTEGER".into();
        live.not_null = false;
        live.default = None;
        let diffs = declared.differences(&live);
        assert_eq!(
            diffs,
            [
                "type INTEGER -> TEXT",
                "NULL -> NOT NULL",
                "default NULL -> 'Unknown'"
            ]
        );
    }

    #[test]
    fn test_strip_parens() {
        assert_eq!(strip_parens("(('x'))"), "'x'");
        assert_eq!(strip_parens(" 3 "), "3");
    }
}
