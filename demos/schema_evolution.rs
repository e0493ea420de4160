//! Evolving a schema across releases of an application.
//!
//! Creates an on-disk database with a first version of the `artist` table,
//! then reopens it with a declaration that adds a column: once with
//! migrations disabled, which is refused, and once with them allowed.
//!
//! # Usage
//!
//! ```bash
//! cargo run -p microlite-examples --example schema_evolution
//! ```

use microlite_core::{Field, ModelDecl, Query, Registry};
use microlite_sqlite::{Database, DatabaseConfig, LiveSchema, initialize_database};

fn artist_v1() -> ModelDecl {
    ModelDecl::new("artist")
        .field(Field::text("name").default("NA"))
        .field(Field::text("style").default("Unknown"))
}

fn artist_v2() -> ModelDecl {
    artist_v1().field(Field::text("country").default("Netherlands"))
}

fn registry(decl: ModelDecl) -> Registry {
    let mut registry = Registry::new();
    registry.register(decl).unwrap();
    registry
}

fn print_columns(db: &Database) {
    let live = LiveSchema::introspect(db.connection()).unwrap();
    for column in live.table("artist").unwrap_or_default() {
        println!("  {} {}", column.name, column.sql_type);
    }
}

fn main() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gallery.db");

    // === Release 1 ===
    println!("=== Release 1 ===");
    {
        let db = initialize_database(&path, &registry(artist_v1()), false).unwrap();
        let mut artist = db.new_row("artist").unwrap();
        artist.set("name", "Jan Steen").unwrap();
        artist.save(&db).unwrap();
        print_columns(&db);
    }

    // === Release 2 without migrations ===
    println!("\n=== Release 2, migrations disabled ===");
    match initialize_database(&path, &registry(artist_v2()), false) {
        Ok(_) => println!("unexpectedly opened"),
        Err(err) => println!("{err}"),
    }

    // === Release 2 with migrations ===
    println!("\n=== Release 2, migrations allowed ===");
    let config = DatabaseConfig::new(&path)
        .allow_migrations(true)
        .vacuum_after_migration(true);
    let db = Database::open(config, &registry(artist_v2())).unwrap();
    print_columns(&db);

    for artist in db.all(&Query::all("artist")).unwrap() {
        println!(
            "  {} from {}",
            artist.get::<String>("name").unwrap(),
            artist.get::<String>("country").unwrap()
        );
    }
}
