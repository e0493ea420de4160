//! Declaring models, saving rows and following references.
//!
//! Declares an `artist` and a `painting` table sharing an abstract `_work`
//! base, fills an in-memory database and runs a few queries, including a
//! lookup across the painting's artist reference.
//!
//! # Usage
//!
//! ```bash
//! cargo run -p microlite-examples --example gallery
//! ```

use chrono::NaiveDate;
use microlite_core::{Field, ForeignKeyAction, Model, ModelDecl, Order, Query, Registry, SchemaField};
use microlite_sqlite::{Database, Row, initialize_database};

struct Artist;

impl Artist {
    const NAME: SchemaField = SchemaField::new("artist", "name");
    const STYLE: SchemaField = SchemaField::new("artist", "style");
}

impl Model for Artist {
    const TABLE: &'static str = "artist";

    fn declare() -> ModelDecl {
        ModelDecl::new(Self::TABLE)
            .field(Field::text("name").default("NA"))
            .field(Field::text("style").default("Unknown"))
            .field(Field::date("birthday"))
    }
}

struct Painting;

impl Painting {
    const YEAR: SchemaField = SchemaField::new("painting", "year");
    const ARTIST: SchemaField = SchemaField::new("painting", "artist");
}

impl Model for Painting {
    const TABLE: &'static str = "painting";

    fn declare() -> ModelDecl {
        let work = ModelDecl::new("_work")
            .field(Field::text("title").not_null().default("Untitled"))
            .field(Field::integer("year"));
        ModelDecl::new(Self::TABLE)
            .extends(work)
            .field(Field::reference("artist", Artist::TABLE).on_delete(ForeignKeyAction::Cascade))
    }
}

fn add_artist(db: &Database, name: &str, style: &str, birthday: NaiveDate) -> Row {
    let mut artist = db.new_row(Artist::TABLE).unwrap();
    artist.set("name", name).unwrap();
    artist.set("style", style).unwrap();
    artist.set("birthday", birthday).unwrap();
    artist.save(db).unwrap();
    artist
}

fn add_painting(db: &Database, title: &str, year: i64, artist: &Row) {
    let mut painting = db.new_row(Painting::TABLE).unwrap();
    painting.set("title", title).unwrap();
    painting.set("year", year).unwrap();
    painting.set_reference("artist", artist.clone()).unwrap();
    painting.save(db).unwrap();
}

fn main() {
    // === Step 1: Declare the schema ===
    let mut registry = Registry::new();
    registry.register_model::<Artist>().unwrap();
    registry.register_model::<Painting>().unwrap();

    for table in registry.all_tables().unwrap() {
        let columns: Vec<&str> = table.column_names().collect();
        println!("{table}: {}", columns.join(", "));
    }

    // === Step 2: Open the database and add rows ===
    let db = initialize_database(":memory:", &registry, false).unwrap();

    let vermeer = add_artist(&db, "Johannes Vermeer", "Baroque", NaiveDate::from_ymd_opt(1632, 10, 31).unwrap());
    let hals = add_artist(&db, "Frans Hals", "Baroque", NaiveDate::from_ymd_opt(1582, 1, 1).unwrap());
    let monet = add_artist(&db, "Claude Monet", "Impressionism", NaiveDate::from_ymd_opt(1840, 11, 14).unwrap());

    add_painting(&db, "The Milkmaid", 1658, &vermeer);
    add_painting(&db, "Girl with a Pearl Earring", 1665, &vermeer);
    add_painting(&db, "The Laughing Cavalier", 1624, &hals);
    add_painting(&db, "Impression, Sunrise", 1872, &monet);

    println!("\nArtists: {}", db.count(&Query::all(Artist::TABLE)).unwrap());
    println!("Paintings: {}", db.count(&Query::all(Painting::TABLE)).unwrap());

    // === Step 3: Query ===
    println!("\n=== Baroque paintings, oldest first ===");
    let baroque = Painting::ARTIST
        .matches(Artist::STYLE.eq("Baroque"))
        .order_by(Painting::YEAR, Order::Asc);
    for painting in db.iter(&baroque).unwrap() {
        let mut painting = painting.unwrap();
        let title: String = painting.get("title").unwrap();
        let year: i64 = painting.get("year").unwrap();
        let painter = painting.reference(&db, "artist").unwrap();
        let name = painter
            .map(|artist| artist.get::<String>("name").unwrap())
            .unwrap_or_default();
        println!("  {year}  {title} ({name})");
    }

    println!("\n=== Artists born before 1700 ===");
    let early = SchemaField::new("artist", "birthday").lt(NaiveDate::from_ymd_opt(1700, 1, 1).unwrap());
    for artist in db.all(&early.order_by(Artist::NAME, Order::Asc)).unwrap() {
        println!("  {}", artist.get::<String>("name").unwrap());
    }

    println!("\nStatements executed: {}", db.statement_count());
}
