//! Unit tests for schema materialisation

use pretty_assertions::assert_eq;
use sqlite_querygen::project::discover;
use sqlite_querygen::schema::{inspect, SchemaOutput, StorageClass};

use crate::common::TestProject;

fn inspect_project(project: &TestProject) -> anyhow::Result<SchemaOutput> {
    let discovered = discover(project.root())?;
    inspect(&discovered, None, false)
}

fn inspect_ok(project: &TestProject) -> SchemaOutput {
    match inspect_project(project) {
        Ok(output) => output,
        Err(err) => panic!("inspection failed: {err:#}"),
    }
}

#[test]
fn test_table_columns_and_nullability() {
    let project = TestProject::new();
    project.schema(
        "001_person.sql",
        r#"
CREATE TABLE person (
    id INTEGER PRIMARY KEY,
    first_name TEXT NOT NULL,
    birth_date TEXT,
    score REAL DEFAULT 0.5,
    photo BLOB
);
"#,
    );

    let output = inspect_ok(&project);
    let table = output.catalog.table("person").expect("person table");
    let names: Vec<&str> = table.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["id", "first_name", "birth_date", "score", "photo"]);

    let id = table.column("id").unwrap();
    assert!(id.is_primary_key);
    assert!(!id.is_sql_nullable);
    assert_eq!(id.storage, StorageClass::Integer);

    let first_name = table.column("first_name").unwrap();
    assert!(!first_name.is_sql_nullable);

    let birth_date = table.column("birth_date").unwrap();
    assert!(birth_date.is_sql_nullable);

    let score = table.column("score").unwrap();
    assert_eq!(score.storage, StorageClass::Real);
    assert!(score.default_expr.is_some());

    assert_eq!(table.column("photo").unwrap().storage, StorageClass::Blob);
}

#[test]
fn test_boolean_hints() {
    let project = TestProject::new();
    project.schema(
        "tables.sql",
        r#"
CREATE TABLE flags (
    id INTEGER PRIMARY KEY,
    is_active BOOLEAN NOT NULL,
    is_hidden INTEGER NOT NULL CHECK (is_hidden IN (0, 1))
);
"#,
    );

    let output = inspect_ok(&project);
    let table = output.catalog.table("flags").unwrap();
    assert!(table.column("is_active").unwrap().boolean_hint);
    assert!(table.column("is_hidden").unwrap().boolean_hint);
    assert!(!table.column("id").unwrap().boolean_hint);
}

#[test]
fn test_column_annotations_attach() {
    let project = TestProject::new();
    project.schema(
        "person.sql",
        r#"
CREATE TABLE person (
    id INTEGER PRIMARY KEY,
    -- @@{ field=birth_date, propertyType=kotlinx.datetime.LocalDate, adapter=custom }
    birth_date TEXT
);
"#,
    );

    let output = inspect_ok(&project);
    let column = output
        .catalog
        .table("person")
        .unwrap()
        .column("birth_date")
        .unwrap()
        .clone();
    assert_eq!(
        column.annotations.property_type.as_deref(),
        Some("kotlinx.datetime.LocalDate")
    );
    assert!(column.annotations.custom_adapter);
}

#[test]
fn test_annotation_for_unknown_column_fails() {
    let project = TestProject::new();
    project.schema(
        "person.sql",
        "-- @@{ field=nope, notNull=true }\nCREATE TABLE person (id INTEGER PRIMARY KEY);",
    );
    let err = inspect_project(&project).unwrap_err();
    assert!(err.to_string().contains("unknown column"), "{err:#}");
}

#[test]
fn test_view_fields_resolve_to_source() {
    let project = TestProject::new();
    project.schema(
        "schema.sql",
        r#"
CREATE TABLE person (id INTEGER PRIMARY KEY, first_name TEXT NOT NULL);
CREATE VIEW people AS SELECT p.id AS pid, p.first_name FROM person p;
"#,
    );

    let output = inspect_ok(&project);
    let view = output.catalog.view("people").expect("people view");
    assert_eq!(view.table_aliases, vec![("p".to_string(), "person".to_string())]);

    let pid = view.field("pid").unwrap();
    assert_eq!(pid.source_alias.as_deref(), Some("p"));
    assert_eq!(pid.original_column.as_deref(), Some("id"));
}

#[test]
fn test_view_collection_key_annotation() {
    let project = TestProject::new();
    project.schema(
        "schema.sql",
        r#"
CREATE TABLE doc (id INTEGER PRIMARY KEY, tag TEXT);
-- @@{ collectionKey=id }
CREATE VIEW doc_tags AS SELECT id, tag FROM doc;
"#,
    );
    let output = inspect_ok(&project);
    let view = output.catalog.view("doc_tags").unwrap();
    assert_eq!(view.collection_key.as_deref(), Some("id"));
}

#[test]
fn test_duplicate_relation_name_fails() {
    let project = TestProject::new();
    project.schema(
        "schema.sql",
        "CREATE TABLE t (id INTEGER);\nCREATE VIEW t AS SELECT 1 AS one;",
    );
    // SQLite itself rejects the duplicate name during DDL execution.
    let err = inspect_project(&project).unwrap_err();
    assert!(err.to_string().contains("t"), "{err:#}");
}

#[test]
fn test_non_ddl_in_schema_dir_fails() {
    let project = TestProject::new();
    project.schema("schema.sql", "INSERT INTO person VALUES (1);");
    let err = inspect_project(&project).unwrap_err();
    assert!(
        err.to_string().contains("CREATE TABLE, CREATE VIEW or CREATE INDEX"),
        "{err:#}"
    );
}

#[test]
fn test_index_attaches_to_table() {
    let project = TestProject::new();
    project.schema(
        "schema.sql",
        r#"
CREATE TABLE person (id INTEGER PRIMARY KEY, email TEXT);
CREATE UNIQUE INDEX idx_person_email ON person (email);
"#,
    );
    let output = inspect_ok(&project);
    let table = output.catalog.table("person").unwrap();
    assert_eq!(table.indexes.len(), 1);
    assert_eq!(table.indexes[0].name, "idx_person_email");
    assert_eq!(table.indexes[0].columns, vec!["email".to_string()]);
    assert!(table.indexes[0].is_unique);
}

#[test]
fn test_without_rowid_flag() {
    let project = TestProject::new();
    project.schema(
        "schema.sql",
        "CREATE TABLE kv (k TEXT PRIMARY KEY, v TEXT) WITHOUT ROWID;",
    );
    let output = inspect_ok(&project);
    assert!(output.catalog.table("kv").unwrap().without_rowid);
}

#[test]
fn test_migrations_extend_the_catalog() {
    let project = TestProject::new();
    project.schema(
        "person.sql",
        "CREATE TABLE person (id INTEGER PRIMARY KEY, first_name TEXT NOT NULL);",
    );
    project.migration(
        "001_add_address.sql",
        "CREATE TABLE address (id INTEGER PRIMARY KEY, person_id INTEGER, street TEXT);",
    );
    project.migration(
        "002_add_phone.sql",
        "ALTER TABLE person ADD COLUMN phone TEXT;",
    );

    let output = inspect_ok(&project);
    assert_eq!(output.applied_migration_version, Some(2));

    let address = output.catalog.table("address").expect("migrated table");
    assert_eq!(address.columns.len(), 3);

    let person = output.catalog.table("person").unwrap();
    assert!(person.column("phone").is_some());
    // Annotation-free catalog refresh keeps prior column facts.
    assert!(!person.column("id").unwrap().is_sql_nullable);
}

#[test]
fn test_migration_version_ordering() {
    let project = TestProject::new();
    project.schema("base.sql", "CREATE TABLE t (id INTEGER PRIMARY KEY);");
    project.migration("002_second.sql", "ALTER TABLE t ADD COLUMN b TEXT;");
    project.migration("001_first.sql", "ALTER TABLE t ADD COLUMN a TEXT;");

    let output = inspect_ok(&project);
    let table = output.catalog.table("t").unwrap();
    let names: Vec<&str> = table.columns.iter().map(|c| c.name.as_str()).collect();
    // 001 ran before 002 regardless of directory listing order.
    assert_eq!(names, vec!["id", "a", "b"]);
}

#[test]
fn test_seed_data_executes() {
    let project = TestProject::new();
    project.schema("person.sql", "CREATE TABLE person (id INTEGER PRIMARY KEY, name TEXT);");
    project.init("seed.sql", "INSERT INTO person (name) VALUES ('witness');");

    let output = inspect_ok(&project);
    let count: i64 = output
        .conn
        .query_row("SELECT COUNT(*) FROM person", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 1);
}

#[test]
fn test_view_over_view_closure() {
    let project = TestProject::new();
    project.schema(
        "schema.sql",
        r#"
CREATE TABLE person (id INTEGER PRIMARY KEY);
CREATE VIEW v1 AS SELECT id AS pid FROM person;
CREATE VIEW v2 AS SELECT pid FROM v1;
"#,
    );
    let output = inspect_ok(&project);
    assert_eq!(output.catalog.base_tables_of("v2"), vec!["person".to_string()]);
}
