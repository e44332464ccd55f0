//! Unit tests for statement analysis

use std::path::PathBuf;

use pretty_assertions::assert_eq;
use sqlite_querygen::analyzer::{analyze_statement, ReturningClause, StatementKind, StatementModel};
use sqlite_querygen::lexer::split;
use sqlite_querygen::project::discover;
use sqlite_querygen::schema::{inspect, SchemaOutput};

use crate::common::TestProject;

fn standard_schema() -> (TestProject, SchemaOutput) {
    let project = TestProject::new();
    project.schema(
        "schema.sql",
        r#"
CREATE TABLE person (
    id INTEGER PRIMARY KEY,
    first_name TEXT NOT NULL,
    birth_date TEXT
);
CREATE TABLE address (
    id INTEGER PRIMARY KEY,
    person_id INTEGER NOT NULL REFERENCES person(id),
    street TEXT NOT NULL
);
"#,
    );
    let discovered = discover(project.root()).unwrap();
    let output = inspect(&discovered, None, false).unwrap();
    (project, output)
}

fn analyze(schema: &SchemaOutput, sql: &str, prefixes: &[&str]) -> anyhow::Result<StatementModel> {
    let file = PathBuf::from("queries/person/test.sql");
    let blocks = split(&file, sql).unwrap();
    assert_eq!(blocks.len(), 1, "expected a single statement");
    let prefixes: Vec<String> = prefixes.iter().map(|p| p.to_string()).collect();
    analyze_statement(&file, &blocks[0], &schema.catalog, &schema.conn, &prefixes)
}

#[test]
fn test_select_field_sources() {
    let (_project, schema) = standard_schema();
    let model = analyze(&schema, "SELECT id, first_name FROM person;", &[]).unwrap();

    assert_eq!(model.kind, StatementKind::Select);
    let select = model.select.as_ref().unwrap();
    assert_eq!(select.from_table.as_ref().unwrap().table, "person");

    let labels: Vec<&str> = select.fields.iter().map(|f| f.label.as_str()).collect();
    assert_eq!(labels, vec!["id", "first_name"]);
    assert_eq!(select.fields[0].original_column.as_deref(), Some("id"));
    assert_eq!(select.fields[0].source_alias.as_deref(), Some("person"));
    assert_eq!(select.fields[1].declared_type.as_deref(), Some("TEXT"));
}

#[test]
fn test_select_wildcard_expansion() {
    let (_project, schema) = standard_schema();
    let model = analyze(&schema, "SELECT * FROM person;", &[]).unwrap();
    let select = model.select.as_ref().unwrap();
    let labels: Vec<&str> = select.fields.iter().map(|f| f.label.as_str()).collect();
    assert_eq!(labels, vec!["id", "first_name", "birth_date"]);
}

#[test]
fn test_named_parameters_rewritten_positionally() {
    let (_project, schema) = standard_schema();
    let model = analyze(
        &schema,
        "SELECT * FROM person WHERE id = :id AND first_name LIKE :q;",
        &[],
    )
    .unwrap();

    assert_eq!(model.sql, "SELECT * FROM person WHERE id = ? AND first_name LIKE ?;");
    assert_eq!(
        model.named_parameters,
        vec!["id".to_string(), "q".to_string()]
    );

    let select = model.select.as_ref().unwrap();
    assert_eq!(select.where_params.len(), 2);
    assert_eq!(select.where_params[0].0, "id");
    assert_eq!(select.where_params[0].1.column, "id");
    assert_eq!(select.where_params[1].0, "q");
    assert_eq!(select.where_params[1].1.column, "first_name");
}

#[test]
fn test_limit_offset_parameters() {
    let (_project, schema) = standard_schema();
    let model = analyze(
        &schema,
        "SELECT id FROM person ORDER BY id LIMIT :lim OFFSET :off;",
        &[],
    )
    .unwrap();
    let select = model.select.as_ref().unwrap();
    assert_eq!(select.limit_param.as_deref(), Some("lim"));
    assert_eq!(select.offset_param.as_deref(), Some("off"));
    assert_eq!(
        model.named_parameters,
        vec!["lim".to_string(), "off".to_string()]
    );
}

#[test]
fn test_cast_hints_collected() {
    let (_project, schema) = standard_schema();
    let model = analyze(
        &schema,
        "SELECT id FROM person WHERE birth_date = CAST(:when AS TEXT);",
        &[],
    )
    .unwrap();
    assert_eq!(model.cast_type_of("when"), Some("TEXT"));
}

#[test]
fn test_duplicate_alias_rejected() {
    let (_project, schema) = standard_schema();
    let err = analyze(
        &schema,
        "SELECT p.id, a.id FROM person p JOIN address a ON a.person_id = p.id;",
        &[],
    )
    .unwrap_err();
    let message = err.to_string();
    assert!(message.contains("duplicate column alias 'id'"), "{message}");
    assert!(message.contains("person"), "{message}");
    assert!(message.contains("address"), "{message}");
}

#[test]
fn test_prefixed_duplicates_allowed() {
    let (_project, schema) = standard_schema();
    let model = analyze(
        &schema,
        "SELECT p.id, p.first_name, a.id AS addr__id, a.street AS addr__street \
         FROM person p LEFT JOIN address a ON a.person_id = p.id;",
        &["addr__"],
    )
    .unwrap();
    let select = model.select.as_ref().unwrap();
    assert_eq!(select.fields.len(), 4);
    assert_eq!(select.fields[2].label, "addr__id");
    assert_eq!(select.fields[2].original_column.as_deref(), Some("id"));
}

#[test]
fn test_join_shape() {
    let (_project, schema) = standard_schema();
    let model = analyze(
        &schema,
        "SELECT p.id FROM person p LEFT JOIN address a ON a.person_id = p.id;",
        &[],
    )
    .unwrap();
    let select = model.select.as_ref().unwrap();
    assert_eq!(
        select.table_aliases(),
        vec![
            ("p".to_string(), "person".to_string()),
            ("a".to_string(), "address".to_string())
        ]
    );
    assert_eq!(select.join_conditions.len(), 1);
    let condition = &select.join_conditions[0];
    assert_eq!(condition.left_alias, "a");
    assert_eq!(condition.left_column, "person_id");
    assert_eq!(condition.right_alias, "p");
    assert_eq!(condition.right_column, "id");
}

#[test]
fn test_insert_parameter_columns() {
    let (_project, schema) = standard_schema();
    let model = analyze(
        &schema,
        "INSERT INTO person (first_name, birth_date) VALUES (:firstName, :birthDate);",
        &[],
    )
    .unwrap();
    assert_eq!(model.kind, StatementKind::Insert);
    let dml = model.dml.as_ref().unwrap();
    assert_eq!(dml.target_table, "person");
    assert_eq!(
        dml.value_params,
        vec![
            ("firstName".to_string(), "first_name".to_string()),
            ("birthDate".to_string(), "birth_date".to_string())
        ]
    );
}

#[test]
fn test_insert_without_column_list_uses_table_order() {
    let (_project, schema) = standard_schema();
    let model = analyze(
        &schema,
        "INSERT INTO address VALUES (:id, :personId, :street);",
        &[],
    )
    .unwrap();
    let dml = model.dml.as_ref().unwrap();
    assert_eq!(
        dml.value_params,
        vec![
            ("id".to_string(), "id".to_string()),
            ("personId".to_string(), "person_id".to_string()),
            ("street".to_string(), "street".to_string())
        ]
    );
}

#[test]
fn test_insert_returning_star() {
    let (_project, schema) = standard_schema();
    let model = analyze(
        &schema,
        "INSERT INTO person (first_name) VALUES (:firstName) RETURNING *;",
        &[],
    )
    .unwrap();
    assert_eq!(model.returning, Some(ReturningClause::Star));
}

#[test]
fn test_update_set_and_where_params_separated() {
    let (_project, schema) = standard_schema();
    let model = analyze(
        &schema,
        "UPDATE person SET first_name = :firstName, birth_date = :birthDate WHERE id = :id;",
        &[],
    )
    .unwrap();
    assert_eq!(model.kind, StatementKind::Update);
    let dml = model.dml.as_ref().unwrap();
    assert_eq!(
        dml.value_params,
        vec![
            ("firstName".to_string(), "first_name".to_string()),
            ("birthDate".to_string(), "birth_date".to_string())
        ]
    );
    assert_eq!(dml.where_params, vec![("id".to_string(), "id".to_string())]);
}

#[test]
fn test_delete_with_returning_list() {
    let (_project, schema) = standard_schema();
    let model = analyze(
        &schema,
        "DELETE FROM person WHERE id = :id RETURNING id, first_name;",
        &[],
    )
    .unwrap();
    assert_eq!(model.kind, StatementKind::Delete);
    let dml = model.dml.as_ref().unwrap();
    assert_eq!(dml.where_params, vec![("id".to_string(), "id".to_string())]);
    assert_eq!(
        model.returning,
        Some(ReturningClause::Columns(vec![
            "id".to_string(),
            "first_name".to_string()
        ]))
    );
}

#[test]
fn test_prepare_failure_is_fatal() {
    let (_project, schema) = standard_schema();
    let err = analyze(&schema, "SELECT * FROM missing_table;", &[]).unwrap_err();
    assert!(err.to_string().contains("failed to prepare"), "{err:#}");
}

#[test]
fn test_with_clause_shapes_recorded() {
    let (_project, schema) = standard_schema();
    let model = analyze(
        &schema,
        "WITH adults AS (SELECT id, first_name FROM person) SELECT first_name FROM adults;",
        &[],
    )
    .unwrap();
    assert_eq!(model.with_selects.len(), 1);
    assert_eq!(
        model.with_selects[0].from_table.as_ref().unwrap().table,
        "person"
    );
}

#[test]
fn test_duplicate_parameter_occurrences_preserved() {
    let (_project, schema) = standard_schema();
    let model = analyze(
        &schema,
        "SELECT id FROM person WHERE first_name = :name OR first_name LIKE :name;",
        &[],
    )
    .unwrap();
    assert_eq!(model.named_parameters, vec!["name".to_string()]);
    assert_eq!(
        model.parameter_occurrences,
        vec!["name".to_string(), "name".to_string()]
    );
}
