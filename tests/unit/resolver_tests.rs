//! Unit tests for column lookup, type resolution and mapping plans

use std::path::PathBuf;

use pretty_assertions::assert_eq;
use sqlite_querygen::analyzer::analyze_statement;
use sqlite_querygen::annotation::{
    classify_field_blocks, extract_annotations, parse_statement_annotations, NameStyle,
};
use sqlite_querygen::error::Diagnostic;
use sqlite_querygen::lexer::split;
use sqlite_querygen::project::discover;
use sqlite_querygen::resolver::{
    build_mapping_plan, resolve_parameter_types, resolve_relation_column, AnnotatedStatement,
    IrType, ResultMappingPlan,
};
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
    -- @@{ field=birth_date, propertyType=kotlinx.datetime.LocalDate, adapter=custom }
    birth_date TEXT
);
CREATE TABLE address (
    id INTEGER PRIMARY KEY,
    person_id INTEGER NOT NULL REFERENCES person(id),
    street TEXT NOT NULL
);
CREATE VIEW v1 AS SELECT id AS pid FROM person;
CREATE VIEW v2 AS SELECT pid FROM v1;
"#,
    );
    let discovered = discover(project.root()).unwrap();
    let output = inspect(&discovered, None, false).unwrap();
    (project, output)
}

/// Split, annotate and analyze one query, mirroring the driver.
fn annotate(
    schema: &SchemaOutput,
    sql: &str,
    warnings: &mut Vec<Diagnostic>,
) -> AnnotatedStatement {
    let file = PathBuf::from("queries/person/test.sql");
    let blocks = split(&file, sql).unwrap();
    assert_eq!(blocks.len(), 1);
    let block = &blocks[0];

    let comments: Vec<_> = block.all_comments().cloned().collect();
    let annotation_blocks = extract_annotations(&file, &comments).unwrap();
    let (statement_blocks, field_annotations) = classify_field_blocks(&annotation_blocks).unwrap();
    let statement_annotations = parse_statement_annotations(&statement_blocks).unwrap();

    let prefixes: Vec<String> = field_annotations
        .iter()
        .filter(|f| f.target.is_dynamic())
        .filter_map(|f| f.alias_prefix.clone())
        .collect();

    let model = analyze_statement(&file, block, &schema.catalog, &schema.conn, &prefixes).unwrap();
    AnnotatedStatement::new(
        "person".to_string(),
        "test".to_string(),
        model,
        statement_annotations,
        field_annotations,
        warnings,
    )
}

fn plan_of(
    schema: &SchemaOutput,
    sql: &str,
    warnings: &mut Vec<Diagnostic>,
) -> anyhow::Result<(AnnotatedStatement, ResultMappingPlan)> {
    let annotated = annotate(schema, sql, warnings);
    let plan = build_mapping_plan(&schema.catalog, &annotated, warnings)?;
    Ok((annotated, plan))
}

#[test]
fn test_view_of_view_column_lookup() {
    let (_project, schema) = standard_schema();
    let resolution =
        resolve_relation_column(&schema.catalog, "v2", "pid", NameStyle::LowerCamelCase)
            .expect("pid resolves through both views");
    assert_eq!(resolution.table_name, "person");
    assert_eq!(resolution.column.name, "id");
    assert!(!resolution.column.is_sql_nullable);
}

#[test]
fn test_lookup_is_idempotent() {
    let (_project, schema) = standard_schema();
    let first = resolve_relation_column(&schema.catalog, "v2", "pid", NameStyle::LowerCamelCase)
        .unwrap();
    let second = resolve_relation_column(&schema.catalog, "v2", "pid", NameStyle::LowerCamelCase)
        .unwrap();
    assert_eq!(first.table_name, second.table_name);
    assert_eq!(first.column.name, second.column.name);
}

#[test]
fn test_name_style_fallback_lookup() {
    let (_project, schema) = standard_schema();
    // lowerCamel 'firstName' finds snake_case column 'first_name'.
    let resolution = resolve_relation_column(
        &schema.catalog,
        "person",
        "firstName",
        NameStyle::LowerCamelCase,
    )
    .expect("style conversion fallback");
    assert_eq!(resolution.column.name, "first_name");
}

#[test]
fn test_parameter_types_from_column_bindings() {
    let (_project, schema) = standard_schema();
    let mut warnings = Vec::new();
    let annotated = annotate(
        &schema,
        "SELECT * FROM person WHERE id = :id AND first_name LIKE :q;",
        &mut warnings,
    );
    let parameters = resolve_parameter_types(&schema.catalog, &annotated, &mut warnings);

    assert_eq!(parameters.len(), 2);
    assert_eq!(parameters[0].name, "id");
    assert_eq!(parameters[0].ty, IrType::Long);
    assert!(!parameters[0].nullable);
    assert_eq!(parameters[1].name, "q");
    assert_eq!(parameters[1].ty, IrType::String);
    assert!(!parameters[1].nullable);
    assert!(warnings.is_empty());
}

#[test]
fn test_unbound_parameter_defaults_to_string_with_warning() {
    let (_project, schema) = standard_schema();
    let mut warnings = Vec::new();
    let annotated = annotate(
        &schema,
        "SELECT id FROM person WHERE first_name = upper(:raw);",
        &mut warnings,
    );
    let parameters = resolve_parameter_types(&schema.catalog, &annotated, &mut warnings);
    assert_eq!(parameters[0].ty, IrType::String);
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].message.contains("no column binding"));
}

#[test]
fn test_cast_hint_fallback() {
    let (_project, schema) = standard_schema();
    let mut warnings = Vec::new();
    let annotated = annotate(
        &schema,
        "SELECT id FROM person WHERE first_name = upper(CAST(:n AS INTEGER));",
        &mut warnings,
    );
    let parameters = resolve_parameter_types(&schema.catalog, &annotated, &mut warnings);
    assert_eq!(parameters[0].ty, IrType::Long);
    assert!(warnings.is_empty());
}

#[test]
fn test_limit_offset_parameters_are_long() {
    let (_project, schema) = standard_schema();
    let mut warnings = Vec::new();
    let annotated = annotate(
        &schema,
        "SELECT id FROM person LIMIT :lim OFFSET :off;",
        &mut warnings,
    );
    let parameters = resolve_parameter_types(&schema.catalog, &annotated, &mut warnings);
    assert!(parameters.iter().all(|p| p.ty == IrType::Long && !p.nullable));
}

#[test]
fn test_collection_mapping_plan() {
    let (_project, schema) = standard_schema();
    let mut warnings = Vec::new();
    let (annotated, plan) = plan_of(
        &schema,
        r#"/* @@{ queryResult=PersonWithAddresses } */
SELECT p.id, p.first_name,
       a.id AS addr__id, a.street AS addr__street
/* @@{ dynamicField=addresses, mappingType=collection,
       propertyType=List<Address>, sourceTable=a,
       aliasPrefix=addr__, collectionKey=addr__id } */
FROM person p LEFT JOIN address a ON a.person_id = p.id
ORDER BY p.id, a.id;"#,
        &mut warnings,
    )
    .unwrap();

    assert_eq!(plan.main_table_alias.as_deref(), Some("p"));

    let joined_names: Vec<&str> = plan
        .joined_fields
        .iter()
        .map(|f| f.joined_property_name.as_str())
        .collect();
    assert_eq!(joined_names, vec!["id", "firstName", "addrId", "addrStreet"]);

    // Prefixed columns are optional in the joined row, main-row columns
    // keep their declared nullability.
    assert!(!plan.joined_fields[0].nullable);
    assert!(!plan.joined_fields[1].nullable);
    assert!(plan.joined_fields[2].nullable);
    assert!(plan.joined_fields[2].covered_by_prefix);
    assert!(plan.joined_fields[3].nullable);

    assert_eq!(plan.nodes.len(), 1);
    let node = &plan.nodes[0];
    assert_eq!(node.property_name, "addresses");
    assert_eq!(node.target_type.to_string(), "List<Address>");
    assert_eq!(node.element_type, IrType::Named("Address".to_string()));
    assert_eq!(node.collection_key.as_deref(), Some("addr__id"));
    assert_eq!(
        node.columns,
        vec!["addrId".to_string(), "addrStreet".to_string()]
    );
    // Element fields carry the source table's declared nullability.
    assert_eq!(node.child_fields.len(), 2);
    assert_eq!(node.child_fields[0].property_name, "id");
    assert!(!node.child_fields[0].nullable);
    assert_eq!(node.child_fields[1].property_name, "street");
    assert!(!node.child_fields[1].nullable);

    assert!(annotated.has_dynamic_mapping());
}

#[test]
fn test_unknown_source_table_fails() {
    let (_project, schema) = standard_schema();
    let mut warnings = Vec::new();
    let err = plan_of(
        &schema,
        "/* @@{ dynamicField=extra, mappingType=perRow, sourceTable=zz, aliasPrefix=x__ } */\n\
         SELECT p.id FROM person p;",
        &mut warnings,
    )
    .unwrap_err();
    assert!(err.to_string().contains("unknown sourceTable"), "{err:#}");
}

#[test]
fn test_collection_without_key_fails() {
    let (_project, schema) = standard_schema();
    let mut warnings = Vec::new();
    let err = plan_of(
        &schema,
        "/* @@{ dynamicField=addresses, mappingType=collection, propertyType=List<Address>, sourceTable=a, aliasPrefix=addr__ } */\n\
         SELECT p.id, a.street AS addr__street FROM person p LEFT JOIN address a ON a.person_id = p.id;",
        &mut warnings,
    )
    .unwrap_err();
    assert!(err.to_string().contains("collectionKey"), "{err:#}");
}

#[test]
fn test_collection_key_must_be_in_joined_row() {
    let (_project, schema) = standard_schema();
    let mut warnings = Vec::new();
    let err = plan_of(
        &schema,
        "/* @@{ dynamicField=addresses, mappingType=collection, propertyType=List<Address>, sourceTable=a, aliasPrefix=addr__, collectionKey=addr__missing } */\n\
         SELECT p.id, a.street AS addr__street FROM person p LEFT JOIN address a ON a.person_id = p.id;",
        &mut warnings,
    )
    .unwrap_err();
    assert!(err.to_string().contains("not a joined-row column"), "{err:#}");
}

#[test]
fn test_empty_prefix_is_a_warning() {
    let (_project, schema) = standard_schema();
    let mut warnings = Vec::new();
    let (_, plan) = plan_of(
        &schema,
        "/* @@{ dynamicField=extra, mappingType=perRow, sourceTable=a, aliasPrefix=zz__ } */\n\
         SELECT p.id FROM person p LEFT JOIN address a ON a.person_id = p.id;",
        &mut warnings,
    )
    .unwrap();
    assert!(plan.nodes[0].columns.is_empty());
    assert!(warnings.iter().any(|w| w.message.contains("matches no column")));
}

#[test]
fn test_non_main_join_fields_are_nullable() {
    let (_project, schema) = standard_schema();
    let mut warnings = Vec::new();
    let (_, plan) = plan_of(
        &schema,
        "SELECT p.id, a.street FROM person p LEFT JOIN address a ON a.person_id = p.id;",
        &mut warnings,
    )
    .unwrap();
    // street is NOT NULL in DDL, but the join makes it optional.
    assert!(!plan.joined_fields[0].nullable);
    assert!(plan.joined_fields[1].nullable);
}

#[test]
fn test_not_null_override_wins() {
    let (_project, schema) = standard_schema();
    let mut warnings = Vec::new();
    let (_, plan) = plan_of(
        &schema,
        "-- @@{ field=street, notNull=true }\n\
         SELECT p.id, a.street FROM person p LEFT JOIN address a ON a.person_id = p.id;",
        &mut warnings,
    )
    .unwrap();
    assert!(!plan.joined_fields[1].nullable);
}

#[test]
fn test_column_annotation_type_inherited_by_field() {
    let (_project, schema) = standard_schema();
    let mut warnings = Vec::new();
    let (_, plan) = plan_of(
        &schema,
        "SELECT id, birth_date FROM person;",
        &mut warnings,
    )
    .unwrap();
    assert_eq!(
        plan.joined_fields[1].ty,
        IrType::Named("kotlinx.datetime.LocalDate".to_string())
    );
    assert!(plan.joined_fields[1].custom_adapter);
    assert_eq!(plan.joined_fields[1].base_ty, IrType::String);
}
