//! Unit tests for annotation extraction and context validation

use std::path::PathBuf;

use pretty_assertions::assert_eq;
use sqlite_querygen::annotation::{
    classify_field_blocks, extract_annotations, parse_column_annotations,
    parse_statement_annotations, MappingType, NameStyle,
};
use sqlite_querygen::lexer::CommentBlock;

fn blocks(texts: &[&str]) -> Vec<sqlite_querygen::annotation::AnnotationBlock> {
    let comments: Vec<CommentBlock> = texts
        .iter()
        .enumerate()
        .map(|(index, text)| CommentBlock {
            text: text.to_string(),
            line: index + 1,
            offset: 0,
        })
        .collect();
    extract_annotations(&PathBuf::from("t.sql"), &comments).expect("annotations parse")
}

#[test]
fn test_full_statement_annotation_surface() {
    let parsed = blocks(&[
        "-- @@{ queryResult=PersonSummary, implements=my.app.HasId, mapTo=my.app.Person, collectionKey=id }",
    ]);
    let (statement_blocks, fields) = classify_field_blocks(&parsed).unwrap();
    assert!(fields.is_empty());
    let statement = parse_statement_annotations(&statement_blocks).unwrap();
    assert_eq!(statement.query_result.as_deref(), Some("PersonSummary"));
    assert_eq!(statement.implements.as_deref(), Some("my.app.HasId"));
    assert_eq!(statement.map_to.as_deref(), Some("my.app.Person"));
    assert_eq!(statement.collection_key.as_deref(), Some("id"));
}

#[test]
fn test_field_and_statement_blocks_partition() {
    let parsed = blocks(&[
        "-- @@{ queryResult=Row }",
        "-- @@{ field=birth_date, propertyType=kotlinx.datetime.LocalDate, notNull=false }",
        "-- @@{ dynamicField=addresses, mappingType=collection, propertyType=List<Address>, sourceTable=a, aliasPrefix=addr__, collectionKey=addr__id }",
    ]);
    let (statement_blocks, fields) = classify_field_blocks(&parsed).unwrap();
    assert_eq!(statement_blocks.len(), 1);
    assert_eq!(fields.len(), 2);

    let birth = &fields[0];
    assert!(!birth.target.is_dynamic());
    assert_eq!(birth.target.name(), "birth_date");
    assert_eq!(birth.not_null, Some(false));

    let addresses = &fields[1];
    assert!(addresses.target.is_dynamic());
    assert_eq!(addresses.mapping_type, Some(MappingType::Collection));
    assert_eq!(addresses.property_type.as_deref(), Some("List<Address>"));
}

#[test]
fn test_column_annotation_context() {
    let parsed = blocks(&[
        "-- @@{ field=created_at, adapter=custom, propertyType=kotlinx.datetime.Instant, sqlTypeHint=TEXT }",
    ]);
    let (columns, statement_blocks) = parse_column_annotations(&parsed).unwrap();
    assert!(statement_blocks.is_empty());
    assert_eq!(columns.len(), 1);
    let (name, annotations) = &columns[0];
    assert_eq!(name, "created_at");
    assert!(annotations.custom_adapter);
    assert_eq!(annotations.sql_type_hint.as_deref(), Some("TEXT"));
}

#[test]
fn test_adapter_value_is_closed() {
    let parsed = blocks(&["-- @@{ field=a, adapter=magic }"]);
    let err = parse_column_annotations(&parsed).unwrap_err();
    assert!(err.to_string().contains("custom"));
}

#[test]
fn test_mapping_type_value_is_closed() {
    let parsed = blocks(&[
        "-- @@{ dynamicField=x, mappingType=flat, sourceTable=a, aliasPrefix=p_ }",
    ]);
    assert!(classify_field_blocks(&parsed).is_err());
}

#[test]
fn test_property_name_generator_values() {
    let parsed = blocks(&["-- @@{ propertyNameGenerator=snakeCase }"]);
    let statement = parse_statement_annotations(&parsed).unwrap();
    assert_eq!(statement.name_style, NameStyle::SnakeCase);
    assert_eq!(statement.name_style.apply("firstName"), "first_name");

    let parsed = blocks(&["-- @@{ propertyNameGenerator=pascal }"]);
    assert!(parse_statement_annotations(&parsed).is_err());
}

#[test]
fn test_statement_key_conflict_across_blocks() {
    let parsed = blocks(&["-- @@{ queryResult=A }", "-- @@{ queryResult=B }"]);
    let err = parse_statement_annotations(&parsed).unwrap_err();
    assert!(err.to_string().contains("more than once"));
}

#[test]
fn test_unknown_keys_pass_through_in_order() {
    let parsed = blocks(&["-- @@{ queryResult=A, vendorA=1, vendorB=two }"]);
    let statement = parse_statement_annotations(&parsed).unwrap();
    assert_eq!(
        statement.extras,
        vec![
            ("vendorA".to_string(), "1".to_string()),
            ("vendorB".to_string(), "two".to_string())
        ]
    );
}
