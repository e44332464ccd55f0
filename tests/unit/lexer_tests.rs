//! Unit tests for the statement splitter

use std::path::PathBuf;

use pretty_assertions::assert_eq;
use sqlite_querygen::lexer::split;

fn path() -> PathBuf {
    PathBuf::from("queries/test.sql")
}

#[test]
fn test_schema_file_with_mixed_comments() {
    let sql = r#"
-- Person master table
CREATE TABLE person (
    id INTEGER PRIMARY KEY,
    first_name TEXT NOT NULL, -- display name
    birth_date TEXT
);

/* Lookup view */
CREATE VIEW adults AS SELECT id FROM person;
"#;
    let statements = split(&path(), sql).unwrap();
    assert_eq!(statements.len(), 2);

    assert_eq!(statements[0].top_comments.len(), 1);
    assert_eq!(statements[0].top_comments[0].text, "-- Person master table");
    assert_eq!(statements[0].inner_comments.len(), 1);
    assert_eq!(statements[0].inner_comments[0].text, "-- display name");

    assert_eq!(statements[1].top_comments.len(), 1);
    assert_eq!(statements[1].top_comments[0].text, "/* Lookup view */");
}

#[test]
fn test_annotation_comments_survive_splitting() {
    let sql = "-- @@{ queryResult=PersonRow }\nSELECT id FROM person;";
    let statements = split(&path(), sql).unwrap();
    assert_eq!(statements.len(), 1);
    assert_eq!(
        statements[0].top_comments[0].text,
        "-- @@{ queryResult=PersonRow }"
    );
    assert_eq!(statements[0].sql, "SELECT id FROM person;");
}

#[test]
fn test_multiline_block_annotation_kept_whole() {
    let sql = "SELECT a\n/* @@{ dynamicField=x,\n       mappingType=perRow } */\nFROM t;";
    let statements = split(&path(), sql).unwrap();
    assert_eq!(statements.len(), 1);
    assert_eq!(statements[0].inner_comments.len(), 1);
    assert!(statements[0].inner_comments[0].text.contains("mappingType=perRow"));
    // The statement text keeps parseable token boundaries.
    assert!(statements[0].sql.contains("SELECT a"));
    assert!(statements[0].sql.contains("FROM t;"));
}

#[test]
fn test_double_quoted_identifier_with_semicolon() {
    let sql = "SELECT \"weird;name\" FROM t;";
    let statements = split(&path(), sql).unwrap();
    assert_eq!(statements.len(), 1);
    assert_eq!(statements[0].sql, "SELECT \"weird;name\" FROM t;");
}

#[test]
fn test_offsets_reported_for_unterminated_comment() {
    let err = split(&path(), "SELECT 1;\n/* open").unwrap_err();
    let message = err.to_string();
    assert!(message.contains("unterminated block comment"), "{message}");
    assert!(message.contains("test.sql:2"), "{message}");
}

#[test]
fn test_boundary_reconstruction() {
    let sql = "SELECT 1;\n-- note\nSELECT 2;\nSELECT ';' AS s;";
    let first = split(&path(), sql).unwrap();
    assert_eq!(first.len(), 3);
    let joined: String = first
        .iter()
        .map(|s| s.sql.clone())
        .collect::<Vec<_>>()
        .join("\n");
    let second = split(&path(), &joined).unwrap();
    assert_eq!(second.len(), 3);
    for (a, b) in first.iter().zip(second.iter()) {
        assert_eq!(a.sql.trim(), b.sql.trim());
    }
}
