//! Schema inspector: executes project DDL against an ephemeral SQLite
//! connection and materialises the [`Catalog`].

use std::path::{Path, PathBuf};

use anyhow::Result;
use rusqlite::Connection;
use sqlparser::ast::{
    ColumnDef, ColumnOption, CreateIndex, CreateTable, Expr, Statement, TableConstraint,
};

use crate::analyzer::{extract_select_shape, parse_single_statement};
use crate::annotation::{
    classify_field_blocks, extract_annotations, parse_column_annotations,
    parse_statement_annotations, ColumnAnnotations, FieldAnnotations,
};
use crate::error::GeneratorError;
use crate::lexer::{split, StatementBlock};
use crate::project::DbProject;
use crate::util::contains_ci;

use super::catalog::{storage_class_of, Catalog, Column, IndexDef, Table, View, ViewField};

/// Result of schema materialisation.
pub struct SchemaOutput {
    pub catalog: Catalog,
    pub conn: Connection,
    pub applied_migration_version: Option<u64>,
}

impl std::fmt::Debug for SchemaOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaOutput")
            .field("catalog", &self.catalog)
            .field("applied_migration_version", &self.applied_migration_version)
            .finish()
    }
}

/// Execute all project DDL and produce the catalog plus the live connection
/// later phases prepare queries against.
pub fn inspect(
    project: &DbProject,
    database_file: Option<&Path>,
    debug: bool,
) -> Result<SchemaOutput> {
    let conn = match database_file {
        Some(path) => Connection::open(path).map_err(GeneratorError::from)?,
        None => Connection::open_in_memory().map_err(GeneratorError::from)?,
    };

    let mut catalog = Catalog::new();

    for file in &project.schema_files {
        let text = read_sql_file(file)?;
        let statements = split(file, &text)?;
        for block in &statements {
            apply_schema_statement(&mut catalog, &conn, file, block)?;
        }
        if debug {
            println!("Applied schema file: {}", file.display());
        }
    }

    let mut applied_version = None;
    for migration in &project.migrations {
        let text = read_sql_file(&migration.path)?;
        conn.execute_batch(&text)
            .map_err(|err| GeneratorError::SchemaError {
                path: migration.path.clone(),
                line: 1,
                message: format!("migration failed: {err}"),
                sql: text.clone(),
            })?;
        applied_version = Some(migration.version);
        if debug {
            println!(
                "Applied migration {} ({})",
                migration.version,
                migration.path.display()
            );
        }
    }

    if applied_version.is_some() {
        refresh_from_master(&mut catalog, &conn, project)?;
    }

    for file in &project.init_files {
        let text = read_sql_file(file)?;
        conn.execute_batch(&text)
            .map_err(|err| GeneratorError::SchemaError {
                path: file.clone(),
                line: 1,
                message: format!("seed data failed: {err}"),
                sql: text,
            })?;
        if debug {
            println!("Applied seed file: {}", file.display());
        }
    }

    let closure_file = project
        .schema_files
        .first()
        .cloned()
        .unwrap_or_else(|| project.root.join("schema"));
    catalog.validate_view_closure(&closure_file)?;

    Ok(SchemaOutput {
        catalog,
        conn,
        applied_migration_version: applied_version,
    })
}

fn read_sql_file(path: &Path) -> Result<String, GeneratorError> {
    std::fs::read_to_string(path).map_err(|source| GeneratorError::SqlFileReadError {
        path: path.to_path_buf(),
        source,
    })
}

fn apply_schema_statement(
    catalog: &mut Catalog,
    conn: &Connection,
    file: &PathBuf,
    block: &StatementBlock,
) -> Result<()> {
    let statement = parse_single_statement(file, block.line, &block.sql).map_err(|err| {
        // Schema files get schema-flavoured diagnostics.
        match err {
            GeneratorError::AnalysisError {
                path,
                line,
                message,
                sql,
            } => GeneratorError::SchemaError {
                path,
                line,
                message,
                sql,
            },
            other => other,
        }
    })?;

    conn.execute_batch(&block.sql)
        .map_err(|err| GeneratorError::SchemaError {
            path: file.clone(),
            line: block.line,
            message: format!("DDL execution failed: {err}"),
            sql: block.sql.clone(),
        })?;

    let comments: Vec<_> = block.all_comments().cloned().collect();
    let annotation_blocks = extract_annotations(file, &comments)?;

    match &statement {
        Statement::CreateTable(create) => {
            let table = build_table(conn, file, block, create, &annotation_blocks)?;
            catalog.add_table(table, file, block.line)?;
        }
        Statement::CreateView { name, query, .. } => {
            let view_name = object_tail(name);
            let view = build_view(catalog, conn, file, block, &view_name, query, &annotation_blocks)?;
            catalog.add_view(view, file, block.line)?;
        }
        Statement::CreateIndex(create) => {
            attach_index(catalog, file, block, create)?;
        }
        _ => {
            return Err(GeneratorError::SchemaError {
                path: file.clone(),
                line: block.line,
                message: "schema files may only contain CREATE TABLE, CREATE VIEW or CREATE INDEX"
                    .to_string(),
                sql: block.sql.clone(),
            }
            .into());
        }
    }

    Ok(())
}

fn object_tail(name: &sqlparser::ast::ObjectName) -> String {
    name.0
        .last()
        .map(|ident| ident.value.clone())
        .unwrap_or_default()
}

/// Double-quote an identifier for PRAGMA/SELECT interpolation.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

struct PragmaColumn {
    name: String,
    declared_type: String,
    not_null: bool,
    default_value: Option<String>,
    primary_key: bool,
}

fn pragma_table_xinfo(conn: &Connection, table: &str) -> Result<Vec<PragmaColumn>, rusqlite::Error> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_xinfo({})", quote_ident(table)))?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>("name")?,
            row.get::<_, String>("type")?,
            row.get::<_, i64>("notnull")?,
            row.get::<_, Option<String>>("dflt_value")?,
            row.get::<_, i64>("pk")?,
            row.get::<_, i64>("hidden")?,
        ))
    })?;
    let mut columns = Vec::new();
    for row in rows {
        let (name, declared_type, not_null, default_value, pk, hidden) = row?;
        if hidden != 0 {
            continue;
        }
        columns.push(PragmaColumn {
            name,
            declared_type,
            not_null: not_null != 0,
            default_value,
            primary_key: pk > 0,
        });
    }
    Ok(columns)
}

/// Per-column facts only the AST can supply.
#[derive(Default)]
struct AstColumnFacts {
    default_expr: Option<String>,
    check_constraints: Vec<String>,
}

fn ast_column_facts(column: &ColumnDef) -> AstColumnFacts {
    let mut facts = AstColumnFacts::default();
    for option in &column.options {
        match &option.option {
            ColumnOption::Default(expr) => facts.default_expr = Some(expr.to_string()),
            ColumnOption::Check(expr) => facts.check_constraints.push(expr.to_string()),
            _ => {}
        }
    }
    facts
}

/// `expr IN (0, 1)` style checks mark a column as boolean-encoded.
fn is_boolean_check(check: &str) -> bool {
    let squeezed: String = check.chars().filter(|c| !c.is_whitespace()).collect();
    contains_ci(&squeezed, "IN(0,1)") || contains_ci(&squeezed, "IN(1,0)")
}

fn build_table(
    conn: &Connection,
    file: &PathBuf,
    block: &StatementBlock,
    create: &CreateTable,
    annotation_blocks: &[crate::annotation::AnnotationBlock],
) -> Result<Table> {
    let table_name = object_tail(&create.name);

    let (column_annotations, _statement_blocks) = parse_column_annotations(annotation_blocks)?;
    for (column_name, _) in &column_annotations {
        if !create
            .columns
            .iter()
            .any(|c| c.name.value.eq_ignore_ascii_case(column_name))
        {
            return Err(GeneratorError::SchemaError {
                path: file.clone(),
                line: block.line,
                message: format!(
                    "annotation references unknown column '{column_name}' of table '{table_name}'"
                ),
                sql: block.sql.clone(),
            }
            .into());
        }
    }

    // Table-level constraints that affect per-column facts.
    let mut table_pk_columns: Vec<String> = Vec::new();
    let mut table_checks: Vec<String> = Vec::new();
    for constraint in &create.constraints {
        match constraint {
            TableConstraint::PrimaryKey { columns, .. } => {
                table_pk_columns.extend(columns.iter().map(|c| c.value.clone()));
            }
            TableConstraint::Check { expr, .. } => table_checks.push(expr.to_string()),
            _ => {}
        }
    }

    let pragma_columns =
        pragma_table_xinfo(conn, &table_name).map_err(|err| GeneratorError::SchemaError {
            path: file.clone(),
            line: block.line,
            message: format!("table introspection failed: {err}"),
            sql: block.sql.clone(),
        })?;

    let mut columns = Vec::new();
    for pragma in pragma_columns {
        let ast_column = create
            .columns
            .iter()
            .find(|c| c.name.value.eq_ignore_ascii_case(&pragma.name));
        let facts = ast_column.map(ast_column_facts).unwrap_or_default();

        let mut check_constraints = facts.check_constraints;
        for check in &table_checks {
            if contains_ci(check, &pragma.name) {
                check_constraints.push(check.clone());
            }
        }

        let is_primary_key = pragma.primary_key
            || table_pk_columns
                .iter()
                .any(|c| c.eq_ignore_ascii_case(&pragma.name));
        let boolean_hint = contains_ci(&pragma.declared_type, "BOOL")
            || check_constraints.iter().any(|c| is_boolean_check(c));

        let annotations = column_annotations
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(&pragma.name))
            .map(|(_, a)| a.clone())
            .unwrap_or_default();

        columns.push(Column {
            storage: storage_class_of(&pragma.declared_type),
            is_sql_nullable: !(pragma.not_null || is_primary_key),
            is_primary_key,
            default_expr: facts.default_expr.or(pragma.default_value),
            check_constraints,
            boolean_hint,
            annotations,
            name: pragma.name,
            declared_type: pragma.declared_type,
        });
    }

    Ok(Table {
        name: table_name,
        columns,
        indexes: Vec::new(),
        without_rowid: create.without_rowid,
    })
}

fn field_annotations_to_column(annotations: &FieldAnnotations) -> ColumnAnnotations {
    ColumnAnnotations {
        property_name: annotations.property_name.clone(),
        property_type: annotations.property_type.clone(),
        not_null: annotations.not_null,
        custom_adapter: annotations.custom_adapter,
        sql_type_hint: None,
        extras: annotations.extras.clone(),
    }
}

fn build_view(
    catalog: &Catalog,
    conn: &Connection,
    file: &PathBuf,
    block: &StatementBlock,
    view_name: &str,
    query: &sqlparser::ast::Query,
    annotation_blocks: &[crate::annotation::AnnotationBlock],
) -> Result<View> {
    let shape = extract_select_shape(query, catalog);

    let (statement_blocks, field_annotations) = classify_field_blocks(annotation_blocks)?;
    if let Some(dynamic) = field_annotations.iter().find(|f| f.target.is_dynamic()) {
        return Err(GeneratorError::SchemaError {
            path: file.clone(),
            line: block.line,
            message: format!(
                "dynamic field '{}' is not allowed in a view definition",
                dynamic.target.name()
            ),
            sql: block.sql.clone(),
        }
        .into());
    }
    let statement_annotations = parse_statement_annotations(&statement_blocks)?;

    // The executed view is the authority on label order and types.
    let probe = conn
        .prepare(&format!("SELECT * FROM {} LIMIT 0", quote_ident(view_name)))
        .map_err(|err| GeneratorError::SchemaError {
            path: file.clone(),
            line: block.line,
            message: format!("view introspection failed: {err}"),
            sql: block.sql.clone(),
        })?;

    let mut engine_fields: Vec<(String, Option<String>)> = Vec::new();
    for column in probe.columns() {
        engine_fields.push((
            column.name().to_string(),
            column.decl_type().map(str::to_string),
        ));
    }

    let ast_fields = if shape.fields.len() == engine_fields.len() {
        Some(&shape.fields)
    } else {
        None
    };

    let mut fields = Vec::new();
    for (index, (label, decl)) in engine_fields.iter().enumerate() {
        let ast = ast_fields.map(|f| &f[index]);
        let annotations = field_annotations
            .iter()
            .find(|f| f.target.name().eq_ignore_ascii_case(label))
            .map(field_annotations_to_column);
        fields.push(ViewField {
            alias: label.clone(),
            source_alias: ast.and_then(|f| f.source_alias.clone()),
            original_column: ast.and_then(|f| f.original_column.clone()),
            declared_type: ast
                .and_then(|f| f.declared_type.clone())
                .or_else(|| decl.clone()),
            annotations,
        });
    }

    Ok(View {
        name: view_name.to_string(),
        table_aliases: shape.table_aliases(),
        fields,
        collection_key: statement_annotations.collection_key,
    })
}

fn attach_index(
    catalog: &mut Catalog,
    file: &PathBuf,
    block: &StatementBlock,
    create: &CreateIndex,
) -> Result<()> {
    let table_name = object_tail(&create.table_name);
    let index_name = create
        .name
        .as_ref()
        .map(object_tail)
        .unwrap_or_default();
    let columns: Vec<String> = create
        .columns
        .iter()
        .filter_map(|order_by| match &order_by.expr {
            Expr::Identifier(ident) => Some(ident.value.clone()),
            _ => None,
        })
        .collect();
    let is_unique = create.unique;

    let Some(table) = catalog.table_mut(&table_name) else {
        return Err(GeneratorError::SchemaError {
            path: file.clone(),
            line: block.line,
            message: format!("index '{index_name}' references unknown table '{table_name}'"),
            sql: block.sql.clone(),
        }
        .into());
    };
    table.indexes.push(IndexDef {
        name: index_name,
        columns,
        is_unique,
    });
    Ok(())
}

/// After migrations, re-introspect from sqlite_master so the catalog covers
/// tables and views the migrations created or altered. Annotations survive
/// by column name; migration-created relations have none.
fn refresh_from_master(
    catalog: &mut Catalog,
    conn: &Connection,
    project: &DbProject,
) -> Result<()> {
    let file = project.root.join("migration");

    let mut stmt = conn
        .prepare(
            "SELECT type, name, sql FROM sqlite_master \
             WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .map_err(GeneratorError::from)?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
            ))
        })
        .map_err(GeneratorError::from)?;

    let mut master: Vec<(String, String, Option<String>)> = Vec::new();
    for row in rows {
        master.push(row.map_err(GeneratorError::from)?);
    }
    drop(stmt);

    let names: Vec<String> = master.iter().map(|(_, name, _)| name.clone()).collect();
    catalog.retain_relations(&names);

    for (kind, name, sql) in master {
        match kind.as_str() {
            "table" => {
                let pragma_columns = pragma_table_xinfo(conn, &name).map_err(GeneratorError::from)?;
                let existing = catalog.table(&name).cloned();
                let columns = pragma_columns
                    .into_iter()
                    .map(|pragma| {
                        let prior = existing
                            .as_ref()
                            .and_then(|t| t.column(&pragma.name).cloned());
                        let check_constraints = prior
                            .as_ref()
                            .map(|c| c.check_constraints.clone())
                            .unwrap_or_default();
                        let boolean_hint = contains_ci(&pragma.declared_type, "BOOL")
                            || check_constraints.iter().any(|c| is_boolean_check(c));
                        Column {
                            storage: storage_class_of(&pragma.declared_type),
                            is_sql_nullable: !(pragma.not_null || pragma.primary_key),
                            is_primary_key: pragma.primary_key,
                            default_expr: pragma.default_value,
                            check_constraints,
                            boolean_hint,
                            annotations: prior
                                .map(|c| c.annotations)
                                .unwrap_or_default(),
                            name: pragma.name,
                            declared_type: pragma.declared_type,
                        }
                    })
                    .collect();

                if let Some(table) = catalog.table_mut(&name) {
                    table.columns = columns;
                } else {
                    catalog.add_table(
                        Table {
                            name,
                            columns,
                            indexes: Vec::new(),
                            without_rowid: false,
                        },
                        &file,
                        1,
                    )?;
                }
            }
            "view" => {
                if catalog.view(&name).is_some() {
                    continue;
                }
                let Some(view_sql) = sql else { continue };
                let block = StatementBlock {
                    top_comments: Vec::new(),
                    inner_comments: Vec::new(),
                    sql: view_sql.clone(),
                    line: 1,
                    offset: 0,
                };
                let statement = parse_single_statement(&file, 1, &view_sql)?;
                if let Statement::CreateView {
                    name: view_name,
                    query,
                    ..
                } = &statement
                {
                    let view_name = object_tail(view_name);
                    let view = build_view(catalog, conn, &file, &block, &view_name, query, &[])?;
                    catalog.add_view(view, &file, 1)?;
                }
            }
            _ => {}
        }
    }

    Ok(())
}
