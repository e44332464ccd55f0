//! Statement analysis
//!
//! Parses each query with the SQL AST library, rewrites named parameters to
//! positional placeholders, prepares the result against the schema
//! connection and produces a [`StatementModel`] with real result-set
//! metadata.

mod dml;
mod model;
mod params;
mod select;

pub use dml::analyze_dml;
pub use model::{
    ColumnBinding, DmlModel, FieldSource, JoinCondition, ReturningClause, SelectModel,
    StatementKind, StatementModel, TableRef,
};
pub use params::{rewrite_named_parameters, RewrittenSql};
pub use select::{analyze_select, cast_hints, extract_cte_shapes, extract_select_shape};

use std::path::Path;

use anyhow::Result;
use rusqlite::Connection;
use sqlparser::ast::Statement;
use sqlparser::dialect::SQLiteDialect;
use sqlparser::parser::Parser;

use crate::error::GeneratorError;
use crate::lexer::StatementBlock;
use crate::schema::Catalog;

/// Parse a single SQL statement, mapping parser failures to an
/// [`GeneratorError::AnalysisError`] carrying the original SQL.
pub fn parse_single_statement(
    file: &Path,
    line: usize,
    sql: &str,
) -> Result<Statement, GeneratorError> {
    let dialect = SQLiteDialect {};
    let mut statements =
        Parser::parse_sql(&dialect, sql).map_err(|err| GeneratorError::AnalysisError {
            path: file.to_path_buf(),
            line,
            message: format!("SQL parse error: {err}"),
            sql: sql.to_string(),
        })?;
    if statements.len() != 1 {
        return Err(GeneratorError::AnalysisError {
            path: file.to_path_buf(),
            line,
            message: format!("expected exactly one statement, found {}", statements.len()),
            sql: sql.to_string(),
        });
    }
    Ok(statements.remove(0))
}

/// Analyze one query statement block into a [`StatementModel`].
///
/// `dynamic_prefixes` carries the alias prefixes of the statement's dynamic
/// fields so intentionally prefixed duplicate columns survive the
/// duplicate-label check.
pub fn analyze_statement(
    file: &Path,
    block: &StatementBlock,
    catalog: &Catalog,
    conn: &Connection,
    dynamic_prefixes: &[String],
) -> Result<StatementModel> {
    let statement = parse_single_statement(file, block.line, &block.sql)?;
    match &statement {
        Statement::Query(_) => {
            analyze_select(file, block, &statement, catalog, conn, dynamic_prefixes)
        }
        Statement::Insert(_) | Statement::Update { .. } | Statement::Delete(_) => {
            analyze_dml(file, block, &statement, catalog, conn)
        }
        other => Err(GeneratorError::AnalysisError {
            path: file.to_path_buf(),
            line: block.line,
            message: format!("unsupported statement kind: {}", statement_name(other)),
            sql: block.sql.clone(),
        }
        .into()),
    }
}

fn statement_name(statement: &Statement) -> &'static str {
    match statement {
        Statement::Query(_) => "SELECT",
        Statement::Insert(_) => "INSERT",
        Statement::Update { .. } => "UPDATE",
        Statement::Delete(_) => "DELETE",
        Statement::CreateTable(_) => "CREATE TABLE",
        Statement::CreateView { .. } => "CREATE VIEW",
        _ => "other",
    }
}
