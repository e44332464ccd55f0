//! INSERT/UPDATE/DELETE analysis

use std::path::Path;

use anyhow::Result;
use rusqlite::Connection;
use sqlparser::ast::{
    Assignment, AssignmentTarget, Delete, Expr, FromTable, Insert, SelectItem, SetExpr, Statement,
    TableFactor, TableObject, Value,
};

use crate::error::GeneratorError;
use crate::lexer::StatementBlock;
use crate::schema::Catalog;

use super::model::{
    DmlModel, ReturningClause, SelectModel, StatementKind, StatementModel,
};
use super::select::{
    cast_hints, collect_where_params, extract_cte_shapes, extract_select_shape, object_name_tail,
};

fn placeholder_param(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Value(Value::Placeholder(raw)) => raw.strip_prefix(':').map(str::to_string),
        Expr::Cast { expr, .. } => placeholder_param(expr),
        Expr::Nested(inner) => placeholder_param(inner),
        _ => None,
    }
}

fn returning_clause(items: &[SelectItem]) -> ReturningClause {
    if items
        .iter()
        .any(|item| matches!(item, SelectItem::Wildcard(_)))
    {
        return ReturningClause::Star;
    }
    let columns = items
        .iter()
        .map(|item| match item {
            SelectItem::UnnamedExpr(Expr::Identifier(ident)) => ident.value.clone(),
            SelectItem::UnnamedExpr(Expr::CompoundIdentifier(parts)) => parts
                .last()
                .map(|i| i.value.clone())
                .unwrap_or_default(),
            SelectItem::ExprWithAlias { alias, .. } => alias.value.clone(),
            SelectItem::UnnamedExpr(expr) => expr.to_string(),
            other => other.to_string(),
        })
        .collect();
    ReturningClause::Columns(columns)
}

fn analyze_insert(
    insert: &Insert,
    catalog: &Catalog,
) -> (DmlModel, Option<ReturningClause>, Vec<SelectModel>) {
    let target_table = match &insert.table {
        TableObject::TableName(name) => object_name_tail(name),
        TableObject::TableFunction(_) => String::new(),
    };
    let mut model = DmlModel {
        target_table: target_table.clone(),
        ..DmlModel::default()
    };
    let mut with_selects = Vec::new();

    // Column list falls back to the table's declared order when omitted.
    let column_names: Vec<String> = if insert.columns.is_empty() {
        catalog
            .table(&target_table)
            .map(|t| t.columns.iter().map(|c| c.name.clone()).collect())
            .unwrap_or_default()
    } else {
        insert.columns.iter().map(|i| i.value.clone()).collect()
    };

    if let Some(source) = &insert.source {
        with_selects.extend(extract_cte_shapes(source, catalog));
        match source.body.as_ref() {
            SetExpr::Values(values) => {
                if let Some(row) = values.rows.first() {
                    for (index, expr) in row.iter().enumerate() {
                        if let Some(param) = placeholder_param(expr) {
                            if let Some(column) = column_names.get(index) {
                                model.value_params.push((param, column.clone()));
                            }
                        }
                    }
                }
            }
            SetExpr::Select(_) => {
                with_selects.push(extract_select_shape(source, catalog));
            }
            _ => {}
        }
    }

    let returning = insert.returning.as_ref().map(|items| returning_clause(items));
    (model, returning, with_selects)
}

fn analyze_update(
    table: &sqlparser::ast::TableWithJoins,
    assignments: &[Assignment],
    selection: Option<&Expr>,
    returning: Option<&Vec<SelectItem>>,
) -> (DmlModel, Option<ReturningClause>) {
    let target_table = match &table.relation {
        TableFactor::Table { name, .. } => object_name_tail(name),
        _ => String::new(),
    };
    let mut model = DmlModel {
        target_table,
        ..DmlModel::default()
    };

    for assignment in assignments {
        let column = match &assignment.target {
            AssignmentTarget::ColumnName(name) => object_name_tail(name),
            AssignmentTarget::Tuple(names) => names
                .first()
                .map(object_name_tail)
                .unwrap_or_default(),
        };
        if let Some(param) = placeholder_param(&assignment.value) {
            model.value_params.push((param, column));
        }
    }

    if let Some(selection) = selection {
        let mut pairs = Vec::new();
        collect_where_params(selection, &mut pairs);
        model
            .where_params
            .extend(pairs.into_iter().map(|(param, binding)| (param, binding.column)));
    }

    let returning = returning.map(|items| returning_clause(items));
    (model, returning)
}

fn analyze_delete(delete: &Delete) -> (DmlModel, Option<ReturningClause>) {
    let tables = match &delete.from {
        FromTable::WithFromKeyword(tables) | FromTable::WithoutKeyword(tables) => tables,
    };
    let target_table = tables
        .first()
        .and_then(|t| match &t.relation {
            TableFactor::Table { name, .. } => Some(object_name_tail(name)),
            _ => None,
        })
        .unwrap_or_default();

    let mut model = DmlModel {
        target_table,
        ..DmlModel::default()
    };

    if let Some(selection) = &delete.selection {
        let mut pairs = Vec::new();
        collect_where_params(selection, &mut pairs);
        model
            .where_params
            .extend(pairs.into_iter().map(|(param, binding)| (param, binding.column)));
    }

    let returning = delete.returning.as_ref().map(|items| returning_clause(items));
    (model, returning)
}

/// Analyze an INSERT/UPDATE/DELETE statement block into a [`StatementModel`].
pub fn analyze_dml(
    file: &Path,
    block: &StatementBlock,
    statement: &Statement,
    catalog: &Catalog,
    conn: &Connection,
) -> Result<StatementModel> {
    let casts = cast_hints(statement);

    let (kind, dml, returning, with_selects) = match statement {
        Statement::Insert(insert) => {
            let (model, returning, with_selects) = analyze_insert(insert, catalog);
            (StatementKind::Insert, model, returning, with_selects)
        }
        Statement::Update {
            table,
            assignments,
            selection,
            returning,
            ..
        } => {
            let (model, ret) =
                analyze_update(table, assignments, selection.as_ref(), returning.as_ref());
            (StatementKind::Update, model, ret, Vec::new())
        }
        Statement::Delete(delete) => {
            let (model, ret) = analyze_delete(delete);
            (StatementKind::Delete, model, ret, Vec::new())
        }
        _ => unreachable!("analyze_dml called with a non-DML statement"),
    };

    let rewritten = super::params::rewrite_named_parameters(&block.sql, &[]);

    // Prepare to validate against the live schema; metadata is unused for
    // DML except to surface engine errors early.
    conn.prepare(&rewritten.sql)
        .map_err(|err| GeneratorError::AnalysisError {
            path: file.to_path_buf(),
            line: block.line,
            message: format!("failed to prepare statement: {err}"),
            sql: block.sql.clone(),
        })?;

    Ok(StatementModel {
        kind,
        source_path: file.to_path_buf(),
        line: block.line,
        sql: rewritten.sql,
        named_parameters: rewritten.named_parameters,
        parameter_occurrences: rewritten.occurrences,
        parameter_cast_types: casts,
        select: None,
        dml: Some(dml),
        returning,
        with_selects,
    })
}
