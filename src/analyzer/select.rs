//! SELECT analysis: FROM/JOIN shape extraction, projection expansion and
//! prepared-statement metadata.

use std::ops::ControlFlow;
use std::path::Path;

use anyhow::Result;
use rusqlite::Connection;
use sqlparser::ast::{
    visit_expressions, BinaryOperator, Expr, Join, JoinConstraint, JoinOperator, ObjectName, Query,
    Select, SelectItem, SetExpr, Statement, TableFactor, Value,
};

use crate::error::GeneratorError;
use crate::lexer::StatementBlock;
use crate::schema::{Catalog, Relation};

use super::model::{
    ColumnBinding, FieldSource, JoinCondition, SelectModel, StatementKind, StatementModel, TableRef,
};
use super::params::rewrite_named_parameters;

/// Last segment of a possibly qualified object name.
pub(crate) fn object_name_tail(name: &ObjectName) -> String {
    name.0
        .last()
        .map(|ident| ident.value.clone())
        .unwrap_or_default()
}

/// Strip the leading `:` of a placeholder name.
fn placeholder_name(raw: &str) -> Option<String> {
    raw.strip_prefix(':').map(str::to_string)
}

fn placeholder_of(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Value(Value::Placeholder(raw)) => placeholder_name(raw),
        // CAST(:p AS TYPE) binds like the bare placeholder.
        Expr::Cast { expr, .. } => placeholder_of(expr),
        Expr::Nested(inner) => placeholder_of(inner),
        _ => None,
    }
}

fn column_of(expr: &Expr) -> Option<ColumnBinding> {
    match expr {
        Expr::Identifier(ident) => Some(ColumnBinding {
            alias: None,
            column: ident.value.clone(),
        }),
        Expr::CompoundIdentifier(parts) if parts.len() >= 2 => {
            let column = parts.last()?.value.clone();
            let alias = parts[parts.len() - 2].value.clone();
            Some(ColumnBinding {
                alias: Some(alias),
                column,
            })
        }
        Expr::Nested(inner) => column_of(inner),
        _ => None,
    }
}

/// Collect `CAST(:name AS TYPE)` hints anywhere in the statement.
pub fn cast_hints(statement: &Statement) -> Vec<(String, String)> {
    let mut hints: Vec<(String, String)> = Vec::new();
    let _ = visit_expressions(statement, |expr: &Expr| {
        if let Expr::Cast {
            expr: inner,
            data_type,
            ..
        } = expr
        {
            if let Expr::Value(Value::Placeholder(raw)) = inner.as_ref() {
                if let Some(name) = placeholder_name(raw) {
                    if !hints.iter().any(|(n, _)| n == &name) {
                        hints.push((name, data_type.to_string()));
                    }
                }
            }
        }
        ControlFlow::<()>::Continue(())
    });
    hints
}

fn table_ref_of(factor: &TableFactor) -> Option<TableRef> {
    match factor {
        TableFactor::Table { name, alias, .. } => {
            let table = object_name_tail(name);
            let alias = alias
                .as_ref()
                .map(|a| a.name.value.clone())
                .unwrap_or_else(|| table.clone());
            Some(TableRef { alias, table })
        }
        _ => None,
    }
}

fn join_constraint(join: &Join) -> Option<&JoinConstraint> {
    match &join.join_operator {
        JoinOperator::Inner(constraint)
        | JoinOperator::LeftOuter(constraint)
        | JoinOperator::RightOuter(constraint)
        | JoinOperator::FullOuter(constraint) => Some(constraint),
        _ => None,
    }
}

fn collect_join_conditions(expr: &Expr, out: &mut Vec<JoinCondition>) {
    match expr {
        Expr::BinaryOp { left, op, right } => match op {
            BinaryOperator::And => {
                collect_join_conditions(left, out);
                collect_join_conditions(right, out);
            }
            BinaryOperator::Eq => {
                if let (Some(l), Some(r)) = (column_of(left), column_of(right)) {
                    if let (Some(la), Some(ra)) = (l.alias, r.alias) {
                        out.push(JoinCondition {
                            left_alias: la,
                            left_column: l.column,
                            right_alias: ra,
                            right_column: r.column,
                        });
                    }
                }
            }
            _ => {}
        },
        Expr::Nested(inner) => collect_join_conditions(inner, out),
        _ => {}
    }
}

pub(crate) fn collect_where_params(expr: &Expr, out: &mut Vec<(String, ColumnBinding)>) {
    let mut pair = |a: &Expr, b: &Expr, out: &mut Vec<(String, ColumnBinding)>| {
        if let (Some(column), Some(param)) = (column_of(a), placeholder_of(b)) {
            out.push((param, column));
        } else if let (Some(param), Some(column)) = (placeholder_of(a), column_of(b)) {
            out.push((param, column));
        }
    };

    match expr {
        Expr::BinaryOp { left, op, right } => match op {
            BinaryOperator::And | BinaryOperator::Or => {
                collect_where_params(left, out);
                collect_where_params(right, out);
            }
            BinaryOperator::Eq
            | BinaryOperator::NotEq
            | BinaryOperator::Lt
            | BinaryOperator::LtEq
            | BinaryOperator::Gt
            | BinaryOperator::GtEq => {
                pair(left, right, out);
            }
            _ => {
                collect_where_params(left, out);
                collect_where_params(right, out);
            }
        },
        Expr::Like { expr, pattern, .. } | Expr::ILike { expr, pattern, .. } => {
            pair(expr, pattern, out);
        }
        Expr::InList { expr, list, .. } => {
            for item in list {
                pair(expr, item, out);
            }
        }
        Expr::Between {
            expr, low, high, ..
        } => {
            pair(expr, low, out);
            pair(expr, high, out);
        }
        Expr::Nested(inner) => collect_where_params(inner, out),
        Expr::UnaryOp { expr, .. } => collect_where_params(expr, out),
        Expr::IsNull(inner) | Expr::IsNotNull(inner) => collect_where_params(inner, out),
        _ => {}
    }
}

/// Declared type of `column` within the named relation, when present.
fn column_declared_type(catalog: &Catalog, relation: &str, column: &str) -> Option<String> {
    match catalog.relation(relation)? {
        Relation::Table(table) => table.column(column).map(|c| c.declared_type.clone()),
        Relation::View(view) => view.field(column).and_then(|f| f.declared_type.clone()),
    }
}

fn relation_has_column(catalog: &Catalog, relation: &str, column: &str) -> bool {
    match catalog.relation(relation) {
        Some(Relation::Table(table)) => table.column(column).is_some(),
        Some(Relation::View(view)) => view.field(column).is_some(),
        None => false,
    }
}

/// Expand the projection into ordered field sources. Returns `None` when a
/// wildcard references a relation the catalog cannot expand (for example a
/// CTE); the caller then falls back to engine metadata alone.
fn ast_projection_fields(
    select: &Select,
    catalog: &Catalog,
    aliases: &[(String, String)],
) -> Option<Vec<FieldSource>> {
    let resolve_unqualified = |column: &str| -> Option<(String, String)> {
        aliases
            .iter()
            .find(|(_, target)| relation_has_column(catalog, target, column))
            .cloned()
    };

    let mut fields = Vec::new();
    for item in &select.projection {
        match item {
            SelectItem::Wildcard(_) => {
                for (alias, target) in aliases {
                    expand_relation(catalog, alias, target, &mut fields)?;
                }
            }
            SelectItem::QualifiedWildcard(name, _) => {
                let alias = object_name_tail(name);
                let target = aliases
                    .iter()
                    .find(|(a, _)| a.eq_ignore_ascii_case(&alias))
                    .map(|(_, t)| t.clone())?;
                expand_relation(catalog, &alias, &target, &mut fields)?;
            }
            SelectItem::UnnamedExpr(expr) => {
                fields.push(field_from_expr(expr, None, catalog, &resolve_unqualified));
            }
            SelectItem::ExprWithAlias { expr, alias } => {
                fields.push(field_from_expr(
                    expr,
                    Some(alias.value.clone()),
                    catalog,
                    &resolve_unqualified,
                ));
            }
        }
    }
    Some(fields)
}

fn field_from_expr(
    expr: &Expr,
    label: Option<String>,
    catalog: &Catalog,
    resolve_unqualified: &dyn Fn(&str) -> Option<(String, String)>,
) -> FieldSource {
    match expr {
        Expr::Identifier(ident) => {
            let column = ident.value.clone();
            let resolved = resolve_unqualified(&column);
            let declared = resolved
                .as_ref()
                .and_then(|(_, target)| column_declared_type(catalog, target, &column));
            FieldSource {
                label: label.unwrap_or_else(|| column.clone()),
                source_alias: resolved.map(|(alias, _)| alias),
                original_column: Some(column),
                declared_type: declared,
                is_expression: false,
            }
        }
        Expr::CompoundIdentifier(parts) if parts.len() >= 2 => {
            let column = parts.last().unwrap().value.clone();
            let alias = parts[parts.len() - 2].value.clone();
            FieldSource {
                label: label.unwrap_or_else(|| column.clone()),
                source_alias: Some(alias),
                original_column: Some(column),
                declared_type: None,
                is_expression: false,
            }
        }
        other => FieldSource {
            label: label.unwrap_or_else(|| other.to_string()),
            source_alias: None,
            original_column: None,
            declared_type: None,
            is_expression: true,
        },
    }
}

fn expand_relation(
    catalog: &Catalog,
    alias: &str,
    target: &str,
    fields: &mut Vec<FieldSource>,
) -> Option<()> {
    match catalog.relation(target)? {
        Relation::Table(table) => {
            for column in &table.columns {
                fields.push(FieldSource {
                    label: column.name.clone(),
                    source_alias: Some(alias.to_string()),
                    original_column: Some(column.name.clone()),
                    declared_type: Some(column.declared_type.clone()),
                    is_expression: false,
                });
            }
        }
        Relation::View(view) => {
            for field in &view.fields {
                fields.push(FieldSource {
                    label: field.alias.clone(),
                    source_alias: Some(alias.to_string()),
                    original_column: Some(field.alias.clone()),
                    declared_type: field.declared_type.clone(),
                    is_expression: false,
                });
            }
        }
    }
    Some(())
}

/// Extract the pure-AST shape of a SELECT: relations, join conditions,
/// LIMIT/OFFSET parameters, WHERE pairings and (best-effort) field sources.
pub fn extract_select_shape(query: &Query, catalog: &Catalog) -> SelectModel {
    let mut model = SelectModel::default();

    if let Some(limit) = &query.limit {
        model.limit_param = placeholder_of(limit);
    }
    if let Some(offset) = &query.offset {
        model.offset_param = placeholder_of(&offset.value);
    }

    let SetExpr::Select(select) = query.body.as_ref() else {
        return model;
    };

    for (index, table_with_joins) in select.from.iter().enumerate() {
        if let Some(table_ref) = table_ref_of(&table_with_joins.relation) {
            if index == 0 && model.from_table.is_none() {
                model.from_table = Some(table_ref);
            } else {
                model.join_tables.push(table_ref);
            }
        }
        for join in &table_with_joins.joins {
            if let Some(table_ref) = table_ref_of(&join.relation) {
                model.join_tables.push(table_ref);
            }
            if let Some(JoinConstraint::On(on_expr)) = join_constraint(join) {
                collect_join_conditions(on_expr, &mut model.join_conditions);
            }
        }
    }

    if let Some(selection) = &select.selection {
        collect_where_params(selection, &mut model.where_params);
    }

    let aliases = model.table_aliases();
    if let Some(fields) = ast_projection_fields(select, catalog, &aliases) {
        model.fields = fields;
    }

    model
}

/// Shapes of the query's WITH-clause CTE selects, in declaration order.
pub fn extract_cte_shapes(query: &Query, catalog: &Catalog) -> Vec<SelectModel> {
    let Some(with) = &query.with else {
        return Vec::new();
    };
    with.cte_tables
        .iter()
        .map(|cte| extract_select_shape(&cte.query, catalog))
        .collect()
}

/// Source-table names behind a label collision, for diagnostics.
fn collision_sources(fields: &[FieldSource], label: &str, shape: &SelectModel) -> String {
    let mut sources: Vec<String> = Vec::new();
    for field in fields {
        if field.label.eq_ignore_ascii_case(label) {
            let name = field
                .source_alias
                .as_deref()
                .and_then(|alias| shape.alias_target(alias))
                .map(str::to_string)
                .or_else(|| field.source_alias.clone())
                .unwrap_or_else(|| "<expression>".to_string());
            if !sources.contains(&name) {
                sources.push(name);
            }
        }
    }
    sources.join(", ")
}

/// Reject duplicate result labels unless they belong to an alias-prefixed
/// dynamic field. Labels containing `:` are kept when their base starts
/// with a known prefix; otherwise they count as collision evidence.
fn check_duplicate_labels(
    file: &Path,
    line: usize,
    sql: &str,
    fields: &[FieldSource],
    shape: &SelectModel,
    dynamic_prefixes: &[String],
) -> Result<(), GeneratorError> {
    let is_prefixed = |label: &str| -> bool {
        let base = label.split(':').next().unwrap_or(label);
        dynamic_prefixes
            .iter()
            .any(|prefix| crate::util::starts_with_ci(base, prefix))
    };

    for (index, field) in fields.iter().enumerate() {
        if is_prefixed(&field.label) {
            continue;
        }
        let duplicated = fields
            .iter()
            .enumerate()
            .any(|(other, f)| other != index && f.label.eq_ignore_ascii_case(&field.label));
        let engine_suffixed = field.label.contains(':');
        if duplicated || engine_suffixed {
            return Err(GeneratorError::AnalysisError {
                path: file.to_path_buf(),
                line,
                message: format!(
                    "duplicate column alias '{}' (sources: {}); alias the columns explicitly",
                    field.label.split(':').next().unwrap_or(&field.label),
                    collision_sources(fields, &field.label, shape)
                ),
                sql: sql.to_string(),
            });
        }
    }
    Ok(())
}

/// Analyze a SELECT statement block into a [`StatementModel`].
pub fn analyze_select(
    file: &Path,
    block: &StatementBlock,
    statement: &Statement,
    catalog: &Catalog,
    conn: &Connection,
    dynamic_prefixes: &[String],
) -> Result<StatementModel> {
    let Statement::Query(query) = statement else {
        unreachable!("analyze_select called with a non-query statement");
    };

    let mut shape = extract_select_shape(query, catalog);
    let with_selects = extract_cte_shapes(query, catalog);
    let casts = cast_hints(statement);

    let mut zero_params: Vec<String> = Vec::new();
    zero_params.extend(shape.limit_param.clone());
    zero_params.extend(shape.offset_param.clone());

    let rewritten = rewrite_named_parameters(&block.sql, &zero_params);

    let prepared = conn
        .prepare(&rewritten.prepare_sql)
        .map_err(|err| GeneratorError::AnalysisError {
            path: file.to_path_buf(),
            line: block.line,
            message: format!("failed to prepare query: {err}"),
            sql: block.sql.clone(),
        })?;

    let column_count = prepared.column_count();
    if column_count == 0 {
        return Err(GeneratorError::AnalysisError {
            path: file.to_path_buf(),
            line: block.line,
            message: "query returns zero columns".to_string(),
            sql: block.sql.clone(),
        }
        .into());
    }

    let mut engine_fields: Vec<(String, Option<String>)> = Vec::new();
    for column in prepared.columns() {
        engine_fields.push((
            column.name().to_string(),
            column.decl_type().map(str::to_string),
        ));
    }

    // Engine labels are authoritative; the AST walk supplies origin info
    // when it expanded to the same column count.
    let fields: Vec<FieldSource> = if shape.fields.len() == engine_fields.len() {
        shape
            .fields
            .iter()
            .zip(engine_fields.iter())
            .map(|(ast_field, (label, decl))| FieldSource {
                label: label.clone(),
                source_alias: ast_field.source_alias.clone(),
                original_column: ast_field.original_column.clone(),
                declared_type: ast_field.declared_type.clone().or_else(|| decl.clone()),
                is_expression: ast_field.is_expression,
            })
            .collect()
    } else {
        engine_fields
            .iter()
            .map(|(label, decl)| FieldSource {
                label: label.clone(),
                source_alias: None,
                original_column: None,
                declared_type: decl.clone(),
                is_expression: false,
            })
            .collect()
    };

    check_duplicate_labels(file, block.line, &block.sql, &fields, &shape, dynamic_prefixes)?;
    shape.fields = fields;

    Ok(StatementModel {
        kind: StatementKind::Select,
        source_path: file.to_path_buf(),
        line: block.line,
        sql: rewritten.sql,
        named_parameters: rewritten.named_parameters,
        parameter_occurrences: rewritten.occurrences,
        parameter_cast_types: casts,
        select: Some(shape),
        dml: None,
        returning: None,
        with_selects,
    })
}
