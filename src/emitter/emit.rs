//! Per-namespace IR emission

use anyhow::Result;
use glob::{MatchOptions, Pattern};

use crate::analyzer::{ReturningClause, StatementKind};
use crate::annotation::MappingType;
use crate::error::{Diagnostic, GeneratorError};
use crate::resolver::{
    resolve_parameter_types, AnnotatedStatement, IrType, ResultMappingPlan,
};
use crate::schema::Catalog;
use crate::util::pascal_case;

use super::adapters::{AdapterCandidate, AdapterRegistry};
use super::ir::{
    AdapterDirection, IrField, IrFieldMapping, IrNamespace, JoinedRecord, ParameterRecord,
    QueryFunction, ResultRecord,
};

fn result_record_name(annotated: &AnnotatedStatement) -> String {
    annotated
        .statement
        .query_result
        .clone()
        .unwrap_or_else(|| {
            format!(
                "{}{}Result",
                pascal_case(&annotated.namespace),
                pascal_case(&annotated.name)
            )
        })
}

fn parameter_record_name(annotated: &AnnotatedStatement) -> String {
    format!(
        "{}{}Params",
        pascal_case(&annotated.namespace),
        pascal_case(&annotated.name)
    )
}

/// An adapter is required for custom-flagged fields and for any field whose
/// target type is a named override of its storage primitive.
fn needs_adapter(ty: &IrType, custom: bool) -> bool {
    custom || matches!(ty, IrType::Named(_))
}

fn push_unique(names: &mut Vec<String>, name: String) {
    if !names.contains(&name) {
        names.push(name);
    }
}

/// Add a record, merging exact duplicates and rejecting conflicting
/// definitions under one name.
fn push_record(
    namespace: &str,
    records: &mut Vec<ResultRecord>,
    record: ResultRecord,
) -> Result<(), GeneratorError> {
    if let Some(existing) = records.iter().find(|r| r.name == record.name) {
        if existing.fields == record.fields {
            return Ok(());
        }
        return Err(GeneratorError::EmissionError {
            namespace: namespace.to_string(),
            message: format!(
                "record '{}' is defined twice with different shapes",
                record.name
            ),
        });
    }
    records.push(record);
    Ok(())
}

/// Field names matched by the compiled exclusion patterns, checked against
/// the generated property name, the SQL alias and the original column.
fn excluded_properties(
    patterns: &[String],
    fields: &[IrField],
) -> Vec<String> {
    if patterns.is_empty() {
        return Vec::new();
    }
    let options = MatchOptions {
        case_sensitive: false,
        require_literal_separator: false,
        require_literal_leading_dot: false,
    };
    let compiled: Vec<Pattern> = patterns
        .iter()
        .filter_map(|p| Pattern::new(p).ok())
        .collect();
    let mut excluded = Vec::new();
    for field in fields {
        let mut candidates: Vec<&str> = vec![field.name.as_str()];
        if let Some(sql_name) = &field.sql_name {
            candidates.push(sql_name);
        }
        if let Some(column) = &field.original_column {
            candidates.push(column);
        }
        if compiled
            .iter()
            .any(|p| candidates.iter().any(|c| p.matches_with(c, options)))
        {
            excluded.push(field.name.clone());
        }
    }
    excluded
}

/// Tables a SELECT reads, through the view closure, in FROM/JOIN order.
fn select_affected_tables(catalog: &Catalog, annotated: &AnnotatedStatement) -> Vec<String> {
    let mut tables: Vec<String> = Vec::new();
    if let Some(select) = &annotated.model.select {
        for (_, target) in select.table_aliases() {
            for table in catalog.base_tables_of(&target) {
                push_unique(&mut tables, table);
            }
        }
    }
    tables
}

struct EmitContext<'a> {
    namespace: String,
    catalog: &'a Catalog,
    registry: AdapterRegistry,
    /// Entity types referenced by dynamic fields, checked after the
    /// namespace is complete.
    entity_references: Vec<(String, String)>,
    ns: IrNamespace,
}

/// Emit the IR for one namespace.
pub fn emit_namespace(
    catalog: &Catalog,
    namespace: &str,
    items: &[(AnnotatedStatement, Option<ResultMappingPlan>)],
    warnings: &mut Vec<Diagnostic>,
) -> Result<IrNamespace> {
    let mut ctx = EmitContext {
        namespace: namespace.to_string(),
        catalog,
        registry: AdapterRegistry::new(),
        entity_references: Vec::new(),
        ns: IrNamespace {
            name: namespace.to_string(),
            query_class: format!("{}Query", pascal_case(namespace)),
            functions: Vec::new(),
            parameter_records: Vec::new(),
            result_records: Vec::new(),
            joined_records: Vec::new(),
            adapters: Vec::new(),
        },
    };

    for (annotated, plan) in items {
        emit_statement(&mut ctx, annotated, plan.as_ref(), warnings)?;
    }

    // Entity types must resolve to something emitted in this namespace;
    // anything else is assumed to be user-supplied and worth a warning.
    for (type_name, query) in &ctx.entity_references {
        let known = ctx.ns.result_records.iter().any(|r| &r.name == type_name);
        if !known && !type_name.contains('.') {
            warnings.push(Diagnostic::warning(
                None,
                None,
                format!(
                    "entity type '{type_name}' of query '{query}' is not generated in namespace '{namespace}'; an external type is assumed"
                ),
            ));
        }
    }

    ctx.ns.adapters = ctx.registry.into_adapters();
    Ok(ctx.ns)
}

fn emit_statement(
    ctx: &mut EmitContext<'_>,
    annotated: &AnnotatedStatement,
    plan: Option<&ResultMappingPlan>,
    warnings: &mut Vec<Diagnostic>,
) -> Result<()> {
    let style = annotated.statement.name_style;
    let parameters = resolve_parameter_types(ctx.catalog, annotated, warnings);

    let param_record_name = parameter_record_name(annotated);
    let mut required_adapters: Vec<String> = Vec::new();
    let mut param_fields = Vec::new();
    for parameter in &parameters {
        let field_name = style.apply(&parameter.name);
        if needs_adapter(&parameter.ty, parameter.custom_adapter) {
            let adapter = ctx.registry.register(
                &ctx.namespace,
                AdapterCandidate {
                    name: format!("{field_name}Adapter"),
                    discriminator: param_record_name.clone(),
                    input_type: parameter.ty.clone(),
                    output_type: parameter.base_ty.clone(),
                    direction: AdapterDirection::InputToSql,
                },
            )?;
            push_unique(&mut required_adapters, adapter);
        }
        param_fields.push(IrField {
            name: field_name,
            ty: parameter.ty.clone(),
            nullable: parameter.nullable,
            sql_name: Some(parameter.name.clone()),
            original_column: parameter.column.clone(),
            mapping: None,
        });
    }
    ctx.ns.parameter_records.push(ParameterRecord {
        name: param_record_name.clone(),
        fields: param_fields,
    });

    let (result_record, joined_record) = match annotated.model.kind {
        StatementKind::Select => {
            let plan = plan.expect("SELECT statements carry a mapping plan");
            emit_select_records(ctx, annotated, plan, &mut required_adapters)?
        }
        _ => (
            emit_returning_record(ctx, annotated, &mut required_adapters)?,
            None,
        ),
    };

    let affected_tables = match annotated.model.kind {
        StatementKind::Select => select_affected_tables(ctx.catalog, annotated),
        _ => annotated
            .model
            .dml
            .as_ref()
            .map(|dml| {
                vec![ctx
                    .catalog
                    .table(&dml.target_table)
                    .map(|t| t.name.clone())
                    .unwrap_or_else(|| dml.target_table.clone())]
            })
            .unwrap_or_default(),
    };

    ctx.ns.functions.push(QueryFunction {
        name: annotated.name.clone(),
        kind: annotated.model.kind,
        sql: annotated.model.sql.clone(),
        bind_order: annotated.model.parameter_occurrences.clone(),
        parameter_record: param_record_name,
        result_record,
        joined_record,
        required_adapters,
        affected_tables,
    });

    Ok(())
}

fn emit_select_records(
    ctx: &mut EmitContext<'_>,
    annotated: &AnnotatedStatement,
    plan: &ResultMappingPlan,
    required_adapters: &mut Vec<String>,
) -> Result<(Option<String>, Option<String>)> {
    let result_name = result_record_name(annotated);

    // Decoding adapters are registered once per joined-row column.
    let mut joined_fields = Vec::new();
    for field in &plan.joined_fields {
        if needs_adapter(&field.ty, field.custom_adapter) {
            let adapter = ctx.registry.register(
                &ctx.namespace,
                AdapterCandidate {
                    name: format!("{}Adapter", field.joined_property_name),
                    discriminator: result_name.clone(),
                    input_type: field.base_ty.clone(),
                    output_type: field.ty.clone(),
                    direction: AdapterDirection::SqlToOutput,
                },
            )?;
            push_unique(required_adapters, adapter);
        }
        joined_fields.push(IrField {
            name: field.joined_property_name.clone(),
            ty: field.ty.clone(),
            nullable: field.nullable,
            sql_name: Some(field.label.clone()),
            original_column: field.original_column.clone(),
            mapping: None,
        });
    }

    if !annotated.has_dynamic_mapping() {
        let record = ResultRecord {
            name: result_name.clone(),
            excluded_override_properties: excluded_properties(
                &annotated.statement.exclude_override_fields,
                &joined_fields,
            ),
            fields: joined_fields,
            implements: annotated.statement.implements.clone(),
            exclude_override_fields: annotated.statement.exclude_override_fields.clone(),
            map_to: annotated.statement.map_to.clone(),
        };
        push_record(&ctx.namespace, &mut ctx.ns.result_records, record)?;
        return Ok((Some(result_name), None));
    }

    let joined_name = format!("{result_name}_Joined");
    ctx.ns.joined_records.push(JoinedRecord {
        name: joined_name.clone(),
        fields: joined_fields.clone(),
    });

    // Hierarchical record: uncovered joined columns keep their place,
    // followed by one property per dynamic field.
    let mut result_fields: Vec<IrField> = plan
        .joined_fields
        .iter()
        .zip(joined_fields.iter())
        .filter(|(planned, _)| !planned.covered_by_prefix)
        .map(|(_, field)| field.clone())
        .collect();

    for node in &plan.nodes {
        result_fields.push(IrField {
            name: node.property_name.clone(),
            ty: node.target_type.clone(),
            nullable: node.nullable,
            sql_name: None,
            original_column: None,
            mapping: Some(IrFieldMapping {
                mapping_type: node.mapping_type,
                alias_prefix: node.alias_prefix.clone(),
                collection_key: node.collection_key.clone(),
                source_columns: node.columns.clone(),
            }),
        });

        // Per-row and collection element records are generated from the
        // gathered columns; entities reference an existing type.
        match node.mapping_type {
            MappingType::Entity => {
                ctx.entity_references
                    .push((node.element_type.to_string(), annotated.name.clone()));
            }
            MappingType::PerRow | MappingType::Collection => {
                let type_name = node.element_type.to_string();
                if !type_name.contains('.') {
                    let fields = node
                        .child_fields
                        .iter()
                        .map(|child| IrField {
                            name: child.property_name.clone(),
                            ty: child.ty.clone(),
                            nullable: child.nullable,
                            sql_name: Some(child.label.clone()),
                            original_column: child.original_column.clone(),
                            mapping: None,
                        })
                        .collect();
                    push_record(
                        &ctx.namespace,
                        &mut ctx.ns.result_records,
                        ResultRecord {
                            name: type_name,
                            fields,
                            implements: None,
                            exclude_override_fields: Vec::new(),
                            excluded_override_properties: Vec::new(),
                            map_to: None,
                        },
                    )?;
                }
            }
        }
    }

    let record = ResultRecord {
        name: result_name.clone(),
        excluded_override_properties: excluded_properties(
            &annotated.statement.exclude_override_fields,
            &result_fields,
        ),
        fields: result_fields,
        implements: annotated.statement.implements.clone(),
        exclude_override_fields: annotated.statement.exclude_override_fields.clone(),
        map_to: annotated.statement.map_to.clone(),
    };
    push_record(&ctx.namespace, &mut ctx.ns.result_records, record)?;

    Ok((Some(result_name), Some(joined_name)))
}

/// Build the result record of a DML statement's RETURNING clause, expanding
/// `*` to the target table's columns in declaration order.
fn emit_returning_record(
    ctx: &mut EmitContext<'_>,
    annotated: &AnnotatedStatement,
    required_adapters: &mut Vec<String>,
) -> Result<Option<String>> {
    let Some(returning) = &annotated.model.returning else {
        return Ok(None);
    };
    let Some(dml) = &annotated.model.dml else {
        return Ok(None);
    };
    let style = annotated.statement.name_style;

    let table = ctx.catalog.table(&dml.target_table).ok_or_else(|| {
        GeneratorError::ResolutionError {
            path: annotated.model.source_path.clone(),
            message: format!(
                "RETURNING clause targets unknown table '{}'",
                dml.target_table
            ),
        }
    })?;

    let columns: Vec<&crate::schema::Column> = match returning {
        ReturningClause::Star => table.columns.iter().collect(),
        ReturningClause::Columns(names) => {
            let mut columns = Vec::new();
            for name in names {
                let column = table.column(name).ok_or_else(|| {
                    GeneratorError::ResolutionError {
                        path: annotated.model.source_path.clone(),
                        message: format!(
                            "RETURNING column '{name}' does not exist in table '{}'",
                            table.name
                        ),
                    }
                })?;
                columns.push(column);
            }
            columns
        }
    };

    let result_name = result_record_name(annotated);
    let mut fields = Vec::new();
    for column in columns {
        let property_name = column
            .annotations
            .property_name
            .clone()
            .unwrap_or_else(|| style.apply(&column.name));
        let base_ty = crate::resolver::storage_base_type(
            column
                .annotations
                .sql_type_hint
                .as_deref()
                .map(crate::schema::storage_class_of)
                .unwrap_or(column.storage),
            column.boolean_hint,
        );
        let ty = match column.annotations.property_type.as_deref() {
            Some(property_type) => crate::resolver::parse_property_type(property_type),
            None => base_ty.clone(),
        };
        let nullable = column
            .annotations
            .not_null
            .map(|nn| !nn)
            .unwrap_or(column.is_sql_nullable);

        if needs_adapter(&ty, column.annotations.custom_adapter) {
            let adapter = ctx.registry.register(
                &ctx.namespace,
                AdapterCandidate {
                    name: format!("{property_name}Adapter"),
                    discriminator: result_name.clone(),
                    input_type: base_ty,
                    output_type: ty.clone(),
                    direction: AdapterDirection::SqlToOutput,
                },
            )?;
            push_unique(required_adapters, adapter);
        }

        fields.push(IrField {
            name: property_name,
            ty,
            nullable,
            sql_name: Some(column.name.clone()),
            original_column: Some(column.name.clone()),
            mapping: None,
        });
    }

    let record = ResultRecord {
        name: result_name.clone(),
        excluded_override_properties: excluded_properties(
            &annotated.statement.exclude_override_fields,
            &fields,
        ),
        fields,
        implements: annotated.statement.implements.clone(),
        exclude_override_fields: annotated.statement.exclude_override_fields.clone(),
        map_to: annotated.statement.map_to.clone(),
    };
    push_record(&ctx.namespace, &mut ctx.ns.result_records, record)?;

    Ok(Some(result_name))
}
