//! Result mapping plan
//!
//! For every SELECT, derives the flat joined-row shape and one mapping node
//! per dynamic field, with unique joined-row property names and the
//! validations the dynamic mapping contract requires.

use anyhow::Result;
use glob::Pattern;

use crate::analyzer::FieldSource;
use crate::annotation::{FieldAnnotations, MappingType};
use crate::error::{Diagnostic, GeneratorError};
use crate::schema::{storage_class_of, Catalog};
use crate::util::{pascal_case, starts_with_ci};

use super::annotated::AnnotatedStatement;
use super::lookup::{resolve_field_column, resolve_relation_column};
use super::types::{
    column_base_type, column_target_type, parse_property_type, resolve_field_nullability,
    storage_base_type, IrType,
};

/// A fully resolved nested-record field of a mapping node.
#[derive(Debug, Clone)]
pub struct ResolvedField {
    pub property_name: String,
    /// Label within the joined row (prefix stripped).
    pub label: String,
    pub ty: IrType,
    /// Primitive type before `propertyType` overrides.
    pub base_ty: IrType,
    pub nullable: bool,
    pub custom_adapter: bool,
    pub original_column: Option<String>,
}

/// One non-dynamic column of the joined row.
#[derive(Debug, Clone)]
pub struct JoinedField {
    /// SQL label as reported by the engine.
    pub label: String,
    /// Unique property name within the joined record.
    pub joined_property_name: String,
    pub ty: IrType,
    /// Primitive type before `propertyType` overrides.
    pub base_ty: IrType,
    pub nullable: bool,
    pub custom_adapter: bool,
    pub source_alias: Option<String>,
    pub original_column: Option<String>,
    /// True when an alias prefix gathers this column into a dynamic field.
    pub covered_by_prefix: bool,
}

/// One dynamic field of the result.
#[derive(Debug, Clone)]
pub struct MappingNode {
    pub property_name: String,
    pub mapping_type: MappingType,
    pub target_type: IrType,
    /// Element type for collections; identical to `target_type` otherwise.
    pub element_type: IrType,
    pub alias_prefix: String,
    pub collection_key: Option<String>,
    pub source_table_alias: String,
    /// Joined-row property names feeding this node.
    pub columns: Vec<String>,
    pub child_fields: Vec<ResolvedField>,
    pub nullable: bool,
}

/// The per-SELECT mapping plan.
#[derive(Debug, Clone)]
pub struct ResultMappingPlan {
    pub joined_fields: Vec<JoinedField>,
    pub nodes: Vec<MappingNode>,
    pub main_table_alias: Option<String>,
}

/// Assign a unique joined-row property name to every field. The SQL alias
/// (style-converted) is preferred; a collision appends the PascalCased
/// source alias, and a numeric suffix beyond that.
pub fn resolve_joined_property_names(
    preferred: &[(String, Option<String>)],
) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for (wanted, source_alias) in preferred {
        let mut candidate = wanted.clone();
        if names.iter().any(|n| n.eq_ignore_ascii_case(&candidate)) {
            if let Some(alias) = source_alias {
                candidate = format!("{wanted}{}", pascal_case(alias));
            }
        }
        let mut suffix = 2usize;
        while names.iter().any(|n| n.eq_ignore_ascii_case(&candidate)) {
            candidate = format!("{wanted}{suffix}");
            suffix += 1;
        }
        names.push(candidate);
    }
    names
}

fn resolution_error(annotated: &AnnotatedStatement, message: String) -> GeneratorError {
    GeneratorError::ResolutionError {
        path: annotated.model.source_path.clone(),
        message,
    }
}

/// Resolve the type of one result field against annotations and catalog.
fn resolve_select_field(
    catalog: &Catalog,
    annotated: &AnnotatedStatement,
    field: &FieldSource,
    main_alias: Option<&str>,
    prefixes: &[String],
) -> (String, IrType, IrType, bool, bool) {
    let style = annotated.statement.name_style;
    let select = annotated.model.select.as_ref().expect("select model");
    let annotation = annotated.field_annotation(&field.label);

    let covered_by_prefix = prefixes.iter().any(|p| starts_with_ci(&field.label, p));
    let from_main_alias = match (&field.source_alias, main_alias) {
        (Some(alias), Some(main)) => alias.eq_ignore_ascii_case(main),
        // Expressions and unresolved fields follow main-row nullability.
        (None, _) => true,
        (Some(_), None) => true,
    };

    let resolution = resolve_field_column(catalog, select, field, style, prefixes);

    let base_ty = if let Some(resolution) = &resolution {
        column_base_type(resolution)
    } else if let Some(declared) = &field.declared_type {
        storage_base_type(storage_class_of(declared), false)
    } else {
        IrType::String
    };

    let ty = if let Some(property_type) = annotation.and_then(|a| a.property_type.as_deref()) {
        parse_property_type(property_type)
    } else if let Some(resolution) = &resolution {
        column_target_type(resolution)
    } else {
        base_ty.clone()
    };

    let nullable = resolve_field_nullability(
        annotation.and_then(|a| a.not_null),
        covered_by_prefix,
        from_main_alias,
        resolution.as_ref().and_then(|r| r.not_null_override()),
        resolution
            .as_ref()
            .map(|r| r.column.is_sql_nullable)
            // No originating column: assume the engine may produce NULL.
            .unwrap_or(true),
    );

    let custom_adapter = annotation.map(|a| a.custom_adapter).unwrap_or(false)
        || resolution.as_ref().map(|r| r.custom_adapter()).unwrap_or(false);

    let property_name = annotation
        .and_then(|a| a.property_name.clone())
        .or_else(|| {
            resolution
                .as_ref()
                .and_then(|r| r.property_name().map(str::to_string))
        })
        .unwrap_or_else(|| style.apply(&field.label));

    (property_name, ty, base_ty, nullable, custom_adapter)
}

fn build_node(
    catalog: &Catalog,
    annotated: &AnnotatedStatement,
    dynamic: &FieldAnnotations,
    joined_fields: &[JoinedField],
    main_alias: Option<&str>,
    warnings: &mut Vec<Diagnostic>,
) -> Result<MappingNode, GeneratorError> {
    let select = annotated.model.select.as_ref().expect("select model");
    let style = annotated.statement.name_style;
    let name = dynamic.target.name().to_string();
    let mapping_type = dynamic.mapping_type.expect("validated by the parser");
    let prefix = dynamic
        .alias_prefix
        .clone()
        .expect("validated by the parser");
    let source_table = dynamic
        .source_table
        .clone()
        .expect("validated by the parser");

    // The source must be a known alias of this statement, or a view.
    let source_relation = select
        .alias_target(&source_table)
        .map(str::to_string)
        .or_else(|| catalog.view(&source_table).map(|v| v.name.clone()))
        .ok_or_else(|| {
            resolution_error(
                annotated,
                format!(
                    "dynamic field '{name}' names unknown sourceTable '{source_table}'"
                ),
            )
        })?;

    let members: Vec<&JoinedField> = joined_fields
        .iter()
        .filter(|f| starts_with_ci(&f.label, &prefix))
        .collect();
    if members.is_empty() {
        warnings.push(Diagnostic::warning(
            None,
            Some(annotated.model.sql.clone()),
            format!(
                "alias prefix '{prefix}' of dynamic field '{name}' matches no column of query '{}'",
                annotated.name
            ),
        ));
    }

    let mut child_fields = Vec::new();
    for member in &members {
        let child_label = member.label[prefix.len()..].to_string();
        let resolution = resolve_relation_column(catalog, &source_relation, &child_label, style);
        let (ty, base_ty, nullable, custom_adapter, original_column) = match &resolution {
            Some(resolution) => (
                column_target_type(resolution),
                column_base_type(resolution),
                resolution
                    .not_null_override()
                    .map(|nn| !nn)
                    .unwrap_or(resolution.column.is_sql_nullable),
                resolution.custom_adapter(),
                Some(resolution.column.name.clone()),
            ),
            None => (
                member.ty.clone(),
                member.base_ty.clone(),
                member.nullable,
                member.custom_adapter,
                None,
            ),
        };
        let property_name = resolution
            .as_ref()
            .and_then(|r| r.property_name().map(str::to_string))
            .unwrap_or_else(|| style.apply(&child_label));
        child_fields.push(ResolvedField {
            property_name,
            label: child_label,
            ty,
            base_ty,
            nullable,
            custom_adapter,
            original_column,
        });
    }

    let (target_type, element_type, collection_key) = match mapping_type {
        MappingType::Collection => {
            let property_type = dynamic.property_type.as_deref().ok_or_else(|| {
                resolution_error(
                    annotated,
                    format!("collection dynamic field '{name}' requires propertyType=List<T>"),
                )
            })?;
            let target = parse_property_type(property_type);
            let IrType::List(element) = &target else {
                return Err(resolution_error(
                    annotated,
                    format!(
                        "collection dynamic field '{name}' requires a List<T> propertyType, got '{property_type}'"
                    ),
                ));
            };
            let key = dynamic
                .collection_key
                .clone()
                .or_else(|| annotated.statement.collection_key.clone())
                .ok_or_else(|| {
                    resolution_error(
                        annotated,
                        format!("collection dynamic field '{name}' has no collectionKey"),
                    )
                })?;
            if !joined_fields
                .iter()
                .any(|f| f.label.eq_ignore_ascii_case(&key))
            {
                return Err(resolution_error(
                    annotated,
                    format!(
                        "collectionKey '{key}' of dynamic field '{name}' is not a joined-row column"
                    ),
                ));
            }
            let element = element.as_ref().clone();
            (target, element, Some(key))
        }
        MappingType::Entity => {
            let property_type = dynamic.property_type.as_deref().ok_or_else(|| {
                resolution_error(
                    annotated,
                    format!("entity dynamic field '{name}' requires a propertyType"),
                )
            })?;
            let target = parse_property_type(property_type);
            (target.clone(), target, None)
        }
        MappingType::PerRow => {
            let target = match dynamic.property_type.as_deref() {
                Some(property_type) => parse_property_type(property_type),
                None => IrType::Named(pascal_case(&name)),
            };
            (target.clone(), target, None)
        }
    };

    let nullable = match mapping_type {
        // A collection is an empty list when the outer join misses.
        MappingType::Collection => false,
        _ => match main_alias {
            Some(main) => !source_table.eq_ignore_ascii_case(main),
            None => true,
        },
    };

    Ok(MappingNode {
        property_name: name,
        mapping_type,
        target_type,
        element_type,
        alias_prefix: prefix,
        collection_key,
        source_table_alias: source_table,
        columns: members
            .iter()
            .map(|f| f.joined_property_name.clone())
            .collect(),
        child_fields,
        nullable,
    })
}

/// Build the result mapping plan for a SELECT statement.
pub fn build_mapping_plan(
    catalog: &Catalog,
    annotated: &AnnotatedStatement,
    warnings: &mut Vec<Diagnostic>,
) -> Result<ResultMappingPlan> {
    let select = annotated
        .model
        .select
        .as_ref()
        .expect("mapping plans are derived for SELECT statements only");

    let main_table_alias = annotated.main_table_alias();
    let prefixes = annotated.dynamic_prefixes();

    // Resolve every non-dynamic field of the joined row.
    let mut resolved: Vec<(String, IrType, IrType, bool, bool)> = Vec::new();
    for field in &select.fields {
        resolved.push(resolve_select_field(
            catalog,
            annotated,
            field,
            main_table_alias.as_deref(),
            &prefixes,
        ));
    }

    let preferred: Vec<(String, Option<String>)> = select
        .fields
        .iter()
        .zip(resolved.iter())
        .map(|(field, (name, ..))| (name.clone(), field.source_alias.clone()))
        .collect();
    let unique_names = resolve_joined_property_names(&preferred);

    let joined_fields: Vec<JoinedField> = select
        .fields
        .iter()
        .zip(resolved.into_iter())
        .zip(unique_names.into_iter())
        .map(
            |((field, (_, ty, base_ty, nullable, custom_adapter)), joined_property_name)| {
                JoinedField {
                    label: field.label.clone(),
                    joined_property_name,
                    ty,
                    base_ty,
                    nullable,
                    custom_adapter,
                    source_alias: field.source_alias.clone(),
                    original_column: field.original_column.clone(),
                    covered_by_prefix: prefixes.iter().any(|p| starts_with_ci(&field.label, p)),
                }
            },
        )
        .collect();

    let mut nodes = Vec::new();
    for dynamic in annotated.dynamic_fields() {
        nodes.push(build_node(
            catalog,
            annotated,
            dynamic,
            &joined_fields,
            main_table_alias.as_deref(),
            warnings,
        )?);
    }

    // Each joined column may feed at most one dynamic field.
    for field in &joined_fields {
        let claims = nodes
            .iter()
            .filter(|n| n.columns.contains(&field.joined_property_name))
            .count();
        if claims > 1 {
            return Err(resolution_error(
                annotated,
                format!(
                    "column '{}' is claimed by {claims} dynamic fields; alias prefixes overlap",
                    field.label
                ),
            )
            .into());
        }
    }

    // Two collections may share a key only when their elements agree.
    for (index, node) in nodes.iter().enumerate() {
        if let Some(key) = &node.collection_key {
            for other in nodes.iter().skip(index + 1) {
                if other.collection_key.as_deref() == Some(key.as_str())
                    && other.element_type != node.element_type
                {
                    return Err(resolution_error(
                        annotated,
                        format!(
                            "collection fields '{}' and '{}' share collectionKey '{key}' but have different element types",
                            node.property_name, other.property_name
                        ),
                    )
                    .into());
                }
            }
        }
    }

    // Exclusion patterns must compile; matching happens at emission.
    for pattern in &annotated.statement.exclude_override_fields {
        Pattern::new(pattern).map_err(|err| {
            resolution_error(
                annotated,
                format!("invalid excludeOverrideFields pattern '{pattern}': {err}"),
            )
        })?;
    }

    Ok(ResultMappingPlan {
        joined_fields,
        nodes,
        main_table_alias,
    })
}
