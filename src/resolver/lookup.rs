//! Column lookup across tables, views and nested views
//!
//! Finds the originating table column of a result field or bound parameter.
//! View traversal carries the view fields' annotations outward so overrides
//! closest to the query win, and records visited views to stop cycles.

use crate::analyzer::{FieldSource, SelectModel};
use crate::annotation::{ColumnAnnotations, NameStyle};
use crate::schema::{Catalog, Column, Relation};
use crate::util::starts_with_ci;

/// Outcome of a successful lookup.
#[derive(Debug, Clone)]
pub struct ColumnResolution {
    /// Base table the column lives in.
    pub table_name: String,
    pub column: Column,
    /// Annotations of the view fields traversed on the way, outermost view
    /// first. These take precedence over the column's own annotations.
    pub view_annotations: Vec<ColumnAnnotations>,
}

impl ColumnResolution {
    /// First `propertyType` on the override chain: view fields outward-in,
    /// then the column itself.
    pub fn property_type(&self) -> Option<&str> {
        self.view_annotations
            .iter()
            .find_map(|a| a.property_type.as_deref())
            .or(self.column.annotations.property_type.as_deref())
    }

    /// First `propertyName` on the override chain.
    pub fn property_name(&self) -> Option<&str> {
        self.view_annotations
            .iter()
            .find_map(|a| a.property_name.as_deref())
            .or(self.column.annotations.property_name.as_deref())
    }

    /// First `notNull` on the override chain.
    pub fn not_null_override(&self) -> Option<bool> {
        self.view_annotations
            .iter()
            .find_map(|a| a.not_null)
            .or(self.column.annotations.not_null)
    }

    /// First `sqlTypeHint` on the override chain.
    pub fn sql_type_hint(&self) -> Option<&str> {
        self.view_annotations
            .iter()
            .find_map(|a| a.sql_type_hint.as_deref())
            .or(self.column.annotations.sql_type_hint.as_deref())
    }

    pub fn custom_adapter(&self) -> bool {
        self.column.annotations.custom_adapter
            || self.view_annotations.iter().any(|a| a.custom_adapter)
    }
}

/// Resolve `column_name` inside the named relation, descending through view
/// definitions. `style` drives the name-conversion fallback.
pub fn resolve_relation_column(
    catalog: &Catalog,
    relation_name: &str,
    column_name: &str,
    style: NameStyle,
) -> Option<ColumnResolution> {
    let mut visited: Vec<String> = Vec::new();
    resolve_inner(catalog, relation_name, column_name, style, &mut visited)
}

fn resolve_inner(
    catalog: &Catalog,
    relation_name: &str,
    column_name: &str,
    style: NameStyle,
    visited: &mut Vec<String>,
) -> Option<ColumnResolution> {
    if visited
        .iter()
        .any(|v| v.eq_ignore_ascii_case(relation_name))
    {
        return None;
    }
    visited.push(relation_name.to_string());

    match catalog.relation(relation_name)? {
        Relation::Table(table) => {
            let column = table.column(column_name).or_else(|| {
                table
                    .columns
                    .iter()
                    .find(|c| style.apply(&c.name).eq_ignore_ascii_case(column_name))
            })?;
            Some(ColumnResolution {
                table_name: table.name.clone(),
                column: column.clone(),
                view_annotations: Vec::new(),
            })
        }
        Relation::View(view) => {
            let field = view.field(column_name).or_else(|| {
                view.fields
                    .iter()
                    .find(|f| style.apply(&f.alias).eq_ignore_ascii_case(column_name))
            })?;

            let source_alias = field.source_alias.as_deref()?;
            let target = view.alias_target(source_alias)?;
            let inner_column = field.original_column.as_deref().unwrap_or(&field.alias);

            let mut resolution = resolve_inner(catalog, target, inner_column, style, visited)?;
            if let Some(annotations) = &field.annotations {
                resolution.view_annotations.insert(0, annotations.clone());
            }
            Some(resolution)
        }
    }
}

/// Resolve a SELECT result field to its originating column, following the
/// documented order: source alias first, then FROM/JOIN relations, then the
/// name-style fallback, then an alias-prefix strip and retry.
pub fn resolve_field_column(
    catalog: &Catalog,
    select: &SelectModel,
    field: &FieldSource,
    style: NameStyle,
    alias_prefixes: &[String],
) -> Option<ColumnResolution> {
    let lookup_name = field
        .original_column
        .as_deref()
        .unwrap_or(&field.label)
        .to_string();

    // Known source alias: resolve inside that relation only.
    if let Some(source_alias) = &field.source_alias {
        if let Some(target) = select.alias_target(source_alias) {
            if let Some(resolution) =
                resolve_relation_column(catalog, target, &lookup_name, style)
            {
                return Some(resolution);
            }
        }
    }

    // FROM relation first, then each JOIN relation.
    for (_, target) in select.table_aliases() {
        if let Some(resolution) = resolve_relation_column(catalog, &target, &lookup_name, style) {
            return Some(resolution);
        }
    }

    // A prefixed label names a dynamic-field column; strip and retry.
    for prefix in alias_prefixes {
        if starts_with_ci(&field.label, prefix) {
            let stripped = &field.label[prefix.len()..];
            for (_, target) in select.table_aliases() {
                if let Some(resolution) =
                    resolve_relation_column(catalog, &target, stripped, style)
                {
                    return Some(resolution);
                }
            }
        }
    }

    None
}
