//! Target-type resolution
//!
//! Maps SQLite storage classes to IR primitives, applies `propertyType`
//! overrides and resolves parameter types through their column bindings.

use std::fmt;

use serde::ser::Serializer;
use serde::Serialize;

use crate::analyzer::{StatementKind, StatementModel};
use crate::error::Diagnostic;
use crate::schema::{storage_class_of, Catalog, StorageClass};

use super::annotated::AnnotatedStatement;
use super::lookup::{resolve_relation_column, ColumnResolution};

/// The IR type model. Primitives map from SQLite storage classes; `Named`
/// carries `propertyType` overrides verbatim; `List` is the single generic
/// shape used by collection dynamic fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IrType {
    String,
    Long,
    Double,
    Bytes,
    Boolean,
    Named(String),
    List(Box<IrType>),
}

impl fmt::Display for IrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrType::String => write!(f, "string"),
            IrType::Long => write!(f, "long"),
            IrType::Double => write!(f, "double"),
            IrType::Bytes => write!(f, "bytes"),
            IrType::Boolean => write!(f, "boolean"),
            IrType::Named(name) => write!(f, "{name}"),
            IrType::List(element) => write!(f, "List<{element}>"),
        }
    }
}

impl Serialize for IrType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Base IR type for a storage class. BOOLEAN-hinted columns keep INTEGER
/// storage but surface as booleans.
pub fn storage_base_type(storage: StorageClass, boolean_hint: bool) -> IrType {
    if boolean_hint {
        return IrType::Boolean;
    }
    match storage {
        StorageClass::Integer => IrType::Long,
        StorageClass::Text => IrType::String,
        StorageClass::Blob => IrType::Bytes,
        StorageClass::Real | StorageClass::Numeric => IrType::Double,
    }
}

/// Parse a `propertyType` value. `List<T>` is the only recognised generic;
/// anything else is carried verbatim as a named type.
pub fn parse_property_type(value: &str) -> IrType {
    if let Some(inner) = value
        .strip_prefix("List<")
        .and_then(|rest| rest.strip_suffix('>'))
    {
        return IrType::List(Box::new(IrType::Named(inner.to_string())));
    }
    IrType::Named(value.to_string())
}

/// Base type of a resolved column, honouring `sqlTypeHint` overrides.
pub fn column_base_type(resolution: &ColumnResolution) -> IrType {
    let storage = match resolution.sql_type_hint() {
        Some(hint) => storage_class_of(hint),
        None => resolution.column.storage,
    };
    storage_base_type(storage, resolution.column.boolean_hint)
}

/// Full type of a resolved column: base type, replaced verbatim when a
/// `propertyType` override is present anywhere on the chain.
pub fn column_target_type(resolution: &ColumnResolution) -> IrType {
    match resolution.property_type() {
        Some(property_type) => parse_property_type(property_type),
        None => column_base_type(resolution),
    }
}

/// One resolved query parameter.
#[derive(Debug, Clone)]
pub struct ResolvedParameter {
    pub name: String,
    pub ty: IrType,
    /// Primitive type before any `propertyType` override; adapter
    /// signatures convert between this and `ty`.
    pub base_ty: IrType,
    pub nullable: bool,
    /// Column the parameter binds against, when one was found.
    pub column: Option<String>,
    pub custom_adapter: bool,
}

/// Resolve every named parameter of a statement, in declaration order.
/// Parameters without a column binding fall back to their cast hint, and
/// finally to `string` with a warning.
pub fn resolve_parameter_types(
    catalog: &Catalog,
    annotated: &AnnotatedStatement,
    warnings: &mut Vec<Diagnostic>,
) -> Vec<ResolvedParameter> {
    let model = &annotated.model;
    let style = annotated.statement.name_style;

    model
        .named_parameters
        .iter()
        .map(|param| {
            // LIMIT/OFFSET parameters are always integral row counts.
            if is_limit_offset(model, param) {
                return ResolvedParameter {
                    name: param.clone(),
                    ty: IrType::Long,
                    base_ty: IrType::Long,
                    nullable: false,
                    column: None,
                    custom_adapter: false,
                };
            }

            if let Some(binding) = model.binding_of(param) {
                let resolution = match &binding.alias {
                    Some(alias) => model
                        .select
                        .as_ref()
                        .and_then(|s| s.alias_target(alias))
                        .and_then(|target| {
                            resolve_relation_column(catalog, target, &binding.column, style)
                        }),
                    None => resolve_in_scope(catalog, model, &binding.column, style),
                };
                if let Some(resolution) = resolution {
                    return ResolvedParameter {
                        name: param.clone(),
                        ty: column_target_type(&resolution),
                        base_ty: column_base_type(&resolution),
                        nullable: resolution
                            .not_null_override()
                            .map(|nn| !nn)
                            .unwrap_or(resolution.column.is_sql_nullable),
                        column: Some(resolution.column.name.clone()),
                        custom_adapter: resolution.custom_adapter(),
                    };
                }
            }

            if let Some(cast) = model.cast_type_of(param) {
                let ty = storage_base_type(storage_class_of(cast), false);
                return ResolvedParameter {
                    name: param.clone(),
                    ty: ty.clone(),
                    base_ty: ty,
                    nullable: false,
                    column: None,
                    custom_adapter: false,
                };
            }

            warnings.push(Diagnostic::warning(
                None,
                Some(model.sql.clone()),
                format!(
                    "parameter ':{param}' of query '{}' has no column binding or cast hint; defaulting to string",
                    annotated.name
                ),
            ));
            ResolvedParameter {
                name: param.clone(),
                ty: IrType::String,
                base_ty: IrType::String,
                nullable: false,
                column: None,
                custom_adapter: false,
            }
        })
        .collect()
}

fn is_limit_offset(model: &StatementModel, param: &str) -> bool {
    model
        .select
        .as_ref()
        .map(|s| {
            s.limit_param.as_deref() == Some(param) || s.offset_param.as_deref() == Some(param)
        })
        .unwrap_or(false)
}

/// Resolve an unqualified column against the statement's relations: the
/// SELECT alias list, or the DML target table.
fn resolve_in_scope(
    catalog: &Catalog,
    model: &StatementModel,
    column: &str,
    style: crate::annotation::NameStyle,
) -> Option<ColumnResolution> {
    if let Some(select) = &model.select {
        for (_, target) in select.table_aliases() {
            if let Some(resolution) = resolve_relation_column(catalog, &target, column, style) {
                return Some(resolution);
            }
        }
    }
    if let Some(dml) = &model.dml {
        if let Some(resolution) =
            resolve_relation_column(catalog, &dml.target_table, column, style)
        {
            return Some(resolution);
        }
    }
    // WITH-clause selects can still bind a parameter's column.
    if model.kind != StatementKind::Select {
        for shape in &model.with_selects {
            for (_, target) in shape.table_aliases() {
                if let Some(resolution) = resolve_relation_column(catalog, &target, column, style)
                {
                    return Some(resolution);
                }
            }
        }
    }
    None
}

/// Nullability of a resolved result field, applying the documented priority:
/// explicit field override, then dynamic-prefix coverage, then non-main
/// join-alias semantics, then the column's (possibly overridden) SQL
/// nullability.
pub fn resolve_field_nullability(
    field_not_null: Option<bool>,
    covered_by_prefix: bool,
    from_main_alias: bool,
    inherited_not_null: Option<bool>,
    sql_nullable: bool,
) -> bool {
    if let Some(not_null) = field_not_null {
        return !not_null;
    }
    if covered_by_prefix {
        return true;
    }
    if !from_main_alias {
        return true;
    }
    if let Some(not_null) = inherited_not_null {
        return !not_null;
    }
    sql_nullable
}
