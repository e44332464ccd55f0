//! Typed annotation overrides per context (column DDL, statement, field)

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::GeneratorError;
use crate::util::{lower_camel_case, snake_case};

use super::parser::AnnotationBlock;
use super::value::AnnotationValue;

/// Fully-qualified type name, optionally with a single generic argument
/// (`List<T>` is the only generic the generator recognises).
static TYPE_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*(<[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*>)?$",
    )
    .expect("type name regex")
});

/// Per-statement property naming policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub enum NameStyle {
    #[default]
    LowerCamelCase,
    SnakeCase,
}

impl NameStyle {
    pub fn apply(&self, ident: &str) -> String {
        match self {
            NameStyle::LowerCamelCase => lower_camel_case(ident),
            NameStyle::SnakeCase => snake_case(ident),
        }
    }
}

/// How a dynamic field assembles its value from joined columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum MappingType {
    PerRow,
    Entity,
    Collection,
}

impl MappingType {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "perRow" => Some(MappingType::PerRow),
            "entity" => Some(MappingType::Entity),
            "collection" => Some(MappingType::Collection),
            _ => None,
        }
    }
}

/// Which result field a SELECT annotation block decorates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldTarget {
    /// Binds to the result field with this SQL label (`field=` key).
    Existing(String),
    /// Declares a synthetic field with this name (`dynamicField=` key).
    Dynamic(String),
}

impl FieldTarget {
    pub fn name(&self) -> &str {
        match self {
            FieldTarget::Existing(name) | FieldTarget::Dynamic(name) => name,
        }
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, FieldTarget::Dynamic(_))
    }
}

/// Overrides attached to a table column in DDL.
#[derive(Debug, Clone, Default)]
pub struct ColumnAnnotations {
    pub property_name: Option<String>,
    pub property_type: Option<String>,
    pub not_null: Option<bool>,
    pub custom_adapter: bool,
    pub sql_type_hint: Option<String>,
    /// Unknown keys, preserved verbatim in order.
    pub extras: Vec<(String, String)>,
}

/// Statement-level overrides of a query.
#[derive(Debug, Clone, Default)]
pub struct StatementAnnotations {
    pub query_result: Option<String>,
    pub implements: Option<String>,
    pub exclude_override_fields: Vec<String>,
    pub map_to: Option<String>,
    pub collection_key: Option<String>,
    pub name_style: NameStyle,
    pub extras: Vec<(String, String)>,
}

/// Overrides attached to a single result field of a SELECT.
#[derive(Debug, Clone)]
pub struct FieldAnnotations {
    pub target: FieldTarget,
    pub property_name: Option<String>,
    pub property_type: Option<String>,
    pub not_null: Option<bool>,
    pub custom_adapter: bool,
    pub mapping_type: Option<MappingType>,
    pub source_table: Option<String>,
    pub alias_prefix: Option<String>,
    pub collection_key: Option<String>,
    pub extras: Vec<(String, String)>,
}

fn annotation_error(block: &AnnotationBlock, message: impl Into<String>) -> GeneratorError {
    GeneratorError::AnnotationError {
        location: block.location.clone(),
        message: message.into(),
        annotation: block.raw.clone(),
    }
}

fn string_value(
    block: &AnnotationBlock,
    key: &str,
    value: &AnnotationValue,
) -> Result<String, GeneratorError> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| annotation_error(block, format!("'{key}' expects a string value")))
}

fn bool_value(
    block: &AnnotationBlock,
    key: &str,
    value: &AnnotationValue,
) -> Result<bool, GeneratorError> {
    match value {
        AnnotationValue::Bool(b) => Ok(*b),
        _ => Err(annotation_error(block, format!("'{key}' expects true or false"))),
    }
}

fn type_name_value(
    block: &AnnotationBlock,
    key: &str,
    value: &AnnotationValue,
) -> Result<String, GeneratorError> {
    let name = string_value(block, key, value)?;
    if !TYPE_NAME_RE.is_match(&name) {
        return Err(annotation_error(
            block,
            format!("'{name}' is not a valid fully-qualified type name"),
        ));
    }
    Ok(name)
}

/// Partition a DDL statement's annotation blocks into per-column overrides
/// (blocks carrying a `field=` key) and leftover statement-level blocks.
pub fn parse_column_annotations(
    blocks: &[AnnotationBlock],
) -> Result<(Vec<(String, ColumnAnnotations)>, Vec<AnnotationBlock>), GeneratorError> {
    let mut columns: Vec<(String, ColumnAnnotations)> = Vec::new();
    let mut statement_blocks = Vec::new();

    for block in blocks {
        let Some(field_value) = block.entries.get("field") else {
            statement_blocks.push(block.clone());
            continue;
        };
        let column_name = string_value(block, "field", field_value)?;
        if columns
            .iter()
            .any(|(name, _)| name.eq_ignore_ascii_case(&column_name))
        {
            return Err(annotation_error(
                block,
                format!("column '{column_name}' is annotated more than once"),
            ));
        }

        let mut annotations = ColumnAnnotations::default();
        for (key, value) in block.entries.iter() {
            match key {
                "field" => {}
                "propertyName" => annotations.property_name = Some(string_value(block, key, value)?),
                "propertyType" => {
                    annotations.property_type = Some(type_name_value(block, key, value)?)
                }
                "notNull" => annotations.not_null = Some(bool_value(block, key, value)?),
                "adapter" => {
                    let v = string_value(block, key, value)?;
                    if v != "custom" {
                        return Err(annotation_error(
                            block,
                            format!("'adapter' expects 'custom', got '{v}'"),
                        ));
                    }
                    annotations.custom_adapter = true;
                }
                "sqlTypeHint" => annotations.sql_type_hint = Some(string_value(block, key, value)?),
                _ => annotations.extras.push((key.to_string(), value.to_string())),
            }
        }
        columns.push((column_name, annotations));
    }

    Ok((columns, statement_blocks))
}

/// Merge statement-level blocks into one [`StatementAnnotations`].
/// The same key appearing in two blocks of one statement is an error.
pub fn parse_statement_annotations(
    blocks: &[AnnotationBlock],
) -> Result<StatementAnnotations, GeneratorError> {
    let mut result = StatementAnnotations::default();
    let mut seen: Vec<String> = Vec::new();

    for block in blocks {
        for (key, value) in block.entries.iter() {
            if seen.iter().any(|k| k == key) {
                return Err(annotation_error(
                    block,
                    format!("statement annotation key '{key}' appears more than once"),
                ));
            }
            seen.push(key.to_string());
            match key {
                "queryResult" => result.query_result = Some(string_value(block, key, value)?),
                "implements" => result.implements = Some(type_name_value(block, key, value)?),
                "excludeOverrideFields" => {
                    result.exclude_override_fields = value.as_list().ok_or_else(|| {
                        annotation_error(block, "'excludeOverrideFields' expects a list")
                    })?;
                }
                "mapTo" => result.map_to = Some(type_name_value(block, key, value)?),
                "collectionKey" => result.collection_key = Some(string_value(block, key, value)?),
                "propertyNameGenerator" => {
                    let v = string_value(block, key, value)?;
                    result.name_style = match v.as_str() {
                        "lowerCamelCase" => NameStyle::LowerCamelCase,
                        "snakeCase" => NameStyle::SnakeCase,
                        _ => {
                            return Err(annotation_error(
                                block,
                                format!(
                                    "'propertyNameGenerator' expects lowerCamelCase or snakeCase, got '{v}'"
                                ),
                            ))
                        }
                    };
                }
                _ => result.extras.push((key.to_string(), value.to_string())),
            }
        }
    }

    Ok(result)
}

/// Partition a query statement's annotation blocks into statement-level
/// blocks and per-field overrides. Field blocks carry `field=` (decorating
/// an existing result column) or `dynamicField=` (declaring a synthetic
/// field, which requires `mappingType`, `sourceTable` and `aliasPrefix`).
pub fn classify_field_blocks(
    blocks: &[AnnotationBlock],
) -> Result<(Vec<AnnotationBlock>, Vec<FieldAnnotations>), GeneratorError> {
    let mut statement_blocks = Vec::new();
    let mut fields: Vec<FieldAnnotations> = Vec::new();

    for block in blocks {
        let target = match (block.entries.get("field"), block.entries.get("dynamicField")) {
            (Some(_), Some(_)) => {
                return Err(annotation_error(
                    block,
                    "a block cannot carry both 'field' and 'dynamicField'",
                ));
            }
            (Some(v), None) => FieldTarget::Existing(string_value(block, "field", v)?),
            (None, Some(v)) => FieldTarget::Dynamic(string_value(block, "dynamicField", v)?),
            (None, None) => {
                statement_blocks.push(block.clone());
                continue;
            }
        };

        if fields
            .iter()
            .any(|f| f.target.name().eq_ignore_ascii_case(target.name()))
        {
            return Err(annotation_error(
                block,
                format!("field '{}' is annotated more than once", target.name()),
            ));
        }

        let mut annotations = FieldAnnotations {
            target,
            property_name: None,
            property_type: None,
            not_null: None,
            custom_adapter: false,
            mapping_type: None,
            source_table: None,
            alias_prefix: None,
            collection_key: None,
            extras: Vec::new(),
        };

        for (key, value) in block.entries.iter() {
            match key {
                "field" | "dynamicField" => {}
                "propertyName" => annotations.property_name = Some(string_value(block, key, value)?),
                "propertyType" => {
                    annotations.property_type = Some(type_name_value(block, key, value)?)
                }
                "notNull" => annotations.not_null = Some(bool_value(block, key, value)?),
                "adapter" => {
                    let v = string_value(block, key, value)?;
                    if v != "custom" {
                        return Err(annotation_error(
                            block,
                            format!("'adapter' expects 'custom', got '{v}'"),
                        ));
                    }
                    annotations.custom_adapter = true;
                }
                "mappingType" => {
                    let v = string_value(block, key, value)?;
                    annotations.mapping_type = Some(MappingType::parse(&v).ok_or_else(|| {
                        annotation_error(
                            block,
                            format!("'mappingType' expects perRow, entity or collection, got '{v}'"),
                        )
                    })?);
                }
                "sourceTable" => annotations.source_table = Some(string_value(block, key, value)?),
                "aliasPrefix" => annotations.alias_prefix = Some(string_value(block, key, value)?),
                "collectionKey" => annotations.collection_key = Some(string_value(block, key, value)?),
                _ => annotations.extras.push((key.to_string(), value.to_string())),
            }
        }

        if annotations.target.is_dynamic() {
            for (key, present) in [
                ("mappingType", annotations.mapping_type.is_some()),
                ("sourceTable", annotations.source_table.is_some()),
                ("aliasPrefix", annotations.alias_prefix.is_some()),
            ] {
                if !present {
                    return Err(annotation_error(
                        block,
                        format!(
                            "dynamic field '{}' is missing required key '{key}'",
                            annotations.target.name()
                        ),
                    ));
                }
            }
        }

        fields.push(annotations);
    }

    Ok((statement_blocks, fields))
}
