//! The intermediate representation consumed by renderers.
//!
//! Field order is meaningful everywhere: result fields follow SQL column
//! order, parameters follow declaration order, adapters follow discovery
//! order. Serialization is stable so identical inputs produce identical
//! output bytes.

use serde::Serialize;

use crate::analyzer::StatementKind;
use crate::annotation::MappingType;
use crate::resolver::IrType;

/// The whole program: one entry per query-file namespace.
#[derive(Debug, Clone, Serialize)]
pub struct IrProgram {
    pub package_name: String,
    pub namespaces: Vec<IrNamespace>,
}

/// Everything emitted for one `queries/<ns>/` directory.
#[derive(Debug, Clone, Serialize)]
pub struct IrNamespace {
    pub name: String,
    /// Container class name: `PascalCase(namespace) + "Query"`.
    pub query_class: String,
    pub functions: Vec<QueryFunction>,
    pub parameter_records: Vec<ParameterRecord>,
    pub result_records: Vec<ResultRecord>,
    pub joined_records: Vec<JoinedRecord>,
    pub adapters: Vec<AdapterSignature>,
}

/// One generated query function.
#[derive(Debug, Clone, Serialize)]
pub struct QueryFunction {
    pub name: String,
    pub kind: StatementKind,
    /// Statement text with positional placeholders.
    pub sql: String,
    /// Placeholder occurrences in bind order (parameter names, duplicates kept).
    pub bind_order: Vec<String>,
    pub parameter_record: String,
    pub result_record: Option<String>,
    pub joined_record: Option<String>,
    pub required_adapters: Vec<String>,
    pub affected_tables: Vec<String>,
}

/// A single record field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IrField {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: IrType,
    pub nullable: bool,
    /// SQL label or parameter name this field was generated from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_column: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mapping: Option<IrFieldMapping>,
}

/// Dynamic-field assembly info attached to a result field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IrFieldMapping {
    pub mapping_type: MappingType,
    pub alias_prefix: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection_key: Option<String>,
    /// Joined-record property names feeding this field.
    pub source_columns: Vec<String>,
}

/// The parameter record of one query.
#[derive(Debug, Clone, Serialize)]
pub struct ParameterRecord {
    pub name: String,
    pub fields: Vec<IrField>,
}

/// A result (or nested/element) record.
#[derive(Debug, Clone, Serialize)]
pub struct ResultRecord {
    pub name: String,
    pub fields: Vec<IrField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub implements: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub exclude_override_fields: Vec<String>,
    /// Field names the exclusion patterns matched, precomputed for renderers.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub excluded_override_properties: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub map_to: Option<String>,
}

/// The flat row shape backing a dynamically mapped result.
#[derive(Debug, Clone, Serialize)]
pub struct JoinedRecord {
    pub name: String,
    pub fields: Vec<IrField>,
}

/// Value conversion direction of an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AdapterDirection {
    InputToSql,
    SqlToOutput,
}

/// A user-supplied value <-> SQL conversion the generated code requires.
#[derive(Debug, Clone, Serialize)]
pub struct AdapterSignature {
    pub name: String,
    pub input_type: IrType,
    pub output_type: IrType,
    pub direction: AdapterDirection,
}
