//! Type and mapping resolution
//!
//! Fuses the analyzer's statement model with the parsed annotations and the
//! catalog: column lookup across views, nullability rules, target-type
//! resolution and the per-SELECT result mapping plan.

mod annotated;
mod lookup;
mod mapping;
mod types;

pub use annotated::AnnotatedStatement;
pub use lookup::{resolve_field_column, resolve_relation_column, ColumnResolution};
pub use mapping::{
    build_mapping_plan, resolve_joined_property_names, JoinedField, MappingNode, ResolvedField,
    ResultMappingPlan,
};
pub use types::{
    column_base_type, column_target_type, parse_property_type, resolve_field_nullability,
    resolve_parameter_types, storage_base_type, IrType, ResolvedParameter,
};
