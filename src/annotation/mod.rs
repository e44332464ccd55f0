//! Annotation extraction from SQL comments
//!
//! Annotations are `@@{ key=value, ... }` blocks embedded in line or block
//! comments. They are parsed into an ordered [`AnnotationMap`] and then
//! validated per context (column DDL, statement, SELECT field) into typed
//! override structs.

mod overrides;
mod parser;
mod value;

pub use overrides::{
    classify_field_blocks, parse_column_annotations, parse_statement_annotations, ColumnAnnotations,
    FieldAnnotations, FieldTarget, MappingType, NameStyle, StatementAnnotations,
};
pub use parser::{extract_annotations, AnnotationBlock};
pub use value::{AnnotationMap, AnnotationValue};
