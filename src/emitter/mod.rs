//! IR emission
//!
//! Walks annotated statements and mapping plans, producing the
//! per-namespace [`IrProgram`] a renderer consumes.

mod adapters;
mod emit;
mod ir;

pub use adapters::{AdapterCandidate, AdapterRegistry};
pub use emit::emit_namespace;
pub use ir::{
    AdapterDirection, AdapterSignature, IrField, IrFieldMapping, IrNamespace, IrProgram,
    JoinedRecord, ParameterRecord, QueryFunction, ResultRecord,
};
