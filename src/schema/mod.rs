//! Schema materialisation
//!
//! Executes the project's DDL against an ephemeral SQLite connection and
//! builds the [`Catalog`] every later phase resolves against.

mod catalog;
mod inspector;

pub use catalog::{
    storage_class_of, Catalog, Column, IndexDef, Relation, StorageClass, Table, View, ViewField,
};
pub use inspector::{inspect, SchemaOutput};
