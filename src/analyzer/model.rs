//! Statement model types produced by the analyzer

use std::path::PathBuf;

/// Statement kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
}

/// A relation in a FROM/JOIN list. `alias` falls back to the relation name
/// when no explicit alias is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub alias: String,
    pub table: String,
}

/// An equality join condition `left_alias.left_column = right_alias.right_column`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinCondition {
    pub left_alias: String,
    pub left_column: String,
    pub right_alias: String,
    pub right_column: String,
}

/// A column a named parameter binds against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnBinding {
    pub alias: Option<String>,
    pub column: String,
}

/// One result-set column with its inferred origin.
#[derive(Debug, Clone)]
pub struct FieldSource {
    /// Result label as reported by the engine.
    pub label: String,
    /// FROM/JOIN alias the field originates from, when resolvable.
    pub source_alias: Option<String>,
    /// Column name in the source relation for plain projections.
    pub original_column: Option<String>,
    /// Declared SQL type of the originating column.
    pub declared_type: Option<String>,
    /// True when the field is a computed expression rather than a column.
    pub is_expression: bool,
}

/// The SELECT-specific part of a statement model. Also used for the select
/// shape of views.
#[derive(Debug, Clone, Default)]
pub struct SelectModel {
    pub from_table: Option<TableRef>,
    pub join_tables: Vec<TableRef>,
    pub join_conditions: Vec<JoinCondition>,
    pub fields: Vec<FieldSource>,
    pub limit_param: Option<String>,
    pub offset_param: Option<String>,
    /// WHERE-clause parameter -> column pairings, in appearance order.
    pub where_params: Vec<(String, ColumnBinding)>,
}

impl SelectModel {
    /// alias -> relation name pairs, FROM relation first.
    pub fn table_aliases(&self) -> Vec<(String, String)> {
        self.from_table
            .iter()
            .chain(self.join_tables.iter())
            .map(|t| (t.alias.clone(), t.table.clone()))
            .collect()
    }

    pub fn alias_target(&self, alias: &str) -> Option<&str> {
        self.from_table
            .iter()
            .chain(self.join_tables.iter())
            .find(|t| t.alias.eq_ignore_ascii_case(alias))
            .map(|t| t.table.as_str())
    }
}

/// The INSERT/UPDATE/DELETE-specific part of a statement model.
#[derive(Debug, Clone, Default)]
pub struct DmlModel {
    pub target_table: String,
    /// Parameter -> column for INSERT values or UPDATE SET assignments.
    pub value_params: Vec<(String, String)>,
    /// Parameter -> column for WHERE predicates.
    pub where_params: Vec<(String, String)>,
}

/// A captured RETURNING list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReturningClause {
    Star,
    Columns(Vec<String>),
}

/// The raw analysis result for one statement, before annotation merging.
#[derive(Debug, Clone)]
pub struct StatementModel {
    pub kind: StatementKind,
    pub source_path: PathBuf,
    pub line: usize,
    /// Statement text with named parameters rewritten to `?`.
    pub sql: String,
    /// Distinct parameter names in first-occurrence order.
    pub named_parameters: Vec<String>,
    /// Every placeholder occurrence in positional order (duplicates kept).
    pub parameter_occurrences: Vec<String>,
    /// Explicit `CAST(:name AS TYPE)` hints, in discovery order.
    pub parameter_cast_types: Vec<(String, String)>,
    pub select: Option<SelectModel>,
    pub dml: Option<DmlModel>,
    pub returning: Option<ReturningClause>,
    /// Shapes of WITH-clause SELECTs, in declaration order.
    pub with_selects: Vec<SelectModel>,
}

impl StatementModel {
    pub fn cast_type_of(&self, param: &str) -> Option<&str> {
        self.parameter_cast_types
            .iter()
            .find(|(name, _)| name == param)
            .map(|(_, ty)| ty.as_str())
    }

    /// The column a parameter binds against, searching WHERE pairings and
    /// DML value pairings in order.
    pub fn binding_of(&self, param: &str) -> Option<ColumnBinding> {
        if let Some(select) = &self.select {
            if let Some((_, binding)) = select.where_params.iter().find(|(name, _)| name == param) {
                return Some(binding.clone());
            }
        }
        if let Some(dml) = &self.dml {
            if let Some((_, column)) = dml.value_params.iter().find(|(name, _)| name == param) {
                return Some(ColumnBinding {
                    alias: None,
                    column: column.clone(),
                });
            }
            if let Some((_, column)) = dml.where_params.iter().find(|(name, _)| name == param) {
                return Some(ColumnBinding {
                    alias: None,
                    column: column.clone(),
                });
            }
        }
        None
    }
}
