//! Catalog types: the in-memory record of tables and views after DDL
//! execution. Immutable once the inspector finishes.

use std::path::PathBuf;

use crate::annotation::ColumnAnnotations;
use crate::error::GeneratorError;
use crate::util::contains_ci;

/// Maximum view-of-view nesting the resolver will follow.
pub const MAX_VIEW_DEPTH: usize = 16;

/// SQLite storage class derived from the declared column type using the
/// standard affinity rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum StorageClass {
    Integer,
    Real,
    Text,
    Blob,
    Numeric,
}

/// Column affinity per SQLite's declared-type rules.
pub fn storage_class_of(declared: &str) -> StorageClass {
    if declared.is_empty() {
        return StorageClass::Blob;
    }
    if contains_ci(declared, "INT") {
        StorageClass::Integer
    } else if contains_ci(declared, "CHAR")
        || contains_ci(declared, "CLOB")
        || contains_ci(declared, "TEXT")
    {
        StorageClass::Text
    } else if contains_ci(declared, "BLOB") {
        StorageClass::Blob
    } else if contains_ci(declared, "REAL")
        || contains_ci(declared, "FLOA")
        || contains_ci(declared, "DOUB")
    {
        StorageClass::Real
    } else {
        StorageClass::Numeric
    }
}

/// A table column.
#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    /// Declared SQL type as written (`TEXT`, `INTEGER`, `BOOLEAN`, ...).
    pub declared_type: String,
    pub storage: StorageClass,
    pub is_primary_key: bool,
    /// SQL-level nullability. Primary-key columns count as NOT NULL.
    pub is_sql_nullable: bool,
    pub default_expr: Option<String>,
    pub check_constraints: Vec<String>,
    /// Declared BOOLEAN, or constrained to `IN (0, 1)`.
    pub boolean_hint: bool,
    pub annotations: ColumnAnnotations,
}

/// An index attached to a table.
#[derive(Debug, Clone)]
pub struct IndexDef {
    pub name: String,
    pub columns: Vec<String>,
    pub is_unique: bool,
}

/// A table in the catalog.
#[derive(Debug, Clone)]
pub struct Table {
    pub name: String,
    pub columns: Vec<Column>,
    pub indexes: Vec<IndexDef>,
    pub without_rowid: bool,
}

impl Table {
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }
}

/// A field exposed by a view.
#[derive(Debug, Clone)]
pub struct ViewField {
    /// The label the view exposes.
    pub alias: String,
    /// Alias of the source relation inside the view's own FROM/JOINs.
    pub source_alias: Option<String>,
    /// Column name in the source relation, when the field is a plain
    /// projection rather than an expression.
    pub original_column: Option<String>,
    pub declared_type: Option<String>,
    pub annotations: Option<ColumnAnnotations>,
}

/// A view in the catalog. The select shape records the view's FROM/JOIN
/// aliases so field resolution can descend into source relations.
#[derive(Debug, Clone)]
pub struct View {
    pub name: String,
    /// alias -> relation name, FROM relation first, then JOINs in order.
    pub table_aliases: Vec<(String, String)>,
    pub fields: Vec<ViewField>,
    pub collection_key: Option<String>,
}

impl View {
    pub fn field(&self, alias: &str) -> Option<&ViewField> {
        self.fields
            .iter()
            .find(|f| f.alias.eq_ignore_ascii_case(alias))
    }

    pub fn alias_target(&self, alias: &str) -> Option<&str> {
        self.table_aliases
            .iter()
            .find(|(a, _)| a.eq_ignore_ascii_case(alias))
            .map(|(_, t)| t.as_str())
    }
}

/// A named relation: table or view.
#[derive(Debug, Clone, Copy)]
pub enum Relation<'a> {
    Table(&'a Table),
    View(&'a View),
}

impl<'a> Relation<'a> {
    pub fn name(&self) -> &str {
        match self {
            Relation::Table(t) => &t.name,
            Relation::View(v) => &v.name,
        }
    }
}

/// The complete schema catalog.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    tables: Vec<Table>,
    views: Vec<View>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_table(&mut self, table: Table, file: &PathBuf, line: usize) -> Result<(), GeneratorError> {
        if self.relation(&table.name).is_some() {
            return Err(GeneratorError::SchemaError {
                path: file.clone(),
                line,
                message: format!("duplicate table or view name '{}'", table.name),
                sql: String::new(),
            });
        }
        self.tables.push(table);
        Ok(())
    }

    pub fn add_view(&mut self, view: View, file: &PathBuf, line: usize) -> Result<(), GeneratorError> {
        if self.relation(&view.name).is_some() {
            return Err(GeneratorError::SchemaError {
                path: file.clone(),
                line,
                message: format!("duplicate table or view name '{}'", view.name),
                sql: String::new(),
            });
        }
        self.views.push(view);
        Ok(())
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
    }

    pub fn table_mut(&mut self, name: &str) -> Option<&mut Table> {
        self.tables
            .iter_mut()
            .find(|t| t.name.eq_ignore_ascii_case(name))
    }

    pub fn view(&self, name: &str) -> Option<&View> {
        self.views
            .iter()
            .find(|v| v.name.eq_ignore_ascii_case(name))
    }

    pub fn relation(&self, name: &str) -> Option<Relation<'_>> {
        if let Some(table) = self.table(name) {
            return Some(Relation::Table(table));
        }
        self.view(name).map(Relation::View)
    }

    /// Drop relations no longer present after migrations.
    pub fn retain_relations(&mut self, names: &[String]) {
        self.tables
            .retain(|t| names.iter().any(|n| n.eq_ignore_ascii_case(&t.name)));
        self.views
            .retain(|v| names.iter().any(|n| n.eq_ignore_ascii_case(&v.name)));
    }

    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.iter()
    }

    pub fn views(&self) -> impl Iterator<Item = &View> {
        self.views.iter()
    }

    /// The set of base tables a relation ultimately reads from. For a table
    /// this is the table itself; for a view, every table reachable through
    /// its FROM/JOIN closure (nested views included).
    pub fn base_tables_of(&self, name: &str) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        let mut visited: Vec<String> = Vec::new();
        self.collect_base_tables(name, &mut out, &mut visited, 0);
        out
    }

    fn collect_base_tables(
        &self,
        name: &str,
        out: &mut Vec<String>,
        visited: &mut Vec<String>,
        depth: usize,
    ) {
        if depth > MAX_VIEW_DEPTH || visited.iter().any(|v| v.eq_ignore_ascii_case(name)) {
            return;
        }
        visited.push(name.to_string());
        match self.relation(name) {
            Some(Relation::Table(table)) => {
                if !out.iter().any(|t| t.eq_ignore_ascii_case(&table.name)) {
                    out.push(table.name.clone());
                }
            }
            Some(Relation::View(view)) => {
                for (_, target) in &view.table_aliases {
                    self.collect_base_tables(target, out, visited, depth + 1);
                }
            }
            None => {}
        }
    }

    /// Validate that every view's sources resolve and that no view cycle
    /// exists within the nesting limit.
    pub fn validate_view_closure(&self, file: &PathBuf) -> Result<(), GeneratorError> {
        for view in &self.views {
            let mut visited: Vec<String> = Vec::new();
            self.check_view(view, &mut visited, 0, file)?;
        }
        Ok(())
    }

    fn check_view(
        &self,
        view: &View,
        visited: &mut Vec<String>,
        depth: usize,
        file: &PathBuf,
    ) -> Result<(), GeneratorError> {
        if depth > MAX_VIEW_DEPTH {
            return Err(GeneratorError::ResolutionError {
                path: file.clone(),
                message: format!(
                    "view nesting exceeds {MAX_VIEW_DEPTH} levels resolving '{}'",
                    view.name
                ),
            });
        }
        if visited.iter().any(|v| v.eq_ignore_ascii_case(&view.name)) {
            return Err(GeneratorError::ResolutionError {
                path: file.clone(),
                message: format!("circular view definition involving '{}'", view.name),
            });
        }
        visited.push(view.name.clone());
        for (alias, target) in &view.table_aliases {
            match self.relation(target) {
                Some(Relation::View(nested)) => {
                    self.check_view(nested, visited, depth + 1, file)?;
                }
                Some(Relation::Table(_)) => {}
                None => {
                    return Err(GeneratorError::SchemaError {
                        path: file.clone(),
                        line: 0,
                        message: format!(
                            "view '{}' references unknown table or view '{target}' (alias '{alias}')",
                            view.name
                        ),
                        sql: String::new(),
                    });
                }
            }
        }
        visited.pop();
        Ok(())
    }
}
