//! Statement model + annotation overrides

use crate::annotation::{FieldAnnotations, FieldTarget, StatementAnnotations};
use crate::analyzer::{StatementKind, StatementModel};
use crate::error::Diagnostic;

/// A statement model with its annotation overrides merged in.
#[derive(Debug, Clone)]
pub struct AnnotatedStatement {
    pub namespace: String,
    /// Query name (the file stem).
    pub name: String,
    pub model: StatementModel,
    pub statement: StatementAnnotations,
    pub fields: Vec<FieldAnnotations>,
}

impl AnnotatedStatement {
    /// Build the annotated statement, warning about field annotations that
    /// decorate no result column.
    pub fn new(
        namespace: String,
        name: String,
        model: StatementModel,
        statement: StatementAnnotations,
        fields: Vec<FieldAnnotations>,
        warnings: &mut Vec<Diagnostic>,
    ) -> Self {
        if model.kind == StatementKind::Select {
            if let Some(select) = &model.select {
                for field in &fields {
                    if let FieldTarget::Existing(label) = &field.target {
                        let known = select
                            .fields
                            .iter()
                            .any(|f| f.label.eq_ignore_ascii_case(label));
                        if !known {
                            warnings.push(Diagnostic::warning(
                                None,
                                None,
                                format!(
                                    "annotation for field '{label}' matches no result column of query '{name}'"
                                ),
                            ));
                        }
                    }
                }
            }
        }
        Self {
            namespace,
            name,
            model,
            statement,
            fields,
        }
    }

    /// Annotation block for an existing result column, by SQL label.
    pub fn field_annotation(&self, label: &str) -> Option<&FieldAnnotations> {
        self.fields.iter().find(|f| {
            matches!(&f.target, FieldTarget::Existing(name) if name.eq_ignore_ascii_case(label))
        })
    }

    /// Dynamic field declarations, in annotation order.
    pub fn dynamic_fields(&self) -> impl Iterator<Item = &FieldAnnotations> {
        self.fields.iter().filter(|f| f.target.is_dynamic())
    }

    pub fn has_dynamic_mapping(&self) -> bool {
        self.dynamic_fields().next().is_some()
    }

    /// Alias prefixes declared by dynamic fields.
    pub fn dynamic_prefixes(&self) -> Vec<String> {
        self.dynamic_fields()
            .filter_map(|f| f.alias_prefix.clone())
            .collect()
    }

    /// The first FROM/JOIN alias not claimed by a dynamic field's
    /// `sourceTable`; fields from other aliases are inherently optional.
    pub fn main_table_alias(&self) -> Option<String> {
        let select = self.model.select.as_ref()?;
        let claimed: Vec<&str> = self
            .dynamic_fields()
            .filter_map(|f| f.source_table.as_deref())
            .collect();
        select
            .table_aliases()
            .into_iter()
            .map(|(alias, _)| alias)
            .find(|alias| !claimed.iter().any(|c| c.eq_ignore_ascii_case(alias)))
    }
}
