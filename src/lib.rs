//! sqlite-querygen: a build-time code generator for annotated SQLite
//! projects
//!
//! Compiles a directory tree of SQL files (schema DDL, migrations, seed
//! data and one-query-per-file query directories) into a typed intermediate
//! representation. Renderers for any target language consume the IR; this
//! crate owns schema materialisation, annotation-driven type inference and
//! result-shape synthesis.

pub mod analyzer;
pub mod annotation;
pub mod emitter;
pub mod error;
pub mod lexer;
pub mod project;
pub mod resolver;
pub mod schema;
pub mod util;

use std::path::PathBuf;

use anyhow::Result;

pub use emitter::IrProgram;
pub use error::{Diagnostic, GeneratorError, Severity};

use analyzer::StatementKind;

/// Options for one generator run
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    /// Path to the database project directory (containing `schema/`,
    /// `queries/`, and optionally `init/` and `migration/`).
    pub project_dir: PathBuf,
    /// Package name passed through verbatim to renderers.
    pub package_name: String,
    /// Materialise the schema into this file instead of memory.
    pub schema_database_file: Option<PathBuf>,
    /// Enable verbose output
    pub debug: bool,
}

/// A successful run: the IR plus accumulated warnings.
#[derive(Debug)]
pub struct GeneratedOutput {
    pub program: IrProgram,
    pub warnings: Vec<Diagnostic>,
}

/// Run the whole pipeline over a project directory.
pub fn generate(options: GenerateOptions) -> Result<GeneratedOutput> {
    // Step 1: Discover the project layout
    let project = project::discover(&options.project_dir)?;

    if options.debug {
        println!(
            "Found {} schema files, {} migrations, {} namespaces",
            project.schema_files.len(),
            project.migrations.len(),
            project.namespaces.len()
        );
    }

    // Step 2: Materialise the schema and build the catalog
    let schema = schema::inspect(
        &project,
        options.schema_database_file.as_deref(),
        options.debug,
    )?;

    if options.debug {
        println!(
            "Catalog holds {} tables and {} views",
            schema.catalog.tables().count(),
            schema.catalog.views().count()
        );
        if let Some(version) = schema.applied_migration_version {
            println!("Applied migrations up to version {version}");
        }
    }

    // Steps 3-5: analyze, resolve and emit every namespace
    let mut warnings: Vec<Diagnostic> = Vec::new();
    let mut namespaces = Vec::new();

    for namespace in &project.namespaces {
        let mut items = Vec::new();
        for query in &namespace.files {
            let text = std::fs::read_to_string(&query.path).map_err(|source| {
                GeneratorError::SqlFileReadError {
                    path: query.path.clone(),
                    source,
                }
            })?;
            let blocks = lexer::split(&query.path, &text)?;
            if blocks.len() != 1 {
                return Err(GeneratorError::AnalysisError {
                    path: query.path.clone(),
                    line: 1,
                    message: format!(
                        "query files must contain exactly one statement, found {}",
                        blocks.len()
                    ),
                    sql: text,
                }
                .into());
            }
            let block = &blocks[0];

            let comments: Vec<_> = block.all_comments().cloned().collect();
            let annotation_blocks = annotation::extract_annotations(&query.path, &comments)?;
            let (statement_blocks, field_annotations) =
                annotation::classify_field_blocks(&annotation_blocks)?;
            let statement_annotations =
                annotation::parse_statement_annotations(&statement_blocks)?;

            let prefixes: Vec<String> = field_annotations
                .iter()
                .filter(|f| f.target.is_dynamic())
                .filter_map(|f| f.alias_prefix.clone())
                .collect();

            let model = analyzer::analyze_statement(
                &query.path,
                block,
                &schema.catalog,
                &schema.conn,
                &prefixes,
            )?;

            let annotated = resolver::AnnotatedStatement::new(
                namespace.name.clone(),
                query.name.clone(),
                model,
                statement_annotations,
                field_annotations,
                &mut warnings,
            );

            let plan = if annotated.model.kind == StatementKind::Select {
                Some(resolver::build_mapping_plan(
                    &schema.catalog,
                    &annotated,
                    &mut warnings,
                )?)
            } else {
                None
            };

            items.push((annotated, plan));
        }

        let emitted =
            emitter::emit_namespace(&schema.catalog, &namespace.name, &items, &mut warnings)?;
        if options.debug {
            println!(
                "Namespace '{}': {} queries, {} records, {} adapters",
                emitted.name,
                emitted.functions.len(),
                emitted.result_records.len(),
                emitted.adapters.len()
            );
        }
        namespaces.push(emitted);
    }

    Ok(GeneratedOutput {
        program: IrProgram {
            package_name: options.package_name,
            namespaces,
        },
        warnings,
    })
}

/// Convert a pipeline failure into the structured diagnostic drivers report.
pub fn diagnostic_of(err: &anyhow::Error) -> Diagnostic {
    match err.downcast_ref::<GeneratorError>() {
        Some(generator_err) => generator_err.to_diagnostic(),
        None => Diagnostic {
            severity: Severity::Error,
            location: None,
            snippet: None,
            message: err.to_string(),
        },
    }
}
