//! Input project tree discovery
//!
//! A database project is a directory with the layout:
//!
//! ```text
//! <db>/
//!   schema/*.sql        DDL (tables, views, indexes)
//!   init/*.sql          optional seed data for query preparation
//!   migration/NNN_*.sql migration scripts, NNN an increasing integer
//!   queries/<ns>/*.sql  one query per file; file stem = query name
//! ```
//!
//! Discovery is deterministic: files are returned in lexicographic order,
//! migrations in version order.

use std::path::{Path, PathBuf};

use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use walkdir::WalkDir;

use crate::error::GeneratorError;

static MIGRATION_VERSION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)").expect("migration version regex"));

/// A migration script with its parsed version prefix.
#[derive(Debug, Clone)]
pub struct MigrationFile {
    pub version: u64,
    pub path: PathBuf,
}

/// A single query file.
#[derive(Debug, Clone)]
pub struct QueryFile {
    /// File stem; becomes the query name in the IR.
    pub name: String,
    pub path: PathBuf,
}

/// A directory under `queries/`; becomes an IR namespace.
#[derive(Debug, Clone)]
pub struct QueryNamespace {
    pub name: String,
    pub files: Vec<QueryFile>,
}

/// The discovered project tree.
#[derive(Debug, Clone)]
pub struct DbProject {
    pub root: PathBuf,
    pub schema_files: Vec<PathBuf>,
    pub init_files: Vec<PathBuf>,
    pub migrations: Vec<MigrationFile>,
    pub namespaces: Vec<QueryNamespace>,
}

/// Discover the project layout under `root`.
pub fn discover(root: &Path) -> Result<DbProject> {
    if !root.is_dir() {
        return Err(GeneratorError::InvalidProjectLayout {
            message: format!("project directory not found: {}", root.display()),
        }
        .into());
    }

    let schema_files = sql_files_in(&root.join("schema"))?;
    let init_files = sql_files_in(&root.join("init"))?;
    let migrations = migration_files_in(&root.join("migration"))?;

    if schema_files.is_empty() && migrations.is_empty() {
        return Err(GeneratorError::InvalidProjectLayout {
            message: format!(
                "no DDL found: neither schema/ nor migration/ under {}",
                root.display()
            ),
        }
        .into());
    }

    let namespaces = namespaces_in(&root.join("queries"))?;

    Ok(DbProject {
        root: root.to_path_buf(),
        schema_files,
        init_files,
        migrations,
        namespaces,
    })
}

/// All `.sql` files directly inside `dir`, lexicographically ordered.
/// A missing directory yields an empty list.
fn sql_files_in(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files: Vec<PathBuf> = Vec::new();
    for entry in WalkDir::new(dir)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
    {
        let entry = entry?;
        if entry.file_type().is_file() && has_sql_extension(entry.path()) {
            files.push(entry.path().to_path_buf());
        }
    }
    Ok(files)
}

fn migration_files_in(dir: &Path) -> Result<Vec<MigrationFile>> {
    let mut migrations: Vec<MigrationFile> = Vec::new();
    for path in sql_files_in(dir)? {
        let stem = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        let version = MIGRATION_VERSION_RE
            .captures(stem)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<u64>().ok())
            .ok_or_else(|| GeneratorError::InvalidProjectLayout {
                message: format!(
                    "migration file name must start with an integer version: {}",
                    path.display()
                ),
            })?;
        if migrations.iter().any(|m| m.version == version) {
            return Err(GeneratorError::InvalidProjectLayout {
                message: format!("duplicate migration version {version}: {}", path.display()),
            }
            .into());
        }
        migrations.push(MigrationFile { version, path });
    }
    migrations.sort_by_key(|m| m.version);
    Ok(migrations)
}

fn namespaces_in(dir: &Path) -> Result<Vec<QueryNamespace>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    // Loose .sql files directly under queries/ have no namespace to land in.
    for entry in WalkDir::new(dir).max_depth(1).sort_by_file_name() {
        let entry = entry?;
        if entry.file_type().is_file() && has_sql_extension(entry.path()) {
            return Err(GeneratorError::InvalidProjectLayout {
                message: format!(
                    "query files must live in a namespace directory: {}",
                    entry.path().display()
                ),
            }
            .into());
        }
    }

    let mut namespaces: Vec<QueryNamespace> = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry?;
        if !entry.file_type().is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        let mut files = Vec::new();
        for path in sql_files_in(entry.path())? {
            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string();
            files.push(QueryFile { name: stem, path });
        }
        if !files.is_empty() {
            namespaces.push(QueryNamespace { name, files });
        }
    }
    Ok(namespaces)
}

fn has_sql_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("sql"))
        .unwrap_or(false)
}
