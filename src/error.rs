//! Error types for sqlite-querygen

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// A position in an input file. Line and column are 1-based; `offset` is the
/// byte offset from the start of the file.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct SourceLocation {
    pub file: PathBuf,
    pub line: usize,
    pub column: usize,
    #[serde(skip)]
    pub offset: usize,
}

impl SourceLocation {
    pub fn new(file: impl Into<PathBuf>, line: usize, column: usize, offset: usize) -> Self {
        Self {
            file: file.into(),
            line,
            column,
            offset,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file.display(), self.line, self.column)
    }
}

/// Errors that can occur during pipeline execution
#[derive(Error, Debug)]
pub enum GeneratorError {
    #[error("Failed to read SQL file: {path}")]
    SqlFileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Lex error at {location}: {message}")]
    LexError {
        location: SourceLocation,
        message: String,
    },

    #[error("Schema error in {path} at line {line}: {message}\n{sql}")]
    SchemaError {
        path: PathBuf,
        line: usize,
        message: String,
        sql: String,
    },

    #[error("Annotation error at {location}: {message}\n{annotation}")]
    AnnotationError {
        location: SourceLocation,
        message: String,
        annotation: String,
    },

    #[error("Analysis error in {path} at line {line}: {message}\n{sql}")]
    AnalysisError {
        path: PathBuf,
        line: usize,
        message: String,
        sql: String,
    },

    #[error("Resolution error in {path}: {message}")]
    ResolutionError { path: PathBuf, message: String },

    #[error("Emission error in namespace {namespace}: {message}")]
    EmissionError { namespace: String, message: String },

    #[error("Invalid project layout: {message}")]
    InvalidProjectLayout { message: String },

    #[error("SQLite engine error: {message}")]
    EngineError { message: String },
}

impl From<rusqlite::Error> for GeneratorError {
    fn from(err: rusqlite::Error) -> Self {
        GeneratorError::EngineError {
            message: err.to_string(),
        }
    }
}

/// Severity of a diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum Severity {
    Error,
    Warning,
}

/// The externally visible outcome descriptor: every fatal error and every
/// accumulated warning is delivered to the driver in this shape.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub location: Option<SourceLocation>,
    /// The offending SQL or annotation text, when there is one.
    pub snippet: Option<String>,
    pub message: String,
}

impl Diagnostic {
    pub fn warning(
        location: Option<SourceLocation>,
        snippet: Option<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity: Severity::Warning,
            location,
            snippet,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        match &self.location {
            Some(loc) => write!(f, "{tag}: {loc}: {}", self.message)?,
            None => write!(f, "{tag}: {}", self.message)?,
        }
        if let Some(snippet) = &self.snippet {
            write!(f, "\n  {}", snippet.trim_end())?;
        }
        Ok(())
    }
}

impl GeneratorError {
    /// Convert into the diagnostic shape handed to the driver.
    pub fn to_diagnostic(&self) -> Diagnostic {
        let (location, snippet) = match self {
            GeneratorError::LexError { location, .. } => (Some(location.clone()), None),
            GeneratorError::AnnotationError {
                location,
                annotation,
                ..
            } => (Some(location.clone()), Some(annotation.clone())),
            GeneratorError::SchemaError {
                path, line, sql, ..
            } => (
                Some(SourceLocation::new(path.clone(), *line, 1, 0)),
                Some(sql.clone()),
            ),
            GeneratorError::AnalysisError {
                path, line, sql, ..
            } => (
                Some(SourceLocation::new(path.clone(), *line, 1, 0)),
                Some(sql.clone()),
            ),
            GeneratorError::ResolutionError { path, .. } => {
                (Some(SourceLocation::new(path.clone(), 1, 1, 0)), None)
            }
            GeneratorError::SqlFileReadError { path, .. } => {
                (Some(SourceLocation::new(path.clone(), 1, 1, 0)), None)
            }
            _ => (None, None),
        };
        Diagnostic {
            severity: Severity::Error,
            location,
            snippet,
            message: self.to_string(),
        }
    }
}
