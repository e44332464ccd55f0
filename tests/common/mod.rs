//! Shared helpers for building throwaway database projects on disk.

use std::fs;
use std::path::Path;

use tempfile::TempDir;

use sqlite_querygen::{generate, GenerateOptions, GeneratedOutput};

/// A temp directory with the `<db>/` project layout.
pub struct TestProject {
    dir: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("create temp project"),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    fn write(&self, relative: &str, content: &str) {
        let path = self.dir.path().join(relative);
        fs::create_dir_all(path.parent().unwrap()).expect("create parent dir");
        fs::write(&path, content).expect("write project file");
    }

    pub fn schema(&self, name: &str, content: &str) -> &Self {
        self.write(&format!("schema/{name}"), content);
        self
    }

    pub fn init(&self, name: &str, content: &str) -> &Self {
        self.write(&format!("init/{name}"), content);
        self
    }

    pub fn migration(&self, name: &str, content: &str) -> &Self {
        self.write(&format!("migration/{name}"), content);
        self
    }

    pub fn query(&self, namespace: &str, name: &str, content: &str) -> &Self {
        self.write(&format!("queries/{namespace}/{name}.sql"), content);
        self
    }
}

/// Run the full pipeline over the project with default options.
pub fn run(project: &TestProject) -> anyhow::Result<GeneratedOutput> {
    generate(GenerateOptions {
        project_dir: project.root().to_path_buf(),
        package_name: "test.db".to_string(),
        schema_database_file: None,
        debug: false,
    })
}

/// Run the pipeline, panicking on failure.
pub fn run_ok(project: &TestProject) -> GeneratedOutput {
    match run(project) {
        Ok(output) => output,
        Err(err) => panic!("pipeline failed: {err:#}"),
    }
}
