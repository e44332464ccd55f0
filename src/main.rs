use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use sqlite_querygen::{diagnostic_of, generate, GenerateOptions};

#[derive(Parser)]
#[command(name = "sqlite-querygen")]
#[command(author, version, about = "Code generator for annotated SQLite query files")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate the typed IR for a database project directory
    Generate {
        /// Path to the project directory (containing schema/ and queries/)
        #[arg(short, long)]
        project: PathBuf,

        /// Output path for the IR JSON (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Package name passed through to renderers
        #[arg(long, default_value = "db")]
        package: String,

        /// Materialise the schema into this SQLite file instead of memory
        #[arg(long)]
        database_file: Option<PathBuf>,

        /// Enable verbose output
        #[arg(short, long)]
        debug: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Generate {
            project,
            output,
            package,
            database_file,
            debug,
        } => {
            let options = GenerateOptions {
                project_dir: project,
                package_name: package,
                schema_database_file: database_file,
                debug,
            };

            match generate(options) {
                Ok(generated) => {
                    for warning in &generated.warnings {
                        eprintln!("{warning}");
                    }
                    let json = serde_json::to_string_pretty(&generated.program)?;
                    match output {
                        Some(path) => std::fs::write(&path, json)?,
                        None => println!("{json}"),
                    }
                }
                Err(err) => {
                    eprintln!("{}", diagnostic_of(&err));
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}
