//! resync CLI - diff schema descriptions and migrate table data.

mod config;
mod migrate;
mod output;

use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;
use resync::{CompareOptions, SchemaError, compare_with};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Schema diffing and idempotent data migration
#[derive(Parser, Debug)]
#[command(name = "resync", version, about)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
enum Commands {
    /// Show structural differences between two schema descriptions
    Diff {
        #[command(flatten)]
        schemas: SchemaPair,
    },
    /// Print the statements that bring the target schema in line with the source
    Sql {
        #[command(flatten)]
        schemas: SchemaPair,
    },
    /// Show the tables and columns of a schema description
    Schema {
        /// Schema description file (JSON)
        path: PathBuf,

        /// Schema name (defaults to the file stem)
        #[arg(long)]
        name: Option<String>,
    },
    /// Migrate data for every mapping in .config/resync.styx
    Migrate {
        /// Database connection URL
        #[arg(long)]
        database_url: Option<String>,

        /// Records per upsert batch
        #[arg(long)]
        batch_size: Option<usize>,

        /// Print the upsert statements instead of executing them
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(clap::Args, Debug)]
struct SchemaPair {
    /// Desired schema description (JSON)
    #[arg(long)]
    source: PathBuf,

    /// Current schema description (JSON)
    #[arg(long)]
    target: PathBuf,

    /// Match table and column names ignoring case
    #[arg(long)]
    case_insensitive: bool,
}

/// Errors surfaced by CLI commands.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Resync(#[from] resync::Error),

    #[error("table '{table}' not found in {}", path.display())]
    UnknownTable { table: String, path: PathBuf },

    #[error("connection pool error: {0}")]
    Pool(String),

    #[error("{0}")]
    Usage(String),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "resync=debug" } else { "resync=info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();
}

async fn run(command: Commands) -> Result<(), CliError> {
    match command {
        Commands::Diff { schemas } => {
            let diff = diff_schemas(&schemas)?;
            output::print_diff(&diff);
        }
        Commands::Sql { schemas } => {
            let diff = diff_schemas(&schemas)?;
            for statement in resync::render(&diff) {
                println!("{}", statement);
            }
        }
        Commands::Schema { path, name } => {
            let mut schema = migrate::load_schema(&path)?;
            if let Some(name) = name {
                schema.name = name;
            }
            output::print_schema(&schema);
        }
        Commands::Migrate {
            database_url,
            batch_size,
            dry_run,
        } => {
            migrate::run(migrate::MigrateOptions {
                database_url,
                batch_size,
                dry_run,
            })
            .await?;
        }
    }
    Ok(())
}

fn diff_schemas(pair: &SchemaPair) -> Result<resync::SchemaDiff, CliError> {
    let (config, _) = config::load_or_default()?;
    let options = CompareOptions {
        case_sensitive: config.compare.case_sensitive() && !pair.case_insensitive,
    };

    let source = migrate::load_schema(&pair.source)?;
    let target = migrate::load_schema(&pair.target)?;
    tracing::debug!(
        source = %source.name,
        target = %target.name,
        case_sensitive = options.case_sensitive,
        "comparing schemas"
    );
    Ok(compare_with(&source, &target, &options))
}
