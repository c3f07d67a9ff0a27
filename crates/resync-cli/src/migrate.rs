//! The `migrate` command: run every configured table mapping.
//!
//! Mappings are resolved and validated up front, before any connection is
//! opened. Each mapping then runs on its own pooled connection, concurrently
//! with the others.

use crate::CliError;
use crate::config::{self, Config};
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use owo_colors::OwoColorize;
use resync::{
    DataMigrator, Dialect, DryRun, FieldMapper, MigrationReport, Schema, SchemaDescription,
};
use resync_config::{DialectName, TableMapping};
use std::path::Path;
use tokio::task::JoinSet;
use tokio_postgres::NoTls;

pub struct MigrateOptions {
    pub database_url: Option<String>,
    pub batch_size: Option<usize>,
    pub dry_run: bool,
}

pub async fn run(opts: MigrateOptions) -> Result<(), CliError> {
    let (config, config_path) = config::load()?;
    let root = config::project_root(&config_path).to_path_buf();

    if config.mappings.is_empty() {
        return Err(CliError::Usage(format!(
            "no mappings configured in {}",
            config_path.display()
        )));
    }

    let dialect = match config.migrate.dialect {
        DialectName::Postgres => Dialect::Postgres,
        DialectName::MySql => Dialect::MySql,
    };
    if dialect != Dialect::Postgres && !opts.dry_run {
        return Err(CliError::Usage(format!(
            "the {} dialect can only be used with --dry-run",
            dialect
        )));
    }

    let batch_size = opts.batch_size.unwrap_or(config.migrate.batch_size());
    let mappers = config
        .mappings
        .iter()
        .map(|m| build_mapper(&root, m))
        .collect::<Result<Vec<_>, _>>()?;

    let url = database_url(&config, opts.database_url)?;
    println!("{} {}", "database:".bold(), mask_password(&url));

    let pool = create_pool(&url, mappers.len())?;

    let mut tasks = JoinSet::new();
    for mapper in mappers {
        let pool = pool.clone();
        let dry_run = opts.dry_run;
        tasks.spawn(async move {
            let label = format!(
                "{} -> {}",
                mapper.source_table().name,
                mapper.target_table().name
            );
            let result = migrate_one(&pool, &mapper, dialect, batch_size, dry_run).await;
            (label, result)
        });
    }

    let mut failures = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((label, Ok(report))) => println!(
                "  {} {}: {} records in {} batches",
                "✓".green(),
                label,
                report.records,
                report.batches
            ),
            Ok((label, Err(e))) => {
                failures += 1;
                eprintln!("  {} {}: {}", "✗".red(), label, e);
            }
            Err(e) => {
                failures += 1;
                eprintln!("  {} migration task failed: {}", "✗".red(), e);
            }
        }
    }

    if failures > 0 {
        return Err(CliError::Usage(format!("{} mapping(s) failed", failures)));
    }
    Ok(())
}

async fn migrate_one(
    pool: &Pool,
    mapper: &FieldMapper,
    dialect: Dialect,
    batch_size: usize,
    dry_run: bool,
) -> Result<MigrationReport, CliError> {
    let conn = pool
        .get()
        .await
        .map_err(|e| CliError::Pool(e.to_string()))?;
    let records = resync::fetch_mapped(&conn, mapper).await?;
    tracing::info!(
        source = %mapper.source_table().name,
        records = records.len(),
        "read source rows"
    );

    if dry_run {
        let mut migrator = DataMigrator::new(DryRun::new()).with_dialect(dialect);
        let report = migrator
            .migrate_in_batches(mapper, &records, batch_size)
            .await?;
        println!("{}", migrator.into_inner().statements.join("\n"));
        return Ok(report);
    }

    let mut migrator = DataMigrator::new(conn).with_dialect(dialect);
    Ok(migrator
        .migrate_in_batches(mapper, &records, batch_size)
        .await?)
}

fn build_mapper(root: &Path, mapping: &TableMapping) -> Result<FieldMapper, CliError> {
    let source_path = root.join(&mapping.source_schema);
    let target_path = root.join(&mapping.target_schema);
    let source = load_schema(&source_path)?;
    let target = load_schema(&target_path)?;

    let source_table = source
        .get_table(&mapping.source)
        .ok_or_else(|| CliError::UnknownTable {
            table: mapping.source.clone(),
            path: source_path.clone(),
        })?;
    let target_table = target
        .get_table(&mapping.target)
        .ok_or_else(|| CliError::UnknownTable {
            table: mapping.target.clone(),
            path: target_path.clone(),
        })?;

    Ok(FieldMapper::with_mappings(
        source_table,
        target_table,
        &mapping.fields,
    )?)
}

/// Load a schema description file, naming the schema after the file stem.
pub fn load_schema(path: &Path) -> Result<Schema, CliError> {
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "schema".to_string());
    let description = SchemaDescription::read(path)?;
    Ok(Schema::from_description(name, &description)?)
}

fn database_url(config: &Config, flag: Option<String>) -> Result<String, CliError> {
    flag.or_else(|| config.migrate.database_url.clone())
        .or_else(|| std::env::var("DATABASE_URL").ok())
        .ok_or_else(|| {
            CliError::Usage(
                "no database URL: pass --database-url, set migrate.database_url or DATABASE_URL"
                    .to_string(),
            )
        })
}

fn create_pool(url: &str, max_conns: usize) -> Result<Pool, CliError> {
    let pg_config: tokio_postgres::Config = url
        .parse()
        .map_err(|e: tokio_postgres::Error| CliError::Pool(format!("invalid database URL: {}", e)))?;
    let mgr_config = ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    };
    let mgr = Manager::from_config(pg_config, NoTls, mgr_config);
    Pool::builder(mgr)
        .max_size(max_conns.max(1))
        .build()
        .map_err(|e| CliError::Pool(format!("failed to create pool: {}", e)))
}

/// Hide the password in a connection URL.
pub fn mask_password(url: &str) -> String {
    if let Some(start) = url.find("://") {
        if let Some(at) = url.rfind('@').filter(|at| *at > start) {
            let prefix = &url[..start + 3];
            let suffix = &url[at..];
            if let Some(colon) = url[start + 3..at].find(':') {
                let user = &url[start + 3..start + 3 + colon];
                return format!("{}{}:***{}", prefix, user, suffix);
            }
        }
    }
    url.to_string()
}
