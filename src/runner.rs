//! High-level runner API for the backup loader.
//!
//! Opens the backup and the target pool, restores the backup and reports
//! progress. This is the entry point used by the CLI.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use crate::backup::{Backup, BackupLocation};
use crate::config::{LoaderConfig, POOL_HEADROOM};
use crate::db::SessionFactory;
use crate::db::pool::{self, PoolArgsBuilder};
use crate::load::{BackupLoader, LoadPlan, LoadSummary};
use crate::telemetry::{ProgressTotals, setup_progress_tracking};

/// Arguments for running a restore
#[derive(Debug, Clone)]
pub struct LoadArgs {
    /// Backup directory, `file://` or `s3://bucket/prefix`
    pub backup: String,
    /// `postgres://…` or `sqlite:…` URL of the target database
    pub target: String,
    pub config: LoaderConfig,
    pub quiet: bool,
}

/// Result of a completed restore
#[derive(Debug, Clone)]
pub struct LoadResult {
    pub summary: LoadSummary,
    pub tables_planned: usize,
}

/// Reads the backup catalog and works out what a load would restore
pub async fn plan_load(backup: &str, config: &LoaderConfig) -> Result<(Backup, LoadPlan)> {
    let storage = BackupLocation::parse(backup)?.open().await?;
    let catalog = storage
        .read_catalog()
        .await
        .with_context(|| format!("Failed to read backup at {}", backup))?;
    let plan = LoadPlan::new(&catalog, config);
    Ok((catalog, plan))
}

/// Restore a backup into the target database
///
/// # Example
///
/// ```no_run
/// use backup_loader::config::LoaderConfigBuilder;
/// use backup_loader::runner::{LoadArgs, run_load};
///
/// # async fn example() -> anyhow::Result<()> {
/// let args = LoadArgs {
///     backup: "s3://my-bucket/backups/2024-01-15".to_string(),
///     target: "postgres://admin@localhost/restore".to_string(),
///     config: LoaderConfigBuilder::default().parallelism(8).build()?,
///     quiet: true,
/// };
///
/// let result = run_load(args).await?;
/// println!("Loaded {} rows in {:?}", result.summary.rows, result.summary.elapsed);
/// # Ok(())
/// # }
/// ```
pub async fn run_load(args: LoadArgs) -> Result<LoadResult> {
    let storage = BackupLocation::parse(&args.backup)?.open().await?;
    let backup = storage
        .read_catalog()
        .await
        .with_context(|| format!("Failed to read backup at {}", args.backup))?;

    let max_pool_size = u32::try_from(args.config.parallelism)
        .unwrap_or(u32::MAX)
        .saturating_add(POOL_HEADROOM);
    let pool_args = PoolArgsBuilder::default()
        .url(&args.target)
        .max_pool_size(max_pool_size)
        .build()?;
    let pool = pool::pool(pool_args).await?;
    let dialect = pool.dialect();
    info!(backup = %args.backup, dialect = dialect.name(), "Connected to target");

    let plan = LoadPlan::new(&backup, &args.config);
    let constraints = if args.config.load_schema {
        plan.constraint_count(dialect.as_ref())
    } else {
        0
    };
    let (rows, chunks) = if args.config.load_data {
        (plan.rows(), plan.chunks())
    } else {
        (0, 0)
    };

    let sessions: Arc<dyn SessionFactory> = Arc::new(pool.clone());
    let mut loader = BackupLoader::new(args.config, storage, sessions, dialect);

    let progress = if args.quiet {
        None
    } else {
        let (listener, handle) = setup_progress_tracking(ProgressTotals {
            tables: plan.tables.len() as u64,
            chunks: chunks as u64,
            rows,
            constraints: constraints as u64,
        });
        loader = loader.with_listener(Arc::new(listener));
        Some(handle)
    };

    let result = loader.load_backup(&backup).await;
    // Closes the progress channel
    drop(loader);
    if let Some(handle) = progress {
        let _ = handle.await;
    }
    pool.close().await;

    Ok(LoadResult {
        summary: result?,
        tables_planned: plan.tables.len(),
    })
}
