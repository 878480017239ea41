//! Restores a backup: schema first, then table data and constraints
//! concurrently on the worker pool.

use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::backup::{Backup, BackupStorage, RowSet, Sequence, Table};
use crate::config::LoaderConfig;
use crate::db::{
    BatchCommitStrategy, CommitStrategy, DdlScriptGenerator, Dialect, SessionFactory, SingleCommitStrategy,
};
use crate::value::ValueFormatRegistry;

use super::constraints::LoadConstraintListener;
use super::listener::LoadListener;
use super::manager::{BackupLoaderManager, LoadContext};
use super::parallelizer::{ParallelizerContext, parallelizer};
use super::sync::Phase;
use super::table::LoadTable;
use super::work::LoadTableWork;

/// A restored table and the row-set feeding it, if any
#[derive(Debug, Clone)]
pub struct TablePlan {
    pub table: Arc<Table>,
    pub row_set: Option<Arc<RowSet>>,
    pub threads: usize,
}

impl TablePlan {
    pub fn rows(&self) -> u64 {
        self.row_set.as_ref().map_or(0, |r| r.row_count())
    }

    pub fn chunks(&self) -> usize {
        self.row_set.as_ref().map_or(0, |r| r.chunks.len())
    }
}

/// Which tables a load restores and with how many workers each
#[derive(Debug, Clone, Default)]
pub struct LoadPlan {
    pub tables: Vec<TablePlan>,
}

impl LoadPlan {
    pub fn new(backup: &Backup, config: &LoaderConfig) -> Self {
        let mut tables: Vec<TablePlan> = backup
            .database
            .tables
            .iter()
            .filter(|t| config.includes(t))
            .map(|t| TablePlan {
                table: Arc::new(t.clone()),
                row_set: None,
                threads: 1,
            })
            .collect();

        for row_set in &backup.row_sets {
            let name = row_set.table_name();
            match tables.iter_mut().find(|p| p.table.matches(name)) {
                Some(plan) if plan.row_set.is_some() => {
                    warn!(row_set = %row_set.name, table = %name, "Table already has a row set, skipping");
                }
                Some(plan) => plan.row_set = Some(Arc::new(row_set.clone())),
                None if backup.database.find_table(name).is_some() => {
                    debug!(row_set = %row_set.name, table = %name, "Table not selected, skipping row set");
                }
                None => {
                    warn!(row_set = %row_set.name, table = %name, "No table for row set, skipping");
                }
            }
        }

        let context = ParallelizerContext {
            pool_parallelism: config.parallelism,
            max_row_set_size: tables
                .iter()
                .filter_map(|p| p.row_set.as_ref().map(|r| r.size()))
                .max()
                .unwrap_or(0),
        };
        let parallelizer = parallelizer(config.parallelizer);
        for plan in &mut tables {
            if let Some(row_set) = &plan.row_set {
                plan.threads = parallelizer.threads(row_set, &context);
            }
        }
        Self { tables }
    }

    pub fn rows(&self) -> u64 {
        self.tables.iter().map(TablePlan::rows).sum()
    }

    pub fn chunks(&self) -> usize {
        self.tables.iter().map(TablePlan::chunks).sum()
    }

    /// Constraint units a schema load creates on this dialect
    pub fn constraint_count(&self, dialect: &dyn Dialect) -> usize {
        self.tables
            .iter()
            .map(|plan| {
                let table = &plan.table;
                let indexes = match table.indexes.len() {
                    0 => 0,
                    _ if dialect.supports_multiple_indexes() => 1,
                    n => n,
                };
                let foreign_keys = table
                    .foreign_keys
                    .iter()
                    .filter(|fk| self.tables.iter().any(|p| p.table.matches(&fk.referenced_table)))
                    .count();
                indexes + usize::from(table.primary_key.is_some()) + foreign_keys
            })
            .sum()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub tables: u64,
    pub rows: u64,
    pub chunks: u64,
    pub constraints: u64,
    pub elapsed: Duration,
}

pub struct BackupLoader {
    config: LoaderConfig,
    storage: Arc<dyn BackupStorage>,
    sessions: Arc<dyn SessionFactory>,
    dialect: Arc<dyn Dialect>,
    listeners: Vec<Arc<dyn LoadListener>>,
}

impl BackupLoader {
    pub fn new(
        config: LoaderConfig,
        storage: Arc<dyn BackupStorage>,
        sessions: Arc<dyn SessionFactory>,
        dialect: Arc<dyn Dialect>,
    ) -> Self {
        Self {
            config,
            storage,
            sessions,
            dialect,
            listeners: Vec::new(),
        }
    }

    /// Adds a listener called after the constraint scheduler
    pub fn with_listener(mut self, listener: Arc<dyn LoadListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub async fn load(&self) -> Result<LoadSummary> {
        let backup = self.storage.read_catalog().await?;
        self.load_backup(&backup).await
    }

    pub async fn load_backup(&self, backup: &Backup) -> Result<LoadSummary> {
        let start = Instant::now();
        let time_zone = match self.config.time_zone {
            Some(time_zone) => Some(time_zone),
            None => backup.time_zone()?,
        };
        let plan = LoadPlan::new(backup, &self.config);

        let commit_strategy: Arc<dyn CommitStrategy> = if self.config.commit_size > 0 {
            Arc::new(BatchCommitStrategy {
                batch_size: self.config.batch_size,
                commit_size: self.config.commit_size,
            })
        } else {
            Arc::new(SingleCommitStrategy {
                batch_size: self.config.batch_size,
            })
        };
        let context = LoadContext {
            storage: self.storage.clone(),
            sessions: self.sessions.clone(),
            dialect: self.dialect.clone(),
            scripts: Arc::new(DdlScriptGenerator::new(self.dialect.clone())),
            formats: Arc::new(ValueFormatRegistry::new(self.dialect.extensions())),
            time_zone,
            commit_strategy,
        };

        let constraints = Arc::new(LoadConstraintListener::new());
        let mut listeners: Vec<Arc<dyn LoadListener>> = vec![constraints.clone()];
        listeners.extend(self.listeners.iter().cloned());
        let manager = BackupLoaderManager::new(context, self.config.parallelism, listeners);

        info!(
            tables = plan.tables.len(),
            rows = plan.rows(),
            chunks = plan.chunks(),
            parallelism = self.config.parallelism,
            "Starting load"
        );

        if self.config.load_schema {
            match self.create_schema(&manager, &plan, &backup.database.sequences).await {
                Ok(()) => {
                    manager.sync().release(Phase::Schema);
                }
                Err(e) => manager.load_failed(e),
            }
        } else {
            manager.sync().release(Phase::Schema);
            manager.sync().release(Phase::Constraints);
        }

        if manager.can_load() {
            self.start(&manager, &plan, &constraints);
        }

        let stats = manager.close().await?;
        Ok(LoadSummary {
            tables: stats.tables,
            rows: stats.rows,
            chunks: stats.chunks,
            constraints: stats.constraints,
            elapsed: start.elapsed(),
        })
    }

    async fn create_schema(&self, manager: &BackupLoaderManager, plan: &LoadPlan, sequences: &[Sequence]) -> Result<()> {
        let context = manager.context();
        let mut scripts = Vec::new();
        if self.dialect.supports_schemas() {
            let schemas: BTreeSet<&str> = plan
                .tables
                .iter()
                .filter_map(|p| p.table.schema.as_deref())
                .collect();
            for schema in schemas {
                scripts.extend(context.scripts.create_schema(schema));
            }
        }
        for table in &plan.tables {
            scripts.extend(context.scripts.create_table(&table.table));
        }
        if self.dialect.supports_sequences() {
            for sequence in sequences {
                scripts.extend(context.scripts.create_sequence(sequence));
            }
        }
        info!(tables = plan.tables.len(), statements = scripts.len(), "Creating schema");

        let mut session = context
            .sessions
            .open_session()
            .await
            .context("Failed to open a session for the schema")?;
        let mut result = Ok(());
        for script in &scripts {
            debug!(sql = %script.sql, "Executing");
            if let Err(e) = session.execute(&script.sql).await {
                result = Err(e.context(format!("Failed to execute: {}", script.sql)));
                break;
            }
        }
        if let Err(e) = session.close().await {
            warn!("Failed to close schema session: {:#}", e);
        }
        result
    }

    /// Registers constraints and submits every table. Row-set problems fail
    /// the load before any data is written.
    fn start(&self, manager: &Arc<BackupLoaderManager>, plan: &LoadPlan, constraints: &LoadConstraintListener) {
        let tables: Vec<Arc<Table>> = plan.tables.iter().map(|p| p.table.clone()).collect();
        if self.config.load_schema {
            for table in &tables {
                constraints.register(table, self.dialect.as_ref(), &tables);
            }
            info!(constraints = constraints.pending(), "Constraints queued");
        }

        let mut loads = Vec::new();
        let mut empty = Vec::new();
        for table in &plan.tables {
            match &table.row_set {
                Some(row_set) if self.config.load_data && !row_set.chunks.is_empty() => {
                    match LoadTable::new(
                        row_set.clone(),
                        table.table.clone(),
                        manager.context().scripts.as_ref(),
                        table.threads,
                    ) {
                        Ok(load) => loads.push(Arc::new(load)),
                        Err(e) => {
                            manager.load_failed(e);
                            return;
                        }
                    }
                }
                _ => empty.push(table.table.clone()),
            }
        }

        manager.expect_tables(plan.tables.len());
        for table in empty {
            manager.table_completed(&table);
        }
        for load in loads {
            manager.submit_table(LoadTableWork::new(load));
        }
        constraints.check(manager);
    }
}
