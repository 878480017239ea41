//! Units of work run on the worker pool: table loads fanning out into row
//! forks, and constraint creation.

use anyhow::{Context, Result, anyhow};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::db::{CommitExecutor, Dialect, Script, Session};
use crate::error::LoadError;
use crate::value::ValueHandleList;
use crate::value::param::ParamRow;

use super::constraints::LoadConstraint;
use super::manager::{BackupLoaderManager, panic_reason};
use super::row_reader::{RowReader, SequentialRowReader, SynchronizedRowReader};
use super::table::LoadTable;

/// Loads one table with `threads` forks sharing a single row reader
pub struct LoadTableWork {
    load_table: Arc<LoadTable>,
}

impl LoadTableWork {
    pub fn new(load_table: Arc<LoadTable>) -> Self {
        Self { load_table }
    }

    pub fn name(&self) -> String {
        self.load_table.name()
    }

    /// One reader per fork. A lone fork owns its reader; forks sharing one
    /// get handles, and the shared reader is returned for closing after the
    /// last fork has joined.
    fn readers(&self, manager: &BackupLoaderManager) -> (Vec<Box<dyn RowReader>>, Option<SynchronizedRowReader>) {
        let sequential = SequentialRowReader::new(
            manager.context().storage.clone(),
            self.load_table.row_set.clone(),
        );
        if self.load_table.threads == 1 {
            return (vec![Box::new(sequential)], None);
        }
        let shared = SynchronizedRowReader::new(Box::new(sequential));
        let readers = (0..self.load_table.threads)
            .map(|_| Box::new(shared.clone()) as Box<dyn RowReader>)
            .collect();
        (readers, Some(shared))
    }

    /// Runs the forks and reports the table complete once all of them
    /// committed. Forks report their own failures.
    pub async fn execute(self, manager: Arc<BackupLoaderManager>) -> Result<()> {
        let name = self.name();
        info!(
            table = %name,
            threads = self.load_table.threads,
            rows = self.load_table.row_set.row_count(),
            "Loading table"
        );

        let (readers, shared) = self.readers(&manager);
        let mut forks = JoinSet::new();
        for (fork, reader) in readers.into_iter().enumerate() {
            let work = LoadTableForkWork {
                load_table: self.load_table.clone(),
                reader,
                owns_reader: shared.is_none(),
                fork,
            };
            forks.spawn(work.execute(manager.clone()));
        }

        let mut failed = false;
        let mut rows = 0;
        while let Some(joined) = forks.join_next().await {
            match joined {
                Ok(Some(loaded)) => rows += loaded,
                Ok(None) => failed = true,
                Err(e) => {
                    failed = true;
                    let error = if e.is_panic() {
                        LoadError::Panicked {
                            table: name.clone(),
                            reason: panic_reason(e.into_panic().as_ref()),
                        }
                        .into()
                    } else {
                        anyhow!(e).context(format!("Fork of {} was cancelled", name))
                    };
                    manager.load_failed(error);
                }
            }
        }
        if let Some(mut shared) = shared {
            if let Err(e) = shared.close().await {
                warn!(table = %name, "Failed to close row reader: {:#}", e);
            }
        }

        if failed || !manager.can_load() {
            debug!(table = %name, "Table not completed");
            return Ok(());
        }
        info!(table = %name, rows, "Table loaded");
        manager.rows_loaded(rows);
        manager.table_completed(&self.load_table.table);
        Ok(())
    }
}

/// One worker of a table load, with its own session
pub struct LoadTableForkWork {
    load_table: Arc<LoadTable>,
    reader: Box<dyn RowReader>,
    /// False for handles on a reader shared with sibling forks
    owns_reader: bool,
    fork: usize,
}

impl LoadTableForkWork {
    /// Returns the rows this fork committed, or `None` once it has reported
    /// a failure to the manager
    pub async fn execute(mut self, manager: Arc<BackupLoaderManager>) -> Option<u64> {
        let _permit = match manager.acquire().await {
            Ok(permit) => permit,
            Err(e) => {
                manager.load_failed(e);
                return None;
            }
        };
        let rows = self.run(&manager).await;
        if self.owns_reader {
            if let Err(e) = self.reader.close().await {
                warn!(table = %self.load_table.name(), "Failed to close row reader: {:#}", e);
            }
        }
        rows
    }

    /// Failures are reported to the manager before the session is released,
    /// while the worker slot is still held
    async fn run(&mut self, manager: &BackupLoaderManager) -> Option<u64> {
        if !manager.can_load() {
            return Some(0);
        }
        let name = self.load_table.name();
        let context = manager.context();
        let session = match context
            .sessions
            .open_session()
            .await
            .with_context(|| format!("Failed to open a session for {}", name))
        {
            Ok(session) => session,
            Err(e) => {
                manager.load_failed(e);
                return None;
            }
        };
        let mut executor = CommitExecutor::new(
            session,
            self.load_table.query.as_str(),
            context.commit_strategy.clone(),
        );
        debug!(table = %name, fork = self.fork, "Fork started");

        let result: Result<u64> = match self.load_rows(manager, &mut executor).await {
            Ok(()) if manager.can_load() => executor
                .finish()
                .await
                .map_err(|e| LoadError::commit(&name, e).into()),
            Ok(()) => Ok(executor.committed()),
            Err(e) => Err(e),
        };
        debug!(table = %name, fork = self.fork, ok = result.is_ok(), "Fork finished");
        let rows = match result {
            Ok(rows) => Some(rows),
            Err(e) => {
                manager.load_failed(e);
                None
            }
        };
        if let Err(e) = executor.close().await {
            warn!(table = %name, fork = self.fork, "Failed to close session: {:#}", e);
        }
        rows
    }

    async fn load_rows(&mut self, manager: &BackupLoaderManager, executor: &mut CommitExecutor) -> Result<()> {
        let load = self.load_table.as_ref();
        let name = load.name();
        let mut handles: Option<ValueHandleList> = None;

        while manager.can_load() {
            let Some(row) = self
                .reader
                .read_row()
                .await
                .map_err(|e| LoadError::read(&name, e))?
            else {
                break;
            };
            // Built by the first row this fork sees
            let handles = match &mut handles {
                Some(handles) => handles,
                None => handles.insert(
                    load.value_handles(manager.context())
                        .with_context(|| format!("Cannot bind the columns of {}", name))?,
                ),
            };

            manager.before_row(load, &row);
            if row.is_chunk_start() {
                manager.chunk_started(load, &row.chunk);
            }

            let mut params = ParamRow::new(handles.len());
            handles
                .set_values(&mut params, &row.values)
                .map_err(|e| LoadError::row(&name, &row.chunk.name, row.number, e))?;
            executor
                .add(params.into_params())
                .await
                .map_err(|e| LoadError::row(&name, &row.chunk.name, row.number, e))?;

            manager.after_row(load, &row);
            if row.is_chunk_end() {
                manager.chunk_completed(load, &row.chunk);
            }
        }
        Ok(())
    }
}

/// Creates one constraint unit
pub struct LoadConstraintWork {
    constraint: Arc<LoadConstraint>,
}

impl LoadConstraintWork {
    pub fn new(constraint: Arc<LoadConstraint>) -> Self {
        Self { constraint }
    }

    pub fn name(&self) -> String {
        self.constraint.to_string()
    }

    pub fn table_name(&self) -> String {
        self.constraint.table.qualified_name()
    }

    pub async fn execute(self, manager: Arc<BackupLoaderManager>) -> Result<()> {
        let _permit = manager.acquire().await?;
        if let Err(e) = self.run(&manager).await {
            manager.load_failed(e);
        }
        Ok(())
    }

    async fn run(&self, manager: &Arc<BackupLoaderManager>) -> Result<()> {
        if !manager.can_execute() {
            return Ok(());
        }
        let table = self.table_name();
        let name = self.name();
        let context = manager.context();

        let scripts = self.constraint.scripts(context.scripts.as_ref());
        if scripts.is_empty() {
            info!(table = %table, constraint = %name, "Not supported by the target, skipping");
        } else {
            let mut session = context
                .sessions
                .open_session()
                .await
                .map_err(|e| LoadError::constraint(&table, &name, e))?;
            let qualified = context.scripts.table_name(&self.constraint.table);
            let result =
                execute_scripts(session.as_mut(), context.dialect.as_ref(), &qualified, &scripts).await;
            if let Err(e) = session.close().await {
                warn!(table = %table, "Failed to close session: {:#}", e);
            }
            result.map_err(|e| LoadError::constraint(&table, &name, e))?;
            info!(table = %table, constraint = %name, "Created");
        }

        manager.constraint_completed(&self.constraint);
        Ok(())
    }
}

/// Runs the scripts, inside a transaction holding the table lock when any
/// of them needs it and the dialect has one
async fn execute_scripts(
    session: &mut dyn Session,
    dialect: &dyn Dialect,
    qualified_table: &str,
    scripts: &[Script],
) -> Result<()> {
    let lock = scripts
        .iter()
        .any(|s| s.requires_lock)
        .then(|| dialect.lock_table(qualified_table))
        .flatten();

    let Some(lock) = lock else {
        for script in scripts {
            session.execute(&script.sql).await?;
        }
        return Ok(());
    };

    session.begin().await?;
    let mut result = session.execute(&lock).await.map(|_| ());
    for script in scripts {
        if result.is_err() {
            break;
        }
        result = session.execute(&script.sql).await.map(|_| ());
    }
    match result {
        Ok(()) => session.commit().await,
        Err(e) => {
            if let Err(rollback) = session.rollback().await {
                warn!("Rollback failed: {:#}", rollback);
            }
            Err(e)
        }
    }
}
