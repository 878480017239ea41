//! Shared state of one running load: worker pool, failure flag, listeners
//! and completion tracking.

use anyhow::{Context, Result};
use chrono::FixedOffset;
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::task::TaskTracker;
use tracing::{debug, error, warn};

use crate::backup::{BackupStorage, Chunk, Table};
use crate::db::{CommitStrategy, Dialect, ScriptGenerator, SessionFactory};
use crate::error::LoadError;
use crate::value::ValueFormatRegistry;

use super::constraints::LoadConstraint;
use super::listener::{CompletedWork, LoadListener};
use super::row_reader::Row;
use super::sync::{BackupLoaderSync, Phase};
use super::table::LoadTable;
use super::work::{LoadConstraintWork, LoadTableWork};

/// Collaborators every unit of work needs
#[derive(Clone)]
pub struct LoadContext {
    pub storage: Arc<dyn BackupStorage>,
    pub sessions: Arc<dyn SessionFactory>,
    pub dialect: Arc<dyn Dialect>,
    pub scripts: Arc<dyn ScriptGenerator>,
    pub formats: Arc<ValueFormatRegistry>,
    /// Zone attached to temporal parameters when the dialect binds one
    pub time_zone: Option<FixedOffset>,
    pub commit_strategy: Arc<dyn CommitStrategy>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStats {
    pub tables: u64,
    pub rows: u64,
    pub chunks: u64,
    pub constraints: u64,
}

#[derive(Debug, Default)]
struct Counters {
    tables: AtomicU64,
    rows: AtomicU64,
    chunks: AtomicU64,
    constraints: AtomicU64,
}

pub struct BackupLoaderManager {
    context: LoadContext,
    sync: BackupLoaderSync,
    listeners: Vec<Arc<dyn LoadListener>>,
    tracker: TaskTracker,
    permits: Arc<Semaphore>,
    failure: Mutex<Option<anyhow::Error>>,
    tables_pending: AtomicUsize,
    counters: Counters,
}

impl BackupLoaderManager {
    /// `parallelism` bounds the row and constraint workers running at once
    pub fn new(context: LoadContext, parallelism: usize, listeners: Vec<Arc<dyn LoadListener>>) -> Arc<Self> {
        Arc::new(Self {
            context,
            sync: BackupLoaderSync::new(),
            listeners,
            tracker: TaskTracker::new(),
            permits: Arc::new(Semaphore::new(parallelism.max(1))),
            failure: Mutex::new(None),
            tables_pending: AtomicUsize::new(0),
            counters: Counters::default(),
        })
    }

    pub fn context(&self) -> &LoadContext {
        &self.context
    }

    pub fn sync(&self) -> &BackupLoaderSync {
        &self.sync
    }

    /// Waits for a worker slot
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit> {
        self.permits
            .clone()
            .acquire_owned()
            .await
            .context("Worker pool is closed")
    }

    pub fn can_load(&self) -> bool {
        !self.sync.is_failed()
    }

    pub fn can_execute(&self) -> bool {
        !self.sync.is_failed()
    }

    /// Sets how many tables must complete before the data phase is done
    pub fn expect_tables(&self, tables: usize) {
        self.tables_pending.store(tables, Ordering::SeqCst);
        if tables == 0 {
            self.sync.release(Phase::Data);
        }
    }

    pub fn tables_pending(&self) -> usize {
        self.tables_pending.load(Ordering::SeqCst)
    }

    pub fn submit_table(self: &Arc<Self>, work: LoadTableWork) {
        if !self.can_load() {
            debug!(table = %work.name(), "Load failed, not scheduling table");
            return;
        }
        let label = work.name();
        self.spawn(label, work.execute(self.clone()));
    }

    pub fn submit_constraint(self: &Arc<Self>, work: LoadConstraintWork) {
        if !self.can_execute() {
            debug!(constraint = %work.name(), "Load failed, not scheduling constraint");
            return;
        }
        let label = work.table_name();
        self.spawn(label, work.execute(self.clone()));
    }

    fn spawn<F>(self: &Arc<Self>, label: String, work: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let manager = self.clone();
        self.tracker.spawn(async move {
            match AssertUnwindSafe(work).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => manager.load_failed(e),
                Err(panic) => manager.load_failed(
                    LoadError::Panicked {
                        table: label,
                        reason: panic_reason(panic.as_ref()),
                    }
                    .into(),
                ),
            }
        });
    }

    /// Records a failure; the first one is what [`Self::close`] returns
    pub fn load_failed(&self, error: anyhow::Error) {
        {
            let mut failure = self.failure();
            if failure.is_none() {
                error!("Load failed: {:#}", error);
                *failure = Some(error);
            } else {
                warn!("Further failure after the load failed: {:#}", error);
            }
        }
        self.sync.load_failed();
    }

    pub fn is_failed(&self) -> bool {
        self.sync.is_failed()
    }

    fn failure(&self) -> MutexGuard<'_, Option<anyhow::Error>> {
        self.failure.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn table_completed(self: &Arc<Self>, table: &Table) {
        self.counters.tables.fetch_add(1, Ordering::Relaxed);
        let previous = self
            .tables_pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| Some(n.saturating_sub(1)))
            .unwrap_or(0);
        debug!(table = %table.qualified_name(), remaining = previous.saturating_sub(1), "Table completed");
        if previous <= 1 {
            self.sync.release(Phase::Data);
        }
        self.work_completed(&CompletedWork::Table(table));
    }

    pub fn constraint_completed(self: &Arc<Self>, constraint: &LoadConstraint) {
        self.counters.constraints.fetch_add(1, Ordering::Relaxed);
        self.work_completed(&CompletedWork::Constraint(constraint));
    }

    pub fn rows_loaded(&self, rows: u64) {
        self.counters.rows.fetch_add(rows, Ordering::Relaxed);
    }

    fn work_completed(self: &Arc<Self>, work: &CompletedWork<'_>) {
        for listener in &self.listeners {
            listener.work_completed(self, work);
        }
    }

    pub fn before_row(&self, table: &LoadTable, row: &Row) {
        for listener in &self.listeners {
            listener.before_row(table, row);
        }
    }

    pub fn after_row(&self, table: &LoadTable, row: &Row) {
        for listener in &self.listeners {
            listener.after_row(table, row);
        }
    }

    pub fn chunk_started(&self, table: &LoadTable, chunk: &Chunk) {
        for listener in &self.listeners {
            listener.chunk_started(table, chunk);
        }
    }

    pub fn chunk_completed(&self, table: &LoadTable, chunk: &Chunk) {
        self.counters.chunks.fetch_add(1, Ordering::Relaxed);
        for listener in &self.listeners {
            listener.chunk_completed(table, chunk);
        }
    }

    pub fn stats(&self) -> LoadStats {
        LoadStats {
            tables: self.counters.tables.load(Ordering::Relaxed),
            rows: self.counters.rows.load(Ordering::Relaxed),
            chunks: self.counters.chunks.load(Ordering::Relaxed),
            constraints: self.counters.constraints.load(Ordering::Relaxed),
        }
    }

    /// Waits for every phase, then for every spawned task, and returns the
    /// first failure if there was one
    pub async fn close(&self) -> Result<LoadStats> {
        self.sync.wait().await;
        self.tracker.close();
        self.tracker.wait().await;

        match self.failure().take() {
            Some(error) => Err(error),
            None => Ok(self.stats()),
        }
    }
}

pub(crate) fn panic_reason(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
