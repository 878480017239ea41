//! Lifecycle hooks observed during a load.
//!
//! Listeners are registered before the load starts and called in order, on
//! the worker that reached the hook. They must not block.

use std::sync::Arc;

use crate::backup::{Chunk, Table};

use super::constraints::LoadConstraint;
use super::manager::BackupLoaderManager;
use super::row_reader::Row;
use super::table::LoadTable;

/// A unit of work that finished successfully
#[derive(Debug, Clone, Copy)]
pub enum CompletedWork<'a> {
    /// Every row of the table is committed, or it had none to load
    Table(&'a Table),
    Constraint(&'a LoadConstraint),
}

#[allow(unused_variables)]
pub trait LoadListener: Send + Sync {
    fn before_row(&self, table: &LoadTable, row: &Row) {}

    fn after_row(&self, table: &LoadTable, row: &Row) {}

    fn chunk_started(&self, table: &LoadTable, chunk: &Chunk) {}

    fn chunk_completed(&self, table: &LoadTable, chunk: &Chunk) {}

    fn work_completed(&self, manager: &Arc<BackupLoaderManager>, work: &CompletedWork<'_>) {}
}
