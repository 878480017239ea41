//! Configuration constants and the load configuration
//!
//! This module centralizes all tunable parameters and constants used throughout
//! the application.

use chrono::FixedOffset;
use derive_builder::Builder;
use std::time::Duration;

// ============================================================================
// Connection Pool Configuration
// ============================================================================

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(45);

pub const PING_TIMEOUT: Duration = Duration::from_secs(5);

/// How long a SQLite connection waits for the single writer lock
///
/// Row workers hold the lock for a whole commit batch, so this must cover
/// the time other workers take to commit theirs.
pub const SQLITE_BUSY_TIMEOUT: Duration = Duration::from_secs(300);

/// Connections kept beyond the worker count, for DDL and constraint work
pub const POOL_HEADROOM: u32 = 2;

// ============================================================================
// Load Configuration
// ============================================================================

/// Name of the catalog at the root of every backup
pub const CATALOG_FILE_NAME: &str = "backup.json";

/// Parameter sets executed per flush
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Rows per transaction
pub const DEFAULT_COMMIT_SIZE: u64 = 10_000;

/// Below this many rows per worker a row-set is not split further
pub const DEFAULT_MIN_ROWS_PER_THREAD: u64 = 100_000;

/// 0 leaves the rows per worker unbounded
pub const DEFAULT_MAX_ROWS_PER_THREAD: u64 = 0;

/// How many workers a table's rows are spread across
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParallelizerKind {
    /// One worker per table
    Table,
    /// Workers proportional to the table's share of the backup's bytes
    Row {
        min_rows_per_thread: u64,
        max_rows_per_thread: u64,
    },
}

impl Default for ParallelizerKind {
    fn default() -> Self {
        ParallelizerKind::Row {
            min_rows_per_thread: DEFAULT_MIN_ROWS_PER_THREAD,
            max_rows_per_thread: DEFAULT_MAX_ROWS_PER_THREAD,
        }
    }
}

#[derive(Debug, Clone, Builder)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct LoaderConfig {
    /// Concurrent leaf workers (row forks and constraint work)
    #[builder(default = "default_parallelism()")]
    pub parallelism: usize,
    #[builder(default)]
    pub parallelizer: ParallelizerKind,
    #[builder(default = "DEFAULT_BATCH_SIZE")]
    pub batch_size: usize,
    /// Rows per transaction; 0 commits once per worker
    #[builder(default = "DEFAULT_COMMIT_SIZE")]
    pub commit_size: u64,
    /// Overrides the time zone recorded in the backup
    #[builder(default)]
    pub time_zone: Option<FixedOffset>,
    #[builder(default = "true")]
    pub load_schema: bool,
    #[builder(default = "true")]
    pub load_data: bool,
    /// Restore only these tables (bare or qualified names); empty means all
    #[builder(default)]
    pub tables: Vec<String>,
}

impl LoaderConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if self.parallelism == Some(0) {
            return Err("parallelism must be at least 1".to_string());
        }
        if self.batch_size == Some(0) {
            return Err("batch size must be at least 1".to_string());
        }
        if self.load_schema == Some(false) && self.load_data == Some(false) {
            return Err("nothing to load: schema and data are both disabled".to_string());
        }
        Ok(())
    }
}

impl LoaderConfig {
    /// Whether `table` passes the table filter
    pub fn includes(&self, table: &crate::backup::Table) -> bool {
        self.tables.is_empty() || self.tables.iter().any(|name| table.matches(name))
    }
}

pub fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::Table;

    #[test]
    fn test_defaults() {
        let config = LoaderConfigBuilder::default().build().unwrap();
        assert!(config.parallelism >= 1);
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(config.parallelizer, ParallelizerKind::default());
        assert!(config.load_schema && config.load_data);
    }

    #[test]
    fn test_validation() {
        assert!(LoaderConfigBuilder::default().parallelism(0).build().is_err());
        let err = LoaderConfigBuilder::default()
            .load_schema(false)
            .load_data(false)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("nothing to load"));
    }

    #[test]
    fn test_table_filter() {
        let config = LoaderConfigBuilder::default()
            .tables(vec!["sales.orders".to_string()])
            .build()
            .unwrap();
        assert!(config.includes(&Table::new(Some("sales"), "orders")));
        assert!(!config.includes(&Table::new(Some("sales"), "customers")));
    }
}
