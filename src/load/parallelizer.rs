//! How many workers each table's rows are spread across.

use crate::backup::RowSet;
use crate::config::ParallelizerKind;

/// Load-wide inputs to a thread count decision
#[derive(Debug, Clone, Copy)]
pub struct ParallelizerContext {
    pub pool_parallelism: usize,
    /// Byte size of the largest row-set in the load
    pub max_row_set_size: u64,
}

pub trait Parallelizer: Send + Sync + std::fmt::Debug {
    /// Workers for `row_set`, always within `[1, pool_parallelism]`
    fn threads(&self, row_set: &RowSet, context: &ParallelizerContext) -> usize;
}

pub fn parallelizer(kind: ParallelizerKind) -> Box<dyn Parallelizer> {
    match kind {
        ParallelizerKind::Table => Box::new(TableLevelParallelizer),
        ParallelizerKind::Row {
            min_rows_per_thread,
            max_rows_per_thread,
        } => Box::new(RowLevelParallelizer {
            min_rows_per_thread,
            max_rows_per_thread,
        }),
    }
}

/// One worker per table; tables still load concurrently
#[derive(Debug, Clone, Copy, Default)]
pub struct TableLevelParallelizer;

impl Parallelizer for TableLevelParallelizer {
    fn threads(&self, _row_set: &RowSet, _context: &ParallelizerContext) -> usize {
        1
    }
}

/// Workers in proportion to the row-set's share of the largest row-set's
/// bytes, bounded by how many rows each worker should get.
#[derive(Debug, Clone, Copy)]
pub struct RowLevelParallelizer {
    pub min_rows_per_thread: u64,
    /// 0 leaves it unbounded
    pub max_rows_per_thread: u64,
}

fn rounded(numerator: f64, denominator: f64) -> usize {
    if denominator <= 0.0 {
        return 0;
    }
    (numerator / denominator).round() as usize
}

impl Parallelizer for RowLevelParallelizer {
    fn threads(&self, row_set: &RowSet, context: &ParallelizerContext) -> usize {
        let pool = context.pool_parallelism.max(1);
        let rows = row_set.row_count() as f64;

        let weight = if context.max_row_set_size == 0 {
            1.0
        } else {
            row_set.size() as f64 / context.max_row_set_size as f64
        };
        let desired = (weight * pool as f64).round() as usize;

        // Small row-sets are not split below min_rows_per_thread each
        let row_cap = if self.min_rows_per_thread > 0 {
            rounded(rows, self.min_rows_per_thread as f64).max(1)
        } else {
            pool
        };
        // Large row-sets get at least enough workers to respect max_rows_per_thread
        let row_floor = if self.max_rows_per_thread > 0 {
            rounded(rows, self.max_rows_per_thread as f64)
        } else {
            1
        };

        desired.min(row_cap).max(row_floor).clamp(1, pool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::Chunk;

    fn row_set(chunks: &[(u64, u64)]) -> RowSet {
        RowSet {
            name: "t".to_string(),
            table: None,
            columns: Vec::new(),
            chunks: chunks
                .iter()
                .enumerate()
                .map(|(i, (rows, size))| Chunk::new(format!("t.{}", i), *rows, *size))
                .collect(),
        }
    }

    fn row_level(min: u64, max: u64) -> RowLevelParallelizer {
        RowLevelParallelizer {
            min_rows_per_thread: min,
            max_rows_per_thread: max,
        }
    }

    #[test]
    fn test_table_level_is_one() {
        let context = ParallelizerContext {
            pool_parallelism: 8,
            max_row_set_size: 100,
        };
        assert_eq!(TableLevelParallelizer.threads(&row_set(&[(1_000_000, 100)]), &context), 1);
    }

    #[test]
    fn test_small_table_gets_one_thread() {
        // 2,500 rows never reach min_rows_per_thread, whatever their byte weight
        let set = row_set(&[(1_000, 40_000), (1_000, 40_000), (500, 20_000)]);
        let context = ParallelizerContext {
            pool_parallelism: 4,
            max_row_set_size: set.size(),
        };
        assert_eq!(row_level(100_000, 0).threads(&set, &context), 1);
    }

    #[test]
    fn test_proportional_to_bytes() {
        let context = ParallelizerContext {
            pool_parallelism: 8,
            max_row_set_size: 1_000,
        };
        let cases = [
            (1_000, 8, "largest row-set gets the whole pool"),
            (500, 4, "half the bytes gets half the pool"),
            (100, 1, "0.8 rounds to one"),
            (10, 1, "never below one"),
        ];
        for (size, expected, msg) in cases {
            let set = row_set(&[(10_000_000, size)]);
            assert_eq!(row_level(1_000, 0).threads(&set, &context), expected, "{}", msg);
        }
    }

    #[test]
    fn test_max_rows_per_thread_raises_floor() {
        let context = ParallelizerContext {
            pool_parallelism: 8,
            max_row_set_size: 1_000_000,
        };
        let set = row_set(&[(600_000, 1)]);
        assert_eq!(row_level(1, 100_000).threads(&set, &context), 6);

        let huge = row_set(&[(10_000_000, 1)]);
        assert_eq!(row_level(1, 100_000).threads(&huge, &context), 8, "capped at the pool");
    }

    #[test]
    fn test_monotonic_in_size_and_bounded() {
        let pool = 6;
        let parallelizer = row_level(10, 0);
        let mut previous = 0;
        for size in (0..=2_000).step_by(50) {
            let set = row_set(&[(100_000, size)]);
            let context = ParallelizerContext {
                pool_parallelism: pool,
                max_row_set_size: 2_000,
            };
            let threads = parallelizer.threads(&set, &context);
            assert!((1..=pool).contains(&threads), "size {} gave {}", size, threads);
            assert!(threads >= previous, "size {} decreased threads", size);
            previous = threads;
        }
    }

    #[test]
    fn test_empty_backup() {
        let context = ParallelizerContext {
            pool_parallelism: 4,
            max_row_set_size: 0,
        };
        assert_eq!(row_level(100_000, 0).threads(&row_set(&[]), &context), 1);
    }
}
