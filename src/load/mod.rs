//! Load engine: row readers, parallelism policy, work scheduling and
//! constraint ordering.

pub mod constraints;
pub mod listener;
pub mod loader;
pub mod manager;
pub mod parallelizer;
pub mod row_reader;
pub mod sync;
pub mod table;
pub mod work;

pub use constraints::{ConstraintKind, ConstraintState, LoadConstraint, LoadConstraintListener, LoadConstraints};
pub use listener::{CompletedWork, LoadListener};
pub use loader::{BackupLoader, LoadPlan, LoadSummary, TablePlan};
pub use manager::{BackupLoaderManager, LoadContext, LoadStats};
pub use parallelizer::{Parallelizer, ParallelizerContext, RowLevelParallelizer, TableLevelParallelizer};
pub use row_reader::{Row, RowReader, SequentialRowReader, SynchronizedRowReader};
pub use sync::{BackupLoaderSync, Phase};
pub use table::LoadTable;
pub use work::{LoadConstraintWork, LoadTableForkWork, LoadTableWork};
