//! Backup catalog, schema model and chunk storage (local or S3)

pub mod catalog;
pub mod chunk;
pub mod metadata;
pub mod storage;

#[cfg(test)]
pub(crate) mod testing;

pub use catalog::{Backup, Chunk, RowSet, RowSetColumn};
pub use chunk::{ChunkDecoder, ChunkEncoder, ChunkInput};
pub use metadata::{Column, Database, ForeignKey, Index, PrimaryKey, Sequence, Table};
pub use storage::{BackupLocation, BackupStorage, LocalBackupStorage, S3BackupStorage};
