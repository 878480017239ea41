//! Database layer - target dialects, DDL scripts, pooled sessions and commit batching

pub mod commit;
pub mod dialect;
pub mod pool;
pub mod script;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use commit::{BatchCommitStrategy, CommitExecutor, CommitStrategy, SingleCommitStrategy};
pub use dialect::{Dialect, PostgresDialect, SqliteDialect};
pub use pool::Pool;
pub use script::{DdlScriptGenerator, Script, ScriptGenerator};
pub use session::{Session, SessionFactory};
