//! Batching and commit policy for row inserts.

use anyhow::{Context, Result};
use std::fmt;
use std::sync::Arc;

use super::session::Session;
use crate::value::Param;

/// Decides when buffered rows are flushed and when the transaction commits
pub trait CommitStrategy: Send + Sync + fmt::Debug {
    /// Parameter sets buffered before they are executed
    fn batch_size(&self) -> usize;

    /// Whether to commit after `uncommitted` rows were written in the
    /// current transaction
    fn should_commit(&self, uncommitted: u64) -> bool;
}

/// Flush every `batch_size` rows, commit every `commit_size` rows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchCommitStrategy {
    pub batch_size: usize,
    pub commit_size: u64,
}

impl CommitStrategy for BatchCommitStrategy {
    fn batch_size(&self) -> usize {
        self.batch_size.max(1)
    }

    fn should_commit(&self, uncommitted: u64) -> bool {
        self.commit_size > 0 && uncommitted >= self.commit_size
    }
}

/// One transaction for everything a worker writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SingleCommitStrategy {
    pub batch_size: usize,
}

impl CommitStrategy for SingleCommitStrategy {
    fn batch_size(&self) -> usize {
        self.batch_size.max(1)
    }

    fn should_commit(&self, _uncommitted: u64) -> bool {
        false
    }
}

/// Writes one worker's rows through its own session.
///
/// The transaction starts with the first row. [`CommitExecutor::close`] must
/// always be called; it rolls back whatever [`CommitExecutor::finish`] did
/// not commit and returns the session.
pub struct CommitExecutor {
    session: Box<dyn Session>,
    query: String,
    strategy: Arc<dyn CommitStrategy>,
    pending: Vec<Vec<Param>>,
    in_transaction: bool,
    uncommitted: u64,
    committed: u64,
    finished: bool,
}

impl CommitExecutor {
    pub fn new(session: Box<dyn Session>, query: impl Into<String>, strategy: Arc<dyn CommitStrategy>) -> Self {
        Self {
            session,
            query: query.into(),
            strategy,
            pending: Vec::new(),
            in_transaction: false,
            uncommitted: 0,
            committed: 0,
            finished: false,
        }
    }

    /// Rows committed so far
    pub fn committed(&self) -> u64 {
        self.committed
    }

    /// Queues one parameter set, flushing and committing as the strategy says
    pub async fn add(&mut self, params: Vec<Param>) -> Result<()> {
        if !self.in_transaction {
            self.session.begin().await.context("Failed to begin transaction")?;
            self.in_transaction = true;
        }
        self.pending.push(params);
        self.uncommitted += 1;

        if self.pending.len() >= self.strategy.batch_size() {
            self.flush().await?;
        }
        if self.strategy.should_commit(self.uncommitted) {
            self.commit().await?;
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let rows = std::mem::take(&mut self.pending);
        self.session.execute_batch(&self.query, &rows).await?;
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.flush().await?;
        if self.in_transaction {
            self.session.commit().await.context("Failed to commit transaction")?;
            self.in_transaction = false;
            self.committed += self.uncommitted;
            self.uncommitted = 0;
        }
        Ok(())
    }

    /// Flushes and commits everything outstanding; returns rows committed
    pub async fn finish(&mut self) -> Result<u64> {
        self.commit().await?;
        self.finished = true;
        Ok(self.committed)
    }

    /// Rolls back unfinished work and closes the session
    pub async fn close(mut self) -> Result<()> {
        let rollback = if self.in_transaction && !self.finished {
            self.pending.clear();
            self.session.rollback().await
        } else {
            Ok(())
        };
        let close = self.session.close().await;
        rollback.and(close)
    }
}
