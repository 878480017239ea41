//! Continuous row streams over a row-set's chunks.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::backup::{BackupStorage, Chunk, ChunkDecoder, RowSet};
use crate::value::Value;

/// One decoded row and where it came from
#[derive(Debug, Clone)]
pub struct Row {
    pub chunk: Arc<Chunk>,
    pub values: Vec<Value>,
    /// 0-based position within the chunk
    pub number: u64,
}

impl Row {
    pub fn is_chunk_start(&self) -> bool {
        self.number == 0
    }

    pub fn is_chunk_end(&self) -> bool {
        self.number + 1 == self.chunk.row_count
    }
}

#[async_trait]
pub trait RowReader: Send {
    /// Next row, or `None` once every chunk is exhausted
    async fn read_row(&mut self) -> Result<Option<Row>>;

    async fn close(&mut self) -> Result<()>;
}

/// Reads the chunks of a row-set one after the other
pub struct SequentialRowReader {
    storage: Arc<dyn BackupStorage>,
    row_set: Arc<RowSet>,
    next_chunk: usize,
    current: Option<(Arc<Chunk>, ChunkDecoder)>,
    number: u64,
    closed: bool,
}

impl SequentialRowReader {
    pub fn new(storage: Arc<dyn BackupStorage>, row_set: Arc<RowSet>) -> Self {
        Self {
            storage,
            row_set,
            next_chunk: 0,
            current: None,
            number: 0,
            closed: false,
        }
    }

    async fn open_next(&mut self) -> Result<bool> {
        let Some(chunk) = self.row_set.chunks.get(self.next_chunk) else {
            return Ok(false);
        };
        self.next_chunk += 1;

        let chunk = Arc::new(chunk.clone());
        let input = self
            .storage
            .open_input(&chunk.name)
            .await
            .with_context(|| format!("Failed to open chunk {}", chunk.name))?;
        debug!(row_set = %self.row_set.name, chunk = %chunk.name, "Opened chunk");

        let decoder = ChunkDecoder::new(&chunk.name, self.row_set.value_types(), input);
        self.current = Some((chunk, decoder));
        self.number = 0;
        Ok(true)
    }

    fn finish_chunk(&mut self) {
        if let Some((chunk, _)) = self.current.take()
            && chunk.row_count != self.number
        {
            warn!(
                chunk = %chunk.name,
                declared = chunk.row_count,
                read = self.number,
                "Chunk row count differs from the catalog"
            );
        }
    }
}

#[async_trait]
impl RowReader for SequentialRowReader {
    async fn read_row(&mut self) -> Result<Option<Row>> {
        if self.closed {
            return Ok(None);
        }
        loop {
            if self.current.is_none() && !self.open_next().await? {
                return Ok(None);
            }
            let Some((chunk, decoder)) = self.current.as_mut() else {
                continue;
            };
            match decoder.next_row().await? {
                Some(values) => {
                    let row = Row {
                        chunk: chunk.clone(),
                        values,
                        number: self.number,
                    };
                    self.number += 1;
                    return Ok(Some(row));
                }
                None => self.finish_chunk(),
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        self.current = None;
        Ok(())
    }
}

/// Shares one reader between workers; each call runs under the lock.
///
/// Rows go to whichever worker asks first, so the order across workers is
/// not the chunk order.
#[derive(Clone)]
pub struct SynchronizedRowReader {
    inner: Arc<Mutex<Box<dyn RowReader>>>,
}

impl SynchronizedRowReader {
    pub fn new(reader: Box<dyn RowReader>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(reader)),
        }
    }
}

#[async_trait]
impl RowReader for SynchronizedRowReader {
    async fn read_row(&mut self) -> Result<Option<Row>> {
        self.inner.lock().await.read_row().await
    }

    /// Closes the shared reader for every handle
    async fn close(&mut self) -> Result<()> {
        self.inner.lock().await.close().await
    }
}
