//! Generated backups for tests, held in memory or written to a directory.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::io::BufReader;

use super::catalog::{Backup, Chunk, RowSet, RowSetColumn};
use super::chunk::{ChunkEncoder, ChunkInput};
use super::metadata::{Column, Database, Table};
use super::storage::BackupStorage;
use crate::config::CATALOG_FILE_NAME;
use crate::value::{SqlTypeCode, Value, ValueFormatRegistry, ValueType};

/// Produces the value of `column` for the 1-based `row` of a table
pub type Generator = dyn Fn(u64, &Column) -> Value;

/// Deterministic value for a column; ids and `*_id` columns count from 1
pub fn default_value(row: u64, column: &Column) -> Value {
    use SqlTypeCode as T;
    match column.type_code {
        T::TINYINT | T::SMALLINT | T::INTEGER | T::BIGINT => Value::string(row.to_string()),
        T::NUMERIC | T::DECIMAL => Value::string(format!("{}.50", row)),
        T::REAL | T::FLOAT | T::DOUBLE => Value::string(format!("{}.25", row)),
        T::BIT | T::BOOLEAN => Value::string(if row % 2 == 0 { "true" } else { "false" }),
        T::DATE => Value::string(format!("2024-01-{:02}", row % 28 + 1)),
        T::TIME => Value::string(format!("10:{:02}:00", row % 60)),
        T::TIMESTAMP => Value::string(format!("2024-01-15 10:{:02}:00", row % 60)),
        T::TIME_WITH_TIMEZONE => Value::string(format!("10:{:02}:00+02:00", row % 60)),
        T::TIMESTAMP_WITH_TIMEZONE => Value::string(format!("2024-01-15 10:{:02}:00+02:00", row % 60)),
        T::BINARY | T::VARBINARY | T::LONGVARBINARY | T::BLOB => Value::binary(row.to_be_bytes().to_vec()),
        _ => Value::string(format!("{}-{}", column.name, row)),
    }
}

#[derive(Default)]
pub struct BackupFixture {
    pub backup: Backup,
    pub chunks: HashMap<String, Vec<u8>>,
}

impl BackupFixture {
    pub fn new() -> Self {
        Self {
            backup: Backup::new(Database::default()),
            chunks: HashMap::new(),
        }
    }

    /// Adds a table whose row-set has one chunk per entry of `chunk_rows`
    pub fn table(self, table: Table, chunk_rows: &[u64]) -> Self {
        self.table_with(table, chunk_rows, &default_value)
    }

    pub fn table_with(mut self, table: Table, chunk_rows: &[u64], generator: &Generator) -> Self {
        if !chunk_rows.is_empty() {
            let formats = ValueFormatRegistry::default();
            let columns: Vec<RowSetColumn> = table
                .columns
                .iter()
                .map(|c| {
                    let column = crate::value::ColumnRef::new(&c.name, c.type_code, &c.type_name);
                    let value_type = formats
                        .lookup(&column)
                        .map(|f| f.value_type(&column))
                        .unwrap_or(ValueType::String);
                    RowSetColumn::new(&c.name, value_type)
                })
                .collect();
            let encoder = ChunkEncoder::new(columns.iter().map(|c| c.value_type).collect());

            let mut row = 0;
            let mut chunks = Vec::new();
            for (index, rows) in chunk_rows.iter().enumerate() {
                let name = format!("{}.{}.jsonl", table.name, index);
                let values: Vec<Vec<Value>> = (0..*rows)
                    .map(|_| {
                        row += 1;
                        table.columns.iter().map(|c| generator(row, c)).collect()
                    })
                    .collect();
                let bytes = encoder
                    .encode(values.iter().map(Vec::as_slice))
                    .unwrap_or_default();
                chunks.push(Chunk::new(&name, *rows, bytes.len() as u64));
                self.chunks.insert(name, bytes);
            }

            self.backup.row_sets.push(RowSet {
                name: table.name.clone(),
                table: Some(table.qualified_name()),
                columns,
                chunks,
            });
        }
        self.backup.database.tables.push(table);
        self
    }

    pub fn storage(&self) -> Arc<MemoryBackupStorage> {
        Arc::new(MemoryBackupStorage {
            backup: self.backup.clone(),
            chunks: self.chunks.clone(),
            opened: AtomicUsize::new(0),
        })
    }

    pub fn write_to(&self, dir: &Path) -> Result<()> {
        std::fs::write(dir.join(CATALOG_FILE_NAME), self.backup.to_json()?)?;
        for (name, bytes) in &self.chunks {
            std::fs::write(dir.join(name), bytes)?;
        }
        Ok(())
    }
}

pub struct MemoryBackupStorage {
    backup: Backup,
    chunks: HashMap<String, Vec<u8>>,
    opened: AtomicUsize,
}

impl MemoryBackupStorage {
    /// Chunks opened so far
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BackupStorage for MemoryBackupStorage {
    async fn read_catalog(&self) -> Result<Backup> {
        Ok(self.backup.clone())
    }

    async fn open_input(&self, chunk_name: &str) -> Result<ChunkInput> {
        let bytes = self
            .chunks
            .get(chunk_name)
            .cloned()
            .ok_or_else(|| anyhow!("No such chunk: {}", chunk_name))?;
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::pin(BufReader::new(std::io::Cursor::new(bytes))))
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
