//! JSON-lines chunk codec.
//!
//! Each line is a JSON array with one element per row-set column: `null` or a
//! string. BINARY columns carry lowercase hex.

use anyhow::{Context, Result, anyhow, bail};
use serde_json::Value as Json;
use std::pin::Pin;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};

use crate::value::{Value, ValueType};

pub type ChunkInput = Pin<Box<dyn AsyncBufRead + Send>>;

/// Streams the rows of one chunk
pub struct ChunkDecoder {
    chunk: String,
    value_types: Vec<ValueType>,
    lines: Lines<ChunkInput>,
    line: u64,
}

impl ChunkDecoder {
    pub fn new(chunk: impl Into<String>, value_types: Vec<ValueType>, input: ChunkInput) -> Self {
        Self {
            chunk: chunk.into(),
            value_types,
            lines: input.lines(),
            line: 0,
        }
    }

    pub fn chunk(&self) -> &str {
        &self.chunk
    }

    /// Decodes the next row, `None` once the chunk is exhausted
    pub async fn next_row(&mut self) -> Result<Option<Vec<Value>>> {
        loop {
            let Some(line) = self
                .lines
                .next_line()
                .await
                .with_context(|| format!("Failed to read chunk {}", self.chunk))?
            else {
                return Ok(None);
            };
            self.line += 1;
            if line.trim().is_empty() {
                continue;
            }
            return decode_line(&line, &self.value_types)
                .map(Some)
                .with_context(|| format!("Invalid row at {}:{}", self.chunk, self.line));
        }
    }
}

fn decode_line(line: &str, value_types: &[ValueType]) -> Result<Vec<Value>> {
    let Json::Array(items) = serde_json::from_str::<Json>(line)? else {
        bail!("expected a JSON array");
    };
    if items.len() != value_types.len() {
        bail!("expected {} columns, found {}", value_types.len(), items.len());
    }

    items
        .into_iter()
        .zip(value_types)
        .enumerate()
        .map(|(position, (item, value_type))| match (item, value_type) {
            (Json::Null, vt) => Ok(Value::null(*vt)),
            (Json::String(s), ValueType::String) => Ok(Value::String(Some(s))),
            (Json::String(s), ValueType::Binary) => hex::decode(&s)
                .map(Value::binary)
                .map_err(|e| anyhow!("column {}: invalid hex: {}", position, e)),
            (other, _) => Err(anyhow!("column {}: expected string or null, found {}", position, other)),
        })
        .collect()
}

/// Writes rows in chunk encoding
#[derive(Debug, Clone)]
pub struct ChunkEncoder {
    value_types: Vec<ValueType>,
}

impl ChunkEncoder {
    pub fn new(value_types: Vec<ValueType>) -> Self {
        Self { value_types }
    }

    pub fn encode_line(&self, values: &[Value]) -> Result<String> {
        if values.len() != self.value_types.len() {
            bail!("expected {} columns, found {}", self.value_types.len(), values.len());
        }
        let items = values
            .iter()
            .zip(&self.value_types)
            .map(|(value, value_type)| match value_type {
                _ if value.is_null() => Ok(Json::Null),
                ValueType::Binary => Ok(Json::String(hex::encode(value.as_bytes().unwrap_or_default()))),
                ValueType::String => value
                    .as_string()
                    .map(|s| s.map_or(Json::Null, |s| Json::String(s.into_owned())))
                    .map_err(|e| anyhow!("string column is not valid UTF-8: {}", e)),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(serde_json::to_string(&Json::Array(items))?)
    }

    /// Encodes a whole chunk, one line per row
    pub fn encode<'a, I>(&self, rows: I) -> Result<Vec<u8>>
    where
        I: IntoIterator<Item = &'a [Value]>,
    {
        let mut out = Vec::new();
        for row in rows {
            out.extend_from_slice(self.encode_line(row)?.as_bytes());
            out.push(b'\n');
        }
        Ok(out)
    }
}
