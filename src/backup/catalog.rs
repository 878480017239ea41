//! The backup catalog: captured schema plus the row-sets and chunks holding
//! each table's rows.

use anyhow::{Context, Result, anyhow};
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};

use super::metadata::Database;
use crate::value::ValueType;

/// Chunk encoding recorded in the catalog
pub const FORMAT_JSONL: &str = "jsonl";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backup {
    #[serde(default = "default_format")]
    pub format: String,
    /// Zone of the source session, e.g. `+02:00`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
    #[serde(default)]
    pub database: Database,
    #[serde(default)]
    pub row_sets: Vec<RowSet>,
}

fn default_format() -> String {
    FORMAT_JSONL.to_string()
}

impl Default for Backup {
    fn default() -> Self {
        Self::new(Database::default())
    }
}

impl Backup {
    pub fn new(database: Database) -> Self {
        Self {
            format: default_format(),
            time_zone: None,
            database,
            row_sets: Vec::new(),
        }
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let backup: Backup = serde_json::from_slice(bytes).context("Failed to parse backup catalog")?;
        if backup.format != FORMAT_JSONL {
            return Err(anyhow!(
                "Unsupported chunk format '{}'. Supported formats: {}",
                backup.format,
                FORMAT_JSONL
            ));
        }
        Ok(backup)
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self).context("Failed to serialize backup catalog")
    }

    /// Parses the recorded source time zone, if any
    pub fn time_zone(&self) -> Result<Option<FixedOffset>> {
        self.time_zone.as_deref().map(parse_time_zone).transpose()
    }

    /// Largest row-set byte size, the reference for size-weighted parallelism
    pub fn max_row_set_size(&self) -> u64 {
        self.row_sets.iter().map(RowSet::size).max().unwrap_or(0)
    }
}

/// Parses `Z`, `UTC` or a `±HH:MM` offset
pub fn parse_time_zone(value: &str) -> Result<FixedOffset> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("z") || value.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0).ok_or_else(|| anyhow!("Invalid UTC offset"));
    }
    value
        .parse::<FixedOffset>()
        .map_err(|e| anyhow!("Invalid time zone '{}': {}. Expected an offset such as +02:00", value, e))
}

/// One table's captured rows
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RowSet {
    pub name: String,
    /// Qualified name of the table the rows belong to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    pub columns: Vec<RowSetColumn>,
    #[serde(default)]
    pub chunks: Vec<Chunk>,
}

impl RowSet {
    pub fn row_count(&self) -> u64 {
        self.chunks.iter().map(|c| c.row_count).sum()
    }

    pub fn size(&self) -> u64 {
        self.chunks.iter().map(|c| c.size).sum()
    }

    /// Table this row-set targets, defaulting to the row-set name
    pub fn table_name(&self) -> &str {
        self.table.as_deref().unwrap_or(&self.name)
    }

    pub fn value_types(&self) -> Vec<ValueType> {
        self.columns.iter().map(|c| c.value_type).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RowSetColumn {
    pub name: String,
    pub value_type: ValueType,
}

impl RowSetColumn {
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
        }
    }
}

/// Independently openable segment of a row-set
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Chunk {
    pub name: String,
    pub row_count: u64,
    #[serde(default)]
    pub size: u64,
}

impl Chunk {
    pub fn new(name: impl Into<String>, row_count: u64, size: u64) -> Self {
        Self {
            name: name.into(),
            row_count,
            size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_set_totals() {
        let row_set = RowSet {
            name: "orders".to_string(),
            table: Some("sales.orders".to_string()),
            columns: vec![RowSetColumn::new("id", ValueType::String)],
            chunks: vec![
                Chunk::new("orders.0.jsonl", 1000, 40_000),
                Chunk::new("orders.1.jsonl", 1000, 41_000),
                Chunk::new("orders.2.jsonl", 500, 19_000),
            ],
        };
        assert_eq!(row_set.row_count(), 2500);
        assert_eq!(row_set.size(), 100_000);
        assert_eq!(row_set.table_name(), "sales.orders");
    }

    #[test]
    fn test_default_catalog_is_empty_jsonl() {
        let backup = Backup::default();
        assert_eq!(backup.format, FORMAT_JSONL);
        assert!(backup.row_sets.is_empty());
        assert_eq!(backup, Backup::new(Database::default()));
        // A default catalog survives its own serialization
        assert_eq!(Backup::from_json(&backup.to_json().unwrap()).unwrap(), backup);
    }

    #[test]
    fn test_parse_catalog() {
        let json = br#"{
            "time_zone": "+02:00",
            "database": {"tables": [{"name": "t", "columns": [
                {"name": "id", "type_code": 4, "type_name": "INTEGER"}
            ]}]},
            "row_sets": [{"name": "t", "columns": [{"name": "id", "value_type": "string"}],
                          "chunks": [{"name": "t.0.jsonl", "row_count": 2, "size": 10}]}]
        }"#;
        let backup = Backup::from_json(json).unwrap();
        assert_eq!(backup.format, FORMAT_JSONL);
        assert_eq!(backup.time_zone().unwrap(), FixedOffset::east_opt(7200));
        assert_eq!(backup.max_row_set_size(), 10);
        assert_eq!(backup.row_sets[0].table_name(), "t");
    }

    #[test]
    fn test_reject_unknown_format() {
        let err = Backup::from_json(br#"{"format": "csv"}"#).unwrap_err();
        assert!(err.to_string().contains("Unsupported chunk format"));
    }

    #[test]
    fn test_time_zone_parsing() {
        assert_eq!(parse_time_zone("UTC").unwrap(), FixedOffset::east_opt(0).unwrap());
        assert_eq!(parse_time_zone("-05:30").unwrap(), FixedOffset::west_opt(5 * 3600 + 1800).unwrap());
        assert!(parse_time_zone("Europe/Paris").is_err());
    }
}
