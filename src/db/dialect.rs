//! Target dialects: type registry, identifier rules and capabilities.

use std::fmt;
use std::sync::Arc;

use crate::backup::metadata::Column;
use crate::value::extension::XmlTextExtension;
use crate::value::{ExtensionRegistry, SqlTypeCode};

pub trait Dialect: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Maps a captured type to the canonical (code, name) the target binds with
    fn resolve_type(&self, code: SqlTypeCode, name: &str) -> (SqlTypeCode, String) {
        let resolved = canonical_code(code);
        if resolved == code {
            (code, name.to_string())
        } else {
            (resolved, resolved.to_string())
        }
    }

    /// Column type used in CREATE TABLE
    fn column_type(&self, column: &Column) -> String;

    fn quote(&self, identifier: &str) -> String {
        format!("\"{}\"", identifier.replace('"', "\"\""))
    }

    /// Quoted, optionally schema-qualified object name
    fn qualify(&self, schema: Option<&str>, name: &str) -> String {
        match schema {
            Some(schema) if self.supports_schemas() => {
                format!("{}.{}", self.quote(schema), self.quote(name))
            }
            _ => self.quote(name),
        }
    }

    /// Statement parameter marker for a 1-based position
    fn placeholder(&self, position: usize) -> String;

    fn supports_schemas(&self) -> bool;

    fn supports_sequences(&self) -> bool;

    fn supports_catalogs(&self) -> bool;

    /// Whether all indexes of a table may be created by one unit of work
    fn supports_multiple_indexes(&self) -> bool;

    /// Whether primary and foreign keys can be added to an existing table
    fn supports_alter_constraints(&self) -> bool;

    /// Whether temporal parameters must carry the load's time zone
    fn requires_time_zone_binding(&self) -> bool;

    /// Statement taking an exclusive lock on a table inside a transaction
    fn lock_table(&self, qualified_table: &str) -> Option<String>;

    /// Vendor extensions available on this driver
    fn extensions(&self) -> ExtensionRegistry;
}

/// Folds vendor and alias codes onto the standard code the formats know
fn canonical_code(code: SqlTypeCode) -> SqlTypeCode {
    use SqlTypeCode as T;
    match code {
        T::VENDOR_TIMESTAMP_TZ | T::VENDOR_TIMESTAMP_LTZ => T::TIMESTAMP_WITH_TIMEZONE,
        T::NCHAR => T::CHAR,
        T::NVARCHAR => T::VARCHAR,
        T::LONGNVARCHAR => T::LONGVARCHAR,
        T::NCLOB => T::CLOB,
        other => other,
    }
}

fn sized(base: &str, column: &Column) -> String {
    match (column.size, column.scale) {
        (Some(size), Some(scale)) if size > 0 => format!("{}({},{})", base, size, scale),
        (Some(size), None) if size > 0 => format!("{}({})", base, size),
        _ => base.to_string(),
    }
}

#[derive(Debug, Clone, Default)]
pub struct PostgresDialect;

impl PostgresDialect {
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn resolve_type(&self, code: SqlTypeCode, name: &str) -> (SqlTypeCode, String) {
        match code {
            // No unsigned byte type; widen to the smallest integer
            SqlTypeCode::TINYINT => (SqlTypeCode::SMALLINT, "SMALLINT".to_string()),
            SqlTypeCode::BIT => (SqlTypeCode::BOOLEAN, "BOOLEAN".to_string()),
            SqlTypeCode::FLOAT => (SqlTypeCode::DOUBLE, "DOUBLE PRECISION".to_string()),
            other => {
                let resolved = canonical_code(other);
                if resolved == other {
                    (other, name.to_string())
                } else {
                    (resolved, resolved.to_string())
                }
            }
        }
    }

    fn column_type(&self, column: &Column) -> String {
        use SqlTypeCode as T;
        let (code, _) = self.resolve_type(column.type_code, &column.type_name);
        match code {
            T::BOOLEAN => "BOOLEAN".to_string(),
            T::SMALLINT => "SMALLINT".to_string(),
            T::INTEGER => "INTEGER".to_string(),
            T::BIGINT => "BIGINT".to_string(),
            T::REAL => "REAL".to_string(),
            T::DOUBLE => "DOUBLE PRECISION".to_string(),
            T::NUMERIC | T::DECIMAL => sized("NUMERIC", column),
            T::CHAR => sized("CHAR", column),
            T::VARCHAR => sized("VARCHAR", column),
            T::DATE => "DATE".to_string(),
            T::TIME => "TIME".to_string(),
            T::TIME_WITH_TIMEZONE => "TIMETZ".to_string(),
            T::TIMESTAMP => "TIMESTAMP".to_string(),
            T::TIMESTAMP_WITH_TIMEZONE => "TIMESTAMPTZ".to_string(),
            T::BINARY
            | T::VARBINARY
            | T::LONGVARBINARY
            | T::BLOB
            | T::ROWID
            | T::STRUCT
            | T::ARRAY
            | T::REF
            | T::DISTINCT
            | T::JAVA_OBJECT => "BYTEA".to_string(),
            _ => "TEXT".to_string(),
        }
    }

    fn placeholder(&self, position: usize) -> String {
        format!("${}", position)
    }

    fn supports_schemas(&self) -> bool {
        true
    }

    fn supports_sequences(&self) -> bool {
        true
    }

    fn supports_catalogs(&self) -> bool {
        true
    }

    fn supports_multiple_indexes(&self) -> bool {
        false
    }

    fn supports_alter_constraints(&self) -> bool {
        true
    }

    fn requires_time_zone_binding(&self) -> bool {
        true
    }

    fn lock_table(&self, qualified_table: &str) -> Option<String> {
        Some(format!("LOCK TABLE {} IN ACCESS EXCLUSIVE MODE", qualified_table))
    }

    fn extensions(&self) -> ExtensionRegistry {
        ExtensionRegistry::new().with(Arc::new(XmlTextExtension))
    }
}

/// SQLite: no schemas or sequences, constraints only at creation time.
/// A table's indexes are built together since SQLite has a single writer.
#[derive(Debug, Clone, Default)]
pub struct SqliteDialect;

impl SqliteDialect {
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn column_type(&self, column: &Column) -> String {
        use SqlTypeCode as T;
        let (code, _) = self.resolve_type(column.type_code, &column.type_name);
        match code {
            T::BIT | T::BOOLEAN | T::TINYINT | T::SMALLINT | T::INTEGER | T::BIGINT => {
                "INTEGER".to_string()
            }
            T::REAL | T::FLOAT | T::DOUBLE => "REAL".to_string(),
            T::BINARY
            | T::VARBINARY
            | T::LONGVARBINARY
            | T::BLOB
            | T::ROWID
            | T::STRUCT
            | T::ARRAY
            | T::REF
            | T::DISTINCT
            | T::JAVA_OBJECT => "BLOB".to_string(),
            // Decimals stay text so scale survives
            _ => "TEXT".to_string(),
        }
    }

    fn placeholder(&self, _position: usize) -> String {
        "?".to_string()
    }

    fn supports_schemas(&self) -> bool {
        false
    }

    fn supports_sequences(&self) -> bool {
        false
    }

    fn supports_catalogs(&self) -> bool {
        false
    }

    fn supports_multiple_indexes(&self) -> bool {
        true
    }

    fn supports_alter_constraints(&self) -> bool {
        false
    }

    fn requires_time_zone_binding(&self) -> bool {
        false
    }

    fn lock_table(&self, _qualified_table: &str) -> Option<String> {
        None
    }

    fn extensions(&self) -> ExtensionRegistry {
        ExtensionRegistry::new()
    }
}
