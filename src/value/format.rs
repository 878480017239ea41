//! The per-type conversion contract and the registry that selects a format for
//! each target column.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::extension::ExtensionRegistry;
use super::formats;
use super::handle::AccessOptions;
use super::param::Param;
use super::types::SqlTypeCode;
use super::{Value, ValueType};
use crate::error::FormatError;

/// Target column as seen by a format: its qualified location and resolved type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnRef {
    /// `schema.table.column`, or `table.column` when there is no schema
    pub qualified_name: String,
    pub type_code: SqlTypeCode,
    pub type_name: String,
}

impl ColumnRef {
    pub fn new(qualified_name: impl Into<String>, type_code: SqlTypeCode, type_name: impl Into<String>) -> Self {
        Self {
            qualified_name: qualified_name.into(),
            type_code,
            type_name: type_name.into(),
        }
    }

    pub fn conversion_error(&self, value: impl fmt::Display, reason: impl fmt::Display) -> FormatError {
        FormatError::Conversion {
            column: self.qualified_name.clone(),
            type_name: self.type_name.clone(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn unsupported(&self) -> FormatError {
        FormatError::UnsupportedType {
            column: self.qualified_name.clone(),
            type_name: self.type_name.clone(),
            type_code: self.type_code.0,
        }
    }

    pub fn encoding_error(&self, source: std::str::Utf8Error) -> FormatError {
        FormatError::Encoding {
            column: self.qualified_name.clone(),
            type_name: self.type_name.clone(),
            source,
        }
    }

    /// Whether the declared type name marks a DATE column as a four-digit year
    pub fn is_year(&self) -> bool {
        self.type_name.trim().eq_ignore_ascii_case("YEAR")
    }
}

/// Conversion strategy between backup values and native parameters for one
/// family of SQL type codes.
///
/// Both directions are total over the codes a format is registered for: any
/// failure is a [`FormatError`] naming the column, never a raw parse error.
pub trait ValueFormat: Send + Sync + fmt::Debug {
    /// Encoding the backup uses for values of this column
    fn value_type(&self, column: &ColumnRef) -> ValueType;

    /// Native result value to backup value
    fn get(&self, param: &Param, column: &ColumnRef, options: &AccessOptions) -> Result<Value, FormatError>;

    /// Backup value to native statement parameter
    fn set(&self, value: &Value, column: &ColumnRef, options: &AccessOptions) -> Result<Param, FormatError>;
}

/// Maps SQL type codes to their formats
#[derive(Debug, Clone)]
pub struct ValueFormatRegistry {
    formats: HashMap<SqlTypeCode, Arc<dyn ValueFormat>>,
}

impl ValueFormatRegistry {
    /// An empty registry; every lookup fails until formats are registered
    pub fn empty() -> Self {
        Self {
            formats: HashMap::new(),
        }
    }

    /// Registry with every built-in format; vendor formats use `extensions`
    pub fn new(extensions: ExtensionRegistry) -> Self {
        let mut registry = Self::empty();
        formats::register_defaults(&mut registry, extensions);
        registry
    }

    pub fn register(&mut self, code: SqlTypeCode, format: Arc<dyn ValueFormat>) {
        self.formats.insert(code, format);
    }

    pub fn register_all(&mut self, codes: &[SqlTypeCode], format: Arc<dyn ValueFormat>) {
        for code in codes {
            self.register(*code, Arc::clone(&format));
        }
    }

    #[cfg(test)]
    pub(crate) fn codes(&self) -> impl Iterator<Item = SqlTypeCode> + '_ {
        self.formats.keys().copied()
    }

    pub fn lookup(&self, column: &ColumnRef) -> Result<Arc<dyn ValueFormat>, FormatError> {
        self.formats
            .get(&column.type_code)
            .cloned()
            .ok_or_else(|| column.unsupported())
    }
}

impl Default for ValueFormatRegistry {
    fn default() -> Self {
        Self::new(ExtensionRegistry::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_code_is_hard_error() {
        let registry = ValueFormatRegistry::default();
        let column = ColumnRef::new("public.t.c", SqlTypeCode(31337), "GEOGRAPHY");
        let err = registry.lookup(&column).unwrap_err();
        match err {
            FormatError::UnsupportedType {
                column,
                type_name,
                type_code,
            } => {
                assert_eq!(column, "public.t.c");
                assert_eq!(type_name, "GEOGRAPHY");
                assert_eq!(type_code, 31337);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_year_detection() {
        assert!(ColumnRef::new("t.y", SqlTypeCode::DATE, "year").is_year());
        assert!(!ColumnRef::new("t.d", SqlTypeCode::DATE, "DATE").is_year());
    }
}
