//! Numeric SQL type codes as recorded in the backup catalog.
//!
//! The standard codes follow the SQL/CLI numbering; the negative and 2007 codes
//! are legacy vendor extensions captured from Oracle-style sources.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SqlTypeCode(pub i32);

impl SqlTypeCode {
    pub const BIT: SqlTypeCode = SqlTypeCode(-7);
    pub const TINYINT: SqlTypeCode = SqlTypeCode(-6);
    pub const SMALLINT: SqlTypeCode = SqlTypeCode(5);
    pub const INTEGER: SqlTypeCode = SqlTypeCode(4);
    pub const BIGINT: SqlTypeCode = SqlTypeCode(-5);
    pub const FLOAT: SqlTypeCode = SqlTypeCode(6);
    pub const REAL: SqlTypeCode = SqlTypeCode(7);
    pub const DOUBLE: SqlTypeCode = SqlTypeCode(8);
    pub const NUMERIC: SqlTypeCode = SqlTypeCode(2);
    pub const DECIMAL: SqlTypeCode = SqlTypeCode(3);
    pub const CHAR: SqlTypeCode = SqlTypeCode(1);
    pub const VARCHAR: SqlTypeCode = SqlTypeCode(12);
    pub const LONGVARCHAR: SqlTypeCode = SqlTypeCode(-1);
    pub const DATE: SqlTypeCode = SqlTypeCode(91);
    pub const TIME: SqlTypeCode = SqlTypeCode(92);
    pub const TIMESTAMP: SqlTypeCode = SqlTypeCode(93);
    pub const BINARY: SqlTypeCode = SqlTypeCode(-2);
    pub const VARBINARY: SqlTypeCode = SqlTypeCode(-3);
    pub const LONGVARBINARY: SqlTypeCode = SqlTypeCode(-4);
    pub const NULL: SqlTypeCode = SqlTypeCode(0);
    pub const OTHER: SqlTypeCode = SqlTypeCode(1111);
    pub const JAVA_OBJECT: SqlTypeCode = SqlTypeCode(2000);
    pub const DISTINCT: SqlTypeCode = SqlTypeCode(2001);
    pub const STRUCT: SqlTypeCode = SqlTypeCode(2002);
    pub const ARRAY: SqlTypeCode = SqlTypeCode(2003);
    pub const BLOB: SqlTypeCode = SqlTypeCode(2004);
    pub const CLOB: SqlTypeCode = SqlTypeCode(2005);
    pub const REF: SqlTypeCode = SqlTypeCode(2006);
    pub const DATALINK: SqlTypeCode = SqlTypeCode(70);
    pub const BOOLEAN: SqlTypeCode = SqlTypeCode(16);
    pub const ROWID: SqlTypeCode = SqlTypeCode(-8);
    pub const NCHAR: SqlTypeCode = SqlTypeCode(-15);
    pub const NVARCHAR: SqlTypeCode = SqlTypeCode(-9);
    pub const LONGNVARCHAR: SqlTypeCode = SqlTypeCode(-16);
    pub const NCLOB: SqlTypeCode = SqlTypeCode(2011);
    pub const SQLXML: SqlTypeCode = SqlTypeCode(2009);
    pub const TIME_WITH_TIMEZONE: SqlTypeCode = SqlTypeCode(2013);
    pub const TIMESTAMP_WITH_TIMEZONE: SqlTypeCode = SqlTypeCode(2014);

    // Legacy vendor extensions
    pub const BFILE: SqlTypeCode = SqlTypeCode(-13);
    pub const OPAQUE: SqlTypeCode = SqlTypeCode(2007);
    pub const VENDOR_TIMESTAMP_TZ: SqlTypeCode = SqlTypeCode(-101);
    pub const VENDOR_TIMESTAMP_LTZ: SqlTypeCode = SqlTypeCode(-102);
    pub const VENDOR_INTERVAL_YM: SqlTypeCode = SqlTypeCode(-103);
    pub const VENDOR_INTERVAL_DS: SqlTypeCode = SqlTypeCode(-104);

    /// Canonical name of a known code, `None` for codes this crate does not know.
    pub fn name(self) -> Option<&'static str> {
        let name = match self {
            Self::BIT => "BIT",
            Self::TINYINT => "TINYINT",
            Self::SMALLINT => "SMALLINT",
            Self::INTEGER => "INTEGER",
            Self::BIGINT => "BIGINT",
            Self::FLOAT => "FLOAT",
            Self::REAL => "REAL",
            Self::DOUBLE => "DOUBLE",
            Self::NUMERIC => "NUMERIC",
            Self::DECIMAL => "DECIMAL",
            Self::CHAR => "CHAR",
            Self::VARCHAR => "VARCHAR",
            Self::LONGVARCHAR => "LONGVARCHAR",
            Self::DATE => "DATE",
            Self::TIME => "TIME",
            Self::TIMESTAMP => "TIMESTAMP",
            Self::BINARY => "BINARY",
            Self::VARBINARY => "VARBINARY",
            Self::LONGVARBINARY => "LONGVARBINARY",
            Self::NULL => "NULL",
            Self::OTHER => "OTHER",
            Self::JAVA_OBJECT => "JAVA_OBJECT",
            Self::DISTINCT => "DISTINCT",
            Self::STRUCT => "STRUCT",
            Self::ARRAY => "ARRAY",
            Self::BLOB => "BLOB",
            Self::CLOB => "CLOB",
            Self::REF => "REF",
            Self::DATALINK => "DATALINK",
            Self::BOOLEAN => "BOOLEAN",
            Self::ROWID => "ROWID",
            Self::NCHAR => "NCHAR",
            Self::NVARCHAR => "NVARCHAR",
            Self::LONGNVARCHAR => "LONGNVARCHAR",
            Self::NCLOB => "NCLOB",
            Self::SQLXML => "SQLXML",
            Self::TIME_WITH_TIMEZONE => "TIME WITH TIME ZONE",
            Self::TIMESTAMP_WITH_TIMEZONE => "TIMESTAMP WITH TIME ZONE",
            Self::BFILE => "BFILE",
            Self::OPAQUE => "XMLTYPE",
            Self::VENDOR_TIMESTAMP_TZ => "TIMESTAMP WITH TIME ZONE",
            Self::VENDOR_TIMESTAMP_LTZ => "TIMESTAMP WITH LOCAL TIME ZONE",
            Self::VENDOR_INTERVAL_YM => "INTERVAL YEAR TO MONTH",
            Self::VENDOR_INTERVAL_DS => "INTERVAL DAY TO SECOND",
            _ => return None,
        };
        Some(name)
    }

    /// DATE, TIME and TIMESTAMP family codes, which may need a time zone when bound.
    pub fn is_temporal(self) -> bool {
        matches!(
            self,
            Self::DATE
                | Self::TIME
                | Self::TIME_WITH_TIMEZONE
                | Self::TIMESTAMP
                | Self::TIMESTAMP_WITH_TIMEZONE
                | Self::VENDOR_TIMESTAMP_TZ
                | Self::VENDOR_TIMESTAMP_LTZ
        )
    }

    /// Temporal codes whose values carry an offset; formats bind only these with a time zone.
    pub fn is_zoned(self) -> bool {
        matches!(
            self,
            Self::TIME_WITH_TIMEZONE
                | Self::TIMESTAMP_WITH_TIMEZONE
                | Self::VENDOR_TIMESTAMP_TZ
                | Self::VENDOR_TIMESTAMP_LTZ
        )
    }
}

impl fmt::Display for SqlTypeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "TYPE({})", self.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_and_unknown_codes() {
        assert_eq!(SqlTypeCode::INTEGER.name(), Some("INTEGER"));
        assert_eq!(SqlTypeCode::OPAQUE.name(), Some("XMLTYPE"));
        assert_eq!(SqlTypeCode(4242).name(), None);
        assert_eq!(SqlTypeCode(4242).to_string(), "TYPE(4242)");
    }

    #[test]
    fn test_temporal_codes() {
        assert!(SqlTypeCode::DATE.is_temporal());
        assert!(SqlTypeCode::VENDOR_TIMESTAMP_LTZ.is_temporal());
        assert!(!SqlTypeCode::VARCHAR.is_temporal());
    }

    #[test]
    fn test_zoned_codes() {
        assert!(SqlTypeCode::TIMESTAMP_WITH_TIMEZONE.is_zoned());
        assert!(SqlTypeCode::VENDOR_TIMESTAMP_LTZ.is_zoned());
        assert!(SqlTypeCode::TIME_WITH_TIMEZONE.is_zoned());
        assert!(!SqlTypeCode::TIMESTAMP.is_zoned());
        assert!(!SqlTypeCode::DATE.is_zoned());
    }
}
