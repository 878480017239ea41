//! Built-in value formats.
//!
//! Numeric, boolean, character and LOB columns travel as their canonical text;
//! binary, BLOB, ROWID and structured/object columns travel as raw bytes.
//! Temporal parsing is a cascade: TIMESTAMP falls back to DATE and then to a
//! four-digit YEAR, DATE falls back to YEAR. Only the zoned temporal codes
//! carry an offset into the bound parameter.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone, Utc};
use rust_decimal::Decimal;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use super::extension::{ExtensionRegistry, VendorExtension};
use super::format::{ColumnRef, ValueFormat, ValueFormatRegistry};
use super::handle::AccessOptions;
use super::param::{Param, ParamType};
use super::types::SqlTypeCode;
use super::{Value, ValueType};
use crate::error::FormatError;

const DATE_FORMAT: &str = "%Y-%m-%d";
const EPOCH_DATE: &str = "1970-01-01";
const YEAR_FORMAT: &str = "%Y";
const TIME_FORMAT: &str = "%H:%M:%S%.f";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";
const TIMESTAMP_TZ_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f%:z";

const TIMESTAMP_PARSE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

const TIMESTAMP_TZ_PARSE_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%#z"];

/// Registers the built-in formats for every supported type code
pub(crate) fn register_defaults(registry: &mut ValueFormatRegistry, extensions: ExtensionRegistry) {
    use SqlTypeCode as T;

    registry.register_all(
        &[
            T::CHAR,
            T::VARCHAR,
            T::LONGVARCHAR,
            T::NCHAR,
            T::NVARCHAR,
            T::LONGNVARCHAR,
            T::CLOB,
            T::NCLOB,
            T::SQLXML,
            T::OTHER,
            T::DATALINK,
            T::VENDOR_INTERVAL_YM,
            T::VENDOR_INTERVAL_DS,
        ],
        Arc::new(StringFormat),
    );
    registry.register(T::TINYINT, Arc::new(NumberFormat::new(NumberKind::I16)));
    registry.register(T::SMALLINT, Arc::new(NumberFormat::new(NumberKind::I16)));
    registry.register(T::INTEGER, Arc::new(NumberFormat::new(NumberKind::I32)));
    registry.register(T::BIGINT, Arc::new(NumberFormat::new(NumberKind::I64)));
    registry.register(T::REAL, Arc::new(NumberFormat::new(NumberKind::F32)));
    registry.register_all(&[T::FLOAT, T::DOUBLE], Arc::new(NumberFormat::new(NumberKind::F64)));
    registry.register_all(
        &[T::NUMERIC, T::DECIMAL],
        Arc::new(NumberFormat::new(NumberKind::Decimal)),
    );
    registry.register_all(&[T::BIT, T::BOOLEAN], Arc::new(BooleanFormat));
    registry.register_all(
        &[
            T::BINARY,
            T::VARBINARY,
            T::LONGVARBINARY,
            T::BLOB,
            T::ROWID,
            T::STRUCT,
            T::ARRAY,
            T::REF,
            T::DISTINCT,
            T::JAVA_OBJECT,
        ],
        Arc::new(BinaryFormat),
    );
    registry.register(T::DATE, Arc::new(DateFormat));
    registry.register(T::TIME, Arc::new(TimeFormat));
    registry.register(T::TIME_WITH_TIMEZONE, Arc::new(TimeTzFormat));
    registry.register_all(
        &[
            T::TIMESTAMP,
            T::TIMESTAMP_WITH_TIMEZONE,
            T::VENDOR_TIMESTAMP_TZ,
            T::VENDOR_TIMESTAMP_LTZ,
        ],
        Arc::new(TimestampFormat),
    );
    registry.register(T::NULL, Arc::new(NullFormat));
    registry.register(
        T::BFILE,
        Arc::new(ExtensionFormat::new("BFILE", extensions.clone())),
    );
    registry.register(T::OPAQUE, Arc::new(ExtensionFormat::new("XMLTYPE", extensions)));
}

/// Reads the text payload of a value, NULL as `None`
fn text<'a>(value: &'a Value, column: &ColumnRef) -> Result<Option<std::borrow::Cow<'a, str>>, FormatError> {
    value.as_string().map_err(|e| column.encoding_error(e))
}

/// Canonical text for any scalar parameter
fn param_text(param: &Param) -> Option<String> {
    Some(match param {
        Param::Null(_) => return None,
        Param::Bool(v) => v.to_string(),
        Param::I16(v) => v.to_string(),
        Param::I32(v) => v.to_string(),
        Param::I64(v) => v.to_string(),
        Param::F32(v) => v.to_string(),
        Param::F64(v) => v.to_string(),
        Param::Decimal(v) => v.to_string(),
        Param::Text(v) => v.clone(),
        Param::Bytes(v) => String::from_utf8_lossy(v).into_owned(),
        Param::Date(v) => v.format(DATE_FORMAT).to_string(),
        Param::Time(v) => v.format(TIME_FORMAT).to_string(),
        Param::TimeTz(time, offset) => format_time_tz(*time, *offset),
        Param::Timestamp(v) => v.format(TIMESTAMP_FORMAT).to_string(),
        Param::TimestampTz(v) => v.format(TIMESTAMP_TZ_FORMAT).to_string(),
    })
}

// ============================================================================
// Character data
// ============================================================================

#[derive(Debug, Default)]
pub struct StringFormat;

impl ValueFormat for StringFormat {
    fn value_type(&self, _column: &ColumnRef) -> ValueType {
        ValueType::String
    }

    fn get(&self, param: &Param, column: &ColumnRef, _options: &AccessOptions) -> Result<Value, FormatError> {
        match param {
            Param::Bytes(bytes) => std::str::from_utf8(bytes)
                .map(|s| Value::string(s))
                .map_err(|e| column.encoding_error(e)),
            other => Ok(Value::String(param_text(other))),
        }
    }

    fn set(&self, value: &Value, column: &ColumnRef, _options: &AccessOptions) -> Result<Param, FormatError> {
        Ok(match text(value, column)? {
            Some(s) => Param::Text(s.into_owned()),
            None => Param::Null(ParamType::Text),
        })
    }
}

// ============================================================================
// Numbers
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberKind {
    I16,
    I32,
    I64,
    F32,
    F64,
    Decimal,
}

impl NumberKind {
    fn param_type(self) -> ParamType {
        match self {
            NumberKind::I16 => ParamType::I16,
            NumberKind::I32 => ParamType::I32,
            NumberKind::I64 => ParamType::I64,
            NumberKind::F32 => ParamType::F32,
            NumberKind::F64 => ParamType::F64,
            NumberKind::Decimal => ParamType::Decimal,
        }
    }
}

#[derive(Debug)]
pub struct NumberFormat {
    kind: NumberKind,
}

impl NumberFormat {
    pub fn new(kind: NumberKind) -> Self {
        Self { kind }
    }

    fn parse<T>(literal: &str, column: &ColumnRef) -> Result<T, FormatError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        literal
            .parse::<T>()
            .map_err(|e| column.conversion_error(literal, e))
    }

    fn parse_decimal(literal: &str, column: &ColumnRef) -> Result<Decimal, FormatError> {
        Decimal::from_str_exact(literal)
            .or_else(|_| Decimal::from_scientific(literal))
            .map_err(|e| column.conversion_error(literal, e))
    }
}

impl ValueFormat for NumberFormat {
    fn value_type(&self, _column: &ColumnRef) -> ValueType {
        ValueType::String
    }

    fn get(&self, param: &Param, column: &ColumnRef, _options: &AccessOptions) -> Result<Value, FormatError> {
        match param {
            Param::Bytes(_)
            | Param::Date(_)
            | Param::Time(_)
            | Param::TimeTz(..)
            | Param::Timestamp(_)
            | Param::TimestampTz(_) => Err(column.conversion_error(param.kind(), "not a numeric result")),
            Param::Bool(b) => Ok(Value::string(if *b { "1" } else { "0" })),
            other => Ok(Value::String(param_text(other))),
        }
    }

    fn set(&self, value: &Value, column: &ColumnRef, _options: &AccessOptions) -> Result<Param, FormatError> {
        let Some(literal) = text(value, column)? else {
            return Ok(Param::Null(self.kind.param_type()));
        };
        let literal = literal.trim();
        Ok(match self.kind {
            NumberKind::I16 => Param::I16(Self::parse(literal, column)?),
            NumberKind::I32 => Param::I32(Self::parse(literal, column)?),
            NumberKind::I64 => Param::I64(Self::parse(literal, column)?),
            NumberKind::F32 => Param::F32(Self::parse(literal, column)?),
            NumberKind::F64 => Param::F64(Self::parse(literal, column)?),
            NumberKind::Decimal => Param::Decimal(Self::parse_decimal(literal, column)?),
        })
    }
}

// ============================================================================
// Booleans
// ============================================================================

#[derive(Debug, Default)]
pub struct BooleanFormat;

impl BooleanFormat {
    fn parse(literal: &str) -> Option<bool> {
        match literal.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "1" | "yes" | "y" => Some(true),
            "false" | "f" | "0" | "no" | "n" => Some(false),
            _ => None,
        }
    }
}

impl ValueFormat for BooleanFormat {
    fn value_type(&self, _column: &ColumnRef) -> ValueType {
        ValueType::String
    }

    fn get(&self, param: &Param, column: &ColumnRef, _options: &AccessOptions) -> Result<Value, FormatError> {
        let value = match param {
            Param::Null(_) => return Ok(Value::null(ValueType::String)),
            Param::Bool(b) => *b,
            Param::I16(v) => *v != 0,
            Param::I32(v) => *v != 0,
            Param::I64(v) => *v != 0,
            Param::Text(s) => Self::parse(s).ok_or_else(|| column.conversion_error(s, "not a boolean"))?,
            other => return Err(column.conversion_error(other.kind(), "not a boolean result")),
        };
        Ok(Value::string(value.to_string()))
    }

    fn set(&self, value: &Value, column: &ColumnRef, _options: &AccessOptions) -> Result<Param, FormatError> {
        match text(value, column)? {
            None => Ok(Param::Null(ParamType::Bool)),
            Some(literal) => Self::parse(&literal)
                .map(Param::Bool)
                .ok_or_else(|| column.conversion_error(&literal, "expected true/false, t/f, yes/no or 1/0")),
        }
    }
}

// ============================================================================
// Raw bytes
// ============================================================================

#[derive(Debug, Default)]
pub struct BinaryFormat;

impl ValueFormat for BinaryFormat {
    fn value_type(&self, _column: &ColumnRef) -> ValueType {
        ValueType::Binary
    }

    fn get(&self, param: &Param, column: &ColumnRef, _options: &AccessOptions) -> Result<Value, FormatError> {
        match param {
            Param::Null(_) => Ok(Value::null(ValueType::Binary)),
            Param::Bytes(bytes) => Ok(Value::binary(bytes.clone())),
            Param::Text(text) => Ok(Value::binary(text.as_bytes().to_vec())),
            other => Err(column.conversion_error(other.kind(), "not a binary result")),
        }
    }

    fn set(&self, value: &Value, _column: &ColumnRef, _options: &AccessOptions) -> Result<Param, FormatError> {
        Ok(match value.as_bytes() {
            Some(bytes) => Param::Bytes(bytes.to_vec()),
            None => Param::Null(ParamType::Bytes),
        })
    }
}

// ============================================================================
// Temporal types
// ============================================================================

fn parse_date(literal: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(literal, DATE_FORMAT).ok()
}

fn parse_year(literal: &str) -> Option<NaiveDate> {
    if literal.len() != 4 || !literal.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let year: i32 = literal.parse().ok()?;
    NaiveDate::from_ymd_opt(year, 1, 1)
}

fn parse_timestamp(literal: &str) -> Option<NaiveDateTime> {
    TIMESTAMP_PARSE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(literal, format).ok())
}

fn parse_timestamp_tz(literal: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(literal).ok().or_else(|| {
        TIMESTAMP_TZ_PARSE_FORMATS
            .iter()
            .find_map(|format| DateTime::parse_from_str(literal, format).ok())
    })
}

fn parse_time(literal: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(literal, TIME_FORMAT)
        .or_else(|_| NaiveTime::parse_from_str(literal, "%H:%M"))
        .ok()
}

/// Time of day with an explicit offset, e.g. `10:30:00+02:00`
fn parse_time_tz(literal: &str) -> Option<(NaiveTime, FixedOffset)> {
    parse_timestamp_tz(&format!("{} {}", EPOCH_DATE, literal)).map(|dt| (dt.time(), *dt.offset()))
}

fn format_time_tz(time: NaiveTime, offset: FixedOffset) -> String {
    format!("{}{}", time.format(TIME_FORMAT), offset)
}

/// Wall-clock view of a zoned timestamp in the configured zone
fn local(dt: &DateTime<FixedOffset>, options: &AccessOptions) -> NaiveDateTime {
    match options.time_zone {
        Some(zone) => dt.with_timezone(&zone).naive_local(),
        None => dt.naive_local(),
    }
}

/// DATE columns, including the four-digit YEAR logical type
#[derive(Debug, Default)]
pub struct DateFormat;

impl DateFormat {
    fn format(date: NaiveDate, column: &ColumnRef) -> Value {
        let format = if column.is_year() { YEAR_FORMAT } else { DATE_FORMAT };
        Value::string(date.format(format).to_string())
    }
}

impl ValueFormat for DateFormat {
    fn value_type(&self, _column: &ColumnRef) -> ValueType {
        ValueType::String
    }

    fn get(&self, param: &Param, column: &ColumnRef, options: &AccessOptions) -> Result<Value, FormatError> {
        match param {
            Param::Null(_) => Ok(Value::null(ValueType::String)),
            Param::Date(date) => Ok(Self::format(*date, column)),
            Param::Timestamp(ts) => Ok(Self::format(ts.date(), column)),
            Param::TimestampTz(dt) => Ok(Self::format(local(dt, options).date(), column)),
            Param::I16(year) => Ok(Value::string(year.to_string())),
            Param::I32(year) => Ok(Value::string(year.to_string())),
            Param::I64(year) => Ok(Value::string(year.to_string())),
            Param::Text(literal) => {
                let literal = literal.trim();
                parse_date(literal)
                    .or_else(|| parse_year(literal))
                    .map(|date| Self::format(date, column))
                    .ok_or_else(|| column.conversion_error(literal, "not a date or year"))
            }
            other => Err(column.conversion_error(other.kind(), "not a date result")),
        }
    }

    fn set(&self, value: &Value, column: &ColumnRef, _options: &AccessOptions) -> Result<Param, FormatError> {
        let Some(literal) = text(value, column)? else {
            return Ok(Param::Null(ParamType::Date));
        };
        let literal = literal.trim();
        parse_date(literal)
            .or_else(|| parse_year(literal))
            .map(Param::Date)
            .ok_or_else(|| column.conversion_error(literal, "expected YYYY-MM-DD or a four-digit year"))
    }
}

#[derive(Debug, Default)]
pub struct TimeFormat;

impl ValueFormat for TimeFormat {
    fn value_type(&self, _column: &ColumnRef) -> ValueType {
        ValueType::String
    }

    fn get(&self, param: &Param, column: &ColumnRef, options: &AccessOptions) -> Result<Value, FormatError> {
        let time = match param {
            Param::Null(_) => return Ok(Value::null(ValueType::String)),
            Param::Time(time) => *time,
            Param::TimeTz(time, _) => *time,
            Param::Timestamp(ts) => ts.time(),
            Param::TimestampTz(dt) => local(dt, options).time(),
            Param::Text(literal) => {
                parse_time(literal.trim()).ok_or_else(|| column.conversion_error(literal, "not a time"))?
            }
            other => return Err(column.conversion_error(other.kind(), "not a time result")),
        };
        Ok(Value::string(time.format(TIME_FORMAT).to_string()))
    }

    fn set(&self, value: &Value, column: &ColumnRef, _options: &AccessOptions) -> Result<Param, FormatError> {
        let Some(literal) = text(value, column)? else {
            return Ok(Param::Null(ParamType::Time));
        };
        let literal = literal.trim();
        parse_time(literal)
            .map(Param::Time)
            .ok_or_else(|| column.conversion_error(literal, "expected HH:MM:SS[.fff]"))
    }
}

/// TIME WITH TIME ZONE; zone-less literals take the configured zone, else UTC
#[derive(Debug, Default)]
pub struct TimeTzFormat;

impl ValueFormat for TimeTzFormat {
    fn value_type(&self, _column: &ColumnRef) -> ValueType {
        ValueType::String
    }

    fn get(&self, param: &Param, column: &ColumnRef, _options: &AccessOptions) -> Result<Value, FormatError> {
        let (time, offset) = match param {
            Param::Null(_) => return Ok(Value::null(ValueType::String)),
            Param::TimeTz(time, offset) => (*time, *offset),
            Param::TimestampTz(dt) => (dt.time(), *dt.offset()),
            Param::Time(time) => return Ok(Value::string(time.format(TIME_FORMAT).to_string())),
            Param::Text(literal) => parse_time_tz(literal.trim())
                .ok_or_else(|| column.conversion_error(literal, "not a time with offset"))?,
            other => return Err(column.conversion_error(other.kind(), "not a time result")),
        };
        Ok(Value::string(format_time_tz(time, offset)))
    }

    fn set(&self, value: &Value, column: &ColumnRef, options: &AccessOptions) -> Result<Param, FormatError> {
        let Some(literal) = text(value, column)? else {
            return Ok(Param::Null(ParamType::TimeTz));
        };
        let literal = literal.trim();
        if let Some((time, offset)) = parse_time_tz(literal) {
            return Ok(Param::TimeTz(time, offset));
        }
        parse_time(literal)
            .map(|time| Param::TimeTz(time, options.time_zone.unwrap_or_else(|| Utc.fix())))
            .ok_or_else(|| column.conversion_error(literal, "expected HH:MM:SS[.fff][+HH:MM]"))
    }
}

#[derive(Debug, Default)]
pub struct TimestampFormat;

impl TimestampFormat {
    fn with_zone(column: &ColumnRef) -> bool {
        column.type_code.is_zoned()
    }

    /// Binds a wall-clock timestamp, placing it in the configured zone for zoned columns
    fn bind(naive: NaiveDateTime, column: &ColumnRef, options: &AccessOptions) -> Param {
        let zone = options.time_zone.filter(|_| Self::with_zone(column));
        match zone.and_then(|zone| zone.from_local_datetime(&naive).single()) {
            Some(dt) => Param::TimestampTz(dt),
            None => Param::Timestamp(naive),
        }
    }
}

impl ValueFormat for TimestampFormat {
    fn value_type(&self, _column: &ColumnRef) -> ValueType {
        ValueType::String
    }

    fn get(&self, param: &Param, column: &ColumnRef, options: &AccessOptions) -> Result<Value, FormatError> {
        let text = match param {
            Param::Null(_) => return Ok(Value::null(ValueType::String)),
            Param::Timestamp(ts) => ts.format(TIMESTAMP_FORMAT).to_string(),
            Param::TimestampTz(dt) if Self::with_zone(column) && options.time_zone.is_none() => {
                dt.format(TIMESTAMP_TZ_FORMAT).to_string()
            }
            Param::TimestampTz(dt) => local(dt, options).format(TIMESTAMP_FORMAT).to_string(),
            Param::Date(date) => date.format(DATE_FORMAT).to_string(),
            Param::Text(literal) => literal.clone(),
            other => return Err(column.conversion_error(other.kind(), "not a timestamp result")),
        };
        Ok(Value::string(text))
    }

    fn set(&self, value: &Value, column: &ColumnRef, options: &AccessOptions) -> Result<Param, FormatError> {
        let Some(literal) = text(value, column)? else {
            return Ok(Param::Null(if Self::with_zone(column) {
                ParamType::TimestampTz
            } else {
                ParamType::Timestamp
            }));
        };
        let literal = literal.trim();

        if let Some(dt) = parse_timestamp_tz(literal) {
            // A zone-less column keeps the literal's wall clock
            return Ok(if Self::with_zone(column) {
                Param::TimestampTz(dt)
            } else {
                Param::Timestamp(dt.naive_local())
            });
        }
        if let Some(ts) = parse_timestamp(literal) {
            return Ok(Self::bind(ts, column, options));
        }
        // Best effort: a bare date, then a bare year, both at midnight
        parse_date(literal)
            .or_else(|| parse_year(literal))
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(|ts| Self::bind(ts, column, options))
            .ok_or_else(|| column.conversion_error(literal, "expected a timestamp, date or year"))
    }
}

// ============================================================================
// Special cases
// ============================================================================

/// Columns declared with the NULL type carry no data
#[derive(Debug, Default)]
pub struct NullFormat;

impl ValueFormat for NullFormat {
    fn value_type(&self, _column: &ColumnRef) -> ValueType {
        ValueType::String
    }

    fn get(&self, _param: &Param, _column: &ColumnRef, _options: &AccessOptions) -> Result<Value, FormatError> {
        Ok(Value::null(ValueType::String))
    }

    fn set(&self, _value: &Value, _column: &ColumnRef, _options: &AccessOptions) -> Result<Param, FormatError> {
        Ok(Param::Null(ParamType::Text))
    }
}

/// Vendor type bound through a driver extension resolved on first use
pub struct ExtensionFormat {
    extension: &'static str,
    registry: ExtensionRegistry,
    resolved: OnceLock<Result<Arc<dyn VendorExtension>, String>>,
}

impl ExtensionFormat {
    pub fn new(extension: &'static str, registry: ExtensionRegistry) -> Self {
        Self {
            extension,
            registry,
            resolved: OnceLock::new(),
        }
    }

    fn resolve(&self, column: &ColumnRef) -> Result<&Arc<dyn VendorExtension>, FormatError> {
        self.resolved
            .get_or_init(|| self.registry.resolve(self.extension))
            .as_ref()
            .map_err(|reason| FormatError::ExtensionUnavailable {
                column: column.qualified_name.clone(),
                type_name: column.type_name.clone(),
                extension: self.extension.to_string(),
                reason: reason.clone(),
            })
    }
}

impl fmt::Debug for ExtensionFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.resolved.get() {
            None => "unresolved",
            Some(Ok(_)) => "available",
            Some(Err(_)) => "unavailable",
        };
        f.debug_struct("ExtensionFormat")
            .field("extension", &self.extension)
            .field("state", &state)
            .finish()
    }
}

impl ValueFormat for ExtensionFormat {
    fn value_type(&self, _column: &ColumnRef) -> ValueType {
        ValueType::String
    }

    fn get(&self, param: &Param, column: &ColumnRef, _options: &AccessOptions) -> Result<Value, FormatError> {
        if param.is_null() {
            return Ok(Value::null(ValueType::String));
        }
        let extension = self.resolve(column)?;
        extension
            .from_param(param)
            .map(Value::string)
            .map_err(|reason| column.conversion_error(param.kind(), reason))
    }

    fn set(&self, value: &Value, column: &ColumnRef, _options: &AccessOptions) -> Result<Param, FormatError> {
        let Some(literal) = text(value, column)? else {
            return Ok(Param::Null(ParamType::Text));
        };
        let extension = self.resolve(column)?;
        extension
            .to_param(&literal)
            .map_err(|reason| column.conversion_error(&literal, reason))
    }
}
