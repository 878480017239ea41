//! Native statement parameters and positional accessors.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;

/// Declared type of a NULL parameter, so drivers can bind a typed NULL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Bool,
    I16,
    I32,
    I64,
    F32,
    F64,
    Decimal,
    Text,
    Bytes,
    Date,
    Time,
    TimeTz,
    Timestamp,
    TimestampTz,
}

/// A value in the native representation a driver binds to a statement
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Null(ParamType),
    Bool(bool),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Decimal(Decimal),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    TimeTz(NaiveTime, FixedOffset),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<FixedOffset>),
}

impl Param {
    pub fn is_null(&self) -> bool {
        matches!(self, Param::Null(_))
    }

    /// Name of the native representation, used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Param::Null(_) => "null",
            Param::Bool(_) => "bool",
            Param::I16(_) => "i16",
            Param::I32(_) => "i32",
            Param::I64(_) => "i64",
            Param::F32(_) => "f32",
            Param::F64(_) => "f64",
            Param::Decimal(_) => "decimal",
            Param::Text(_) => "text",
            Param::Bytes(_) => "bytes",
            Param::Date(_) => "date",
            Param::Time(_) => "time",
            Param::TimeTz(..) => "timetz",
            Param::Timestamp(_) => "timestamp",
            Param::TimestampTz(_) => "timestamptz",
        }
    }
}

/// Read side accessor: a fetched row whose columns are addressed by position
pub trait ResultCursor {
    fn get(&self, index: usize) -> Option<&Param>;
}

/// Write side accessor: the parameter slots of one statement execution
pub trait ParameterBinder {
    fn set(&mut self, index: usize, param: Param);
}

impl ResultCursor for [Param] {
    fn get(&self, index: usize) -> Option<&Param> {
        <[Param]>::get(self, index)
    }
}

impl ResultCursor for Vec<Param> {
    fn get(&self, index: usize) -> Option<&Param> {
        self.as_slice().get(index)
    }
}

/// Parameter slots for one row, sized to the statement's parameter count
#[derive(Debug, Clone, PartialEq)]
pub struct ParamRow {
    params: Vec<Param>,
}

impl ParamRow {
    pub fn new(len: usize) -> Self {
        Self {
            params: vec![Param::Null(ParamType::Text); len],
        }
    }

    pub fn into_params(self) -> Vec<Param> {
        self.params
    }
}

impl ParameterBinder for ParamRow {
    fn set(&mut self, index: usize, param: Param) {
        if index >= self.params.len() {
            self.params.resize(index + 1, Param::Null(ParamType::Text));
        }
        self.params[index] = param;
    }
}
