//! Database sessions: one exclusively owned connection per worker.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use sqlx::postgres::PgArguments;
use sqlx::postgres::types::PgTimeTz;
use sqlx::query::Query;
use sqlx::sqlite::SqliteArguments;

use crate::value::{Param, ParamType};

/// A single connection; never shared between tasks
#[async_trait]
pub trait Session: Send {
    /// Runs one statement without parameters, returning affected rows
    async fn execute(&mut self, sql: &str) -> Result<u64>;

    async fn execute_params(&mut self, sql: &str, params: &[Param]) -> Result<u64>;

    /// Runs `sql` once per parameter set
    async fn execute_batch(&mut self, sql: &str, rows: &[Vec<Param>]) -> Result<u64> {
        let mut affected = 0;
        for params in rows {
            affected += self.execute_params(sql, params).await?;
        }
        Ok(affected)
    }

    async fn begin(&mut self) -> Result<()>;

    async fn commit(&mut self) -> Result<()>;

    async fn rollback(&mut self) -> Result<()>;

    /// Returns the connection; later calls fail
    async fn close(&mut self) -> Result<()>;
}

/// Hands out sessions to workers
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open_session(&self) -> Result<Box<dyn Session>>;
}

/// Binds a parameter for PostgreSQL, typing NULLs so the server can infer
/// the column type
pub(crate) fn bind_pg<'q>(
    query: Query<'q, sqlx::Postgres, PgArguments>,
    param: &'q Param,
) -> Query<'q, sqlx::Postgres, PgArguments> {
    match param {
        Param::Null(param_type) => match param_type {
            ParamType::Bool => query.bind(None::<bool>),
            ParamType::I16 => query.bind(None::<i16>),
            ParamType::I32 => query.bind(None::<i32>),
            ParamType::I64 => query.bind(None::<i64>),
            ParamType::F32 => query.bind(None::<f32>),
            ParamType::F64 => query.bind(None::<f64>),
            ParamType::Decimal => query.bind(None::<Decimal>),
            ParamType::Text => query.bind(None::<String>),
            ParamType::Bytes => query.bind(None::<Vec<u8>>),
            ParamType::Date => query.bind(None::<NaiveDate>),
            ParamType::Time => query.bind(None::<NaiveTime>),
            ParamType::TimeTz => query.bind(None::<PgTimeTz<NaiveTime, FixedOffset>>),
            ParamType::Timestamp => query.bind(None::<NaiveDateTime>),
            ParamType::TimestampTz => query.bind(None::<DateTime<FixedOffset>>),
        },
        Param::Bool(v) => query.bind(*v),
        Param::I16(v) => query.bind(*v),
        Param::I32(v) => query.bind(*v),
        Param::I64(v) => query.bind(*v),
        Param::F32(v) => query.bind(*v),
        Param::F64(v) => query.bind(*v),
        Param::Decimal(v) => query.bind(*v),
        Param::Text(v) => query.bind(v.as_str()),
        Param::Bytes(v) => query.bind(v.as_slice()),
        Param::Date(v) => query.bind(*v),
        Param::Time(v) => query.bind(*v),
        Param::TimeTz(time, offset) => query.bind(PgTimeTz {
            time: *time,
            offset: *offset,
        }),
        Param::Timestamp(v) => query.bind(*v),
        Param::TimestampTz(v) => query.bind(*v),
    }
}

/// Binds a parameter for SQLite; decimals and zoned times travel as text
pub(crate) fn bind_sqlite<'q>(
    query: Query<'q, sqlx::Sqlite, SqliteArguments<'q>>,
    param: &'q Param,
) -> Query<'q, sqlx::Sqlite, SqliteArguments<'q>> {
    match param {
        Param::Null(param_type) => match param_type {
            ParamType::Bool => query.bind(None::<bool>),
            ParamType::I16 => query.bind(None::<i16>),
            ParamType::I32 => query.bind(None::<i32>),
            ParamType::I64 => query.bind(None::<i64>),
            ParamType::F32 => query.bind(None::<f32>),
            ParamType::F64 => query.bind(None::<f64>),
            ParamType::Bytes => query.bind(None::<Vec<u8>>),
            _ => query.bind(None::<String>),
        },
        Param::Bool(v) => query.bind(*v),
        Param::I16(v) => query.bind(*v),
        Param::I32(v) => query.bind(*v),
        Param::I64(v) => query.bind(*v),
        Param::F32(v) => query.bind(*v),
        Param::F64(v) => query.bind(*v),
        Param::Decimal(v) => query.bind(v.to_string()),
        Param::TimeTz(time, offset) => query.bind(format!("{}{}", time.format("%H:%M:%S%.f"), offset)),
        Param::Text(v) => query.bind(v.as_str()),
        Param::Bytes(v) => query.bind(v.as_slice()),
        Param::Date(v) => query.bind(*v),
        Param::Time(v) => query.bind(*v),
        Param::Timestamp(v) => query.bind(*v),
        Param::TimestampTz(v) => query.bind(*v),
    }
}
