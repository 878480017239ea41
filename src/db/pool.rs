//! Connection pools for the supported targets: PostgreSQL through bb8 and
//! SQLite through sqlx's own pool.
use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use derive_builder::Builder;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{ConnectOptions, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use super::dialect::{Dialect, PostgresDialect, SqliteDialect};
use super::session::{Session, SessionFactory, bind_pg, bind_sqlite};
use crate::config::{CONNECT_TIMEOUT, PING_TIMEOUT, SQLITE_BUSY_TIMEOUT};
use crate::value::Param;

pub type Bb8Connection = bb8::PooledConnection<'static, ConnectionManager>;

#[derive(Debug, Clone)]
enum PoolInner {
    Postgres(bb8::Pool<ConnectionManager>),
    Sqlite(sqlx::SqlitePool),
}

/// Target database pool
#[derive(Debug, Clone)]
pub struct Pool {
    inner: PoolInner,
}

#[derive(Builder)]
pub struct PoolArgs {
    /// `postgres://…`, `postgresql://…` or `sqlite://…`
    #[builder(setter(into))]
    url: String,
    #[builder(default = "16")]
    max_pool_size: u32,
}

pub async fn pool(args: PoolArgs) -> Result<Pool> {
    let PoolArgs { url, max_pool_size } = args;

    if url.starts_with("postgres://") || url.starts_with("postgresql://") {
        let connect_options = PgConnectOptions::from_str(&url).context("Invalid PostgreSQL URL")?;
        let conn_manager = ConnectionManager::new(connect_options);
        let bb8_pool = bb8::Builder::new()
            .max_size(max_pool_size)
            .connection_timeout(CONNECT_TIMEOUT)
            .max_lifetime(Duration::from_secs(60 * 55))
            .build(conn_manager)
            .await
            .context("Failed to create connection pool")?;
        return Ok(Pool {
            inner: PoolInner::Postgres(bb8_pool),
        });
    }

    if url.starts_with("sqlite:") {
        let connect_options = SqliteConnectOptions::from_str(&url)
            .context("Invalid SQLite URL")?
            .create_if_missing(true);
        return Pool::sqlite(connect_options, max_pool_size).await;
    }

    bail!(
        "Unsupported target URL '{}'. Expected postgres://, postgresql:// or sqlite://",
        url
    )
}

impl Pool {
    /// SQLite database file, created when missing
    pub async fn sqlite_file(path: impl AsRef<Path>, max_pool_size: u32) -> Result<Self> {
        let connect_options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true);
        Self::sqlite(connect_options, max_pool_size).await
    }

    async fn sqlite(connect_options: SqliteConnectOptions, max_pool_size: u32) -> Result<Self> {
        let connect_options = connect_options
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(SQLITE_BUSY_TIMEOUT)
            .disable_statement_logging();
        let sqlite_pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(max_pool_size.max(1))
            .acquire_timeout(CONNECT_TIMEOUT)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(connect_options)
            .await
            .context("Failed to open SQLite database")?;

        Ok(Pool {
            inner: PoolInner::Sqlite(sqlite_pool),
        })
    }

    /// Dialect matching the pool's driver
    pub fn dialect(&self) -> Arc<dyn Dialect> {
        match &self.inner {
            PoolInner::Postgres(_) => Arc::new(PostgresDialect::new()),
            PoolInner::Sqlite(_) => Arc::new(SqliteDialect::new()),
        }
    }

    pub fn is_postgres(&self) -> bool {
        matches!(&self.inner, PoolInner::Postgres(_))
    }

    /// Runs a query returning one integer, e.g. `SELECT COUNT(*) …`
    pub async fn fetch_count(&self, sql: &str) -> Result<i64> {
        match &self.inner {
            PoolInner::Postgres(pool) => {
                let mut conn = pool.get().await.map_err(run_error)?;
                let (count,): (i64,) = sqlx::query_as(sql).fetch_one(&mut *conn).await?;
                Ok(count)
            }
            PoolInner::Sqlite(pool) => {
                let (count,): (i64,) = sqlx::query_as(sql).fetch_one(pool).await?;
                Ok(count)
            }
        }
    }

    pub async fn close(&self) {
        if let PoolInner::Sqlite(pool) = &self.inner {
            pool.close().await;
        }
    }
}

fn run_error(e: bb8::RunError<sqlx::Error>) -> sqlx::Error {
    match e {
        bb8::RunError::User(e) => e,
        bb8::RunError::TimedOut => sqlx::Error::PoolTimedOut,
    }
}

#[async_trait]
impl SessionFactory for Pool {
    async fn open_session(&self) -> Result<Box<dyn Session>> {
        match &self.inner {
            PoolInner::Postgres(pool) => {
                let conn = pool
                    .get_owned()
                    .await
                    .map_err(run_error)
                    .context("Failed to acquire PostgreSQL connection")?;
                Ok(Box::new(PgSession { conn: Some(conn) }))
            }
            PoolInner::Sqlite(pool) => {
                let conn = pool
                    .acquire()
                    .await
                    .context("Failed to acquire SQLite connection")?;
                Ok(Box::new(SqliteSession { conn: Some(conn) }))
            }
        }
    }
}

struct PgSession {
    conn: Option<Bb8Connection>,
}

impl PgSession {
    fn conn(&mut self) -> Result<&mut PgConnection> {
        self.conn
            .as_deref_mut()
            .ok_or_else(|| anyhow!("Session is closed"))
    }
}

#[async_trait]
impl Session for PgSession {
    async fn execute(&mut self, sql: &str) -> Result<u64> {
        let conn = self.conn()?;
        let result = sqlx::Executor::execute(conn, sqlx::raw_sql(sql)).await?;
        Ok(result.rows_affected())
    }

    async fn execute_params(&mut self, sql: &str, params: &[Param]) -> Result<u64> {
        let query = params.iter().fold(sqlx::query(sql), bind_pg);
        let result = query.execute(self.conn()?).await?;
        Ok(result.rows_affected())
    }

    async fn begin(&mut self) -> Result<()> {
        self.execute("BEGIN").await.map(|_| ())
    }

    async fn commit(&mut self) -> Result<()> {
        self.execute("COMMIT").await.map(|_| ())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.execute("ROLLBACK").await.map(|_| ())
    }

    async fn close(&mut self) -> Result<()> {
        self.conn.take();
        Ok(())
    }
}

struct SqliteSession {
    conn: Option<sqlx::pool::PoolConnection<Sqlite>>,
}

impl SqliteSession {
    fn conn(&mut self) -> Result<&mut sqlx::SqliteConnection> {
        self.conn
            .as_deref_mut()
            .ok_or_else(|| anyhow!("Session is closed"))
    }
}

#[async_trait]
impl Session for SqliteSession {
    async fn execute(&mut self, sql: &str) -> Result<u64> {
        let conn = self.conn()?;
        let result = sqlx::Executor::execute(conn, sqlx::raw_sql(sql)).await?;
        Ok(result.rows_affected())
    }

    async fn execute_params(&mut self, sql: &str, params: &[Param]) -> Result<u64> {
        let query = params.iter().fold(sqlx::query(sql), bind_sqlite);
        let result = query.execute(self.conn()?).await?;
        Ok(result.rows_affected())
    }

    async fn begin(&mut self) -> Result<()> {
        // Take the write lock up front; deferred transactions can fail with
        // SQLITE_BUSY instead of waiting when another writer holds the lock
        self.execute("BEGIN IMMEDIATE").await.map(|_| ())
    }

    async fn commit(&mut self) -> Result<()> {
        self.execute("COMMIT").await.map(|_| ())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.execute("ROLLBACK").await.map(|_| ())
    }

    async fn close(&mut self) -> Result<()> {
        self.conn.take();
        Ok(())
    }
}

// Wraps the connect options so that we can implement the bb8::ManageConnection trait.
pub struct ConnectionManager {
    connect_options: Arc<PgConnectOptions>,
}

impl ConnectionManager {
    pub fn new(connect_options: PgConnectOptions) -> Self {
        Self {
            connect_options: Arc::new(connect_options.disable_statement_logging()),
        }
    }
}

impl bb8::ManageConnection for ConnectionManager {
    type Connection = PgConnection;
    type Error = sqlx::Error;

    async fn connect(&self) -> Result<Self::Connection, Self::Error> {
        tokio::time::timeout(CONNECT_TIMEOUT, self.connect_options.connect())
            .await
            .map_err(|_| sqlx::Error::PoolTimedOut)?
    }

    async fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        tokio::time::timeout(PING_TIMEOUT, sqlx::Connection::ping(conn))
            .await
            // bb8 retries a different connection on ping failure
            .map_err(|_| sqlx::Error::PoolTimedOut)
            .and_then(|result| result)?;
        Ok(())
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        // sqlx::PgConnection provides no non-async way to check for closed/broken connections.
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sqlite_session_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let pool = Pool::sqlite_file(dir.path().join("t.db"), 4).await.unwrap();
        assert!(!pool.is_postgres());
        assert_eq!(pool.dialect().name(), "sqlite");

        let mut session = pool.open_session().await.unwrap();
        session.execute("CREATE TABLE t (a INTEGER, b TEXT)").await.unwrap();
        session.begin().await.unwrap();
        let rows = vec![
            vec![Param::I32(1), Param::Text("x".to_string())],
            vec![Param::I32(2), Param::Null(crate::value::ParamType::Text)],
        ];
        assert_eq!(session.execute_batch("INSERT INTO t VALUES (?, ?)", &rows).await.unwrap(), 2);
        session.commit().await.unwrap();
        session.close().await.unwrap();
        assert!(session.execute("SELECT 1").await.is_err());

        assert_eq!(pool.fetch_count("SELECT COUNT(*) FROM t WHERE b IS NULL").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_rollback_discards_rows() {
        let dir = tempfile::tempdir().unwrap();
        let pool = Pool::sqlite_file(dir.path().join("t.db"), 2).await.unwrap();
        let mut session = pool.open_session().await.unwrap();
        session.execute("CREATE TABLE t (a INTEGER)").await.unwrap();
        session.begin().await.unwrap();
        session.execute_params("INSERT INTO t VALUES (?)", &[Param::I64(5)]).await.unwrap();
        session.rollback().await.unwrap();
        session.close().await.unwrap();

        assert_eq!(pool.fetch_count("SELECT COUNT(*) FROM t").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_sqlite_time_with_offset_stored_as_text() {
        let dir = tempfile::tempdir().unwrap();
        let pool = Pool::sqlite_file(dir.path().join("t.db"), 1).await.unwrap();
        let mut session = pool.open_session().await.unwrap();
        session.execute("CREATE TABLE t (at TEXT)").await.unwrap();
        let time = chrono::NaiveTime::from_hms_opt(10, 30, 0).unwrap();
        let offset = chrono::FixedOffset::east_opt(2 * 3600).unwrap();
        session
            .execute_params("INSERT INTO t VALUES (?)", &[Param::TimeTz(time, offset)])
            .await
            .unwrap();
        session.close().await.unwrap();

        assert_eq!(
            pool.fetch_count("SELECT COUNT(*) FROM t WHERE at = '10:30:00+02:00'")
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_unsupported_url() {
        let args = PoolArgsBuilder::default().url("mysql://localhost/db").build().unwrap();
        let err = pool(args).await.unwrap_err();
        assert!(err.to_string().contains("Unsupported target URL"));
    }
}
