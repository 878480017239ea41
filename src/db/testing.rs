//! In-memory session factory recording every statement, with failure
//! injection for scheduling tests.

use anyhow::{Result, bail};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::session::{Session, SessionFactory};
use crate::value::Param;

#[derive(Default)]
struct Inner {
    statements: Mutex<Vec<String>>,
    rows: Mutex<Vec<(String, Vec<Param>)>>,
    failures: Mutex<Vec<Failure>>,
    open: AtomicUsize,
    opened: AtomicUsize,
}

struct Failure {
    pattern: String,
    /// Matching statements still allowed before failing
    remaining: usize,
}

#[derive(Clone, Default)]
pub struct RecordingSessionFactory {
    inner: Arc<Inner>,
}

impl RecordingSessionFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the statement containing `pattern` after `after` successful ones
    pub fn fail_on(self, pattern: &str, after: usize) -> Self {
        self.inner
            .failures
            .lock()
            .unwrap()
            .push(Failure {
                pattern: pattern.to_string(),
                remaining: after,
            });
        self
    }

    pub fn statements(&self) -> Vec<String> {
        self.inner.statements.lock().unwrap().clone()
    }

    /// Parameter sets executed with a statement containing `pattern`
    pub fn rows(&self, pattern: &str) -> Vec<Vec<Param>> {
        self.inner
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|(sql, _)| sql.contains(pattern))
            .map(|(_, params)| params.clone())
            .collect()
    }

    /// Position of the first statement containing `pattern`
    pub fn position(&self, pattern: &str) -> Option<usize> {
        self.statements().iter().position(|s| s.contains(pattern))
    }

    pub fn open_sessions(&self) -> usize {
        self.inner.open.load(Ordering::SeqCst)
    }

    pub fn opened_sessions(&self) -> usize {
        self.inner.opened.load(Ordering::SeqCst)
    }

    fn record(&self, sql: &str) -> Result<()> {
        {
            let mut failures = self.inner.failures.lock().unwrap();
            for failure in failures.iter_mut().filter(|f| sql.contains(&f.pattern)) {
                if failure.remaining == 0 {
                    bail!("injected failure executing: {}", sql);
                }
                failure.remaining -= 1;
            }
        }
        self.inner.statements.lock().unwrap().push(sql.to_string());
        Ok(())
    }
}

#[async_trait]
impl SessionFactory for RecordingSessionFactory {
    async fn open_session(&self) -> Result<Box<dyn Session>> {
        self.inner.open.fetch_add(1, Ordering::SeqCst);
        self.inner.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(RecordingSession {
            factory: self.clone(),
            closed: false,
        }))
    }
}

struct RecordingSession {
    factory: RecordingSessionFactory,
    closed: bool,
}

impl RecordingSession {
    fn check_open(&self) -> Result<()> {
        if self.closed {
            bail!("Session is closed");
        }
        Ok(())
    }
}

#[async_trait]
impl Session for RecordingSession {
    async fn execute(&mut self, sql: &str) -> Result<u64> {
        self.check_open()?;
        self.factory.record(sql)?;
        Ok(0)
    }

    async fn execute_params(&mut self, sql: &str, params: &[Param]) -> Result<u64> {
        self.check_open()?;
        self.factory.record(sql)?;
        self.factory
            .inner
            .rows
            .lock()
            .unwrap()
            .push((sql.to_string(), params.to_vec()));
        Ok(1)
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
        if !self.closed {
            self.closed = true;
            self.factory.inner.open.fetch_sub(1, Ordering::SeqCst);
            self.factory.record("CLOSE")?;
        }
        Ok(())
    }
}
