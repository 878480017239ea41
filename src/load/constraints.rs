//! Index, primary key and foreign key creation, ordered around data loading.
//!
//! A table's indexes and primary key are created once its rows are loaded.
//! Foreign keys wait until every index and primary key of the backup exists
//! and every table is loaded:
//!
//! ```text
//! IndexesPending -> ForeignKeysReleased -> Done
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::backup::{ForeignKey, Index, PrimaryKey, Table};
use crate::db::{Dialect, Script, ScriptGenerator};

use super::listener::{CompletedWork, LoadListener};
use super::manager::BackupLoaderManager;
use super::sync::Phase;
use super::work::LoadConstraintWork;

#[derive(Debug, Clone)]
pub enum ConstraintKind {
    /// One or more indexes created by the same unit of work
    Indexes(Vec<Index>),
    PrimaryKey(PrimaryKey),
    ForeignKey(ForeignKey),
}

#[derive(Debug, Clone)]
pub struct LoadConstraint {
    pub id: usize,
    pub table: Arc<Table>,
    pub kind: ConstraintKind,
}

impl PartialEq for LoadConstraint {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for LoadConstraint {}

impl LoadConstraint {
    pub fn is_foreign_key(&self) -> bool {
        matches!(self.kind, ConstraintKind::ForeignKey(_))
    }

    pub fn scripts(&self, scripts: &dyn ScriptGenerator) -> Vec<Script> {
        match &self.kind {
            ConstraintKind::Indexes(indexes) => scripts.create_indexes(&self.table, indexes),
            ConstraintKind::PrimaryKey(primary_key) => scripts.create_primary_key(&self.table, primary_key),
            ConstraintKind::ForeignKey(foreign_key) => scripts.create_foreign_key(&self.table, foreign_key),
        }
    }
}

impl fmt::Display for LoadConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ConstraintKind::Indexes(indexes) => {
                let names: Vec<&str> = indexes.iter().map(|i| i.name.as_str()).collect();
                if names.len() == 1 {
                    write!(f, "index {}", names[0])
                } else {
                    write!(f, "indexes {}", names.join(", "))
                }
            }
            ConstraintKind::PrimaryKey(primary_key) => match &primary_key.name {
                Some(name) => write!(f, "primary key {}", name),
                None => write!(f, "primary key"),
            },
            ConstraintKind::ForeignKey(foreign_key) => write!(f, "foreign key {}", foreign_key.name),
        }
    }
}

struct Pending {
    constraint: Arc<LoadConstraint>,
    scheduled: bool,
}

/// Constraints not yet created, keyed by qualified table name
#[derive(Default)]
pub struct LoadConstraints {
    pending: Mutex<HashMap<String, Vec<Pending>>>,
}

impl LoadConstraints {
    fn pending(&self) -> MutexGuard<'_, HashMap<String, Vec<Pending>>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add(&self, constraint: Arc<LoadConstraint>) {
        self.pending()
            .entry(constraint.table.qualified_name())
            .or_default()
            .push(Pending {
                constraint,
                scheduled: false,
            });
    }

    /// Marks the table's unscheduled constraints as scheduled and returns them
    pub fn schedule_table(&self, table: &str) -> Vec<Arc<LoadConstraint>> {
        self.pending()
            .get_mut(table)
            .map(take_unscheduled)
            .unwrap_or_default()
    }

    pub fn schedule_all(&self) -> Vec<Arc<LoadConstraint>> {
        self.pending().values_mut().flat_map(take_unscheduled).collect()
    }

    /// Drops a created constraint; returns false if it was not pending
    pub fn remove(&self, constraint: &LoadConstraint) -> bool {
        let mut pending = self.pending();
        let key = constraint.table.qualified_name();
        let Some(list) = pending.get_mut(&key) else {
            return false;
        };
        let before = list.len();
        list.retain(|p| p.constraint.as_ref() != constraint);
        let removed = list.len() < before;
        if list.is_empty() {
            pending.remove(&key);
        }
        removed
    }

    pub fn is_empty(&self) -> bool {
        self.pending().is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending().values().map(Vec::len).sum()
    }
}

fn take_unscheduled(pending: &mut Vec<Pending>) -> Vec<Arc<LoadConstraint>> {
    pending
        .iter_mut()
        .filter(|p| !p.scheduled)
        .map(|p| {
            p.scheduled = true;
            p.constraint.clone()
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConstraintState {
    IndexesPending = 0,
    ForeignKeysReleased = 1,
    Done = 2,
}

impl ConstraintState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConstraintState::IndexesPending,
            1 => ConstraintState::ForeignKeysReleased,
            _ => ConstraintState::Done,
        }
    }
}

/// Schedules constraint work as tables and constraints complete
pub struct LoadConstraintListener {
    indexes: LoadConstraints,
    foreign_keys: LoadConstraints,
    state: AtomicU8,
    next_id: AtomicUsize,
}

impl Default for LoadConstraintListener {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadConstraintListener {
    pub fn new() -> Self {
        Self {
            indexes: LoadConstraints::default(),
            foreign_keys: LoadConstraints::default(),
            state: AtomicU8::new(ConstraintState::IndexesPending as u8),
            next_id: AtomicUsize::new(0),
        }
    }

    pub fn state(&self) -> ConstraintState {
        ConstraintState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Constraints registered and not yet created
    pub fn pending(&self) -> usize {
        self.indexes.len() + self.foreign_keys.len()
    }

    fn constraint(&self, table: &Arc<Table>, kind: ConstraintKind) -> Arc<LoadConstraint> {
        Arc::new(LoadConstraint {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            table: table.clone(),
            kind,
        })
    }

    /// Queues the constraints of `table`. Foreign keys to tables outside
    /// `tables` are skipped.
    pub fn register(&self, table: &Arc<Table>, dialect: &dyn Dialect, tables: &[Arc<Table>]) {
        if !table.indexes.is_empty() {
            if dialect.supports_multiple_indexes() {
                self.indexes
                    .add(self.constraint(table, ConstraintKind::Indexes(table.indexes.clone())));
            } else {
                for index in &table.indexes {
                    self.indexes
                        .add(self.constraint(table, ConstraintKind::Indexes(vec![index.clone()])));
                }
            }
        }
        if let Some(primary_key) = &table.primary_key {
            self.indexes
                .add(self.constraint(table, ConstraintKind::PrimaryKey(primary_key.clone())));
        }
        for foreign_key in &table.foreign_keys {
            if !tables.iter().any(|t| t.matches(&foreign_key.referenced_table)) {
                warn!(
                    table = %table.qualified_name(),
                    foreign_key = %foreign_key.name,
                    referenced = %foreign_key.referenced_table,
                    "Referenced table is not restored, skipping foreign key"
                );
                continue;
            }
            self.foreign_keys
                .add(self.constraint(table, ConstraintKind::ForeignKey(foreign_key.clone())));
        }
    }

    fn transition(&self, from: ConstraintState, to: ConstraintState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Advances the state machine as far as the pending sets allow
    pub fn check(&self, manager: &Arc<BackupLoaderManager>) {
        loop {
            match self.state() {
                ConstraintState::IndexesPending => {
                    if !self.indexes.is_empty() || manager.tables_pending() > 0 {
                        return;
                    }
                    if self.transition(ConstraintState::IndexesPending, ConstraintState::ForeignKeysReleased) {
                        let foreign_keys = self.foreign_keys.schedule_all();
                        info!(foreign_keys = foreign_keys.len(), "Indexes created, releasing foreign keys");
                        for constraint in foreign_keys {
                            manager.submit_constraint(LoadConstraintWork::new(constraint));
                        }
                    }
                }
                ConstraintState::ForeignKeysReleased => {
                    if self.foreign_keys.is_empty()
                        && self.transition(ConstraintState::ForeignKeysReleased, ConstraintState::Done)
                    {
                        info!("All constraints created");
                        manager.sync().release(Phase::Constraints);
                    }
                    return;
                }
                ConstraintState::Done => return,
            }
        }
    }
}

impl LoadListener for LoadConstraintListener {
    fn work_completed(&self, manager: &Arc<BackupLoaderManager>, work: &CompletedWork<'_>) {
        match work {
            CompletedWork::Table(table) => {
                let scheduled = self.indexes.schedule_table(&table.qualified_name());
                if !scheduled.is_empty() {
                    debug!(table = %table.qualified_name(), constraints = scheduled.len(), "Scheduling indexes");
                }
                for constraint in scheduled {
                    manager.submit_constraint(LoadConstraintWork::new(constraint));
                }
            }
            CompletedWork::Constraint(constraint) => {
                let removed = if constraint.is_foreign_key() {
                    self.foreign_keys.remove(constraint)
                } else {
                    self.indexes.remove(constraint)
                };
                if !removed {
                    warn!(table = %constraint.table.qualified_name(), constraint = %constraint, "Completed constraint was not pending");
                }
            }
        }
        self.check(manager);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::Column;
    use crate::db::{PostgresDialect, SqliteDialect};
    use crate::value::SqlTypeCode;

    fn orders() -> Arc<Table> {
        Arc::new(
            Table::new(Some("public"), "orders")
                .with_column(Column::new("id", SqlTypeCode::INTEGER, "INTEGER"))
                .with_column(Column::new("customer_id", SqlTypeCode::INTEGER, "INTEGER"))
                .with_primary_key(PrimaryKey::new(None, &["id"]))
                .with_index(Index::new("idx_orders_customer", &["customer_id"], false))
                .with_index(Index::new("idx_orders_id_customer", &["id", "customer_id"], true))
                .with_foreign_key(ForeignKey::new(
                    "fk_orders_customer",
                    &["customer_id"],
                    "public.customers",
                    &["id"],
                )),
        )
    }

    fn customers() -> Arc<Table> {
        Arc::new(
            Table::new(Some("public"), "customers")
                .with_column(Column::new("id", SqlTypeCode::INTEGER, "INTEGER"))
                .with_primary_key(PrimaryKey::new(None, &["id"])),
        )
    }

    #[test]
    fn test_index_grouping_follows_dialect() {
        let tables = vec![orders(), customers()];

        let listener = LoadConstraintListener::new();
        listener.register(&tables[0], &PostgresDialect::new(), &tables);
        // two indexes, the primary key and the foreign key
        assert_eq!(listener.pending(), 4);

        let listener = LoadConstraintListener::new();
        listener.register(&tables[0], &SqliteDialect::new(), &tables);
        // one grouped index unit, the primary key and the foreign key
        assert_eq!(listener.pending(), 3);
    }

    #[test]
    fn test_foreign_key_to_excluded_table_is_skipped() {
        let tables = vec![orders()];
        let listener = LoadConstraintListener::new();
        listener.register(&tables[0], &PostgresDialect::new(), &tables);
        assert_eq!(listener.foreign_keys.len(), 0);
        assert_eq!(listener.indexes.len(), 3);
    }

    #[test]
    fn test_pending_set_schedules_once() {
        let constraints = LoadConstraints::default();
        let table = customers();
        let listener = LoadConstraintListener::new();
        let first = listener.constraint(&table, ConstraintKind::PrimaryKey(PrimaryKey::new(None, &["id"])));
        let second = listener.constraint(
            &table,
            ConstraintKind::Indexes(vec![Index::new("idx", &["id"], false)]),
        );
        constraints.add(first.clone());
        constraints.add(second.clone());

        assert_eq!(constraints.schedule_table("public.customers").len(), 2);
        assert!(constraints.schedule_table("public.customers").is_empty());
        assert!(constraints.schedule_all().is_empty());

        assert!(constraints.remove(&first));
        assert!(!constraints.remove(&first), "removing twice");
        assert!(!constraints.is_empty());
        assert!(constraints.remove(&second));
        assert!(constraints.is_empty());
    }

    #[test]
    fn test_display_names() {
        let table = orders();
        let listener = LoadConstraintListener::new();
        let grouped = listener.constraint(&table, ConstraintKind::Indexes(table.indexes.clone()));
        assert_eq!(grouped.to_string(), "indexes idx_orders_customer, idx_orders_id_customer");
        let foreign_key = listener.constraint(&table, ConstraintKind::ForeignKey(table.foreign_keys[0].clone()));
        assert_eq!(foreign_key.to_string(), "foreign key fk_orders_customer");
        assert!(foreign_key.is_foreign_key());
    }
}
