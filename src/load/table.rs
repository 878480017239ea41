use anyhow::{Result, bail};
use std::sync::Arc;

use crate::backup::{Column, RowSet, Table};
use crate::db::ScriptGenerator;
use crate::error::FormatError;
use crate::value::{AccessKind, ValueHandleList, ValueHandleListBuilder};

use super::manager::LoadContext;

/// One table's load assignment
#[derive(Debug, Clone)]
pub struct LoadTable {
    pub row_set: Arc<RowSet>,
    pub table: Arc<Table>,
    /// Target columns in row-set order
    pub columns: Vec<Column>,
    pub query: String,
    pub threads: usize,
}

impl LoadTable {
    /// Fails if a row-set column has no counterpart in the target table
    pub fn new(
        row_set: Arc<RowSet>,
        table: Arc<Table>,
        scripts: &dyn ScriptGenerator,
        threads: usize,
    ) -> Result<Self> {
        let mut columns = Vec::with_capacity(row_set.columns.len());
        for column in &row_set.columns {
            let Some(target) = table.column(&column.name) else {
                bail!(
                    "Column {} of row set {} does not exist in table {}",
                    column.name,
                    row_set.name,
                    table.qualified_name()
                );
            };
            columns.push(target.clone());
        }
        if columns.is_empty() {
            bail!("Row set {} has no columns", row_set.name);
        }

        let query = scripts.insert_query(&table, &columns.iter().collect::<Vec<_>>());
        Ok(Self {
            row_set,
            table,
            columns,
            query,
            threads: threads.max(1),
        })
    }

    pub fn name(&self) -> String {
        self.table.qualified_name()
    }

    /// Statement-side handles for this table's columns
    pub fn value_handles(&self, context: &LoadContext) -> Result<ValueHandleList, FormatError> {
        Ok(
            ValueHandleListBuilder::new(context.dialect.as_ref(), &context.formats, AccessKind::Statement)
                .time_zone(context.time_zone)
                .columns(&self.table, &self.columns)?
                .build(),
        )
    }
}
