//! DDL and DML generation for the target dialect.

use std::sync::Arc;

use super::dialect::Dialect;
use crate::backup::metadata::{Column, ForeignKey, Index, PrimaryKey, Sequence, Table};

/// One executable statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    pub sql: String,
    /// Whether an exclusive table lock must be held while it runs
    pub requires_lock: bool,
}

impl Script {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            requires_lock: false,
        }
    }

    pub fn locking(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            requires_lock: true,
        }
    }
}

/// Generates the scripts for each kind of schema object.
///
/// An empty list means the object does not apply to the target.
pub trait ScriptGenerator: Send + Sync {
    fn create_schema(&self, schema: &str) -> Vec<Script>;

    fn create_table(&self, table: &Table) -> Vec<Script>;

    fn create_sequence(&self, sequence: &Sequence) -> Vec<Script>;

    fn create_indexes(&self, table: &Table, indexes: &[Index]) -> Vec<Script>;

    fn create_primary_key(&self, table: &Table, primary_key: &PrimaryKey) -> Vec<Script>;

    fn create_foreign_key(&self, table: &Table, foreign_key: &ForeignKey) -> Vec<Script>;

    /// Parameterized INSERT for the given columns, in order
    fn insert_query(&self, table: &Table, columns: &[&Column]) -> String;

    /// Quoted, qualified table name
    fn table_name(&self, table: &Table) -> String;
}

#[derive(Debug, Clone)]
pub struct DdlScriptGenerator {
    dialect: Arc<dyn Dialect>,
}

impl DdlScriptGenerator {
    pub fn new(dialect: Arc<dyn Dialect>) -> Self {
        Self { dialect }
    }

    fn column_list(&self, columns: &[String]) -> String {
        columns
            .iter()
            .map(|c| self.dialect.quote(c))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Splits `schema.table` captured on a foreign key
    fn referenced_table(&self, name: &str) -> String {
        match name.split_once('.') {
            Some((schema, table)) => self.dialect.qualify(Some(schema), table),
            None => self.dialect.qualify(None, name),
        }
    }

    fn primary_key_name(table: &Table, primary_key: &PrimaryKey) -> String {
        primary_key
            .name
            .clone()
            .unwrap_or_else(|| format!("pk_{}", table.name))
    }
}

impl ScriptGenerator for DdlScriptGenerator {
    fn create_schema(&self, schema: &str) -> Vec<Script> {
        if !self.dialect.supports_schemas() {
            return Vec::new();
        }
        vec![Script::new(format!(
            "CREATE SCHEMA IF NOT EXISTS {}",
            self.dialect.quote(schema)
        ))]
    }

    fn create_table(&self, table: &Table) -> Vec<Script> {
        let columns = table
            .columns
            .iter()
            .map(|column| {
                let nullable = if column.nullable { "" } else { " NOT NULL" };
                format!(
                    "  {} {}{}",
                    self.dialect.quote(&column.name),
                    self.dialect.column_type(column),
                    nullable
                )
            })
            .collect::<Vec<_>>()
            .join(",\n");
        vec![Script::new(format!(
            "CREATE TABLE {} (\n{}\n)",
            self.table_name(table),
            columns
        ))]
    }

    fn create_sequence(&self, sequence: &Sequence) -> Vec<Script> {
        if !self.dialect.supports_sequences() {
            return Vec::new();
        }
        vec![Script::new(format!(
            "CREATE SEQUENCE {} START WITH {} INCREMENT BY {}",
            self.dialect.qualify(sequence.schema.as_deref(), &sequence.name),
            sequence.start,
            sequence.increment
        ))]
    }

    fn create_indexes(&self, table: &Table, indexes: &[Index]) -> Vec<Script> {
        indexes
            .iter()
            .map(|index| {
                let unique = if index.unique { "UNIQUE " } else { "" };
                Script::new(format!(
                    "CREATE {}INDEX {} ON {} ({})",
                    unique,
                    self.dialect.quote(&index.name),
                    self.table_name(table),
                    self.column_list(&index.columns)
                ))
            })
            .collect()
    }

    fn create_primary_key(&self, table: &Table, primary_key: &PrimaryKey) -> Vec<Script> {
        let name = Self::primary_key_name(table, primary_key);
        if !self.dialect.supports_alter_constraints() {
            // Enforce the key through a unique index instead
            return vec![Script::new(format!(
                "CREATE UNIQUE INDEX {} ON {} ({})",
                self.dialect.quote(&name),
                self.table_name(table),
                self.column_list(&primary_key.columns)
            ))];
        }
        vec![Script::locking(format!(
            "ALTER TABLE {} ADD CONSTRAINT {} PRIMARY KEY ({})",
            self.table_name(table),
            self.dialect.quote(&name),
            self.column_list(&primary_key.columns)
        ))]
    }

    fn create_foreign_key(&self, table: &Table, foreign_key: &ForeignKey) -> Vec<Script> {
        if !self.dialect.supports_alter_constraints() {
            return Vec::new();
        }
        vec![Script::locking(format!(
            "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
            self.table_name(table),
            self.dialect.quote(&foreign_key.name),
            self.column_list(&foreign_key.columns),
            self.referenced_table(&foreign_key.referenced_table),
            self.column_list(&foreign_key.referenced_columns)
        ))]
    }

    fn insert_query(&self, table: &Table, columns: &[&Column]) -> String {
        let names = columns
            .iter()
            .map(|c| self.dialect.quote(&c.name))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = (1..=columns.len())
            .map(|position| self.dialect.placeholder(position))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.table_name(table),
            names,
            placeholders
        )
    }

    fn table_name(&self, table: &Table) -> String {
        self.dialect.qualify(table.schema.as_deref(), &table.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::dialect::{PostgresDialect, SqliteDialect};
    use crate::value::SqlTypeCode;

    fn orders() -> Table {
        Table::new(Some("sales"), "orders")
            .with_column(Column::new("id", SqlTypeCode::INTEGER, "INTEGER").not_null())
            .with_column(Column::new("customer_id", SqlTypeCode::INTEGER, "INTEGER"))
            .with_column(Column::new("total", SqlTypeCode::NUMERIC, "NUMERIC").with_size(12, Some(2)))
            .with_primary_key(PrimaryKey::new(None, &["id"]))
            .with_index(Index::new("orders_customer_idx", &["customer_id"], false))
            .with_foreign_key(ForeignKey::new(
                "orders_customer_fk",
                &["customer_id"],
                "sales.customers",
                &["id"],
            ))
    }

    #[test]
    fn test_postgres_scripts() {
        let generator = DdlScriptGenerator::new(Arc::new(PostgresDialect::new()));
        let table = orders();

        assert_eq!(
            generator.create_table(&table)[0].sql,
            "CREATE TABLE \"sales\".\"orders\" (\n  \"id\" INTEGER NOT NULL,\n  \"customer_id\" INTEGER,\n  \"total\" NUMERIC(12,2)\n)"
        );

        let pk = generator.create_primary_key(&table, table.primary_key.as_ref().unwrap());
        assert_eq!(
            pk,
            vec![Script::locking(
                "ALTER TABLE \"sales\".\"orders\" ADD CONSTRAINT \"pk_orders\" PRIMARY KEY (\"id\")"
            )]
        );

        let fk = generator.create_foreign_key(&table, &table.foreign_keys[0]);
        assert!(fk[0].requires_lock);
        assert!(fk[0].sql.contains("REFERENCES \"sales\".\"customers\" (\"id\")"));

        let columns: Vec<_> = table.columns.iter().collect();
        assert_eq!(
            generator.insert_query(&table, &columns),
            "INSERT INTO \"sales\".\"orders\" (\"id\", \"customer_id\", \"total\") VALUES ($1, $2, $3)"
        );
    }

    #[test]
    fn test_sqlite_scripts_without_alter_constraints() {
        let generator = DdlScriptGenerator::new(Arc::new(SqliteDialect::new()));
        let table = orders();

        let pk = generator.create_primary_key(&table, table.primary_key.as_ref().unwrap());
        assert_eq!(
            pk,
            vec![Script::new("CREATE UNIQUE INDEX \"pk_orders\" ON \"orders\" (\"id\")")]
        );
        assert!(generator.create_foreign_key(&table, &table.foreign_keys[0]).is_empty());
        assert!(generator.create_schema("sales").is_empty());
        assert!(
            generator
                .create_sequence(&Sequence {
                    schema: None,
                    name: "s".to_string(),
                    start: 1,
                    increment: 1
                })
                .is_empty()
        );

        let indexes = generator.create_indexes(&table, &table.indexes);
        assert_eq!(
            indexes[0].sql,
            "CREATE INDEX \"orders_customer_idx\" ON \"orders\" (\"customer_id\")"
        );
    }
}
