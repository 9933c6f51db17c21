use std::sync::{Arc, Mutex};

use super::Connection;
use crate::config::Settings;
use crate::error::Result;
use crate::sql::dialect::DialectVersion;
use crate::sql::execution::Registry;
use crate::sql::types::{Row, Table};
use crate::storage::{Memory, Status};

/// A mock database instance: a dialect version and an in-memory store shared
/// by all of its connections. Cloning the database shares the store.
#[derive(Clone)]
pub struct Database {
    dialect: DialectVersion,
    store: Arc<Mutex<Memory>>,
}

impl Database {
    /// Creates an empty database for a dialect version.
    pub fn new(dialect: DialectVersion) -> Self {
        Self { dialect, store: Arc::new(Mutex::new(Memory::new())) }
    }

    /// Creates an empty database from settings.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self::new(settings.dialect_version()?))
    }

    /// The dialect version of the database.
    pub fn dialect(&self) -> DialectVersion {
        self.dialect
    }

    /// The shared store.
    pub fn store(&self) -> Arc<Mutex<Memory>> {
        self.store.clone()
    }

    /// Creates a table.
    pub fn create_table(&self, table: Table) -> Result<()> {
        self.store.lock()?.create_table(table)
    }

    /// Fetches a table schema, if it exists.
    pub fn get_table(&self, name: &str) -> Result<Option<Table>> {
        Ok(self.store.lock()?.get_table(name).cloned())
    }

    /// Lists all table schemas, ordered by name.
    pub fn list_tables(&self) -> Result<Vec<Table>> {
        Ok(self.store.lock()?.list_tables().into_iter().cloned().collect())
    }

    /// Returns a snapshot of a table's rows, in insertion order.
    pub fn rows(&self, table: &str) -> Result<Vec<Row>> {
        Ok(self.store.lock()?.scan(table)?.to_vec())
    }

    /// Seeds a table with rows, bypassing SQL. Rows are coerced to the column
    /// types and checked against the table's constraints; if any row fails,
    /// none are inserted.
    pub fn insert_rows(&self, table: &str, rows: Vec<Row>) -> Result<u64> {
        self.store.lock()?.mutate(table, |table, existing| {
            let mut count = 0;
            for row in rows {
                let row = table.normalize_row(row)?;
                table.check_unique(existing, &row, None)?;
                existing.push(row);
                count += 1;
            }
            Ok(count)
        })
    }

    /// Returns store status.
    pub fn status(&self) -> Result<Status> {
        Ok(self.store.lock()?.status())
    }

    /// Creates a new, closed connection to the database.
    pub fn connect(&self, registry: Arc<Registry>) -> Connection {
        Connection::new(self.clone(), registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::sql::types::{Column, DataType, Value};
    use pretty_assertions::assert_eq;

    fn users() -> Table {
        Table::new(
            "users",
            vec![
                Column::new("id", DataType::Integer).primary_key(),
                Column::new("name", DataType::String),
            ],
        )
    }

    #[test]
    fn seed_and_read() -> Result<()> {
        let db = Database::new(DialectVersion::new("postgresql", 16)?);
        db.create_table(users())?;
        assert_eq!(db.insert_rows("users", vec![vec![1.into(), "a".into()]])?, 1);
        assert_eq!(db.rows("USERS")?, vec![vec![Value::Integer(1), "a".into()]]);
        assert_eq!(db.get_table("users")?, Some(users()));
        assert_eq!(db.list_tables()?.len(), 1);
        assert_eq!(db.status()?, Status { tables: 1, rows: 1 });
        Ok(())
    }

    #[test]
    fn seed_is_atomic() -> Result<()> {
        let db = Database::new(DialectVersion::new("sqlite", 3)?);
        db.create_table(users())?;
        let result =
            db.insert_rows("users", vec![vec![1.into(), "a".into()], vec![1.into(), "b".into()]]);
        assert!(matches!(result, Err(Error::Constraint(_))));
        assert_eq!(db.rows("users")?, Vec::<Row>::new());
        Ok(())
    }
}
