use std::collections::BTreeMap;

use log::debug;

use crate::error::Result;
use crate::errschema;
use crate::sql::types::{Row, Table};

/// An in-memory table store using the Rust standard library B-tree
/// implementation. Tables are keyed by their lowercased name, so lookups are
/// case-insensitive. Data is not persisted.
///
/// Rows are kept in insertion order. Mutations go through mutate(), which
/// applies them to a staged copy of the table's rows and only writes the copy
/// back if the mutation succeeds, so a failed statement leaves the store
/// unchanged.
#[derive(Default)]
pub struct Memory {
    tables: BTreeMap<String, (Table, Vec<Row>)>,
}

/// Store status.
#[derive(Clone, Debug, PartialEq)]
pub struct Status {
    /// The number of tables.
    pub tables: u64,
    /// The total number of rows across all tables.
    pub rows: u64,
}

impl Memory {
    /// Creates a new, empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a table, after validating its schema.
    pub fn create_table(&mut self, table: Table) -> Result<()> {
        table.validate()?;
        let key = table.name.to_lowercase();
        if self.tables.contains_key(&key) {
            return errschema!("table {} already exists", table.name);
        }
        debug!("creating table {}", table.name);
        self.tables.insert(key, (table, Vec::new()));
        Ok(())
    }

    /// Drops a table and its rows. Returns false if the table didn't exist and
    /// if_exists is set, otherwise errors on a missing table.
    pub fn drop_table(&mut self, name: &str, if_exists: bool) -> Result<bool> {
        match self.tables.remove(&name.to_lowercase()) {
            Some(_) => {
                debug!("dropped table {name}");
                Ok(true)
            }
            None if if_exists => Ok(false),
            None => errschema!("table {name} does not exist"),
        }
    }

    /// Fetches a table schema, if it exists.
    pub fn get_table(&self, name: &str) -> Option<&Table> {
        self.tables.get(&name.to_lowercase()).map(|(table, _)| table)
    }

    /// Fetches a table schema, erroring if it doesn't exist.
    pub fn must_get_table(&self, name: &str) -> Result<&Table> {
        match self.get_table(name) {
            Some(table) => Ok(table),
            None => errschema!("table {name} does not exist"),
        }
    }

    /// Lists all tables, ordered by name.
    pub fn list_tables(&self) -> Vec<&Table> {
        self.tables.values().map(|(table, _)| table).collect()
    }

    /// Returns a table's rows, in insertion order.
    pub fn scan(&self, name: &str) -> Result<&[Row]> {
        match self.tables.get(&name.to_lowercase()) {
            Some((_, rows)) => Ok(rows),
            None => errschema!("table {name} does not exist"),
        }
    }

    /// Mutates a table's rows via a closure operating on a staged copy. The
    /// copy replaces the table's rows only if the closure succeeds.
    pub fn mutate<T>(
        &mut self,
        name: &str,
        f: impl FnOnce(&Table, &mut Vec<Row>) -> Result<T>,
    ) -> Result<T> {
        let Some((table, rows)) = self.tables.get_mut(&name.to_lowercase()) else {
            return errschema!("table {name} does not exist");
        };
        let mut staged = rows.clone();
        let result = f(table, &mut staged)?;
        *rows = staged;
        Ok(result)
    }

    /// Returns the store status.
    pub fn status(&self) -> Status {
        Status {
            tables: self.tables.len() as u64,
            rows: self.tables.values().map(|(_, rows)| rows.len() as u64).sum(),
        }
    }
}
