use std::sync::{Arc, Mutex};

use log::debug;

use super::bind::bind;
use super::executor::{ExecutionResult, Executor};
use crate::client::Parameters;
use crate::error::Result;
use crate::sql::dialect::DialectVersion;
use crate::sql::parser::Parser;
use crate::storage::Memory;

/// Executes SQL text for a dialect version. This is the seam the command
/// protocol calls through, and what executor factories produce.
pub trait QueryExecutor: Send {
    /// The dialect version statements are parsed and executed under.
    fn dialect(&self) -> DialectVersion;

    /// Parses, binds and executes a single SQL statement.
    fn execute_sql(&mut self, sql: &str) -> Result<ExecutionResult>;
}

/// The built-in query executor: parses SQL under its dialect version, binds
/// the command parameters, and executes the statement against a shared store.
/// The store is locked for the duration of each statement.
pub struct Session {
    executor: Executor,
    store: Arc<Mutex<Memory>>,
    parameters: Parameters,
}

impl Session {
    pub fn new(dialect: DialectVersion, store: Arc<Mutex<Memory>>, parameters: Parameters) -> Self {
        Self { executor: Executor::new(dialect), store, parameters }
    }
}

impl QueryExecutor for Session {
    fn dialect(&self) -> DialectVersion {
        self.executor.dialect()
    }

    fn execute_sql(&mut self, sql: &str) -> Result<ExecutionResult> {
        let dialect = self.executor.dialect();
        let statement = Parser::parse(sql, dialect)?;
        debug!("executing {sql:?} under {dialect}");
        let statement = bind(statement, &self.parameters)?;
        let mut store = self.store.lock()?;
        self.executor.execute(statement, &mut store)
    }
}
