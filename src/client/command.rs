use super::{Connection, Parameter, Parameters};
use crate::errinvalid;
use crate::error::Result;
use crate::sql::execution::ExecutionResult;
use crate::sql::types::{Row, Value};

/// A materialized query result.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

/// A SQL command on a connection, with its parameters. Commands don't parse
/// or execute anything themselves: each execution resolves an executor for
/// the connection's dialect from the registry and delegates to it.
#[derive(Debug)]
pub struct Command {
    connection: Connection,
    sql: String,
    parameters: Parameters,
}

impl Command {
    pub(crate) fn new(connection: Connection, sql: String) -> Self {
        Self { connection, sql, parameters: Parameters::new() }
    }

    /// The command's SQL text.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Replaces the command's SQL text.
    pub fn set_sql(&mut self, sql: impl Into<String>) {
        self.sql = sql.into()
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn parameters_mut(&mut self) -> &mut Parameters {
        &mut self.parameters
    }

    /// Adds a named input parameter.
    pub fn add_parameter(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.parameters.add(Parameter::new(name, value));
        self
    }

    /// The command's connection.
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Executes the command, returning the raw execution result.
    pub fn execute(&self) -> Result<ExecutionResult> {
        self.connection.check_open()?;
        let dialect = self.connection.dialect().dialect.name;
        let mut executor =
            self.connection.registry().resolve(dialect, &self.connection, &self.parameters)?;
        executor.execute_sql(&self.sql)
    }

    /// Executes a query, returning its columns and rows.
    pub fn execute_query(&self) -> Result<QueryResult> {
        match self.execute()? {
            ExecutionResult::Select { columns, rows } => {
                Ok(QueryResult { columns, rows: rows.collect::<Result<_>>()? })
            }
            result => errinvalid!("expected a query, got {result:?}"),
        }
    }

    /// Executes a statement, returning the number of rows affected. Statements
    /// that don't modify rows return 0.
    pub fn execute_non_query(&self) -> Result<u64> {
        Ok(self.execute()?.count())
    }

    /// Executes a query, returning the first column of the first row, or NULL
    /// if there are no rows.
    pub fn execute_scalar(&self) -> Result<Value> {
        match self.execute()? {
            ExecutionResult::Select { mut rows, .. } => match rows.next().transpose()? {
                Some(row) => Ok(row.into_iter().next().unwrap_or(Value::Null)),
                None => Ok(Value::Null),
            },
            result => errinvalid!("expected a query, got {result:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::client::Database;
    use crate::error::Error;
    use crate::sql::dialect::DialectVersion;
    use crate::sql::execution::Registry;
    use pretty_assertions::assert_eq;

    fn open(dialect: &str, version: u32) -> Result<Connection> {
        let db = Database::new(DialectVersion::new(dialect, version)?);
        let connection = db.connect(Arc::new(Registry::with_defaults()));
        connection.open()?;
        Ok(connection)
    }

    #[test]
    fn execute_variants() -> Result<()> {
        let connection = open("mysql", 8)?;
        let run = |sql: &str| connection.create_command(sql)?.execute_non_query();
        run("CREATE TABLE t (id INT PRIMARY KEY, name VARCHAR(10))")?;
        assert_eq!(run("INSERT INTO t VALUES (1, 'a'), (2, 'b')")?, 2);

        let mut command = connection.create_command("SELECT name FROM t WHERE id = @id")?;
        command.add_parameter("@id", 2);
        assert_eq!(
            command.execute_query()?,
            QueryResult { columns: vec!["name".into()], rows: vec![vec!["b".into()]] }
        );
        assert_eq!(command.execute_scalar()?, "b".into());

        command.parameters_mut().clear();
        command.add_parameter("id", 3);
        assert_eq!(command.execute_scalar()?, Value::Null);

        command.set_sql("DELETE FROM t");
        assert!(matches!(command.execute_query(), Err(Error::InvalidOperation(_))));
        assert_eq!(connection.create_command("SELECT COUNT(*) FROM t")?.execute_scalar()?, 0.into());
        Ok(())
    }

    #[test]
    fn missing_parameter() -> Result<()> {
        let connection = open("postgresql", 16)?;
        let command = connection.create_command("SELECT @x")?;
        assert!(matches!(command.execute_scalar(), Err(Error::ParameterBinding(_))));
        Ok(())
    }

    #[test]
    fn unregistered_dialect() -> Result<()> {
        let db = Database::new(DialectVersion::new("db2", 11)?);
        let connection = db.connect(Arc::new(Registry::new()));
        connection.open()?;
        let command = connection.create_command("SELECT 1 FROM sysibm.sysdummy1")?;
        assert!(matches!(command.execute(), Err(Error::UnknownDialect(_))));
        Ok(())
    }
}
