//! End-to-end tests of the connection/command protocol, as data-access code
//! uses it: connections from a factory, commands with parameters, and
//! executors resolved through the registry.

#![warn(clippy::all)]

use std::sync::Arc;

use pretty_assertions::assert_eq;

use sqlmock::client::{
    ConnectionFactory as _, ConnectionState, DatabaseConnectionFactory, Direction, DriverProfile,
    QueryResult,
};
use sqlmock::sql::execution::{ExecutorFactory, QueryExecutor};
use sqlmock::sql::types::{Column, DataType, Table, Value};
use sqlmock::{
    Connection, Database, DialectVersion, Error, ExecutionResult, Parameter, Parameters, Registry,
    Result,
};

/// A database with a seeded users table.
fn database(dialect: &str, version: u32) -> Result<Database> {
    let database = Database::new(DialectVersion::new(dialect, version)?);
    database.create_table(Table::new(
        "users",
        vec![
            Column::new("id", DataType::Integer).primary_key(),
            Column::new("name", DataType::String).not_null(),
            Column::new("active", DataType::Boolean).default(true),
        ],
    ))?;
    database.insert_rows(
        "users",
        vec![
            vec![1.into(), "alice".into(), true.into()],
            vec![2.into(), "bob".into(), false.into()],
            vec![3.into(), "carol".into(), true.into()],
        ],
    )?;
    Ok(database)
}

/// Opens a connection with the default registry.
fn connect(database: &Database) -> Result<Connection> {
    DatabaseConnectionFactory::new(database.clone(), Arc::new(Registry::with_defaults()))
        .create_open_connection()
}

#[test]
fn query_with_named_parameters() -> Result<()> {
    let database = database("sqlserver", 2019)?;
    let connection = connect(&database)?;
    let profile = DriverProfile::for_dialect("sqlserver")?;

    let sql = format!("SELECT name FROM users WHERE id >= {} ORDER BY id", profile.placeholder("id"));
    let mut command = connection.create_command(sql)?;
    command.add_parameter(profile.parameter_name("id"), 2);
    assert_eq!(
        command.execute_query()?,
        QueryResult {
            columns: vec!["name".into()],
            rows: vec![vec!["bob".into()], vec!["carol".into()]],
        }
    );

    // Parameter names match without the prefix and case-insensitively.
    let mut command = connection.create_command("SELECT COUNT(*) FROM users WHERE name = @Name")?;
    command.add_parameter("name", "alice");
    assert_eq!(command.execute_scalar()?, Value::Integer(1));
    Ok(())
}

#[test]
fn positional_parameters() -> Result<()> {
    let database = database("mysql", 8)?;
    let connection = connect(&database)?;
    let mut command = connection.create_command("SELECT id FROM users WHERE id > ? AND active = ?")?;
    // Output parameters aren't bound to placeholders.
    command.parameters_mut().add(Parameter::new("@result", 0).direction(Direction::Output));
    command.parameters_mut().add(Parameter::positional(1));
    command.parameters_mut().add(Parameter::positional(true));
    assert_eq!(command.execute_query()?.rows, vec![vec![Value::Integer(3)]]);

    command.parameters_mut().clear();
    assert!(matches!(command.execute_query(), Err(Error::ParameterBinding(_))));
    Ok(())
}

#[test]
fn non_queries() -> Result<()> {
    let database = database("postgresql", 16)?;
    let connection = connect(&database)?;

    let mut command = connection.create_command("UPDATE users SET active = @active WHERE id < 3")?;
    command.add_parameter("@active", false);
    assert_eq!(command.execute_non_query()?, 2);

    let command = connection.create_command("DELETE FROM users WHERE active = FALSE")?;
    assert_eq!(command.execute_non_query()?, 2);

    let command = connection.create_command("CREATE TABLE audit (id INT PRIMARY KEY)")?;
    assert_eq!(command.execute_non_query()?, 0);

    assert_eq!(database.rows("users")?, vec![vec![Value::from(3), "carol".into(), true.into()]]);
    assert_eq!(database.status()?.tables, 2);
    Ok(())
}

#[test]
fn failed_statements_leave_the_store_unchanged() -> Result<()> {
    let database = database("sqlite", 3)?;
    let connection = connect(&database)?;
    let before = database.rows("users")?;

    // The second row conflicts with an existing primary key.
    let sql = "INSERT INTO users (id, name) VALUES (4, 'dave'), (1, 'eve')";
    let result = connection.create_command(sql)?.execute_non_query();
    assert!(matches!(result, Err(Error::Constraint(_))));

    // NOT NULL is violated by the last row updated.
    let sql = "UPDATE users SET name = NULL";
    let result = connection.create_command(sql)?.execute_non_query();
    assert!(matches!(result, Err(Error::Constraint(_))));

    let sql = "INSERT INTO users (id, name) VALUES ('x', 'frank')";
    let result = connection.create_command(sql)?.execute_non_query();
    assert!(matches!(result, Err(Error::TypeMismatch(_))));

    assert_eq!(database.rows("users")?, before);
    Ok(())
}

/// Integer overflow in division is an error, and the database stays usable.
#[test]
fn division_overflow() -> Result<()> {
    let database = database("sqlite", 3)?;
    let connection = connect(&database)?;
    for sql in ["SELECT (-9223372036854775807 - 1) / -1", "SELECT (-9223372036854775807 - 1) % -1"] {
        let result = connection.create_command(sql)?.execute_scalar();
        assert!(matches!(result, Err(Error::InvalidOperation(_))), "{sql}: {result:?}");
    }
    let command = connection.create_command("SELECT COUNT(*) FROM users")?;
    assert_eq!(command.execute_scalar()?, Value::Integer(3));
    Ok(())
}

#[test]
fn upserts_across_dialects() -> Result<()> {
    for (dialect, version, sql) in [
        (
            "sqlite",
            3,
            "INSERT INTO users (id, name) VALUES (1, 'a') ON CONFLICT (id) DO UPDATE SET name = excluded.name",
        ),
        (
            "postgresql",
            15,
            "INSERT INTO users (id, name) VALUES (1, 'a') ON CONFLICT (id) DO UPDATE SET name = excluded.name",
        ),
        ("mysql", 8, "INSERT INTO users (id, name) VALUES (1, 'a') ON DUPLICATE KEY UPDATE name = VALUES(name)"),
    ] {
        let database = database(dialect, version)?;
        let connection = connect(&database)?;
        assert_eq!(connection.create_command(sql)?.execute_non_query()?, 1);
        let rows = database.rows("users")?;
        assert_eq!(rows[0], vec![Value::from(1), "a".into(), true.into()], "{dialect}");
        assert_eq!(rows.len(), 3);
    }
    Ok(())
}

#[test]
fn connection_lifecycle() -> Result<()> {
    let database = database("oracle", 19)?;
    let connection = database.connect(Arc::new(Registry::with_defaults()));
    assert_eq!(connection.state(), ConnectionState::Closed);
    assert!(matches!(connection.create_command("SELECT 1 FROM dual"), Err(Error::InvalidConnectionState(_))));

    connection.open()?;
    assert!(matches!(connection.open(), Err(Error::InvalidConnectionState(_))));
    let command = connection.create_command("SELECT 1 FROM dual")?;
    assert_eq!(command.execute_scalar()?, Value::Integer(1));

    // Closing is terminal, and commands created earlier stop working.
    connection.close()?;
    assert_eq!(connection.state(), ConnectionState::Closed);
    assert!(matches!(command.execute_scalar(), Err(Error::InvalidConnectionState(_))));
    assert!(matches!(connection.close(), Err(Error::InvalidConnectionState(_))));
    assert!(matches!(connection.open(), Err(Error::InvalidConnectionState(_))));

    // Other connections to the same database are unaffected.
    assert_eq!(connect(&database)?.create_command("SELECT COUNT(*) FROM users")?.execute_scalar()?, Value::Integer(3));
    Ok(())
}

/// An executor that answers every statement with a fixed value.
struct Fixed(&'static str, DialectVersion);

impl QueryExecutor for Fixed {
    fn dialect(&self) -> DialectVersion {
        self.1
    }

    fn execute_sql(&mut self, _: &str) -> Result<ExecutionResult> {
        let rows = std::iter::once(Ok(vec![Value::from(self.0)]));
        Ok(ExecutionResult::Select { columns: vec!["fixed".into()], rows: Box::new(rows) })
    }
}

fn fixed(value: &'static str) -> ExecutorFactory {
    Arc::new(move |connection: &Connection, _: &Parameters| {
        Box::new(Fixed(value, connection.dialect())) as Box<dyn QueryExecutor>
    })
}

#[test]
fn registry_first_registration_wins() -> Result<()> {
    let registry = Arc::new(Registry::new());
    assert!(registry.register("x", fixed("first")));
    assert!(!registry.register("x", fixed("second")));
    assert!(!registry.register("X", fixed("third")));
    assert_eq!(registry.dialects(), vec!["x".to_string()]);

    // Commands resolve executors by the connection's dialect name.
    assert!(registry.register("db2", fixed("db2")));
    assert!(!registry.register("db2", sqlmock::sql::execution::session_factory()));
    let database = database("db2", 11)?;
    let connection = DatabaseConnectionFactory::new(database, registry).create_open_connection()?;
    let command = connection.create_command("SELECT name FROM users")?;
    assert_eq!(command.execute_scalar()?, Value::from("db2"));
    Ok(())
}

#[test]
fn unregistered_dialect() -> Result<()> {
    let database = database("sqlite", 3)?;
    let connection =
        DatabaseConnectionFactory::new(database, Arc::new(Registry::new())).create_open_connection()?;
    let result = connection.create_command("SELECT id FROM users")?.execute();
    assert!(matches!(result, Err(Error::UnknownDialect(name)) if name == "sqlite"));
    Ok(())
}
