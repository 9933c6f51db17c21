use std::sync::Arc;

use super::{Command, Connection, Database};
use crate::error::Result;
use crate::sql::dialect::Dialect;
use crate::sql::execution::Registry;

/// Creates open connections, for data-access code that obtains connections
/// through a factory.
pub trait ConnectionFactory {
    fn create_open_connection(&self) -> Result<Connection>;
}

/// A connection factory for a mock database.
#[derive(Clone)]
pub struct DatabaseConnectionFactory {
    database: Database,
    registry: Arc<Registry>,
}

impl DatabaseConnectionFactory {
    pub fn new(database: Database, registry: Arc<Registry>) -> Self {
        Self { database, registry }
    }
}

impl ConnectionFactory for DatabaseConnectionFactory {
    fn create_open_connection(&self) -> Result<Connection> {
        let connection = self.database.connect(self.registry.clone());
        connection.open()?;
        Ok(connection)
    }
}

/// What a data-access driver needs to know to talk to a dialect: the
/// connection and command types to use, and how named parameters are spelled.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DriverProfile {
    pub dialect: &'static str,
    pub connection_type: &'static str,
    pub command_type: &'static str,
    /// Named placeholders carry the prefix in SQL text, e.g. `@id`.
    pub use_named_prefix_in_sql: bool,
    /// Parameter names carry the prefix, e.g. `@id` rather than `id`.
    pub use_named_prefix_in_parameter: bool,
    pub named_prefix: char,
}

impl DriverProfile {
    /// Builds the driver profile for a dialect name.
    pub fn for_dialect(name: &str) -> Result<Self> {
        let dialect = Dialect::lookup(name)?;
        Ok(Self {
            dialect: dialect.name,
            connection_type: std::any::type_name::<Connection>(),
            command_type: std::any::type_name::<Command>(),
            use_named_prefix_in_sql: dialect.prefix_in_sql,
            use_named_prefix_in_parameter: dialect.prefix_in_parameter_name,
            named_prefix: dialect.parameter_prefix,
        })
    }

    /// Formats a named placeholder for SQL text.
    pub fn placeholder(&self, name: &str) -> String {
        match self.use_named_prefix_in_sql {
            true => format!("{}{name}", self.named_prefix),
            false => name.to_string(),
        }
    }

    /// Formats a parameter name.
    pub fn parameter_name(&self, name: &str) -> String {
        match self.use_named_prefix_in_parameter {
            true => format!("{}{name}", self.named_prefix),
            false => name.to_string(),
        }
    }
}
