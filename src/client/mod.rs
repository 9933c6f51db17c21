//! The mock connection/command protocol that data-access code runs against:
//! a database holds the tables, connections are opened to it, and commands
//! carry SQL text and parameters to the executor registered for the
//! connection's dialect.

mod command;
mod connection;
mod database;
mod factory;
mod parameter;

pub use command::{Command, QueryResult};
pub use connection::{Connection, ConnectionState};
pub use database::Database;
pub use factory::{ConnectionFactory, DatabaseConnectionFactory, DriverProfile};
pub use parameter::{Direction, Parameter, Parameters};
