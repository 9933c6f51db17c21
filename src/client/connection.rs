use std::sync::{Arc, Mutex, PoisonError};

use log::info;

use super::{Command, Database};
use crate::errstate;
use crate::error::Result;
use crate::sql::dialect::DialectVersion;
use crate::sql::execution::Registry;
use crate::storage::Memory;

/// The externally visible connection state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Closed,
    Open,
}

/// The connection lifecycle. A connection is opened at most once: once
/// closed, it stays closed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Lifecycle {
    New,
    Open,
    Closed,
}

/// A connection to a mock database. Connections are cheap handles: clones
/// share the same state, so closing one clone closes them all.
#[derive(Clone)]
pub struct Connection {
    database: Database,
    registry: Arc<Registry>,
    lifecycle: Arc<Mutex<Lifecycle>>,
}

impl Connection {
    /// Creates a new, closed connection.
    pub(crate) fn new(database: Database, registry: Arc<Registry>) -> Self {
        Self { database, registry, lifecycle: Arc::new(Mutex::new(Lifecycle::New)) }
    }

    /// Opens the connection. Errors if it is already open or was closed.
    pub fn open(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock()?;
        match *lifecycle {
            Lifecycle::New => {
                *lifecycle = Lifecycle::Open;
                info!("opened {} connection", self.dialect());
                Ok(())
            }
            Lifecycle::Open => errstate!("connection is already open"),
            Lifecycle::Closed => errstate!("connection was closed and can't be reopened"),
        }
    }

    /// Closes the connection. Errors if it isn't open.
    pub fn close(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock()?;
        match *lifecycle {
            Lifecycle::Open => {
                *lifecycle = Lifecycle::Closed;
                info!("closed {} connection", self.dialect());
                Ok(())
            }
            Lifecycle::New => errstate!("connection is not open"),
            Lifecycle::Closed => errstate!("connection is already closed"),
        }
    }

    /// The connection state.
    pub fn state(&self) -> ConnectionState {
        match *self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner) {
            Lifecycle::Open => ConnectionState::Open,
            Lifecycle::New | Lifecycle::Closed => ConnectionState::Closed,
        }
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Errors unless the connection is open.
    pub(crate) fn check_open(&self) -> Result<()> {
        match self.state() {
            ConnectionState::Open => Ok(()),
            ConnectionState::Closed => errstate!("connection is not open"),
        }
    }

    /// The dialect version of the connected database.
    pub fn dialect(&self) -> DialectVersion {
        self.database.dialect()
    }

    /// The connected database.
    pub fn database(&self) -> &Database {
        &self.database
    }

    /// The connected database's store.
    pub fn store(&self) -> Arc<Mutex<Memory>> {
        self.database.store()
    }

    /// The registry executors are resolved from.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Creates a command for SQL text. Errors unless the connection is open.
    pub fn create_command(&self, sql: impl Into<String>) -> Result<Command> {
        self.check_open()?;
        Ok(Command::new(self.clone(), sql.into()))
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("dialect", &self.dialect().to_string())
            .field("state", &self.state())
            .finish()
    }
}
