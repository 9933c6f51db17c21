use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use log::debug;

use super::session::{QueryExecutor, Session};
use crate::client::{Connection, Parameters};
use crate::error::{Error, Result};
use crate::sql::dialect::Dialect;

/// Builds a query executor for a connection and the parameters of the command
/// being executed.
pub type ExecutorFactory =
    Arc<dyn Fn(&Connection, &Parameters) -> Box<dyn QueryExecutor> + Send + Sync>;

/// Maps dialect names to executor factories. Names are case-insensitive, and
/// the first registration for a name wins: later registrations are ignored,
/// so independent initializers can all register the dialects they need.
#[derive(Default)]
pub struct Registry {
    factories: RwLock<HashMap<String, ExecutorFactory>>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with the built-in session executor registered for
    /// every catalog dialect.
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        for dialect in Dialect::all() {
            registry.register(dialect.name, session_factory());
        }
        registry
    }

    /// Registers an executor factory for a dialect name. Returns false and
    /// keeps the existing factory if the name is already registered.
    pub fn register(&self, name: &str, factory: ExecutorFactory) -> bool {
        let name = name.to_lowercase();
        // A panic while holding the lock can't leave the map half-updated.
        let mut factories = self.factories.write().unwrap_or_else(PoisonError::into_inner);
        if factories.contains_key(&name) {
            debug!("executor for dialect {name} is already registered, ignoring");
            return false;
        }
        debug!("registered executor for dialect {name}");
        factories.insert(name, factory);
        true
    }

    /// Whether a dialect name has a registered factory.
    pub fn is_registered(&self, name: &str) -> bool {
        let factories = self.factories.read().unwrap_or_else(PoisonError::into_inner);
        factories.contains_key(&name.to_lowercase())
    }

    /// Builds an executor for a dialect name using its registered factory.
    pub fn resolve(
        &self,
        name: &str,
        connection: &Connection,
        parameters: &Parameters,
    ) -> Result<Box<dyn QueryExecutor>> {
        let factory = {
            let factories = self.factories.read().unwrap_or_else(PoisonError::into_inner);
            factories.get(&name.to_lowercase()).cloned()
        };
        match factory {
            Some(factory) => Ok(factory(connection, parameters)),
            None => Err(Error::UnknownDialect(name.to_string())),
        }
    }

    /// The registered dialect names, sorted.
    pub fn dialects(&self) -> Vec<String> {
        let factories = self.factories.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = factories.keys().cloned().collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry").field("dialects", &self.dialects()).finish()
    }
}

/// A factory for the built-in session executor, executing against the
/// connection's store under the connection's dialect version.
pub fn session_factory() -> ExecutorFactory {
    Arc::new(|connection: &Connection, parameters: &Parameters| {
        let session = Session::new(connection.dialect(), connection.store(), parameters.clone());
        Box::new(session) as Box<dyn QueryExecutor>
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Database;
    use crate::sql::dialect::DialectVersion;
    use crate::sql::execution::ExecutionResult;
    use pretty_assertions::assert_eq;

    /// An executor that ignores the SQL and reports a fixed count.
    struct Fixed(DialectVersion, u64);

    impl QueryExecutor for Fixed {
        fn dialect(&self) -> DialectVersion {
            self.0
        }

        fn execute_sql(&mut self, _: &str) -> Result<ExecutionResult> {
            Ok(ExecutionResult::Delete { count: self.1 })
        }
    }

    fn fixed(count: u64) -> ExecutorFactory {
        Arc::new(move |connection: &Connection, _: &Parameters| {
            Box::new(Fixed(connection.dialect(), count)) as Box<dyn QueryExecutor>
        })
    }

    #[test]
    fn first_registration_wins() -> Result<()> {
        let registry = Arc::new(Registry::new());
        assert!(registry.register("MySQL", fixed(1)));
        assert!(!registry.register("mysql", fixed(2)));
        assert_eq!(registry.dialects(), vec!["mysql".to_string()]);

        let connection = Database::new(DialectVersion::new("mysql", 8)?).connect(registry.clone());
        let mut executor = registry.resolve("mysql", &connection, &Parameters::new())?;
        assert_eq!(executor.execute_sql("")?.count(), 1);
        Ok(())
    }

    #[test]
    fn unknown_dialect() -> Result<()> {
        let registry = Arc::new(Registry::new());
        let connection = Database::new(DialectVersion::new("db2", 11)?).connect(registry.clone());
        assert!(!registry.is_registered("db2"));
        assert!(matches!(
            registry.resolve("db2", &connection, &Parameters::new()),
            Err(Error::UnknownDialect(name)) if name == "db2"
        ));
        Ok(())
    }

    #[test]
    fn defaults_cover_the_catalog() {
        let registry = Registry::with_defaults();
        for dialect in Dialect::all() {
            assert!(registry.is_registered(dialect.name), "{}", dialect.name);
        }
        assert!(!registry.register("sqlite", fixed(0)));
    }
}
