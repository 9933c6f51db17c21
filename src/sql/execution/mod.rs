//! Executes statement ASTs against the in-memory store, and maps dialect names
//! to the executors that do so.

mod aggregator;
mod bind;
mod executor;
mod join;
mod query;
mod registry;
mod scope;
mod session;

pub use bind::bind;
pub use executor::{ExecutionResult, Executor};
pub use registry::{ExecutorFactory, Registry, session_factory};
pub use scope::{Label, Scope};
pub use session::{QueryExecutor, Session};
