#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod error;
pub mod sql;
pub mod storage;

pub use client::{Command, Connection, Database, Parameter, Parameters};
pub use error::{Error, Result};
pub use sql::execution::{ExecutionResult, Registry};
pub use sql::{Dialect, DialectVersion};
