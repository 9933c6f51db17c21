pub mod dialect;
pub mod execution;
pub mod parser;
pub mod types;

pub use dialect::{Dialect, DialectVersion};
pub use parser::{Parser, ast};
pub use types::{Row, Value};
