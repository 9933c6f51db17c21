//! SQL data types, values, table schemas, and resolved expressions.

mod expression;
mod schema;
mod value;

pub use expression::{Expression, Function, Pattern};
pub use schema::{Column, Table};
pub use value::{DataType, Row, Rows, Value};
