//! In-memory table storage.

mod memory;

pub use memory::{Memory, Status};
