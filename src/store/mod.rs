//! Persistence layer — libSQL-backed storage for messages, subscribers,
//! the override queue, and the conversation log.

pub mod libsql_backend;
pub mod traits;

pub use libsql_backend::LibSqlStore;
pub use traits::{Direction, OverrideEntry, Store, Subscriber};
