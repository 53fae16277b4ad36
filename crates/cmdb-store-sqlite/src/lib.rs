//! SQLite backend for the CMDB.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. [`SqliteStore`] implements every
//! collaborator trait in `cmdb_core::store`, plus the audit
//! [`EventSink`](cmdb_core::event::EventSink).

mod encode;
mod schema;
mod store;
mod tx;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
