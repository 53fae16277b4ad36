//! Error type for `cmdb-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  /// Raised inside a transaction, where the connection is used directly.
  #[error("sqlite error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("unknown {kind} code: {value:?}")]
  UnknownCode { kind: &'static str, value: String },

  /// An update or delete matched no row.
  #[error("{0} not found: {1}")]
  RowNotFound(&'static str, uuid::Uuid),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
