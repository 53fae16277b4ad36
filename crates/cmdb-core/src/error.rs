//! Error types for `cmdb-core`.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// One offending attribute in a rejected payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
  pub key:     String,
  pub message: String,
}

impl FieldError {
  pub fn new(key: impl Into<String>, message: impl Into<String>) -> Self {
    Self { key: key.into(), message: message.into() }
  }
}

#[derive(Debug, Error)]
pub enum Error {
  #[error("{entity} not found: {id}")]
  NotFound { entity: &'static str, id: Uuid },

  #[error("bad request: {0}")]
  BadRequest(String),

  /// Attribute payload rejected; carries every offending field, not just the
  /// first.
  #[error("invalid CI attributes ({} field(s))", .0.len())]
  InvalidAttributes(Vec<FieldError>),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Coarse error category, for callers mapping errors onto a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  NotFound,
  BadRequest,
  Internal,
}

impl Error {
  pub fn not_found(entity: &'static str, id: Uuid) -> Self {
    Self::NotFound { entity, id }
  }

  pub fn bad_request(message: impl Into<String>) -> Self {
    Self::BadRequest(message.into())
  }

  pub fn store<E>(err: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(err))
  }

  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::NotFound { .. } => ErrorKind::NotFound,
      Self::BadRequest(_) | Self::InvalidAttributes(_) => ErrorKind::BadRequest,
      Self::Store(_) => ErrorKind::Internal,
    }
  }

  /// Field-level detail for a rejected attribute payload; empty otherwise.
  pub fn field_errors(&self) -> &[FieldError] {
    match self {
      Self::InvalidAttributes(errors) => errors,
      _ => &[],
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Lifts a collaborator's error into [`Error::Store`].
pub trait StoreResultExt<T> {
  fn store_err(self) -> Result<T>;
}

impl<T, E> StoreResultExt<T> for std::result::Result<T, E>
where
  E: std::error::Error + Send + Sync + 'static,
{
  fn store_err(self) -> Result<T> { self.map_err(Error::store) }
}
