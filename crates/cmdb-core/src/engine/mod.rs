//! Lifecycle managers.
//!
//! Each manager owns a store handle and an optional
//! [`EventSink`](crate::event::EventSink). Managers validate fully before
//! writing and append one audit event per successful mutation.

mod ci;
mod graph;
mod schema;
mod services;

pub use self::{
  ci::CiManager,
  graph::{MAX_PATH_DEPTH, RelationshipGraph},
  schema::{COMPAT_MAX_PAGES, COMPAT_PAGE_SIZE, SchemaManager},
  services::ServiceMapper,
};
