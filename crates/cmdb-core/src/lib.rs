//! Core types, validation and lifecycle managers for the CMDB.
//!
//! This crate has no HTTP or database dependencies. Storage
//! is reached only through the collaborator traits in [`store`]; the managers
//! in [`engine`] are generic over them.

// Store trait impls are written as native `async fn`; silence the advisory
// lint about their futures' `Send` bounds.
#![allow(async_fn_in_trait)]

pub mod ci;
pub mod engine;
pub mod error;
pub mod event;
pub mod field;
pub mod relationship;
pub mod schema;
pub mod service;
pub mod store;

pub use error::{Error, ErrorKind, FieldError, Result};
