//! Persistence traits the managers are written against.
//!
//! The traits are implemented by storage backends (e.g. `cmdb-store-sqlite`).
//! Every backend exposes a single error type through [`Backend`], so a type
//! implementing several traits reports failures uniformly.
//!
//! All async methods return `Send` futures so managers can be driven from a
//! multi-threaded tokio runtime.

use std::future::Future;

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{
  ci::{AttrValue, Ci, CiFilter, CiPage, CiStatus, NewCi},
  relationship::{
    NewRelationship, NewRelationshipType, RelStatus, Relationship,
    RelationshipType,
  },
  schema::{AttrDef, CiType, CiTypeVersion, NewCiType, VersionStatus},
  service::{NewService, Service, ServiceMember},
};

/// Shared error type for every store trait.
pub trait Backend: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;
}

// ─── CIs ─────────────────────────────────────────────────────────────────────

pub trait CiStore: Backend {
  /// Persist a new CI; `id` and timestamps are assigned by the store.
  fn create_ci(
    &self,
    input: NewCi,
  ) -> impl Future<Output = Result<Ci, Self::Error>> + Send + '_;

  /// Overwrite the mutable columns of an existing CI and bump `updated_at`.
  fn update_ci(
    &self,
    ci: Ci,
  ) -> impl Future<Output = Result<Ci, Self::Error>> + Send + '_;

  fn get_ci(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Ci>, Self::Error>> + Send + '_;

  fn get_ci_by_code<'a>(
    &'a self,
    ci_code: &'a str,
  ) -> impl Future<Output = Result<Option<Ci>, Self::Error>> + Send + 'a;

  fn get_ci_by_asset<'a>(
    &'a self,
    asset_id: &'a str,
  ) -> impl Future<Output = Result<Option<Ci>, Self::Error>> + Send + 'a;

  /// A page of CIs matching `filter`, ordered by name.
  fn list_cis<'a>(
    &'a self,
    filter: &'a CiFilter,
  ) -> impl Future<Output = Result<CiPage, Self::Error>> + Send + 'a;

  /// Every CI in `status`, unpaginated. Used by whole-graph projections.
  fn list_cis_with_status(
    &self,
    status: CiStatus,
  ) -> impl Future<Output = Result<Vec<Ci>, Self::Error>> + Send + '_;
}

// ─── Attribute values ────────────────────────────────────────────────────────

pub trait AttrValueStore: Backend {
  fn list_values(
    &self,
    ci_id: Uuid,
  ) -> impl Future<Output = Result<Vec<AttrValue>, Self::Error>> + Send + '_;

  /// Insert or replace one value per key, keyed on `(ci_id, key)`, each
  /// pinned to `version_id`.
  fn upsert_values(
    &self,
    ci_id: Uuid,
    version_id: Option<Uuid>,
    values: Map<String, Value>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;
}

// ─── Schema ──────────────────────────────────────────────────────────────────

pub trait SchemaStore: Backend {
  // ── Types ─────────────────────────────────────────────────────────────

  fn create_type(
    &self,
    input: NewCiType,
  ) -> impl Future<Output = Result<CiType, Self::Error>> + Send + '_;

  fn get_type(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<CiType>, Self::Error>> + Send + '_;

  fn get_type_by_code<'a>(
    &'a self,
    code: &'a str,
  ) -> impl Future<Output = Result<Option<CiType>, Self::Error>> + Send + 'a;

  fn list_types(
    &self,
  ) -> impl Future<Output = Result<Vec<CiType>, Self::Error>> + Send + '_;

  // ── Versions ──────────────────────────────────────────────────────────

  /// All versions of a type, newest first.
  fn list_versions(
    &self,
    type_id: Uuid,
  ) -> impl Future<Output = Result<Vec<CiTypeVersion>, Self::Error>> + Send + '_;

  fn get_active_version(
    &self,
    type_id: Uuid,
  ) -> impl Future<Output = Result<Option<CiTypeVersion>, Self::Error>> + Send + '_;

  fn get_version(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<CiTypeVersion>, Self::Error>> + Send + '_;

  // ── Attribute definitions ─────────────────────────────────────────────

  /// Active definitions of a version, ordered by `(sort_order, key)`.
  fn list_attr_defs(
    &self,
    version_id: Uuid,
  ) -> impl Future<Output = Result<Vec<AttrDef>, Self::Error>> + Send + '_;

  /// A definition by id, including soft-deleted ones.
  fn get_attr_def(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<AttrDef>, Self::Error>> + Send + '_;

  fn create_attr_def(
    &self,
    def: AttrDef,
  ) -> impl Future<Output = Result<AttrDef, Self::Error>> + Send + '_;

  /// Insert all of `defs` or none of them.
  fn bulk_insert_attr_defs(
    &self,
    defs: Vec<AttrDef>,
  ) -> impl Future<Output = Result<Vec<AttrDef>, Self::Error>> + Send + '_;

  /// Overwrite a definition and bump `updated_at`.
  fn update_attr_def(
    &self,
    def: AttrDef,
  ) -> impl Future<Output = Result<AttrDef, Self::Error>> + Send + '_;

  /// Mark a definition inactive. Definitions are never removed.
  fn soft_delete_attr_def(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Run `f` inside a single write transaction, committing iff it returns
  /// `Ok`. The backend must serialise concurrent transactions so that two
  /// publishes of the same type cannot interleave.
  fn with_transaction<T, F>(
    &self,
    f: F,
  ) -> impl Future<Output = Result<T, Self::Error>> + Send + '_
  where
    T: Send + 'static,
    F: FnOnce(&dyn SchemaTx<Error = Self::Error>) -> Result<T, Self::Error>
      + Send
      + 'static;
}

/// The synchronous view of the schema tables available inside
/// [`SchemaStore::with_transaction`].
pub trait SchemaTx {
  type Error;

  fn get_version(&self, id: Uuid)
  -> Result<Option<CiTypeVersion>, Self::Error>;

  /// Highest version number of the type, or 0 if it has none.
  fn latest_version_number(&self, type_id: Uuid) -> Result<u32, Self::Error>;

  fn create_version(
    &self,
    type_id: Uuid,
    version: u32,
    status: VersionStatus,
    created_by: Option<String>,
  ) -> Result<CiTypeVersion, Self::Error>;

  fn get_active_version(
    &self,
    type_id: Uuid,
  ) -> Result<Option<CiTypeVersion>, Self::Error>;

  fn update_version_status(
    &self,
    id: Uuid,
    status: VersionStatus,
  ) -> Result<(), Self::Error>;

  /// Retire every active version of `type_id` except `keep`. Returns how
  /// many were retired.
  fn retire_other_active(
    &self,
    type_id: Uuid,
    keep: Uuid,
  ) -> Result<usize, Self::Error>;

  fn list_attr_defs(&self, version_id: Uuid)
  -> Result<Vec<AttrDef>, Self::Error>;

  fn bulk_insert_attr_defs(&self, defs: &[AttrDef]) -> Result<(), Self::Error>;
}

// ─── Relationships ───────────────────────────────────────────────────────────

pub trait RelationshipStore: Backend {
  // ── Types ─────────────────────────────────────────────────────────────

  /// All relationship types, ordered by name.
  fn list_relationship_types(
    &self,
  ) -> impl Future<Output = Result<Vec<RelationshipType>, Self::Error>> + Send + '_;

  fn get_relationship_type(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<RelationshipType>, Self::Error>>
  + Send
  + '_;

  fn create_relationship_type(
    &self,
    input: NewRelationshipType,
  ) -> impl Future<Output = Result<RelationshipType, Self::Error>> + Send + '_;

  fn update_relationship_type(
    &self,
    rel_type: RelationshipType,
  ) -> impl Future<Output = Result<RelationshipType, Self::Error>> + Send + '_;

  fn delete_relationship_type(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Relationships of any status that reference the type.
  fn count_relationships_of_type(
    &self,
    rel_type_id: Uuid,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  // ── Relationships ─────────────────────────────────────────────────────

  fn create_relationship(
    &self,
    input: NewRelationship,
  ) -> impl Future<Output = Result<Relationship, Self::Error>> + Send + '_;

  fn get_relationship(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Relationship>, Self::Error>> + Send + '_;

  /// Set the relationship's status to retired and return it.
  fn retire_relationship(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Relationship, Self::Error>> + Send + '_;

  /// Active relationships with `ci_id` at either end, in a stable order.
  fn list_relationships_by_ci(
    &self,
    ci_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Relationship>, Self::Error>> + Send + '_;

  /// All relationships, optionally restricted to one status.
  fn list_relationships(
    &self,
    status: Option<RelStatus>,
  ) -> impl Future<Output = Result<Vec<Relationship>, Self::Error>> + Send + '_;
}

// ─── Services ────────────────────────────────────────────────────────────────

pub trait ServiceStore: Backend {
  fn create_service(
    &self,
    input: NewService,
  ) -> impl Future<Output = Result<Service, Self::Error>> + Send + '_;

  fn update_service(
    &self,
    service: Service,
  ) -> impl Future<Output = Result<Service, Self::Error>> + Send + '_;

  fn get_service(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Service>, Self::Error>> + Send + '_;

  fn get_service_by_code<'a>(
    &'a self,
    code: &'a str,
  ) -> impl Future<Output = Result<Option<Service>, Self::Error>> + Send + 'a;

  /// All services, ordered by name.
  fn list_services(
    &self,
  ) -> impl Future<Output = Result<Vec<Service>, Self::Error>> + Send + '_;

  fn add_service_member(
    &self,
    service_id: Uuid,
    ci_id: Uuid,
    role: Option<String>,
  ) -> impl Future<Output = Result<ServiceMember, Self::Error>> + Send + '_;

  fn get_service_member(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<ServiceMember>, Self::Error>> + Send + '_;

  fn remove_service_member(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Members of a service, oldest first.
  fn list_service_members(
    &self,
    service_id: Uuid,
  ) -> impl Future<Output = Result<Vec<ServiceMember>, Self::Error>> + Send + '_;
}
