//! CI creation, update and the composed read model.

use serde_json::{Map, Value, json};
use tracing::info;
use uuid::Uuid;

use crate::{
  Error, Result,
  ci::{Ci, CiDetail, CiFilter, CiPage, CiPatch, NewCi},
  error::StoreResultExt as _,
  event::{Context, EntityType, EventSink, NoAudit, record},
  field::validate_attributes,
  schema::CiTypeVersion,
  store::{AttrValueStore, CiStore, RelationshipStore, SchemaStore},
};

pub struct CiManager<S, E = NoAudit> {
  store:  S,
  events: Option<E>,
}

impl<S> CiManager<S> {
  pub fn new(store: S) -> Self { Self { store, events: None } }
}

impl<S, E> CiManager<S, E>
where
  S: CiStore + SchemaStore + AttrValueStore + RelationshipStore,
  E: EventSink,
{
  pub fn with_events(store: S, events: E) -> Self {
    Self { store, events: Some(events) }
  }

  pub fn store(&self) -> &S { &self.store }

  /// Create a CI and its attribute values.
  ///
  /// Values are validated against the type's active version and pinned to
  /// it. A type with no active version accepts any attributes, stored
  /// unpinned.
  pub async fn create_ci(
    &self,
    input: NewCi,
    attributes: Map<String, Value>,
    ctx: &Context,
  ) -> Result<Ci> {
    let input = input.normalized()?;
    if self.store.get_type(input.type_id).await.store_err()?.is_none() {
      return Err(Error::not_found("CI type", input.type_id));
    }
    self.ensure_code_free(&input.ci_code, None).await?;
    let version = self.validate_for_type(input.type_id, &attributes).await?;

    let ci = self.store.create_ci(input).await.store_err()?;
    if !attributes.is_empty() {
      self
        .store
        .upsert_values(ci.id, version.map(|v| v.id), attributes)
        .await
        .store_err()?;
    }

    info!(ci_id = %ci.id, ci_code = %ci.ci_code, "created CI");
    record(
      self.events.as_ref(),
      EntityType::CmdbCi,
      ci.id,
      "CI_CREATED",
      json!({ "ciCode": ci.ci_code, "typeId": ci.type_id }),
      ctx,
    )
    .await;
    Ok(ci)
  }

  /// Patch a CI and upsert any supplied attributes.
  ///
  /// Attributes are validated against the active version of the CI's
  /// (possibly new) type before anything is written.
  pub async fn update_ci(
    &self,
    id: Uuid,
    patch: CiPatch,
    attributes: Option<Map<String, Value>>,
    ctx: &Context,
  ) -> Result<Ci> {
    let mut ci = self.get_ci(id).await?;
    patch.check()?;
    if let Some(type_id) = patch.type_id
      && self.store.get_type(type_id).await.store_err()?.is_none()
    {
      return Err(Error::not_found("CI type", type_id));
    }
    if let Some(code) = &patch.ci_code {
      self.ensure_code_free(code.trim(), Some(id)).await?;
    }

    let type_id = patch.type_id.unwrap_or(ci.type_id);
    let version = match &attributes {
      Some(attrs) => self.validate_for_type(type_id, attrs).await?,
      None => None,
    };

    if !patch.is_empty() {
      patch.apply_to(&mut ci);
      ci = self.store.update_ci(ci).await.store_err()?;
    }
    if let Some(attrs) = attributes
      && !attrs.is_empty()
    {
      self
        .store
        .upsert_values(ci.id, version.map(|v| v.id), attrs)
        .await
        .store_err()?;
    }

    info!(ci_id = %ci.id, ci_code = %ci.ci_code, "updated CI");
    record(
      self.events.as_ref(),
      EntityType::CmdbCi,
      ci.id,
      "CI_UPDATED",
      json!({ "ciCode": ci.ci_code }),
      ctx,
    )
    .await;
    Ok(ci)
  }

  pub async fn get_ci(&self, id: Uuid) -> Result<Ci> {
    self
      .store
      .get_ci(id)
      .await
      .store_err()?
      .ok_or_else(|| Error::not_found("CI", id))
  }

  /// The CI, its stored values, and the type's active schema.
  pub async fn get_ci_detail(
    &self,
    id: Uuid,
    include_relationships: bool,
  ) -> Result<CiDetail> {
    let ci = self.get_ci(id).await?;
    let attributes = self.store.list_values(id).await.store_err()?;
    let version = self.store.get_active_version(ci.type_id).await.store_err()?;
    let schema = match &version {
      Some(v) => self.store.list_attr_defs(v.id).await.store_err()?,
      None => Vec::new(),
    };
    let relationships = if include_relationships {
      Some(self.store.list_relationships_by_ci(id).await.store_err()?)
    } else {
      None
    };
    Ok(CiDetail { ci, attributes, version, schema, relationships })
  }

  pub async fn list_cis(&self, filter: &CiFilter) -> Result<CiPage> {
    self.store.list_cis(filter).await.store_err()
  }

  pub async fn resolve_ci_by_asset(&self, asset_id: &str) -> Result<Option<Ci>> {
    let asset_id = asset_id.trim();
    if asset_id.is_empty() {
      return Ok(None);
    }
    self.store.get_ci_by_asset(asset_id).await.store_err()
  }

  // ── Helpers ───────────────────────────────────────────────────────────

  /// Validate `attributes` against the active version of `type_id`,
  /// returning the version the values should be pinned to.
  async fn validate_for_type(
    &self,
    type_id: Uuid,
    attributes: &Map<String, Value>,
  ) -> Result<Option<CiTypeVersion>> {
    let Some(version) =
      self.store.get_active_version(type_id).await.store_err()?
    else {
      return Ok(None);
    };
    let defs = self.store.list_attr_defs(version.id).await.store_err()?;
    validate_attributes(&defs, attributes)?;
    Ok(Some(version))
  }

  async fn ensure_code_free(&self, ci_code: &str, owner: Option<Uuid>) -> Result<()> {
    match self.store.get_ci_by_code(ci_code).await.store_err()? {
      Some(other) if Some(other.id) != owner => Err(Error::bad_request(format!(
        "CI code {ci_code:?} already exists"
      ))),
      _ => Ok(()),
    }
  }
}
