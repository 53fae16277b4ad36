//! CI types, schema versions and attribute definitions.

use std::collections::HashSet;

use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
  Error, Result,
  ci::CiFilter,
  error::StoreResultExt as _,
  event::{Context, EntityType, EventSink, NoAudit, record},
  field::validate_definition,
  schema::{
    AttrDef, AttrDefPatch, CiType, CiTypeVersion, CompatibilityWarning,
    DraftVersion, NewAttrDef, NewCiType, PublishOutcome, VersionStatus,
  },
  store::{AttrValueStore, CiStore, SchemaStore},
};

/// CIs fetched per page while computing compatibility warnings.
pub const COMPAT_PAGE_SIZE: u32 = 100;
/// Upper bound on pages scanned while computing compatibility warnings.
pub const COMPAT_MAX_PAGES: u32 = 50;

/// Owns the type → version → definition hierarchy and the rule that each type
/// has at most one active version.
pub struct SchemaManager<S, E = NoAudit> {
  store:  S,
  events: Option<E>,
}

impl<S> SchemaManager<S> {
  pub fn new(store: S) -> Self { Self { store, events: None } }
}

impl<S, E> SchemaManager<S, E>
where
  S: SchemaStore + CiStore + AttrValueStore,
  E: EventSink,
{
  pub fn with_events(store: S, events: E) -> Self {
    Self { store, events: Some(events) }
  }

  pub fn store(&self) -> &S { &self.store }

  // ── Types ─────────────────────────────────────────────────────────────

  pub async fn create_type(
    &self,
    input: NewCiType,
    ctx: &Context,
  ) -> Result<CiType> {
    let input = input.normalized()?;
    if self.store.get_type_by_code(&input.code).await.store_err()?.is_some() {
      return Err(Error::bad_request(format!(
        "CI type code {:?} already exists",
        input.code
      )));
    }

    let created = self.store.create_type(input).await.store_err()?;
    info!(type_id = %created.id, code = %created.code, "created CI type");
    self
      .emit(
        EntityType::CmdbType,
        created.id,
        "CMDB_TYPE_CREATED",
        json!({ "code": created.code }),
        ctx,
      )
      .await;
    Ok(created)
  }

  pub async fn list_types(&self) -> Result<Vec<CiType>> {
    self.store.list_types().await.store_err()
  }

  pub async fn get_type(&self, id: Uuid) -> Result<CiType> {
    self
      .store
      .get_type(id)
      .await
      .store_err()?
      .ok_or_else(|| Error::not_found("CI type", id))
  }

  // ── Versions ──────────────────────────────────────────────────────────

  pub async fn list_versions(&self, type_id: Uuid) -> Result<Vec<CiTypeVersion>> {
    self.get_type(type_id).await?;
    self.store.list_versions(type_id).await.store_err()
  }

  pub async fn get_version(&self, id: Uuid) -> Result<CiTypeVersion> {
    self
      .store
      .get_version(id)
      .await
      .store_err()?
      .ok_or_else(|| Error::not_found("schema version", id))
  }

  /// Create the next version of a type as a draft, seeded with a copy of the
  /// active version's definitions.
  pub async fn create_draft_version(
    &self,
    type_id: Uuid,
    ctx: &Context,
  ) -> Result<DraftVersion> {
    self.get_type(type_id).await?;

    let created_by = Some(ctx.user_id.clone()).filter(|u| !u.is_empty());
    let draft = self
      .store
      .with_transaction(move |tx| {
        let next = tx.latest_version_number(type_id)? + 1;
        let version =
          tx.create_version(type_id, next, VersionStatus::Draft, created_by)?;
        let defs: Vec<AttrDef> = match tx.get_active_version(type_id)? {
          Some(active) => tx
            .list_attr_defs(active.id)?
            .iter()
            .map(|def| def.to_input().into_def(version.id))
            .collect(),
          None => Vec::new(),
        };
        tx.bulk_insert_attr_defs(&defs)?;
        Ok(DraftVersion { version, defs })
      })
      .await
      .store_err()?;

    info!(
      %type_id,
      version = draft.version.version,
      copied = draft.defs.len(),
      "created draft schema version"
    );
    self
      .emit(
        EntityType::CmdbSchema,
        draft.version.id,
        "SPEC_VERSION_CREATED",
        json!({ "typeId": type_id, "version": draft.version.version }),
        ctx,
      )
      .await;
    Ok(draft)
  }

  /// Make `version_id` the single active version of its type, retiring any
  /// other active version in the same transaction.
  ///
  /// Afterwards, CIs of the type that lack values for newly required keys are
  /// reported as warnings. Their stored values are not touched.
  pub async fn publish_version(
    &self,
    version_id: Uuid,
    ctx: &Context,
  ) -> Result<PublishOutcome> {
    let (version, retired) = self
      .store
      .with_transaction(move |tx| {
        let Some(version) = tx.get_version(version_id)? else {
          return Ok(Err(Error::not_found("schema version", version_id)));
        };
        let status = match version.status.publish() {
          Ok(status) => status,
          Err(e) => return Ok(Err(e)),
        };
        if let Some(active) = tx.get_active_version(version.type_id)?
          && let Err(e) = active.status.retire()
        {
          return Ok(Err(e));
        }
        let retired = tx.retire_other_active(version.type_id, version.id)?;
        tx.update_version_status(version.id, status)?;
        Ok(Ok((CiTypeVersion { status, ..version }, retired)))
      })
      .await
      .store_err()??;

    info!(
      version_id = %version.id,
      type_id = %version.type_id,
      version = version.version,
      retired,
      "published schema version"
    );
    self
      .emit(
        EntityType::CmdbSchema,
        version.id,
        "SPEC_VERSION_PUBLISHED",
        json!({ "typeId": version.type_id, "version": version.version }),
        ctx,
      )
      .await;

    let warnings = self.compatibility_warnings(&version).await?;
    Ok(PublishOutcome { version, warnings })
  }

  async fn compatibility_warnings(
    &self,
    version: &CiTypeVersion,
  ) -> Result<Vec<CompatibilityWarning>> {
    let required: Vec<String> = self
      .store
      .list_attr_defs(version.id)
      .await
      .store_err()?
      .into_iter()
      .filter(|d| d.required)
      .map(|d| d.key)
      .collect();
    if required.is_empty() {
      return Ok(Vec::new());
    }

    let mut warnings = Vec::new();
    for page in 1..=COMPAT_MAX_PAGES {
      let filter = CiFilter {
        type_id: Some(version.type_id),
        page: Some(page),
        limit: Some(COMPAT_PAGE_SIZE),
        ..Default::default()
      };
      let batch = self.store.list_cis(&filter).await.store_err()?;
      for ci in &batch.items {
        let present: HashSet<String> = self
          .store
          .list_values(ci.id)
          .await
          .store_err()?
          .into_iter()
          .filter(|v| !v.value.is_null())
          .map(|v| v.key)
          .collect();
        let missing_keys: Vec<String> = required
          .iter()
          .filter(|k| !present.contains(*k))
          .cloned()
          .collect();
        if !missing_keys.is_empty() {
          warnings.push(CompatibilityWarning {
            ci_id: ci.id,
            ci_name: ci.name.clone(),
            missing_keys,
          });
        }
      }
      if batch.items.len() < COMPAT_PAGE_SIZE as usize {
        break;
      }
    }

    debug!(version_id = %version.id, warnings = warnings.len(), "compatibility scan");
    Ok(warnings)
  }

  // ── Attribute definitions ─────────────────────────────────────────────

  pub async fn list_attr_defs(&self, version_id: Uuid) -> Result<Vec<AttrDef>> {
    self.get_version(version_id).await?;
    self.store.list_attr_defs(version_id).await.store_err()
  }

  pub async fn add_attr_def(
    &self,
    version_id: Uuid,
    input: NewAttrDef,
    ctx: &Context,
  ) -> Result<AttrDef> {
    self.get_version(version_id).await?;
    validate_definition(&input)?;

    let existing = self.store.list_attr_defs(version_id).await.store_err()?;
    let key = input.key.trim();
    if existing.iter().any(|d| d.key == key) {
      return Err(duplicate_key(key));
    }

    let created = self
      .store
      .create_attr_def(input.into_def(version_id))
      .await
      .store_err()?;
    info!(%version_id, key = %created.key, "added attribute definition");
    self.def_changed(&created, "create", ctx).await;
    Ok(created)
  }

  /// Add several definitions at once. Every definition is checked before any
  /// is written.
  pub async fn bulk_add_attr_defs(
    &self,
    version_id: Uuid,
    inputs: Vec<NewAttrDef>,
    ctx: &Context,
  ) -> Result<Vec<AttrDef>> {
    self.get_version(version_id).await?;
    for input in &inputs {
      validate_definition(input)?;
    }

    let mut seen: HashSet<String> = self
      .store
      .list_attr_defs(version_id)
      .await
      .store_err()?
      .into_iter()
      .map(|d| d.key)
      .collect();
    for input in &inputs {
      let key = input.key.trim();
      if !seen.insert(key.to_owned()) {
        return Err(duplicate_key(key));
      }
    }

    let defs = inputs
      .into_iter()
      .map(|input| input.into_def(version_id))
      .collect();
    let created = self.store.bulk_insert_attr_defs(defs).await.store_err()?;
    info!(%version_id, count = created.len(), "added attribute definitions");
    for def in &created {
      self.def_changed(def, "create", ctx).await;
    }
    Ok(created)
  }

  /// Patch a definition. The merged result must pass structural validation.
  pub async fn update_attr_def(
    &self,
    id: Uuid,
    patch: AttrDefPatch,
    ctx: &Context,
  ) -> Result<AttrDef> {
    let current = self.get_attr_def(id).await?;

    let mut merged = current.to_input();
    patch.apply_to(&mut merged);
    validate_definition(&merged)?;

    // Reactivating needs the same check as a rename: another active
    // definition may have taken the key meanwhile.
    let key = merged.key.trim();
    if merged.is_active && (key != current.key || !current.is_active) {
      let siblings =
        self.store.list_attr_defs(current.version_id).await.store_err()?;
      if siblings.iter().any(|d| d.id != id && d.key == key) {
        return Err(duplicate_key(key));
      }
    }

    let updated = AttrDef {
      id,
      created_at: current.created_at,
      ..merged.into_def(current.version_id)
    };
    let updated = self.store.update_attr_def(updated).await.store_err()?;
    info!(def_id = %id, key = %updated.key, "updated attribute definition");
    self.def_changed(&updated, "update", ctx).await;
    Ok(updated)
  }

  pub async fn soft_delete_attr_def(&self, id: Uuid, ctx: &Context) -> Result<()> {
    let def = self.get_attr_def(id).await?;
    self.store.soft_delete_attr_def(id).await.store_err()?;
    info!(def_id = %id, key = %def.key, "deactivated attribute definition");
    self.def_changed(&def, "delete", ctx).await;
    Ok(())
  }

  async fn get_attr_def(&self, id: Uuid) -> Result<AttrDef> {
    self
      .store
      .get_attr_def(id)
      .await
      .store_err()?
      .ok_or_else(|| Error::not_found("attribute definition", id))
  }

  // ── Events ────────────────────────────────────────────────────────────

  async fn def_changed(&self, def: &AttrDef, action: &str, ctx: &Context) {
    self
      .emit(
        EntityType::CmdbSchema,
        def.version_id,
        "SPEC_DEF_CHANGED",
        json!({ "action": action, "defId": def.id, "key": def.key }),
        ctx,
      )
      .await;
  }

  async fn emit(
    &self,
    entity_type: EntityType,
    entity_id: Uuid,
    event_type: &str,
    payload: serde_json::Value,
    ctx: &Context,
  ) {
    record(self.events.as_ref(), entity_type, entity_id, event_type, payload, ctx)
      .await;
  }
}

fn duplicate_key(key: &str) -> Error {
  Error::bad_request(format!("attribute key {key:?} already exists in version"))
}
