//! Business services, their member CIs, and service-level impact.

use std::collections::HashSet;

use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
  Error, Result,
  error::StoreResultExt as _,
  event::{Context, EntityType, EventSink, NoAudit, record},
  relationship::{CiGraph, Direction},
  service::{NewService, Service, ServiceMember, ServicePatch},
  store::{CiStore, RelationshipStore, ServiceStore},
};

use super::graph::{load_ci, neighbourhood};

pub struct ServiceMapper<S, E = NoAudit> {
  store:  S,
  events: Option<E>,
}

impl<S> ServiceMapper<S> {
  pub fn new(store: S) -> Self { Self { store, events: None } }
}

impl<S, E> ServiceMapper<S, E>
where
  S: ServiceStore + CiStore + RelationshipStore,
  E: EventSink,
{
  pub fn with_events(store: S, events: E) -> Self {
    Self { store, events: Some(events) }
  }

  pub async fn create_service(&self, input: NewService, ctx: &Context) -> Result<Service> {
    let input = input.normalized()?;
    self.ensure_code_free(&input.code, None).await?;

    let created = self.store.create_service(input).await.store_err()?;
    info!(service_id = %created.id, code = %created.code, "created service");
    self
      .emit(created.id, "SERVICE_CREATED", json!({ "code": created.code }), ctx)
      .await;
    Ok(created)
  }

  pub async fn update_service(
    &self,
    id: Uuid,
    patch: ServicePatch,
    ctx: &Context,
  ) -> Result<Service> {
    let mut service = self.get_service(id).await?;
    patch.check()?;
    if let Some(code) = &patch.code {
      self.ensure_code_free(code.trim(), Some(id)).await?;
    }
    patch.apply_to(&mut service);

    let updated = self.store.update_service(service).await.store_err()?;
    info!(service_id = %id, "updated service");
    self
      .emit(id, "SERVICE_UPDATED", json!({ "code": updated.code }), ctx)
      .await;
    Ok(updated)
  }

  pub async fn get_service(&self, id: Uuid) -> Result<Service> {
    self
      .store
      .get_service(id)
      .await
      .store_err()?
      .ok_or_else(|| Error::not_found("service", id))
  }

  pub async fn list_services(&self) -> Result<Vec<Service>> {
    self.store.list_services().await.store_err()
  }

  // ── Members ───────────────────────────────────────────────────────────

  pub async fn add_member(
    &self,
    service_id: Uuid,
    ci_id: Uuid,
    role: Option<String>,
    ctx: &Context,
  ) -> Result<ServiceMember> {
    self.get_service(service_id).await?;
    load_ci(&self.store, ci_id).await?;
    let role = role.map(|r| r.trim().to_owned()).filter(|r| !r.is_empty());

    let member = self
      .store
      .add_service_member(service_id, ci_id, role)
      .await
      .store_err()?;
    info!(%service_id, %ci_id, member_id = %member.id, "added service member");
    self
      .emit(
        service_id,
        "SERVICE_MEMBER_ADDED",
        json!({ "memberId": member.id, "ciId": ci_id, "role": member.role }),
        ctx,
      )
      .await;
    Ok(member)
  }

  pub async fn remove_member(&self, member_id: Uuid, ctx: &Context) -> Result<()> {
    let member = self
      .store
      .get_service_member(member_id)
      .await
      .store_err()?
      .ok_or_else(|| Error::not_found("service member", member_id))?;

    self.store.remove_service_member(member_id).await.store_err()?;
    info!(service_id = %member.service_id, %member_id, "removed service member");
    self
      .emit(
        member.service_id,
        "SERVICE_MEMBER_REMOVED",
        json!({ "memberId": member_id, "ciId": member.ci_id }),
        ctx,
      )
      .await;
    Ok(())
  }

  pub async fn list_members(&self, service_id: Uuid) -> Result<Vec<ServiceMember>> {
    self.get_service(service_id).await?;
    self.store.list_service_members(service_id).await.store_err()
  }

  /// The union of every member's neighbourhood graph.
  pub async fn service_impact(
    &self,
    service_id: Uuid,
    depth: u32,
    direction: Direction,
  ) -> Result<CiGraph> {
    let members = self.list_members(service_id).await?;

    let mut graph = CiGraph::default();
    let mut node_ids = HashSet::new();
    let mut edge_ids = HashSet::new();
    for member in &members {
      // A member whose CI has since been removed contributes nothing.
      let part = match neighbourhood(&self.store, member.ci_id, depth, direction).await {
        Ok(part) => part,
        Err(Error::NotFound { .. }) => continue,
        Err(e) => return Err(e),
      };
      for node in part.nodes {
        if node_ids.insert(node.id) {
          graph.nodes.push(node);
        }
      }
      for edge in part.edges {
        if edge_ids.insert(edge.id) {
          graph.edges.push(edge);
        }
      }
    }

    debug!(
      %service_id,
      members = members.len(),
      nodes = graph.nodes.len(),
      edges = graph.edges.len(),
      "service impact"
    );
    Ok(graph)
  }

  async fn ensure_code_free(&self, code: &str, owner: Option<Uuid>) -> Result<()> {
    match self.store.get_service_by_code(code).await.store_err()? {
      Some(other) if Some(other.id) != owner => Err(Error::bad_request(format!(
        "service code {code:?} already exists"
      ))),
      _ => Ok(()),
    }
  }

  async fn emit(
    &self,
    entity_id: Uuid,
    event_type: &str,
    payload: serde_json::Value,
    ctx: &Context,
  ) {
    record(
      self.events.as_ref(),
      EntityType::CmdbService,
      entity_id,
      event_type,
      payload,
      ctx,
    )
    .await;
  }
}
