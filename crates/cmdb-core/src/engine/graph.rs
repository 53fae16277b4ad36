//! Relationship types, relationships, and traversals over the CI graph.
//!
//! All traversals walk active relationships only. Neighbourhood queries load
//! one CI's edges at a time; [`RelationshipGraph::get_full_graph`] loads the
//! whole graph in two queries.

use std::{collections::HashSet, time::Instant};

use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
  Error, Result,
  ci::{Ci, CiStatus},
  error::StoreResultExt as _,
  event::{Context, EntityType, EventSink, NoAudit, record},
  relationship::{
    CiGraph, DependencyPath, Direction, ImpactAnalysis, ImpactLimits,
    NewRelationship, NewRelationshipType, RelStatus, Relationship,
    RelationshipType, RelationshipTypePatch,
  },
  store::{CiStore, RelationshipStore, SchemaStore},
};

/// Hops followed by [`RelationshipGraph::get_dependency_path`].
pub const MAX_PATH_DEPTH: usize = 5;

pub struct RelationshipGraph<S, E = NoAudit> {
  store:  S,
  events: Option<E>,
  limits: ImpactLimits,
}

impl<S> RelationshipGraph<S> {
  pub fn new(store: S) -> Self {
    Self { store, events: None, limits: ImpactLimits::default() }
  }
}

impl<S, E> RelationshipGraph<S, E>
where
  S: CiStore + SchemaStore + RelationshipStore,
  E: EventSink,
{
  pub fn with_events(store: S, events: E) -> Self {
    Self { store, events: Some(events), limits: ImpactLimits::default() }
  }

  /// Replace the bounds applied by [`Self::get_impact_analysis`].
  pub fn with_limits(mut self, limits: ImpactLimits) -> Self {
    self.limits = limits;
    self
  }

  pub fn store(&self) -> &S { &self.store }

  // ── Relationship types ────────────────────────────────────────────────

  pub async fn list_relationship_types(&self) -> Result<Vec<RelationshipType>> {
    self.store.list_relationship_types().await.store_err()
  }

  pub async fn create_relationship_type(
    &self,
    input: NewRelationshipType,
    ctx: &Context,
  ) -> Result<RelationshipType> {
    let input = NewRelationshipType {
      code: required_text(&input.code, "relationship type code")?,
      name: required_text(&input.name, "relationship type name")?,
      ..input
    };
    self.ensure_rel_code_free(&input.code, None).await?;
    self.ensure_types_exist(input.allowed_from_type_id, input.allowed_to_type_id).await?;

    let created = self.store.create_relationship_type(input).await.store_err()?;
    info!(rel_type_id = %created.id, code = %created.code, "created relationship type");
    self
      .emit(created.id, "REL_TYPE_CREATED", json!({ "code": created.code }), ctx)
      .await;
    Ok(created)
  }

  pub async fn update_relationship_type(
    &self,
    id: Uuid,
    patch: RelationshipTypePatch,
    ctx: &Context,
  ) -> Result<RelationshipType> {
    let mut rel_type = self.get_relationship_type(id).await?;
    patch.apply_to(&mut rel_type);
    rel_type.code = required_text(&rel_type.code, "relationship type code")?;
    rel_type.name = required_text(&rel_type.name, "relationship type name")?;
    if patch.code.is_some() {
      self.ensure_rel_code_free(&rel_type.code, Some(id)).await?;
    }
    self
      .ensure_types_exist(rel_type.allowed_from_type_id, rel_type.allowed_to_type_id)
      .await?;

    let updated = self.store.update_relationship_type(rel_type).await.store_err()?;
    info!(rel_type_id = %id, "updated relationship type");
    self
      .emit(id, "REL_TYPE_UPDATED", json!({ "code": updated.code }), ctx)
      .await;
    Ok(updated)
  }

  /// Delete an unused relationship type.
  pub async fn delete_relationship_type(&self, id: Uuid, ctx: &Context) -> Result<()> {
    let rel_type = self.get_relationship_type(id).await?;
    let in_use = self.store.count_relationships_of_type(id).await.store_err()?;
    if in_use > 0 {
      return Err(Error::bad_request(format!(
        "relationship type {:?} is used by {in_use} relationship(s)",
        rel_type.code
      )));
    }

    self.store.delete_relationship_type(id).await.store_err()?;
    info!(rel_type_id = %id, code = %rel_type.code, "deleted relationship type");
    self
      .emit(id, "REL_TYPE_DELETED", json!({ "code": rel_type.code }), ctx)
      .await;
    Ok(())
  }

  async fn get_relationship_type(&self, id: Uuid) -> Result<RelationshipType> {
    self
      .store
      .get_relationship_type(id)
      .await
      .store_err()?
      .ok_or_else(|| Error::not_found("relationship type", id))
  }

  async fn ensure_rel_code_free(&self, code: &str, owner: Option<Uuid>) -> Result<()> {
    let types = self.store.list_relationship_types().await.store_err()?;
    if types.iter().any(|t| t.code == code && Some(t.id) != owner) {
      return Err(Error::bad_request(format!(
        "relationship type code {code:?} already exists"
      )));
    }
    Ok(())
  }

  async fn ensure_types_exist(&self, from: Option<Uuid>, to: Option<Uuid>) -> Result<()> {
    for type_id in [from, to].into_iter().flatten() {
      if self.store.get_type(type_id).await.store_err()?.is_none() {
        return Err(Error::not_found("CI type", type_id));
      }
    }
    Ok(())
  }

  // ── Relationships ─────────────────────────────────────────────────────

  /// Link two CIs, enforcing the relationship type's endpoint constraints.
  pub async fn create_relationship(
    &self,
    input: NewRelationship,
    ctx: &Context,
  ) -> Result<Relationship> {
    if input.from_ci_id == input.to_ci_id {
      return Err(Error::bad_request(
        "self-loop relationships are not allowed",
      ));
    }
    let rel_type = self.get_relationship_type(input.rel_type_id).await?;
    let from = self
      .store
      .get_ci(input.from_ci_id)
      .await
      .store_err()?
      .ok_or_else(|| Error::not_found("Source CI", input.from_ci_id))?;
    let to = self
      .store
      .get_ci(input.to_ci_id)
      .await
      .store_err()?
      .ok_or_else(|| Error::not_found("Target CI", input.to_ci_id))?;
    if rel_type.allowed_from_type_id.is_some_and(|t| t != from.type_id) {
      return Err(Error::bad_request("Source CI type not allowed"));
    }
    if rel_type.allowed_to_type_id.is_some_and(|t| t != to.type_id) {
      return Err(Error::bad_request("Target CI type not allowed"));
    }

    let created = self.store.create_relationship(input).await.store_err()?;
    info!(
      rel_id = %created.id,
      rel_type = %rel_type.code,
      from = %from.ci_code,
      to = %to.ci_code,
      "created relationship"
    );
    self
      .emit(
        created.id,
        "REL_CREATED",
        json!({ "relTypeId": created.rel_type_id }),
        ctx,
      )
      .await;
    Ok(created)
  }

  pub async fn retire_relationship(&self, id: Uuid, ctx: &Context) -> Result<Relationship> {
    let rel = self
      .store
      .get_relationship(id)
      .await
      .store_err()?
      .ok_or_else(|| Error::not_found("relationship", id))?;
    rel.status.retire()?;

    let retired = self.store.retire_relationship(id).await.store_err()?;
    info!(rel_id = %id, "retired relationship");
    self.emit(id, "REL_RETIRED", json!({}), ctx).await;
    Ok(retired)
  }

  /// Active relationships touching a CI.
  pub async fn list_ci_relationships(&self, ci_id: Uuid) -> Result<Vec<Relationship>> {
    load_ci(&self.store, ci_id).await?;
    self.store.list_relationships_by_ci(ci_id).await.store_err()
  }

  pub async fn list_relationships(&self, status: Option<RelStatus>) -> Result<Vec<Relationship>> {
    self.store.list_relationships(status).await.store_err()
  }

  // ── Traversals ────────────────────────────────────────────────────────

  /// The neighbourhood of `ci_id` up to `depth` hops in `direction`.
  pub async fn get_graph(
    &self,
    ci_id: Uuid,
    depth: u32,
    direction: Direction,
  ) -> Result<CiGraph> {
    neighbourhood(&self.store, ci_id, depth, direction).await
  }

  /// Every active CI that takes part in an active relationship, and those
  /// relationships.
  pub async fn get_full_graph(&self) -> Result<CiGraph> {
    let cis = self.store.list_cis_with_status(CiStatus::Active).await.store_err()?;
    let active: HashSet<Uuid> = cis.iter().map(|c| c.id).collect();
    let rels = self
      .store
      .list_relationships(Some(RelStatus::Active))
      .await
      .store_err()?;

    let mut node_ids = HashSet::new();
    for rel in &rels {
      for end in [rel.from_ci_id, rel.to_ci_id] {
        if active.contains(&end) {
          node_ids.insert(end);
        }
      }
    }
    let edges: Vec<Relationship> = rels
      .into_iter()
      .filter(|r| node_ids.contains(&r.from_ci_id) && node_ids.contains(&r.to_ci_id))
      .collect();
    let nodes: Vec<Ci> = cis.into_iter().filter(|c| node_ids.contains(&c.id)).collect();

    debug!(nodes = nodes.len(), edges = edges.len(), "projected full graph");
    Ok(CiGraph { nodes, edges })
  }

  /// A single chain from `ci_id` following the first unvisited neighbour at
  /// each step, for at most [`MAX_PATH_DEPTH`] hops.
  pub async fn get_dependency_path(
    &self,
    ci_id: Uuid,
    direction: Direction,
  ) -> Result<DependencyPath> {
    if direction == Direction::Both {
      return Err(Error::bad_request(
        "dependency path direction must be upstream or downstream",
      ));
    }
    let seed = load_ci(&self.store, ci_id).await?;

    let mut visited = HashSet::from([seed.id]);
    let mut current = seed.id;
    let mut path = vec![seed];
    for _ in 0..MAX_PATH_DEPTH {
      let rels = self.store.list_relationships_by_ci(current).await.store_err()?;
      let next = rels
        .iter()
        .filter_map(|r| r.neighbor(current, direction))
        .find(|n| !visited.contains(n));
      let Some(next) = next else {
        break;
      };
      visited.insert(next);
      let Some(ci) = self.store.get_ci(next).await.store_err()? else {
        break;
      };
      path.push(ci);
      current = next;
    }

    let chain = path.iter().map(|c| c.ci_code.clone()).collect();
    Ok(DependencyPath { path, chain })
  }

  /// Every CI transitively connected to `ci_id` in either direction.
  ///
  /// The walk stops early, with `truncated` set, once the node ceiling or the
  /// time budget in [`ImpactLimits`] is reached.
  pub async fn get_impact_analysis(&self, ci_id: Uuid) -> Result<ImpactAnalysis> {
    let seed = load_ci(&self.store, ci_id).await?;
    let started = Instant::now();
    let ImpactLimits { max_nodes, budget } = self.limits;

    let mut visited = HashSet::from([seed.id]);
    let mut frontier = vec![seed.id];
    let mut affected = Vec::new();
    let mut depth = 0;
    let mut truncated = false;

    'walk: while !frontier.is_empty() {
      let mut next = Vec::new();
      for current in std::mem::take(&mut frontier) {
        if budget.is_some_and(|b| started.elapsed() >= b) {
          truncated = true;
        }
        if !truncated {
          let rels = self.store.list_relationships_by_ci(current).await.store_err()?;
          for rel in &rels {
            let neighbor = rel.other_end(current);
            if visited.contains(&neighbor) {
              continue;
            }
            if affected.len() >= max_nodes {
              truncated = true;
              break;
            }
            visited.insert(neighbor);
            if let Some(ci) = self.store.get_ci(neighbor).await.store_err()? {
              affected.push(ci);
              next.push(neighbor);
            }
          }
        }
        if truncated {
          if !next.is_empty() {
            depth += 1;
          }
          break 'walk;
        }
      }
      if !next.is_empty() {
        depth += 1;
      }
      frontier = next;
    }

    if truncated {
      warn!(
        %ci_id,
        affected = affected.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "impact analysis truncated"
      );
    } else {
      debug!(%ci_id, affected = affected.len(), depth, "impact analysis");
    }
    Ok(ImpactAnalysis { count: affected.len(), affected, depth, truncated })
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
      EntityType::CmdbRel,
      entity_id,
      event_type,
      payload,
      ctx,
    )
    .await;
  }
}

// ─── Shared traversal ────────────────────────────────────────────────────────

pub(crate) async fn load_ci<S: CiStore>(store: &S, id: Uuid) -> Result<Ci> {
  store
    .get_ci(id)
    .await
    .store_err()?
    .ok_or_else(|| Error::not_found("CI", id))
}

/// Level-by-level BFS from `ci_id`.
///
/// Every edge walkable from a frontier node in `direction` is kept, including
/// edges back to already visited nodes; each CI is expanded at most once.
/// Edges to CIs that no longer exist are kept but add no node.
pub(crate) async fn neighbourhood<S>(
  store: &S,
  ci_id: Uuid,
  depth: u32,
  direction: Direction,
) -> Result<CiGraph>
where
  S: CiStore + RelationshipStore,
{
  let seed = load_ci(store, ci_id).await?;
  let mut visited = HashSet::from([seed.id]);
  let mut nodes = vec![seed];
  let mut edges: Vec<Relationship> = Vec::new();
  let mut seen_edges: HashSet<Uuid> = HashSet::new();
  let mut frontier = vec![ci_id];

  for _ in 0..depth {
    let mut next = Vec::new();
    for current in &frontier {
      let rels = store.list_relationships_by_ci(*current).await.store_err()?;
      for rel in rels {
        let Some(neighbor) = rel.neighbor(*current, direction) else {
          continue;
        };
        if seen_edges.insert(rel.id) {
          edges.push(rel);
        }
        if visited.insert(neighbor) {
          if let Some(ci) = store.get_ci(neighbor).await.store_err()? {
            nodes.push(ci);
          }
          next.push(neighbor);
        }
      }
    }
    frontier = next;
    if frontier.is_empty() {
      break;
    }
  }

  debug!(%ci_id, depth, %direction, nodes = nodes.len(), edges = edges.len(), "graph walk");
  Ok(CiGraph { nodes, edges })
}

fn required_text(value: &str, what: &str) -> Result<String> {
  let trimmed = value.trim();
  if trimmed.is_empty() {
    return Err(Error::bad_request(format!("{what} required")));
  }
  Ok(trimmed.to_owned())
}
