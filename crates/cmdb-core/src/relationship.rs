//! Relationship types, relationships, and the graph read models built from
//! them.

use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};
use uuid::Uuid;

use crate::{Error, Result, ci::Ci};

// ─── Relationship type ───────────────────────────────────────────────────────

/// A kind of edge, e.g. `depends_on` / "is depended on by".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipType {
  pub id:                   Uuid,
  pub code:                 String,
  pub name:                 String,
  pub reverse_name:         Option<String>,
  /// If set, only CIs of this type may be the source of such an edge.
  pub allowed_from_type_id: Option<Uuid>,
  /// If set, only CIs of this type may be the target of such an edge.
  pub allowed_to_type_id:   Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRelationshipType {
  pub code:                 String,
  pub name:                 String,
  #[serde(default)]
  pub reverse_name:         Option<String>,
  #[serde(default)]
  pub allowed_from_type_id: Option<Uuid>,
  #[serde(default)]
  pub allowed_to_type_id:   Option<Uuid>,
}

impl NewRelationshipType {
  pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
    Self {
      code:                 code.into(),
      name:                 name.into(),
      reverse_name:         None,
      allowed_from_type_id: None,
      allowed_to_type_id:   None,
    }
  }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelationshipTypePatch {
  pub code:                 Option<String>,
  pub name:                 Option<String>,
  pub reverse_name:         Option<Option<String>>,
  pub allowed_from_type_id: Option<Option<Uuid>>,
  pub allowed_to_type_id:   Option<Option<Uuid>>,
}

impl RelationshipTypePatch {
  pub fn apply_to(&self, rt: &mut RelationshipType) {
    if let Some(v) = &self.code {
      rt.code = v.clone();
    }
    if let Some(v) = &self.name {
      rt.name = v.clone();
    }
    if let Some(v) = &self.reverse_name {
      rt.reverse_name = v.clone();
    }
    if let Some(v) = self.allowed_from_type_id {
      rt.allowed_from_type_id = v;
    }
    if let Some(v) = self.allowed_to_type_id {
      rt.allowed_to_type_id = v;
    }
  }
}

// ─── Relationship ────────────────────────────────────────────────────────────

/// Lifecycle of a relationship. Retirement is one-way and soft: the row is
/// kept for audit but no longer participates in traversal.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RelStatus {
  Active,
  Retired,
}

impl RelStatus {
  pub fn retire(self) -> Result<Self> {
    match self {
      Self::Active => Ok(Self::Retired),
      Self::Retired => {
        Err(Error::bad_request("relationship is already retired"))
      }
    }
  }
}

/// A directed edge `from_ci_id → to_ci_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
  pub id:          Uuid,
  pub rel_type_id: Uuid,
  pub from_ci_id:  Uuid,
  pub to_ci_id:    Uuid,
  pub since_date:  Option<NaiveDate>,
  pub note:        Option<String>,
  pub status:      RelStatus,
  pub created_at:  DateTime<Utc>,
}

impl Relationship {
  /// The endpoint reached by walking this edge from `current` in
  /// `direction`, if the edge may be walked that way at all.
  pub fn neighbor(&self, current: Uuid, direction: Direction) -> Option<Uuid> {
    match direction {
      Direction::Downstream => {
        (self.from_ci_id == current).then_some(self.to_ci_id)
      }
      Direction::Upstream => {
        (self.to_ci_id == current).then_some(self.from_ci_id)
      }
      Direction::Both => Some(self.other_end(current)),
    }
  }

  /// Whichever endpoint is not `current`.
  pub fn other_end(&self, current: Uuid) -> Uuid {
    if self.from_ci_id == current { self.to_ci_id } else { self.from_ci_id }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRelationship {
  pub rel_type_id: Uuid,
  pub from_ci_id:  Uuid,
  pub to_ci_id:    Uuid,
  #[serde(default)]
  pub since_date:  Option<NaiveDate>,
  #[serde(default)]
  pub note:        Option<String>,
}

impl NewRelationship {
  pub fn new(rel_type_id: Uuid, from_ci_id: Uuid, to_ci_id: Uuid) -> Self {
    Self { rel_type_id, from_ci_id, to_ci_id, since_date: None, note: None }
  }
}

// ─── Traversal ───────────────────────────────────────────────────────────────

/// Which way edges are followed. `Downstream` walks `from → to`.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Direction {
  Upstream,
  Downstream,
  #[default]
  Both,
}

/// Nodes and edges of a (sub)graph.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CiGraph {
  pub nodes: Vec<Ci>,
  pub edges: Vec<Relationship>,
}

/// A single chain of CIs from the seed outwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyPath {
  pub path:  Vec<Ci>,
  /// `ci_code` of each element of `path`, in order.
  pub chain: Vec<String>,
}

/// Everything transitively connected to a CI, regardless of edge direction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImpactAnalysis {
  /// Excludes the seed.
  pub affected:  Vec<Ci>,
  /// Always `affected.len()`.
  pub count:     usize,
  /// BFS levels that reached at least one new CI.
  pub depth:     usize,
  /// `true` if the walk stopped at a limit before the frontier emptied.
  pub truncated: bool,
}

/// Protective bounds on impact analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpactLimits {
  /// Maximum number of affected CIs collected.
  pub max_nodes: usize,
  /// Wall-clock budget for the whole walk.
  pub budget:    Option<Duration>,
}

impl Default for ImpactLimits {
  fn default() -> Self { Self { max_nodes: 10_000, budget: None } }
}
