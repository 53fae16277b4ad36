//! Configuration items and their attribute values.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};
use uuid::Uuid;

use crate::{
  Error, Result,
  relationship::Relationship,
  schema::{AttrDef, CiTypeVersion},
};

// ─── Enumerations ────────────────────────────────────────────────────────────

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
pub enum CiStatus {
  #[default]
  Active,
  Planned,
  Maintenance,
  Retired,
}

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
pub enum Environment {
  Dev,
  Test,
  Staging,
  #[default]
  Prod,
}

// ─── CI ──────────────────────────────────────────────────────────────────────

/// A tracked entity. Business identity is `ci_code`; `id` is internal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ci {
  pub id:          Uuid,
  pub type_id:     Uuid,
  pub name:        String,
  pub ci_code:     String,
  pub status:      CiStatus,
  pub environment: Environment,
  pub asset_id:    Option<String>,
  pub location_id: Option<String>,
  pub owner_team:  Option<String>,
  pub notes:       Option<String>,
  pub created_at:  DateTime<Utc>,
  pub updated_at:  DateTime<Utc>,
}

/// Input to [`crate::store::CiStore::create_ci`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCi {
  pub type_id:     Uuid,
  pub name:        String,
  pub ci_code:     String,
  #[serde(default)]
  pub status:      CiStatus,
  #[serde(default)]
  pub environment: Environment,
  #[serde(default)]
  pub asset_id:    Option<String>,
  #[serde(default)]
  pub location_id: Option<String>,
  #[serde(default)]
  pub owner_team:  Option<String>,
  #[serde(default)]
  pub notes:       Option<String>,
}

impl NewCi {
  pub fn new(
    type_id: Uuid,
    name: impl Into<String>,
    ci_code: impl Into<String>,
  ) -> Self {
    Self {
      type_id,
      name: name.into(),
      ci_code: ci_code.into(),
      status: CiStatus::default(),
      environment: Environment::default(),
      asset_id: None,
      location_id: None,
      owner_team: None,
      notes: None,
    }
  }

  /// Trim identity fields and reject blanks.
  pub fn normalized(self) -> Result<Self> {
    let name = self.name.trim().to_owned();
    let ci_code = self.ci_code.trim().to_owned();
    if name.is_empty() {
      return Err(Error::bad_request("CI name required"));
    }
    if ci_code.is_empty() {
      return Err(Error::bad_request("CI code required"));
    }
    Ok(Self { name, ci_code, ..self })
  }
}

/// Partial update of a [`Ci`]. `None` leaves a field untouched; the inner
/// `Option` of nullable fields clears them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CiPatch {
  pub type_id:     Option<Uuid>,
  pub name:        Option<String>,
  pub ci_code:     Option<String>,
  pub status:      Option<CiStatus>,
  pub environment: Option<Environment>,
  pub asset_id:    Option<Option<String>>,
  pub location_id: Option<Option<String>>,
  pub owner_team:  Option<Option<String>>,
  pub notes:       Option<Option<String>>,
}

impl CiPatch {
  pub fn is_empty(&self) -> bool {
    self.type_id.is_none()
      && self.name.is_none()
      && self.ci_code.is_none()
      && self.status.is_none()
      && self.environment.is_none()
      && self.asset_id.is_none()
      && self.location_id.is_none()
      && self.owner_team.is_none()
      && self.notes.is_none()
  }

  pub fn apply_to(&self, ci: &mut Ci) {
    if let Some(v) = self.type_id {
      ci.type_id = v;
    }
    if let Some(v) = &self.name {
      ci.name = v.trim().to_owned();
    }
    if let Some(v) = &self.ci_code {
      ci.ci_code = v.trim().to_owned();
    }
    if let Some(v) = self.status {
      ci.status = v;
    }
    if let Some(v) = self.environment {
      ci.environment = v;
    }
    if let Some(v) = &self.asset_id {
      ci.asset_id = v.clone();
    }
    if let Some(v) = &self.location_id {
      ci.location_id = v.clone();
    }
    if let Some(v) = &self.owner_team {
      ci.owner_team = v.clone();
    }
    if let Some(v) = &self.notes {
      ci.notes = v.clone();
    }
  }

  /// Reject a patch that would blank out the CI's identity.
  pub fn check(&self) -> Result<()> {
    if self.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
      return Err(Error::bad_request("CI name required"));
    }
    if self.ci_code.as_deref().is_some_and(|c| c.trim().is_empty()) {
      return Err(Error::bad_request("CI code required"));
    }
    Ok(())
  }
}

// ─── Listing ─────────────────────────────────────────────────────────────────

/// Parameters for [`crate::store::CiStore::list_cis`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CiFilter {
  pub type_id:     Option<Uuid>,
  pub status:      Option<CiStatus>,
  pub environment: Option<Environment>,
  /// Case-insensitive substring over `ci_code` and `name`.
  pub q:           Option<String>,
  pub page:        Option<u32>,
  pub limit:       Option<u32>,
}

impl CiFilter {
  pub const DEFAULT_LIMIT: u32 = 20;
  pub const MAX_LIMIT: u32 = 100;

  /// `(page, limit, offset)` with page ≥ 1 and limit clamped to `1..=100`.
  pub fn pagination(&self) -> (u32, u32, u64) {
    let page = self.page.unwrap_or(1).max(1);
    let limit = self
      .limit
      .unwrap_or(Self::DEFAULT_LIMIT)
      .clamp(1, Self::MAX_LIMIT);
    (page, limit, u64::from(page - 1) * u64::from(limit))
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CiPage {
  pub items: Vec<Ci>,
  pub total: u64,
  pub page:  u32,
  pub limit: u32,
}

// ─── Attribute values ────────────────────────────────────────────────────────

/// A stored attribute value.
///
/// `version_id` is the schema version the value was validated against at
/// write time. Values are not revalidated when the schema later changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttrValue {
  pub ci_id:      Uuid,
  /// `None` when the CI's type had no published schema at write time.
  pub version_id: Option<Uuid>,
  pub key:        String,
  pub value:      serde_json::Value,
  pub updated_at: DateTime<Utc>,
}

// ─── Read model ──────────────────────────────────────────────────────────────

/// The composed read model for a CI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CiDetail {
  pub ci:            Ci,
  pub attributes:    Vec<AttrValue>,
  /// The type's currently active schema version, if any.
  pub version:       Option<CiTypeVersion>,
  pub schema:        Vec<AttrDef>,
  /// Populated only when requested.
  pub relationships: Option<Vec<Relationship>>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn pagination_clamps() {
    let f = CiFilter { page: Some(0), limit: Some(1000), ..Default::default() };
    assert_eq!(f.pagination(), (1, 100, 0));
    let f = CiFilter { page: Some(3), limit: None, ..Default::default() };
    assert_eq!(f.pagination(), (3, 20, 40));
  }

  #[test]
  fn patch_rejects_blank_code() {
    let patch = CiPatch { ci_code: Some("  ".into()), ..Default::default() };
    assert!(patch.check().is_err());
    assert!(!patch.is_empty());
    assert!(CiPatch::default().is_empty());
  }
}
