//! CI types, their versioned schemas and attribute definitions.
//!
//! A [`CiType`] owns a sequence of [`CiTypeVersion`]s. Each version carries a
//! set of [`AttrDef`]s and moves through draft → active → retired; at most one
//! version per type is active at any time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};
use uuid::Uuid;

use crate::{Error, Result, field::FieldType};

// ─── CI type ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CiType {
  pub id:          Uuid,
  pub code:        String,
  pub name:        String,
  pub description: Option<String>,
  pub created_at:  DateTime<Utc>,
}

/// Input to [`crate::store::SchemaStore::create_type`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCiType {
  pub code:        String,
  pub name:        String,
  #[serde(default)]
  pub description: Option<String>,
}

impl NewCiType {
  pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
    Self { code: code.into(), name: name.into(), description: None }
  }

  /// Trim identity fields and reject blanks.
  pub fn normalized(self) -> Result<Self> {
    let code = self.code.trim().to_owned();
    let name = self.name.trim().to_owned();
    if code.is_empty() {
      return Err(Error::bad_request("CI type code required"));
    }
    if name.is_empty() {
      return Err(Error::bad_request("CI type name required"));
    }
    Ok(Self { code, name, description: self.description })
  }
}

// ─── Version status ──────────────────────────────────────────────────────────

/// Lifecycle state of a schema version.
///
/// Legal transitions: draft → active, active → retired, retired → active
/// (re-publishing an older schema). Nothing ever returns to draft.
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
pub enum VersionStatus {
  Draft,
  Active,
  Retired,
}

impl VersionStatus {
  pub fn is_active(self) -> bool { matches!(self, Self::Active) }

  /// The status after publishing a version currently in `self`.
  pub fn publish(self) -> Result<Self> {
    match self {
      Self::Draft | Self::Retired => Ok(Self::Active),
      Self::Active => Err(Error::bad_request("version is already active")),
    }
  }

  /// The status after a sibling version has been published.
  pub fn retire(self) -> Result<Self> {
    match self {
      Self::Active => Ok(Self::Retired),
      other => Err(Error::bad_request(format!(
        "cannot retire a {other} version"
      ))),
    }
  }
}

// ─── Version ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CiTypeVersion {
  pub id:         Uuid,
  pub type_id:    Uuid,
  /// 1-based, monotonic per type.
  pub version:    u32,
  pub status:     VersionStatus,
  pub created_by: Option<String>,
  pub created_at: DateTime<Utc>,
}

// ─── Attribute definitions ───────────────────────────────────────────────────

/// One typed, constrained field of a schema version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttrDef {
  pub id:            Uuid,
  pub version_id:    Uuid,
  pub key:           String,
  pub label:         String,
  pub field_type:    FieldType,
  pub required:      bool,
  pub unit:          Option<String>,
  pub enum_values:   Option<Vec<String>>,
  pub pattern:       Option<String>,
  pub min_value:     Option<f64>,
  pub max_value:     Option<f64>,
  pub step_value:    Option<f64>,
  pub min_len:       Option<u32>,
  pub max_len:       Option<u32>,
  pub precision:     Option<u32>,
  pub scale:         Option<u32>,
  pub default_value: Option<serde_json::Value>,
  pub is_searchable: bool,
  pub is_filterable: bool,
  pub sort_order:    i32,
  /// Definitions are never hard-deleted; `false` hides them from listings.
  pub is_active:     bool,
  pub created_at:    DateTime<Utc>,
  pub updated_at:    DateTime<Utc>,
}

impl AttrDef {
  /// The authoring input that would recreate this definition, e.g. when a
  /// new draft copies the active schema.
  pub fn to_input(&self) -> NewAttrDef {
    NewAttrDef {
      key:           self.key.clone(),
      label:         self.label.clone(),
      field_type:    self.field_type,
      required:      self.required,
      unit:          self.unit.clone(),
      enum_values:   self.enum_values.clone(),
      pattern:       self.pattern.clone(),
      min_value:     self.min_value,
      max_value:     self.max_value,
      step_value:    self.step_value,
      min_len:       self.min_len,
      max_len:       self.max_len,
      precision:     self.precision,
      scale:         self.scale,
      default_value: self.default_value.clone(),
      is_searchable: self.is_searchable,
      is_filterable: self.is_filterable,
      sort_order:    self.sort_order,
      is_active:     self.is_active,
    }
  }
}

/// Input to [`crate::store::SchemaStore::create_attr_def`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAttrDef {
  pub key:           String,
  pub label:         String,
  pub field_type:    FieldType,
  #[serde(default)]
  pub required:      bool,
  #[serde(default)]
  pub unit:          Option<String>,
  #[serde(default)]
  pub enum_values:   Option<Vec<String>>,
  #[serde(default)]
  pub pattern:       Option<String>,
  #[serde(default)]
  pub min_value:     Option<f64>,
  #[serde(default)]
  pub max_value:     Option<f64>,
  #[serde(default)]
  pub step_value:    Option<f64>,
  #[serde(default)]
  pub min_len:       Option<u32>,
  #[serde(default)]
  pub max_len:       Option<u32>,
  #[serde(default)]
  pub precision:     Option<u32>,
  #[serde(default)]
  pub scale:         Option<u32>,
  #[serde(default)]
  pub default_value: Option<serde_json::Value>,
  #[serde(default)]
  pub is_searchable: bool,
  #[serde(default)]
  pub is_filterable: bool,
  #[serde(default)]
  pub sort_order:    i32,
  #[serde(default = "default_true")]
  pub is_active:     bool,
}

fn default_true() -> bool { true }

impl NewAttrDef {
  /// Convenience constructor with every constraint unset.
  pub fn new(
    key: impl Into<String>,
    label: impl Into<String>,
    field_type: FieldType,
  ) -> Self {
    Self {
      key: key.into(),
      label: label.into(),
      field_type,
      required: false,
      unit: None,
      enum_values: None,
      pattern: None,
      min_value: None,
      max_value: None,
      step_value: None,
      min_len: None,
      max_len: None,
      precision: None,
      scale: None,
      default_value: None,
      is_searchable: false,
      is_filterable: false,
      sort_order: 0,
      is_active: true,
    }
  }

  pub fn required(mut self) -> Self {
    self.required = true;
    self
  }

  /// Materialise a stored definition with a fresh id and timestamps.
  pub fn into_def(self, version_id: Uuid) -> AttrDef {
    let now = Utc::now();
    AttrDef {
      id: Uuid::new_v4(),
      version_id,
      key: self.key.trim().to_owned(),
      label: self.label.trim().to_owned(),
      field_type: self.field_type,
      required: self.required,
      unit: self.unit,
      enum_values: self.enum_values,
      pattern: self.pattern,
      min_value: self.min_value,
      max_value: self.max_value,
      step_value: self.step_value,
      min_len: self.min_len,
      max_len: self.max_len,
      precision: self.precision,
      scale: self.scale,
      default_value: self.default_value,
      is_searchable: self.is_searchable,
      is_filterable: self.is_filterable,
      sort_order: self.sort_order,
      is_active: self.is_active,
      created_at: now,
      updated_at: now,
    }
  }
}

/// Partial update of an [`AttrDef`].
///
/// Optional-valued constraints use a double `Option`: `None` leaves the
/// field untouched, `Some(None)` clears it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AttrDefPatch {
  pub key:           Option<String>,
  pub label:         Option<String>,
  pub field_type:    Option<FieldType>,
  pub required:      Option<bool>,
  pub unit:          Option<Option<String>>,
  pub enum_values:   Option<Option<Vec<String>>>,
  pub pattern:       Option<Option<String>>,
  pub min_value:     Option<Option<f64>>,
  pub max_value:     Option<Option<f64>>,
  pub step_value:    Option<Option<f64>>,
  pub min_len:       Option<Option<u32>>,
  pub max_len:       Option<Option<u32>>,
  pub precision:     Option<Option<u32>>,
  pub scale:         Option<Option<u32>>,
  pub default_value: Option<Option<serde_json::Value>>,
  pub is_searchable: Option<bool>,
  pub is_filterable: Option<bool>,
  pub sort_order:    Option<i32>,
  pub is_active:     Option<bool>,
}

impl AttrDefPatch {
  /// Apply the patch to an authoring input in place.
  pub fn apply_to(&self, def: &mut NewAttrDef) {
    if let Some(v) = &self.key {
      def.key = v.clone();
    }
    if let Some(v) = &self.label {
      def.label = v.clone();
    }
    if let Some(v) = self.field_type {
      def.field_type = v;
    }
    if let Some(v) = self.required {
      def.required = v;
    }
    if let Some(v) = &self.unit {
      def.unit = v.clone();
    }
    if let Some(v) = &self.enum_values {
      def.enum_values = v.clone();
    }
    if let Some(v) = &self.pattern {
      def.pattern = v.clone();
    }
    if let Some(v) = self.min_value {
      def.min_value = v;
    }
    if let Some(v) = self.max_value {
      def.max_value = v;
    }
    if let Some(v) = self.step_value {
      def.step_value = v;
    }
    if let Some(v) = self.min_len {
      def.min_len = v;
    }
    if let Some(v) = self.max_len {
      def.max_len = v;
    }
    if let Some(v) = self.precision {
      def.precision = v;
    }
    if let Some(v) = self.scale {
      def.scale = v;
    }
    if let Some(v) = &self.default_value {
      def.default_value = v.clone();
    }
    if let Some(v) = self.is_searchable {
      def.is_searchable = v;
    }
    if let Some(v) = self.is_filterable {
      def.is_filterable = v;
    }
    if let Some(v) = self.sort_order {
      def.sort_order = v;
    }
    if let Some(v) = self.is_active {
      def.is_active = v;
    }
  }
}

// ─── Publish result ──────────────────────────────────────────────────────────

/// A CI that lacks values for keys the newly published version requires.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompatibilityWarning {
  pub ci_id:        Uuid,
  pub ci_name:      String,
  pub missing_keys: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishOutcome {
  pub version:  CiTypeVersion,
  pub warnings: Vec<CompatibilityWarning>,
}

/// A freshly created draft and the definitions copied into it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftVersion {
  pub version: CiTypeVersion,
  pub defs:    Vec<AttrDef>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn version_transitions() {
    assert_eq!(VersionStatus::Draft.publish().unwrap(), VersionStatus::Active);
    assert_eq!(VersionStatus::Retired.publish().unwrap(), VersionStatus::Active);
    assert!(VersionStatus::Active.publish().is_err());
    assert_eq!(VersionStatus::Active.retire().unwrap(), VersionStatus::Retired);
    assert!(VersionStatus::Draft.retire().is_err());
  }

  #[test]
  fn patch_clears_and_sets() {
    let mut def = NewAttrDef::new("cores", "Cores", FieldType::Number);
    def.min_value = Some(1.0);
    let patch = AttrDefPatch {
      min_value: Some(None),
      max_value: Some(Some(128.0)),
      required: Some(true),
      ..Default::default()
    };
    patch.apply_to(&mut def);
    assert_eq!(def.min_value, None);
    assert_eq!(def.max_value, Some(128.0));
    assert!(def.required);
  }

  #[test]
  fn new_type_rejects_blank_code() {
    assert!(NewCiType::new("  ", "Server").normalized().is_err());
    let ok = NewCiType::new(" server ", "Server").normalized().unwrap();
    assert_eq!(ok.code, "server");
  }
}
