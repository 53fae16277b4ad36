//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings with fixed nanosecond
//! precision, so they sort lexically and decode to the value written. Enumerations are stored as their
//! lowercase string codes; JSON-valued fields as compact JSON. UUIDs are
//! stored as hyphenated lowercase strings.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use cmdb_core::{
  ci::{AttrValue, Ci},
  event::OpsEvent,
  relationship::{Relationship, RelationshipType},
  schema::{AttrDef, CiType, CiTypeVersion},
  service::{Service, ServiceMember},
};
use rusqlite::Row;
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn decode_opt_uuid(s: Option<String>) -> Result<Option<Uuid>> {
  s.as_deref().map(decode_uuid).transpose()
}

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d")
    .map_err(|e| Error::DateParse(e.to_string()))
}

/// The string code of a strum-derived enum.
pub fn encode_code<T: Into<&'static str>>(value: T) -> String {
  value.into().to_owned()
}

pub fn decode_code<T: FromStr>(kind: &'static str, s: &str) -> Result<T> {
  s.parse()
    .map_err(|_| Error::UnknownCode { kind, value: s.to_owned() })
}

pub fn encode_json<T: serde::Serialize>(value: &T) -> Result<String> {
  Ok(serde_json::to_string(value)?)
}

pub fn decode_json<T: serde::de::DeserializeOwned>(s: &str) -> Result<T> {
  Ok(serde_json::from_str(s)?)
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read directly from a `ci_types` row.
pub struct RawCiType {
  pub type_id:     String,
  pub code:        String,
  pub name:        String,
  pub description: Option<String>,
  pub created_at:  String,
}

impl RawCiType {
  pub const COLUMNS: &'static str = "type_id, code, name, description, created_at";

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      type_id:     row.get(0)?,
      code:        row.get(1)?,
      name:        row.get(2)?,
      description: row.get(3)?,
      created_at:  row.get(4)?,
    })
  }

  pub fn into_type(self) -> Result<CiType> {
    Ok(CiType {
      id:          decode_uuid(&self.type_id)?,
      code:        self.code,
      name:        self.name,
      description: self.description,
      created_at:  decode_dt(&self.created_at)?,
    })
  }
}

/// Raw values read from a `ci_type_versions` row.
pub struct RawVersion {
  pub version_id: String,
  pub type_id:    String,
  pub version:    u32,
  pub status:     String,
  pub created_by: Option<String>,
  pub created_at: String,
}

impl RawVersion {
  pub const COLUMNS: &'static str =
    "version_id, type_id, version, status, created_by, created_at";

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      version_id: row.get(0)?,
      type_id:    row.get(1)?,
      version:    row.get(2)?,
      status:     row.get(3)?,
      created_by: row.get(4)?,
      created_at: row.get(5)?,
    })
  }

  pub fn into_version(self) -> Result<CiTypeVersion> {
    Ok(CiTypeVersion {
      id:         decode_uuid(&self.version_id)?,
      type_id:    decode_uuid(&self.type_id)?,
      version:    self.version,
      status:     decode_code("version status", &self.status)?,
      created_by: self.created_by,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

/// Raw values read from an `attr_defs` row.
pub struct RawAttrDef {
  pub def_id:        String,
  pub version_id:    String,
  pub key:           String,
  pub label:         String,
  pub field_type:    String,
  pub required:      bool,
  pub unit:          Option<String>,
  pub enum_values:   Option<String>,
  pub pattern:       Option<String>,
  pub min_value:     Option<f64>,
  pub max_value:     Option<f64>,
  pub step_value:    Option<f64>,
  pub min_len:       Option<u32>,
  pub max_len:       Option<u32>,
  pub precision:     Option<u32>,
  pub scale:         Option<u32>,
  pub default_value: Option<String>,
  pub is_searchable: bool,
  pub is_filterable: bool,
  pub sort_order:    i32,
  pub is_active:     bool,
  pub created_at:    String,
  pub updated_at:    String,
}

impl RawAttrDef {
  pub const COLUMNS: &'static str = "def_id, version_id, key, label, \
    field_type, required, unit, enum_values, pattern, min_value, max_value, \
    step_value, min_len, max_len, precision, scale, default_value, \
    is_searchable, is_filterable, sort_order, is_active, created_at, \
    updated_at";

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      def_id:        row.get(0)?,
      version_id:    row.get(1)?,
      key:           row.get(2)?,
      label:         row.get(3)?,
      field_type:    row.get(4)?,
      required:      row.get(5)?,
      unit:          row.get(6)?,
      enum_values:   row.get(7)?,
      pattern:       row.get(8)?,
      min_value:     row.get(9)?,
      max_value:     row.get(10)?,
      step_value:    row.get(11)?,
      min_len:       row.get(12)?,
      max_len:       row.get(13)?,
      precision:     row.get(14)?,
      scale:         row.get(15)?,
      default_value: row.get(16)?,
      is_searchable: row.get(17)?,
      is_filterable: row.get(18)?,
      sort_order:    row.get(19)?,
      is_active:     row.get(20)?,
      created_at:    row.get(21)?,
      updated_at:    row.get(22)?,
    })
  }

  pub fn into_def(self) -> Result<AttrDef> {
    Ok(AttrDef {
      id:            decode_uuid(&self.def_id)?,
      version_id:    decode_uuid(&self.version_id)?,
      key:           self.key,
      label:         self.label,
      field_type:    decode_code("field type", &self.field_type)?,
      required:      self.required,
      unit:          self.unit,
      enum_values:   self.enum_values.as_deref().map(decode_json).transpose()?,
      pattern:       self.pattern,
      min_value:     self.min_value,
      max_value:     self.max_value,
      step_value:    self.step_value,
      min_len:       self.min_len,
      max_len:       self.max_len,
      precision:     self.precision,
      scale:         self.scale,
      default_value: self
        .default_value
        .as_deref()
        .map(decode_json)
        .transpose()?,
      is_searchable: self.is_searchable,
      is_filterable: self.is_filterable,
      sort_order:    self.sort_order,
      is_active:     self.is_active,
      created_at:    decode_dt(&self.created_at)?,
      updated_at:    decode_dt(&self.updated_at)?,
    })
  }
}

/// Column values for writing an [`AttrDef`], in [`RawAttrDef::COLUMNS`]
/// order.
pub fn attr_def_params(def: &AttrDef) -> Result<Vec<rusqlite::types::Value>> {
  use rusqlite::types::Value as V;

  let text = |s: &Option<String>| s.clone().map_or(V::Null, V::Text);
  let real = |f: Option<f64>| f.map_or(V::Null, V::Real);
  let int = |n: Option<u32>| n.map_or(V::Null, |n| V::Integer(i64::from(n)));

  Ok(vec![
    V::Text(encode_uuid(def.id)),
    V::Text(encode_uuid(def.version_id)),
    V::Text(def.key.clone()),
    V::Text(def.label.clone()),
    V::Text(encode_code(def.field_type)),
    V::Integer(i64::from(def.required)),
    text(&def.unit),
    def.enum_values.as_ref().map(encode_json).transpose()?.map_or(V::Null, V::Text),
    text(&def.pattern),
    real(def.min_value),
    real(def.max_value),
    real(def.step_value),
    int(def.min_len),
    int(def.max_len),
    int(def.precision),
    int(def.scale),
    def
      .default_value
      .as_ref()
      .map(encode_json)
      .transpose()?
      .map_or(V::Null, V::Text),
    V::Integer(i64::from(def.is_searchable)),
    V::Integer(i64::from(def.is_filterable)),
    V::Integer(i64::from(def.sort_order)),
    V::Integer(i64::from(def.is_active)),
    V::Text(encode_dt(def.created_at)),
    V::Text(encode_dt(def.updated_at)),
  ])
}

/// Raw strings read directly from a `cis` row.
pub struct RawCi {
  pub ci_id:       String,
  pub type_id:     String,
  pub name:        String,
  pub ci_code:     String,
  pub status:      String,
  pub environment: String,
  pub asset_id:    Option<String>,
  pub location_id: Option<String>,
  pub owner_team:  Option<String>,
  pub notes:       Option<String>,
  pub created_at:  String,
  pub updated_at:  String,
}

impl RawCi {
  pub const COLUMNS: &'static str = "ci_id, type_id, name, ci_code, status, \
    environment, asset_id, location_id, owner_team, notes, created_at, \
    updated_at";

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      ci_id:       row.get(0)?,
      type_id:     row.get(1)?,
      name:        row.get(2)?,
      ci_code:     row.get(3)?,
      status:      row.get(4)?,
      environment: row.get(5)?,
      asset_id:    row.get(6)?,
      location_id: row.get(7)?,
      owner_team:  row.get(8)?,
      notes:       row.get(9)?,
      created_at:  row.get(10)?,
      updated_at:  row.get(11)?,
    })
  }

  pub fn into_ci(self) -> Result<Ci> {
    Ok(Ci {
      id:          decode_uuid(&self.ci_id)?,
      type_id:     decode_uuid(&self.type_id)?,
      name:        self.name,
      ci_code:     self.ci_code,
      status:      decode_code("CI status", &self.status)?,
      environment: decode_code("environment", &self.environment)?,
      asset_id:    self.asset_id,
      location_id: self.location_id,
      owner_team:  self.owner_team,
      notes:       self.notes,
      created_at:  decode_dt(&self.created_at)?,
      updated_at:  decode_dt(&self.updated_at)?,
    })
  }
}

/// Raw strings read directly from an `attr_values` row.
pub struct RawAttrValue {
  pub ci_id:      String,
  pub version_id: Option<String>,
  pub key:        String,
  pub value_json: String,
  pub updated_at: String,
}

impl RawAttrValue {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      ci_id:      row.get(0)?,
      version_id: row.get(1)?,
      key:        row.get(2)?,
      value_json: row.get(3)?,
      updated_at: row.get(4)?,
    })
  }

  pub fn into_value(self) -> Result<AttrValue> {
    Ok(AttrValue {
      ci_id:      decode_uuid(&self.ci_id)?,
      version_id: decode_opt_uuid(self.version_id)?,
      key:        self.key,
      value:      decode_json(&self.value_json)?,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}

/// Raw strings read directly from a `relationship_types` row.
pub struct RawRelType {
  pub rel_type_id:          String,
  pub code:                 String,
  pub name:                 String,
  pub reverse_name:         Option<String>,
  pub allowed_from_type_id: Option<String>,
  pub allowed_to_type_id:   Option<String>,
}

impl RawRelType {
  pub const COLUMNS: &'static str = "rel_type_id, code, name, reverse_name, \
    allowed_from_type_id, allowed_to_type_id";

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      rel_type_id:          row.get(0)?,
      code:                 row.get(1)?,
      name:                 row.get(2)?,
      reverse_name:         row.get(3)?,
      allowed_from_type_id: row.get(4)?,
      allowed_to_type_id:   row.get(5)?,
    })
  }

  pub fn into_rel_type(self) -> Result<RelationshipType> {
    Ok(RelationshipType {
      id:                   decode_uuid(&self.rel_type_id)?,
      code:                 self.code,
      name:                 self.name,
      reverse_name:         self.reverse_name,
      allowed_from_type_id: decode_opt_uuid(self.allowed_from_type_id)?,
      allowed_to_type_id:   decode_opt_uuid(self.allowed_to_type_id)?,
    })
  }
}

/// Raw strings read directly from a `relationships` row.
pub struct RawRelationship {
  pub rel_id:      String,
  pub rel_type_id: String,
  pub from_ci_id:  String,
  pub to_ci_id:    String,
  pub since_date:  Option<String>,
  pub note:        Option<String>,
  pub status:      String,
  pub created_at:  String,
}

impl RawRelationship {
  pub const COLUMNS: &'static str = "rel_id, rel_type_id, from_ci_id, \
    to_ci_id, since_date, note, status, created_at";

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      rel_id:      row.get(0)?,
      rel_type_id: row.get(1)?,
      from_ci_id:  row.get(2)?,
      to_ci_id:    row.get(3)?,
      since_date:  row.get(4)?,
      note:        row.get(5)?,
      status:      row.get(6)?,
      created_at:  row.get(7)?,
    })
  }

  pub fn into_relationship(self) -> Result<Relationship> {
    Ok(Relationship {
      id:          decode_uuid(&self.rel_id)?,
      rel_type_id: decode_uuid(&self.rel_type_id)?,
      from_ci_id:  decode_uuid(&self.from_ci_id)?,
      to_ci_id:    decode_uuid(&self.to_ci_id)?,
      since_date:  self.since_date.as_deref().map(decode_date).transpose()?,
      note:        self.note,
      status:      decode_code("relationship status", &self.status)?,
      created_at:  decode_dt(&self.created_at)?,
    })
  }
}

/// Raw strings read directly from an `ops_events` row.
pub struct RawEvent {
  pub event_id:       String,
  pub entity_type:    String,
  pub entity_id:      String,
  pub event_type:     String,
  pub payload_json:   String,
  pub actor_user_id:  String,
  pub correlation_id: String,
  pub created_at:     String,
}

impl RawEvent {
  pub const COLUMNS: &'static str = "event_id, entity_type, entity_id, \
    event_type, payload_json, actor_user_id, correlation_id, created_at";

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      event_id:       row.get(0)?,
      entity_type:    row.get(1)?,
      entity_id:      row.get(2)?,
      event_type:     row.get(3)?,
      payload_json:   row.get(4)?,
      actor_user_id:  row.get(5)?,
      correlation_id: row.get(6)?,
      created_at:     row.get(7)?,
    })
  }

  pub fn into_event(self) -> Result<OpsEvent> {
    Ok(OpsEvent {
      id:             decode_uuid(&self.event_id)?,
      entity_type:    decode_code("entity type", &self.entity_type)?,
      entity_id:      decode_uuid(&self.entity_id)?,
      event_type:     self.event_type,
      payload:        decode_json(&self.payload_json)?,
      actor_user_id:  self.actor_user_id,
      correlation_id: self.correlation_id,
      created_at:     decode_dt(&self.created_at)?,
    })
  }
}

/// Raw strings read directly from a `services` row.
pub struct RawService {
  pub service_id:  String,
  pub code:        String,
  pub name:        String,
  pub criticality: Option<String>,
  pub owner:       Option<String>,
  pub sla:         Option<String>,
  pub status:      Option<String>,
  pub created_at:  String,
}

impl RawService {
  pub const COLUMNS: &'static str =
    "service_id, code, name, criticality, owner, sla, status, created_at";

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      service_id:  row.get(0)?,
      code:        row.get(1)?,
      name:        row.get(2)?,
      criticality: row.get(3)?,
      owner:       row.get(4)?,
      sla:         row.get(5)?,
      status:      row.get(6)?,
      created_at:  row.get(7)?,
    })
  }

  pub fn into_service(self) -> Result<Service> {
    Ok(Service {
      id:          decode_uuid(&self.service_id)?,
      code:        self.code,
      name:        self.name,
      criticality: self.criticality,
      owner:       self.owner,
      sla:         self.sla,
      status:      self.status,
      created_at:  decode_dt(&self.created_at)?,
    })
  }
}

/// Raw strings read directly from a `service_members` row.
pub struct RawMember {
  pub member_id:  String,
  pub service_id: String,
  pub ci_id:      String,
  pub role:       Option<String>,
  pub created_at: String,
}

impl RawMember {
  pub const COLUMNS: &'static str =
    "member_id, service_id, ci_id, role, created_at";

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      member_id:  row.get(0)?,
      service_id: row.get(1)?,
      ci_id:      row.get(2)?,
      role:       row.get(3)?,
      created_at: row.get(4)?,
    })
  }

  pub fn into_member(self) -> Result<ServiceMember> {
    Ok(ServiceMember {
      id:         decode_uuid(&self.member_id)?,
      service_id: decode_uuid(&self.service_id)?,
      ci_id:      decode_uuid(&self.ci_id)?,
      role:       self.role,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}
