//! Synchronous schema queries shared by the async store methods and the
//! transaction handle passed to `with_transaction`.

use chrono::Utc;
use cmdb_core::{
  schema::{AttrDef, CiTypeVersion, VersionStatus},
  store::SchemaTx,
};
use rusqlite::{Connection, OptionalExtension as _, params, params_from_iter};
use uuid::Uuid;

use crate::{
  Error, Result,
  encode::{
    RawAttrDef, RawVersion, attr_def_params, encode_code, encode_dt,
    encode_uuid,
  },
};

// ─── Queries ─────────────────────────────────────────────────────────────────

pub(crate) fn get_version(
  conn: &Connection,
  id: Uuid,
) -> Result<Option<CiTypeVersion>> {
  let sql = format!(
    "SELECT {} FROM ci_type_versions WHERE version_id = ?1",
    RawVersion::COLUMNS
  );
  conn
    .query_row(&sql, params![encode_uuid(id)], RawVersion::from_row)
    .optional()?
    .map(RawVersion::into_version)
    .transpose()
}

pub(crate) fn get_active_version(
  conn: &Connection,
  type_id: Uuid,
) -> Result<Option<CiTypeVersion>> {
  let sql = format!(
    "SELECT {} FROM ci_type_versions WHERE type_id = ?1 AND status = 'active'",
    RawVersion::COLUMNS
  );
  conn
    .query_row(&sql, params![encode_uuid(type_id)], RawVersion::from_row)
    .optional()?
    .map(RawVersion::into_version)
    .transpose()
}

pub(crate) fn list_attr_defs(
  conn: &Connection,
  version_id: Uuid,
) -> Result<Vec<AttrDef>> {
  let sql = format!(
    "SELECT {} FROM attr_defs
     WHERE version_id = ?1 AND is_active = 1
     ORDER BY sort_order ASC, key ASC",
    RawAttrDef::COLUMNS
  );
  let mut stmt = conn.prepare(&sql)?;
  let raws = stmt
    .query_map(params![encode_uuid(version_id)], RawAttrDef::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawAttrDef::into_def).collect()
}

pub(crate) fn insert_attr_defs(conn: &Connection, defs: &[AttrDef]) -> Result<()> {
  let sql = format!(
    "INSERT INTO attr_defs ({}) VALUES ({})",
    RawAttrDef::COLUMNS,
    placeholders(23)
  );
  let mut stmt = conn.prepare(&sql)?;
  for def in defs {
    stmt.execute(params_from_iter(attr_def_params(def)?))?;
  }
  Ok(())
}

/// `?1, ?2, …, ?n`
pub(crate) fn placeholders(n: usize) -> String {
  (1..=n).map(|i| format!("?{i}")).collect::<Vec<_>>().join(", ")
}

// ─── Transaction handle ──────────────────────────────────────────────────────

/// The connection of an open transaction, viewed through [`SchemaTx`].
pub(crate) struct SqliteTx<'a> {
  pub conn: &'a Connection,
}

impl SchemaTx for SqliteTx<'_> {
  type Error = Error;

  fn get_version(&self, id: Uuid) -> Result<Option<CiTypeVersion>> {
    get_version(self.conn, id)
  }

  fn latest_version_number(&self, type_id: Uuid) -> Result<u32> {
    let latest: Option<u32> = self.conn.query_row(
      "SELECT MAX(version) FROM ci_type_versions WHERE type_id = ?1",
      params![encode_uuid(type_id)],
      |row| row.get(0),
    )?;
    Ok(latest.unwrap_or(0))
  }

  fn create_version(
    &self,
    type_id: Uuid,
    version: u32,
    status: VersionStatus,
    created_by: Option<String>,
  ) -> Result<CiTypeVersion> {
    let created = CiTypeVersion {
      id: Uuid::new_v4(),
      type_id,
      version,
      status,
      created_by,
      created_at: Utc::now(),
    };
    self.conn.execute(
      "INSERT INTO ci_type_versions
         (version_id, type_id, version, status, created_by, created_at)
       VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
      params![
        encode_uuid(created.id),
        encode_uuid(type_id),
        version,
        encode_code(status),
        created.created_by,
        encode_dt(created.created_at),
      ],
    )?;
    Ok(created)
  }

  fn get_active_version(&self, type_id: Uuid) -> Result<Option<CiTypeVersion>> {
    get_active_version(self.conn, type_id)
  }

  fn update_version_status(&self, id: Uuid, status: VersionStatus) -> Result<()> {
    let n = self.conn.execute(
      "UPDATE ci_type_versions SET status = ?1 WHERE version_id = ?2",
      params![encode_code(status), encode_uuid(id)],
    )?;
    if n == 0 {
      return Err(Error::RowNotFound("schema version", id));
    }
    Ok(())
  }

  fn retire_other_active(&self, type_id: Uuid, keep: Uuid) -> Result<usize> {
    Ok(self.conn.execute(
      "UPDATE ci_type_versions SET status = 'retired'
       WHERE type_id = ?1 AND status = 'active' AND version_id != ?2",
      params![encode_uuid(type_id), encode_uuid(keep)],
    )?)
  }

  fn list_attr_defs(&self, version_id: Uuid) -> Result<Vec<AttrDef>> {
    list_attr_defs(self.conn, version_id)
  }

  fn bulk_insert_attr_defs(&self, defs: &[AttrDef]) -> Result<()> {
    insert_attr_defs(self.conn, defs)
  }
}
