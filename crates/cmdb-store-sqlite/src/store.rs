//! [`SqliteStore`]: the SQLite implementation of the `cmdb_core::store`
//! traits.

use std::path::Path;

use chrono::Utc;
use cmdb_core::{
  ci::{AttrValue, Ci, CiFilter, CiPage, CiStatus, NewCi},
  event::{EventSink, NewEvent, OpsEvent},
  relationship::{
    NewRelationship, NewRelationshipType, RelStatus, Relationship,
    RelationshipType,
  },
  schema::{AttrDef, CiType, CiTypeVersion, NewCiType},
  service::{NewService, Service, ServiceMember},
  store::{
    AttrValueStore, Backend, CiStore, RelationshipStore, SchemaStore,
    SchemaTx, ServiceStore,
  },
};
use rusqlite::{
  Connection, OptionalExtension as _, TransactionBehavior, params,
  params_from_iter, types::Value as SqlValue,
};
use serde_json::{Map, Value};
use tracing::debug;
use uuid::Uuid;

use crate::{
  Error, Result,
  encode::{
    RawAttrDef, RawAttrValue, RawCi, RawCiType, RawEvent, RawMember,
    RawRelType, RawRelationship, RawService, RawVersion, attr_def_params,
    encode_code, encode_date, encode_dt, encode_json, encode_uuid,
  },
  schema::SCHEMA,
  tx::{self, SqliteTx, placeholders},
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A CMDB store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref().to_owned();
    let conn = tokio_rusqlite::Connection::open(&path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    debug!(path = %path.display(), "opened sqlite store");
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Run `f` on the connection thread.
  async fn run<T, F>(&self, f: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
  {
    self.conn.call(move |conn| Ok(f(conn))).await?
  }

  /// The audit trail, oldest first, optionally for a single entity.
  pub async fn list_events(&self, entity_id: Option<Uuid>) -> Result<Vec<OpsEvent>> {
    let entity = entity_id.map(encode_uuid);
    self
      .run(move |conn| {
        let sql = format!(
          "SELECT {} FROM ops_events
           WHERE (?1 IS NULL OR entity_id = ?1)
           ORDER BY created_at ASC, rowid ASC",
          RawEvent::COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let raws = stmt
          .query_map(params![entity], RawEvent::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        raws.into_iter().map(RawEvent::into_event).collect()
      })
      .await
  }
}

fn get_ci_where(conn: &Connection, column: &str, value: String) -> Result<Option<Ci>> {
  let sql = format!("SELECT {} FROM cis WHERE {column} = ?1", RawCi::COLUMNS);
  conn
    .query_row(&sql, params![value], RawCi::from_row)
    .optional()?
    .map(RawCi::into_ci)
    .transpose()
}

fn get_type_where(conn: &Connection, column: &str, value: String) -> Result<Option<CiType>> {
  let sql = format!("SELECT {} FROM ci_types WHERE {column} = ?1", RawCiType::COLUMNS);
  conn
    .query_row(&sql, params![value], RawCiType::from_row)
    .optional()?
    .map(RawCiType::into_type)
    .transpose()
}

fn get_attr_def(conn: &Connection, id: Uuid) -> Result<Option<AttrDef>> {
  let sql = format!("SELECT {} FROM attr_defs WHERE def_id = ?1", RawAttrDef::COLUMNS);
  conn
    .query_row(&sql, params![encode_uuid(id)], RawAttrDef::from_row)
    .optional()?
    .map(RawAttrDef::into_def)
    .transpose()
}

fn get_rel_type(conn: &Connection, id: Uuid) -> Result<Option<RelationshipType>> {
  let sql = format!(
    "SELECT {} FROM relationship_types WHERE rel_type_id = ?1",
    RawRelType::COLUMNS
  );
  conn
    .query_row(&sql, params![encode_uuid(id)], RawRelType::from_row)
    .optional()?
    .map(RawRelType::into_rel_type)
    .transpose()
}

fn get_relationship(conn: &Connection, id: Uuid) -> Result<Option<Relationship>> {
  let sql = format!(
    "SELECT {} FROM relationships WHERE rel_id = ?1",
    RawRelationship::COLUMNS
  );
  conn
    .query_row(&sql, params![encode_uuid(id)], RawRelationship::from_row)
    .optional()?
    .map(RawRelationship::into_relationship)
    .transpose()
}

fn get_service_where(
  conn: &Connection,
  column: &str,
  value: String,
) -> Result<Option<Service>> {
  let sql = format!("SELECT {} FROM services WHERE {column} = ?1", RawService::COLUMNS);
  conn
    .query_row(&sql, params![value], RawService::from_row)
    .optional()?
    .map(RawService::into_service)
    .transpose()
}

/// Escape `%`, `_` and `\` for a `LIKE … ESCAPE '\'` pattern.
fn like_escape(s: &str) -> String {
  let mut out = String::with_capacity(s.len());
  for c in s.chars() {
    if matches!(c, '%' | '_' | '\\') {
      out.push('\\');
    }
    out.push(c);
  }
  out
}

impl Backend for SqliteStore {
  type Error = Error;
}

// ─── CiStore impl ────────────────────────────────────────────────────────────

impl CiStore for SqliteStore {
  async fn create_ci(&self, input: NewCi) -> Result<Ci> {
    let now = Utc::now();
    let ci = Ci {
      id:          Uuid::new_v4(),
      type_id:     input.type_id,
      name:        input.name,
      ci_code:     input.ci_code,
      status:      input.status,
      environment: input.environment,
      asset_id:    input.asset_id,
      location_id: input.location_id,
      owner_team:  input.owner_team,
      notes:       input.notes,
      created_at:  now,
      updated_at:  now,
    };

    let row = ci.clone();
    self
      .run(move |conn| {
        conn.execute(
          &format!("INSERT INTO cis ({}) VALUES ({})", RawCi::COLUMNS, placeholders(12)),
          params![
            encode_uuid(row.id),
            encode_uuid(row.type_id),
            row.name,
            row.ci_code,
            encode_code(row.status),
            encode_code(row.environment),
            row.asset_id,
            row.location_id,
            row.owner_team,
            row.notes,
            encode_dt(row.created_at),
            encode_dt(row.updated_at),
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(ci)
  }

  async fn update_ci(&self, ci: Ci) -> Result<Ci> {
    let ci = Ci { updated_at: Utc::now(), ..ci };

    let row = ci.clone();
    self
      .run(move |conn| {
        let n = conn.execute(
          "UPDATE cis SET
             type_id = ?2, name = ?3, ci_code = ?4, status = ?5,
             environment = ?6, asset_id = ?7, location_id = ?8,
             owner_team = ?9, notes = ?10, updated_at = ?11
           WHERE ci_id = ?1",
          params![
            encode_uuid(row.id),
            encode_uuid(row.type_id),
            row.name,
            row.ci_code,
            encode_code(row.status),
            encode_code(row.environment),
            row.asset_id,
            row.location_id,
            row.owner_team,
            row.notes,
            encode_dt(row.updated_at),
          ],
        )?;
        if n == 0 {
          return Err(Error::RowNotFound("CI", row.id));
        }
        Ok(())
      })
      .await?;

    Ok(ci)
  }

  async fn get_ci(&self, id: Uuid) -> Result<Option<Ci>> {
    self
      .run(move |conn| get_ci_where(conn, "ci_id", encode_uuid(id)))
      .await
  }

  async fn get_ci_by_code(&self, ci_code: &str) -> Result<Option<Ci>> {
    let ci_code = ci_code.to_owned();
    self.run(move |conn| get_ci_where(conn, "ci_code", ci_code)).await
  }

  async fn get_ci_by_asset(&self, asset_id: &str) -> Result<Option<Ci>> {
    let asset_id = asset_id.to_owned();
    self.run(move |conn| get_ci_where(conn, "asset_id", asset_id)).await
  }

  async fn list_cis(&self, filter: &CiFilter) -> Result<CiPage> {
    let (page, limit, offset) = filter.pagination();

    let mut conds: Vec<String> = Vec::new();
    let mut args: Vec<SqlValue> = Vec::new();
    if let Some(type_id) = filter.type_id {
      args.push(SqlValue::Text(encode_uuid(type_id)));
      conds.push(format!("type_id = ?{}", args.len()));
    }
    if let Some(status) = filter.status {
      args.push(SqlValue::Text(encode_code(status)));
      conds.push(format!("status = ?{}", args.len()));
    }
    if let Some(env) = filter.environment {
      args.push(SqlValue::Text(encode_code(env)));
      conds.push(format!("environment = ?{}", args.len()));
    }
    if let Some(q) = filter.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
      args.push(SqlValue::Text(format!("%{}%", like_escape(&q.to_lowercase()))));
      let n = args.len();
      conds.push(format!(
        "(LOWER(ci_code) LIKE ?{n} ESCAPE '\\' OR LOWER(name) LIKE ?{n} ESCAPE '\\')"
      ));
    }
    let where_clause = if conds.is_empty() {
      String::new()
    } else {
      format!("WHERE {}", conds.join(" AND "))
    };

    let (total, raws) = self
      .run(move |conn| {
        let total: i64 = conn.query_row(
          &format!("SELECT COUNT(*) FROM cis {where_clause}"),
          params_from_iter(args.iter()),
          |row| row.get(0),
        )?;

        let sql = format!(
          "SELECT {} FROM cis {where_clause}
           ORDER BY name ASC, ci_code ASC
           LIMIT ?{} OFFSET ?{}",
          RawCi::COLUMNS,
          args.len() + 1,
          args.len() + 2,
        );
        let mut page_args = args;
        page_args.push(SqlValue::Integer(i64::from(limit)));
        page_args.push(SqlValue::Integer(offset as i64));
        let mut stmt = conn.prepare(&sql)?;
        let raws = stmt
          .query_map(params_from_iter(page_args.iter()), RawCi::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok((total, raws))
      })
      .await?;

    let items = raws.into_iter().map(RawCi::into_ci).collect::<Result<_>>()?;
    Ok(CiPage { items, total: total as u64, page, limit })
  }

  async fn list_cis_with_status(&self, status: CiStatus) -> Result<Vec<Ci>> {
    let status = encode_code(status);
    let raws = self
      .run(move |conn| {
        let sql = format!(
          "SELECT {} FROM cis WHERE status = ?1 ORDER BY name ASC, ci_code ASC",
          RawCi::COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        Ok(
          stmt
            .query_map(params![status], RawCi::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?,
        )
      })
      .await?;
    raws.into_iter().map(RawCi::into_ci).collect()
  }
}

// ─── AttrValueStore impl ─────────────────────────────────────────────────────

impl AttrValueStore for SqliteStore {
  async fn list_values(&self, ci_id: Uuid) -> Result<Vec<AttrValue>> {
    let id = encode_uuid(ci_id);
    let raws = self
      .run(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT ci_id, version_id, key, value_json, updated_at
           FROM attr_values WHERE ci_id = ?1 ORDER BY key ASC",
        )?;
        Ok(
          stmt
            .query_map(params![id], RawAttrValue::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?,
        )
      })
      .await?;
    raws.into_iter().map(RawAttrValue::into_value).collect()
  }

  async fn upsert_values(
    &self,
    ci_id: Uuid,
    version_id: Option<Uuid>,
    values: Map<String, Value>,
  ) -> Result<()> {
    let id = encode_uuid(ci_id);
    let version = version_id.map(encode_uuid);
    let now = encode_dt(Utc::now());
    let rows = values
      .iter()
      .map(|(k, v)| Ok((k.clone(), encode_json(v)?)))
      .collect::<Result<Vec<_>>>()?;

    self
      .run(move |conn| {
        let txn = conn.transaction()?;
        {
          let mut stmt = txn.prepare(
            "INSERT INTO attr_values (ci_id, version_id, key, value_json, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (ci_id, key) DO UPDATE SET
               version_id = excluded.version_id,
               value_json = excluded.value_json,
               updated_at = excluded.updated_at",
          )?;
          for (key, json) in &rows {
            stmt.execute(params![id, version, key, json, now])?;
          }
        }
        txn.commit()?;
        Ok(())
      })
      .await
  }
}

// ─── SchemaStore impl ────────────────────────────────────────────────────────

impl SchemaStore for SqliteStore {
  // ── Types ─────────────────────────────────────────────────────────────────

  async fn create_type(&self, input: NewCiType) -> Result<CiType> {
    let created = CiType {
      id:          Uuid::new_v4(),
      code:        input.code,
      name:        input.name,
      description: input.description,
      created_at:  Utc::now(),
    };

    let row = created.clone();
    self
      .run(move |conn| {
        conn.execute(
          "INSERT INTO ci_types (type_id, code, name, description, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          params![
            encode_uuid(row.id),
            row.code,
            row.name,
            row.description,
            encode_dt(row.created_at),
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(created)
  }

  async fn get_type(&self, id: Uuid) -> Result<Option<CiType>> {
    self
      .run(move |conn| get_type_where(conn, "type_id", encode_uuid(id)))
      .await
  }

  async fn get_type_by_code(&self, code: &str) -> Result<Option<CiType>> {
    let code = code.to_owned();
    self.run(move |conn| get_type_where(conn, "code", code)).await
  }

  async fn list_types(&self) -> Result<Vec<CiType>> {
    let raws = self
      .run(|conn| {
        let sql = format!("SELECT {} FROM ci_types ORDER BY name ASC", RawCiType::COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        Ok(
          stmt
            .query_map([], RawCiType::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?,
        )
      })
      .await?;
    raws.into_iter().map(RawCiType::into_type).collect()
  }

  // ── Versions ──────────────────────────────────────────────────────────────

  async fn list_versions(&self, type_id: Uuid) -> Result<Vec<CiTypeVersion>> {
    let id = encode_uuid(type_id);
    let raws = self
      .run(move |conn| {
        let sql = format!(
          "SELECT {} FROM ci_type_versions WHERE type_id = ?1 ORDER BY version DESC",
          RawVersion::COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        Ok(
          stmt
            .query_map(params![id], RawVersion::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?,
        )
      })
      .await?;
    raws.into_iter().map(RawVersion::into_version).collect()
  }

  async fn get_active_version(&self, type_id: Uuid) -> Result<Option<CiTypeVersion>> {
    self
      .run(move |conn| tx::get_active_version(conn, type_id))
      .await
  }

  async fn get_version(&self, id: Uuid) -> Result<Option<CiTypeVersion>> {
    self.run(move |conn| tx::get_version(conn, id)).await
  }

  // ── Attribute definitions ─────────────────────────────────────────────────

  async fn list_attr_defs(&self, version_id: Uuid) -> Result<Vec<AttrDef>> {
    self
      .run(move |conn| tx::list_attr_defs(conn, version_id))
      .await
  }

  async fn get_attr_def(&self, id: Uuid) -> Result<Option<AttrDef>> {
    self.run(move |conn| get_attr_def(conn, id)).await
  }

  async fn create_attr_def(&self, def: AttrDef) -> Result<AttrDef> {
    let row = def.clone();
    self
      .run(move |conn| tx::insert_attr_defs(conn, std::slice::from_ref(&row)))
      .await?;
    Ok(def)
  }

  async fn bulk_insert_attr_defs(&self, defs: Vec<AttrDef>) -> Result<Vec<AttrDef>> {
    self
      .run(move |conn| {
        let txn = conn.transaction()?;
        tx::insert_attr_defs(&txn, &defs)?;
        txn.commit()?;
        Ok(defs)
      })
      .await
  }

  async fn update_attr_def(&self, def: AttrDef) -> Result<AttrDef> {
    let def = AttrDef { updated_at: Utc::now(), ..def };

    let row = def.clone();
    self
      .run(move |conn| {
        // Every column except def_id, version_id and created_at is writable.
        let values = attr_def_params(&row)?;
        let n = conn.execute(
          "UPDATE attr_defs SET
             key = ?3, label = ?4, field_type = ?5, required = ?6, unit = ?7,
             enum_values = ?8, pattern = ?9, min_value = ?10, max_value = ?11,
             step_value = ?12, min_len = ?13, max_len = ?14, precision = ?15,
             scale = ?16, default_value = ?17, is_searchable = ?18,
             is_filterable = ?19, sort_order = ?20, is_active = ?21,
             updated_at = ?23
           WHERE def_id = ?1",
          params_from_iter(values.iter()),
        )?;
        if n == 0 {
          return Err(Error::RowNotFound("attribute definition", row.id));
        }
        Ok(())
      })
      .await?;

    Ok(def)
  }

  async fn soft_delete_attr_def(&self, id: Uuid) -> Result<()> {
    let now = encode_dt(Utc::now());
    self
      .run(move |conn| {
        let n = conn.execute(
          "UPDATE attr_defs SET is_active = 0, updated_at = ?2 WHERE def_id = ?1",
          params![encode_uuid(id), now],
        )?;
        if n == 0 {
          return Err(Error::RowNotFound("attribute definition", id));
        }
        Ok(())
      })
      .await
  }

  async fn with_transaction<T, F>(&self, f: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&dyn SchemaTx<Error = Error>) -> Result<T> + Send + 'static,
  {
    self
      .run(move |conn| {
        // IMMEDIATE takes the write lock up front, so concurrent publishes
        // queue here instead of failing at commit.
        let txn = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = f(&SqliteTx { conn: &txn })?;
        txn.commit()?;
        Ok(out)
      })
      .await
  }
}

// ─── RelationshipStore impl ──────────────────────────────────────────────────

impl RelationshipStore for SqliteStore {
  // ── Types ─────────────────────────────────────────────────────────────────

  async fn list_relationship_types(&self) -> Result<Vec<RelationshipType>> {
    let raws = self
      .run(|conn| {
        let sql = format!(
          "SELECT {} FROM relationship_types ORDER BY name ASC",
          RawRelType::COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        Ok(
          stmt
            .query_map([], RawRelType::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?,
        )
      })
      .await?;
    raws.into_iter().map(RawRelType::into_rel_type).collect()
  }

  async fn get_relationship_type(&self, id: Uuid) -> Result<Option<RelationshipType>> {
    self.run(move |conn| get_rel_type(conn, id)).await
  }

  async fn create_relationship_type(
    &self,
    input: NewRelationshipType,
  ) -> Result<RelationshipType> {
    let created = RelationshipType {
      id:                   Uuid::new_v4(),
      code:                 input.code,
      name:                 input.name,
      reverse_name:         input.reverse_name,
      allowed_from_type_id: input.allowed_from_type_id,
      allowed_to_type_id:   input.allowed_to_type_id,
    };

    let row = created.clone();
    self
      .run(move |conn| {
        conn.execute(
          &format!(
            "INSERT INTO relationship_types ({}) VALUES ({})",
            RawRelType::COLUMNS,
            placeholders(6)
          ),
          params![
            encode_uuid(row.id),
            row.code,
            row.name,
            row.reverse_name,
            row.allowed_from_type_id.map(encode_uuid),
            row.allowed_to_type_id.map(encode_uuid),
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(created)
  }

  async fn update_relationship_type(
    &self,
    rel_type: RelationshipType,
  ) -> Result<RelationshipType> {
    let row = rel_type.clone();
    self
      .run(move |conn| {
        let n = conn.execute(
          "UPDATE relationship_types SET
             code = ?2, name = ?3, reverse_name = ?4,
             allowed_from_type_id = ?5, allowed_to_type_id = ?6
           WHERE rel_type_id = ?1",
          params![
            encode_uuid(row.id),
            row.code,
            row.name,
            row.reverse_name,
            row.allowed_from_type_id.map(encode_uuid),
            row.allowed_to_type_id.map(encode_uuid),
          ],
        )?;
        if n == 0 {
          return Err(Error::RowNotFound("relationship type", row.id));
        }
        Ok(())
      })
      .await?;
    Ok(rel_type)
  }

  async fn delete_relationship_type(&self, id: Uuid) -> Result<()> {
    self
      .run(move |conn| {
        let n = conn.execute(
          "DELETE FROM relationship_types WHERE rel_type_id = ?1",
          params![encode_uuid(id)],
        )?;
        if n == 0 {
          return Err(Error::RowNotFound("relationship type", id));
        }
        Ok(())
      })
      .await
  }

  async fn count_relationships_of_type(&self, rel_type_id: Uuid) -> Result<u64> {
    let id = encode_uuid(rel_type_id);
    let n: i64 = self
      .run(move |conn| {
        Ok(conn.query_row(
          "SELECT COUNT(*) FROM relationships WHERE rel_type_id = ?1",
          params![id],
          |row| row.get(0),
        )?)
      })
      .await?;
    Ok(n as u64)
  }

  // ── Relationships ─────────────────────────────────────────────────────────

  async fn create_relationship(&self, input: NewRelationship) -> Result<Relationship> {
    let created = Relationship {
      id:          Uuid::new_v4(),
      rel_type_id: input.rel_type_id,
      from_ci_id:  input.from_ci_id,
      to_ci_id:    input.to_ci_id,
      since_date:  input.since_date,
      note:        input.note,
      status:      RelStatus::Active,
      created_at:  Utc::now(),
    };

    let row = created.clone();
    self
      .run(move |conn| {
        conn.execute(
          &format!(
            "INSERT INTO relationships ({}) VALUES ({})",
            RawRelationship::COLUMNS,
            placeholders(8)
          ),
          params![
            encode_uuid(row.id),
            encode_uuid(row.rel_type_id),
            encode_uuid(row.from_ci_id),
            encode_uuid(row.to_ci_id),
            row.since_date.map(encode_date),
            row.note,
            encode_code(row.status),
            encode_dt(row.created_at),
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(created)
  }

  async fn get_relationship(&self, id: Uuid) -> Result<Option<Relationship>> {
    self.run(move |conn| get_relationship(conn, id)).await
  }

  async fn retire_relationship(&self, id: Uuid) -> Result<Relationship> {
    self
      .run(move |conn| {
        conn.execute(
          "UPDATE relationships SET status = ?2 WHERE rel_id = ?1",
          params![encode_uuid(id), encode_code(RelStatus::Retired)],
        )?;
        get_relationship(conn, id)?.ok_or(Error::RowNotFound("relationship", id))
      })
      .await
  }

  async fn list_relationships_by_ci(&self, ci_id: Uuid) -> Result<Vec<Relationship>> {
    let id = encode_uuid(ci_id);
    let raws = self
      .run(move |conn| {
        let sql = format!(
          "SELECT {} FROM relationships
           WHERE (from_ci_id = ?1 OR to_ci_id = ?1) AND status = 'active'
           ORDER BY created_at ASC, rowid ASC",
          RawRelationship::COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        Ok(
          stmt
            .query_map(params![id], RawRelationship::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?,
        )
      })
      .await?;
    raws.into_iter().map(RawRelationship::into_relationship).collect()
  }

  async fn list_relationships(&self, status: Option<RelStatus>) -> Result<Vec<Relationship>> {
    let status = status.map(encode_code);
    let raws = self
      .run(move |conn| {
        let sql = format!(
          "SELECT {} FROM relationships
           WHERE (?1 IS NULL OR status = ?1)
           ORDER BY created_at ASC, rowid ASC",
          RawRelationship::COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        Ok(
          stmt
            .query_map(params![status], RawRelationship::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?,
        )
      })
      .await?;
    raws.into_iter().map(RawRelationship::into_relationship).collect()
  }
}

// ─── ServiceStore impl ───────────────────────────────────────────────────────

impl ServiceStore for SqliteStore {
  async fn create_service(&self, input: NewService) -> Result<Service> {
    let created = Service {
      id:          Uuid::new_v4(),
      code:        input.code,
      name:        input.name,
      criticality: input.criticality,
      owner:       input.owner,
      sla:         input.sla,
      status:      input.status,
      created_at:  Utc::now(),
    };

    let row = created.clone();
    self
      .run(move |conn| {
        conn.execute(
          &format!(
            "INSERT INTO services ({}) VALUES ({})",
            RawService::COLUMNS,
            placeholders(8)
          ),
          params![
            encode_uuid(row.id),
            row.code,
            row.name,
            row.criticality,
            row.owner,
            row.sla,
            row.status,
            encode_dt(row.created_at),
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(created)
  }

  async fn update_service(&self, service: Service) -> Result<Service> {
    let row = service.clone();
    self
      .run(move |conn| {
        let n = conn.execute(
          "UPDATE services SET
             code = ?2, name = ?3, criticality = ?4, owner = ?5, sla = ?6,
             status = ?7
           WHERE service_id = ?1",
          params![
            encode_uuid(row.id),
            row.code,
            row.name,
            row.criticality,
            row.owner,
            row.sla,
            row.status,
          ],
        )?;
        if n == 0 {
          return Err(Error::RowNotFound("service", row.id));
        }
        Ok(())
      })
      .await?;
    Ok(service)
  }

  async fn get_service(&self, id: Uuid) -> Result<Option<Service>> {
    self
      .run(move |conn| get_service_where(conn, "service_id", encode_uuid(id)))
      .await
  }

  async fn get_service_by_code(&self, code: &str) -> Result<Option<Service>> {
    let code = code.to_owned();
    self.run(move |conn| get_service_where(conn, "code", code)).await
  }

  async fn list_services(&self) -> Result<Vec<Service>> {
    let raws = self
      .run(|conn| {
        let sql = format!("SELECT {} FROM services ORDER BY name ASC", RawService::COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        Ok(
          stmt
            .query_map([], RawService::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?,
        )
      })
      .await?;
    raws.into_iter().map(RawService::into_service).collect()
  }

  async fn add_service_member(
    &self,
    service_id: Uuid,
    ci_id: Uuid,
    role: Option<String>,
  ) -> Result<ServiceMember> {
    let member = ServiceMember {
      id: Uuid::new_v4(),
      service_id,
      ci_id,
      role,
      created_at: Utc::now(),
    };

    let row = member.clone();
    self
      .run(move |conn| {
        conn.execute(
          &format!(
            "INSERT INTO service_members ({}) VALUES ({})",
            RawMember::COLUMNS,
            placeholders(5)
          ),
          params![
            encode_uuid(row.id),
            encode_uuid(row.service_id),
            encode_uuid(row.ci_id),
            row.role,
            encode_dt(row.created_at),
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(member)
  }

  async fn get_service_member(&self, id: Uuid) -> Result<Option<ServiceMember>> {
    self
      .run(move |conn| {
        let sql = format!(
          "SELECT {} FROM service_members WHERE member_id = ?1",
          RawMember::COLUMNS
        );
        conn
          .query_row(&sql, params![encode_uuid(id)], RawMember::from_row)
          .optional()?
          .map(RawMember::into_member)
          .transpose()
      })
      .await
  }

  async fn remove_service_member(&self, id: Uuid) -> Result<()> {
    self
      .run(move |conn| {
        let n = conn.execute(
          "DELETE FROM service_members WHERE member_id = ?1",
          params![encode_uuid(id)],
        )?;
        if n == 0 {
          return Err(Error::RowNotFound("service member", id));
        }
        Ok(())
      })
      .await
  }

  async fn list_service_members(&self, service_id: Uuid) -> Result<Vec<ServiceMember>> {
    let id = encode_uuid(service_id);
    let raws = self
      .run(move |conn| {
        let sql = format!(
          "SELECT {} FROM service_members WHERE service_id = ?1
           ORDER BY created_at ASC, rowid ASC",
          RawMember::COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        Ok(
          stmt
            .query_map(params![id], RawMember::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?,
        )
      })
      .await?;
    raws.into_iter().map(RawMember::into_member).collect()
  }
}

// ─── EventSink impl ──────────────────────────────────────────────────────────

impl EventSink for SqliteStore {
  type Error = Error;

  async fn append(&self, event: NewEvent) -> Result<OpsEvent> {
    let stored = OpsEvent {
      id:             Uuid::new_v4(),
      entity_type:    event.entity_type,
      entity_id:      event.entity_id,
      event_type:     event.event_type,
      payload:        event.payload,
      actor_user_id:  event.actor_user_id,
      correlation_id: event.correlation_id,
      created_at:     Utc::now(),
    };

    let payload = encode_json(&stored.payload)?;
    let row = stored.clone();
    self
      .run(move |conn| {
        conn.execute(
          &format!(
            "INSERT INTO ops_events ({}) VALUES ({})",
            RawEvent::COLUMNS,
            placeholders(8)
          ),
          params![
            encode_uuid(row.id),
            encode_code(row.entity_type),
            encode_uuid(row.entity_id),
            row.event_type,
            payload,
            row.actor_user_id,
            row.correlation_id,
            encode_dt(row.created_at),
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(stored)
  }
}
