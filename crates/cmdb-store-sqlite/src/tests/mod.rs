//! Integration tests for `SqliteStore` and the managers driven through it,
//! against an in-memory database.

mod schema;
mod persistence;

use cmdb_core::{
  ci::{Ci, NewCi},
  engine::{CiManager, SchemaManager},
  event::Context,
  schema::{CiType, CiTypeVersion, NewAttrDef, NewCiType},
};
use serde_json::Map;
use uuid::Uuid;

use crate::SqliteStore;

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn ctx() -> Context { Context::new("tester", "corr-1") }

fn schemas(s: &SqliteStore) -> SchemaManager<SqliteStore, SqliteStore> {
  SchemaManager::with_events(s.clone(), s.clone())
}

fn cis(s: &SqliteStore) -> CiManager<SqliteStore, SqliteStore> {
  CiManager::with_events(s.clone(), s.clone())
}

async fn ci_type(s: &SqliteStore, code: &str) -> CiType {
  schemas(s)
    .create_type(NewCiType::new(code, code.to_uppercase()), &ctx())
    .await
    .unwrap()
}

/// Create a draft of `type_id` with `defs` and publish it.
async fn publish_schema(
  s: &SqliteStore,
  type_id: Uuid,
  defs: Vec<NewAttrDef>,
) -> CiTypeVersion {
  let m = schemas(s);
  let draft = m.create_draft_version(type_id, &ctx()).await.unwrap();
  if !defs.is_empty() {
    m.bulk_add_attr_defs(draft.version.id, defs, &ctx()).await.unwrap();
  }
  m.publish_version(draft.version.id, &ctx()).await.unwrap().version
}

/// A CI with no attributes.
async fn ci(s: &SqliteStore, type_id: Uuid, code: &str) -> Ci {
  cis(s)
    .create_ci(NewCi::new(type_id, code, code), Map::new(), &ctx())
    .await
    .unwrap()
}
