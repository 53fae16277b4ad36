//! Direct store behaviour, without a manager in between.

use cmdb_core::{
  ci::{CiFilter, CiStatus, Environment, NewCi},
  event::{EntityType, EventSink, NewEvent},
  field::FieldType,
  relationship::{NewRelationship, NewRelationshipType},
  schema::{NewAttrDef, NewCiType, VersionStatus},
  service::NewService,
  store::{AttrValueStore, CiStore, RelationshipStore, SchemaStore, ServiceStore},
};
use serde_json::{Map, json};
use uuid::Uuid;

use super::store;

#[tokio::test]
async fn type_roundtrip() {
  let s = store().await;
  let mut input = NewCiType::new("server", "Server");
  input.description = Some("Physical or virtual host".into());
  let created = s.create_type(input).await.unwrap();

  let fetched = s.get_type(created.id).await.unwrap().unwrap();
  assert_eq!(fetched.code, "server");
  assert_eq!(fetched.description.as_deref(), Some("Physical or virtual host"));
  assert_eq!(s.get_type_by_code("server").await.unwrap().unwrap().id, created.id);
  assert!(s.get_type(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn duplicate_type_code_is_a_store_error() {
  let s = store().await;
  s.create_type(NewCiType::new("server", "Server")).await.unwrap();
  assert!(s.create_type(NewCiType::new("server", "Other")).await.is_err());
}

#[tokio::test]
async fn transaction_rolls_back_on_error() {
  let s = store().await;
  let ty = s.create_type(NewCiType::new("server", "Server")).await.unwrap();
  let type_id = ty.id;

  let result = s
    .with_transaction(move |tx| {
      tx.create_version(type_id, 1, VersionStatus::Draft, None)?;
      // Same version number again violates UNIQUE (type_id, version).
      tx.create_version(type_id, 1, VersionStatus::Draft, None)?;
      Ok(())
    })
    .await;
  assert!(result.is_err());
  assert!(s.list_versions(type_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn only_one_active_version_per_type_at_rest() {
  let s = store().await;
  let ty = s.create_type(NewCiType::new("server", "Server")).await.unwrap();
  let type_id = ty.id;

  let result = s
    .with_transaction(move |tx| {
      tx.create_version(type_id, 1, VersionStatus::Active, None)?;
      tx.create_version(type_id, 2, VersionStatus::Active, None)?;
      Ok(())
    })
    .await;
  assert!(result.is_err());
}

#[tokio::test]
async fn attr_def_roundtrip_keeps_constraints() {
  let s = store().await;
  let ty = s.create_type(NewCiType::new("server", "Server")).await.unwrap();
  let type_id = ty.id;
  let version = s
    .with_transaction(move |tx| tx.create_version(type_id, 1, VersionStatus::Draft, None))
    .await
    .unwrap();

  let mut input = NewAttrDef::new("cpuGhz", "CPU", FieldType::Number);
  input.min_value = Some(0.5);
  input.max_value = Some(6.0);
  input.precision = Some(4);
  input.scale = Some(2);
  input.default_value = Some(json!(2.4));
  input.sort_order = 3;
  let created = s.create_attr_def(input.into_def(version.id)).await.unwrap();

  let fetched = s.get_attr_def(created.id).await.unwrap().unwrap();
  assert_eq!(fetched.field_type, FieldType::Number);
  assert_eq!(fetched.min_value, Some(0.5));
  assert_eq!(fetched.max_value, Some(6.0));
  assert_eq!(fetched.precision, Some(4));
  assert_eq!(fetched.scale, Some(2));
  assert_eq!(fetched.default_value, Some(json!(2.4)));
  assert_eq!(fetched.sort_order, 3);
  assert!(fetched.is_active);
}

#[tokio::test]
async fn attr_defs_are_listed_by_sort_order_then_key() {
  let s = store().await;
  let ty = s.create_type(NewCiType::new("server", "Server")).await.unwrap();
  let type_id = ty.id;
  let version = s
    .with_transaction(move |tx| tx.create_version(type_id, 1, VersionStatus::Draft, None))
    .await
    .unwrap();

  let mut defs = Vec::new();
  for (key, order) in [("zeta", 0), ("alpha", 1), ("beta", 0)] {
    let mut d = NewAttrDef::new(key, key, FieldType::String);
    d.sort_order = order;
    defs.push(d.into_def(version.id));
  }
  s.bulk_insert_attr_defs(defs).await.unwrap();

  let keys: Vec<String> = s
    .list_attr_defs(version.id)
    .await
    .unwrap()
    .into_iter()
    .map(|d| d.key)
    .collect();
  assert_eq!(keys, ["beta", "zeta", "alpha"]);
}

#[tokio::test]
async fn created_timestamps_survive_a_reread() {
  let s = store().await;
  let ty = s.create_type(NewCiType::new("server", "Server")).await.unwrap();
  let type_id = ty.id;
  let version = s
    .with_transaction(move |tx| tx.create_version(type_id, 1, VersionStatus::Draft, None))
    .await
    .unwrap();
  let def = s
    .create_attr_def(NewAttrDef::new("owner", "Owner", FieldType::String).into_def(version.id))
    .await
    .unwrap();
  let a = s.create_ci(NewCi::new(ty.id, "web-01", "SRV-001")).await.unwrap();
  let b = s.create_ci(NewCi::new(ty.id, "db-01", "SRV-002")).await.unwrap();
  let rt = s
    .create_relationship_type(NewRelationshipType::new("dependsOn", "depends on"))
    .await
    .unwrap();
  let rel = s.create_relationship(NewRelationship::new(rt.id, a.id, b.id)).await.unwrap();
  let svc = s.create_service(NewService::new("checkout", "Checkout")).await.unwrap();
  let member = s.add_service_member(svc.id, a.id, None).await.unwrap();

  assert_eq!(s.get_type(ty.id).await.unwrap().unwrap().created_at, ty.created_at);
  assert_eq!(s.get_version(version.id).await.unwrap().unwrap().created_at, version.created_at);

  let fetched = s.get_attr_def(def.id).await.unwrap().unwrap();
  assert_eq!((fetched.created_at, fetched.updated_at), (def.created_at, def.updated_at));

  let fetched = s.get_ci(a.id).await.unwrap().unwrap();
  assert_eq!((fetched.created_at, fetched.updated_at), (a.created_at, a.updated_at));

  let updated = s.update_ci(fetched).await.unwrap();
  let fetched = s.get_ci(a.id).await.unwrap().unwrap();
  assert_eq!(fetched.updated_at, updated.updated_at);

  assert_eq!(s.get_relationship(rel.id).await.unwrap().unwrap().created_at, rel.created_at);
  assert_eq!(s.get_service(svc.id).await.unwrap().unwrap().created_at, svc.created_at);
  assert_eq!(
    s.get_service_member(member.id).await.unwrap().unwrap().created_at,
    member.created_at
  );
}

#[tokio::test]
async fn upsert_values_replaces_by_key() {
  let s = store().await;
  let ty = s.create_type(NewCiType::new("server", "Server")).await.unwrap();
  let ci = s.create_ci(NewCi::new(ty.id, "web-01", "SRV-001")).await.unwrap();

  let mut first = Map::new();
  first.insert("owner".into(), json!("ops"));
  first.insert("cores".into(), json!(8));
  s.upsert_values(ci.id, None, first).await.unwrap();

  let mut second = Map::new();
  second.insert("owner".into(), json!("platform"));
  s.upsert_values(ci.id, None, second).await.unwrap();

  let values = s.list_values(ci.id).await.unwrap();
  assert_eq!(values.len(), 2);
  let owner = values.iter().find(|v| v.key == "owner").unwrap();
  assert_eq!(owner.value, json!("platform"));
  assert!(owner.version_id.is_none());
}

#[tokio::test]
async fn list_cis_filters_and_paginates() {
  let s = store().await;
  let server = s.create_type(NewCiType::new("server", "Server")).await.unwrap();
  let db = s.create_type(NewCiType::new("db", "Database")).await.unwrap();

  for i in 0..5 {
    let mut input = NewCi::new(server.id, format!("web-{i:02}"), format!("SRV-{i:03}"));
    if i == 4 {
      input.environment = Environment::Staging;
      input.status = CiStatus::Maintenance;
    }
    s.create_ci(input).await.unwrap();
  }
  s.create_ci(NewCi::new(db.id, "orders-db", "DB-001")).await.unwrap();

  let all = s.list_cis(&CiFilter::default()).await.unwrap();
  assert_eq!(all.total, 6);
  assert_eq!(all.items[0].name, "orders-db");

  let servers = CiFilter {
    type_id: Some(server.id),
    page: Some(2),
    limit: Some(2),
    ..Default::default()
  };
  let page = s.list_cis(&servers).await.unwrap();
  assert_eq!(page.total, 5);
  assert_eq!((page.page, page.limit), (2, 2));
  let names: Vec<_> = page.items.iter().map(|c| c.name.as_str()).collect();
  assert_eq!(names, ["web-02", "web-03"]);

  let staging = CiFilter { environment: Some(Environment::Staging), ..Default::default() };
  assert_eq!(s.list_cis(&staging).await.unwrap().total, 1);

  let maint = CiFilter { status: Some(CiStatus::Maintenance), ..Default::default() };
  assert_eq!(s.list_cis(&maint).await.unwrap().items[0].ci_code, "SRV-004");

  let search = CiFilter { q: Some("db".into()), ..Default::default() };
  assert_eq!(s.list_cis(&search).await.unwrap().total, 1);

  // LIKE wildcards in the query are matched literally.
  let wildcard = CiFilter { q: Some("%".into()), ..Default::default() };
  assert_eq!(s.list_cis(&wildcard).await.unwrap().total, 0);
}

#[tokio::test]
async fn events_are_appended_and_listed() {
  let s = store().await;
  let entity_id = Uuid::new_v4();
  let appended = s
    .append(NewEvent {
      entity_type:    EntityType::CmdbCi,
      entity_id,
      event_type:     "CI_CREATED".into(),
      payload:        json!({ "ciCode": "SRV-001" }),
      actor_user_id:  "alice".into(),
      correlation_id: "req-1".into(),
    })
    .await
    .unwrap();

  let events = s.list_events(Some(entity_id)).await.unwrap();
  assert_eq!(events.len(), 1);
  assert_eq!(events[0].id, appended.id);
  assert_eq!(events[0].entity_type, EntityType::CmdbCi);
  assert_eq!(events[0].payload["ciCode"], "SRV-001");
  assert!(s.list_events(Some(Uuid::new_v4())).await.unwrap().is_empty());
}
