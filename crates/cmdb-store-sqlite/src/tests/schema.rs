use cmdb_core::{
  ErrorKind,
  ci::NewCi,
  field::FieldType,
  schema::{AttrDefPatch, NewAttrDef, NewCiType, VersionStatus},
};
use serde_json::{Map, json};
use uuid::Uuid;

use super::{ci_type, cis, ctx, publish_schema, schemas, store};

// ─── Types ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_type_trims_and_rejects_duplicate_codes() {
  let s = store().await;
  let m = schemas(&s);

  let created = m
    .create_type(NewCiType::new("  server ", " Server "), &ctx())
    .await
    .unwrap();
  assert_eq!(created.code, "server");
  assert_eq!(created.name, "Server");

  let err = m
    .create_type(NewCiType::new("server", "Another"), &ctx())
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::BadRequest);

  let err = m.create_type(NewCiType::new("  ", "Blank"), &ctx()).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::BadRequest);
}

#[tokio::test]
async fn types_are_listed_by_name() {
  let s = store().await;
  let m = schemas(&s);
  m.create_type(NewCiType::new("srv", "Server"), &ctx()).await.unwrap();
  m.create_type(NewCiType::new("app", "Application"), &ctx()).await.unwrap();

  let names: Vec<String> =
    m.list_types().await.unwrap().into_iter().map(|t| t.name).collect();
  assert_eq!(names, ["Application", "Server"]);
}

#[tokio::test]
async fn unknown_type_is_not_found() {
  let s = store().await;
  let m = schemas(&s);
  let err = m.get_type(Uuid::new_v4()).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::NotFound);
  let err = m.create_draft_version(Uuid::new_v4(), &ctx()).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::NotFound);
}

// ─── Versions ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn first_draft_is_version_one_and_empty() {
  let s = store().await;
  let ty = ci_type(&s, "server").await;

  let draft = schemas(&s).create_draft_version(ty.id, &ctx()).await.unwrap();
  assert_eq!(draft.version.version, 1);
  assert_eq!(draft.version.status, VersionStatus::Draft);
  assert_eq!(draft.version.created_by.as_deref(), Some("tester"));
  assert!(draft.defs.is_empty());
}

#[tokio::test]
async fn draft_copies_active_definitions() {
  let s = store().await;
  let ty = ci_type(&s, "server").await;
  let v1 = publish_schema(
    &s,
    ty.id,
    vec![
      NewAttrDef::new("owner", "Owner", FieldType::String).required(),
      NewAttrDef::new("cores", "Cores", FieldType::Number),
    ],
  )
  .await;

  let m = schemas(&s);
  let draft = m.create_draft_version(ty.id, &ctx()).await.unwrap();
  assert_eq!(draft.version.version, 2);
  assert_eq!(draft.defs.len(), 2);
  assert!(draft.defs.iter().all(|d| d.version_id == draft.version.id));

  let copied = m.list_attr_defs(draft.version.id).await.unwrap();
  let owner = copied.iter().find(|d| d.key == "owner").unwrap();
  assert!(owner.required);

  // The copy is independent of the original.
  let original = m.list_attr_defs(v1.id).await.unwrap();
  assert!(original.iter().all(|o| copied.iter().all(|c| c.id != o.id)));
}

#[tokio::test]
async fn publish_keeps_exactly_one_active_version() {
  let s = store().await;
  let server = ci_type(&s, "server").await;
  let db = ci_type(&s, "db").await;
  let db_v1 = publish_schema(&s, db.id, vec![]).await;

  let v1 = publish_schema(&s, server.id, vec![]).await;
  let v2 = publish_schema(&s, server.id, vec![]).await;
  let v3 = publish_schema(&s, server.id, vec![]).await;

  let m = schemas(&s);
  let versions = m.list_versions(server.id).await.unwrap();
  let numbers: Vec<u32> = versions.iter().map(|v| v.version).collect();
  assert_eq!(numbers, [3, 2, 1]);
  let active: Vec<_> = versions.iter().filter(|v| v.status.is_active()).collect();
  assert_eq!(active.len(), 1);
  assert_eq!(active[0].id, v3.id);
  assert_eq!(m.get_version(v1.id).await.unwrap().status, VersionStatus::Retired);
  assert_eq!(m.get_version(v2.id).await.unwrap().status, VersionStatus::Retired);

  // Other types are untouched.
  assert_eq!(m.get_version(db_v1.id).await.unwrap().status, VersionStatus::Active);
}

#[tokio::test]
async fn publishing_active_version_is_rejected() {
  let s = store().await;
  let ty = ci_type(&s, "server").await;
  let v1 = publish_schema(&s, ty.id, vec![]).await;

  let err = schemas(&s).publish_version(v1.id, &ctx()).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::BadRequest);
}

#[tokio::test]
async fn retired_version_can_be_republished() {
  let s = store().await;
  let ty = ci_type(&s, "server").await;
  let v1 = publish_schema(&s, ty.id, vec![]).await;
  let v2 = publish_schema(&s, ty.id, vec![]).await;

  let m = schemas(&s);
  let outcome = m.publish_version(v1.id, &ctx()).await.unwrap();
  assert_eq!(outcome.version.status, VersionStatus::Active);
  assert_eq!(m.get_version(v2.id).await.unwrap().status, VersionStatus::Retired);
}

#[tokio::test]
async fn publishing_unknown_version_is_not_found() {
  let s = store().await;
  let err = schemas(&s).publish_version(Uuid::new_v4(), &ctx()).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn publish_warns_about_cis_missing_new_required_keys() {
  let s = store().await;
  let ty = ci_type(&s, "server").await;
  publish_schema(&s, ty.id, vec![NewAttrDef::new("owner", "Owner", FieldType::String)])
    .await;

  let mut attrs = Map::new();
  attrs.insert("owner".into(), json!("ops"));
  let complete = cis(&s)
    .create_ci(NewCi::new(ty.id, "web-01", "SRV-001"), attrs, &ctx())
    .await
    .unwrap();
  let bare = cis(&s)
    .create_ci(NewCi::new(ty.id, "web-02", "SRV-002"), Map::new(), &ctx())
    .await
    .unwrap();

  let m = schemas(&s);
  let draft = m.create_draft_version(ty.id, &ctx()).await.unwrap();
  let owner = draft.defs.iter().find(|d| d.key == "owner").unwrap();
  m.update_attr_def(
    owner.id,
    AttrDefPatch { required: Some(true), ..Default::default() },
    &ctx(),
  )
  .await
  .unwrap();

  let outcome = m.publish_version(draft.version.id, &ctx()).await.unwrap();
  assert_eq!(outcome.warnings.len(), 1);
  assert_eq!(outcome.warnings[0].ci_id, bare.id);
  assert_eq!(outcome.warnings[0].ci_name, "web-02");
  assert_eq!(outcome.warnings[0].missing_keys, ["owner"]);
  assert!(outcome.warnings.iter().all(|w| w.ci_id != complete.id));
}

// ─── Attribute definitions ───────────────────────────────────────────────────

#[tokio::test]
async fn invalid_definitions_are_rejected() {
  let s = store().await;
  let ty = ci_type(&s, "server").await;
  let draft = schemas(&s).create_draft_version(ty.id, &ctx()).await.unwrap();
  let m = schemas(&s);

  let mut bounds = NewAttrDef::new("ram", "RAM", FieldType::Number);
  bounds.min_value = Some(10.0);
  bounds.max_value = Some(1.0);
  let err = m.add_attr_def(draft.version.id, bounds, &ctx()).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::BadRequest);

  let mut pattern = NewAttrDef::new("cores", "Cores", FieldType::Number);
  pattern.pattern = Some("^[0-9]+$".into());
  let err = m.add_attr_def(draft.version.id, pattern, &ctx()).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::BadRequest);

  let err = m
    .add_attr_def(draft.version.id, NewAttrDef::new("tier", "Tier", FieldType::Enum), &ctx())
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::BadRequest);

  assert!(m.list_attr_defs(draft.version.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn duplicate_keys_are_rejected() {
  let s = store().await;
  let ty = ci_type(&s, "server").await;
  let m = schemas(&s);
  let draft = m.create_draft_version(ty.id, &ctx()).await.unwrap();
  let vid = draft.version.id;

  m.add_attr_def(vid, NewAttrDef::new("owner", "Owner", FieldType::String), &ctx())
    .await
    .unwrap();
  let err = m
    .add_attr_def(vid, NewAttrDef::new("owner", "Owner 2", FieldType::String), &ctx())
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::BadRequest);

  // Within a batch, and against existing definitions.
  let batch = vec![
    NewAttrDef::new("site", "Site", FieldType::String),
    NewAttrDef::new("site", "Site again", FieldType::String),
  ];
  let err = m.bulk_add_attr_defs(vid, batch, &ctx()).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::BadRequest);
  let batch = vec![
    NewAttrDef::new("rack", "Rack", FieldType::String),
    NewAttrDef::new("owner", "Owner", FieldType::String),
  ];
  assert!(m.bulk_add_attr_defs(vid, batch, &ctx()).await.is_err());

  let keys: Vec<String> =
    m.list_attr_defs(vid).await.unwrap().into_iter().map(|d| d.key).collect();
  assert_eq!(keys, ["owner"]);
}

#[tokio::test]
async fn soft_deleted_key_can_be_added_again() {
  let s = store().await;
  let ty = ci_type(&s, "server").await;
  let m = schemas(&s);
  let draft = m.create_draft_version(ty.id, &ctx()).await.unwrap();
  let vid = draft.version.id;

  let first = m
    .add_attr_def(vid, NewAttrDef::new("owner", "Owner", FieldType::String), &ctx())
    .await
    .unwrap();
  m.soft_delete_attr_def(first.id, &ctx()).await.unwrap();
  assert!(m.list_attr_defs(vid).await.unwrap().is_empty());

  let second = m
    .add_attr_def(vid, NewAttrDef::new("owner", "Owner", FieldType::Number), &ctx())
    .await
    .unwrap();
  assert_ne!(first.id, second.id);
  assert_eq!(m.list_attr_defs(vid).await.unwrap().len(), 1);
}

#[tokio::test]
async fn reactivating_onto_a_reused_key_is_rejected() {
  let s = store().await;
  let ty = ci_type(&s, "server").await;
  let m = schemas(&s);
  let draft = m.create_draft_version(ty.id, &ctx()).await.unwrap();
  let vid = draft.version.id;

  let first = m
    .add_attr_def(vid, NewAttrDef::new("owner", "Owner", FieldType::String), &ctx())
    .await
    .unwrap();
  m.soft_delete_attr_def(first.id, &ctx()).await.unwrap();
  m.add_attr_def(vid, NewAttrDef::new("owner", "Owner", FieldType::String), &ctx())
    .await
    .unwrap();

  let reactivate = AttrDefPatch { is_active: Some(true), ..Default::default() };
  let err = m.update_attr_def(first.id, reactivate, &ctx()).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::BadRequest);

  // Still inactive; only the replacement is listed.
  assert_eq!(m.list_attr_defs(vid).await.unwrap().len(), 1);
  let stale = AttrDefPatch { label: Some("Old owner".into()), ..Default::default() };
  let edited = m.update_attr_def(first.id, stale, &ctx()).await.unwrap();
  assert!(!edited.is_active);
}

#[tokio::test]
async fn update_validates_the_merged_definition() {
  let s = store().await;
  let ty = ci_type(&s, "server").await;
  let m = schemas(&s);
  let draft = m.create_draft_version(ty.id, &ctx()).await.unwrap();

  let mut ram = NewAttrDef::new("ram", "RAM", FieldType::Number);
  ram.max_value = Some(512.0);
  let ram = m.add_attr_def(draft.version.id, ram, &ctx()).await.unwrap();

  // A min above the stored max only fails once merged.
  let err = m
    .update_attr_def(
      ram.id,
      AttrDefPatch { min_value: Some(Some(1024.0)), ..Default::default() },
      &ctx(),
    )
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::BadRequest);

  let updated = m
    .update_attr_def(
      ram.id,
      AttrDefPatch {
        label: Some("Memory".into()),
        min_value: Some(Some(1.0)),
        ..Default::default()
      },
      &ctx(),
    )
    .await
    .unwrap();
  assert_eq!(updated.id, ram.id);
  assert_eq!(updated.created_at, ram.created_at);
  assert_eq!(updated.label, "Memory");
  assert_eq!(updated.min_value, Some(1.0));
  assert_eq!(updated.max_value, Some(512.0));
}

#[tokio::test]
async fn update_rejects_renaming_onto_an_existing_key() {
  let s = store().await;
  let ty = ci_type(&s, "server").await;
  let m = schemas(&s);
  let draft = m.create_draft_version(ty.id, &ctx()).await.unwrap();
  let vid = draft.version.id;
  m.add_attr_def(vid, NewAttrDef::new("owner", "Owner", FieldType::String), &ctx())
    .await
    .unwrap();
  let site = m
    .add_attr_def(vid, NewAttrDef::new("site", "Site", FieldType::String), &ctx())
    .await
    .unwrap();

  let err = m
    .update_attr_def(
      site.id,
      AttrDefPatch { key: Some("owner".into()), ..Default::default() },
      &ctx(),
    )
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::BadRequest);
}

#[tokio::test]
async fn schema_changes_are_audited() {
  let s = store().await;
  let ty = ci_type(&s, "server").await;
  let v1 = publish_schema(
    &s,
    ty.id,
    vec![NewAttrDef::new("owner", "Owner", FieldType::String)],
  )
  .await;

  let type_events = s.list_events(Some(ty.id)).await.unwrap();
  assert_eq!(type_events.len(), 1);
  assert_eq!(type_events[0].event_type, "CMDB_TYPE_CREATED");
  assert_eq!(type_events[0].actor_user_id, "tester");
  assert_eq!(type_events[0].correlation_id, "corr-1");

  let kinds: Vec<String> = s
    .list_events(Some(v1.id))
    .await
    .unwrap()
    .into_iter()
    .map(|e| e.event_type)
    .collect();
  assert_eq!(
    kinds,
    ["SPEC_VERSION_CREATED", "SPEC_DEF_CHANGED", "SPEC_VERSION_PUBLISHED"]
  );
}
