//! The append-only audit trail.
//!
//! Managers append one event per successful mutation. The sink is optional
//! and best-effort: a failed append is logged and never undoes or fails the
//! mutation it describes.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};
use uuid::Uuid;

/// Who is acting, and under which request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Context {
  pub user_id:        String,
  pub correlation_id: String,
}

impl Context {
  pub fn new(
    user_id: impl Into<String>,
    correlation_id: impl Into<String>,
  ) -> Self {
    Self { user_id: user_id.into(), correlation_id: correlation_id.into() }
  }
}

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
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EntityType {
  CmdbType,
  CmdbSchema,
  CmdbCi,
  CmdbRel,
  CmdbService,
}

/// Input to [`EventSink::append`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEvent {
  pub entity_type:    EntityType,
  pub entity_id:      Uuid,
  /// e.g. `CI_CREATED`, `REL_RETIRED`.
  pub event_type:     String,
  pub payload:        serde_json::Value,
  pub actor_user_id:  String,
  pub correlation_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpsEvent {
  pub id:             Uuid,
  pub entity_type:    EntityType,
  pub entity_id:      Uuid,
  pub event_type:     String,
  pub payload:        serde_json::Value,
  pub actor_user_id:  String,
  pub correlation_id: String,
  pub created_at:     DateTime<Utc>,
}

/// Write side of the audit log.
pub trait EventSink: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn append(
    &self,
    event: NewEvent,
  ) -> impl Future<Output = Result<OpsEvent, Self::Error>> + Send + '_;
}

/// A sink that drops every event; the default when no audit log is wired.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAudit;

impl EventSink for NoAudit {
  type Error = std::convert::Infallible;

  async fn append(&self, event: NewEvent) -> Result<OpsEvent, Self::Error> {
    Ok(OpsEvent {
      id:             Uuid::new_v4(),
      entity_type:    event.entity_type,
      entity_id:      event.entity_id,
      event_type:     event.event_type,
      payload:        event.payload,
      actor_user_id:  event.actor_user_id,
      correlation_id: event.correlation_id,
      created_at:     Utc::now(),
    })
  }
}

/// Append `event` to an optional sink, logging rather than propagating
/// failure.
pub(crate) async fn record<E: EventSink>(
  sink: Option<&E>,
  entity_type: EntityType,
  entity_id: Uuid,
  event_type: &str,
  payload: serde_json::Value,
  ctx: &Context,
) {
  let Some(sink) = sink else {
    return;
  };
  let event = NewEvent {
    entity_type,
    entity_id,
    event_type: event_type.to_owned(),
    payload,
    actor_user_id: ctx.user_id.clone(),
    correlation_id: ctx.correlation_id.clone(),
  };
  if let Err(e) = sink.append(event).await {
    tracing::warn!(
      %entity_id,
      event_type,
      error = %e,
      "failed to append audit event"
    );
  }
}
