//! Business services and the CIs that make them up.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
  pub id:          Uuid,
  pub code:        String,
  pub name:        String,
  pub criticality: Option<String>,
  pub owner:       Option<String>,
  pub sla:         Option<String>,
  pub status:      Option<String>,
  pub created_at:  DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewService {
  pub code:        String,
  pub name:        String,
  #[serde(default)]
  pub criticality: Option<String>,
  #[serde(default)]
  pub owner:       Option<String>,
  #[serde(default)]
  pub sla:         Option<String>,
  #[serde(default)]
  pub status:      Option<String>,
}

impl NewService {
  pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
    Self {
      code:        code.into(),
      name:        name.into(),
      criticality: None,
      owner:       None,
      sla:         None,
      status:      None,
    }
  }

  pub fn normalized(self) -> Result<Self> {
    let code = self.code.trim().to_owned();
    let name = self.name.trim().to_owned();
    if code.is_empty() {
      return Err(Error::bad_request("service code required"));
    }
    if name.is_empty() {
      return Err(Error::bad_request("service name required"));
    }
    Ok(Self { code, name, ..self })
  }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServicePatch {
  pub code:        Option<String>,
  pub name:        Option<String>,
  pub criticality: Option<Option<String>>,
  pub owner:       Option<Option<String>>,
  pub sla:         Option<Option<String>>,
  pub status:      Option<Option<String>>,
}

impl ServicePatch {
  pub fn check(&self) -> Result<()> {
    if self.code.as_deref().is_some_and(|c| c.trim().is_empty()) {
      return Err(Error::bad_request("service code required"));
    }
    if self.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
      return Err(Error::bad_request("service name required"));
    }
    Ok(())
  }

  pub fn apply_to(&self, svc: &mut Service) {
    if let Some(v) = &self.code {
      svc.code = v.trim().to_owned();
    }
    if let Some(v) = &self.name {
      svc.name = v.trim().to_owned();
    }
    if let Some(v) = &self.criticality {
      svc.criticality = v.clone();
    }
    if let Some(v) = &self.owner {
      svc.owner = v.clone();
    }
    if let Some(v) = &self.sla {
      svc.sla = v.clone();
    }
    if let Some(v) = &self.status {
      svc.status = v.clone();
    }
  }
}

/// A CI's membership in a service, with an optional role such as
/// `frontend` or `database`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceMember {
  pub id:         Uuid,
  pub service_id: Uuid,
  pub ci_id:      Uuid,
  pub role:       Option<String>,
  pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn patch_trims_and_clears() {
    let mut svc = Service {
      id:          Uuid::new_v4(),
      code:        "billing".into(),
      name:        "Billing".into(),
      criticality: Some("high".into()),
      owner:       None,
      sla:         None,
      status:      None,
      created_at:  Utc::now(),
    };
    let patch = ServicePatch {
      name: Some("  Billing v2 ".into()),
      criticality: Some(None),
      ..Default::default()
    };
    patch.check().unwrap();
    patch.apply_to(&mut svc);
    assert_eq!(svc.name, "Billing v2");
    assert_eq!(svc.criticality, None);
  }

  #[test]
  fn blank_service_rejected() {
    assert!(NewService::new("", "x").normalized().is_err());
    assert!(ServicePatch { name: Some(" ".into()), ..Default::default() }
      .check()
      .is_err());
  }
}
