//! Runtime configuration: an optional TOML file overlaid by `CMDB_*`
//! environment variables.

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use anyhow::Context as _;
use cmdb_core::relationship::ImpactLimits;
use serde::Deserialize;

#[derive(Deserialize, Clone, Debug)]
pub struct CmdbConfig {
  /// SQLite database file. `~/` is expanded.
  pub store_path:       PathBuf,
  /// Recorded as the actor of every audit event.
  pub actor:            String,
  pub impact_max_nodes: usize,
  /// Wall-clock budget for impact analysis; unbounded if absent.
  #[serde(default)]
  pub impact_budget_ms: Option<u64>,
}

impl CmdbConfig {
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let defaults = ImpactLimits::default();
    let settings = config::Config::builder()
      .set_default("store_path", "cmdb.db")?
      .set_default("actor", "cli")?
      .set_default("impact_max_nodes", defaults.max_nodes as i64)?
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix("CMDB"))
      .build()
      .context("failed to read config file")?;

    let mut cfg: Self = settings
      .try_deserialize()
      .context("failed to deserialise CmdbConfig")?;
    cfg.store_path = expand_tilde(&cfg.store_path);
    Ok(cfg)
  }

  pub fn impact_limits(&self) -> ImpactLimits {
    ImpactLimits {
      max_nodes: self.impact_max_nodes,
      budget:    self.impact_budget_ms.map(Duration::from_millis),
    }
  }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
