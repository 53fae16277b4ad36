//! `cmdb`: command-line front end for the CMDB store.
//!
//! Every command prints its result as JSON on stdout.
//!
//! # Usage
//!
//! ```
//! cmdb type create server "Server"
//! cmdb version draft <TYPE_ID>
//! cmdb ci create --type <TYPE_ID> --name web-01 --code SRV-001 --attrs '{"owner":"ops"}'
//! cmdb graph impact <CI_ID>
//! ```

mod commands;
mod config;

use std::path::PathBuf;

use anyhow::Context as _;
use clap::Parser;
use cmdb_store_sqlite::SqliteStore;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::{commands::Command, config::CmdbConfig};

#[derive(Parser)]
#[command(name = "cmdb", author, version, about = "Configuration management database")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "cmdb.toml")]
  config: PathBuf,

  /// Override the actor recorded in the audit trail.
  #[arg(long, env = "CMDB_ACTOR")]
  actor: Option<String>,

  /// Correlation id recorded in the audit trail (default: random).
  #[arg(long)]
  correlation_id: Option<String>,

  #[command(subcommand)]
  command: Command,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Logs go to stderr so stdout stays valid JSON.
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let cfg = CmdbConfig::load(&cli.config)?;

  let store = SqliteStore::open(&cfg.store_path)
    .await
    .with_context(|| format!("failed to open store at {:?}", cfg.store_path))?;

  let ctx = cmdb_core::event::Context::new(
    cli.actor.unwrap_or_else(|| cfg.actor.clone()),
    cli
      .correlation_id
      .unwrap_or_else(|| Uuid::new_v4().to_string()),
  );

  let output = match commands::run(cli.command, store, &cfg, &ctx).await {
    Ok(output) => output,
    Err(err) => {
      if let Some(core) = err.downcast_ref::<cmdb_core::Error>()
        && !core.field_errors().is_empty()
      {
        eprintln!("{}", serde_json::to_string_pretty(core.field_errors())?);
      }
      return Err(err);
    }
  };
  println!("{}", serde_json::to_string_pretty(&output)?);
  Ok(())
}
