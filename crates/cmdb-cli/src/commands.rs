//! Subcommands and their dispatch onto the managers.

use anyhow::Context as _;
use chrono::NaiveDate;
use clap::{Args, Subcommand};
use cmdb_core::{
  ci::{CiFilter, CiPatch, CiStatus, Environment, NewCi},
  engine::{CiManager, RelationshipGraph, SchemaManager, ServiceMapper},
  event::Context,
  relationship::{
    Direction, NewRelationship, NewRelationshipType, RelStatus,
    RelationshipTypePatch,
  },
  schema::{AttrDefPatch, NewAttrDef, NewCiType},
  service::{NewService, ServicePatch},
};
use cmdb_store_sqlite::SqliteStore;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::config::CmdbConfig;

// ─── Command tree ────────────────────────────────────────────────────────────

#[derive(Subcommand)]
pub enum Command {
  /// CI types.
  #[command(subcommand)]
  Type(TypeCommand),
  /// Schema versions of a CI type.
  #[command(subcommand)]
  Version(VersionCommand),
  /// Attribute definitions of a schema version.
  #[command(subcommand)]
  Def(DefCommand),
  /// Configuration items.
  #[command(subcommand)]
  Ci(CiCommand),
  /// Relationship types.
  #[command(subcommand)]
  RelType(RelTypeCommand),
  /// Relationships between CIs.
  #[command(subcommand)]
  Rel(RelCommand),
  /// Graph traversals.
  #[command(subcommand)]
  Graph(GraphCommand),
  /// Business services and their members.
  #[command(subcommand)]
  Service(ServiceCommand),
  /// The audit trail, oldest first.
  Events {
    /// Only events about this entity.
    #[arg(long)]
    entity: Option<Uuid>,
  },
}

#[derive(Subcommand)]
pub enum TypeCommand {
  Create {
    code:        String,
    name:        String,
    #[arg(long)]
    description: Option<String>,
  },
  List,
  Get {
    id: Uuid,
  },
}

#[derive(Subcommand)]
pub enum VersionCommand {
  /// Versions of a type, newest first.
  List { type_id: Uuid },
  Get { id: Uuid },
  /// Create the next draft, seeded from the active version.
  Draft { type_id: Uuid },
  /// Make a version the single active version of its type.
  Publish { id: Uuid },
}

#[derive(Subcommand)]
pub enum DefCommand {
  List {
    version_id: Uuid,
  },
  /// Add one definition, or several if `--json` holds an array.
  Add {
    version_id: Uuid,
    /// Definition(s) as JSON.
    #[arg(long)]
    json:       String,
  },
  Update {
    id:   Uuid,
    /// Patch as JSON.
    #[arg(long)]
    json: String,
  },
  Delete {
    id: Uuid,
  },
}

#[derive(Subcommand)]
pub enum CiCommand {
  Create {
    #[arg(long = "type")]
    type_id:     Uuid,
    #[arg(long)]
    name:        String,
    #[arg(long)]
    code:        String,
    #[arg(long)]
    status:      Option<CiStatus>,
    #[arg(long)]
    environment: Option<Environment>,
    #[arg(long)]
    asset:       Option<String>,
    #[arg(long)]
    location:    Option<String>,
    #[arg(long)]
    owner_team:  Option<String>,
    #[arg(long)]
    notes:       Option<String>,
    /// Attribute values as a JSON object.
    #[arg(long)]
    attrs:       Option<String>,
  },
  /// Patch a CI. An empty string clears a nullable field.
  Update {
    id:          Uuid,
    #[arg(long = "type")]
    type_id:     Option<Uuid>,
    #[arg(long)]
    name:        Option<String>,
    #[arg(long)]
    code:        Option<String>,
    #[arg(long)]
    status:      Option<CiStatus>,
    #[arg(long)]
    environment: Option<Environment>,
    #[arg(long)]
    asset:       Option<String>,
    #[arg(long)]
    location:    Option<String>,
    #[arg(long)]
    owner_team:  Option<String>,
    #[arg(long)]
    notes:       Option<String>,
    #[arg(long)]
    attrs:       Option<String>,
  },
  /// A CI with its attributes and active schema.
  Get {
    id:            Uuid,
    #[arg(long)]
    relationships: bool,
  },
  List(ListArgs),
  /// Look a CI up by asset id.
  Resolve {
    asset_id: String,
  },
}

#[derive(Args)]
pub struct ListArgs {
  #[arg(long = "type")]
  type_id:     Option<Uuid>,
  #[arg(long)]
  status:      Option<CiStatus>,
  #[arg(long)]
  environment: Option<Environment>,
  /// Case-insensitive search over name and code.
  #[arg(short, long)]
  q:           Option<String>,
  #[arg(long)]
  page:        Option<u32>,
  #[arg(long)]
  limit:       Option<u32>,
}

#[derive(Subcommand)]
pub enum RelTypeCommand {
  List,
  Create {
    code:         String,
    name:         String,
    #[arg(long)]
    reverse_name: Option<String>,
    #[arg(long)]
    from_type:    Option<Uuid>,
    #[arg(long)]
    to_type:      Option<Uuid>,
  },
  Update {
    id:   Uuid,
    /// Patch as JSON.
    #[arg(long)]
    json: String,
  },
  Delete {
    id: Uuid,
  },
}

#[derive(Subcommand)]
pub enum RelCommand {
  Create {
    rel_type_id: Uuid,
    from:        Uuid,
    to:          Uuid,
    /// `YYYY-MM-DD`.
    #[arg(long)]
    since:       Option<NaiveDate>,
    #[arg(long)]
    note:        Option<String>,
  },
  Retire {
    id: Uuid,
  },
  /// Active relationships of one CI, or every relationship.
  List {
    #[arg(long)]
    ci:     Option<Uuid>,
    #[arg(long)]
    status: Option<RelStatus>,
  },
}

#[derive(Subcommand)]
pub enum GraphCommand {
  /// Neighbourhood of a CI.
  Walk {
    ci_id:     Uuid,
    #[arg(long, default_value_t = 1)]
    depth:     u32,
    #[arg(long, default_value_t = Direction::Both)]
    direction: Direction,
  },
  Full,
  /// A single chain of dependencies.
  Path {
    ci_id:     Uuid,
    #[arg(long)]
    direction: Direction,
  },
  /// Everything connected to a CI.
  Impact {
    ci_id: Uuid,
  },
}

#[derive(Subcommand)]
pub enum ServiceCommand {
  Create {
    code:        String,
    name:        String,
    #[arg(long)]
    criticality: Option<String>,
    #[arg(long)]
    owner:       Option<String>,
    #[arg(long)]
    sla:         Option<String>,
    #[arg(long)]
    status:      Option<String>,
  },
  Update {
    id:   Uuid,
    /// Patch as JSON.
    #[arg(long)]
    json: String,
  },
  Get {
    id: Uuid,
  },
  List,
  AddMember {
    service_id: Uuid,
    ci_id:      Uuid,
    #[arg(long)]
    role:       Option<String>,
  },
  RemoveMember {
    member_id: Uuid,
  },
  Members {
    service_id: Uuid,
  },
  /// Union of the members' neighbourhoods.
  Impact {
    service_id: Uuid,
    #[arg(long, default_value_t = 1)]
    depth:      u32,
    #[arg(long, default_value_t = Direction::Both)]
    direction:  Direction,
  },
}

// ─── Dispatch ────────────────────────────────────────────────────────────────

pub async fn run(
  command: Command,
  store: SqliteStore,
  cfg: &CmdbConfig,
  ctx: &Context,
) -> anyhow::Result<Value> {
  match command {
    Command::Type(cmd) => run_type(cmd, schemas(&store), ctx).await,
    Command::Version(cmd) => run_version(cmd, schemas(&store), ctx).await,
    Command::Def(cmd) => run_def(cmd, schemas(&store), ctx).await,
    Command::Ci(cmd) => {
      run_ci(cmd, CiManager::with_events(store.clone(), store), ctx).await
    }
    Command::RelType(cmd) => run_rel_type(cmd, graph(&store, cfg), ctx).await,
    Command::Rel(cmd) => run_rel(cmd, graph(&store, cfg), ctx).await,
    Command::Graph(cmd) => run_graph(cmd, graph(&store, cfg)).await,
    Command::Service(cmd) => {
      run_service(cmd, ServiceMapper::with_events(store.clone(), store), ctx)
        .await
    }
    Command::Events { entity } => to_json(store.list_events(entity).await?),
  }
}

type Schemas = SchemaManager<SqliteStore, SqliteStore>;
type Graph = RelationshipGraph<SqliteStore, SqliteStore>;

fn schemas(store: &SqliteStore) -> Schemas {
  SchemaManager::with_events(store.clone(), store.clone())
}

fn graph(store: &SqliteStore, cfg: &CmdbConfig) -> Graph {
  RelationshipGraph::with_events(store.clone(), store.clone())
    .with_limits(cfg.impact_limits())
}

async fn run_type(cmd: TypeCommand, m: Schemas, ctx: &Context) -> anyhow::Result<Value> {
  match cmd {
    TypeCommand::Create { code, name, description } => {
      let input = NewCiType { description, ..NewCiType::new(code, name) };
      to_json(m.create_type(input, ctx).await?)
    }
    TypeCommand::List => to_json(m.list_types().await?),
    TypeCommand::Get { id } => to_json(m.get_type(id).await?),
  }
}

async fn run_version(
  cmd: VersionCommand,
  m: Schemas,
  ctx: &Context,
) -> anyhow::Result<Value> {
  match cmd {
    VersionCommand::List { type_id } => to_json(m.list_versions(type_id).await?),
    VersionCommand::Get { id } => to_json(m.get_version(id).await?),
    VersionCommand::Draft { type_id } => {
      to_json(m.create_draft_version(type_id, ctx).await?)
    }
    VersionCommand::Publish { id } => to_json(m.publish_version(id, ctx).await?),
  }
}

async fn run_def(cmd: DefCommand, m: Schemas, ctx: &Context) -> anyhow::Result<Value> {
  match cmd {
    DefCommand::List { version_id } => to_json(m.list_attr_defs(version_id).await?),
    DefCommand::Add { version_id, json } => {
      match parse::<Value>(&json, "definition")? {
        Value::Array(items) => {
          let inputs: Vec<NewAttrDef> = serde_json::from_value(Value::Array(items))
            .context("invalid attribute definitions")?;
          to_json(m.bulk_add_attr_defs(version_id, inputs, ctx).await?)
        }
        single => {
          let input: NewAttrDef = serde_json::from_value(single)
            .context("invalid attribute definition")?;
          to_json(m.add_attr_def(version_id, input, ctx).await?)
        }
      }
    }
    DefCommand::Update { id, json } => {
      let patch: AttrDefPatch = parse(&json, "attribute definition patch")?;
      to_json(m.update_attr_def(id, patch, ctx).await?)
    }
    DefCommand::Delete { id } => {
      m.soft_delete_attr_def(id, ctx).await?;
      Ok(Value::Null)
    }
  }
}

async fn run_ci(
  cmd: CiCommand,
  m: CiManager<SqliteStore, SqliteStore>,
  ctx: &Context,
) -> anyhow::Result<Value> {
  match cmd {
    CiCommand::Create {
      type_id,
      name,
      code,
      status,
      environment,
      asset,
      location,
      owner_team,
      notes,
      attrs,
    } => {
      let base = NewCi::new(type_id, name, code);
      let input = NewCi {
        status: status.unwrap_or(base.status),
        environment: environment.unwrap_or(base.environment),
        asset_id: asset,
        location_id: location,
        owner_team,
        notes,
        ..base
      };
      let attrs = attrs.as_deref().map(parse_attrs).transpose()?.unwrap_or_default();
      to_json(m.create_ci(input, attrs, ctx).await?)
    }
    CiCommand::Update {
      id,
      type_id,
      name,
      code,
      status,
      environment,
      asset,
      location,
      owner_team,
      notes,
      attrs,
    } => {
      let patch = CiPatch {
        type_id,
        name,
        ci_code: code,
        status,
        environment,
        asset_id: nullable(asset),
        location_id: nullable(location),
        owner_team: nullable(owner_team),
        notes: nullable(notes),
      };
      let attrs = attrs.as_deref().map(parse_attrs).transpose()?;
      to_json(m.update_ci(id, patch, attrs, ctx).await?)
    }
    CiCommand::Get { id, relationships } => {
      to_json(m.get_ci_detail(id, relationships).await?)
    }
    CiCommand::List(args) => {
      let filter = CiFilter {
        type_id:     args.type_id,
        status:      args.status,
        environment: args.environment,
        q:           args.q,
        page:        args.page,
        limit:       args.limit,
      };
      to_json(m.list_cis(&filter).await?)
    }
    CiCommand::Resolve { asset_id } => to_json(m.resolve_ci_by_asset(&asset_id).await?),
  }
}

async fn run_rel_type(
  cmd: RelTypeCommand,
  g: Graph,
  ctx: &Context,
) -> anyhow::Result<Value> {
  match cmd {
    RelTypeCommand::List => to_json(g.list_relationship_types().await?),
    RelTypeCommand::Create { code, name, reverse_name, from_type, to_type } => {
      let input = NewRelationshipType {
        reverse_name,
        allowed_from_type_id: from_type,
        allowed_to_type_id: to_type,
        ..NewRelationshipType::new(code, name)
      };
      to_json(g.create_relationship_type(input, ctx).await?)
    }
    RelTypeCommand::Update { id, json } => {
      let patch: RelationshipTypePatch = parse(&json, "relationship type patch")?;
      to_json(g.update_relationship_type(id, patch, ctx).await?)
    }
    RelTypeCommand::Delete { id } => {
      g.delete_relationship_type(id, ctx).await?;
      Ok(Value::Null)
    }
  }
}

async fn run_rel(cmd: RelCommand, g: Graph, ctx: &Context) -> anyhow::Result<Value> {
  match cmd {
    RelCommand::Create { rel_type_id, from, to, since, note } => {
      let input = NewRelationship {
        since_date: since,
        note,
        ..NewRelationship::new(rel_type_id, from, to)
      };
      to_json(g.create_relationship(input, ctx).await?)
    }
    RelCommand::Retire { id } => to_json(g.retire_relationship(id, ctx).await?),
    RelCommand::List { ci: Some(ci_id), .. } => {
      to_json(g.list_ci_relationships(ci_id).await?)
    }
    RelCommand::List { ci: None, status } => {
      to_json(g.list_relationships(status).await?)
    }
  }
}

async fn run_graph(cmd: GraphCommand, g: Graph) -> anyhow::Result<Value> {
  match cmd {
    GraphCommand::Walk { ci_id, depth, direction } => {
      to_json(g.get_graph(ci_id, depth, direction).await?)
    }
    GraphCommand::Full => to_json(g.get_full_graph().await?),
    GraphCommand::Path { ci_id, direction } => {
      to_json(g.get_dependency_path(ci_id, direction).await?)
    }
    GraphCommand::Impact { ci_id } => to_json(g.get_impact_analysis(ci_id).await?),
  }
}

async fn run_service(
  cmd: ServiceCommand,
  m: ServiceMapper<SqliteStore, SqliteStore>,
  ctx: &Context,
) -> anyhow::Result<Value> {
  match cmd {
    ServiceCommand::Create { code, name, criticality, owner, sla, status } => {
      let input = NewService {
        criticality,
        owner,
        sla,
        status,
        ..NewService::new(code, name)
      };
      to_json(m.create_service(input, ctx).await?)
    }
    ServiceCommand::Update { id, json } => {
      let patch: ServicePatch = parse(&json, "service patch")?;
      to_json(m.update_service(id, patch, ctx).await?)
    }
    ServiceCommand::Get { id } => to_json(m.get_service(id).await?),
    ServiceCommand::List => to_json(m.list_services().await?),
    ServiceCommand::AddMember { service_id, ci_id, role } => {
      to_json(m.add_member(service_id, ci_id, role, ctx).await?)
    }
    ServiceCommand::RemoveMember { member_id } => {
      m.remove_member(member_id, ctx).await?;
      Ok(Value::Null)
    }
    ServiceCommand::Members { service_id } => to_json(m.list_members(service_id).await?),
    ServiceCommand::Impact { service_id, depth, direction } => {
      to_json(m.service_impact(service_id, depth, direction).await?)
    }
  }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn to_json<T: Serialize>(value: T) -> anyhow::Result<Value> {
  Ok(serde_json::to_value(value)?)
}

fn parse<T: DeserializeOwned>(raw: &str, what: &str) -> anyhow::Result<T> {
  serde_json::from_str(raw).with_context(|| format!("invalid {what} JSON"))
}

fn parse_attrs(raw: &str) -> anyhow::Result<Map<String, Value>> {
  parse(raw, "attributes")
}

/// `Some("")` clears the field.
fn nullable(value: Option<String>) -> Option<Option<String>> {
  value.map(|v| Some(v).filter(|v| !v.is_empty()))
}
