//! SQL schema for the CMDB SQLite store.
//!
//! Executed once at connection startup. `PRAGMA user_version` records the
//! schema revision so later migrations can be gated on it.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS ci_types (
    type_id     TEXT PRIMARY KEY,
    code        TEXT NOT NULL UNIQUE,
    name        TEXT NOT NULL,
    description TEXT,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS ci_type_versions (
    version_id  TEXT PRIMARY KEY,
    type_id     TEXT NOT NULL REFERENCES ci_types(type_id),
    version     INTEGER NOT NULL CHECK (version >= 1),
    status      TEXT NOT NULL,   -- 'draft' | 'active' | 'retired'
    created_by  TEXT,
    created_at  TEXT NOT NULL,
    UNIQUE (type_id, version)
);

-- At most one active version per type.
CREATE UNIQUE INDEX IF NOT EXISTS ci_type_versions_active_idx
    ON ci_type_versions(type_id) WHERE status = 'active';

-- Definitions are soft-deleted via is_active; rows are never removed.
CREATE TABLE IF NOT EXISTS attr_defs (
    def_id        TEXT PRIMARY KEY,
    version_id    TEXT NOT NULL REFERENCES ci_type_versions(version_id),
    key           TEXT NOT NULL,
    label         TEXT NOT NULL,
    field_type    TEXT NOT NULL,
    required      INTEGER NOT NULL DEFAULT 0,
    unit          TEXT,
    enum_values   TEXT,            -- JSON array or NULL
    pattern       TEXT,
    min_value     REAL,
    max_value     REAL,
    step_value    REAL,
    min_len       INTEGER,
    max_len       INTEGER,
    precision     INTEGER,
    scale         INTEGER,
    default_value TEXT,            -- JSON or NULL
    is_searchable INTEGER NOT NULL DEFAULT 0,
    is_filterable INTEGER NOT NULL DEFAULT 0,
    sort_order    INTEGER NOT NULL DEFAULT 0,
    is_active     INTEGER NOT NULL DEFAULT 1,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS attr_defs_key_idx
    ON attr_defs(version_id, key) WHERE is_active = 1;

CREATE TABLE IF NOT EXISTS cis (
    ci_id       TEXT PRIMARY KEY,
    type_id     TEXT NOT NULL REFERENCES ci_types(type_id),
    name        TEXT NOT NULL,
    ci_code     TEXT NOT NULL UNIQUE,
    status      TEXT NOT NULL,
    environment TEXT NOT NULL,
    asset_id    TEXT,
    location_id TEXT,
    owner_team  TEXT,
    notes       TEXT,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS cis_type_idx  ON cis(type_id);
CREATE INDEX IF NOT EXISTS cis_asset_idx ON cis(asset_id);

-- One value per (CI, key), pinned to the version it was validated against.
CREATE TABLE IF NOT EXISTS attr_values (
    ci_id       TEXT NOT NULL REFERENCES cis(ci_id),
    version_id  TEXT REFERENCES ci_type_versions(version_id),
    key         TEXT NOT NULL,
    value_json  TEXT NOT NULL,
    updated_at  TEXT NOT NULL,
    PRIMARY KEY (ci_id, key)
);

CREATE TABLE IF NOT EXISTS relationship_types (
    rel_type_id          TEXT PRIMARY KEY,
    code                 TEXT NOT NULL UNIQUE,
    name                 TEXT NOT NULL,
    reverse_name         TEXT,
    allowed_from_type_id TEXT REFERENCES ci_types(type_id),
    allowed_to_type_id   TEXT REFERENCES ci_types(type_id)
);

-- Retirement is a status change; relationships are never deleted.
CREATE TABLE IF NOT EXISTS relationships (
    rel_id      TEXT PRIMARY KEY,
    rel_type_id TEXT NOT NULL REFERENCES relationship_types(rel_type_id),
    from_ci_id  TEXT NOT NULL REFERENCES cis(ci_id),
    to_ci_id    TEXT NOT NULL REFERENCES cis(ci_id),
    since_date  TEXT,             -- YYYY-MM-DD
    note        TEXT,
    status      TEXT NOT NULL,    -- 'active' | 'retired'
    created_at  TEXT NOT NULL,
    CHECK (from_ci_id != to_ci_id)
);

CREATE INDEX IF NOT EXISTS relationships_from_idx ON relationships(from_ci_id);
CREATE INDEX IF NOT EXISTS relationships_to_idx   ON relationships(to_ci_id);
CREATE INDEX IF NOT EXISTS relationships_type_idx ON relationships(rel_type_id);

-- Append-only audit trail.
CREATE TABLE IF NOT EXISTS ops_events (
    event_id       TEXT PRIMARY KEY,
    entity_type    TEXT NOT NULL,
    entity_id      TEXT NOT NULL,
    event_type     TEXT NOT NULL,
    payload_json   TEXT NOT NULL,
    actor_user_id  TEXT NOT NULL,
    correlation_id TEXT NOT NULL,
    created_at     TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS ops_events_entity_idx ON ops_events(entity_id);

CREATE TABLE IF NOT EXISTS services (
    service_id  TEXT PRIMARY KEY,
    code        TEXT NOT NULL UNIQUE,
    name        TEXT NOT NULL,
    criticality TEXT,
    owner       TEXT,
    sla         TEXT,
    status      TEXT,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS service_members (
    member_id   TEXT PRIMARY KEY,
    service_id  TEXT NOT NULL REFERENCES services(service_id),
    ci_id       TEXT NOT NULL REFERENCES cis(ci_id),
    role        TEXT,
    created_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS service_members_service_idx
    ON service_members(service_id);

PRAGMA user_version = 1;
";
