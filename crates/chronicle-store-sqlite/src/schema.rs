//! SQL schema for the Chronicle SQLite store.
//!
//! Executed once at connection startup. Every statement is idempotent
//! (`IF NOT EXISTS`), so reopening an existing file is safe.

use chronicle_core::kind::{EntityKind, LinkKind};
use strum::IntoEnumIterator;

const PRELUDE: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;
";

/// The shared timeline. One row per physical row write; `revision_kind`
/// says which revision table `revision_id` points into.
const ACTIVITY_LOG: &str = "
CREATE TABLE IF NOT EXISTS activity_log (
    log_id          INTEGER PRIMARY KEY AUTOINCREMENT,
    subject_kind    TEXT NOT NULL,
    subject_id      TEXT NOT NULL,
    revision_kind   TEXT NOT NULL,
    revision_id     TEXT NOT NULL,
    entity_id       TEXT NOT NULL,
    revision_number INTEGER NOT NULL,
    action          TEXT NOT NULL,   -- 'create' | 'update' | 'delete'
    changed_at      TEXT NOT NULL,   -- RFC 3339 UTC, microseconds
    changed_by      TEXT NOT NULL,
    change_id       TEXT,
    UNIQUE (revision_kind, revision_id)
);

CREATE INDEX IF NOT EXISTS activity_changed_idx ON activity_log(changed_at, log_id);
CREATE INDEX IF NOT EXISTS activity_subject_idx ON activity_log(subject_id);
CREATE INDEX IF NOT EXISTS activity_entity_idx  ON activity_log(entity_id);
CREATE INDEX IF NOT EXISTS activity_actor_idx   ON activity_log(changed_by);
";

/// Revision tables are strictly append-only: no UPDATE or DELETE is ever
/// issued against them.
fn revision_table(kind: EntityKind) -> String {
  let table = kind.revision_table();
  format!(
    "
CREATE TABLE IF NOT EXISTS {table} (
    revision_id         TEXT PRIMARY KEY,
    entity_id           TEXT NOT NULL,
    revision_number     INTEGER NOT NULL CHECK (revision_number >= 1),
    revision_at         TEXT NOT NULL,
    action              TEXT NOT NULL,
    changed_by          TEXT NOT NULL,
    snapshot_json       TEXT NOT NULL,
    provider_id         TEXT,           -- owning / accredited provider
    partner_provider_id TEXT,           -- training partner (partnerships)
    UNIQUE (entity_id, revision_number)
);

CREATE INDEX IF NOT EXISTS {table}_provider_idx ON {table}(provider_id);
CREATE INDEX IF NOT EXISTS {table}_partner_idx  ON {table}(partner_provider_id);
"
  )
}

/// Link rows are never deleted; removal sets `deleted_at`. At most one
/// active row exists per (set, target).
fn link_table(kind: LinkKind) -> String {
  let table = kind.table();
  format!(
    "
CREATE TABLE IF NOT EXISTS {table} (
    link_id    TEXT PRIMARY KEY,
    set_id     TEXT NOT NULL,
    target_id  TEXT NOT NULL,
    created_at TEXT NOT NULL,
    deleted_at TEXT,
    CHECK (deleted_at IS NULL OR deleted_at >= created_at)
);

CREATE INDEX IF NOT EXISTS {table}_set_idx ON {table}(set_id, created_at);
CREATE UNIQUE INDEX IF NOT EXISTS {table}_active_idx
    ON {table}(set_id, target_id) WHERE deleted_at IS NULL;
"
  )
}

/// Full schema DDL.
pub fn schema() -> String {
  let mut ddl = String::from(PRELUDE);
  ddl.push_str(ACTIVITY_LOG);
  for kind in EntityKind::iter() {
    ddl.push_str(&revision_table(kind));
  }
  for kind in LinkKind::iter() {
    ddl.push_str(&link_table(kind));
  }
  ddl.push_str("\nPRAGMA user_version = 1;\n");
  ddl
}
