//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC strings with
//! microsecond precision, so lexical order in SQL equals chronological
//! order. Snapshots are stored as their JSON payload without the kind tag;
//! the table they live in carries the kind. UUIDs are stored as hyphenated
//! lowercase strings.

use chrono::{DateTime, SecondsFormat, Utc};
use chronicle_core::{
  kind::{Action, EntityKind, LinkKind},
  link::LinkRow,
  revision::{ActivityLogEntry, ChangeContext, NewRevision, Revision},
  snapshot::Snapshot,
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Revision number ─────────────────────────────────────────────────────────

pub fn decode_revision_number(n: i64) -> Result<u32> {
  u32::try_from(n)
    .ok()
    .filter(|n| *n >= 1)
    .ok_or_else(|| Error::Corrupt(format!("revision number {n}")))
}

// ─── Write rows ──────────────────────────────────────────────────────────────

/// Everything needed to insert one revision and its activity entry, encoded
/// up front so the blocking closure only moves strings.
#[derive(Debug, Clone)]
pub struct RevisionWrite {
  pub kind:                EntityKind,
  pub revision_id:         String,
  pub entity_id:           String,
  pub revision_at:         String,
  pub action:              &'static str,
  pub changed_by:          String,
  pub change_id:           String,
  pub snapshot_json:       String,
  pub provider_id:         Option<String>,
  pub partner_provider_id: Option<String>,
  pub subject_kind:        &'static str,
  pub subject_id:          String,
}

impl RevisionWrite {
  pub fn new(
    ctx: ChangeContext,
    revision_id: Uuid,
    input: &NewRevision,
  ) -> Result<Self> {
    let (subject_kind, subject_id) = input.snapshot.subject(input.entity_id);
    let (provider_id, partner_provider_id) = input.snapshot.provider_refs();
    Ok(Self {
      kind: input.snapshot.kind(),
      revision_id: encode_uuid(revision_id),
      entity_id: encode_uuid(input.entity_id),
      revision_at: encode_dt(ctx.at),
      action: input.action.as_str(),
      changed_by: encode_uuid(ctx.actor_id),
      change_id: encode_uuid(ctx.change_id),
      snapshot_json: input.snapshot.to_json()?.to_string(),
      provider_id: provider_id.map(encode_uuid),
      partner_provider_id: partner_provider_id.map(encode_uuid),
      subject_kind: subject_kind.as_str(),
      subject_id: encode_uuid(subject_id),
    })
  }

  /// Allocate the next revision number for the entity, insert the revision,
  /// then append its activity entry. Must run inside a write transaction.
  /// Returns the allocated revision number.
  pub fn execute(&self, conn: &rusqlite::Connection) -> rusqlite::Result<i64> {
    let table = self.kind.revision_table();

    let number: i64 = conn.query_row(
      &format!(
        "SELECT COALESCE(MAX(revision_number), 0) + 1 FROM {table}
         WHERE entity_id = ?1"
      ),
      rusqlite::params![self.entity_id],
      |r| r.get(0),
    )?;

    conn.execute(
      &format!(
        "INSERT INTO {table} (
           revision_id, entity_id, revision_number, revision_at, action,
           changed_by, snapshot_json, provider_id, partner_provider_id
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
      ),
      rusqlite::params![
        self.revision_id,
        self.entity_id,
        number,
        self.revision_at,
        self.action,
        self.changed_by,
        self.snapshot_json,
        self.provider_id,
        self.partner_provider_id,
      ],
    )?;

    conn.execute(
      "INSERT INTO activity_log (
         subject_kind, subject_id, revision_kind, revision_id, entity_id,
         revision_number, action, changed_at, changed_by, change_id
       ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
      rusqlite::params![
        self.subject_kind,
        self.subject_id,
        self.kind.as_str(),
        self.revision_id,
        self.entity_id,
        number,
        self.action,
        self.revision_at,
        self.changed_by,
        self.change_id,
      ],
    )?;

    Ok(number)
  }
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Column list matching [`RawRevision::from_row`].
pub const REVISION_COLUMNS: &str = "revision_id, entity_id, revision_number, \
                                    revision_at, action, changed_by, \
                                    snapshot_json";

/// Raw values read directly from a revision table row.
#[derive(Debug)]
pub struct RawRevision {
  pub revision_id:     String,
  pub entity_id:       String,
  pub revision_number: i64,
  pub revision_at:     String,
  pub action:          String,
  pub changed_by:      String,
  pub snapshot_json:   String,
}

impl RawRevision {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      revision_id:     row.get(0)?,
      entity_id:       row.get(1)?,
      revision_number: row.get(2)?,
      revision_at:     row.get(3)?,
      action:          row.get(4)?,
      changed_by:      row.get(5)?,
      snapshot_json:   row.get(6)?,
    })
  }

  /// Decode into a [`Revision`]; `kind` is the kind of the table the row
  /// was read from.
  pub fn into_revision(self, kind: EntityKind) -> Result<Revision> {
    let fields: serde_json::Value = serde_json::from_str(&self.snapshot_json)?;
    Ok(Revision {
      revision_id:     decode_uuid(&self.revision_id)?,
      entity_id:       decode_uuid(&self.entity_id)?,
      revision_number: decode_revision_number(self.revision_number)?,
      revision_at:     decode_dt(&self.revision_at)?,
      action:          Action::parse(&self.action)?,
      changed_by:      decode_uuid(&self.changed_by)?,
      snapshot:        Snapshot::from_parts(kind.as_str(), fields)?,
    })
  }
}

/// Column list matching [`RawActivity::from_row`], qualified with the `a`
/// alias used by every activity query.
pub const ACTIVITY_COLUMNS: &str = "a.log_id, a.subject_kind, a.subject_id, \
                                    a.revision_kind, a.revision_id, \
                                    a.entity_id, a.revision_number, \
                                    a.action, a.changed_at, a.changed_by, \
                                    a.change_id";

/// Raw values read directly from an `activity_log` row.
#[derive(Debug)]
pub struct RawActivity {
  pub log_id:          i64,
  pub subject_kind:    String,
  pub subject_id:      String,
  pub revision_kind:   String,
  pub revision_id:     String,
  pub entity_id:       String,
  pub revision_number: i64,
  pub action:          String,
  pub changed_at:      String,
  pub changed_by:      String,
  pub change_id:       Option<String>,
}

impl RawActivity {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      log_id:          row.get(0)?,
      subject_kind:    row.get(1)?,
      subject_id:      row.get(2)?,
      revision_kind:   row.get(3)?,
      revision_id:     row.get(4)?,
      entity_id:       row.get(5)?,
      revision_number: row.get(6)?,
      action:          row.get(7)?,
      changed_at:      row.get(8)?,
      changed_by:      row.get(9)?,
      change_id:       row.get(10)?,
    })
  }

  pub fn into_entry(self) -> Result<ActivityLogEntry> {
    Ok(ActivityLogEntry {
      log_id:          self.log_id,
      subject_kind:    EntityKind::parse(&self.subject_kind)?,
      subject_id:      decode_uuid(&self.subject_id)?,
      revision_kind:   EntityKind::parse(&self.revision_kind)?,
      revision_id:     decode_uuid(&self.revision_id)?,
      entity_id:       decode_uuid(&self.entity_id)?,
      revision_number: decode_revision_number(self.revision_number)?,
      action:          Action::parse(&self.action)?,
      changed_at:      decode_dt(&self.changed_at)?,
      changed_by:      decode_uuid(&self.changed_by)?,
      change_id:       self.change_id.as_deref().map(decode_uuid).transpose()?,
    })
  }
}

/// Column list matching [`RawLinkRow::from_row`].
pub const LINK_COLUMNS: &str = "link_id, set_id, target_id, created_at, \
                                deleted_at";

/// Raw values read directly from a link table row.
#[derive(Debug)]
pub struct RawLinkRow {
  pub link_id:    String,
  pub set_id:     String,
  pub target_id:  String,
  pub created_at: String,
  pub deleted_at: Option<String>,
}

impl RawLinkRow {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      link_id:    row.get(0)?,
      set_id:     row.get(1)?,
      target_id:  row.get(2)?,
      created_at: row.get(3)?,
      deleted_at: row.get(4)?,
    })
  }

  pub fn into_link_row(self, kind: LinkKind) -> Result<LinkRow> {
    Ok(LinkRow {
      link_id: decode_uuid(&self.link_id)?,
      kind,
      set_id: decode_uuid(&self.set_id)?,
      target_id: decode_uuid(&self.target_id)?,
      created_at: decode_dt(&self.created_at)?,
      deleted_at: self.deleted_at.as_deref().map(decode_dt).transpose()?,
    })
  }
}
