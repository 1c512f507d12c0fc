//! Revisions, activity entries and the write context that ties them to one
//! logical user action.
//!
//! Revisions are immutable. A logical delete, archive or restore of an
//! entity is itself recorded as a new revision; nothing is ever rewritten.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  kind::{Action, EntityKind},
  snapshot::Snapshot,
};

// ─── Write context ───────────────────────────────────────────────────────────

/// One logical user action at the write boundary.
///
/// Every row written under the same context shares its actor, its instant
/// and its `change_id`, so a bulk submission (e.g. selecting several
/// academic years at once) is recognisable as one event when reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeContext {
  pub change_id: Uuid,
  pub actor_id:  Uuid,
  pub at:        DateTime<Utc>,
}

impl ChangeContext {
  /// A fresh context stamped with the current time.
  pub fn new(actor_id: Uuid) -> Self { Self::at(actor_id, Utc::now()) }

  /// A fresh context stamped with `at`. Timestamps are stored with
  /// microsecond precision, so sub-microsecond digits are dropped here.
  pub fn at(actor_id: Uuid, at: DateTime<Utc>) -> Self {
    Self {
      change_id: Uuid::new_v4(),
      actor_id,
      at: at.trunc_subsecs(6),
    }
  }
}

// ─── Revision ────────────────────────────────────────────────────────────────

/// An immutable snapshot of one entity's fields at one moment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Revision {
  pub revision_id:     Uuid,
  pub entity_id:       Uuid,
  /// Starts at 1 and increases by exactly one per write to this entity.
  pub revision_number: u32,
  pub revision_at:     DateTime<Utc>,
  pub action:          Action,
  pub changed_by:      Uuid,
  pub snapshot:        Snapshot,
}

impl Revision {
  pub fn kind(&self) -> EntityKind { self.snapshot.kind() }
}

/// Input to [`crate::store::AuditStore::record`]. The revision number and
/// timestamp are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewRevision {
  pub entity_id: Uuid,
  pub action:    Action,
  pub snapshot:  Snapshot,
}

impl NewRevision {
  pub fn new(entity_id: Uuid, action: Action, snapshot: Snapshot) -> Self {
    Self { entity_id, action, snapshot }
  }
}

// ─── Activity log ────────────────────────────────────────────────────────────

/// A pointer from the cross-entity timeline to one revision. Exactly one is
/// written per physical row write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityLogEntry {
  /// Monotonic insertion id; breaks ties between equal `changed_at`.
  pub log_id:          i64,
  pub subject_kind:    EntityKind,
  pub subject_id:      Uuid,
  pub revision_kind:   EntityKind,
  pub revision_id:     Uuid,
  pub entity_id:       Uuid,
  pub revision_number: u32,
  pub action:          Action,
  pub changed_at:      DateTime<Utc>,
  pub changed_by:      Uuid,
  /// Correlation id of the logical user action; absent on rows imported
  /// from systems that did not record one.
  pub change_id:       Option<Uuid>,
}
