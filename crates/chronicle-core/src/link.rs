//! Tombstoned link rows and the as-of predicate over them.
//!
//! Link rows are not versioned as snapshots. A row is created when a target
//! joins a set and tombstoned (its `deleted_at` set) when it leaves; it is
//! never removed, so membership at any past instant can be reconstructed.

use std::collections::BTreeSet;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::kind::LinkKind;

/// One membership of `target_id` in the link set `set_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRow {
  pub link_id:    Uuid,
  pub kind:       LinkKind,
  pub set_id:     Uuid,
  pub target_id:  Uuid,
  pub created_at: DateTime<Utc>,
  pub deleted_at: Option<DateTime<Utc>>,
}

impl LinkRow {
  /// `None` means "now": the row is active iff it is not tombstoned.
  /// Otherwise the row is active at `t` iff `created_at <= t` and it was
  /// not yet tombstoned at `t`.
  pub fn is_active_at(&self, at: Option<DateTime<Utc>>) -> bool {
    match at {
      None => self.deleted_at.is_none(),
      Some(t) => {
        self.created_at <= t && self.deleted_at.is_none_or(|d| d > t)
      }
    }
  }
}

/// The targets of `rows` that were active at `at`.
pub fn active_targets<'a>(
  rows: impl IntoIterator<Item = &'a LinkRow>,
  at: Option<DateTime<Utc>>,
) -> BTreeSet<Uuid> {
  rows
    .into_iter()
    .filter(|row| row.is_active_at(at))
    .map(|row| row.target_id)
    .collect()
}

/// The instant at which to reconstruct a set for its owner's creation event.
///
/// There is no "before" state for a creation, and the links written by the
/// same action can land in the same millisecond as the owner itself, so the
/// reconstruction is taken slightly after: halfway to the next revision when
/// there is one, otherwise `epsilon` after creation.
pub fn creation_instant(
  created_at: DateTime<Utc>,
  next_revision_at: Option<DateTime<Utc>>,
  epsilon: TimeDelta,
) -> DateTime<Utc> {
  match next_revision_at {
    Some(next) if next > created_at => created_at + (next - created_at) / 2,
    _ => created_at + epsilon,
  }
}

/// The instant used for "what the set looked like just before `at`".
pub fn previous_instant(at: DateTime<Utc>, epsilon: TimeDelta) -> DateTime<Utc> {
  at - epsilon
}
