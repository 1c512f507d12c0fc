//! Set diff between two reconstructed link-set snapshots.
//!
//! Used only to annotate what a change attached or detached; what is
//! persisted is decided by the link rows themselves.

use std::collections::BTreeSet;

use serde::Serialize;

/// Members gained and lost between two snapshots of a set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SetDiff<T: Ord> {
  pub added:   BTreeSet<T>,
  pub removed: BTreeSet<T>,
}

impl<T: Ord> SetDiff<T> {
  pub fn is_empty(&self) -> bool {
    self.added.is_empty() && self.removed.is_empty()
  }
}

/// `added = after − before`, `removed = before − after`.
pub fn diff<T: Ord + Clone>(
  before: &BTreeSet<T>,
  after: &BTreeSet<T>,
) -> SetDiff<T> {
  SetDiff {
    added:   after.difference(before).cloned().collect(),
    removed: before.difference(after).cloned().collect(),
  }
}
