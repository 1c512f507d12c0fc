//! The `AuditStore` trait and supporting query types.
//!
//! The trait is implemented by storage backends (e.g.
//! `chronicle-store-sqlite`). The read pipeline in `chronicle-activity`
//! depends on this abstraction, not on any concrete backend.

use std::{collections::BTreeSet, future::Future};

use chrono::{DateTime, TimeDelta, Utc};
use uuid::Uuid;

use crate::{
  kind::{Action, EntityKind, LinkKind},
  link::{LinkRow, previous_instant},
  revision::{ActivityLogEntry, ChangeContext, NewRevision, Revision},
  snapshot::Snapshot,
};

// ─── Query types ─────────────────────────────────────────────────────────────

/// Parameters for [`AuditStore::query_activity`].
#[derive(Debug, Clone, Default)]
pub struct ActivityQuery {
  /// Entries touching this entity: as the subject, as the revised entity,
  /// or through a provider foreign key on the revision (so a provider id
  /// also matches its addresses, contacts, accreditations and
  /// partnerships).
  pub entity_id:     Option<Uuid>,
  /// Entries written by this actor.
  pub actor_id:      Option<Uuid>,
  /// If non-empty, only these revision kinds.
  pub kinds:         Vec<EntityKind>,
  pub exclude_kinds: Vec<EntityKind>,
  pub limit:         Option<usize>,
  pub offset:        Option<usize>,
}

/// An activity entry with its revision loaded.
#[derive(Debug, Clone)]
pub struct HydratedEntry {
  pub entry:    ActivityLogEntry,
  /// `None` when the revision row is missing or could not be decoded.
  pub revision: Option<Revision>,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a Chronicle storage backend.
///
/// Revisions, activity entries and link rows are append-only. The only
/// in-place write is the tombstone on a link row.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes.
pub trait AuditStore: Send + Sync {
  type Error: std::error::Error + From<crate::Error> + Send + Sync + 'static;

  // ── Revision ledger: writes ──────────────────────────────────────────

  /// Write one revision and its activity entry as a single atomic unit.
  ///
  /// The revision number is one greater than the entity's current maximum
  /// and is allocated inside the same transaction as the row write.
  fn record(
    &self,
    ctx: ChangeContext,
    input: NewRevision,
  ) -> impl Future<Output = Result<Revision, Self::Error>> + Send + '_;

  /// The write contract in its boundary form: a kind discriminant and a
  /// JSON field snapshot. Fails with
  /// [`Error::UnknownEntityKind`](crate::Error::UnknownEntityKind) before
  /// anything is written.
  fn record_change(
    &self,
    ctx: ChangeContext,
    kind: &str,
    entity_id: Uuid,
    action: Action,
    fields: serde_json::Value,
  ) -> impl Future<Output = Result<Revision, Self::Error>> + Send + '_ {
    let snapshot = Snapshot::from_parts(kind, fields);
    async move {
      let snapshot = snapshot?;
      self
        .record(ctx, NewRevision::new(entity_id, action, snapshot))
        .await
    }
  }

  // ── Link rows: writes ────────────────────────────────────────────────

  /// Add `target_id` to a link set. The link row, a `create` revision of
  /// the link entity and its activity entry are written atomically.
  fn link(
    &self,
    ctx: ChangeContext,
    kind: LinkKind,
    set_id: Uuid,
    target_id: Uuid,
  ) -> impl Future<Output = Result<LinkRow, Self::Error>> + Send + '_;

  /// Tombstone the active link of `target_id` in a set, recording a
  /// `delete` revision of the link entity in the same transaction.
  fn unlink(
    &self,
    ctx: ChangeContext,
    kind: LinkKind,
    set_id: Uuid,
    target_id: Uuid,
  ) -> impl Future<Output = Result<LinkRow, Self::Error>> + Send + '_;

  /// Link several targets as one user action: one atomic row-level write
  /// per target, all sharing `ctx`.
  fn link_many(
    &self,
    ctx: ChangeContext,
    kind: LinkKind,
    set_id: Uuid,
    targets: Vec<Uuid>,
  ) -> impl Future<Output = Result<Vec<LinkRow>, Self::Error>> + Send + '_ {
    async move {
      let mut rows = Vec::with_capacity(targets.len());
      for target_id in targets {
        rows.push(self.link(ctx, kind, set_id, target_id).await?);
      }
      Ok(rows)
    }
  }

  /// Counterpart of [`AuditStore::link_many`].
  fn unlink_many(
    &self,
    ctx: ChangeContext,
    kind: LinkKind,
    set_id: Uuid,
    targets: Vec<Uuid>,
  ) -> impl Future<Output = Result<Vec<LinkRow>, Self::Error>> + Send + '_ {
    async move {
      let mut rows = Vec::with_capacity(targets.len());
      for target_id in targets {
        rows.push(self.unlink(ctx, kind, set_id, target_id).await?);
      }
      Ok(rows)
    }
  }

  // ── Revision ledger: reads ───────────────────────────────────────────

  fn find_revision(
    &self,
    kind: EntityKind,
    revision_id: Uuid,
  ) -> impl Future<Output = Result<Option<Revision>, Self::Error>> + Send + '_;

  /// The revision of the same entity with the next lower revision number.
  fn previous<'a>(
    &'a self,
    revision: &'a Revision,
  ) -> impl Future<Output = Result<Option<Revision>, Self::Error>> + Send + 'a;

  /// The revision of the same entity with the next higher revision number.
  fn next<'a>(
    &'a self,
    revision: &'a Revision,
  ) -> impl Future<Output = Result<Option<Revision>, Self::Error>> + Send + 'a;

  /// The highest-numbered revision of an entity: its current state,
  /// soft-deleted or not. `None` if the entity was never recorded.
  fn latest(
    &self,
    kind: EntityKind,
    entity_id: Uuid,
  ) -> impl Future<Output = Result<Option<Revision>, Self::Error>> + Send + '_;

  /// Every revision of an entity in revision-number order.
  fn history(
    &self,
    kind: EntityKind,
    entity_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Revision>, Self::Error>> + Send + '_;

  // ── Activity index ────────────────────────────────────────────────────

  /// Phase 1 of a timeline read: matching entries, newest first, ordered by
  /// `(changed_at DESC, log_id DESC)`. Revisions are not loaded.
  fn query_activity<'a>(
    &'a self,
    query: &'a ActivityQuery,
  ) -> impl Future<Output = Result<Vec<ActivityLogEntry>, Self::Error>> + Send + 'a;

  /// Phase 2 of a timeline read: load the revisions for exactly `entries`,
  /// preserving their order.
  fn hydrate(
    &self,
    entries: Vec<ActivityLogEntry>,
  ) -> impl Future<Output = Result<Vec<HydratedEntry>, Self::Error>> + Send + '_;

  // ── Temporal link resolution ──────────────────────────────────────────

  /// Targets linked in a set at `at`; `None` means now.
  fn linked_as_of(
    &self,
    kind: LinkKind,
    set_id: Uuid,
    at: Option<DateTime<Utc>>,
  ) -> impl Future<Output = Result<BTreeSet<Uuid>, Self::Error>> + Send + '_;

  /// Targets linked in a set just before `at`.
  fn previous_as_of(
    &self,
    kind: LinkKind,
    set_id: Uuid,
    at: DateTime<Utc>,
    epsilon: TimeDelta,
  ) -> impl Future<Output = Result<BTreeSet<Uuid>, Self::Error>> + Send + '_ {
    self.linked_as_of(kind, set_id, Some(previous_instant(at, epsilon)))
  }

  /// All rows of a set, tombstoned ones included, oldest first.
  fn link_rows(
    &self,
    kind: LinkKind,
    set_id: Uuid,
  ) -> impl Future<Output = Result<Vec<LinkRow>, Self::Error>> + Send + '_;
}
