//! Timeline reads: filter, collapse, paginate, hydrate, project.
//!
//! Phase 1 fetches every matching pointer so totals are computed on the
//! collapsed stream; only the requested page is hydrated and projected.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use chronicle_core::{
  aggregate::{Page, PageRequest, Timestamped, collapse, paginate},
  kind::{Action, EntityKind},
  revision::ActivityLogEntry,
  store::{ActivityQuery, AuditStore},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  ActivityConfig, Error, Result,
  links::{SafeLink, is_linkable, resolve},
  projector::Projector,
  summary::Summary,
};

/// Shown for actors with no readable user record.
const UNKNOWN_USER: &str = "Unknown user";

// ─── Types ───────────────────────────────────────────────────────────────────

/// What a timeline is about. At least one of `entity_id` and `actor_id`
/// must be set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimelineFilter {
  pub entity_id:     Option<Uuid>,
  pub actor_id:      Option<Uuid>,
  #[serde(default)]
  pub kinds:         Vec<EntityKind>,
  #[serde(default)]
  pub exclude_kinds: Vec<EntityKind>,
}

impl TimelineFilter {
  /// Everything touching one entity.
  pub fn entity(entity_id: Uuid) -> Self {
    Self { entity_id: Some(entity_id), ..Default::default() }
  }

  /// Everything one user did.
  pub fn actor(actor_id: Uuid) -> Self {
    Self { actor_id: Some(actor_id), ..Default::default() }
  }
}

/// One rendered timeline row.
#[derive(Debug, Clone, Serialize)]
pub struct TimelineItem {
  pub log_id:          i64,
  pub revision_kind:   EntityKind,
  pub revision_id:     Uuid,
  pub entity_id:       Uuid,
  pub revision_number: u32,
  pub action:          Action,
  pub changed_at:      DateTime<Utc>,
  pub changed_by:      SafeLink,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub change_id:       Option<Uuid>,
  pub summary:         Summary,
}

impl Timestamped for TimelineItem {
  fn changed_at(&self) -> DateTime<Utc> { self.changed_at }
}

pub type TimelinePage = Page<TimelineItem>;

#[derive(Debug, Clone, Copy, Default)]
pub struct LastChangedOptions {
  /// Also count sub-entities that are currently soft-deleted.
  pub include_deleted_children: bool,
}

/// The most recent write to an entity or anything it owns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LastChanged {
  pub changed_at:      DateTime<Utc>,
  pub changed_by:      Uuid,
  pub action:          Action,
  pub revision_kind:   EntityKind,
  pub revision_id:     Uuid,
  pub revision_number: u32,
}

impl From<&ActivityLogEntry> for LastChanged {
  fn from(e: &ActivityLogEntry) -> Self {
    Self {
      changed_at:      e.changed_at,
      changed_by:      e.changed_by,
      action:          e.action,
      revision_kind:   e.revision_kind,
      revision_id:     e.revision_id,
      revision_number: e.revision_number,
    }
  }
}

// ─── Timeline ────────────────────────────────────────────────────────────────

/// The read pipeline over one store.
pub struct Timeline<S> {
  store:  S,
  config: ActivityConfig,
  today:  Option<NaiveDate>,
}

impl<S: AuditStore> Timeline<S> {
  pub fn new(store: S, config: ActivityConfig) -> Self {
    Self { store, config, today: None }
  }

  /// Pin the date used for "Today" and academic-year statuses. Otherwise
  /// it is the current date in the configured zone.
  pub fn with_today(mut self, today: NaiveDate) -> Self {
    self.today = Some(today);
    self
  }

  pub fn store(&self) -> &S { &self.store }

  pub fn config(&self) -> &ActivityConfig { &self.config }

  pub fn today(&self) -> NaiveDate {
    self.today.unwrap_or_else(|| self.config.date_at(Utc::now()))
  }

  /// A page of the timeline for an entity and/or an actor.
  ///
  /// Kinds excluded by configuration stay out unless `filter.kinds` names
  /// them.
  pub async fn timeline(
    &self,
    filter: &TimelineFilter,
    page: PageRequest,
  ) -> Result<TimelinePage> {
    if filter.entity_id.is_none() && filter.actor_id.is_none() {
      return Err(chronicle_core::Error::MissingFilter.into());
    }

    let mut exclude_kinds = filter.exclude_kinds.clone();
    exclude_kinds.extend(
      self
        .config
        .excluded_kinds
        .iter()
        .filter(|k| !filter.kinds.contains(*k)),
    );

    let query = ActivityQuery {
      entity_id: filter.entity_id,
      actor_id: filter.actor_id,
      kinds: filter.kinds.clone(),
      exclude_kinds,
      limit: None,
      offset: None,
    };
    self.read(&query, page).await
  }

  /// A page of the site-wide feed.
  pub async fn global(&self, page: PageRequest) -> Result<TimelinePage> {
    let query = ActivityQuery {
      exclude_kinds: self.config.excluded_kinds.clone(),
      ..Default::default()
    };
    self.read(&query, page).await
  }

  async fn read(
    &self,
    query: &ActivityQuery,
    page: PageRequest,
  ) -> Result<TimelinePage> {
    let entries = self
      .store
      .query_activity(query)
      .await
      .map_err(Error::store)?;
    let Page { items: window, total_count, limit, offset } =
      paginate(collapse(entries), page);

    let hydrated = self
      .store
      .hydrate(window)
      .await
      .map_err(Error::store)?;

    let projector = Projector::new(&self.store, &self.config, self.today());
    let mut actors: HashMap<Uuid, SafeLink> = HashMap::new();
    let mut items = Vec::with_capacity(hydrated.len());

    for h in hydrated {
      let summary = projector.project(&h.entry, h.revision.as_ref()).await;
      let changed_by = match actors.get(&h.entry.changed_by) {
        Some(link) => link.clone(),
        None => {
          let link = resolve(
            &self.store,
            EntityKind::User,
            h.entry.changed_by,
            UNKNOWN_USER,
          )
          .await
          .unwrap_or_else(|error| {
            tracing::warn!(
              actor = %h.entry.changed_by,
              %error,
              "could not resolve actor; showing as unknown"
            );
            SafeLink::plain(UNKNOWN_USER)
          });
          actors.insert(h.entry.changed_by, link.clone());
          link
        }
      };
      let e = h.entry;
      items.push(TimelineItem {
        log_id: e.log_id,
        revision_kind: e.revision_kind,
        revision_id: e.revision_id,
        entity_id: e.entity_id,
        revision_number: e.revision_number,
        action: e.action,
        changed_at: e.changed_at,
        changed_by,
        change_id: e.change_id,
        summary,
      });
    }

    Ok(Page { items, total_count, limit, offset })
  }

  /// When `entity_id` or one of its owned sub-entities (addresses,
  /// contacts, accreditations, partnerships) last changed.
  pub async fn last_changed(
    &self,
    entity_id: Uuid,
    options: LastChangedOptions,
  ) -> Result<Option<LastChanged>> {
    let entries = self
      .store
      .query_activity(&ActivityQuery {
        entity_id: Some(entity_id),
        ..Default::default()
      })
      .await
      .map_err(Error::store)?;

    let mut child_alive: HashMap<(EntityKind, Uuid), bool> = HashMap::new();
    for entry in &entries {
      if entry.entity_id == entity_id {
        return Ok(Some(entry.into()));
      }
      if !entry.revision_kind.is_provider_child() {
        continue;
      }
      if options.include_deleted_children {
        return Ok(Some(entry.into()));
      }

      let key = (entry.revision_kind, entry.entity_id);
      let alive = match child_alive.get(&key) {
        Some(alive) => *alive,
        None => {
          let alive = self
            .store
            .latest(key.0, key.1)
            .await
            .map_err(Error::store)?
            .is_some_and(|current| is_linkable(&current));
          child_alive.insert(key, alive);
          alive
        }
      };
      if alive {
        return Ok(Some(entry.into()));
      }
    }
    Ok(None)
  }
}
