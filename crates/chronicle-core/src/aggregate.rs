//! Turning the raw activity stream into what a reader sees: bulk writes
//! collapsed to one event, entries bucketed by day, pages cut from the
//! collapsed stream.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{kind::EntityKind, revision::ActivityLogEntry};

// ─── Collapse ────────────────────────────────────────────────────────────────

/// Bulk-link entries written by one actor against one subject within the
/// same wall-clock second are one user action. `change_id` is kept on the
/// entry for audit but does not split a second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CollapseKey {
  kind:    EntityKind,
  subject: Uuid,
  actor:   Uuid,
  second:  i64,
}

impl CollapseKey {
  fn of(entry: &ActivityLogEntry) -> Self {
    Self {
      kind:    entry.revision_kind,
      subject: entry.subject_id,
      actor:   entry.changed_by,
      second:  entry.changed_at.timestamp(),
    }
  }
}

/// Drop display duplicates produced by one bulk link change.
///
/// Entries of a bulk link kind that share kind, subject, actor and second are
/// reduced to the first one in incoming order; every other entry passes
/// through untouched. The revisions behind dropped entries are not affected
/// and still feed as-of reconstruction.
pub fn collapse(entries: Vec<ActivityLogEntry>) -> Vec<ActivityLogEntry> {
  let mut seen = HashSet::new();
  entries
    .into_iter()
    .filter(|entry| {
      !entry.revision_kind.is_bulk_link() || seen.insert(CollapseKey::of(entry))
    })
    .collect()
}

// ─── Group by day ────────────────────────────────────────────────────────────

/// Anything placed on the timeline.
pub trait Timestamped {
  fn changed_at(&self) -> DateTime<Utc>;
}

impl Timestamped for ActivityLogEntry {
  fn changed_at(&self) -> DateTime<Utc> { self.changed_at }
}

/// Entries that happened on one calendar day.
#[derive(Debug, Clone, Serialize)]
pub struct DayGroup<T> {
  /// "Today", "Yesterday", or e.g. "3 March 2025".
  pub label: String,
  pub date:  NaiveDate,
  pub items: Vec<T>,
}

/// Long-form date, e.g. `1 January 1970`.
pub fn format_date(date: NaiveDate) -> String {
  date.format("%-d %B %Y").to_string()
}

fn day_label(date: NaiveDate, today: NaiveDate) -> String {
  if date == today {
    "Today".to_owned()
  } else if today.pred_opt() == Some(date) {
    "Yesterday".to_owned()
  } else {
    format_date(date)
  }
}

/// The calendar date of `at` on a wall clock in `zone`.
pub fn local_date<Z: TimeZone>(at: DateTime<Utc>, zone: &Z) -> NaiveDate {
  at.with_timezone(zone).date_naive()
}

/// Bucket time-ordered `items` by calendar day in `zone`.
///
/// Items keep their incoming order inside a group; groups are ordered by
/// their most recent item, newest first.
pub fn group_by_day<T: Timestamped, Z: TimeZone>(
  items: Vec<T>,
  today: NaiveDate,
  zone: &Z,
) -> Vec<DayGroup<T>> {
  let mut groups: Vec<DayGroup<T>> = Vec::new();
  let mut index: HashMap<NaiveDate, usize> = HashMap::new();

  for item in items {
    let date = local_date(item.changed_at(), zone);
    let slot = *index.entry(date).or_insert_with(|| {
      groups.push(DayGroup {
        label: day_label(date, today),
        date,
        items: Vec::new(),
      });
      groups.len() - 1
    });
    groups[slot].items.push(item);
  }

  groups.sort_by_key(|g| {
    std::cmp::Reverse(g.items.iter().map(Timestamped::changed_at).max())
  });
  groups
}

// ─── Pagination ──────────────────────────────────────────────────────────────

/// A window over the collapsed stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
  pub limit:  usize,
  pub offset: usize,
}

impl PageRequest {
  /// The 1-based page `number` of `size` items.
  pub fn page(number: usize, size: usize) -> Self {
    Self {
      limit:  size,
      offset: number.saturating_sub(1).saturating_mul(size),
    }
  }
}

impl Default for PageRequest {
  fn default() -> Self { Self::page(1, 25) }
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
  pub items:       Vec<T>,
  /// Size of the whole (collapsed) stream, not just this page.
  pub total_count: usize,
  pub limit:       usize,
  pub offset:      usize,
}

impl<T> Page<T> {
  pub fn page_count(&self) -> usize {
    if self.limit == 0 {
      return 0;
    }
    self.total_count.div_ceil(self.limit)
  }

  pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
    Page {
      items:       self.items.into_iter().map(f).collect(),
      total_count: self.total_count,
      limit:       self.limit,
      offset:      self.offset,
    }
  }
}

/// Cut `request` out of an already ordered and collapsed stream.
pub fn paginate<T>(items: Vec<T>, request: PageRequest) -> Page<T> {
  let total_count = items.len();
  let items = items
    .into_iter()
    .skip(request.offset)
    .take(request.limit)
    .collect();
  Page {
    items,
    total_count,
    limit: request.limit,
    offset: request.offset,
  }
}
