//! Tunables for the read pipeline, deserialised from the `[activity]`
//! section of the CLI configuration.

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use chrono_tz::Tz;
use chronicle_core::{aggregate::local_date, kind::EntityKind};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivityConfig {
  /// Entries per timeline page.
  pub page_size:           usize,
  /// How far before a change the "previous" link set is read.
  pub previous_epsilon_ms: i64,
  /// Offset after a creation used when no later revision bounds it.
  pub creation_epsilon_ms: i64,
  /// Kinds left out of timelines unless a filter asks for them.
  pub excluded_kinds:      Vec<EntityKind>,
  /// IANA zone whose wall clock decides "today", day groups and the
  /// academic-year turnover.
  pub timezone:            Tz,
}

impl Default for ActivityConfig {
  fn default() -> Self {
    Self {
      page_size:           25,
      previous_epsilon_ms: 2000,
      creation_epsilon_ms: 1,
      excluded_kinds:      vec![EntityKind::PartnershipAcademicYear],
      timezone:            chrono_tz::Europe::London,
    }
  }
}

impl ActivityConfig {
  pub fn previous_epsilon(&self) -> TimeDelta {
    TimeDelta::milliseconds(self.previous_epsilon_ms)
  }

  pub fn creation_epsilon(&self) -> TimeDelta {
    TimeDelta::milliseconds(self.creation_epsilon_ms)
  }

  /// The configured zone's calendar date at `at`.
  pub fn date_at(&self, at: DateTime<Utc>) -> NaiveDate {
    local_date(at, &self.timezone)
  }
}
