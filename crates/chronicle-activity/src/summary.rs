//! The display model of one timeline entry.

use chrono::{Datelike, NaiveDate};
use chronicle_core::{aggregate::format_date, kind::Action};
use serde::Serialize;
use uuid::Uuid;

use crate::links::SafeLink;

/// Shown in place of a summary when the revision behind an entry cannot be
/// read.
pub const UNAVAILABLE: &str = "Revision details unavailable";

// ─── Summary ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
  pub action:   Action,
  /// e.g. "Provider contact updated". Empty for the placeholder.
  pub activity: String,
  pub label:    String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub href:     Option<String>,
  pub fields:   Vec<SummaryField>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub extras:   Option<SummaryExtras>,
}

impl Summary {
  pub fn unavailable(action: Action) -> Self {
    Self {
      action,
      activity: String::new(),
      label: UNAVAILABLE.to_owned(),
      href: None,
      fields: Vec::new(),
      extras: None,
    }
  }

  pub fn is_unavailable(&self) -> bool {
    self.activity.is_empty() && self.label == UNAVAILABLE
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryField {
  pub key:   String,
  pub value: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub href:  Option<String>,
}

impl SummaryField {
  pub fn new(key: &str, value: Option<impl Into<String>>) -> Self {
    Self {
      key:   key.to_owned(),
      value: value.map(Into::into),
      href:  None,
    }
  }

  pub fn linked(key: &str, link: &SafeLink, href: Option<String>) -> Self {
    Self {
      key:   key.to_owned(),
      value: Some(link.text.clone()),
      href,
    }
  }
}

// ─── Extras ──────────────────────────────────────────────────────────────────

/// Kind-specific detail beyond the flat field list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SummaryExtras {
  Accreditation {
    dates: DateRange,
  },
  Partnership {
    accredited:     SafeLink,
    training:       SafeLink,
    dates:          DateRange,
    academic_years: YearChanges,
  },
  ProviderAcademicYears {
    academic_years: YearChanges,
  },
  PartnershipAcademicYears {
    academic_years: YearChanges,
  },
}

/// A start/end date pair rendered for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DateRange {
  pub starts_on: String,
  pub ends_on:   Option<String>,
}

impl DateRange {
  pub fn new(starts_on: Option<NaiveDate>, ends_on: Option<NaiveDate>) -> Self {
    Self {
      starts_on: starts_on.map_or_else(|| "Not recorded".to_owned(), format_date),
      ends_on:   ends_on.map(format_date),
    }
  }

  pub fn ends_on_or_open(&self) -> String {
    self.ends_on.clone().unwrap_or_else(|| "No end date".to_owned())
  }
}

/// A reconstructed academic-year link set and how it moved.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct YearChanges {
  /// The set shown for the entry.
  pub linked:  Vec<AcademicYearItem>,
  pub added:   Vec<AcademicYearItem>,
  pub removed: Vec<AcademicYearItem>,
}

// ─── Academic years ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum YearStatus {
  Last,
  Current,
  Next,
}

impl YearStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Last => "last",
      Self::Current => "current",
      Self::Next => "next",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AcademicYearItem {
  pub id:        Uuid,
  pub name:      String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub status:    Option<YearStatus>,
  /// Name with its status appended, e.g. "2025 to 2026 - current".
  pub text:      String,
  pub starts_on: Option<NaiveDate>,
  pub ends_on:   Option<NaiveDate>,
}

impl AcademicYearItem {
  pub fn new(
    id: Uuid,
    name: String,
    starts_on: Option<NaiveDate>,
    ends_on: Option<NaiveDate>,
    today: NaiveDate,
  ) -> Self {
    let status = starts_on.and_then(|s| year_status(s, today));
    let text = match status {
      Some(status) => format!("{name} - {}", status.as_str()),
      None => name.clone(),
    };
    Self { id, name, status, text, starts_on, ends_on }
  }
}

/// Calendar year in which the academic year containing `today` began.
/// Academic years start on 1 August.
pub fn current_academic_year_start(today: NaiveDate) -> i32 {
  if today.month() >= 8 {
    today.year()
  } else {
    today.year() - 1
  }
}

/// Where an academic year starting on `starts_on` sits relative to `today`.
pub fn year_status(starts_on: NaiveDate, today: NaiveDate) -> Option<YearStatus> {
  let current = current_academic_year_start(today);
  match starts_on.year() - current {
    -1 => Some(YearStatus::Last),
    0 => Some(YearStatus::Current),
    1 => Some(YearStatus::Next),
    _ => None,
  }
}
