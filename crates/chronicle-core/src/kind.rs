//! The closed registry of entity kinds, write actions and link kinds.
//!
//! Every discriminant string stored in the database is produced here; adding
//! a kind means adding a variant, and every `match` over it in the workspace
//! becomes a compile error until the new case is handled.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::{Error, Result};

// ─── EntityKind ──────────────────────────────────────────────────────────────

/// A versioned aggregate root. Each kind owns one revision table.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumIter,
  EnumString,
  IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EntityKind {
  Provider,
  ProviderAddress,
  ProviderContact,
  ProviderAccreditation,
  ProviderPartnership,
  ProviderAcademicYear,
  PartnershipAcademicYear,
  User,
  AcademicYear,
  ApiClientToken,
}

impl EntityKind {
  /// Parse a stored discriminant, failing with
  /// [`Error::UnknownEntityKind`] for anything outside the registry.
  pub fn parse(s: &str) -> Result<Self> {
    s.parse()
      .map_err(|_| Error::UnknownEntityKind(s.to_owned()))
  }

  /// The discriminant stored in `activity_log.revision_kind`.
  pub fn as_str(self) -> &'static str { self.into() }

  /// Name of the append-only revision table for this kind.
  pub fn revision_table(self) -> &'static str {
    match self {
      Self::Provider => "provider_revisions",
      Self::ProviderAddress => "provider_address_revisions",
      Self::ProviderContact => "provider_contact_revisions",
      Self::ProviderAccreditation => "provider_accreditation_revisions",
      Self::ProviderPartnership => "provider_partnership_revisions",
      Self::ProviderAcademicYear => "provider_academic_year_revisions",
      Self::PartnershipAcademicYear => "partnership_academic_year_revisions",
      Self::User => "user_revisions",
      Self::AcademicYear => "academic_year_revisions",
      Self::ApiClientToken => "api_client_token_revisions",
    }
  }

  /// The link table this kind's revisions describe, for the bulk
  /// many-to-many kinds.
  pub fn link_kind(self) -> Option<LinkKind> {
    match self {
      Self::ProviderAcademicYear => Some(LinkKind::ProviderAcademicYear),
      Self::PartnershipAcademicYear => Some(LinkKind::PartnershipAcademicYear),
      _ => None,
    }
  }

  /// Whether one user action typically writes many rows of this kind at
  /// once (and the log should show them as a single event).
  pub fn is_bulk_link(self) -> bool { self.link_kind().is_some() }

  /// Kinds owned by a provider, whose activity counts towards the
  /// provider's "last updated" time.
  pub fn is_provider_child(self) -> bool {
    matches!(
      self,
      Self::ProviderAddress
        | Self::ProviderContact
        | Self::ProviderAccreditation
        | Self::ProviderPartnership
    )
  }
}

// ─── Action ──────────────────────────────────────────────────────────────────

/// What a revision did to its entity. Archive, restore and soft-delete are
/// all `Update`s carrying new field values.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Action {
  Create,
  Update,
  Delete,
}

impl Action {
  pub fn parse(s: &str) -> Result<Self> {
    s.parse().map_err(|_| Error::UnknownAction(s.to_owned()))
  }

  pub fn as_str(self) -> &'static str { self.into() }

  /// The past-tense verb shown in activity labels.
  pub fn verb(self) -> &'static str {
    match self {
      Self::Create => "added",
      Self::Update => "updated",
      Self::Delete => "deleted",
    }
  }
}

// ─── LinkKind ────────────────────────────────────────────────────────────────

/// A many-to-many relationship stored as tombstoned link rows.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumIter,
  EnumString,
  IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LinkKind {
  /// Provider ↔ academic year.
  ProviderAcademicYear,
  /// Partnership ↔ academic year.
  PartnershipAcademicYear,
}

impl LinkKind {
  pub fn parse(s: &str) -> Result<Self> {
    s.parse().map_err(|_| Error::UnknownLinkKind(s.to_owned()))
  }

  pub fn table(self) -> &'static str {
    match self {
      Self::ProviderAcademicYear => "provider_academic_years",
      Self::PartnershipAcademicYear => "partnership_academic_years",
    }
  }

  /// The entity kind whose revisions record changes to this link table.
  pub fn entity_kind(self) -> EntityKind {
    match self {
      Self::ProviderAcademicYear => EntityKind::ProviderAcademicYear,
      Self::PartnershipAcademicYear => EntityKind::PartnershipAcademicYear,
    }
  }

  /// The kind of the entity that owns a link set.
  pub fn owner_kind(self) -> EntityKind {
    match self {
      Self::ProviderAcademicYear => EntityKind::Provider,
      Self::PartnershipAcademicYear => EntityKind::ProviderPartnership,
    }
  }
}
