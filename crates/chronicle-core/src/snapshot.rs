//! Snapshot types: the field payload of a revision.
//!
//! A snapshot is the full state of one entity at one moment. Every pointer to
//! another entity is a [`Uuid`], never an embedded record, so the provider ↔
//! address ↔ activity graph has no ownership cycles.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Result, kind::EntityKind};

// ─── Provider ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSnapshot {
  /// Provider type code, e.g. `"hei"`, `"scitt"`, `"school"`.
  pub provider_type:  Option<String>,
  pub operating_name: String,
  pub legal_name:     Option<String>,
  pub ukprn:          Option<String>,
  pub urn:            Option<String>,
  pub code:           Option<String>,
  pub archived_at:    Option<DateTime<Utc>>,
  pub deleted_at:     Option<DateTime<Utc>>,
}

impl ProviderSnapshot {
  pub fn is_archived(&self) -> bool { self.archived_at.is_some() }

  /// Operating name, falling back to the legal name when blank.
  pub fn name(&self) -> &str {
    if self.operating_name.trim().is_empty() {
      self.legal_name.as_deref().unwrap_or_default()
    } else {
      &self.operating_name
    }
  }
}

/// Human label for a provider type code.
pub fn provider_type_label(code: &str) -> String {
  match code {
    "hei" => "Higher education institution (HEI)".to_owned(),
    "scitt" => "School-centred initial teacher training (SCITT)".to_owned(),
    "school" => "School".to_owned(),
    other => other.to_owned(),
  }
}

// ─── Provider-owned sub-entities ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressSnapshot {
  pub provider_id: Uuid,
  pub line_1:      Option<String>,
  pub line_2:      Option<String>,
  pub line_3:      Option<String>,
  pub town:        Option<String>,
  pub county:      Option<String>,
  pub postcode:    String,
  pub latitude:    Option<f64>,
  pub longitude:   Option<f64>,
  pub deleted_at:  Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactSnapshot {
  pub provider_id: Uuid,
  pub first_name:  Option<String>,
  pub last_name:   Option<String>,
  pub email:       Option<String>,
  pub telephone:   Option<String>,
  pub deleted_at:  Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccreditationSnapshot {
  pub provider_id: Uuid,
  pub number:      String,
  pub starts_on:   Option<NaiveDate>,
  pub ends_on:     Option<NaiveDate>,
  pub deleted_at:  Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartnershipSnapshot {
  pub accredited_provider_id: Uuid,
  pub training_partner_id:    Uuid,
  pub starts_on:              Option<NaiveDate>,
  pub ends_on:                Option<NaiveDate>,
  pub deleted_at:             Option<DateTime<Utc>>,
}

/// One membership row of a provider or partnership in an academic year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcademicYearLinkSnapshot {
  /// The provider or partnership owning the link set.
  pub owner_id:         Uuid,
  pub academic_year_id: Uuid,
  pub deleted_at:       Option<DateTime<Utc>>,
}

// ─── Standalone entities ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSnapshot {
  pub first_name: Option<String>,
  pub last_name:  Option<String>,
  pub email:      String,
  #[serde(default = "active_by_default")]
  pub is_active:  bool,
  pub deleted_at: Option<DateTime<Utc>>,
}

fn active_by_default() -> bool { true }

impl UserSnapshot {
  /// "First Last", falling back to the email address.
  pub fn name(&self) -> String {
    let full = [self.first_name.as_deref(), self.last_name.as_deref()]
      .into_iter()
      .flatten()
      .filter(|s| !s.trim().is_empty())
      .collect::<Vec<_>>()
      .join(" ");
    if full.is_empty() { self.email.clone() } else { full }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcademicYearSnapshot {
  pub code:       Option<String>,
  pub name:       String,
  pub starts_on:  Option<NaiveDate>,
  pub ends_on:    Option<NaiveDate>,
  pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum TokenStatus {
  #[default]
  Active,
  Revoked,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiClientTokenSnapshot {
  pub client_name: String,
  #[serde(default)]
  pub status:      TokenStatus,
  pub expires_at:  Option<DateTime<Utc>>,
  pub deleted_at:  Option<DateTime<Utc>>,
}

// ─── Snapshot ────────────────────────────────────────────────────────────────

/// The typed payload of a revision. The variant name is the
/// [`EntityKind`] discriminant stored alongside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "fields", rename_all = "snake_case")]
pub enum Snapshot {
  Provider(ProviderSnapshot),
  ProviderAddress(AddressSnapshot),
  ProviderContact(ContactSnapshot),
  ProviderAccreditation(AccreditationSnapshot),
  ProviderPartnership(PartnershipSnapshot),
  ProviderAcademicYear(AcademicYearLinkSnapshot),
  PartnershipAcademicYear(AcademicYearLinkSnapshot),
  User(UserSnapshot),
  AcademicYear(AcademicYearSnapshot),
  ApiClientToken(ApiClientTokenSnapshot),
}

impl Snapshot {
  pub fn kind(&self) -> EntityKind {
    match self {
      Self::Provider(_) => EntityKind::Provider,
      Self::ProviderAddress(_) => EntityKind::ProviderAddress,
      Self::ProviderContact(_) => EntityKind::ProviderContact,
      Self::ProviderAccreditation(_) => EntityKind::ProviderAccreditation,
      Self::ProviderPartnership(_) => EntityKind::ProviderPartnership,
      Self::ProviderAcademicYear(_) => EntityKind::ProviderAcademicYear,
      Self::PartnershipAcademicYear(_) => EntityKind::PartnershipAcademicYear,
      Self::User(_) => EntityKind::User,
      Self::AcademicYear(_) => EntityKind::AcademicYear,
      Self::ApiClientToken(_) => EntityKind::ApiClientToken,
    }
  }

  /// The logical subject an activity entry for this snapshot is filed
  /// under: the owning provider for provider sub-entities, the owning
  /// partnership for partnership links, otherwise the entity itself.
  pub fn subject(&self, entity_id: Uuid) -> (EntityKind, Uuid) {
    match self {
      Self::ProviderAddress(s) => (EntityKind::Provider, s.provider_id),
      Self::ProviderContact(s) => (EntityKind::Provider, s.provider_id),
      Self::ProviderAccreditation(s) => (EntityKind::Provider, s.provider_id),
      Self::ProviderAcademicYear(s) => (EntityKind::Provider, s.owner_id),
      Self::PartnershipAcademicYear(s) => {
        (EntityKind::ProviderPartnership, s.owner_id)
      }
      other => (other.kind(), entity_id),
    }
  }

  /// Provider foreign keys carried by this snapshot:
  /// `(provider_id, partner_provider_id)`. These back the cross-kind
  /// "all activity touching provider P" query.
  pub fn provider_refs(&self) -> (Option<Uuid>, Option<Uuid>) {
    match self {
      Self::ProviderAddress(s) => (Some(s.provider_id), None),
      Self::ProviderContact(s) => (Some(s.provider_id), None),
      Self::ProviderAccreditation(s) => (Some(s.provider_id), None),
      Self::ProviderAcademicYear(s) => (Some(s.owner_id), None),
      Self::ProviderPartnership(s) => {
        (Some(s.accredited_provider_id), Some(s.training_partner_id))
      }
      Self::Provider(_)
      | Self::PartnershipAcademicYear(_)
      | Self::User(_)
      | Self::AcademicYear(_)
      | Self::ApiClientToken(_) => (None, None),
    }
  }

  pub fn deleted_at(&self) -> Option<DateTime<Utc>> {
    match self {
      Self::Provider(s) => s.deleted_at,
      Self::ProviderAddress(s) => s.deleted_at,
      Self::ProviderContact(s) => s.deleted_at,
      Self::ProviderAccreditation(s) => s.deleted_at,
      Self::ProviderPartnership(s) => s.deleted_at,
      Self::ProviderAcademicYear(s) | Self::PartnershipAcademicYear(s) => {
        s.deleted_at
      }
      Self::User(s) => s.deleted_at,
      Self::AcademicYear(s) => s.deleted_at,
      Self::ApiClientToken(s) => s.deleted_at,
    }
  }

  /// Whether an entity in this state may be linked to. Soft-deleted
  /// entities never are; inactive users neither. Archival of a provider
  /// does not by itself suppress the link.
  pub fn is_listable(&self) -> bool {
    if self.deleted_at().is_some() {
      return false;
    }
    match self {
      Self::User(u) => u.is_active,
      _ => true,
    }
  }

  /// The name shown for an entity in this state, if the kind has one.
  pub fn display_name(&self) -> Option<String> {
    let name = match self {
      Self::Provider(p) => p.name().to_owned(),
      Self::User(u) => u.name(),
      Self::AcademicYear(a) => {
        if a.name.trim().is_empty() {
          a.code.clone().unwrap_or_default()
        } else {
          a.name.clone()
        }
      }
      Self::ApiClientToken(t) => t.client_name.clone(),
      _ => return None,
    };
    (!name.trim().is_empty()).then_some(name)
  }

  /// Serialise the inner payload (without the kind tag) for the
  /// `snapshot_json` column.
  pub fn to_json(&self) -> Result<serde_json::Value> {
    // The full serialised form is `{"kind": "...", "fields": <payload>}`.
    let full = serde_json::to_value(self)?;
    Ok(full.get("fields").cloned().unwrap_or(serde_json::Value::Null))
  }

  /// Deserialise from a kind discriminant and its JSON payload. Unknown
  /// discriminants fail with
  /// [`Error::UnknownEntityKind`](crate::Error::UnknownEntityKind) before
  /// the payload is looked at.
  pub fn from_parts(kind: &str, fields: serde_json::Value) -> Result<Self> {
    let kind = EntityKind::parse(kind)?;
    let wrapped =
      serde_json::json!({ "kind": kind.as_str(), "fields": fields });
    Ok(serde_json::from_value(wrapped)?)
  }
}
