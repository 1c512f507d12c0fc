//! Projection of one activity entry and its revision into a [`Summary`].
//!
//! Every revision kind is handled by an exhaustive `match` over
//! [`Snapshot`]. A projection that cannot complete (missing revision, kind
//! mismatch, store failure) is logged and replaced by the placeholder
//! summary; it never fails the surrounding page.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use chronicle_core::{
  aggregate::format_date,
  diff::diff,
  kind::{Action, EntityKind, LinkKind},
  link::creation_instant,
  revision::{ActivityLogEntry, Revision},
  snapshot::{
    AcademicYearLinkSnapshot, AccreditationSnapshot, AddressSnapshot,
    ApiClientTokenSnapshot, ContactSnapshot, PartnershipSnapshot,
    ProviderSnapshot, Snapshot, TokenStatus, provider_type_label,
  },
  store::AuditStore,
};
use uuid::Uuid;

use crate::{
  ActivityConfig, Error, Result,
  links::{SafeLink, resolve},
  summary::{
    AcademicYearItem, DateRange, Summary, SummaryExtras, SummaryField,
    YearChanges,
  },
};

/// Projects entries against a store. Holds no state beyond its borrows.
pub struct Projector<'a, S> {
  store:  &'a S,
  config: &'a ActivityConfig,
  today:  NaiveDate,
}

impl<'a, S: AuditStore> Projector<'a, S> {
  /// `today` anchors the current/last/next academic-year labels.
  pub fn new(store: &'a S, config: &'a ActivityConfig, today: NaiveDate) -> Self {
    Self { store, config, today }
  }

  /// Summarise `entry`. Never fails: faults degrade to
  /// [`Summary::unavailable`].
  pub async fn project(
    &self,
    entry: &ActivityLogEntry,
    revision: Option<&Revision>,
  ) -> Summary {
    let Some(revision) = revision else {
      tracing::warn!(
        kind = %entry.revision_kind,
        revision_id = %entry.revision_id,
        "activity entry has no readable revision"
      );
      return Summary::unavailable(entry.action);
    };

    match self.try_project(entry, revision).await {
      Ok(summary) => summary,
      Err(error) => {
        tracing::error!(
          log_id = entry.log_id,
          kind = %entry.revision_kind,
          revision_id = %entry.revision_id,
          %error,
          "failed to project activity entry"
        );
        Summary::unavailable(entry.action)
      }
    }
  }

  async fn try_project(
    &self,
    entry: &ActivityLogEntry,
    revision: &Revision,
  ) -> Result<Summary> {
    if revision.kind() != entry.revision_kind {
      return Err(
        chronicle_core::Error::KindMismatch {
          revision_id: revision.revision_id,
          expected:    entry.revision_kind,
          found:       revision.kind(),
        }
        .into(),
      );
    }

    match &revision.snapshot {
      Snapshot::Provider(s) => self.provider(entry, revision, s).await,
      Snapshot::ProviderAddress(s) => self.address(entry, s).await,
      Snapshot::ProviderContact(s) => self.contact(entry, s).await,
      Snapshot::ProviderAccreditation(s) => self.accreditation(entry, s).await,
      Snapshot::ProviderPartnership(s) => {
        self.partnership(entry, revision, s).await
      }
      Snapshot::ProviderAcademicYear(s) => {
        self.provider_academic_years(entry, s).await
      }
      Snapshot::PartnershipAcademicYear(s) => {
        self.partnership_academic_year(entry, s).await
      }
      Snapshot::User(s) => {
        let link = self
          .link(EntityKind::User, entry.entity_id, &fallback(s.name(), "User"))
          .await?;
        Ok(basic(entry, format!("User {}", entry.action.verb()), link, vec![
          SummaryField::new("First name", s.first_name.as_deref()),
          SummaryField::new("Last name", s.last_name.as_deref()),
          SummaryField::new("Email address", Some(s.email.as_str())),
        ]))
      }
      Snapshot::AcademicYear(s) => {
        let link = self
          .link(
            EntityKind::AcademicYear,
            entry.entity_id,
            &fallback(s.name.clone(), "Academic year"),
          )
          .await?;
        Ok(basic(
          entry,
          format!("Academic year {}", entry.action.verb()),
          link,
          vec![
            SummaryField::new("Name", Some(s.name.as_str())),
            SummaryField::new("Starts on", s.starts_on.map(format_date)),
            SummaryField::new("Ends on", s.ends_on.map(format_date)),
          ],
        ))
      }
      Snapshot::ApiClientToken(s) => self.api_client(entry, revision, s).await,
    }
  }

  // ── Providers and their sub-entities ──────────────────────────────────────

  async fn provider(
    &self,
    entry: &ActivityLogEntry,
    revision: &Revision,
    s: &ProviderSnapshot,
  ) -> Result<Summary> {
    let activity = match entry.action {
      Action::Update => {
        let was_archived = self
          .store
          .previous(revision)
          .await
          .map_err(Error::store)?
          .is_some_and(|prev| match prev.snapshot {
            Snapshot::Provider(p) => p.is_archived(),
            _ => false,
          });
        match (was_archived, s.is_archived()) {
          (false, true) => "Provider archived".to_owned(),
          (true, false) => "Provider restored".to_owned(),
          _ => "Provider updated".to_owned(),
        }
      }
      action => format!("Provider {}", action.verb()),
    };

    let link = self
      .link(
        EntityKind::Provider,
        entry.entity_id,
        &fallback(s.name().to_owned(), "Provider"),
      )
      .await?;

    Ok(basic(entry, activity, link, vec![
      SummaryField::new(
        "Provider type",
        s.provider_type.as_deref().map(provider_type_label),
      ),
      SummaryField::new("Operating name", Some(s.operating_name.as_str())),
      SummaryField::new("Legal name", s.legal_name.as_deref()),
      SummaryField::new(
        "UK provider reference number (UKPRN)",
        s.ukprn.as_deref(),
      ),
      SummaryField::new("Unique reference number (URN)", s.urn.as_deref()),
      SummaryField::new("Provider code", s.code.as_deref()),
    ]))
  }

  /// Label and section href for an entity filed under a provider.
  async fn under_provider(
    &self,
    provider_id: Uuid,
    section: &str,
  ) -> Result<(String, Option<String>)> {
    let link = self
      .link(EntityKind::Provider, provider_id, "Provider")
      .await?;
    let href = link.section(section);
    Ok((link.text, href))
  }

  async fn address(
    &self,
    entry: &ActivityLogEntry,
    s: &AddressSnapshot,
  ) -> Result<Summary> {
    let (label, href) = self.under_provider(s.provider_id, "addresses").await?;
    Ok(Summary {
      action: entry.action,
      activity: format!("Provider address {}", entry.action.verb()),
      label,
      href,
      fields: vec![
        SummaryField::new("Address line 1", s.line_1.as_deref()),
        SummaryField::new("Address line 2", s.line_2.as_deref()),
        SummaryField::new("Address line 3", s.line_3.as_deref()),
        SummaryField::new("Town or city", s.town.as_deref()),
        SummaryField::new("County", s.county.as_deref()),
        SummaryField::new("Postcode", Some(s.postcode.as_str())),
        SummaryField::new("Latitude", s.latitude.map(|v| v.to_string())),
        SummaryField::new("Longitude", s.longitude.map(|v| v.to_string())),
      ],
      extras: None,
    })
  }

  async fn contact(
    &self,
    entry: &ActivityLogEntry,
    s: &ContactSnapshot,
  ) -> Result<Summary> {
    let (label, href) = self.under_provider(s.provider_id, "contacts").await?;
    Ok(Summary {
      action: entry.action,
      activity: format!("Provider contact {}", entry.action.verb()),
      label,
      href,
      fields: vec![
        SummaryField::new("First name", s.first_name.as_deref()),
        SummaryField::new("Last name", s.last_name.as_deref()),
        SummaryField::new("Email address", s.email.as_deref()),
        SummaryField::new("Phone number", s.telephone.as_deref()),
      ],
      extras: None,
    })
  }

  async fn accreditation(
    &self,
    entry: &ActivityLogEntry,
    s: &AccreditationSnapshot,
  ) -> Result<Summary> {
    let (label, href) =
      self.under_provider(s.provider_id, "accreditations").await?;
    let dates = DateRange::new(s.starts_on, s.ends_on);
    Ok(Summary {
      action: entry.action,
      activity: format!("Provider accreditation {}", entry.action.verb()),
      label,
      href,
      fields: vec![
        SummaryField::new("Accreditation number", Some(s.number.as_str())),
        SummaryField::new(
          "Accreditation start date",
          Some(dates.starts_on.as_str()),
        ),
        SummaryField::new("Accreditation end date", Some(dates.ends_on_or_open())),
      ],
      extras: Some(SummaryExtras::Accreditation { dates }),
    })
  }

  async fn partnership(
    &self,
    entry: &ActivityLogEntry,
    revision: &Revision,
    s: &PartnershipSnapshot,
  ) -> Result<Summary> {
    let accredited = self
      .link(
        EntityKind::Provider,
        s.accredited_provider_id,
        "Accredited provider",
      )
      .await?;
    let training = self
      .link(EntityKind::Provider, s.training_partner_id, "Training partner")
      .await?;
    let accredited_href = accredited.section("partnerships");
    let training_href = training.section("partnerships");

    let kind = LinkKind::PartnershipAcademicYear;
    let set_id = entry.entity_id;
    let years = match entry.action {
      Action::Create => {
        // No before state; read the set just after creation.
        let next = self.store.next(revision).await.map_err(Error::store)?;
        let at = creation_instant(
          entry.changed_at,
          next.map(|r| r.revision_at),
          self.config.creation_epsilon(),
        );
        self.year_changes(kind, set_id, at, false, true).await?
      }
      Action::Update => {
        self
          .year_changes(kind, set_id, entry.changed_at, false, false)
          .await?
      }
      Action::Delete => {
        self
          .year_changes(kind, set_id, entry.changed_at, true, false)
          .await?
      }
    };

    let dates = DateRange::new(s.starts_on, s.ends_on);
    let year_summary = if years.linked.is_empty() {
      "None linked".to_owned()
    } else {
      years
        .linked
        .iter()
        .map(|y| y.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
    };

    Ok(Summary {
      action: entry.action,
      activity: format!("Provider partnership {}", entry.action.verb()),
      label: format!("{} – {}", accredited.text, training.text),
      href: accredited_href.clone().or_else(|| training_href.clone()),
      fields: vec![
        SummaryField::linked("Accredited provider", &accredited, accredited_href),
        SummaryField::linked("Training partner", &training, training_href),
        SummaryField::new("Partnership start date", Some(dates.starts_on.as_str())),
        SummaryField::new("Partnership end date", Some(dates.ends_on_or_open())),
        SummaryField::new("Academic years", Some(year_summary)),
      ],
      extras: Some(SummaryExtras::Partnership {
        accredited,
        training,
        dates,
        academic_years: years,
      }),
    })
  }

  // ── Link-set entries ──────────────────────────────────────────────────────

  async fn provider_academic_years(
    &self,
    entry: &ActivityLogEntry,
    s: &AcademicYearLinkSnapshot,
  ) -> Result<Summary> {
    let kind = LinkKind::ProviderAcademicYear;
    let provider = self
      .link(EntityKind::Provider, s.owner_id, "Provider")
      .await?;

    let rows = self
      .store
      .link_rows(kind, s.owner_id)
      .await
      .map_err(Error::store)?;
    let first_change = !rows.iter().any(|r| r.created_at < entry.changed_at);
    let activity = if first_change {
      "Provider academic years added"
    } else {
      "Provider academic years updated"
    };

    let years = self
      .year_changes(kind, s.owner_id, entry.changed_at, false, false)
      .await?;
    let key = if years.linked.len() > 1 {
      "Academic years"
    } else {
      "Academic year"
    };
    let value = years
      .linked
      .iter()
      .map(|y| y.text.as_str())
      .collect::<Vec<_>>()
      .join(", ");

    Ok(Summary {
      action: entry.action,
      activity: activity.to_owned(),
      label: provider.text,
      href: provider.href,
      fields: vec![SummaryField::new(key, Some(value))],
      extras: Some(SummaryExtras::ProviderAcademicYears {
        academic_years: years,
      }),
    })
  }

  async fn partnership_academic_year(
    &self,
    entry: &ActivityLogEntry,
    s: &AcademicYearLinkSnapshot,
  ) -> Result<Summary> {
    let year = self
      .link(EntityKind::AcademicYear, s.academic_year_id, "Academic year")
      .await?;
    let years = self
      .year_changes(
        LinkKind::PartnershipAcademicYear,
        s.owner_id,
        entry.changed_at,
        false,
        false,
      )
      .await?;

    Ok(Summary {
      action: entry.action,
      activity: format!("Partnership academic year {}", entry.action.verb()),
      label: year.text.clone(),
      href: year.href.clone(),
      fields: vec![SummaryField::linked("Academic year", &year, year.href.clone())],
      extras: Some(SummaryExtras::PartnershipAcademicYears {
        academic_years: years,
      }),
    })
  }

  // ── API clients ───────────────────────────────────────────────────────────

  async fn api_client(
    &self,
    entry: &ActivityLogEntry,
    revision: &Revision,
    s: &ApiClientTokenSnapshot,
  ) -> Result<Summary> {
    let activity = match entry.action {
      Action::Update => {
        let was_revoked = self
          .store
          .previous(revision)
          .await
          .map_err(Error::store)?
          .is_some_and(|prev| match prev.snapshot {
            Snapshot::ApiClientToken(t) => t.status == TokenStatus::Revoked,
            _ => false,
          });
        if s.status == TokenStatus::Revoked && !was_revoked {
          "API client revoked".to_owned()
        } else {
          "API client updated".to_owned()
        }
      }
      action => format!("API client {}", action.verb()),
    };

    let link = self
      .link(
        EntityKind::ApiClientToken,
        entry.entity_id,
        &fallback(s.client_name.clone(), "API client"),
      )
      .await?;

    Ok(basic(entry, activity, link, vec![
      SummaryField::new("Client name", Some(s.client_name.as_str())),
      SummaryField::new(
        "Expiry date",
        Some(s.expires_at.map_or_else(
          || "Not entered".to_owned(),
          |d| format_date(self.config.date_at(d)),
        )),
      ),
    ]))
  }

  // ── Helpers ───────────────────────────────────────────────────────────────

  async fn link(
    &self,
    kind: EntityKind,
    id: Uuid,
    fallback: &str,
  ) -> Result<SafeLink> {
    resolve(self.store, kind, id, fallback).await
  }

  /// Reconstruct a link set at `at` and diff it against the set just
  /// before. `show_previous` displays the before state (for deletions);
  /// `from_empty` diffs against nothing (for creations).
  async fn year_changes(
    &self,
    kind: LinkKind,
    set_id: Uuid,
    at: DateTime<Utc>,
    show_previous: bool,
    from_empty: bool,
  ) -> Result<YearChanges> {
    let now = self
      .store
      .linked_as_of(kind, set_id, Some(at))
      .await
      .map_err(Error::store)?;
    let before = if from_empty {
      BTreeSet::new()
    } else {
      self
        .store
        .previous_as_of(kind, set_id, at, self.config.previous_epsilon())
        .await
        .map_err(Error::store)?
    };

    let changes = diff(&before, &now);
    let shown = if show_previous { &before } else { &now };
    Ok(YearChanges {
      linked:  self.academic_years(shown).await?,
      added:   self.academic_years(&changes.added).await?,
      removed: self.academic_years(&changes.removed).await?,
    })
  }

  /// Display items for academic year ids, ordered by start date.
  async fn academic_years(
    &self,
    ids: &BTreeSet<Uuid>,
  ) -> Result<Vec<AcademicYearItem>> {
    let mut items = Vec::with_capacity(ids.len());
    for &id in ids {
      let latest = self
        .store
        .latest(EntityKind::AcademicYear, id)
        .await
        .map_err(Error::store)?;
      let (name, starts_on, ends_on) = match latest.map(|r| r.snapshot) {
        Some(Snapshot::AcademicYear(y)) => {
          let generic = y.code.as_deref().unwrap_or("Academic year");
          (fallback(y.name.clone(), generic), y.starts_on, y.ends_on)
        }
        _ => ("Academic year".to_owned(), None, None),
      };
      items.push(AcademicYearItem::new(id, name, starts_on, ends_on, self.today));
    }
    items.sort_by(|a, b| (a.starts_on, &a.name).cmp(&(b.starts_on, &b.name)));
    Ok(items)
  }
}

/// A summary whose label and href are a single safe link.
fn basic(
  entry: &ActivityLogEntry,
  activity: String,
  link: SafeLink,
  fields: Vec<SummaryField>,
) -> Summary {
  Summary {
    action: entry.action,
    activity,
    label: link.text,
    href: link.href,
    fields,
    extras: None,
  }
}

fn fallback(name: String, generic: &str) -> String {
  if name.trim().is_empty() {
    generic.to_owned()
  } else {
    name
  }
}
