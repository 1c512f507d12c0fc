//! End-to-end tests of the read pipeline against a SQLite store, in memory
//! unless a test needs to damage rows behind the store's back.

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use chronicle_core::{
  aggregate::{PageRequest, group_by_day},
  kind::{Action, EntityKind, LinkKind},
  revision::{ChangeContext, NewRevision, Revision},
  snapshot::{
    AcademicYearSnapshot, AddressSnapshot, ApiClientTokenSnapshot,
    ContactSnapshot, PartnershipSnapshot, ProviderSnapshot, Snapshot,
    TokenStatus, UserSnapshot,
  },
  store::{ActivityQuery, AuditStore},
};
use chronicle_store_sqlite::SqliteStore;
use uuid::Uuid;

use crate::{
  ActivityConfig, Error, LastChangedOptions, Timeline, TimelineFilter,
  projector::Projector,
  summary::{SummaryExtras, YearStatus},
};

fn ts(secs: i64) -> DateTime<Utc> {
  Utc.timestamp_opt(1_760_000_000 + secs, 0).unwrap()
}

fn today() -> NaiveDate { NaiveDate::from_ymd_opt(2025, 10, 9).unwrap() }

async fn setup() -> (SqliteStore, Timeline<SqliteStore>) {
  let store = SqliteStore::open_in_memory()
    .await
    .expect("in-memory store");
  let timeline =
    Timeline::new(store.clone(), ActivityConfig::default()).with_today(today());
  (store, timeline)
}

fn provider(name: &str) -> ProviderSnapshot {
  ProviderSnapshot {
    provider_type:  Some("hei".into()),
    operating_name: name.into(),
    legal_name:     None,
    ukprn:          None,
    urn:            None,
    code:           None,
    archived_at:    None,
    deleted_at:     None,
  }
}

fn academic_year(start: i32) -> Snapshot {
  Snapshot::AcademicYear(AcademicYearSnapshot {
    code:       Some(start.to_string()),
    name:       format!("{start} to {}", start + 1),
    starts_on:  NaiveDate::from_ymd_opt(start, 8, 1),
    ends_on:    NaiveDate::from_ymd_opt(start + 1, 7, 31),
    deleted_at: None,
  })
}

async fn record(
  store: &SqliteStore,
  actor: Uuid,
  at: i64,
  id: Uuid,
  action: Action,
  snapshot: Snapshot,
) -> Revision {
  store
    .record(
      ChangeContext::at(actor, ts(at)),
      NewRevision::new(id, action, snapshot),
    )
    .await
    .unwrap()
}

/// A store backed by a throwaway file, so rows can be damaged through a
/// second connection.
async fn file_setup() -> (PathBuf, SqliteStore, Timeline<SqliteStore>) {
  let dir = std::env::temp_dir().join(format!("chronicle-{}", Uuid::new_v4()));
  std::fs::create_dir_all(&dir).unwrap();
  let store = SqliteStore::open(dir.join("audit.db")).await.unwrap();
  let timeline =
    Timeline::new(store.clone(), ActivityConfig::default()).with_today(today());
  (dir, store, timeline)
}

fn corrupt_snapshot(dir: &Path, kind: EntityKind, revision: &Revision) {
  let conn = rusqlite::Connection::open(dir.join("audit.db")).unwrap();
  let changed = conn
    .execute(
      &format!(
        "UPDATE {} SET snapshot_json = '{{bad' WHERE revision_id = ?1",
        kind.revision_table()
      ),
      [revision.revision_id.hyphenated().to_string()],
    )
    .unwrap();
  assert_eq!(changed, 1);
}

// ─── Safe links ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn soft_deleted_provider_keeps_its_name_but_loses_its_link() {
  let (store, timeline) = setup().await;
  let actor = Uuid::new_v4();
  let p = Uuid::new_v4();

  record(&store, actor, 1, p, Action::Create, Snapshot::Provider(provider("Oak SCITT"))).await;
  record(
    &store,
    actor,
    2,
    Uuid::new_v4(),
    Action::Create,
    Snapshot::ProviderAddress(AddressSnapshot {
      provider_id: p,
      line_1:      Some("1 High Street".into()),
      line_2:      None,
      line_3:      None,
      town:        Some("York".into()),
      county:      None,
      postcode:    "YO1 1AA".into(),
      latitude:    Some(53.96),
      longitude:   Some(-1.08),
      deleted_at:  None,
    }),
  )
  .await;

  let page = timeline
    .timeline(&TimelineFilter::entity(p), PageRequest::default())
    .await
    .unwrap();
  let address = &page.items[0].summary;
  assert_eq!(address.activity, "Provider address added");
  assert_eq!(address.label, "Oak SCITT");
  assert_eq!(address.href, Some(format!("/providers/{p}/addresses")));

  let mut deleted = provider("Oak SCITT");
  deleted.deleted_at = Some(ts(3));
  record(&store, actor, 3, p, Action::Update, Snapshot::Provider(deleted)).await;

  let page = timeline
    .timeline(&TimelineFilter::entity(p), PageRequest::default())
    .await
    .unwrap();
  assert_eq!(page.total_count, 3);
  for item in &page.items {
    assert_eq!(item.summary.label, "Oak SCITT");
    assert!(item.summary.href.is_none(), "{:?}", item.summary);
  }
}

#[tokio::test]
async fn archived_provider_is_still_linked() {
  let (store, timeline) = setup().await;
  let actor = Uuid::new_v4();
  let p = Uuid::new_v4();

  record(&store, actor, 1, p, Action::Create, Snapshot::Provider(provider("Elm"))).await;
  let mut archived = provider("Elm");
  archived.archived_at = Some(ts(2));
  record(&store, actor, 2, p, Action::Update, Snapshot::Provider(archived)).await;
  record(&store, actor, 3, p, Action::Update, Snapshot::Provider(provider("Elm"))).await;
  record(&store, actor, 4, p, Action::Update, Snapshot::Provider(provider("Elm Trust"))).await;

  let page = timeline
    .timeline(&TimelineFilter::entity(p), PageRequest::default())
    .await
    .unwrap();
  let activities: Vec<_> =
    page.items.iter().map(|i| i.summary.activity.as_str()).collect();
  assert_eq!(activities, [
    "Provider updated",
    "Provider restored",
    "Provider archived",
    "Provider added",
  ]);
  assert_eq!(page.items[0].summary.label, "Elm Trust");
  assert_eq!(page.items[0].summary.href, Some(format!("/providers/{p}")));
}

#[tokio::test]
async fn actor_links_resolve_to_user_names() {
  let (store, timeline) = setup().await;
  let ada = Uuid::new_v4();
  let stranger = Uuid::new_v4();

  record(
    &store,
    ada,
    1,
    ada,
    Action::Create,
    Snapshot::User(UserSnapshot {
      first_name: Some("Ada".into()),
      last_name:  Some("Lovelace".into()),
      email:      "ada@example.com".into(),
      is_active:  true,
      deleted_at: None,
    }),
  )
  .await;
  record(&store, stranger, 2, Uuid::new_v4(), Action::Create, academic_year(2025)).await;

  let page = timeline.global(PageRequest::default()).await.unwrap();
  assert_eq!(page.items[0].changed_by.text, "Unknown user");
  assert!(page.items[0].changed_by.href.is_none());
  assert_eq!(page.items[1].changed_by.text, "Ada Lovelace");
  assert_eq!(page.items[1].changed_by.href, Some(format!("/users/{ada}")));
}

// ─── Link sets ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn partnership_shows_academic_years_as_of_each_change() {
  let (store, timeline) = setup().await;
  let actor = Uuid::new_v4();
  let (accredited, training) = (Uuid::new_v4(), Uuid::new_v4());
  let (y24, y25, y26) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
  let partnership_id = Uuid::new_v4();

  record(&store, actor, 0, accredited, Action::Create, Snapshot::Provider(provider("Oak University"))).await;
  record(&store, actor, 0, training, Action::Create, Snapshot::Provider(provider("Ash SCITT"))).await;
  for (id, start) in [(y24, 2024), (y25, 2025), (y26, 2026)] {
    record(&store, actor, 0, id, Action::Create, academic_year(start)).await;
  }

  let partnership = |ends: Option<NaiveDate>| {
    Snapshot::ProviderPartnership(PartnershipSnapshot {
      accredited_provider_id: accredited,
      training_partner_id:    training,
      starts_on:              NaiveDate::from_ymd_opt(2024, 8, 1),
      ends_on:                ends,
      deleted_at:             None,
    })
  };
  let kind = LinkKind::PartnershipAcademicYear;

  // Created together with {2024, 2025}.
  let created = ChangeContext::at(actor, ts(10));
  store
    .record(created, NewRevision::new(partnership_id, Action::Create, partnership(None)))
    .await
    .unwrap();
  store.link_many(created, kind, partnership_id, vec![y24, y25]).await.unwrap();

  // Later edited: 2024 swapped for 2026.
  let edited = ChangeContext::at(actor, ts(20));
  store.unlink(edited, kind, partnership_id, y24).await.unwrap();
  store.link(edited, kind, partnership_id, y26).await.unwrap();
  store
    .record(
      edited,
      NewRevision::new(
        partnership_id,
        Action::Update,
        partnership(NaiveDate::from_ymd_opt(2027, 7, 31)),
      ),
    )
    .await
    .unwrap();

  let page = timeline
    .timeline(&TimelineFilter::entity(partnership_id), PageRequest::default())
    .await
    .unwrap();
  // Link entries for partnerships are excluded by default.
  assert_eq!(page.total_count, 2);

  let update = &page.items[0].summary;
  assert_eq!(update.activity, "Provider partnership updated");
  assert_eq!(update.label, "Oak University – Ash SCITT");
  assert_eq!(
    update.href,
    Some(format!("/providers/{accredited}/partnerships"))
  );
  let Some(SummaryExtras::Partnership { academic_years, dates, .. }) =
    &update.extras
  else {
    panic!("expected partnership extras, got {:?}", update.extras);
  };
  let ids = |items: &[crate::summary::AcademicYearItem]| {
    items.iter().map(|i| i.id).collect::<Vec<_>>()
  };
  assert_eq!(ids(&academic_years.linked), vec![y25, y26]);
  assert_eq!(ids(&academic_years.added), vec![y26]);
  assert_eq!(ids(&academic_years.removed), vec![y24]);
  assert_eq!(dates.ends_on.as_deref(), Some("31 July 2027"));
  assert_eq!(academic_years.linked[0].status, Some(YearStatus::Current));
  assert_eq!(academic_years.linked[1].text, "2026 to 2027 - next");

  let create = &page.items[1].summary;
  assert_eq!(create.activity, "Provider partnership added");
  let Some(SummaryExtras::Partnership { academic_years, .. }) = &create.extras
  else {
    panic!("expected partnership extras");
  };
  assert_eq!(ids(&academic_years.linked), vec![y24, y25]);
  assert_eq!(ids(&academic_years.added), vec![y24, y25]);
  assert!(academic_years.removed.is_empty());
  let years_field = create
    .fields
    .iter()
    .find(|f| f.key == "Academic years")
    .unwrap();
  assert_eq!(years_field.value.as_deref(), Some("2024 to 2025, 2025 to 2026"));
}

#[tokio::test]
async fn bulk_academic_year_selection_reads_as_one_event() {
  let (store, timeline) = setup().await;
  let actor = Uuid::new_v4();
  let p = Uuid::new_v4();
  let years: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
  let extra = Uuid::new_v4();

  record(&store, actor, 1, p, Action::Create, Snapshot::Provider(provider("Oak"))).await;
  for (i, id) in years.iter().chain([&extra]).enumerate() {
    record(&store, actor, 1, *id, Action::Create, academic_year(2023 + i as i32)).await;
  }

  let kind = LinkKind::ProviderAcademicYear;
  store
    .link_many(ChangeContext::at(actor, ts(2)), kind, p, years.clone())
    .await
    .unwrap();

  let page = timeline
    .timeline(
      &TimelineFilter {
        entity_id: Some(p),
        kinds: vec![EntityKind::ProviderAcademicYear],
        ..Default::default()
      },
      PageRequest::default(),
    )
    .await
    .unwrap();
  assert_eq!(page.total_count, 1);
  let first = &page.items[0].summary;
  assert_eq!(first.activity, "Provider academic years added");
  assert_eq!(first.href, Some(format!("/providers/{p}")));
  let Some(SummaryExtras::ProviderAcademicYears { academic_years }) =
    &first.extras
  else {
    panic!("expected academic year extras");
  };
  assert_eq!(academic_years.linked.len(), 3);
  assert_eq!(academic_years.added.len(), 3);
  assert_eq!(first.fields[0].key, "Academic years");

  store
    .link(ChangeContext::at(actor, ts(3)), kind, p, extra)
    .await
    .unwrap();
  let page = timeline
    .timeline(&TimelineFilter::entity(p), PageRequest::default())
    .await
    .unwrap();
  assert_eq!(page.total_count, 3);
  assert_eq!(page.items[0].summary.activity, "Provider academic years updated");
}

// ─── Other kinds ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn revoking_an_api_client_is_called_out() {
  let (store, timeline) = setup().await;
  let actor = Uuid::new_v4();
  let token = Uuid::new_v4();
  let snap = |status| {
    Snapshot::ApiClientToken(ApiClientTokenSnapshot {
      client_name: "Register".into(),
      status,
      expires_at: None,
      deleted_at: None,
    })
  };

  record(&store, actor, 1, token, Action::Create, snap(TokenStatus::Active)).await;
  record(&store, actor, 2, token, Action::Update, snap(TokenStatus::Revoked)).await;
  record(&store, actor, 3, token, Action::Update, snap(TokenStatus::Revoked)).await;

  let page = timeline
    .timeline(&TimelineFilter::entity(token), PageRequest::default())
    .await
    .unwrap();
  let activities: Vec<_> =
    page.items.iter().map(|i| i.summary.activity.as_str()).collect();
  assert_eq!(activities, ["API client updated", "API client revoked", "API client added"]);
  assert_eq!(page.items[0].summary.href, Some(format!("/api-clients/{token}")));
  assert_eq!(
    page.items[0].summary.fields[1].value.as_deref(),
    Some("Not entered")
  );
}

#[tokio::test]
async fn unreadable_entries_degrade_to_a_placeholder() {
  let (store, _) = setup().await;
  let actor = Uuid::new_v4();
  let p = Uuid::new_v4();
  let provider_rev =
    record(&store, actor, 1, p, Action::Create, Snapshot::Provider(provider("Oak"))).await;
  let year_rev =
    record(&store, actor, 2, Uuid::new_v4(), Action::Create, academic_year(2025)).await;

  let entries = store
    .query_activity(&ActivityQuery { entity_id: Some(p), ..Default::default() })
    .await
    .unwrap();
  let config = ActivityConfig::default();
  let projector = Projector::new(&store, &config, today());

  let missing = projector.project(&entries[0], None).await;
  assert!(missing.is_unavailable());
  assert_eq!(missing.action, Action::Create);

  let mismatched = projector.project(&entries[0], Some(&year_rev)).await;
  assert!(mismatched.is_unavailable());

  let fine = projector.project(&entries[0], Some(&provider_rev)).await;
  assert_eq!(fine.activity, "Provider added");
}

#[tokio::test]
async fn undecodable_revision_degrades_only_its_own_entry() {
  let (dir, store, timeline) = file_setup().await;
  let actor = Uuid::new_v4();
  let p = Uuid::new_v4();

  record(&store, actor, 1, p, Action::Create, Snapshot::Provider(provider("Oak"))).await;
  let contact = record(
    &store,
    actor,
    2,
    Uuid::new_v4(),
    Action::Create,
    Snapshot::ProviderContact(ContactSnapshot {
      provider_id: p,
      first_name:  Some("Grace".into()),
      last_name:   None,
      email:       None,
      telephone:   None,
      deleted_at:  None,
    }),
  )
  .await;
  record(&store, actor, 3, p, Action::Update, Snapshot::Provider(provider("Oak SCITT"))).await;

  corrupt_snapshot(&dir, EntityKind::ProviderContact, &contact);

  let page = timeline
    .timeline(&TimelineFilter::entity(p), PageRequest::default())
    .await
    .unwrap();
  assert_eq!(page.total_count, 3);
  assert_eq!(page.items.len(), 3);

  assert!(page.items[1].summary.is_unavailable());
  assert_eq!(page.items[1].revision_kind, EntityKind::ProviderContact);
  assert_eq!(page.items[0].summary.activity, "Provider updated");
  assert_eq!(page.items[2].summary.activity, "Provider added");
  assert_eq!(
    page.items.iter().filter(|i| i.summary.is_unavailable()).count(),
    1
  );

  std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn unreadable_actor_is_shown_as_unknown() {
  let (dir, store, timeline) = file_setup().await;
  let ada = Uuid::new_v4();
  let p = Uuid::new_v4();

  let user = record(
    &store,
    ada,
    1,
    ada,
    Action::Create,
    Snapshot::User(UserSnapshot {
      first_name: Some("Ada".into()),
      last_name:  Some("Lovelace".into()),
      email:      "ada@example.com".into(),
      is_active:  true,
      deleted_at: None,
    }),
  )
  .await;
  record(&store, ada, 2, p, Action::Create, Snapshot::Provider(provider("Oak"))).await;

  corrupt_snapshot(&dir, EntityKind::User, &user);

  let page = timeline
    .timeline(&TimelineFilter::entity(p), PageRequest::default())
    .await
    .unwrap();
  assert_eq!(page.items.len(), 1);
  assert_eq!(page.items[0].changed_by.text, "Unknown user");
  assert!(page.items[0].changed_by.href.is_none());
  assert_eq!(page.items[0].summary.activity, "Provider added");
  assert_eq!(page.items[0].summary.label, "Oak");

  std::fs::remove_dir_all(&dir).ok();
}

// ─── Reads ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn timeline_without_a_filter_is_rejected() {
  let (_, timeline) = setup().await;
  let err = timeline
    .timeline(&TimelineFilter::default(), PageRequest::default())
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Core(chronicle_core::Error::MissingFilter)));
}

#[tokio::test]
async fn global_feed_pages_and_groups_by_day() {
  let (store, timeline) = setup().await;
  let actor = Uuid::new_v4();
  for (i, name) in ["a", "b", "c"].into_iter().enumerate() {
    record(
      &store,
      actor,
      i as i64 * 86_400,
      Uuid::new_v4(),
      Action::Create,
      Snapshot::Provider(provider(name)),
    )
    .await;
  }

  let first = timeline.global(PageRequest::page(1, 2)).await.unwrap();
  assert_eq!(first.items.len(), 2);
  assert_eq!(first.total_count, 3);
  assert_eq!(first.page_count(), 2);
  assert_eq!(first.items[0].summary.label, "c");

  let second = timeline.global(PageRequest::page(2, 2)).await.unwrap();
  assert_eq!(second.items.len(), 1);
  assert_eq!(second.items[0].summary.label, "a");

  let day_after_last = (ts(2 * 86_400)).date_naive().succ_opt().unwrap();
  let groups =
    group_by_day(first.items, day_after_last, &timeline.config().timezone);
  assert_eq!(groups.len(), 2);
  assert_eq!(groups[0].label, "Yesterday");
}

#[tokio::test]
async fn last_changed_skips_deleted_children_unless_asked() {
  let (store, timeline) = setup().await;
  let actor = Uuid::new_v4();
  let p = Uuid::new_v4();
  let contact_id = Uuid::new_v4();

  let contact = |deleted_at| {
    Snapshot::ProviderContact(ContactSnapshot {
      provider_id: p,
      first_name: Some("Grace".into()),
      last_name: None,
      email: None,
      telephone: None,
      deleted_at,
    })
  };

  record(&store, actor, 1, p, Action::Create, Snapshot::Provider(provider("Oak"))).await;
  record(&store, actor, 5, contact_id, Action::Create, contact(None)).await;

  let live = timeline
    .last_changed(p, LastChangedOptions::default())
    .await
    .unwrap()
    .unwrap();
  assert_eq!(live.changed_at, ts(5));
  assert_eq!(live.revision_kind, EntityKind::ProviderContact);

  record(&store, actor, 6, contact_id, Action::Update, contact(Some(ts(6)))).await;

  let skipping = timeline
    .last_changed(p, LastChangedOptions::default())
    .await
    .unwrap()
    .unwrap();
  assert_eq!(skipping.changed_at, ts(1));
  assert_eq!(skipping.revision_kind, EntityKind::Provider);

  let including = timeline
    .last_changed(p, LastChangedOptions { include_deleted_children: true })
    .await
    .unwrap()
    .unwrap();
  assert_eq!(including.changed_at, ts(6));
  assert_eq!(including.revision_number, 2);

  let nothing = timeline
    .last_changed(Uuid::new_v4(), LastChangedOptions::default())
    .await
    .unwrap();
  assert!(nothing.is_none());
}
