//! Safe links: references to other entities that only become hyperlinks
//! when the target may still be shown.
//!
//! The target's state is taken from its latest revision, which sees
//! soft-deleted and deactivated entities that ordinary listings hide.

use chronicle_core::{
  kind::{Action, EntityKind},
  revision::Revision,
  store::AuditStore,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafeLink {
  pub text: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub href: Option<String>,
}

impl SafeLink {
  pub fn plain(text: impl Into<String>) -> Self {
    Self { text: text.into(), href: None }
  }

  /// The href of a sub-page, e.g. `/providers/{id}/contacts`, only when
  /// this link has one.
  pub fn section(&self, name: &str) -> Option<String> {
    self.href.as_ref().map(|href| format!("{href}/{name}"))
  }
}

/// Canonical path of an entity's page, for kinds that have one.
pub fn entity_path(kind: EntityKind, id: Uuid) -> Option<String> {
  match kind {
    EntityKind::Provider => Some(format!("/providers/{id}")),
    EntityKind::User => Some(format!("/users/{id}")),
    EntityKind::AcademicYear => Some(format!("/settings/academic-years/{id}")),
    EntityKind::ApiClientToken => Some(format!("/api-clients/{id}")),
    EntityKind::ProviderAddress
    | EntityKind::ProviderContact
    | EntityKind::ProviderAccreditation
    | EntityKind::ProviderPartnership
    | EntityKind::ProviderAcademicYear
    | EntityKind::PartnershipAcademicYear => None,
  }
}

/// Whether an entity whose latest revision is `current` may be linked to.
pub fn is_linkable(current: &Revision) -> bool {
  current.action != Action::Delete && current.snapshot.is_listable()
}

/// Build a link to `(kind, id)`.
///
/// The text is the entity's current display name, or `fallback` when it has
/// none or was never recorded. The href is set only if the entity exists
/// and [`is_linkable`].
pub async fn resolve<S: AuditStore>(
  store: &S,
  kind: EntityKind,
  id: Uuid,
  fallback: &str,
) -> Result<SafeLink> {
  let Some(current) = store.latest(kind, id).await.map_err(Error::store)?
  else {
    return Ok(SafeLink::plain(fallback));
  };

  let text = current
    .snapshot
    .display_name()
    .unwrap_or_else(|| fallback.to_owned());
  let href = if is_linkable(&current) {
    entity_path(kind, id)
  } else {
    None
  };
  Ok(SafeLink { text, href })
}
