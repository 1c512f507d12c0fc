//! Error types for `chronicle-core`.

use thiserror::Error;
use uuid::Uuid;

use crate::kind::EntityKind;

#[derive(Debug, Error)]
pub enum Error {
  /// A kind discriminant outside the closed registry. Indicates a
  /// code/schema mismatch and is never user-recoverable.
  #[error("unknown entity kind: {0:?}")]
  UnknownEntityKind(String),

  #[error("unknown action: {0:?}")]
  UnknownAction(String),

  #[error("unknown link kind: {0:?}")]
  UnknownLinkKind(String),

  #[error("a timeline query needs an entity id or an actor id")]
  MissingFilter,

  #[error("revision {revision_id} is a {found} revision, expected {expected}")]
  KindMismatch {
    revision_id: Uuid,
    expected:    EntityKind,
    found:       EntityKind,
  },

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
