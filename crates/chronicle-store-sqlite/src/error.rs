//! Error type for `chronicle-store-sqlite`.

use chronicle_core::kind::LinkKind;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] chronicle_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A stored value that no longer fits its column's domain type.
  #[error("corrupt row: {0}")]
  Corrupt(String),

  #[error("{target_id} is already linked in {kind} set {set_id}")]
  AlreadyLinked {
    kind:      LinkKind,
    set_id:    Uuid,
    target_id: Uuid,
  },

  #[error("{target_id} is not linked in {kind} set {set_id}")]
  NotLinked {
    kind:      LinkKind,
    set_id:    Uuid,
    target_id: Uuid,
  },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
