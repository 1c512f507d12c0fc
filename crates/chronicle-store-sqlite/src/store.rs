//! [`SqliteStore`], the SQLite implementation of [`AuditStore`].

use std::{
  collections::{BTreeSet, HashMap},
  path::Path,
};

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension as _, TransactionBehavior, types::Value};
use strum::IntoEnumIterator;
use uuid::Uuid;

use chronicle_core::{
  kind::{Action, EntityKind, LinkKind},
  link::{LinkRow, active_targets},
  revision::{ActivityLogEntry, ChangeContext, NewRevision, Revision},
  snapshot::{AcademicYearLinkSnapshot, Snapshot},
  store::{ActivityQuery, AuditStore, HydratedEntry},
};

use crate::{
  Error, Result,
  encode::{
    ACTIVITY_COLUMNS, LINK_COLUMNS, REVISION_COLUMNS, RawActivity, RawLinkRow,
    RawRevision, RevisionWrite, decode_revision_number, encode_dt, encode_uuid,
  },
  schema::schema,
};

/// Upper bound on bound parameters per `IN (...)` lookup.
const HYDRATE_CHUNK: usize = 500;

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Chronicle audit store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    let ddl = schema();
    self
      .conn
      .call(move |conn| {
        conn.execute_batch(&ddl)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Fetch at most one revision of `kind` matching `clause`, which is
  /// appended after `FROM <table>`.
  async fn revision_where(
    &self,
    kind: EntityKind,
    clause: &'static str,
    params: Vec<Value>,
  ) -> Result<Option<Revision>> {
    let table = kind.revision_table();
    let raw: Option<RawRevision> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {REVISION_COLUMNS} FROM {table} {clause}"),
              rusqlite::params_from_iter(params),
              RawRevision::from_row,
            )
            .optional()?,
        )
      })
      .await?;
    raw.map(|r| r.into_revision(kind)).transpose()
  }
}

// ─── Activity query builder ──────────────────────────────────────────────────

/// Revision tables carrying provider foreign keys, joined so that a provider
/// id also matches the activity of the entities it owns.
fn provider_ref_kinds() -> impl Iterator<Item = EntityKind> {
  EntityKind::iter().filter(|k| k.is_provider_child())
}

fn join_alias(kind: EntityKind) -> String { format!("r_{}", kind.as_str()) }

/// Build the phase-1 activity SQL and its positional parameters.
fn activity_sql(query: &ActivityQuery) -> (String, Vec<Value>) {
  let mut params: Vec<Value> = Vec::new();
  let mut joins = String::new();
  let mut wheres: Vec<String> = Vec::new();

  if let Some(entity_id) = query.entity_id {
    params.push(Value::Text(encode_uuid(entity_id)));
    let n = params.len();
    let mut any = vec![format!("a.entity_id = ?{n}"), format!("a.subject_id = ?{n}")];
    for kind in provider_ref_kinds() {
      let alias = join_alias(kind);
      joins.push_str(&format!(
        "\nLEFT JOIN {table} {alias} \
         ON a.revision_kind = '{k}' AND {alias}.revision_id = a.revision_id",
        table = kind.revision_table(),
        k = kind.as_str(),
      ));
      any.push(format!("{alias}.provider_id = ?{n}"));
      any.push(format!("{alias}.partner_provider_id = ?{n}"));
    }
    wheres.push(format!("({})", any.join(" OR ")));
  }

  if let Some(actor_id) = query.actor_id {
    params.push(Value::Text(encode_uuid(actor_id)));
    wheres.push(format!("a.changed_by = ?{}", params.len()));
  }

  let mut kind_list = |kinds: &[EntityKind], op: &str| {
    if kinds.is_empty() {
      return;
    }
    let slots: Vec<String> = kinds
      .iter()
      .map(|k| {
        params.push(Value::Text(k.as_str().to_owned()));
        format!("?{}", params.len())
      })
      .collect();
    wheres.push(format!("a.revision_kind {op} ({})", slots.join(", ")));
  };
  kind_list(&query.kinds, "IN");
  kind_list(&query.exclude_kinds, "NOT IN");

  let mut sql = format!("SELECT {ACTIVITY_COLUMNS} FROM activity_log a{joins}");
  if !wheres.is_empty() {
    sql.push_str("\nWHERE ");
    sql.push_str(&wheres.join("\n  AND "));
  }
  sql.push_str("\nORDER BY a.changed_at DESC, a.log_id DESC");

  if query.limit.is_some() || query.offset.is_some() {
    // SQLite treats a negative LIMIT as "no limit".
    let limit = query.limit.map_or(-1, |l| l as i64);
    params.push(Value::Integer(limit));
    sql.push_str(&format!("\nLIMIT ?{}", params.len()));
    params.push(Value::Integer(query.offset.unwrap_or(0) as i64));
    sql.push_str(&format!(" OFFSET ?{}", params.len()));
  }

  (sql, params)
}

// ─── AuditStore impl ─────────────────────────────────────────────────────────

impl AuditStore for SqliteStore {
  type Error = Error;

  // ── Revision ledger: writes ──────────────────────────────────────────────

  async fn record(
    &self,
    ctx: ChangeContext,
    input: NewRevision,
  ) -> Result<Revision> {
    let revision_id = Uuid::new_v4();
    let write = RevisionWrite::new(ctx, revision_id, &input)?;

    let number: i64 = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let number = write.execute(&tx)?;
        tx.commit()?;
        Ok(number)
      })
      .await?;

    let revision = Revision {
      revision_id,
      entity_id: input.entity_id,
      revision_number: decode_revision_number(number)?,
      revision_at: ctx.at,
      action: input.action,
      changed_by: ctx.actor_id,
      snapshot: input.snapshot,
    };

    tracing::debug!(
      kind = %revision.kind(),
      entity_id = %revision.entity_id,
      revision_number = revision.revision_number,
      action = %revision.action,
      "recorded revision"
    );

    Ok(revision)
  }

  // ── Link rows: writes ────────────────────────────────────────────────────

  async fn link(
    &self,
    ctx: ChangeContext,
    kind: LinkKind,
    set_id: Uuid,
    target_id: Uuid,
  ) -> Result<LinkRow> {
    let link_id = Uuid::new_v4();
    let snapshot = link_snapshot(kind, set_id, target_id, None);
    let write = RevisionWrite::new(
      ctx,
      Uuid::new_v4(),
      &NewRevision::new(link_id, Action::Create, snapshot),
    )?;

    let table = kind.table();
    let link_str = encode_uuid(link_id);
    let set_str = encode_uuid(set_id);
    let target_str = encode_uuid(target_id);
    let at_str = encode_dt(ctx.at);

    let inserted: bool = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let active: bool = tx
          .query_row(
            &format!(
              "SELECT 1 FROM {table}
               WHERE set_id = ?1 AND target_id = ?2 AND deleted_at IS NULL"
            ),
            rusqlite::params![set_str, target_str],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);
        if active {
          return Ok(false);
        }

        tx.execute(
          &format!(
            "INSERT INTO {table} (link_id, set_id, target_id, created_at)
             VALUES (?1, ?2, ?3, ?4)"
          ),
          rusqlite::params![link_str, set_str, target_str, at_str],
        )?;
        write.execute(&tx)?;
        tx.commit()?;
        Ok(true)
      })
      .await?;

    if !inserted {
      return Err(Error::AlreadyLinked { kind, set_id, target_id });
    }

    tracing::debug!(%kind, %set_id, %target_id, "linked");

    Ok(LinkRow {
      link_id,
      kind,
      set_id,
      target_id,
      created_at: ctx.at,
      deleted_at: None,
    })
  }

  async fn unlink(
    &self,
    ctx: ChangeContext,
    kind: LinkKind,
    set_id: Uuid,
    target_id: Uuid,
  ) -> Result<LinkRow> {
    // The link entity id is only known once the active row is found; the
    // rest of the revision is fixed by the arguments.
    let snapshot = link_snapshot(kind, set_id, target_id, Some(ctx.at));
    let mut write = RevisionWrite::new(
      ctx,
      Uuid::new_v4(),
      &NewRevision::new(Uuid::nil(), Action::Delete, snapshot),
    )?;

    let table = kind.table();
    let set_str = encode_uuid(set_id);
    let target_str = encode_uuid(target_id);
    let at_str = encode_dt(ctx.at);

    let raw: Option<RawLinkRow> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let Some(mut raw) = tx
          .query_row(
            &format!(
              "SELECT {LINK_COLUMNS} FROM {table}
               WHERE set_id = ?1 AND target_id = ?2 AND deleted_at IS NULL"
            ),
            rusqlite::params![set_str, target_str],
            RawLinkRow::from_row,
          )
          .optional()?
        else {
          return Ok(None);
        };

        tx.execute(
          &format!("UPDATE {table} SET deleted_at = ?1 WHERE link_id = ?2"),
          rusqlite::params![at_str, raw.link_id],
        )?;
        write.entity_id = raw.link_id.clone();
        write.execute(&tx)?;
        tx.commit()?;

        raw.deleted_at = Some(at_str);
        Ok(Some(raw))
      })
      .await?;

    let row = raw
      .ok_or(Error::NotLinked { kind, set_id, target_id })?
      .into_link_row(kind)?;

    tracing::debug!(%kind, %set_id, %target_id, "unlinked");

    Ok(row)
  }

  // ── Revision ledger: reads ───────────────────────────────────────────────

  async fn find_revision(
    &self,
    kind: EntityKind,
    revision_id: Uuid,
  ) -> Result<Option<Revision>> {
    self
      .revision_where(kind, "WHERE revision_id = ?1", vec![Value::Text(
        encode_uuid(revision_id),
      )])
      .await
  }

  async fn previous<'a>(
    &'a self,
    revision: &'a Revision,
  ) -> Result<Option<Revision>> {
    self
      .revision_where(
        revision.kind(),
        "WHERE entity_id = ?1 AND revision_number < ?2
         ORDER BY revision_number DESC LIMIT 1",
        entity_and_number(revision),
      )
      .await
  }

  async fn next<'a>(&'a self, revision: &'a Revision) -> Result<Option<Revision>> {
    self
      .revision_where(
        revision.kind(),
        "WHERE entity_id = ?1 AND revision_number > ?2
         ORDER BY revision_number ASC LIMIT 1",
        entity_and_number(revision),
      )
      .await
  }

  async fn latest(
    &self,
    kind: EntityKind,
    entity_id: Uuid,
  ) -> Result<Option<Revision>> {
    self
      .revision_where(
        kind,
        "WHERE entity_id = ?1 ORDER BY revision_number DESC LIMIT 1",
        vec![Value::Text(encode_uuid(entity_id))],
      )
      .await
  }

  async fn history(
    &self,
    kind: EntityKind,
    entity_id: Uuid,
  ) -> Result<Vec<Revision>> {
    let table = kind.revision_table();
    let id_str = encode_uuid(entity_id);

    let raws: Vec<RawRevision> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {REVISION_COLUMNS} FROM {table}
           WHERE entity_id = ?1 ORDER BY revision_number ASC"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], RawRevision::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(|r| r.into_revision(kind)).collect()
  }

  // ── Activity index ────────────────────────────────────────────────────────

  async fn query_activity<'a>(
    &'a self,
    query: &'a ActivityQuery,
  ) -> Result<Vec<ActivityLogEntry>> {
    let (sql, params) = activity_sql(query);

    let raws: Vec<RawActivity> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params), RawActivity::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawActivity::into_entry).collect()
  }

  async fn hydrate(
    &self,
    entries: Vec<ActivityLogEntry>,
  ) -> Result<Vec<HydratedEntry>> {
    let mut wanted: HashMap<EntityKind, Vec<String>> = HashMap::new();
    for entry in &entries {
      wanted
        .entry(entry.revision_kind)
        .or_default()
        .push(encode_uuid(entry.revision_id));
    }

    let fetched: Vec<(EntityKind, Vec<RawRevision>)> = self
      .conn
      .call(move |conn| {
        let mut out = Vec::with_capacity(wanted.len());
        for (kind, ids) in wanted {
          let table = kind.revision_table();
          let mut raws = Vec::with_capacity(ids.len());
          for chunk in ids.chunks(HYDRATE_CHUNK) {
            let slots = (1..=chunk.len())
              .map(|i| format!("?{i}"))
              .collect::<Vec<_>>()
              .join(", ");
            let mut stmt = conn.prepare(&format!(
              "SELECT {REVISION_COLUMNS} FROM {table}
               WHERE revision_id IN ({slots})"
            ))?;
            let rows = stmt
              .query_map(rusqlite::params_from_iter(chunk), RawRevision::from_row)?
              .collect::<rusqlite::Result<Vec<_>>>()?;
            raws.extend(rows);
          }
          out.push((kind, raws));
        }
        Ok(out)
      })
      .await?;

    let mut loaded: HashMap<(EntityKind, String), Revision> = HashMap::new();
    for (kind, raws) in fetched {
      for raw in raws {
        let key = (kind, raw.revision_id.clone());
        match raw.into_revision(kind) {
          Ok(revision) => {
            loaded.insert(key, revision);
          }
          Err(error) => {
            tracing::warn!(
              %kind,
              revision_id = %key.1,
              %error,
              "could not decode revision; leaving entry unhydrated"
            );
          }
        }
      }
    }

    Ok(
      entries
        .into_iter()
        .map(|entry| {
          let key = (entry.revision_kind, encode_uuid(entry.revision_id));
          let revision = loaded.remove(&key);
          HydratedEntry { entry, revision }
        })
        .collect(),
    )
  }

  // ── Temporal link resolution ──────────────────────────────────────────────

  async fn linked_as_of(
    &self,
    kind: LinkKind,
    set_id: Uuid,
    at: Option<DateTime<Utc>>,
  ) -> Result<BTreeSet<Uuid>> {
    let rows = self.link_rows(kind, set_id).await?;
    Ok(active_targets(&rows, at))
  }

  async fn link_rows(
    &self,
    kind: LinkKind,
    set_id: Uuid,
  ) -> Result<Vec<LinkRow>> {
    let table = kind.table();
    let set_str = encode_uuid(set_id);

    let raws: Vec<RawLinkRow> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {LINK_COLUMNS} FROM {table}
           WHERE set_id = ?1 ORDER BY created_at ASC, link_id ASC"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![set_str], RawLinkRow::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(|r| r.into_link_row(kind)).collect()
  }
}

fn entity_and_number(revision: &Revision) -> Vec<Value> {
  vec![
    Value::Text(encode_uuid(revision.entity_id)),
    Value::Integer(i64::from(revision.revision_number)),
  ]
}

/// The snapshot recorded for a link row's create or delete revision.
fn link_snapshot(
  kind: LinkKind,
  set_id: Uuid,
  target_id: Uuid,
  deleted_at: Option<DateTime<Utc>>,
) -> Snapshot {
  let link = AcademicYearLinkSnapshot {
    owner_id: set_id,
    academic_year_id: target_id,
    deleted_at,
  };
  match kind {
    LinkKind::ProviderAcademicYear => Snapshot::ProviderAcademicYear(link),
    LinkKind::PartnershipAcademicYear => Snapshot::PartnershipAcademicYear(link),
  }
}
