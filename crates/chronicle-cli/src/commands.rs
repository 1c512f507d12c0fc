//! Subcommands. Each returns the JSON document printed on stdout.

use anyhow::{Context as _, bail};
use chrono::{DateTime, Utc};
use chronicle_activity::{LastChangedOptions, Timeline, TimelineFilter};
use chronicle_core::{
  aggregate::{PageRequest, group_by_day},
  kind::{Action, EntityKind, LinkKind},
  revision::ChangeContext,
  store::AuditStore,
};
use clap::Subcommand;
use serde_json::{Value, json};
use uuid::Uuid;

#[derive(Subcommand, Debug)]
pub enum Command {
  /// Record one revision of an entity.
  Record {
    /// Entity kind, e.g. `provider`, `provider_contact`, `user`.
    kind:      String,
    entity_id: Uuid,
    /// `create`, `update` or `delete`.
    action:    String,
    /// The entity's full field snapshot as a JSON object.
    fields:    String,
  },

  /// Add targets to a link set as one change.
  Link {
    /// `provider_academic_year` or `partnership_academic_year`.
    kind:    String,
    set_id:  Uuid,
    #[arg(required = true)]
    targets: Vec<Uuid>,
  },

  /// Remove targets from a link set as one change.
  Unlink {
    kind:    String,
    set_id:  Uuid,
    #[arg(required = true)]
    targets: Vec<Uuid>,
  },

  /// Activity touching an entity and/or written by an actor.
  Timeline {
    #[arg(long)]
    entity: Option<Uuid>,
    /// Filter by who made the change (distinct from the global `--actor`).
    #[arg(long)]
    by:     Option<Uuid>,
    /// Restrict to these revision kinds.
    #[arg(long = "kind")]
    kinds:  Vec<String>,
    #[arg(long, default_value_t = 1)]
    page:   usize,
    /// Group the page by calendar day.
    #[arg(long)]
    by_day: bool,
  },

  /// The site-wide activity feed.
  Feed {
    #[arg(long, default_value_t = 1)]
    page:   usize,
    #[arg(long)]
    by_day: bool,
  },

  /// When an entity or anything it owns last changed.
  LastChanged {
    entity_id:                Uuid,
    #[arg(long)]
    include_deleted_children: bool,
  },

  /// Members of a link set at an instant (default: now).
  AsOf {
    kind:   String,
    set_id: Uuid,
    /// RFC 3339 instant.
    #[arg(long)]
    at:     Option<DateTime<Utc>>,
  },

  /// Every revision of an entity, oldest first.
  History {
    kind:      String,
    entity_id: Uuid,
  },
}

/// Run `command` against `timeline`'s store. `actor` is required for
/// writes.
pub async fn run<S>(
  command: Command,
  timeline: &Timeline<S>,
  actor: Option<Uuid>,
) -> anyhow::Result<Value>
where
  S: AuditStore,
{
  let store = timeline.store();
  let page_size = timeline.config().page_size;

  let value = match command {
    Command::Record { kind, entity_id, action, fields } => {
      let ctx = ChangeContext::new(require_actor(actor)?);
      let action = Action::parse(&action)?;
      let fields: Value =
        serde_json::from_str(&fields).context("fields must be a JSON object")?;
      let revision = store
        .record_change(ctx, &kind, entity_id, action, fields)
        .await?;
      serde_json::to_value(revision)?
    }

    Command::Link { kind, set_id, targets } => {
      let ctx = ChangeContext::new(require_actor(actor)?);
      let rows = store
        .link_many(ctx, LinkKind::parse(&kind)?, set_id, targets)
        .await?;
      serde_json::to_value(rows)?
    }

    Command::Unlink { kind, set_id, targets } => {
      let ctx = ChangeContext::new(require_actor(actor)?);
      let rows = store
        .unlink_many(ctx, LinkKind::parse(&kind)?, set_id, targets)
        .await?;
      serde_json::to_value(rows)?
    }

    Command::Timeline { entity, by, kinds, page, by_day } => {
      let filter = TimelineFilter {
        entity_id: entity,
        actor_id: by,
        kinds: kinds
          .iter()
          .map(|k| EntityKind::parse(k))
          .collect::<Result<_, _>>()?,
        exclude_kinds: Vec::new(),
      };
      let page = timeline
        .timeline(&filter, PageRequest::page(page, page_size))
        .await?;
      if by_day {
        json!({
          "total_count": page.total_count,
          "page_count": page.page_count(),
          "days": group_by_day(
            page.items,
            timeline.today(),
            &timeline.config().timezone,
          ),
        })
      } else {
        serde_json::to_value(page)?
      }
    }

    Command::Feed { page, by_day } => {
      let page = timeline.global(PageRequest::page(page, page_size)).await?;
      if by_day {
        json!({
          "total_count": page.total_count,
          "page_count": page.page_count(),
          "days": group_by_day(
            page.items,
            timeline.today(),
            &timeline.config().timezone,
          ),
        })
      } else {
        serde_json::to_value(page)?
      }
    }

    Command::LastChanged { entity_id, include_deleted_children } => {
      let last = timeline
        .last_changed(entity_id, LastChangedOptions { include_deleted_children })
        .await?;
      serde_json::to_value(last)?
    }

    Command::AsOf { kind, set_id, at } => {
      let targets = store
        .linked_as_of(LinkKind::parse(&kind)?, set_id, at)
        .await?;
      serde_json::to_value(targets)?
    }

    Command::History { kind, entity_id } => {
      let revisions = store
        .history(EntityKind::parse(&kind)?, entity_id)
        .await?;
      serde_json::to_value(revisions)?
    }
  };

  Ok(value)
}

fn require_actor(actor: Option<Uuid>) -> anyhow::Result<Uuid> {
  match actor {
    Some(actor) => Ok(actor),
    None => bail!("writes need an actor: pass --actor or set CHRONICLE_ACTOR_ID"),
  }
}
