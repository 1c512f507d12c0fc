//! `chronicle`: record and read the audit trail from the command line.
//!
//! Reads `chronicle.toml` (or the path given with `--config`) and
//! `CHRONICLE_*` environment variables, opens the SQLite store, runs one
//! subcommand and prints its result as JSON.
//!
//! # Usage
//!
//! ```text
//! chronicle --actor $ME record provider $ID create '{"operating_name":"Oak SCITT"}'
//! chronicle timeline --entity $ID --page 2
//! chronicle as-of partnership_academic_year $PARTNERSHIP --at 2025-09-01T00:00:00Z
//! ```

mod commands;
mod config;

use std::path::PathBuf;

use anyhow::Context as _;
use chronicle_activity::Timeline;
use chronicle_store_sqlite::SqliteStore;
use clap::Parser;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::{commands::Command, config::CliConfig};

#[derive(Parser)]
#[command(author, version, about = "Chronicle audit trail")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "chronicle.toml")]
  config: PathBuf,

  /// Actor recorded on writes; overrides `actor_id` in the config.
  #[arg(long, global = true)]
  actor: Option<Uuid>,

  #[command(subcommand)]
  command: Command,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Logs go to stderr so stdout stays machine-readable.
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let cfg = CliConfig::load(&cli.config)?;

  let store = SqliteStore::open(&cfg.store_path)
    .await
    .with_context(|| format!("failed to open store at {:?}", cfg.store_path))?;
  tracing::debug!(path = ?cfg.store_path, "opened store");

  let actor = cli.actor.or(cfg.actor_id);
  let timeline = Timeline::new(store, cfg.activity);

  let output = commands::run(cli.command, &timeline, actor).await?;
  println!("{}", serde_json::to_string_pretty(&output)?);

  Ok(())
}
