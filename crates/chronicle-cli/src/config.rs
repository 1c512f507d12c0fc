//! CLI configuration: an optional TOML file layered under
//! `CHRONICLE_`-prefixed environment variables.
//!
//! Nested keys use a double underscore, e.g.
//! `CHRONICLE_ACTIVITY__PAGE_SIZE=50`.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use chronicle_activity::ActivityConfig;
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CliConfig {
  pub store_path: PathBuf,
  /// Default actor for writes; `--actor` overrides it.
  pub actor_id:   Option<Uuid>,
  pub activity:   ActivityConfig,
}

impl Default for CliConfig {
  fn default() -> Self {
    Self {
      store_path: PathBuf::from("chronicle.db"),
      actor_id:   None,
      activity:   ActivityConfig::default(),
    }
  }
}

impl CliConfig {
  /// Read `path` (if it exists) and the environment.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(
        config::Environment::with_prefix("CHRONICLE")
          .prefix_separator("_")
          .separator("__")
          .try_parsing(true),
      )
      .build()
      .context("failed to read config file")?;

    let mut cfg: CliConfig = settings
      .try_deserialize()
      .context("failed to deserialise CliConfig")?;
    cfg.store_path = expand_tilde(&cfg.store_path);
    Ok(cfg)
  }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
