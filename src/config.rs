use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "https://api.trello.com/1";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub api: ApiConfig,
  #[serde(default)]
  pub queue: QueueConfig,
  #[serde(default)]
  pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  #[serde(default = "default_api_url")]
  pub url: String,
  /// Application key; the user token comes from the environment.
  pub key: String,
}

fn default_api_url() -> String {
  DEFAULT_API_URL.to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueueConfig {
  /// Drain queued writes this many milliseconds after the first one.
  /// Unset or zero waits for an explicit flush.
  pub flush_delay_ms: Option<u64>,
}

impl QueueConfig {
  pub fn flush_delay(&self) -> Option<Duration> {
    self
      .flush_delay_ms
      .filter(|ms| *ms > 0)
      .map(Duration::from_millis)
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
  /// Default filter directive, overridden by RUST_LOG.
  #[serde(default = "default_log_level")]
  pub level: String,
  /// Directory for the daily log file (default: data dir).
  pub directory: Option<PathBuf>,
}

fn default_log_level() -> String {
  "info".to_string()
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      level: default_log_level(),
      directory: None,
    }
  }
}

impl LogConfig {
  pub fn directory(&self) -> PathBuf {
    self.directory.clone().unwrap_or_else(|| {
      dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("trello-sync")
    })
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./trello-sync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/trello-sync/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/trello-sync/config.yaml"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("trello-sync.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("trello-sync").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;
    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn parse(contents: &str) -> Result<Self> {
    serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))
  }

  /// Get the user token from environment variables.
  ///
  /// Checks TRELLO_SYNC_TOKEN first, then TRELLO_TOKEN as fallback.
  pub fn get_api_token() -> Result<String> {
    std::env::var("TRELLO_SYNC_TOKEN")
      .or_else(|_| std::env::var("TRELLO_TOKEN"))
      .map_err(|_| {
        eyre!("Trello token not found. Set TRELLO_SYNC_TOKEN or TRELLO_TOKEN environment variable.")
      })
  }
}
