use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub api: ApiConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  /// Season shown on the dashboard (defaults to the current year)
  pub current_season: Option<i32>,
  /// Page opened at startup: "dashboard", "stats" or "speed"
  pub start_page: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Origin of the statistics site, e.g. "https://sel.example.com"
  #[serde(default = "default_base_url")]
  pub base_url: String,
  /// Request timeout in seconds; no deadline when unset
  pub timeout_secs: Option<u64>,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      base_url: default_base_url(),
      timeout_secs: None,
    }
  }
}

fn default_base_url() -> String {
  "http://localhost:3000".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// Disable the persistent cache entirely
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Override the SQLite database location
  pub path: Option<PathBuf>,
  /// UTC hour at which every cache entry expires
  #[serde(default = "default_expiry_hour")]
  pub expiry_hour_utc: u32,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      path: None,
      expiry_hour_utc: default_expiry_hour(),
    }
  }
}

fn default_true() -> bool {
  true
}

fn default_expiry_hour() -> u32 {
  22
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./selstats.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/selstats/config.yaml
  ///
  /// Falls back to defaults when no file exists. `SELSTATS_API_URL`
  /// overrides the configured base URL.
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

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => {
        tracing::info!("no config file found, using defaults");
        Config::default()
      }
    };

    if let Ok(url) = std::env::var("SELSTATS_API_URL") {
      config.api.base_url = url;
    }

    config.validate()?;
    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("selstats.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("selstats").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config = Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    tracing::info!(path = %path.display(), "loaded config");
    Ok(config)
  }

  fn from_yaml(contents: &str) -> Result<Self> {
    Ok(serde_yaml::from_str(contents)?)
  }

  fn validate(&self) -> Result<()> {
    if self.cache.expiry_hour_utc > 23 {
      return Err(eyre!(
        "cache.expiry_hour_utc must be between 0 and 23, got {}",
        self.cache.expiry_hour_utc
      ));
    }
    Ok(())
  }

  /// Season for the dashboard: configured value or the current UTC year.
  pub fn current_season(&self) -> i32 {
    use chrono::Datelike;
    self
      .current_season
      .unwrap_or_else(|| chrono::Utc::now().year())
  }
}
