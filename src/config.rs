use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

use crate::worker::DEFAULT_STATIC_ASSETS;

const DEFAULT_BACKEND_URL: &str = "http://localhost:8001";
const DEFAULT_ORIGIN: &str = "http://localhost:3000";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  /// Base URL of the manga REST backend
  #[serde(default = "default_backend_url")]
  pub backend_url: Url,
  /// Origin the static assets and shell document are served from
  #[serde(default = "default_origin")]
  pub origin: Url,
  /// Where the database and logs live (defaults to the platform data dir)
  pub data_dir: Option<PathBuf>,
  #[serde(default)]
  pub cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// Register the offline worker at all
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Suffix of every generation name. Bump it when the asset list or the
  /// caching policy changes so old generations get purged.
  #[serde(default = "default_version")]
  pub version: String,
  #[serde(default = "default_static_assets")]
  pub static_assets: Vec<String>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      version: default_version(),
      static_assets: default_static_assets(),
    }
  }
}

impl Default for Config {
  fn default() -> Self {
    Self {
      backend_url: default_backend_url(),
      origin: default_origin(),
      data_dir: None,
      cache: CacheConfig::default(),
    }
  }
}

fn default_backend_url() -> Url {
  Url::parse(DEFAULT_BACKEND_URL).expect("default backend URL is valid")
}

fn default_origin() -> Url {
  Url::parse(DEFAULT_ORIGIN).expect("default origin is valid")
}

fn default_true() -> bool {
  true
}

fn default_version() -> String {
  "v1".to_string()
}

fn default_static_assets() -> Vec<String> {
  DEFAULT_STATIC_ASSETS.iter().map(|s| s.to_string()).collect()
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./mangashelf.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/mangashelf/config.yaml
  ///
  /// Defaults apply when no file exists. `MANGASHELF_BACKEND_URL` overrides
  /// the backend URL either way.
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

    let config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Self::default(),
    };

    config.with_env_overrides()
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("mangashelf.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("mangashelf").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    Ok(serde_yaml::from_str(contents)?)
  }

  fn with_env_overrides(mut self) -> Result<Self> {
    if let Ok(url) = std::env::var("MANGASHELF_BACKEND_URL") {
      self.backend_url = Url::parse(&url)
        .map_err(|e| eyre!("Invalid MANGASHELF_BACKEND_URL {}: {}", url, e))?;
    }
    Ok(self)
  }

  /// Directory holding the database and log files.
  pub fn data_dir(&self) -> Result<PathBuf> {
    if let Some(dir) = &self.data_dir {
      return Ok(dir.clone());
    }

    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("mangashelf"))
  }

  pub fn database_path(&self) -> Result<PathBuf> {
    Ok(self.data_dir()?.join("mangashelf.db"))
  }
}
