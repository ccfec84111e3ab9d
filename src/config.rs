use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  /// Origin the cached assets are fetched from, e.g. "https://takt.example.com"
  pub origin: String,
  #[serde(default)]
  pub cache: CacheConfig,
  /// Override for the cache database location
  pub database: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// Cache generation name. Bumping this string is the only mechanism that
  /// invalidates previously cached entries (on the next activation).
  #[serde(default = "default_cache_name")]
  pub name: String,
  /// Assets pre-cached at install time
  #[serde(default = "default_manifest")]
  pub manifest: Vec<String>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      name: default_cache_name(),
      manifest: default_manifest(),
    }
  }
}

fn default_cache_name() -> String {
  "takt-time-calc-v1".to_string()
}

fn default_manifest() -> Vec<String> {
  ["/", "/manifest.json", "/icon-192.png", "/icon-512.png"]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./taktcache.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/taktcache/config.yaml
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
        "No configuration file found. Create one at ~/.config/taktcache/config.yaml\n\
                 with at least an `origin:` entry."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("taktcache.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("taktcache").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }
}
