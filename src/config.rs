use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::worker::WorkerConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  /// Store name for this deploy; bump it on every release
  pub version: String,
  /// Where the app is served from; relative URLs resolve against it
  pub base_url: String,
  /// App shell served to offline navigations
  #[serde(default = "default_shell")]
  pub shell: String,
  /// Asset manifest fetched on install
  #[serde(default)]
  pub assets: Vec<String>,
  /// Cache database (defaults to $XDG_DATA_HOME/shellcache/cache.db)
  pub database: Option<PathBuf>,
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

fn default_shell() -> String {
  "./index.html".to_string()
}

fn default_timeout_secs() -> u64 {
  30
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./shellcache.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/shellcache/config.yaml
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
        "No configuration file found. Create one at ~/.config/shellcache/config.yaml\n\
                 See shellcache.example.yaml for the format."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("shellcache.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("shellcache").join("config.yaml");
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

  /// Parse and validate a YAML document.
  pub fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))?;
    config.validate()?;
    Ok(config)
  }

  fn validate(&self) -> Result<()> {
    if self.version.trim().is_empty() {
      return Err(eyre!("version must not be empty"));
    }
    // Surfaces bad base/asset/shell URLs at load time
    self.worker_config()?;
    Ok(())
  }

  pub fn base_url(&self) -> Result<Url> {
    let url = Url::parse(&self.base_url)
      .map_err(|e| eyre!("Invalid base_url '{}': {}", self.base_url, e))?;
    if url.cannot_be_a_base() {
      return Err(eyre!("base_url '{}' cannot be used as a base", self.base_url));
    }
    Ok(url)
  }

  /// Resolve an absolute or relative URL against `base_url`.
  pub fn resolve(&self, url: &str) -> Result<Url> {
    self
      .base_url()?
      .join(url)
      .map_err(|e| eyre!("Invalid URL '{}': {}", url, e))
  }

  /// Values injected into the interceptor.
  pub fn worker_config(&self) -> Result<WorkerConfig> {
    Ok(WorkerConfig {
      version: self.version.clone(),
      assets: self
        .assets
        .iter()
        .map(|a| self.resolve(a))
        .collect::<Result<Vec<_>>>()?,
      shell: self.resolve(&self.shell)?,
    })
  }

  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.timeout_secs)
  }

  /// Get the cache database path.
  pub fn database_path(&self) -> Result<PathBuf> {
    match &self.database {
      Some(path) => Ok(path.clone()),
      None => Ok(Self::data_dir()?.join("cache.db")),
    }
  }

  /// Directory for the cache database and log files.
  pub fn data_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("shellcache"))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const EXAMPLE: &str = r#"
version: cutecumber-v7.2
base_url: http://localhost:8080/app/
assets:
  - ./
  - ./index.html
  - ./manifest.json
  - https://cdn.jsdelivr.net/npm/chart.js
  - https://www.gstatic.com/charts/loader.js
"#;

  #[test]
  fn test_parse_example() {
    let config = Config::parse(EXAMPLE).unwrap();
    assert_eq!(config.version, "cutecumber-v7.2");
    assert_eq!(config.shell, "./index.html");
    assert_eq!(config.timeout(), Duration::from_secs(30));
    assert!(config.database.is_none());
  }

  #[test]
  fn test_worker_config_resolves_urls() {
    let worker = Config::parse(EXAMPLE).unwrap().worker_config().unwrap();
    let assets: Vec<&str> = worker.assets.iter().map(|u| u.as_str()).collect();
    assert_eq!(
      assets,
      vec![
        "http://localhost:8080/app/",
        "http://localhost:8080/app/index.html",
        "http://localhost:8080/app/manifest.json",
        "https://cdn.jsdelivr.net/npm/chart.js",
        "https://www.gstatic.com/charts/loader.js",
      ]
    );
    assert_eq!(worker.shell.as_str(), "http://localhost:8080/app/index.html");
  }

  #[test]
  fn test_overrides() {
    let config = Config::parse(
      "version: v2\nbase_url: https://example.com/\nshell: ./\ndatabase: /tmp/sc.db\ntimeout_secs: 5\n",
    )
    .unwrap();
    assert!(config.assets.is_empty());
    assert_eq!(config.database_path().unwrap(), PathBuf::from("/tmp/sc.db"));
    assert_eq!(config.timeout(), Duration::from_secs(5));
    assert_eq!(
      config.worker_config().unwrap().shell.as_str(),
      "https://example.com/"
    );
  }

  #[test]
  fn test_empty_version_rejected() {
    assert!(Config::parse("version: ' '\nbase_url: http://localhost/\n").is_err());
  }

  #[test]
  fn test_relative_base_rejected() {
    assert!(Config::parse("version: v1\nbase_url: ./app/\n").is_err());
  }

  #[test]
  fn test_opaque_base_rejected() {
    assert!(Config::parse("version: v1\nbase_url: 'mailto:ops@example.com'\n").is_err());
  }

  #[test]
  fn test_missing_version_rejected() {
    assert!(Config::parse("base_url: http://localhost/\n").is_err());
  }
}
