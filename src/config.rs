use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use log::*;
use serde::{Deserialize, Serialize};

const CONFIG_PATH: &str = "~/.config/marketspace/config.json";
const DEFAULT_CACHE_DIR: &str = "~/.config/marketspace/cache";
const DEFAULT_API_URL: &str = "http://localhost:3333";
const API_URL_ENV: &str = "MARKETSPACE_API_URL";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_url: String,
    pub cache_dir: String,
    pub timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            api_url: DEFAULT_API_URL.to_string(),
            cache_dir: DEFAULT_CACHE_DIR.to_string(),
            timeout_secs: 30,
        }
    }
}

impl Config {
    /// Defaults, overlaid by the config file, overlaid by the environment.
    pub fn load(path: Option<&Path>) -> Result<Config> {
        let path = match path {
            Some(p) => p.to_owned(),
            None => expand(CONFIG_PATH)?,
        };
        let mut config = match std::fs::read_to_string(&path) {
            Ok(c) => serde_json::from_str::<Config>(&c)
                .with_context(|| format!("Error de-serialising config file {:?}", path))?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No config at {:?}, using defaults", path);
                Config::default()
            }
            Err(e) => return Err(e).with_context(|| format!("Error reading config file {:?}", path)),
        };
        if let Ok(url) = std::env::var(API_URL_ENV) {
            if !url.trim().is_empty() {
                config.api_url = url;
            }
        }
        Ok(config)
    }

    pub fn cache_path(&self) -> Result<PathBuf> {
        expand(&self.cache_dir)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn expand(path: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(path)
        .with_context(|| format!("Path {} is invalid", path))?;
    Ok(Path::new(expanded.as_ref()).to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(Some(&dir.path().join("absent.json"))).unwrap();
        assert_eq!(config.cache_dir, DEFAULT_CACHE_DIR);
        assert_eq!(config.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "timeout_secs": 5, "cache_dir": "/tmp/ms" }"#).unwrap();
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.timeout_secs, 5);
        assert_eq!(config.cache_path().unwrap(), PathBuf::from("/tmp/ms"));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "nope").unwrap();
        assert!(Config::load(Some(&path)).is_err());
    }
}
