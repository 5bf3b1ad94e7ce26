use log::warn;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::backend::pokeapi::DEFAULT_BASE_URL;
use crate::backend::scheduler::DEFAULT_MAX_CONCURRENT;
use crate::backend::window::DEFAULT_SLOTS_PER_PAGE;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_total_slots")]
    pub total_slots: u32,
    #[serde(default = "default_slots_per_page")]
    pub slots_per_page: u32,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default = "default_preload_depth")]
    pub preload_depth: u32,
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            total_slots: default_total_slots(),
            slots_per_page: default_slots_per_page(),
            max_concurrent: default_max_concurrent(),
            preload_depth: default_preload_depth(),
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

fn default_api_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_total_slots() -> u32 {
    151
}

fn default_slots_per_page() -> u32 {
    DEFAULT_SLOTS_PER_PAGE
}

fn default_max_concurrent() -> usize {
    DEFAULT_MAX_CONCURRENT
}

fn default_preload_depth() -> u32 {
    3
}

fn default_tick_interval_ms() -> u64 {
    50
}

pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("binder-tui")
}

impl Config {
    pub fn load() -> Self {
        Self::load_from(&config_dir().join("config.json"))
    }

    /// Missing or unreadable files fall back to the defaults.
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        let parsed = fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|content| serde_json::from_str(&content).map_err(|e| e.to_string()));

        match parsed {
            Ok(config) => config,
            Err(e) => {
                warn!("ignoring config {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ArgsError {
    #[error("invalid slot count: {0}")]
    InvalidSlotCount(String),
    #[error("{0} needs a value")]
    MissingValue(&'static str),
    #[error("unknown argument: {0}")]
    Unknown(String),
}

/// Command line: `binder-tui [TOTAL_SLOTS] [--collection TOKEN]`.
#[derive(Debug, Default, PartialEq)]
pub struct LaunchOptions {
    pub total_slots: Option<u32>,
    pub collection_token: Option<String>,
}

pub fn parse_args<I>(args: I) -> Result<LaunchOptions, ArgsError>
where
    I: IntoIterator<Item = String>,
{
    let mut options = LaunchOptions::default();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--collection" | "-c" => {
                let token = args.next().ok_or(ArgsError::MissingValue("--collection"))?;
                options.collection_token = Some(token);
            }
            other if other.starts_with('-') => {
                return Err(ArgsError::Unknown(other.to_string()));
            }
            other if options.total_slots.is_none() => {
                let slots = other
                    .parse()
                    .map_err(|_| ArgsError::InvalidSlotCount(other.to_string()))?;
                options.total_slots = Some(slots);
            }
            other => return Err(ArgsError::Unknown(other.to_string())),
        }
    }

    Ok(options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"total_slots": 1025, "max_concurrent": 8}"#).unwrap();

        let config = Config::load_from(&path);
        assert_eq!(config.total_slots, 1025);
        assert_eq!(config.max_concurrent, 8);
        assert_eq!(config.slots_per_page, 16);
        assert_eq!(config.api_base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_bad_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ nope").unwrap();

        assert_eq!(Config::load_from(&path), Config::default());
        assert_eq!(Config::load_from(&dir.path().join("missing.json")), Config::default());
    }

    #[test]
    fn test_parse_args() {
        assert_eq!(parse_args(args(&[])), Ok(LaunchOptions::default()));
        assert_eq!(
            parse_args(args(&["300", "--collection", "AQID"])),
            Ok(LaunchOptions {
                total_slots: Some(300),
                collection_token: Some("AQID".into()),
            })
        );
        assert_eq!(
            parse_args(args(&["lots"])),
            Err(ArgsError::InvalidSlotCount("lots".into()))
        );
        assert_eq!(
            parse_args(args(&["-c"])),
            Err(ArgsError::MissingValue("--collection"))
        );
        assert_eq!(parse_args(args(&["--fast"])), Err(ArgsError::Unknown("--fast".into())));
        assert_eq!(parse_args(args(&["1", "2"])), Err(ArgsError::Unknown("2".into())));
    }
}
