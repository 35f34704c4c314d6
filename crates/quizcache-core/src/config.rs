//! Application configuration management.
//!
//! This module handles loading and saving the quiz source URL and the
//! refresh interval. Configuration is stored at
//! `~/.config/quizcache/config.json`; the cache lives under
//! `~/.cache/quizcache/`.
//!
//! `Settings` is the shared runtime handle: the repository re-reads the
//! source URL on every refresh and the scheduler re-reads the interval each
//! time its timer starts, so changes apply without a restart.

use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "quizcache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Source used until the user configures one
pub const DEFAULT_SOURCE_URL: &str = "http://tednewardsandbox.site44.com/questions.json";

/// Environment variable overriding the source URL
pub const ENV_SOURCE_URL: &str = "QUIZCACHE_SOURCE_URL";

/// Environment variable overriding the refresh interval (seconds)
pub const ENV_REFRESH_INTERVAL: &str = "QUIZCACHE_REFRESH_INTERVAL";

/// Bounds on an enabled refresh interval. Positive values outside them are
/// clamped; the timer cannot run with a zero period.
const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(1);
const MAX_REFRESH_INTERVAL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    /// Seconds between background refreshes. Older settings files stored
    /// this as a string, so both forms are accepted.
    #[serde(
        default,
        deserialize_with = "deserialize_interval",
        skip_serializing_if = "Option::is_none"
    )]
    pub refresh_interval: Option<f64>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IntervalValue {
    Number(f64),
    Text(String),
}

fn deserialize_interval<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<IntervalValue> = Option::deserialize(deserializer)?;
    Ok(match value {
        Some(IntervalValue::Number(n)) => Some(n),
        Some(IntervalValue::Text(s)) => parse_interval(&s),
        None => None,
    })
}

fn parse_interval(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok()
}

impl Config {
    /// Load the config from the default location
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir() -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// Effective source URL, falling back to the default endpoint
    pub fn source_url(&self) -> &str {
        match self.source_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => url,
            _ => DEFAULT_SOURCE_URL,
        }
    }

    /// Effective refresh interval. `None` disables periodic refresh.
    pub fn refresh_interval(&self) -> Option<Duration> {
        self.refresh_interval
            .filter(|secs| !secs.is_nan() && *secs > 0.0)
            .map(|secs| {
                Duration::try_from_secs_f64(secs)
                    .unwrap_or(MAX_REFRESH_INTERVAL)
                    .clamp(MIN_REFRESH_INTERVAL, MAX_REFRESH_INTERVAL)
            })
    }

    /// Build overrides from environment-style lookups.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            source_url: lookup(ENV_SOURCE_URL).filter(|url| !url.trim().is_empty()),
            refresh_interval: lookup(ENV_REFRESH_INTERVAL).and_then(|s| parse_interval(&s)),
        }
    }

    /// Overrides taken from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Values set in `overrides` take precedence over `self`.
    fn merged(&self, overrides: &Config) -> Config {
        Config {
            source_url: overrides.source_url.clone().or_else(|| self.source_url.clone()),
            refresh_interval: overrides.refresh_interval.or(self.refresh_interval),
        }
    }
}

/// Shared, persisted settings.
///
/// Holds the persisted config plus read-only overrides (usually from the
/// environment). Setters update and persist only the persisted layer.
pub struct Settings {
    path: Option<PathBuf>,
    stored: RwLock<Config>,
    overrides: Config,
}

impl Settings {
    pub fn new(stored: Config, overrides: Config, path: Option<PathBuf>) -> Self {
        Self {
            path,
            stored: RwLock::new(stored),
            overrides,
        }
    }

    /// Settings that are never written to disk
    pub fn in_memory(config: Config) -> Self {
        Self::new(config, Config::default(), None)
    }

    /// Load from `path` (or the default location) with environment overrides
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let path = match path {
            Some(path) => path,
            None => Config::config_path()?,
        };
        let stored = Config::load_from(&path)?;
        let overrides = Config::from_env();
        debug!(path = %path.display(), ?stored, ?overrides, "Settings loaded");
        Ok(Self::new(stored, overrides, Some(path)))
    }

    /// Effective configuration with overrides applied
    pub fn effective(&self) -> Config {
        let stored = self.stored.read().unwrap_or_else(PoisonError::into_inner);
        stored.merged(&self.overrides)
    }

    pub fn source_url(&self) -> String {
        self.effective().source_url().to_string()
    }

    pub fn refresh_interval(&self) -> Option<Duration> {
        self.effective().refresh_interval()
    }

    pub fn set_source_url(&self, url: &str) -> Result<()> {
        self.update(|config| config.source_url = Some(url.trim().to_string()))?;
        info!(url = url, "Quiz source URL updated");
        Ok(())
    }

    /// Set the refresh interval in seconds; zero or negative disables it
    pub fn set_refresh_interval(&self, secs: f64) -> Result<()> {
        self.update(|config| config.refresh_interval = Some(secs))?;
        info!(secs = secs, "Refresh interval updated");
        Ok(())
    }

    fn update(&self, apply: impl FnOnce(&mut Config)) -> Result<()> {
        let snapshot = {
            let mut stored = self.stored.write().unwrap_or_else(PoisonError::into_inner);
            apply(&mut stored);
            stored.clone()
        };
        if let Some(ref path) = self.path {
            snapshot.save_to(path)?;
        }
        Ok(())
    }
}
