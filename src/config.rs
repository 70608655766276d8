use std::{
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
    time::Duration,
};

use chrono_tz::Tz;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::offline::{ProxyConfig, DEFAULT_API_PREFIX, DEFAULT_CACHE_VERSION};
use crate::utils;

const DEFAULT_API_URL: &str = "http://localhost:8000";
const DEFAULT_TIMEZONE: &str = "Europe/Paris";
const DEFAULT_FETCH_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_ANIMATION_MS: u64 = 800;
const DEFAULT_FRAME_MS: u64 = 16;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("unknown timezone: {0}")]
    Timezone(String),
    #[error("invalid url {url}: {message}")]
    Url { url: String, message: String },
    #[error("config mutex poisoned")]
    Poisoned,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api_base_url: String,
    /// Bumping this invalidates every offline cache on next activation.
    pub cache_version: String,
    pub api_prefix: String,
    /// Origin whose static assets the proxy caches. Unset means any origin.
    pub app_origin: Option<String>,
    pub fetch_timeout_ms: u64,
    pub timezone: String,
    pub animation_duration_ms: u64,
    pub animation_frame_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            cache_version: DEFAULT_CACHE_VERSION.to_string(),
            api_prefix: DEFAULT_API_PREFIX.to_string(),
            app_origin: None,
            fetch_timeout_ms: DEFAULT_FETCH_TIMEOUT_MS,
            timezone: DEFAULT_TIMEZONE.to_string(),
            animation_duration_ms: DEFAULT_ANIMATION_MS,
            animation_frame_ms: DEFAULT_FRAME_MS,
        }
    }
}

impl AppConfig {
    /// Applies `NICE_OUTSIDE_*` environment overrides.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var("NICE_OUTSIDE_API_URL") {
            self.api_base_url = url;
        }
        if let Ok(version) = std::env::var("NICE_OUTSIDE_CACHE_VERSION") {
            self.cache_version = version;
        }
        if let Ok(tz) = std::env::var("NICE_OUTSIDE_TIMEZONE") {
            self.timezone = tz;
        }
        if let Some(ms) = std::env::var("NICE_OUTSIDE_FETCH_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
        {
            self.fetch_timeout_ms = ms;
        }
        self
    }

    pub fn tz(&self) -> Result<Tz, ConfigError> {
        self.timezone
            .trim()
            .parse::<Tz>()
            .map_err(|_| ConfigError::Timezone(self.timezone.clone()))
    }

    pub fn proxy_config(&self) -> Result<ProxyConfig, ConfigError> {
        let origin = match self.app_origin.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => Some(Url::parse(raw).map_err(|err| ConfigError::Url {
                url: raw.to_string(),
                message: err.to_string(),
            })?),
            _ => None,
        };
        Ok(ProxyConfig {
            version: self.cache_version.clone(),
            api_prefix: self.api_prefix.clone(),
            origin,
            fetch_timeout: Duration::from_millis(self.fetch_timeout_ms),
        })
    }

    pub fn animation_duration(&self) -> Duration {
        Duration::from_millis(self.animation_duration_ms)
    }

    pub fn animation_frame(&self) -> Duration {
        Duration::from_millis(self.animation_frame_ms)
    }
}

pub struct ConfigStore {
    path: PathBuf,
    data: Mutex<AppConfig>,
}

impl ConfigStore {
    pub fn load() -> Self {
        Self::load_from(utils::config_path())
    }

    pub fn load_from(path: PathBuf) -> Self {
        let data = match read_config(&path) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!(path = %path.display(), "falling back to default config: {err}");
                AppConfig::default()
            }
        };
        Self {
            path,
            data: Mutex::new(data),
        }
    }

    pub fn read(&self) -> AppConfig {
        match self.data.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn update<F>(&self, transform: F) -> Result<AppConfig, ConfigError>
    where
        F: FnOnce(&mut AppConfig),
    {
        let mut guard = self.data.lock().map_err(|_| ConfigError::Poisoned)?;
        transform(&mut guard);
        write_config(&self.path, &guard)?;
        Ok(guard.clone())
    }
}

fn read_config(path: &Path) -> Result<AppConfig, ConfigError> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let contents = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

fn write_config(path: &Path, config: &AppConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let contents = serde_json::to_string_pretty(config)?;
    fs::write(path, contents)?;
    Ok(())
}
