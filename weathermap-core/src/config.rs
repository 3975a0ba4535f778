use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, time::Duration};

pub const DEFAULT_GEOCODER_URL: &str = "https://nominatim.openstreetmap.org";
pub const DEFAULT_USER_AGENT: &str = concat!("weathermap/", env!("CARGO_PKG_VERSION"));
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_RESULT_LIMIT: usize = 10;
pub const DEFAULT_MAP_STYLE: &str = "streets-v12";

/// Geocoding service settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeocoderConfig {
    pub base_url: String,
    pub user_agent: String,
    pub timeout_secs: u64,
    pub result_limit: usize,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_GEOCODER_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            result_limit: DEFAULT_RESULT_LIMIT,
        }
    }
}

impl GeocoderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Map library settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    pub style: String,
    pub access_token: Option<String>,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self { style: DEFAULT_MAP_STYLE.to_string(), access_token: None }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Directory holding the persisted history record. Defaults to the
    /// platform data directory.
    pub path: Option<PathBuf>,
}

/// Top-level configuration stored on disk.
///
/// Example TOML:
/// ```toml
/// [geocoder]
/// base_url = "https://nominatim.openstreetmap.org"
/// timeout_secs = 10
///
/// [map]
/// style = "streets-v12"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub geocoder: GeocoderConfig,
    pub map: MapConfig,
    pub history: HistoryConfig,
}

impl Config {
    /// Load config from disk, or return an empty default if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        let path = Self::config_file_path()?;
        if !path.exists() {
            // First run: no config file, return defaults.
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let cfg: Config = toml::from_str(contents)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_file_path()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(&path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !self.geocoder.base_url.starts_with("http://")
            && !self.geocoder.base_url.starts_with("https://")
        {
            return Err(anyhow!(
                "Geocoder base_url must be an http(s) URL, got '{}'",
                self.geocoder.base_url
            ));
        }
        if self.geocoder.timeout_secs == 0 {
            return Err(anyhow!("Geocoder timeout_secs must be greater than zero"));
        }
        if self.geocoder.result_limit == 0 {
            return Err(anyhow!("Geocoder result_limit must be greater than zero"));
        }
        Ok(())
    }

    fn project_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("dev", "weathermap", "weathermap")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        Ok(Self::project_dirs()?.config_dir().join("config.toml"))
    }

    /// Directory for the persisted search history.
    pub fn history_dir(&self) -> Result<PathBuf> {
        match &self.history.path {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::project_dirs()?.data_dir().to_path_buf()),
        }
    }
}
