use crate::core::currency::Currency;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};
use tracing::debug;

pub const DEFAULT_RATE_SOURCE_URL: &str = "https://open.er-api.com";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct OpenErApiConfig {
    pub base_url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProvidersConfig {
    pub open_er_api: Option<OpenErApiConfig>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        ProvidersConfig {
            open_er_api: Some(OpenErApiConfig {
                base_url: DEFAULT_RATE_SOURCE_URL.to_string(),
            }),
        }
    }
}

fn default_home_currency() -> String {
    "CNY".to_string()
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    #[serde(default = "default_home_currency")]
    pub home_currency: String,
    #[serde(default)]
    pub providers: ProvidersConfig,
    pub data_path: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            home_currency: default_home_currency(),
            providers: ProvidersConfig::default(),
            data_path: None,
        }
    }
}

impl AppConfig {
    /// Loads the config from the default location, falling back to defaults
    /// when no file exists there.
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        if !config_path.exists() {
            debug!("No config at {}, using defaults", config_path.display());
            return Ok(Self::default());
        }
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("dev", "residue", "residue")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        if let Some(custom_path) = &self.data_path {
            return Ok(PathBuf::from(custom_path));
        }
        let proj_dirs = ProjectDirs::from("dev", "residue", "residue")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.data_dir().to_path_buf())
    }

    pub fn home_currency(&self) -> Result<Currency> {
        self.home_currency
            .parse()
            .with_context(|| format!("Invalid home currency: {}", self.home_currency))
    }

    pub fn rate_source_url(&self) -> &str {
        self.providers
            .open_er_api
            .as_ref()
            .map_or(DEFAULT_RATE_SOURCE_URL, |p| p.base_url.as_str())
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }
}
