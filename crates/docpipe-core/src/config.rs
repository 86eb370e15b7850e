use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// LibreOffice converter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibreOfficeConfig {
    /// Path or name of the `soffice` executable
    #[serde(default = "default_binary")]
    pub binary: PathBuf,

    /// Maximum seconds a single conversion may take
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_binary() -> PathBuf {
    PathBuf::from("soffice")
}

const fn default_timeout_secs() -> u64 {
    300
}

impl Default for LibreOfficeConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// LibreOffice converter settings
    #[serde(default)]
    pub libreoffice: LibreOfficeConfig,

    /// Directory under which request working directories are created
    /// (defaults to the system temp dir)
    #[serde(default)]
    pub work_root: Option<PathBuf>,
}

impl AppConfig {
    /// Load configuration from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::ConfigLoad(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| Error::ConfigLoad(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Files [`AppConfig::load`] looks at, in order of precedence.
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::with_capacity(2);
        if let Some(config_dir) = crate::util::config_dir() {
            paths.push(config_dir.join("docpipe").join("config.toml"));
        }
        paths.push(PathBuf::from("config.toml"));
        paths
    }

    /// Load the first readable file from [`AppConfig::search_paths`], or
    /// fall back to defaults. Broken files are skipped with a warning.
    pub fn load() -> Self {
        for path in Self::search_paths().into_iter().filter(|p| p.exists()) {
            match Self::from_file(&path) {
                Ok(config) => {
                    debug!("Loaded config from {}", path.display());
                    return config;
                }
                Err(e) => warn!("Skipping {}: {}", path.display(), e),
            }
        }

        debug!("No config file found, using defaults");
        Self::default()
    }

    fn validate(&self) -> Result<()> {
        if self.libreoffice.timeout_secs == 0 {
            return Err(Error::ConfigInvalid {
                field: "libreoffice.timeout_secs".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.libreoffice.binary.as_os_str().is_empty() {
            return Err(Error::ConfigInvalid {
                field: "libreoffice.binary".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}
