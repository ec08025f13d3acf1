//! Configuration loading
//!
//! Resolution priority: environment variables override the TOML file,
//! which overrides compiled defaults. The TOML file lives in the
//! platform config directory (`~/.config/escrutinio/config.toml` on
//! Linux) unless an explicit path is given.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Settings for the external Tesseract OCR binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    /// Binary name or absolute path
    pub binary: String,
    /// Recognition language passed with `-l`
    pub language: String,
    /// Page segmentation mode passed with `--psm`
    pub page_segmentation_mode: u8,
    /// When false the extractor goes straight to the manual-entry fallback
    pub enabled: bool,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            binary: "tesseract".to_string(),
            language: "spa".to_string(),
            page_segmentation_mode: 6,
            enabled: true,
        }
    }
}

/// Top-level configuration for the escrutinio core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// SQLite database file path
    pub database_path: PathBuf,
    /// Directory for generated E-24 artifacts
    pub artifacts_dir: PathBuf,
    /// Tracing filter, e.g. "info" or "escrutinio_engine=debug"
    pub log_filter: String,
    #[serde(default)]
    pub ocr: OcrConfig,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = default_data_dir();
        Self {
            database_path: data_dir.join("escrutinio.db"),
            artifacts_dir: data_dir.join("artifacts"),
            log_filter: "info".to_string(),
            ocr: OcrConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration: TOML file (if present) layered under ENV overrides.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let mut config = match config_file_path(explicit_path) {
            Some(path) if path.exists() => {
                let content = std::fs::read_to_string(&path)?;
                toml::from_str(&content)
                    .map_err(|e| Error::Config(format!("parse {}: {}", path.display(), e)))?
            }
            Some(path) if explicit_path.is_some() => {
                return Err(Error::Config(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            _ => Config::default(),
        };

        if let Ok(path) = std::env::var("ESCRUTINIO_DATABASE_PATH") {
            config.database_path = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("ESCRUTINIO_ARTIFACTS_DIR") {
            config.artifacts_dir = PathBuf::from(path);
        }
        if let Ok(filter) = std::env::var("ESCRUTINIO_LOG") {
            config.log_filter = filter;
        }
        if let Ok(binary) = std::env::var("ESCRUTINIO_TESSERACT_BIN") {
            config.ocr.binary = binary;
        }

        Ok(config)
    }

    /// Ensure the data directories referenced by the config exist.
    pub fn ensure_directories(&self) -> Result<()> {
        if let Some(parent) = self.database_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::create_dir_all(&self.artifacts_dir)?;
        Ok(())
    }
}

/// Platform config file path, or the explicitly requested one.
fn config_file_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    dirs::config_dir().map(|d| d.join("escrutinio").join("config.toml"))
}

/// OS-dependent default data directory
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("escrutinio"))
        .unwrap_or_else(|| PathBuf::from("./escrutinio_data"))
}
