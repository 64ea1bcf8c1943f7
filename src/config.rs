//! # Configuration Management Module
//!
//! Questo modulo gestisce tutta la configurazione dell'applicazione.
//!
//! ## Responsabilità:
//! - Definisce la struct `Config` con tutti i parametri di enhancement e compressione
//! - Fornisce validazione robusta dei parametri di input
//! - Supporta caricamento/salvataggio configurazione da/verso file JSON
//! - Fornisce valori di default sensati per tutti i parametri
//!
//! ## Parametri di configurazione:
//! - `backend_url`: URL base del backend Real-ESRGAN (default: None = fallback all'originale)
//! - `request_timeout_secs`: Timeout richiesta HTTP (default: 300)
//! - `grading`: Preset di color grading inviato al backend (default: none)
//! - `fallback_on_backend_error`: Usa l'originale anche su risposte non-2xx (default: false)
//! - `max_pixels`: Limite pixel prima dell'upload (default: 10000x10000)
//! - `target_size_mb`: Dimensione target per la compressione (default: None = nessuna compressione)
//! - `compression`: Parametri della ricerca binaria (qualità 90/10/100, tolleranza 0.1 MB, 10 iterazioni)
//! - `output_format`: Formato di output per la compressione (default: jpeg)
//! - `output_path`: File o directory di output (default: None = accanto all'input)
//! - `workers`: Numero di job paralleli in modalità batch (default: 2)
//! - `json_output`: Eventi JSON su stdout invece di progress bar (default: false)
//!
//! ## Esempio:
//! ```rust,ignore
//! let config = Config {
//!     backend_url: Some("http://localhost:5000".to_string()),
//!     target_size_mb: Some(5.0),
//!     ..Default::default()
//! };
//! config.validate()?;
//! ```

use crate::compressor::CompressionSettings;
use crate::encoder::OutputFormat;
use crate::enhancer::Grading;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable consulted when no backend URL is given explicitly.
pub const BACKEND_URL_ENV: &str = "BACKEND_BASE_URL";

/// Configuration for image enhancement and compression
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the enhancement backend (None = not configured)
    pub backend_url: Option<String>,
    /// HTTP request timeout in seconds
    pub request_timeout_secs: u64,
    /// Preset sent in the `grading` form field
    pub grading: Grading,
    /// Fall back to the original image on non-2xx responses too
    pub fallback_on_backend_error: bool,
    /// Images above this pixel count are downscaled before upload
    pub max_pixels: u64,
    /// Compress the enhanced image to this size (MB)
    pub target_size_mb: Option<f64>,
    /// Binary search parameters
    pub compression: CompressionSettings,
    /// Format for compressed output
    pub output_format: OutputFormat,
    /// Output file or directory (None = next to the input)
    pub output_path: Option<PathBuf>,
    /// Number of parallel jobs in batch mode
    pub workers: usize,
    /// Output progress and status as JSON for programmatic use
    pub json_output: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_url: None,
            request_timeout_secs: 300,
            grading: Grading::None,
            fallback_on_backend_error: false,
            max_pixels: 10_000 * 10_000,
            target_size_mb: None,
            compression: CompressionSettings::default(),
            output_format: OutputFormat::Jpeg,
            output_path: None,
            workers: 2,
            json_output: false,
        }
    }
}

impl Config {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if let Some(ref url) = self.backend_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(anyhow::anyhow!("Backend URL must start with http:// or https://: {}", url));
            }
        }

        if self.request_timeout_secs == 0 {
            return Err(anyhow::anyhow!("Request timeout must be greater than 0"));
        }

        if self.max_pixels == 0 {
            return Err(anyhow::anyhow!("Max pixels must be greater than 0"));
        }

        if let Some(target) = self.target_size_mb {
            if !target.is_finite() || target <= 0.0 {
                return Err(anyhow::anyhow!("Target size must be a positive number of MB"));
            }
        }

        self.compression.validate()?;

        if self.workers == 0 {
            return Err(anyhow::anyhow!("Number of workers must be greater than 0"));
        }

        Ok(())
    }

    /// Backend URL from config, else from the environment
    pub fn resolve_backend_url(&mut self) {
        if self.backend_url.is_none() {
            self.backend_url = std::env::var(BACKEND_URL_ENV)
                .ok()
                .map(|url| url.trim().to_string())
                .filter(|url| !url.is_empty());
        }
        if let Some(url) = self.backend_url.as_mut() {
            while url.ends_with('/') {
                url.pop();
            }
        }
    }

    /// Default config location: `~/.image-upscaler/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".image-upscaler").join("config.json"))
    }

    /// Load configuration from file
    pub async fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}
