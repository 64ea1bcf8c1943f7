//! # JSON Output Module
//!
//! Questo modulo gestisce l'output strutturato in JSON per l'uso programmatico
//! (frontend web, script, altri processi).
//!
//! ## Tipi di messaggi:
//! - `start`: Inizio del run (input, numero file, backend configurato)
//! - `file_start`: Inizio elaborazione di un file
//! - `enhanced`: Risposta del backend ricevuta (o fallback all'originale)
//! - `compressed`: Ricerca della qualità completata
//! - `file_complete`: Output scritti su disco (risultato ed eventuale copia compressa)
//! - `complete`: Fine del run con statistiche finali
//! - `health`: Stato del backend
//! - `error`: Errore durante l'elaborazione
//!
//! Un messaggio per riga su stdout; i log `tracing` vanno su stderr.

use crate::compressor::Attempt;
use crate::enhancer::HealthStatus;
use crate::progress::RunStats;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Tipo di messaggio JSON
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum JsonMessage {
    #[serde(rename = "start")]
    Start {
        input: PathBuf,
        output: Option<PathBuf>,
        total_files: usize,
        config: JsonConfig,
    },

    #[serde(rename = "file_start")]
    FileStart {
        path: PathBuf,
        job_id: String,
        size: u64,
        index: usize,
        total: usize,
    },

    #[serde(rename = "enhanced")]
    Enhanced {
        path: PathBuf,
        job_id: String,
        fallback: bool,
        warning: Option<String>,
        content_type: String,
        size: u64,
    },

    #[serde(rename = "compressed")]
    Compressed {
        path: PathBuf,
        job_id: String,
        quality: u8,
        iterations: u32,
        size: u64,
        within_tolerance: bool,
        attempts: Vec<Attempt>,
    },

    #[serde(rename = "file_complete")]
    FileComplete {
        path: PathBuf,
        output: PathBuf,
        compressed_output: Option<PathBuf>,
        original_size: u64,
        final_size: u64,
    },

    #[serde(rename = "complete")]
    Complete {
        files_processed: usize,
        files_enhanced: usize,
        fallbacks: usize,
        files_compressed: usize,
        errors: usize,
        duration_seconds: f64,
    },

    #[serde(rename = "health")]
    Health {
        backend_url: String,
        #[serde(flatten)]
        status: HealthStatus,
    },

    #[serde(rename = "error")]
    Error {
        message: String,
        details: Option<String>,
    },
}

/// Configurazione per output JSON
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonConfig {
    pub backend_configured: bool,
    pub target_size_mb: Option<f64>,
    pub output_format: String,
    pub workers: usize,
    pub max_iterations: u32,
    pub tolerance_mb: f64,
}

impl JsonMessage {
    /// Emette il messaggio JSON su stdout
    pub fn emit(&self) {
        if let Ok(json) = serde_json::to_string(self) {
            println!("{}", json);
        }
    }

    pub fn complete(stats: &RunStats, duration_seconds: f64) -> Self {
        Self::Complete {
            files_processed: stats.files_processed,
            files_enhanced: stats.files_enhanced,
            fallbacks: stats.fallbacks,
            files_compressed: stats.files_compressed,
            errors: stats.errors,
            duration_seconds,
        }
    }

    pub fn error(message: String, details: Option<String>) -> Self {
        Self::Error { message, details }
    }
}

/// Converti Config in JsonConfig
impl From<&crate::Config> for JsonConfig {
    fn from(config: &crate::Config) -> Self {
        Self {
            backend_configured: config.backend_url.is_some(),
            target_size_mb: config.target_size_mb,
            output_format: config.output_format.extension().to_string(),
            workers: config.workers,
            max_iterations: config.compression.max_iterations,
            tolerance_mb: config.compression.tolerance_mb,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_are_tagged() {
        let msg = JsonMessage::error("boom".to_string(), None);
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["message"], "boom");
    }

    #[test]
    fn test_health_is_flattened() {
        let msg = JsonMessage::Health {
            backend_url: "http://localhost:5000".to_string(),
            status: HealthStatus {
                status: "healthy".to_string(),
                model: Some("Real-ESRGAN".to_string()),
                gpu_available: Some(false),
            },
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "health");
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["gpu_available"], false);
    }

    #[test]
    fn test_config_conversion() {
        let config = crate::Config {
            backend_url: Some("http://x".to_string()),
            target_size_mb: Some(5.0),
            ..Default::default()
        };
        let json_config = JsonConfig::from(&config);
        assert!(json_config.backend_configured);
        assert_eq!(json_config.output_format, "jpg");
        assert_eq!(json_config.max_iterations, 10);
    }
}
