//! # Image Upscaler Library
//!
//! Questo è il modulo principale della libreria che espone tutte le API pubbliche.
//!
//! ## Responsabilità:
//! - Definisce la struttura modulare dell'applicazione
//! - Espone i tipi e le funzioni principali tramite re-exports
//! - Fornisce un'interfaccia pulita per il main.rs e per altri consumatori
//!
//! ## Architettura dei moduli:
//! - `compressor`: Ricerca binaria della qualità per una dimensione target
//! - `encoder`: Encoder JPEG/PNG in memoria usati dal compressore
//! - `enhancer`: Client HTTP verso il backend di upscaling, con fallback
//! - `session`: Macchina a stati Idle → Uploading → Result → Compressing
//! - `source`: Immagine sorgente, job id e limite pixel
//! - `pipeline`: Orchestratore principale (singolo file e batch)
//! - `config`: Gestione configurazione e validazione parametri
//! - `error`: Tipi di errore custom
//! - `file_manager`: Operazioni sui file, discovery e naming dell'output
//! - `progress`: Progress bar e statistiche
//! - `json_output`: Eventi JSON per uso programmatico
//!
//! ## Utilizzo:
//! ```rust,ignore
//! use image_upscaler::{Config, UpscalePipeline};
//!
//! let config = Config {
//!     backend_url: Some("http://localhost:5000".to_string()),
//!     target_size_mb: Some(5.0),
//!     ..Default::default()
//! };
//! let pipeline = UpscalePipeline::new(config)?;
//! pipeline.run(&path).await?;
//! ```

pub mod compressor;
pub mod config;
pub mod encoder;
pub mod enhancer;
pub mod error;
pub mod file_manager;
pub mod json_output;
pub mod pipeline;
pub mod progress;
pub mod session;
pub mod source;

pub use compressor::{
    Attempt, CompressionOutcome, CompressionRequest, CompressionSettings, EncodedResult,
    QualityEncoder, TargetSizeCompressor,
};
pub use config::Config;
pub use encoder::{OutputFormat, RasterEncoder};
pub use enhancer::{EnhanceOutcome, EnhancedImage, EnhancementClient, Grading, HealthStatus};
pub use error::UpscaleError;
pub use pipeline::{JobReport, JobStatus, UpscalePipeline};
pub use session::{Phase, Session};
pub use source::SourceImage;
