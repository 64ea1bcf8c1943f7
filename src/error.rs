//! # Error Types Module
//!
//! Questo modulo definisce tutti i tipi di errore custom dell'applicazione.
//!
//! ## Responsabilità:
//! - Definisce `UpscaleError` enum per categorizzare tutti gli errori possibili
//! - Fornisce messaggi di errore descrittivi e strutturati
//! - Integra con `thiserror` per automatic error conversion
//!
//! ## Categorie di errori:
//! - `Io`: Errori di I/O (file non trovati, permessi, etc.)
//! - `Image`: Decodifica/encoding immagini (formati corrotti, file vuoti)
//! - `Http`: Errori di trasporto verso il backend di enhancement
//! - `Backend`: Il backend ha risposto con uno status non-2xx
//! - `InvalidTarget`: Dimensione target non valida (<= 0, NaN)
//! - `Validation`: Parametri di compressione o configurazione non validi
//! - `InvalidTransition`: Transizione di stato della sessione non ammessa
//! - `UnsupportedFormat`: Formato file non supportato
//! - `Encode`: L'encoder iniettato non è riuscito a produrre output
//!
//! ## Esempio:
//! ```rust,ignore
//! if !target_mb.is_finite() || target_mb <= 0.0 {
//!     return Err(UpscaleError::InvalidTarget(format!("{target_mb}")));
//! }
//! ```

/// Custom error types for image upscaling and compression
#[derive(thiserror::Error, Debug)]
pub enum UpscaleError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Backend processing failed: {status} {body}")]
    Backend { status: u16, body: String },

    #[error("Invalid target size: {0}")]
    InvalidTarget(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid session transition: {0}")]
    InvalidTransition(String),

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("Encoding failed: {0}")]
    Encode(String),
}

impl UpscaleError {
    /// True for transport failures where the backend was never reached.
    pub fn is_unreachable(&self) -> bool {
        match self {
            UpscaleError::Http(e) => e.is_connect() || e.is_timeout(),
            _ => false,
        }
    }
}
