//! # Enhancement Backend Client
//!
//! Client HTTP verso il backend di upscaling (Real-ESRGAN esposto via Flask/ngrok).
//!
//! ## Protocollo:
//! - `POST {base}/api/upscale` con `multipart/form-data`:
//!   - campo `image`: byte originali, nome file e MIME type
//!   - campo `grading`: preset di color grading (`Grading`, default `none`)
//! - Risposta 2xx: byte dell'immagine elaborata (tipicamente `image/png`)
//! - Risposta non-2xx: corpo testuale con il messaggio d'errore
//! - `GET {base}/health`: `{ "status", "model", "gpu_available" }`
//!
//! ## Politica di fallback:
//! Il risultato è sempre un `EnhanceOutcome` esplicito, mai un'eccezione:
//!
//! | Situazione | Esito |
//! |------------|-------|
//! | Risposta 2xx | `Success` |
//! | Backend non configurato | `FallbackUsed` (immagine originale) |
//! | Connessione rifiutata / timeout | `FallbackUsed` (immagine originale) |
//! | Risposta non-2xx | `Failed`, oppure `FallbackUsed` con `fallback_on_backend_error` |
//!
//! Nessun retry: una richiesta per immagine.

use crate::config::Config;
use crate::error::UpscaleError;
use crate::source::{mime_for_bytes, SourceImage};
use clap::ValueEnum;
use reqwest::header::CONTENT_TYPE;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const NOT_CONFIGURED_WARNING: &str = "Backend not configured - returning original image";

/// Color grading preset applied by the backend after upscaling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
#[value(rename_all = "lowercase")]
pub enum Grading {
    /// Original colors
    #[default]
    None,
    Warm,
    Cool,
    Vibrant,
    Muted,
    Cinematic,
    Vintage,
    /// Black and white
    Bw,
    Sepia,
    Dramatic,
}

impl Grading {
    /// Value sent in the `grading` form field
    pub fn as_str(&self) -> &'static str {
        match self {
            Grading::None => "none",
            Grading::Warm => "warm",
            Grading::Cool => "cool",
            Grading::Vibrant => "vibrant",
            Grading::Muted => "muted",
            Grading::Cinematic => "cinematic",
            Grading::Vintage => "vintage",
            Grading::Bw => "bw",
            Grading::Sepia => "sepia",
            Grading::Dramatic => "dramatic",
        }
    }
}

impl fmt::Display for Grading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Image bytes returned to the caller, enhanced or not
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnhancedImage {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

impl EnhancedImage {
    pub fn size_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Result of one enhancement request
#[derive(Debug)]
pub enum EnhanceOutcome {
    /// Backend returned a processed image
    Success(EnhancedImage),
    /// Backend unavailable; original image passed through
    FallbackUsed {
        image: EnhancedImage,
        warning: String,
    },
    /// Backend reached but the request failed
    Failed(UpscaleError),
}

impl EnhanceOutcome {
    pub fn image(&self) -> Option<&EnhancedImage> {
        match self {
            EnhanceOutcome::Success(image) | EnhanceOutcome::FallbackUsed { image, .. } => {
                Some(image)
            }
            EnhanceOutcome::Failed(_) => None,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, EnhanceOutcome::FallbackUsed { .. })
    }

    fn fallback(source: &SourceImage, warning: String) -> Self {
        EnhanceOutcome::FallbackUsed {
            image: EnhancedImage {
                bytes: source.bytes.clone(),
                content_type: source.content_type.clone(),
            },
            warning,
        }
    }
}

/// Backend health report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub gpu_available: Option<bool>,
}

/// HTTP client for the enhancement backend. Cheap to clone.
#[derive(Debug, Clone)]
pub struct EnhancementClient {
    http: reqwest::Client,
    base_url: Option<String>,
    grading: Grading,
    fallback_on_backend_error: bool,
}

impl EnhancementClient {
    pub fn new(config: &Config) -> Result<Self, UpscaleError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: config
                .backend_url
                .as_ref()
                .map(|url| url.trim_end_matches('/').to_string()),
            grading: config.grading,
            fallback_on_backend_error: config.fallback_on_backend_error,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.base_url.is_some()
    }

    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    /// Submit `source` for enhancement.
    ///
    /// Never panics or returns `Err`; every failure mode maps onto an
    /// `EnhanceOutcome` variant.
    pub async fn enhance(&self, source: &SourceImage) -> EnhanceOutcome {
        let Some(base_url) = self.base_url.as_deref() else {
            warn!("⚠️ {}: {}", source.file_name, NOT_CONFIGURED_WARNING);
            return EnhanceOutcome::fallback(source, NOT_CONFIGURED_WARNING.to_string());
        };

        info!("Forwarding {} to backend: {}/api/upscale", source.file_name, base_url);
        let start_time = std::time::Instant::now();

        match self.post_image(base_url, source).await {
            Ok(image) => {
                debug!(
                    "Backend returned {} bytes ({}) in {:?}",
                    image.bytes.len(),
                    image.content_type,
                    start_time.elapsed()
                );
                EnhanceOutcome::Success(image)
            }
            Err(e) if e.is_unreachable() => {
                let warning = format!("Backend unreachable ({}) - returning original image", e);
                warn!("⚠️ {}: {}", source.file_name, warning);
                EnhanceOutcome::fallback(source, warning)
            }
            Err(e @ UpscaleError::Backend { .. }) if self.fallback_on_backend_error => {
                let warning = format!("{} - returning original image", e);
                warn!("⚠️ {}: {}", source.file_name, warning);
                EnhanceOutcome::fallback(source, warning)
            }
            Err(e) => {
                warn!("Backend error for {}: {}", source.file_name, e);
                EnhanceOutcome::Failed(e)
            }
        }
    }

    async fn post_image(
        &self,
        base_url: &str,
        source: &SourceImage,
    ) -> Result<EnhancedImage, UpscaleError> {
        let part = Part::bytes(source.bytes.clone())
            .file_name(source.file_name.clone())
            .mime_str(&source.content_type)?;
        let form = Form::new()
            .part("image", part)
            .text("grading", self.grading.as_str());

        let response = self
            .http
            .post(format!("{}/api/upscale", base_url))
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpscaleError::Backend {
                status: status.as_u16(),
                body,
            });
        }

        let header_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await?.to_vec();
        let content_type = header_type.unwrap_or_else(|| mime_for_bytes(&bytes).to_string());

        Ok(EnhancedImage {
            bytes,
            content_type,
        })
    }

    /// Query `GET {base}/health`
    pub async fn health(&self) -> Result<HealthStatus, UpscaleError> {
        let base_url = self.base_url.as_deref().ok_or_else(|| {
            UpscaleError::Validation("Backend URL not configured".to_string())
        })?;

        let status = self
            .http
            .get(format!("{}/health", base_url))
            .send()
            .await?
            .error_for_status()?
            .json::<HealthStatus>()
            .await?;
        Ok(status)
    }
}
