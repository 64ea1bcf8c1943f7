//! # Session State Machine
//!
//! Una singola macchina a stati per il ciclo di vita di un job, indipendente
//! dalla presentazione (CLI, JSON, o qualsiasi altra interfaccia).
//!
//! ## Stati:
//! ```text
//!            begin_upload                 finish_upload(ok/fallback)
//!   Idle ───────────────────► Uploading ─────────────────────────────► Result
//!    ▲                            │                                   │   ▲
//!    └────────────────────────────┘ finish_upload(failed)  begin_compress │   │ finish_compress
//!                                                                     ▼   │
//!                                                                  Compressing
//! ```
//!
//! - Da `Result` si può ripartire con un nuovo upload
//! - Un errore di compressione riporta a `Result` senza perdere l'immagine elaborata
//! - Transizioni non ammesse restituiscono `UpscaleError::InvalidTransition`

use crate::compressor::CompressionOutcome;
use crate::enhancer::{EnhanceOutcome, EnhancedImage};
use crate::error::UpscaleError;
use crate::source::SourceImage;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Idle,
    Uploading,
    Result,
    Compressing,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Uploading => "uploading",
            Phase::Result => "result",
            Phase::Compressing => "compressing",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
pub struct Session {
    phase: Phase,
    source: Option<SourceImage>,
    enhanced: Option<EnhancedImage>,
    warning: Option<String>,
    compressed: Option<CompressionOutcome>,
    last_error: Option<String>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            phase: Phase::Idle,
            source: None,
            enhanced: None,
            warning: None,
            compressed: None,
            last_error: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn expect_phase(&self, allowed: &[Phase], action: &str) -> Result<(), UpscaleError> {
        if allowed.contains(&self.phase) {
            Ok(())
        } else {
            Err(UpscaleError::InvalidTransition(format!(
                "cannot {} while {}",
                action, self.phase
            )))
        }
    }

    /// Idle | Result → Uploading. Clears any previous result.
    pub fn begin_upload(&mut self, source: SourceImage) -> Result<&SourceImage, UpscaleError> {
        self.expect_phase(&[Phase::Idle, Phase::Result], "start an upload")?;
        self.enhanced = None;
        self.warning = None;
        self.compressed = None;
        self.last_error = None;
        self.phase = Phase::Uploading;
        Ok(&*self.source.insert(source))
    }

    /// Uploading → Result, or back to Idle when the backend failed.
    ///
    /// A `Failed` outcome is returned as the backend error itself.
    pub fn finish_upload(&mut self, outcome: EnhanceOutcome) -> Result<&EnhancedImage, UpscaleError> {
        self.expect_phase(&[Phase::Uploading], "finish an upload")?;
        match outcome {
            EnhanceOutcome::Success(image) => {
                self.phase = Phase::Result;
                Ok(&*self.enhanced.insert(image))
            }
            EnhanceOutcome::FallbackUsed { image, warning } => {
                self.phase = Phase::Result;
                self.warning = Some(warning);
                Ok(&*self.enhanced.insert(image))
            }
            EnhanceOutcome::Failed(e) => {
                self.phase = Phase::Idle;
                self.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Result → Compressing
    pub fn begin_compress(&mut self) -> Result<&EnhancedImage, UpscaleError> {
        self.expect_phase(&[Phase::Result], "start compression")?;
        let enhanced = self.enhanced.as_ref().ok_or_else(|| {
            UpscaleError::InvalidTransition("no result available to compress".to_string())
        })?;
        self.phase = Phase::Compressing;
        Ok(enhanced)
    }

    /// Compressing → Result, keeping the enhanced image either way
    pub fn finish_compress(
        &mut self,
        result: Result<CompressionOutcome, UpscaleError>,
    ) -> Result<&CompressionOutcome, UpscaleError> {
        self.expect_phase(&[Phase::Compressing], "finish compression")?;
        self.phase = Phase::Result;
        match result {
            Ok(outcome) => Ok(&*self.compressed.insert(outcome)),
            Err(e) => {
                self.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Back to Idle, dropping everything
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn source(&self) -> Option<&SourceImage> {
        self.source.as_ref()
    }

    pub fn enhanced(&self) -> Option<&EnhancedImage> {
        self.enhanced.as_ref()
    }

    pub fn compressed(&self) -> Option<&CompressionOutcome> {
        self.compressed.as_ref()
    }

    pub fn used_fallback(&self) -> bool {
        self.warning.is_some()
    }

    pub fn warning(&self) -> Option<&str> {
        self.warning.as_deref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compressor::{CompressionRequest, TargetSizeCompressor};

    fn source() -> SourceImage {
        SourceImage::new("in.png", vec![1, 2, 3])
    }

    fn image(bytes: &[u8]) -> EnhancedImage {
        EnhancedImage {
            bytes: bytes.to_vec(),
            content_type: "image/png".to_string(),
        }
    }

    fn outcome() -> CompressionOutcome {
        let encoder = |_q: u8| -> Result<Vec<u8>, UpscaleError> { Ok(vec![0u8; 10]) };
        TargetSizeCompressor::default()
            .compress(&CompressionRequest::from_mb(0.001, encoder).unwrap())
            .unwrap()
    }

    #[test]
    fn test_happy_path() {
        let mut session = Session::new();
        assert_eq!(session.phase(), Phase::Idle);

        session.begin_upload(source()).unwrap();
        assert_eq!(session.phase(), Phase::Uploading);

        session.finish_upload(EnhanceOutcome::Success(image(b"big"))).unwrap();
        assert_eq!(session.phase(), Phase::Result);
        assert!(!session.used_fallback());

        assert_eq!(session.begin_compress().unwrap().bytes, b"big");
        assert_eq!(session.phase(), Phase::Compressing);

        session.finish_compress(Ok(outcome())).unwrap();
        assert_eq!(session.phase(), Phase::Result);
        assert!(session.compressed().is_some());
        assert!(session.enhanced().is_some());
    }

    #[test]
    fn test_fallback_is_recorded() {
        let mut session = Session::new();
        session.begin_upload(source()).unwrap();
        session
            .finish_upload(EnhanceOutcome::FallbackUsed {
                image: image(&[1, 2, 3]),
                warning: "Backend not configured".to_string(),
            })
            .unwrap();

        assert!(session.used_fallback());
        assert_eq!(session.warning(), Some("Backend not configured"));
        assert_eq!(session.phase(), Phase::Result);
    }

    #[test]
    fn test_failed_upload_returns_to_idle() {
        let mut session = Session::new();
        session.begin_upload(source()).unwrap();
        let err = session
            .finish_upload(EnhanceOutcome::Failed(UpscaleError::Backend {
                status: 500,
                body: "boom".to_string(),
            }))
            .unwrap_err();

        assert!(matches!(err, UpscaleError::Backend { status: 500, .. }));
        assert_eq!(session.phase(), Phase::Idle);
        assert!(session.last_error().unwrap().contains("boom"));
    }

    #[test]
    fn test_compression_error_keeps_result() {
        let mut session = Session::new();
        session.begin_upload(source()).unwrap();
        session.finish_upload(EnhanceOutcome::Success(image(b"x"))).unwrap();
        session.begin_compress().unwrap();

        let err = session
            .finish_compress(Err(UpscaleError::Encode("bad".to_string())))
            .unwrap_err();
        assert!(matches!(err, UpscaleError::Encode(_)));
        assert_eq!(session.phase(), Phase::Result);
        assert!(session.enhanced().is_some());
        assert!(session.compressed().is_none());
    }

    #[test]
    fn test_invalid_transitions() {
        let mut session = Session::new();
        assert!(matches!(
            session.begin_compress(),
            Err(UpscaleError::InvalidTransition(_))
        ));
        assert!(session
            .finish_upload(EnhanceOutcome::Success(image(b"x")))
            .is_err());

        session.begin_upload(source()).unwrap();
        assert!(session.begin_upload(source()).is_err());
        assert!(session.finish_compress(Ok(outcome())).is_err());
    }

    #[test]
    fn test_new_upload_clears_previous_result() {
        let mut session = Session::new();
        session.begin_upload(source()).unwrap();
        session
            .finish_upload(EnhanceOutcome::FallbackUsed {
                image: image(b"x"),
                warning: "w".to_string(),
            })
            .unwrap();

        session.begin_upload(source()).unwrap();
        assert!(session.enhanced().is_none());
        assert!(!session.used_fallback());

        session.reset();
        assert_eq!(session.phase(), Phase::Idle);
        assert!(session.source().is_none());
    }
}
