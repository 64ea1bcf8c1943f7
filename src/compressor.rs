//! # Target-Size Compressor Module
//!
//! Questo modulo implementa la ricerca binaria sulla qualità dell'encoder per
//! ottenere un file di dimensione vicina a un target espresso in MB.
//!
//! ## Responsabilità:
//! - Ri-codifica l'immagine a qualità diverse finché la dimensione è entro la tolleranza
//! - Limita il numero di tentativi (`max_iterations`) per garantire la terminazione
//! - Restituisce sempre l'ultimo tentativo, anche se il target non è raggiungibile
//! - Propaga senza modifiche gli errori dell'encoder (nessun retry)
//!
//! ## Algoritmo:
//! 1. Parte da `initial_quality` (90) con intervallo `[min_quality, max_quality]` = `[10, 100]`
//! 2. Se il risultato è troppo grande: `max = q`, `q = (min + q) / 2`
//! 3. Se è troppo piccolo: `min = q`, `q = (q + max) / 2`
//! 4. Si ferma quando `|size - target| <= tolerance_mb` oppure a `max_iterations`
//!
//! La curva dimensione/qualità di un encoder lossy non è strettamente monotona
//! (plateau), quindi la convergenza è limitata da un numero fisso di iterazioni.
//!
//! ## Esempio:
//! ```rust,ignore
//! let compressor = TargetSizeCompressor::default();
//! let request = CompressionRequest::from_mb(5.0, encoder)?;
//! let outcome = compressor.compress(&request)?;
//! println!("q={} size={}", outcome.encoded.quality, outcome.encoded.size_bytes());
//! ```

use crate::error::UpscaleError;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Bytes in one megabyte as used for every size comparison.
pub const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Tunables of the quality search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionSettings {
    /// Quality of the first encode attempt
    pub initial_quality: u8,
    /// Lower bound of the search interval
    pub min_quality: u8,
    /// Upper bound of the search interval (at most 100)
    pub max_quality: u8,
    /// Accepted distance from the target, in MB
    pub tolerance_mb: f64,
    /// Re-encode budget after the first attempt
    pub max_iterations: u32,
}

impl Default for CompressionSettings {
    fn default() -> Self {
        Self {
            initial_quality: 90,
            min_quality: 10,
            max_quality: 100,
            tolerance_mb: 0.1,
            max_iterations: 10,
        }
    }
}

impl CompressionSettings {
    /// Validate search bounds and budget
    pub fn validate(&self) -> Result<(), UpscaleError> {
        if self.max_quality > 100 {
            return Err(UpscaleError::Validation(
                "Max quality must be between 0 and 100".to_string(),
            ));
        }

        if self.min_quality > self.initial_quality || self.initial_quality > self.max_quality {
            return Err(UpscaleError::Validation(format!(
                "Quality bounds must satisfy min <= initial <= max (got {} <= {} <= {})",
                self.min_quality, self.initial_quality, self.max_quality
            )));
        }

        if !self.tolerance_mb.is_finite() || self.tolerance_mb <= 0.0 {
            return Err(UpscaleError::Validation(
                "Tolerance must be a positive number of MB".to_string(),
            ));
        }

        if self.max_iterations == 0 {
            return Err(UpscaleError::Validation(
                "Max iterations must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Anything that can turn a quality level into an encoded buffer.
///
/// Implementations must not perform retries: a failure at a given quality is
/// reported once and ends the search.
pub trait QualityEncoder {
    fn encode(&self, quality: u8) -> Result<Vec<u8>, UpscaleError>;
}

impl<F> QualityEncoder for F
where
    F: Fn(u8) -> Result<Vec<u8>, UpscaleError>,
{
    fn encode(&self, quality: u8) -> Result<Vec<u8>, UpscaleError> {
        self(quality)
    }
}

/// One compression job: a target size and the encoder to drive.
pub struct CompressionRequest<E> {
    pub target_size_bytes: u64,
    pub encoder: E,
}

impl<E: QualityEncoder> CompressionRequest<E> {
    /// Build a request from a size in megabytes.
    ///
    /// Rejects zero, negative and non-finite sizes.
    pub fn from_mb(target_size_mb: f64, encoder: E) -> Result<Self, UpscaleError> {
        if !target_size_mb.is_finite() || target_size_mb <= 0.0 {
            return Err(UpscaleError::InvalidTarget(format!(
                "target size must be a positive number of MB, got {}",
                target_size_mb
            )));
        }

        let target_size_bytes = ((target_size_mb * BYTES_PER_MB).round() as u64).max(1);
        Ok(Self {
            target_size_bytes,
            encoder,
        })
    }

    pub fn target_size_mb(&self) -> f64 {
        self.target_size_bytes as f64 / BYTES_PER_MB
    }
}

/// Output of one encode call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedResult {
    pub bytes: Vec<u8>,
    pub quality: u8,
}

impl EncodedResult {
    pub fn size_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn size_mb(&self) -> f64 {
        self.size_bytes() as f64 / BYTES_PER_MB
    }
}

/// A single point on the convergence path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attempt {
    pub quality: u8,
    pub size_bytes: u64,
}

impl Attempt {
    fn distance_mb(&self, target_mb: f64) -> f64 {
        (self.size_bytes as f64 / BYTES_PER_MB - target_mb).abs()
    }
}

/// Mutable state of one search, discarded when it returns.
#[derive(Debug, Clone)]
pub struct SearchState {
    pub quality: u8,
    pub min_quality: u8,
    pub max_quality: u8,
    pub iterations: u32,
    /// Attempt closest to the target so far
    pub best: Option<Attempt>,
}

impl SearchState {
    pub fn new(settings: &CompressionSettings) -> Self {
        Self {
            quality: settings.initial_quality,
            min_quality: settings.min_quality,
            max_quality: settings.max_quality,
            iterations: 0,
            best: None,
        }
    }

    fn record(&mut self, attempt: Attempt, target_mb: f64) {
        let closer = match self.best {
            Some(best) => attempt.distance_mb(target_mb) < best.distance_mb(target_mb),
            None => true,
        };
        if closer {
            self.best = Some(attempt);
        }
    }

    /// Halve the interval toward the target. Keeps `min <= quality <= max`.
    fn narrow(&mut self, current_mb: f64, target_mb: f64) {
        if current_mb > target_mb {
            self.max_quality = self.quality;
            self.quality = midpoint(self.min_quality, self.quality);
        } else {
            self.min_quality = self.quality;
            self.quality = midpoint(self.quality, self.max_quality);
        }
    }
}

fn midpoint(low: u8, high: u8) -> u8 {
    ((u16::from(low) + u16::from(high)) / 2) as u8
}

/// Result of a finished search.
#[derive(Debug, Clone)]
pub struct CompressionOutcome {
    /// Last produced buffer
    pub encoded: EncodedResult,
    /// Re-encodes performed after the first attempt
    pub iterations: u32,
    /// Every (quality, size) pair in encode order
    pub attempts: Vec<Attempt>,
    pub best: Attempt,
    pub within_tolerance: bool,
}

/// Bounded binary search over encoder quality.
#[derive(Debug, Clone, Default)]
pub struct TargetSizeCompressor {
    settings: CompressionSettings,
}

impl TargetSizeCompressor {
    pub fn new(settings: CompressionSettings) -> Result<Self, UpscaleError> {
        settings.validate()?;
        Ok(Self { settings })
    }

    pub fn settings(&self) -> &CompressionSettings {
        &self.settings
    }

    /// Run the search for `request`.
    ///
    /// Never fails because the target is out of reach; the last attempt is
    /// returned once the iteration budget is spent. Encoder errors are
    /// returned as-is.
    pub fn compress<E: QualityEncoder>(
        &self,
        request: &CompressionRequest<E>,
    ) -> Result<CompressionOutcome, UpscaleError> {
        let target_mb = request.target_size_mb();
        let mut state = SearchState::new(&self.settings);
        let mut attempts = Vec::new();

        let mut encoded = Self::attempt(request, &mut state, &mut attempts, target_mb)?;
        let mut current_mb = encoded.size_mb();

        while (current_mb - target_mb).abs() > self.settings.tolerance_mb
            && state.iterations < self.settings.max_iterations
        {
            state.narrow(current_mb, target_mb);
            encoded = Self::attempt(request, &mut state, &mut attempts, target_mb)?;
            current_mb = encoded.size_mb();
            state.iterations += 1;
        }

        let within_tolerance = (current_mb - target_mb).abs() <= self.settings.tolerance_mb;
        debug!(
            "Compression search finished: quality={} size={:.3}MB target={:.3}MB iterations={} within_tolerance={}",
            encoded.quality, current_mb, target_mb, state.iterations, within_tolerance
        );

        let best = state.best.unwrap_or(Attempt {
            quality: encoded.quality,
            size_bytes: encoded.size_bytes(),
        });

        Ok(CompressionOutcome {
            encoded,
            iterations: state.iterations,
            attempts,
            best,
            within_tolerance,
        })
    }

    fn attempt<E: QualityEncoder>(
        request: &CompressionRequest<E>,
        state: &mut SearchState,
        attempts: &mut Vec<Attempt>,
        target_mb: f64,
    ) -> Result<EncodedResult, UpscaleError> {
        let bytes = request.encoder.encode(state.quality)?;
        let encoded = EncodedResult {
            bytes,
            quality: state.quality,
        };
        let attempt = Attempt {
            quality: encoded.quality,
            size_bytes: encoded.size_bytes(),
        };
        debug!(
            "Encoded at quality {} -> {} bytes (range {}..={})",
            attempt.quality, attempt.size_bytes, state.min_quality, state.max_quality
        );
        state.record(attempt, target_mb);
        attempts.push(attempt);
        Ok(encoded)
    }
}
