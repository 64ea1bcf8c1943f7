//! # Source Image Module
//!
//! Rappresenta l'immagine caricata dall'utente così come arriva dal disco:
//! nome file, byte originali e content type rilevato dai magic bytes.
//!
//! ## Responsabilità:
//! - Rilevamento formato e MIME type dai byte (non dall'estensione)
//! - Identificativo di job deterministico (SHA-256 dei byte, 16 caratteri hex)
//! - Limite pixel prima dell'upload: le immagini oltre `max_pixels` vengono
//!   ridotte con Lanczos3 mantenendo l'aspect ratio e ri-codificate in PNG

use crate::error::UpscaleError;
use image::imageops::FilterType;
use image::{GenericImageView, ImageFormat};
use sha2::{Digest, Sha256};
use std::io::Cursor;
use tracing::info;

/// Raw upload: immutable for the duration of one job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceImage {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub content_type: String,
}

impl SourceImage {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let content_type = mime_for_bytes(&bytes).to_string();
        Self {
            file_name: file_name.into(),
            bytes,
            content_type,
        }
    }

    pub fn size_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// First 16 hex chars of the SHA-256 of the bytes
    pub fn job_id(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.bytes);
        hex::encode(hasher.finalize())[..16].to_string()
    }

    /// Downscale so that `width * height <= max_pixels`.
    ///
    /// Returns the source unchanged when it already fits.
    pub fn fit_pixel_limit(self, max_pixels: u64) -> Result<Self, UpscaleError> {
        let image = image::load_from_memory(&self.bytes)?;
        let (width, height) = image.dimensions();
        let total = u64::from(width) * u64::from(height);
        if total <= max_pixels {
            return Ok(self);
        }

        let (new_width, new_height) = fitted_dimensions(width, height, max_pixels);
        info!(
            "📐 {} is {}x{} ({} pixels), resizing to {}x{} before upload",
            self.file_name, width, height, total, new_width, new_height
        );

        let resized = image.resize_exact(new_width, new_height, FilterType::Lanczos3);
        let mut bytes = Vec::new();
        resized.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;

        Ok(Self {
            file_name: self.file_name,
            content_type: "image/png".to_string(),
            bytes,
        })
    }
}

/// Largest `(w, h)` with the same aspect ratio and `w * h <= max_pixels`.
///
/// A side that would round to zero is kept at 1 and the other side absorbs
/// the whole budget.
fn fitted_dimensions(width: u32, height: u32, max_pixels: u64) -> (u32, u32) {
    let budget = max_pixels.max(1);
    let ratio = (budget as f64 / (u64::from(width) * u64::from(height)) as f64).sqrt();
    let mut new_width = u64::from(((width as f64 * ratio) as u32).max(1));
    let mut new_height = u64::from(((height as f64 * ratio) as u32).max(1));

    if new_width * new_height > budget {
        if new_height == 1 {
            new_width = budget;
        } else {
            new_height = (budget / new_width).max(1);
        }
    }
    (new_width.min(u64::from(width)) as u32, new_height.min(u64::from(height)) as u32)
}

/// MIME type sniffed from magic bytes, `application/octet-stream` if unknown
pub fn mime_for_bytes(bytes: &[u8]) -> &'static str {
    match image::guess_format(bytes) {
        Ok(ImageFormat::Png) => "image/png",
        Ok(ImageFormat::Jpeg) => "image/jpeg",
        Ok(ImageFormat::WebP) => "image/webp",
        Ok(ImageFormat::Gif) => "image/gif",
        Ok(ImageFormat::Bmp) => "image/bmp",
        Ok(ImageFormat::Tiff) => "image/tiff",
        _ => "application/octet-stream",
    }
}

/// File extension for a MIME type; parameters after `;` are ignored
pub fn extension_for_mime(mime: &str) -> &'static str {
    let essence = mime.split(';').next().unwrap_or("").trim().to_lowercase();
    match essence.as_str() {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "image/bmp" => "bmp",
        "image/tiff" => "tiff",
        _ => "png",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::tests::{noisy_image, png_bytes};

    #[test]
    fn test_content_type_detection() {
        let source = SourceImage::new("a.png", png_bytes(&noisy_image(4, 4)));
        assert_eq!(source.content_type, "image/png");

        let unknown = SourceImage::new("a.bin", b"hello".to_vec());
        assert_eq!(unknown.content_type, "application/octet-stream");
    }

    #[test]
    fn test_job_id_is_stable() {
        let a = SourceImage::new("a.png", vec![1, 2, 3]);
        let b = SourceImage::new("renamed.png", vec![1, 2, 3]);
        assert_eq!(a.job_id(), b.job_id());
        assert_eq!(a.job_id().len(), 16);
        assert_ne!(a.job_id(), SourceImage::new("a.png", vec![4]).job_id());
    }

    #[test]
    fn test_fit_pixel_limit_keeps_small_images() {
        let source = SourceImage::new("small.png", png_bytes(&noisy_image(10, 10)));
        let fitted = source.clone().fit_pixel_limit(100).unwrap();
        assert_eq!(fitted, source);
    }

    #[test]
    fn test_fit_pixel_limit_downscales() {
        let source = SourceImage::new("big.png", png_bytes(&noisy_image(40, 20)));
        let fitted = source.fit_pixel_limit(200).unwrap();
        let decoded = image::load_from_memory(&fitted.bytes).unwrap();
        let (w, h) = decoded.dimensions();
        assert!(u64::from(w) * u64::from(h) <= 200);
        assert_eq!((w, h), (20, 10));
        assert_eq!(fitted.content_type, "image/png");
    }

    #[test]
    fn test_fitted_dimensions_respect_budget() {
        assert_eq!(fitted_dimensions(100_000, 1, 100), (100, 1));
        assert_eq!(fitted_dimensions(1, 100_000, 100), (1, 100));
        assert_eq!(fitted_dimensions(40, 20, 200), (20, 10));

        for (w, h, max) in [(10_001, 3, 97), (7, 9_999, 50), (12_345, 6_789, 100_000_000), (3, 2, 1)] {
            let (fw, fh) = fitted_dimensions(w, h, max);
            assert!(fw >= 1 && fh >= 1);
            assert!(u64::from(fw) * u64::from(fh) <= max, "{}x{} -> {}x{}", w, h, fw, fh);
        }
    }

    #[test]
    fn test_fit_pixel_limit_extreme_aspect_ratio() {
        let source = SourceImage::new("strip.png", png_bytes(&noisy_image(2_000, 1)));
        let fitted = source.fit_pixel_limit(100).unwrap();
        let decoded = image::load_from_memory(&fitted.bytes).unwrap();
        assert_eq!(decoded.dimensions(), (100, 1));
    }

    #[test]
    fn test_fit_pixel_limit_rejects_corrupt() {
        let source = SourceImage::new("bad.png", Vec::new());
        assert!(matches!(source.fit_pixel_limit(10), Err(UpscaleError::Image(_))));
    }

    #[test]
    fn test_extension_for_mime() {
        assert_eq!(extension_for_mime("image/jpeg"), "jpg");
        assert_eq!(extension_for_mime("image/png; charset=binary"), "png");
        assert_eq!(extension_for_mime("application/octet-stream"), "png");
    }
}
