//! # Raster Encoder Module
//!
//! Encoder concreti per la ricerca a dimensione target: decodificano l'immagine
//! sorgente una sola volta e la ri-codificano in memoria alla qualità richiesta.
//!
//! ## Formati di output:
//! | Formato | Parametro qualità | Note |
//! |---------|-------------------|------|
//! | JPEG    | 1-100 (0 → 1)     | Canale alpha scartato |
//! | PNG     | livello di compressione `9 - q/11` | Lossless, la qualità sceglie solo lo sforzo |
//!
//! Nessun I/O su file: tutto avviene su buffer `Vec<u8>`.

use crate::compressor::QualityEncoder;
use crate::error::UpscaleError;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ColorType, DynamicImage, GenericImageView, ImageEncoder};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Output container for re-encoded images
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Jpeg,
    Png,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Png => "png",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Png => "image/png",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = UpscaleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "jpg" | "jpeg" => Ok(OutputFormat::Jpeg),
            "png" => Ok(OutputFormat::Png),
            other => Err(UpscaleError::UnsupportedFormat(format!(
                "output format '{}' (expected jpeg or png)",
                other
            ))),
        }
    }
}

/// PNG compression level (0 = none, 9 = max) for a quality value.
pub fn png_compression_level(quality: u8) -> u8 {
    9u8.saturating_sub(quality.min(100) / 11)
}

fn png_compression_type(quality: u8) -> CompressionType {
    match png_compression_level(quality) {
        0..=2 => CompressionType::Fast,
        3..=6 => CompressionType::Default,
        _ => CompressionType::Best,
    }
}

/// Decoded raster plus the output format to re-encode into.
pub struct RasterEncoder {
    image: DynamicImage,
    format: OutputFormat,
}

impl RasterEncoder {
    pub fn new(image: DynamicImage, format: OutputFormat) -> Self {
        Self { image, format }
    }

    /// Decode an encoded file held in memory.
    ///
    /// Empty or corrupt input fails here with `UpscaleError::Image`.
    pub fn from_bytes(bytes: &[u8], format: OutputFormat) -> Result<Self, UpscaleError> {
        let image = image::load_from_memory(bytes)?;
        Ok(Self::new(image, format))
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>, UpscaleError> {
        let rgb = self.image.to_rgb8();
        let mut buffer = Vec::new();
        JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100)).write_image(
            rgb.as_raw(),
            rgb.width(),
            rgb.height(),
            ColorType::Rgb8,
        )?;
        Ok(buffer)
    }

    fn encode_png(&self, quality: u8) -> Result<Vec<u8>, UpscaleError> {
        let rgba = self.image.to_rgba8();
        let mut buffer = Vec::new();
        PngEncoder::new_with_quality(&mut buffer, png_compression_type(quality), FilterType::Adaptive)
            .write_image(rgba.as_raw(), rgba.width(), rgba.height(), ColorType::Rgba8)?;
        Ok(buffer)
    }
}

impl QualityEncoder for RasterEncoder {
    fn encode(&self, quality: u8) -> Result<Vec<u8>, UpscaleError> {
        match self.format {
            OutputFormat::Jpeg => self.encode_jpeg(quality),
            OutputFormat::Png => self.encode_png(quality),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    /// Deterministic noisy image, compresses poorly enough to show quality effects.
    pub(crate) fn noisy_image(width: u32, height: u32) -> DynamicImage {
        let mut seed: u32 = 0x2545_f491;
        let img = RgbImage::from_fn(width, height, |x, y| {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            let n = (seed & 0x3f) as u8;
            Rgb([(x % 256) as u8 ^ n, (y % 256) as u8, n.wrapping_mul(3)])
        });
        DynamicImage::ImageRgb8(img)
    }

    pub(crate) fn png_bytes(image: &DynamicImage) -> Vec<u8> {
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn test_jpeg_quality_affects_size() {
        let encoder = RasterEncoder::new(noisy_image(128, 128), OutputFormat::Jpeg);
        let low = encoder.encode(10).unwrap();
        let high = encoder.encode(100).unwrap();
        assert!(low.len() < high.len());
        assert_eq!(image::guess_format(&low).unwrap(), ImageFormat::Jpeg);
    }

    #[test]
    fn test_quality_zero_is_clamped() {
        let encoder = RasterEncoder::new(noisy_image(32, 32), OutputFormat::Jpeg);
        let bytes = encoder.encode(0).unwrap();
        assert!(image::load_from_memory(&bytes).is_ok());
    }

    #[test]
    fn test_png_roundtrip_preserves_dimensions() {
        let encoder = RasterEncoder::new(noisy_image(40, 24), OutputFormat::Png);
        let bytes = encoder.encode(80).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!(decoded.dimensions(), (40, 24));
    }

    #[test]
    fn test_from_bytes_rejects_empty_and_corrupt() {
        assert!(matches!(
            RasterEncoder::from_bytes(&[], OutputFormat::Jpeg),
            Err(UpscaleError::Image(_))
        ));
        assert!(RasterEncoder::from_bytes(b"definitely not an image", OutputFormat::Png).is_err());
    }

    #[test]
    fn test_from_bytes_decodes_png() {
        let bytes = png_bytes(&noisy_image(16, 8));
        let encoder = RasterEncoder::from_bytes(&bytes, OutputFormat::Jpeg).unwrap();
        assert_eq!(encoder.dimensions(), (16, 8));
    }

    #[test]
    fn test_png_compression_level_mapping() {
        assert_eq!(png_compression_level(0), 9);
        assert_eq!(png_compression_level(50), 5);
        assert_eq!(png_compression_level(99), 0);
        assert_eq!(png_compression_level(100), 0);
    }

    #[test]
    fn test_output_format_parsing() {
        assert_eq!("JPEG".parse::<OutputFormat>().unwrap(), OutputFormat::Jpeg);
        assert_eq!("png".parse::<OutputFormat>().unwrap(), OutputFormat::Png);
        assert!("gif".parse::<OutputFormat>().is_err());
    }
}
