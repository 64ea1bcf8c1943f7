//! # Upscale Pipeline Orchestrator
//!
//! Orchestratore principale: collega sorgente, backend, compressore e file manager.
//!
//! ## Flusso per singolo file:
//! 1. Lettura del file in una `SourceImage`
//! 2. Limite pixel (ridimensionamento Lanczos3 su un worker bloccante)
//! 3. Upload al backend tramite `EnhancementClient` (o fallback all'originale)
//! 4. Scrittura del risultato (immagine elaborata o copia dell'originale)
//! 5. Se è impostata una dimensione target, ricerca binaria della qualità
//!    con `TargetSizeCompressor` dentro `spawn_blocking` e scrittura della
//!    copia compressa accanto al risultato
//!
//! Ogni passaggio di stato passa dalla `Session`, la stessa macchina a stati
//! usata da qualsiasi interfaccia.
//!
//! ## Modalità batch:
//! Se l'input è una directory, tutte le immagini vengono elaborate con al più
//! `workers` job concorrenti (semaforo). Un job fallito viene contato e loggato,
//! non interrompe il batch.

use crate::{
    compressor::{Attempt, CompressionOutcome, CompressionRequest, TargetSizeCompressor},
    config::Config,
    encoder::{OutputFormat, RasterEncoder},
    enhancer::EnhancementClient,
    error::UpscaleError,
    file_manager::{FileManager, OutputKind, OutputTarget},
    json_output::{JsonConfig, JsonMessage},
    progress::{ProgressManager, RunStats},
    session::Session,
    source::extension_for_mime,
};
use anyhow::{Context, Result};
use futures::future::join_all;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, error, info, warn};

/// How a job ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Backend returned a processed image
    Enhanced,
    /// Original image passed through
    Fallback,
    /// Local target-size compression, backend not involved
    CompressedOnly,
}

/// Compression details attached to a job report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompressionSummary {
    pub quality: u8,
    pub iterations: u32,
    pub size_bytes: u64,
    pub within_tolerance: bool,
    pub attempts: Vec<Attempt>,
}

impl From<&CompressionOutcome> for CompressionSummary {
    fn from(outcome: &CompressionOutcome) -> Self {
        Self {
            quality: outcome.encoded.quality,
            iterations: outcome.iterations,
            size_bytes: outcome.encoded.size_bytes(),
            within_tolerance: outcome.within_tolerance,
            attempts: outcome.attempts.clone(),
        }
    }
}

/// Result of one processed file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobReport {
    pub job_id: String,
    pub input: PathBuf,
    /// Enhanced image, copy of the original, or the compressed file for local compression
    pub output: PathBuf,
    /// Target-size copy, whenever compression ran
    pub compressed_output: Option<PathBuf>,
    pub status: JobStatus,
    pub warning: Option<String>,
    pub original_size: u64,
    pub enhanced_size: u64,
    pub final_size: u64,
    pub compression: Option<CompressionSummary>,
}

/// Run the target-size search over an encoded image on a blocking worker.
///
/// Decoding, every re-encode and the search itself happen off the async runtime.
pub async fn compress_bytes(
    compressor: &TargetSizeCompressor,
    bytes: Vec<u8>,
    format: OutputFormat,
    target_size_mb: f64,
) -> Result<CompressionOutcome, UpscaleError> {
    let compressor = compressor.clone();
    tokio::task::spawn_blocking(move || -> Result<CompressionOutcome, UpscaleError> {
        let encoder = RasterEncoder::from_bytes(&bytes, format)?;
        let request = CompressionRequest::from_mb(target_size_mb, encoder)?;
        compressor.compress(&request)
    })
    .await
    .map_err(|e| UpscaleError::Encode(format!("compression worker failed: {}", e)))?
}

/// Position of a job within a run, for JSON events
#[derive(Debug, Clone, Copy)]
struct JobSlot {
    index: usize,
    total: usize,
    batch: bool,
    /// Another input in the batch shares this one's stem
    disambiguate: bool,
}

/// Orchestratore principale. Cheap to clone: jobs in a batch share the HTTP client.
#[derive(Clone)]
pub struct UpscalePipeline {
    config: Config,
    client: EnhancementClient,
    compressor: TargetSizeCompressor,
}

impl UpscalePipeline {
    /// Crea nuova istanza della pipeline
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let client = EnhancementClient::new(&config).context("Failed to build HTTP client")?;
        let compressor = TargetSizeCompressor::new(config.compression.clone())?;

        Ok(Self {
            config,
            client,
            compressor,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn client(&self) -> &EnhancementClient {
        &self.client
    }

    /// Process a single file or every image under a directory
    pub async fn run(&self, input: &Path) -> Result<RunStats> {
        let start_time = std::time::Instant::now();

        if !input.exists() {
            return Err(anyhow::anyhow!("Input does not exist: {}", input.display()));
        }

        let stats = if input.is_dir() {
            self.run_batch(input).await?
        } else {
            self.emit_start(input, 1);
            let report = self.process_file(input).await?;
            let mut stats = RunStats::new();
            stats.add_report(&report);
            stats
        };

        let duration = start_time.elapsed().as_secs_f64();
        if self.config.json_output {
            JsonMessage::complete(&stats, duration).emit();
        } else {
            info!("✅ Done in {:.1}s", duration);
            info!("{}", stats.format_summary());
        }
        Ok(stats)
    }

    /// Enhance one file, compressing afterwards when a target size is configured
    pub async fn process_file(&self, input: &Path) -> Result<JobReport> {
        let base_dir = input.parent().unwrap_or(Path::new("")).to_path_buf();
        let slot = JobSlot {
            index: 0,
            total: 1,
            batch: false,
            disambiguate: false,
        };
        self.process_job(input, &base_dir, slot).await
    }

    async fn run_batch(&self, dir: &Path) -> Result<RunStats> {
        let files = FileManager::find_image_files(dir)?;
        self.emit_start(dir, files.len());

        if files.is_empty() {
            info!("No images found in {}", dir.display());
            return Ok(RunStats::new());
        }

        info!(
            "🔧 Processing {} images with {} workers",
            files.len(),
            self.config.workers
        );

        let colliding = FileManager::colliding_stems(&files);
        for file in &colliding {
            debug!("Shared stem, source extension kept in output names: {}", file.display());
        }

        let semaphore = Arc::new(Semaphore::new(self.config.workers));
        let stats = Arc::new(Mutex::new(RunStats::new()));
        let progress = (!self.config.json_output).then(|| ProgressManager::new(files.len() as u64));
        let total = files.len();

        let tasks = files.into_iter().enumerate().map(|(index, file_path)| {
            let pipeline = self.clone();
            let semaphore = semaphore.clone();
            let stats = stats.clone();
            let progress = progress.clone();
            let base_dir = dir.to_path_buf();
            let disambiguate = colliding.contains(&file_path);

            tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await?;
                let slot = JobSlot {
                    index,
                    total,
                    batch: true,
                    disambiguate,
                };
                let name = file_path.file_name().unwrap_or_default().to_string_lossy().to_string();

                let message = match pipeline.process_job(&file_path, &base_dir, slot).await {
                    Ok(report) => {
                        stats.lock().await.add_report(&report);
                        match report.status {
                            JobStatus::Fallback => format!("⚠️ {}: original kept", name),
                            _ => format!("✅ {}: upscaled", name),
                        }
                    }
                    Err(e) => {
                        error!("❌ Failed to process {}: {:#}", file_path.display(), e);
                        if pipeline.config.json_output {
                            JsonMessage::error(
                                format!("Failed to process {}", file_path.display()),
                                Some(format!("{:#}", e)),
                            )
                            .emit();
                        }
                        stats.lock().await.add_error();
                        format!("❌ {}: failed", name)
                    }
                };

                if let Some(progress) = progress {
                    progress.update(&message);
                }
                Ok::<(), anyhow::Error>(())
            })
        });

        for result in join_all(tasks).await {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Batch job aborted: {}", e),
                Err(e) => warn!("Batch job panicked: {}", e),
            }
        }

        let stats = stats.lock().await.clone();
        if let Some(progress) = progress {
            progress.finish(&stats.format_summary());
        }
        Ok(stats)
    }

    async fn process_job(&self, input: &Path, base_dir: &Path, slot: JobSlot) -> Result<JobReport> {
        let source = FileManager::read_source(input).await?;
        let original_size = source.size_bytes();
        let job_id = source.job_id();

        if self.config.json_output {
            JsonMessage::FileStart {
                path: input.to_path_buf(),
                job_id: job_id.clone(),
                size: original_size,
                index: slot.index,
                total: slot.total,
            }
            .emit();
        }

        let max_pixels = self.config.max_pixels;
        let source = tokio::task::spawn_blocking(move || source.fit_pixel_limit(max_pixels))
            .await
            .context("Pixel limit worker failed")?
            .with_context(|| format!("Failed to decode {}", input.display()))?;

        let mut session = Session::new();
        session.begin_upload(source)?;
        let outcome = {
            let source = session
                .source()
                .ok_or_else(|| UpscaleError::InvalidTransition("no source uploaded".to_string()))?;
            let spinner = (!self.config.json_output && !slot.batch)
                .then(|| ProgressManager::spinner(&format!("Upscaling {}...", source.file_name)));
            let outcome = self.client.enhance(source).await;
            if let Some(spinner) = spinner {
                spinner.finish_and_clear();
            }
            outcome
        };

        let enhanced = session
            .finish_upload(outcome)
            .with_context(|| format!("Enhancement failed for {}", input.display()))?
            .clone();
        let status = if session.used_fallback() {
            JobStatus::Fallback
        } else {
            JobStatus::Enhanced
        };
        let warning = session.warning().map(str::to_string);

        if self.config.json_output {
            JsonMessage::Enhanced {
                path: input.to_path_buf(),
                job_id: job_id.clone(),
                fallback: status == JobStatus::Fallback,
                warning: warning.clone(),
                content_type: enhanced.content_type.clone(),
                size: enhanced.size_bytes(),
            }
            .emit();
        } else if let Some(ref warning) = warning {
            warn!("⚠️ {}", warning);
        } else {
            info!(
                "🔍 {} enhanced: {} → {}",
                input.display(),
                FileManager::format_size(original_size),
                FileManager::format_size(enhanced.size_bytes())
            );
        }

        let target = OutputTarget {
            base_dir,
            output: self.config.output_path.as_deref(),
            batch: slot.batch,
            disambiguate: slot.disambiguate,
        };
        let result_kind = match status {
            JobStatus::Fallback => OutputKind::Fallback,
            _ => OutputKind::Enhanced {
                extension: extension_for_mime(&enhanced.content_type),
            },
        };
        let output = FileManager::resolve_output_path(
            input,
            &target,
            result_kind,
            self.config.target_size_mb.is_none(),
        );
        self.write_file(&output, &enhanced.bytes).await?;

        let mut compressed_output = None;
        let mut compression = None;
        let mut final_size = enhanced.size_bytes();

        if let Some(target_mb) = self.config.target_size_mb {
            let format = self.config.output_format;
            session.begin_compress()?;
            let result = compress_bytes(&self.compressor, enhanced.bytes.clone(), format, target_mb).await;
            let outcome = session
                .finish_compress(result)
                .with_context(|| format!("Compression failed for {}", input.display()))?;
            self.report_compression(input, &job_id, outcome, target_mb);

            let kind = OutputKind::Compressed {
                extension: format.extension(),
                upscaled: status == JobStatus::Enhanced,
            };
            let path = FileManager::resolve_output_path(input, &target, kind, true);
            self.write_file(&path, &outcome.encoded.bytes).await?;

            final_size = outcome.encoded.size_bytes();
            compression = Some(CompressionSummary::from(outcome));
            compressed_output = Some(path);
        }

        let report = JobReport {
            job_id,
            input: input.to_path_buf(),
            output,
            compressed_output,
            status,
            warning,
            original_size,
            enhanced_size: enhanced.size_bytes(),
            final_size,
            compression,
        };
        self.emit_file_complete(&report);
        Ok(report)
    }

    /// Re-encode a local file to the target size without calling the backend
    pub async fn compress_file(&self, input: &Path, target_size_mb: f64) -> Result<JobReport> {
        let source = FileManager::read_source(input).await?;
        let original_size = source.size_bytes();
        let job_id = source.job_id();
        let format = self.config.output_format;

        info!(
            "🗜️ Compressing {} to {:.2}MB as {}",
            input.display(),
            target_size_mb,
            format.extension()
        );

        let outcome = compress_bytes(&self.compressor, source.bytes, format, target_size_mb)
            .await
            .with_context(|| format!("Compression failed for {}", input.display()))?;
        self.report_compression(input, &job_id, &outcome, target_size_mb);

        let target = OutputTarget {
            base_dir: input.parent().unwrap_or(Path::new("")),
            output: self.config.output_path.as_deref(),
            batch: false,
            disambiguate: false,
        };
        let kind = OutputKind::Compressed {
            extension: format.extension(),
            upscaled: false,
        };
        let output = FileManager::resolve_output_path(input, &target, kind, true);
        self.write_file(&output, &outcome.encoded.bytes).await?;

        let report = JobReport {
            job_id,
            input: input.to_path_buf(),
            compressed_output: Some(output.clone()),
            output,
            status: JobStatus::CompressedOnly,
            warning: None,
            original_size,
            enhanced_size: original_size,
            final_size: outcome.encoded.size_bytes(),
            compression: Some(CompressionSummary::from(&outcome)),
        };
        self.emit_file_complete(&report);
        Ok(report)
    }

    fn report_compression(&self, input: &Path, job_id: &str, outcome: &CompressionOutcome, target_mb: f64) {
        if self.config.json_output {
            JsonMessage::Compressed {
                path: input.to_path_buf(),
                job_id: job_id.to_string(),
                quality: outcome.encoded.quality,
                iterations: outcome.iterations,
                size: outcome.encoded.size_bytes(),
                within_tolerance: outcome.within_tolerance,
                attempts: outcome.attempts.clone(),
            }
            .emit();
        } else if outcome.within_tolerance {
            info!(
                "🎯 {} compressed to {:.2}MB at quality {} ({} iterations)",
                input.display(),
                outcome.encoded.size_mb(),
                outcome.encoded.quality,
                outcome.iterations
            );
        } else {
            warn!(
                "⚠️ {}: target {:.2}MB not reached, kept {:.2}MB at quality {} after {} iterations",
                input.display(),
                target_mb,
                outcome.encoded.size_mb(),
                outcome.encoded.quality,
                outcome.iterations
            );
        }
    }

    async fn write_file(&self, output: &Path, bytes: &[u8]) -> Result<()> {
        FileManager::write_output(output, bytes)
            .await
            .with_context(|| format!("Failed to write {}", output.display()))?;
        debug!("Wrote {} bytes to {}", bytes.len(), output.display());
        Ok(())
    }

    fn emit_file_complete(&self, report: &JobReport) {
        if self.config.json_output {
            JsonMessage::FileComplete {
                path: report.input.clone(),
                output: report.output.clone(),
                compressed_output: report.compressed_output.clone(),
                original_size: report.original_size,
                final_size: report.final_size,
            }
            .emit();
            return;
        }

        info!(
            "💾 Saved {} ({})",
            report.output.display(),
            FileManager::format_size(report.enhanced_size)
        );
        if let Some(ref compressed) = report.compressed_output {
            info!(
                "💾 Saved {} ({}, {:+.1}% vs original)",
                compressed.display(),
                FileManager::format_size(report.final_size),
                -FileManager::calculate_reduction(report.original_size, report.final_size)
            );
        }
    }

    fn emit_start(&self, input: &Path, total_files: usize) {
        if self.config.json_output {
            JsonMessage::Start {
                input: input.to_path_buf(),
                output: self.config.output_path.clone(),
                total_files,
                config: JsonConfig::from(&self.config),
            }
            .emit();
        } else {
            match self.client.base_url() {
                Some(url) => info!("🚀 Backend: {}", url),
                None => warn!("⚠️ Backend not configured, originals will be returned"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compressor::QualityEncoder;
    use crate::encoder::tests::{noisy_image, png_bytes};
    use tempfile::TempDir;

    fn write_png(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, png_bytes(&noisy_image(width, height))).unwrap();
        path
    }

    fn offline_config() -> Config {
        Config {
            backend_url: None,
            json_output: true,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_unconfigured_backend_writes_original() {
        let temp_dir = TempDir::new().unwrap();
        let input = write_png(temp_dir.path(), "cat.png", 32, 32);

        let pipeline = UpscalePipeline::new(offline_config()).unwrap();
        let report = pipeline.process_file(&input).await.unwrap();

        assert_eq!(report.status, JobStatus::Fallback);
        assert_eq!(report.output, temp_dir.path().join("original-cat.png"));
        assert_eq!(std::fs::read(&report.output).unwrap(), std::fs::read(&input).unwrap());
        assert_eq!(report.job_id.len(), 16);
        assert!(report.warning.is_some());
        assert!(report.compression.is_none());
    }

    #[tokio::test]
    async fn test_fallback_with_target_compresses() {
        let temp_dir = TempDir::new().unwrap();
        let input = write_png(temp_dir.path(), "dog.png", 64, 64);

        let config = Config {
            target_size_mb: Some(0.01),
            ..offline_config()
        };
        let pipeline = UpscalePipeline::new(config).unwrap();
        let report = pipeline.process_file(&input).await.unwrap();

        assert_eq!(report.status, JobStatus::Fallback);
        assert_eq!(report.output, temp_dir.path().join("original-dog.png"));
        assert_eq!(std::fs::read(&report.output).unwrap(), std::fs::read(&input).unwrap());

        let compressed = report.compressed_output.clone().unwrap();
        assert_eq!(compressed, temp_dir.path().join("dog_compressed.jpg"));
        let summary = report.compression.unwrap();
        assert!(summary.iterations <= 10);
        assert_eq!(summary.attempts.len() as u32, summary.iterations + 1);
        assert_eq!(report.final_size, std::fs::metadata(&compressed).unwrap().len());
    }

    #[tokio::test]
    async fn test_explicit_output_file_receives_compressed_copy() {
        let temp_dir = TempDir::new().unwrap();
        let input = write_png(temp_dir.path(), "dog.png", 32, 32);
        let out_dir = temp_dir.path().join("out");
        std::fs::create_dir_all(&out_dir).unwrap();

        let config = Config {
            target_size_mb: Some(0.01),
            output_path: Some(out_dir.join("small.jpg")),
            ..offline_config()
        };
        let report = UpscalePipeline::new(config).unwrap().process_file(&input).await.unwrap();

        assert_eq!(report.compressed_output, Some(out_dir.join("small.jpg")));
        assert_eq!(report.output, out_dir.join("original-dog.png"));
        assert!(report.output.exists());
    }

    #[tokio::test]
    async fn test_compress_file_locally() {
        let temp_dir = TempDir::new().unwrap();
        let input = write_png(temp_dir.path(), "pic.png", 64, 48);

        let pipeline = UpscalePipeline::new(offline_config()).unwrap();
        let report = pipeline.compress_file(&input, 0.005).await.unwrap();

        assert_eq!(report.status, JobStatus::CompressedOnly);
        assert_eq!(report.output, temp_dir.path().join("pic_compressed.jpg"));
        assert_eq!(report.compressed_output.as_ref(), Some(&report.output));
        let written = std::fs::read(&report.output).unwrap();
        assert_eq!(image::guess_format(&written).unwrap(), image::ImageFormat::Jpeg);
    }

    #[tokio::test]
    async fn test_batch_run_keeps_going_after_errors() {
        let temp_dir = TempDir::new().unwrap();
        let input_dir = temp_dir.path().join("in");
        let nested = input_dir.join("nested");
        std::fs::create_dir_all(&nested).unwrap();
        write_png(&input_dir, "a.png", 16, 16);
        write_png(&nested, "b.png", 16, 16);
        std::fs::write(input_dir.join("broken.png"), b"not an image").unwrap();

        let output_dir = temp_dir.path().join("out");
        let config = Config {
            output_path: Some(output_dir.clone()),
            ..offline_config()
        };
        let pipeline = UpscalePipeline::new(config).unwrap();
        let stats = pipeline.run(&input_dir).await.unwrap();

        assert_eq!(stats.files_processed, 3);
        assert_eq!(stats.fallbacks, 2);
        assert_eq!(stats.errors, 1);
        assert!(output_dir.join("original-a.png").exists());
        assert!(output_dir.join("nested").join("original-b.png").exists());
    }

    #[tokio::test]
    async fn test_batch_shared_stems_get_distinct_outputs() {
        let temp_dir = TempDir::new().unwrap();
        let input_dir = temp_dir.path().join("in");
        std::fs::create_dir_all(&input_dir).unwrap();
        write_png(&input_dir, "photo.png", 32, 32);
        let jpeg = RasterEncoder::new(noisy_image(24, 24), OutputFormat::Jpeg)
            .encode(85)
            .unwrap();
        std::fs::write(input_dir.join("photo.jpg"), jpeg).unwrap();

        let config = Config {
            target_size_mb: Some(0.01),
            ..offline_config()
        };
        let pipeline = UpscalePipeline::new(config).unwrap();
        let stats = pipeline.run(&input_dir).await.unwrap();

        assert_eq!(stats.files_compressed, 2);
        assert_eq!(stats.errors, 0);
        for name in [
            "original-photo.png",
            "original-photo.jpg",
            "photo-png_compressed.jpg",
            "photo-jpg_compressed.jpg",
        ] {
            assert!(input_dir.join(name).exists(), "missing {}", name);
        }
        assert!(!input_dir.join("photo_compressed.jpg").exists());

        // A second run over the same directory ignores what the first one wrote
        let rerun = pipeline.run(&input_dir).await.unwrap();
        assert_eq!(rerun.files_processed, 2);
        assert!(!input_dir.join("original-original-photo.png").exists());
    }

    #[tokio::test]
    async fn test_corrupt_image_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("bad.jpg");
        std::fs::write(&input, b"garbage").unwrap();

        let pipeline = UpscalePipeline::new(offline_config()).unwrap();
        assert!(pipeline.process_file(&input).await.is_err());
        assert!(pipeline.compress_file(&input, 1.0).await.is_err());
    }

    #[tokio::test]
    async fn test_compress_bytes_rejects_bad_target() {
        let bytes = png_bytes(&noisy_image(8, 8));
        let result = compress_bytes(&TargetSizeCompressor::default(), bytes, OutputFormat::Jpeg, -1.0).await;
        assert!(matches!(result, Err(UpscaleError::InvalidTarget(_))));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = Config {
            workers: 0,
            ..Default::default()
        };
        assert!(UpscalePipeline::new(config).is_err());
    }
}
