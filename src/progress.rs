//! # Progress Tracking and Statistics Module
//!
//! Questo modulo gestisce il progress tracking e le statistiche dei job di upscaling.
//!
//! ## Responsabilità:
//! - Progress bar visual con `indicatif` per la modalità batch
//! - Spinner durante l'attesa del backend (singolo file)
//! - Tracking statistiche (file elaborati, fallback, compressi, errori)
//! - Report finale con byte in ingresso/uscita
//!
//! ## Visual feedback:
//! ```text
//! ⠋ [00:00:42] [========>-------------------------------] 3/12 (25%) ✅ cat.png: upscaled
//! ```
//!
//! ## Esempio:
//! ```rust,ignore
//! let progress = ProgressManager::new(total_files);
//! let mut stats = RunStats::new();
//!
//! stats.add_report(&report);
//! progress.update("cat.png: upscaled");
//!
//! progress.finish(&stats.format_summary());
//! ```

use crate::file_manager::FileManager;
use crate::pipeline::{JobReport, JobStatus};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Manages progress reporting for batch runs
#[derive(Clone)]
pub struct ProgressManager {
    bar: ProgressBar,
}

impl ProgressManager {
    /// Create a new progress manager
    pub fn new(total_files: u64) -> Self {
        let bar = ProgressBar::new(total_files);

        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );

        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Update progress with a message
    pub fn update(&self, message: &str) {
        self.bar.inc(1);
        self.bar.set_message(message.to_string());
    }

    /// Finish with a final message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

    /// Create a spinner for indeterminate progress
    pub fn spinner(message: &str) -> ProgressBar {
        let spinner = ProgressBar::new_spinner();

        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );

        spinner.set_message(message.to_string());
        spinner.enable_steady_tick(Duration::from_millis(100));

        spinner
    }
}

/// Statistics tracker for a run
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RunStats {
    pub files_processed: usize,
    pub files_enhanced: usize,
    pub fallbacks: usize,
    pub files_compressed: usize,
    pub errors: usize,
    pub total_input_bytes: u64,
    pub total_output_bytes: u64,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_report(&mut self, report: &JobReport) {
        self.files_processed += 1;
        match report.status {
            JobStatus::Enhanced => self.files_enhanced += 1,
            JobStatus::Fallback => self.fallbacks += 1,
            JobStatus::CompressedOnly => {}
        }
        if report.compression.is_some() {
            self.files_compressed += 1;
        }
        self.total_input_bytes += report.original_size;
        self.total_output_bytes += report.final_size;
    }

    pub fn add_error(&mut self) {
        self.files_processed += 1;
        self.errors += 1;
    }

    pub fn format_summary(&self) -> String {
        format!(
            "Processed: {} files | Enhanced: {} | Fallback: {} | Compressed: {} | Errors: {} | In: {} | Out: {}",
            self.files_processed,
            self.files_enhanced,
            self.fallbacks,
            self.files_compressed,
            self.errors,
            FileManager::format_size(self.total_input_bytes),
            FileManager::format_size(self.total_output_bytes),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::CompressionSummary;
    use std::path::PathBuf;

    fn report(status: JobStatus, compressed: bool) -> JobReport {
        JobReport {
            job_id: "0123456789abcdef".to_string(),
            input: PathBuf::from("in.png"),
            output: PathBuf::from("out.png"),
            compressed_output: compressed.then(|| PathBuf::from("out_compressed.jpg")),
            status,
            warning: None,
            original_size: 1000,
            enhanced_size: 4000,
            final_size: 2000,
            compression: compressed.then(|| CompressionSummary {
                quality: 50,
                iterations: 3,
                size_bytes: 2000,
                within_tolerance: true,
                attempts: Vec::new(),
            }),
        }
    }

    #[test]
    fn test_stats_accumulate() {
        let mut stats = RunStats::new();
        stats.add_report(&report(JobStatus::Enhanced, true));
        stats.add_report(&report(JobStatus::Fallback, false));
        stats.add_error();

        assert_eq!(stats.files_processed, 3);
        assert_eq!(stats.files_enhanced, 1);
        assert_eq!(stats.fallbacks, 1);
        assert_eq!(stats.files_compressed, 1);
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.total_input_bytes, 2000);
        assert_eq!(stats.total_output_bytes, 4000);
        assert!(stats.format_summary().contains("Fallback: 1"));
    }
}
