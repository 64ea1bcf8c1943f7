//! # File Management Module
//!
//! Questo modulo gestisce tutte le operazioni sui file e la discovery delle immagini.
//!
//! ## Responsabilità:
//! - Discovery ricorsiva di immagini in una directory (modalità batch)
//! - Caricamento del file sorgente in una `SourceImage`
//! - Calcolo del path di output in base all'esito del job
//! - Scrittura sicura dell'output (file temporaneo + rename)
//! - Formattazione human-readable delle dimensioni
//!
//! ## Formati supportati in input:
//! - **Immagini**: JPG, JPEG, PNG, WebP
//!
//! ## Naming dell'output:
//! | Esito | Nome file |
//! |-------|-----------|
//! | Enhancement riuscito | `<stem>_upscaled.<ext dal content type>` |
//! | Fallback (backend assente) | `original-<nome originale>` |
//! | Copia compressa dopo enhancement | `<stem>_upscaled_compressed.<jpg/png>` |
//! | Copia compressa dell'originale | `<stem>_compressed.<jpg/png>` |
//!
//! Se due input dello stesso batch condividono directory e stem (`photo.png`,
//! `photo.jpg`) lo stem diventa `<stem>-<ext sorgente>` per entrambi.
//! I file con questi nomi non vengono riletti come input al run successivo.
//!
//! ## Esempio:
//! ```rust,ignore
//! let files = FileManager::find_image_files(Path::new("/path/to/photos"))?;
//! for file in files {
//!     let source = FileManager::read_source(&file).await?;
//! }
//! ```

use crate::source::SourceImage;
use anyhow::Result;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tokio::fs;
use walkdir::WalkDir;

/// What the written file contains; drives the output name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind<'a> {
    /// Backend result, extension taken from its content type
    Enhanced { extension: &'a str },
    /// Original bytes returned unchanged
    Fallback,
    /// Target-size re-encode of the upscaled image or of the original
    Compressed { extension: &'a str, upscaled: bool },
}

/// Where outputs for one input go
#[derive(Debug, Clone, Copy)]
pub struct OutputTarget<'a> {
    /// Root the batch was discovered from
    pub base_dir: &'a Path,
    /// Explicit output file or directory
    pub output: Option<&'a Path>,
    pub batch: bool,
    /// Another input shares this one's directory and stem
    pub disambiguate: bool,
}

const GENERATED_SUFFIXES: &[&str] = &["_upscaled", "_compressed"];
const FALLBACK_PREFIX: &str = "original-";

/// Manages file operations and discovery
pub struct FileManager;

impl FileManager {
    /// Find all supported images in a directory, sorted for stable ordering
    pub fn find_image_files(dir: &Path) -> Result<Vec<PathBuf>> {
        let mut files: Vec<PathBuf> = WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|path| Self::is_image(path) && !Self::is_generated_output(path))
            .collect();
        files.sort();
        Ok(files)
    }

    /// Check if a file is an image
    pub fn is_image(path: &Path) -> bool {
        if let Some(ext) = path.extension() {
            let ext_lower = ext.to_string_lossy().to_lowercase();
            matches!(ext_lower.as_str(), "jpg" | "jpeg" | "png" | "webp")
        } else {
            false
        }
    }

    /// True for names this tool writes, so reruns over a directory skip them
    pub fn is_generated_output(path: &Path) -> bool {
        let name = path.file_name().unwrap_or_default().to_string_lossy();
        let stem = path.file_stem().unwrap_or_default().to_string_lossy();
        name.starts_with(FALLBACK_PREFIX)
            || GENERATED_SUFFIXES.iter().any(|suffix| stem.ends_with(suffix))
    }

    /// Inputs whose directory and stem (case-insensitive) collide with another input
    pub fn colliding_stems(files: &[PathBuf]) -> HashSet<PathBuf> {
        let mut groups: HashMap<(PathBuf, String), Vec<&PathBuf>> = HashMap::new();
        for file in files {
            let parent = file.parent().unwrap_or(Path::new("")).to_path_buf();
            let stem = file.file_stem().unwrap_or_default().to_string_lossy().to_lowercase();
            groups.entry((parent, stem)).or_default().push(file);
        }
        groups
            .into_values()
            .filter(|group| group.len() > 1)
            .flatten()
            .cloned()
            .collect()
    }

    /// Load a file into memory as a `SourceImage`
    pub async fn read_source(path: &Path) -> Result<SourceImage> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| anyhow::anyhow!("Invalid file name: {}", path.display()))?;
        let bytes = fs::read(path)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
        Ok(SourceImage::new(file_name, bytes))
    }

    /// File name for an output of the given kind.
    ///
    /// With `disambiguate` the source extension is folded into the stem.
    pub fn output_file_name(input_path: &Path, kind: OutputKind<'_>, disambiguate: bool) -> String {
        let mut stem = input_path.file_stem().unwrap_or_default().to_string_lossy().to_string();
        if disambiguate {
            if let Some(ext) = input_path.extension() {
                stem = format!("{}-{}", stem, ext.to_string_lossy().to_lowercase());
            }
        }
        match kind {
            OutputKind::Enhanced { extension } => format!("{}_upscaled.{}", stem, extension),
            OutputKind::Compressed {
                extension,
                upscaled: true,
            } => format!("{}_upscaled_compressed.{}", stem, extension),
            OutputKind::Compressed {
                extension,
                upscaled: false,
            } => format!("{}_compressed.{}", stem, extension),
            OutputKind::Fallback => format!(
                "{}{}",
                FALLBACK_PREFIX,
                input_path.file_name().unwrap_or_default().to_string_lossy()
            ),
        }
    }

    /// Where to write the output of `kind` for `input_path`.
    ///
    /// - no explicit output: next to the input
    /// - output is a directory (or batch mode): inside it, keeping the path
    ///   relative to `base_dir`
    /// - output is a file: the `primary` output goes exactly there, any other
    ///   output lands beside it under its generated name
    pub fn resolve_output_path(
        input_path: &Path,
        target: &OutputTarget<'_>,
        kind: OutputKind<'_>,
        primary: bool,
    ) -> PathBuf {
        let filename = Self::output_file_name(input_path, kind, target.disambiguate);

        match target.output {
            Some(output) if target.batch || output.is_dir() => {
                let relative_path = input_path
                    .strip_prefix(target.base_dir)
                    .unwrap_or(input_path)
                    .parent()
                    .unwrap_or(Path::new(""));
                output.join(relative_path).join(filename)
            }
            Some(output) if primary => output.to_path_buf(),
            Some(output) => output.with_file_name(filename),
            None => input_path.with_file_name(filename),
        }
    }

    /// Write bytes via a temporary sibling and rename into place
    pub async fn write_output(path: &Path, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let tmp_path = path.with_extension(format!(
            "{}.part",
            path.extension().unwrap_or_default().to_string_lossy()
        ));
        fs::write(&tmp_path, bytes).await?;
        if let Err(e) = fs::rename(&tmp_path, path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }
        Ok(())
    }

    /// Get human-readable file size
    pub fn format_size(size: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = size as f64;
        let mut unit_index = 0;

        while size >= 1024.0 && unit_index < UNITS.len() - 1 {
            size /= 1024.0;
            unit_index += 1;
        }

        if unit_index == 0 {
            format!("{} {}", size as u64, UNITS[unit_index])
        } else {
            format!("{:.2} {}", size, UNITS[unit_index])
        }
    }

    /// Calculate percentage reduction
    pub fn calculate_reduction(original_size: u64, new_size: u64) -> f64 {
        if original_size == 0 {
            0.0
        } else {
            ((original_size as f64 - new_size as f64) / original_size as f64) * 100.0
        }
    }
}
