//! # Image Upscaler - Main Entry Point
//!
//! Questo è il punto di ingresso principale dell'applicazione.
//!
//! ## Responsabilità:
//! - Parsing degli argomenti della command line con `clap`
//! - Inizializzazione del sistema di logging con `tracing`
//! - Caricamento della configurazione da file e override da CLI
//! - Dispatch dei sottocomandi verso la pipeline
//!
//! ## Sottocomandi:
//! - `enhance`: upscaling via backend, con compressione opzionale a dimensione target
//! - `compress`: solo compressione locale a dimensione target
//! - `health`: stato del backend
//!
//! ## Esempio di utilizzo:
//! ```bash
//! image-upscaler enhance photo.jpg --backend-url http://localhost:5000 --target-size 5 --grading cinematic
//! image-upscaler compress big.png --target-size 2 --format jpeg
//! BACKEND_BASE_URL=https://abc.ngrok.app image-upscaler health
//! ```

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use image_upscaler::json_output::JsonMessage;
use image_upscaler::{Config, EnhancementClient, Grading, OutputFormat, UpscalePipeline};

#[derive(Parser)]
#[command(name = "image-upscaler")]
#[command(about = "Upscale images through an enhancement backend and compress them to a target size")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Configuration file (default: ~/.image-upscaler/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output progress and status as JSON for programmatic use
    #[arg(long, global = true)]
    json: bool,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Send an image (or every image in a directory) to the enhancement backend
    Enhance {
        /// Image file or directory of images
        input: PathBuf,

        /// Output file or directory (default: next to the input)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Backend base URL (falls back to BACKEND_BASE_URL)
        #[arg(long)]
        backend_url: Option<String>,

        /// Compress the result to this size in MB
        #[arg(short, long)]
        target_size: Option<f64>,

        /// Number of parallel jobs for directories
        #[arg(short, long)]
        workers: Option<usize>,

        /// Color grading preset applied by the backend
        #[arg(short, long, value_enum)]
        grading: Option<Grading>,

        /// Return the original image on non-2xx backend responses too
        #[arg(long)]
        fallback_on_error: bool,

        #[command(flatten)]
        compression: CompressionArgs,
    },

    /// Compress a local image to a target size without the backend
    Compress {
        /// Image file
        input: PathBuf,

        /// Target size in MB
        #[arg(short, long)]
        target_size: f64,

        /// Output file or directory (default: next to the input)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        compression: CompressionArgs,
    },

    /// Check backend health
    Health {
        /// Backend base URL (falls back to BACKEND_BASE_URL)
        #[arg(long)]
        backend_url: Option<String>,
    },
}

#[derive(Args)]
struct CompressionArgs {
    /// Output format for compressed images (jpeg or png)
    #[arg(short, long)]
    format: Option<OutputFormat>,

    /// Maximum re-encodes during the quality search
    #[arg(long)]
    max_iterations: Option<u32>,

    /// Accepted distance from the target in MB
    #[arg(long)]
    tolerance: Option<f64>,
}

impl CompressionArgs {
    fn apply(self, config: &mut Config) {
        if let Some(format) = self.format {
            config.output_format = format;
        }
        if let Some(max_iterations) = self.max_iterations {
            config.compression.max_iterations = max_iterations;
        }
        if let Some(tolerance) = self.tolerance {
            config.compression.tolerance_mb = tolerance;
        }
    }
}

async fn load_config(cli: &Cli) -> Result<Config> {
    let path = cli.config.clone().or_else(Config::default_path);
    let mut config = match path {
        Some(path) => Config::from_file(&path)
            .await
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::default(),
    };
    config.json_output = config.json_output || cli.json;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut config = load_config(&cli).await?;
    let json_output = config.json_output;

    let result = run(cli.command, &mut config).await;
    if let Err(ref e) = result {
        if json_output {
            JsonMessage::error(e.to_string(), Some(format!("{:#}", e))).emit();
        }
    }
    result
}

async fn run(command: Command, config: &mut Config) -> Result<()> {
    match command {
        Command::Enhance {
            input,
            output,
            backend_url,
            target_size,
            workers,
            grading,
            fallback_on_error,
            compression,
        } => {
            if backend_url.is_some() {
                config.backend_url = backend_url;
            }
            if target_size.is_some() {
                config.target_size_mb = target_size;
            }
            if let Some(workers) = workers {
                config.workers = workers;
            }
            if output.is_some() {
                config.output_path = output;
            }
            if let Some(grading) = grading {
                config.grading = grading;
            }
            config.fallback_on_backend_error |= fallback_on_error;
            compression.apply(config);
            config.resolve_backend_url();

            let pipeline = UpscalePipeline::new(config.clone())?;
            pipeline.run(&input).await?;
        }

        Command::Compress {
            input,
            target_size,
            output,
            compression,
        } => {
            if output.is_some() {
                config.output_path = output;
            }
            compression.apply(config);

            let pipeline = UpscalePipeline::new(config.clone())?;
            let report = pipeline.compress_file(&input, target_size).await?;
            if !config.json_output {
                info!("✅ Written {}", report.output.display());
            }
        }

        Command::Health { backend_url } => {
            if backend_url.is_some() {
                config.backend_url = backend_url;
            }
            config.resolve_backend_url();
            config.validate()?;

            let client = EnhancementClient::new(config)?;
            let base_url = client.base_url().unwrap_or_default().to_string();
            let status = client
                .health()
                .await
                .with_context(|| format!("Health check failed for {}", base_url))?;

            if config.json_output {
                JsonMessage::Health {
                    backend_url: base_url,
                    status,
                }
                .emit();
            } else {
                info!("🩺 Backend {}: {}", base_url, status.status);
                if let Some(model) = status.model {
                    info!("  • Model: {}", model);
                }
                if let Some(gpu) = status.gpu_available {
                    info!("  • GPU available: {}", gpu);
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grading_flag_accepts_presets_only() {
        let cli = Cli::try_parse_from(["image-upscaler", "enhance", "in.png", "--grading", "sepia"]).unwrap();
        match cli.command {
            Command::Enhance { grading, .. } => assert_eq!(grading, Some(Grading::Sepia)),
            _ => panic!("expected enhance"),
        }

        assert!(Cli::try_parse_from(["image-upscaler", "enhance", "in.png", "--grading", "neon"]).is_err());
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
