//! Foreground segmentation CLI tool
//!
//! Command-line interface that writes a binary mask (and optionally an
//! overlay or a cut-out) for every input image.

use super::config::CliConfigBuilder;
use crate::{
    backends::{OnnxBackend, OnnxBackendFactory, OrtBackendCatalog},
    processor::SegmentationProcessor,
    types::{SegmentationResult, DEFAULT_OVERLAY_TINT},
};
use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Foreground/background segmentation CLI tool
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "fgmask")]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Input image files or directories
    #[arg(value_name = "INPUT", required_unless_present = "show_backends")]
    pub input: Vec<PathBuf>,

    /// Output directory [default: next to each input]
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Directory holding the quantized and float model artifacts [default: models]
    #[arg(short, long, value_name = "DIR")]
    pub model_dir: Option<PathBuf>,

    /// File name of the quantized artifact inside the model directory
    #[arg(long, value_name = "FILE")]
    pub quantized_model: Option<String>,

    /// File name of the float artifact inside the model directory
    #[arg(long, value_name = "FILE")]
    pub float_model: Option<String>,

    /// JSON configuration file; explicit flags take precedence
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Never try an accelerator, always run the float model on CPU
    #[arg(long)]
    pub cpu_only: bool,

    /// Number of inference threads (0 = auto-detect)
    #[arg(short, long, default_value_t = 0)]
    pub threads: usize,

    /// Reconstruct masks on a single thread
    #[arg(long)]
    pub sequential: bool,

    /// Also write the input with the background tinted red
    #[arg(long)]
    pub overlay: bool,

    /// Also write the foreground cut-out on a transparent background
    #[arg(long)]
    pub extract: bool,

    /// Process directories recursively
    #[arg(short, long)]
    pub recursive: bool,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Show compute backend diagnostics and exit
    #[arg(long)]
    pub show_backends: bool,
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    crate::tracing_config::init_cli_tracing(cli.verbose)
        .context("Failed to initialize tracing")?;

    if cli.show_backends {
        show_backend_diagnostics();
        return Ok(());
    }

    if cli.input.is_empty() {
        anyhow::bail!("At least one input is required");
    }

    CliConfigBuilder::validate_cli(&cli).context("Invalid CLI arguments")?;
    let config = CliConfigBuilder::from_cli(&cli).context("Failed to build configuration")?;

    info!("Starting segmentation CLI");
    info!("Model directory: {}", config.model_dir.display());
    info!("Accelerator preference: {:?}", config.accelerator);

    let mut processor = SegmentationProcessor::new(
        config,
        Arc::new(OrtBackendCatalog::new()),
        Box::new(OnnxBackendFactory::new()),
    )
    .await
    .context("Failed to create segmentation processor")?;

    info!(
        "Session ready: {} model on {}",
        processor.precision(),
        processor.backend_name()
    );

    let start_time = Instant::now();
    let outcome = process_inputs(&cli, &mut processor);
    processor.close();
    let processed_count = outcome?;

    info!(
        "Processed {} image(s) in {:.2}s",
        processed_count,
        start_time.elapsed().as_secs_f64()
    );

    Ok(())
}

/// Print the compute backends ONNX Runtime can use on this machine
fn show_backend_diagnostics() {
    println!("🔍 Compute Backend Diagnostics");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let cpu_count = std::thread::available_parallelism()
        .map(std::num::NonZero::get)
        .unwrap_or(1);
    println!("💻 System: {cpu_count} CPU cores detected");

    println!("\n🚀 Backends:");
    for (name, available, description) in OnnxBackend::list_providers() {
        let status = if available {
            "✅ Available"
        } else {
            "❌ Not Available"
        };
        println!("  • {name}: {status} - {description}");
    }

    println!("\n📋 Notes:");
    println!("  • An available accelerator runs the quantized model");
    println!("  • CPU is always available and runs the float model");
    println!("  • Use --cpu-only to skip accelerator detection");
}

/// Segment every input, returning the number of images processed
fn process_inputs(cli: &Cli, processor: &mut SegmentationProcessor) -> Result<usize> {
    let mut files = Vec::new();
    for input in &cli.input {
        if input.is_dir() {
            files.extend(find_image_files(input, cli.recursive)?);
        } else if input.is_file() {
            files.push(input.clone());
        } else {
            warn!("Skipping missing input: {}", input.display());
        }
    }

    if files.is_empty() {
        anyhow::bail!("No image files found in the given inputs");
    }

    if let Some(dir) = &cli.output {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
    }

    let progress = (files.len() > 1).then(|| {
        let bar = ProgressBar::new(files.len() as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        bar
    });

    let mut processed = 0;
    let mut failed = 0;
    for file in &files {
        if let Some(bar) = &progress {
            bar.set_message(display_name(file));
        }

        match process_file(cli, processor, file) {
            Ok(result) => {
                processed += 1;
                let line = format!(
                    "{}: {:.1}% foreground ({} on {}, {} ms)",
                    file.display(),
                    result.mask().foreground_percentage() * 100.0,
                    result.precision(),
                    result.backend_name(),
                    result.timings().total_ms
                );
                match &progress {
                    Some(bar) => bar.println(line),
                    None => println!("{line}"),
                }
                debug!(timings = %result.timings().timing_summary(), "Image segmented");
            },
            Err(e) => {
                failed += 1;
                error!("Failed to process {}: {:#}", file.display(), e);
            },
        }

        if let Some(bar) = &progress {
            bar.inc(1);
        }
    }

    if let Some(bar) = progress {
        bar.finish_with_message("done");
    }

    if processed == 0 {
        anyhow::bail!("All {failed} input(s) failed");
    }
    if failed > 0 {
        warn!("{failed} of {} input(s) failed", files.len());
    }

    Ok(processed)
}

/// Segment one file and write the requested outputs
fn process_file(
    cli: &Cli,
    processor: &mut SegmentationProcessor,
    input: &Path,
) -> Result<SegmentationResult> {
    let image = image::open(input)
        .with_context(|| format!("Failed to read image {}", input.display()))?;
    let result = processor
        .segment(&image)
        .with_context(|| format!("Segmentation failed for {}", input.display()))?;

    let mask_path = output_path(input, cli.output.as_deref(), "mask");
    result
        .mask()
        .save_png(&mask_path)
        .with_context(|| format!("Failed to write {}", mask_path.display()))?;
    debug!(path = %mask_path.display(), "Wrote mask");

    if cli.overlay || cli.extract {
        let rgba = image.to_rgba8();
        if cli.overlay {
            let path = output_path(input, cli.output.as_deref(), "overlay");
            result
                .mask()
                .create_mask_overlay(&rgba, DEFAULT_OVERLAY_TINT)?
                .save(&path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }
        if cli.extract {
            let path = output_path(input, cli.output.as_deref(), "foreground");
            result
                .mask()
                .extract_foreground(&rgba)?
                .save(&path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }
    }

    Ok(result)
}

/// `<stem>_<suffix>.png`, inside `output_dir` or next to the input
fn output_path(input: &Path, output_dir: Option<&Path>, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map_or_else(|| "image".to_string(), |s| s.to_string_lossy().into_owned());
    let file_name = format!("{stem}_{suffix}.png");

    match output_dir {
        Some(dir) => dir.join(file_name),
        None => input.with_file_name(file_name),
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned())
}

/// Collect image files in `dir`, sorted by path
fn find_image_files(dir: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut files = Vec::new();

    for entry in walkdir::WalkDir::new(dir).max_depth(max_depth) {
        let entry = entry.with_context(|| format!("Failed to read directory {}", dir.display()))?;
        let path = entry.path();
        if path.is_file() && is_image_file(path) && !is_generated_output(path) {
            files.push(path.to_path_buf());
        }
    }

    files.sort();
    Ok(files)
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            matches!(
                ext.to_ascii_lowercase().as_str(),
                "jpg" | "jpeg" | "png" | "webp" | "tiff" | "tif" | "bmp"
            )
        })
}

/// Skip files this tool wrote on an earlier run
fn is_generated_output(path: &Path) -> bool {
    path.file_stem()
        .and_then(|s| s.to_str())
        .is_some_and(|stem| {
            ["_mask", "_overlay", "_foreground"]
                .iter()
                .any(|suffix| stem.ends_with(suffix))
        })
}
