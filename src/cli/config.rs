//! Configuration conversion utilities for CLI arguments

use crate::cli::main_impl::Cli;
use crate::config::{AcceleratorPreference, SegmentationConfig};
use anyhow::{Context, Result};

/// Convert CLI arguments to a `SegmentationConfig`
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Build the configuration, starting from `--config` when given
    ///
    /// Explicit flags override values from the file.
    pub(crate) fn from_cli(cli: &Cli) -> Result<SegmentationConfig> {
        let mut config = match &cli.config {
            Some(path) => SegmentationConfig::from_json_file(path)
                .with_context(|| format!("Failed to load config file {}", path.display()))?,
            None => SegmentationConfig::default(),
        };

        if let Some(dir) = &cli.model_dir {
            config.model_dir.clone_from(dir);
        }
        if let Some(file) = &cli.quantized_model {
            config.quantized_model_file.clone_from(file);
        }
        if let Some(file) = &cli.float_model {
            config.float_model_file.clone_from(file);
        }
        if cli.cpu_only {
            config.accelerator = AcceleratorPreference::CpuOnly;
        }
        if cli.threads > 0 {
            config.intra_threads = cli.threads;
        }
        if cli.sequential {
            config.parallel_reconstruction = false;
        }

        config.validate().context("Invalid segmentation configuration")?;
        Ok(config)
    }

    /// Validate argument combinations clap cannot express
    pub(crate) fn validate_cli(cli: &Cli) -> Result<()> {
        if let Some(config) = &cli.config {
            if !config.is_file() {
                anyhow::bail!("Config file not found: {}", config.display());
            }
        }
        if let Some(output) = &cli.output {
            if output.is_file() {
                anyhow::bail!(
                    "Output path exists and is a file, not a directory: {}",
                    output.display()
                );
            }
        }
        Ok(())
    }
}
