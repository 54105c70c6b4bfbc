use affordance_data::{ChannelStats, PipelineConfig};
use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Compute per-channel mean and standard deviation over the cropped images
/// of a manifest, for use as normalization constants.
#[derive(Parser, Debug)]
#[command(name = "channel-stats", version, long_about = None)]
struct Args {
    /// Manifest CSV (image path, mask path). Overrides the config file.
    manifest: Option<PathBuf>,

    /// Pipeline configuration JSON to start from
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Crop height in pixels
    #[arg(long)]
    crop_height: Option<u32>,

    /// Crop width in pixels
    #[arg(long)]
    crop_width: Option<u32>,

    /// Decoding threads (0 = decode on the calling thread)
    #[arg(short, long, default_value_t = 4)]
    workers: usize,

    /// The manifest has no header row
    #[arg(long, default_value_t = false)]
    no_headers: bool,

    /// Directory relative manifest paths are resolved against
    #[arg(long)]
    base_dir: Option<PathBuf>,

    /// Key of the label array inside each mask file
    #[arg(long)]
    mask_key: Option<String>,

    /// Write the statistics here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

impl Args {
    fn pipeline_config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_json_file(path)?,
            None => PipelineConfig::default(),
        };
        if let Some(path) = &self.manifest {
            config.manifest.path = path.clone();
        }
        if let Some(height) = self.crop_height {
            config.crop.height = height;
        }
        if let Some(width) = self.crop_width {
            config.crop.width = width;
        }
        if self.no_headers {
            config.manifest.options.has_headers = false;
        }
        if let Some(dir) = &self.base_dir {
            config.manifest.options.base_dir = Some(dir.clone());
        }
        if let Some(key) = &self.mask_key {
            config.mask_key = key.clone();
        }
        Ok(config)
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = args.pipeline_config()?;
    info!(
        manifest = %config.manifest.path.display(),
        crop_height = config.crop.height,
        crop_width = config.crop.width,
        workers = args.workers,
        "computing channel statistics"
    );

    let stats = ChannelStats::compute_from_config(&config, args.workers)?;
    let json = serde_json::to_string_pretty(&stats)?;

    match &args.output {
        Some(path) => {
            fs::write(path, json + "\n")
                .with_context(|| format!("Failed to write statistics: {}", path.display()))?;
            info!(output = %path.display(), "wrote channel statistics");
        }
        None => println!("{json}"),
    }
    Ok(())
}
