use super::app_config::LogLevel;
use crate::domain::entities::{DecodingPolicy, ImageSize};
use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "pixload",
    version,
    about = "Load images through a two-tier cache and write them as PNG",
    long_about = None
)]
pub struct CliArgs {
    /// Image ids to load (URLs or file paths).
    #[arg(required = true, value_name = "ID")]
    pub ids: Vec<String>,

    /// Directory the loaded images are written to.
    #[arg(short, long, value_name = "DIR", default_value = ".")]
    pub out: PathBuf,

    /// Decode size as WIDTHxHEIGHT.
    #[arg(long, value_name = "WxH")]
    pub size: Option<ImageSize>,

    /// Downscale strategy.
    #[arg(long, value_enum)]
    pub policy: Option<DecodingPolicy>,

    /// Do not store downloaded bytes in the disc cache.
    #[arg(long)]
    pub no_disc_cache: bool,

    /// Clear the disc cache before loading.
    #[arg(long)]
    pub clear_cache: bool,

    /// Configuration file path.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log file path.
    #[arg(long, value_name = "PATH")]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Concurrent downloads in the general pool.
    #[arg(long)]
    pub pool_size: Option<usize>,
}
