use super::app_config::LogLevel;
use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "imgcache",
    version,
    about = "Fetch images through a two-tier memory and disk cache",
    long_about = None
)]
pub struct CliArgs {
    /// Configuration file path.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log file path.
    #[arg(long, value_name = "PATH")]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Root directory for the persistent cache.
    #[arg(long, value_name = "PATH", env = "IMGCACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Keep images in memory only.
    #[arg(long)]
    pub memory_only: bool,

    /// Maximum concurrent fetches.
    #[arg(short = 'j', long)]
    pub max_concurrent: Option<usize>,

    /// Target width to decode for.
    #[arg(long, default_value_t = 1024)]
    pub width: u32,

    /// Target height to decode for.
    #[arg(long, default_value_t = 1024)]
    pub height: u32,

    /// Image URLs to fetch.
    #[arg(value_name = "URL")]
    pub urls: Vec<String>,
}
