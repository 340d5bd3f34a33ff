use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser, Clone)]
#[command(name = "needle")]
#[command(about = "Terminal client for the Needle interactive storyteller")]
pub struct Cli {
    /// Base URL of the narration service; overrides the config file and NEEDLE_API_URL.
    #[arg(long)]
    pub api_url: Option<String>,

    /// TOML client configuration file.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Default log filter when RUST_LOG is unset.
    #[arg(long, default_value = "info")]
    pub log_level: String,
}
