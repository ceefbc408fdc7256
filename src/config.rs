use std::path::PathBuf;

use clap::Parser;

/// Configuration parsed from command-line arguments.
#[derive(Debug, Parser, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Device name registered with the playback backend
    #[arg(long = "device-name", default_value = "playsync")]
    pub device_name: String,
    /// Access token forwarded to the backend during registration
    #[arg(long = "access-token")]
    pub access_token: Option<String>,
    /// Block certain players (comma-separated list)
    #[arg(
        short = 'b',
        long = "blocked",
        value_delimiter = ',',
        default_value = ""
    )]
    pub blocked: Vec<String>,
    /// Metadata format string
    #[arg(long = "format", default_value = "{title} - {artist}")]
    pub format: String,
    /// JSON file with scene entries: [{"id": ..., "name": ...}]
    #[arg(long = "scenes")]
    pub scenes: Option<PathBuf>,
    /// Hide the ticking track position in the status line
    #[arg(long = "no-position", default_value_t = false, action = clap::ArgAction::SetTrue)]
    pub no_position: bool,
}

impl Config {
    /// Parse arguments and normalize derived fields.
    pub fn parse() -> Self {
        let mut config = <Self as Parser>::parse();
        config.blocked = config
            .blocked
            .iter()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        config
    }
}
