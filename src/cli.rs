use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "vidconvert")]
#[command(author, version, about = "Video conversion service with live progress")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, env = "VIDCONVERT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP conversion service
    Serve {
        /// Host to bind to (overrides config)
        #[arg(long, env = "VIDCONVERT_HOST")]
        host: Option<String>,

        /// Port to listen on (overrides config)
        #[arg(short, long, env = "VIDCONVERT_PORT")]
        port: Option<u16>,
    },

    /// Check that the encoder and probe tools are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses --config if not specified)
        config: Option<PathBuf>,
    },

    /// Resolve a settings object and show the encoder invocations it produces
    Plan {
        /// Settings JSON, e.g. '{"preset":"high-quality"}'
        #[arg(default_value = "{}")]
        settings: String,
    },

    /// Display version information
    Version,
}
