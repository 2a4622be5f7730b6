use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "prompt-warden",
    version,
    about = "Prompt-injection detection for LLM applications"
)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "warden.yaml")]
    pub config: PathBuf,

    /// Risk threshold (overrides config file setting)
    #[arg(short, long)]
    pub threshold: Option<f64>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Check a single input for prompt injection
    Check {
        /// The text to analyse
        input: String,

        /// Emit the raw result as JSON instead of the human-readable report
        #[arg(long)]
        json: bool,
    },

    /// Run detection over every line of a .txt or .csv file
    Batch {
        /// Input file (one prompt per line, or first CSV column)
        file: PathBuf,

        /// Write per-row results to this file (.json or .csv)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Start the HTTP detection API
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value_t = 8080)]
        port: u16,
    },
}
