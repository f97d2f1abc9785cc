//! CLI argument definitions using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// StatBridge - CSV ingestion and statistics engine bridge.
#[derive(Parser)]
#[command(name = "statbridge")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Detect the dialect of a CSV file and print its column catalog
    Inspect {
        /// Path to the CSV file
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Store a CSV file and record its detected dialect
    Upload {
        /// Path to the CSV file
        file: PathBuf,

        /// Dataset store directory
        #[arg(short, long, default_value = "uploads")]
        store: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the columns of a stored dataset
    Columns {
        /// Dataset identifier returned by upload
        id: String,

        /// Dataset store directory
        #[arg(short, long, default_value = "uploads")]
        store: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run the statistics engine on two columns of a stored dataset
    Analyze {
        /// Dataset identifier returned by upload
        id: String,

        /// First column (header or its ASCII safe name)
        x: String,

        /// Second column (header or its ASCII safe name)
        y: String,

        /// Dataset store directory
        #[arg(short, long, default_value = "uploads")]
        store: PathBuf,

        /// R script defining the analysis function (defaults to STATBRIDGE_SCRIPT)
        #[arg(long)]
        script: Option<PathBuf>,

        /// Rscript executable
        #[arg(long)]
        rscript: Option<String>,

        /// Per-call timeout in seconds
        #[arg(short, long)]
        timeout: Option<u64>,

        /// Directory the engine writes plots to
        #[arg(long)]
        plots_dir: Option<PathBuf>,

        /// Use the built-in mock engine instead of R
        #[arg(long)]
        mock: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Rewrite a CSV file as UTF-8 with a BOM and comma delimiters
    Transcode {
        /// Path to the CSV file
        file: PathBuf,

        /// Source encoding (detected if omitted)
        #[arg(short, long)]
        encoding: Option<String>,

        /// Source delimiter (detected if omitted)
        #[arg(short, long)]
        delimiter: Option<String>,

        /// Output path
        #[arg(short, long)]
        output: PathBuf,
    },
}
