use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Emit line-delimited JSON progress events on stdout
    #[arg(long, global = true)]
    pub json_progress: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Pair and mux every live photo in a directory
    Dir {
        /// Directory containing photos and videos
        dir: PathBuf,

        /// Descend into subdirectories
        #[arg(short, long)]
        recurse: bool,

        /// Output directory for Motion Photos and unmatched files
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Convert HEIC photos to JPEG before pairing
        #[arg(long)]
        heic: bool,

        /// Write a JSON report of the batch to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Mux a single photo and video
    Pair {
        /// Photo file (JPEG, PNG or HEIC)
        #[arg(long)]
        photo: PathBuf,

        /// Video file (MOV or MP4)
        #[arg(long)]
        video: PathBuf,

        /// Output directory, defaults to the photo's directory
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Convert a HEIC photo to JPEG before muxing
        #[arg(long)]
        heic: bool,

        /// Mux even if the pair's metadata does not match
        #[arg(long)]
        force: bool,
    },

    /// Write a default configuration file
    InitConfig {
        /// Where to write the configuration
        #[arg(long, default_value = "photomux.toml")]
        path: PathBuf,
    },
}
