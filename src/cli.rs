//! Command-line arguments for the `mdrecipe` binary.
use clap::Parser;
use std::path::PathBuf;

use mdrecipe::config::{DEFAULT_LINK_RETRIES, DEFAULT_SHELL};

#[derive(Parser, Debug)]
#[command(
    name = "mdrecipe",
    version,
    about = "Run the shell steps annotated in a markdown file and verify their output"
)]
pub struct Args {
    /// Markdown file to execute
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Print what would run without running anything
    #[arg(short, long)]
    pub dry_run: bool,

    /// Honor manual_pause_message and wait for confirmation
    #[arg(short, long)]
    pub manual: bool,

    /// Shell command prefix used to run each code block
    #[arg(short, long, value_name = "CMD", default_value = DEFAULT_SHELL)]
    pub shell: String,

    /// Check external links found in the document
    #[arg(short = 'l', long)]
    pub validate_links: bool,

    /// Attempts per link before it is reported as failed
    #[arg(short = 'r', long, value_name = "N", default_value_t = DEFAULT_LINK_RETRIES)]
    pub link_retries: u32,

    /// Only run steps carrying one of these tags (untagged steps always run)
    #[arg(short, long = "tags", value_name = "TAG")]
    pub tags: Vec<String>,
}
