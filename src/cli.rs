//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use mediarelay_core::parse_size_text;
use mediarelay_core::transfer::{DestinationHint, TransferMode};

/// Relay a remote file to a destination, or hand back its link.
///
/// The file is downloaded in chunks to a temporary file, then uploaded in
/// chunks to a directory or an HTTP endpoint. Files over the upload limit,
/// and transfers that cannot complete, are answered with the source link.
#[derive(Parser, Debug)]
#[command(name = "mediarelay")]
#[command(author, version, about)]
pub struct Args {
    /// Source URL (or a page link when --metadata-endpoint is set)
    pub url: String,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output and the progress bar
    #[arg(short, long)]
    pub quiet: bool,

    /// Config file (default: $XDG_CONFIG_HOME/mediarelay/config.toml)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Transfer mode: `upload` (if under the limit) or `link`
    #[arg(short = 'm', long)]
    pub mode: Option<TransferMode>,

    /// Announced size of the source, e.g. `12.5MB` or `1048576`
    #[arg(short = 's', long, value_parser = parse_size_arg)]
    pub size_hint: Option<u64>,

    /// Treat the file as a video or a document instead of guessing
    #[arg(short = 'k', long, value_enum)]
    pub kind: Option<KindArg>,

    /// Caption sent along with the upload
    #[arg(long)]
    pub caption: Option<String>,

    /// File name presented at the destination
    #[arg(long)]
    pub file_name: Option<String>,

    /// Write the file into this directory
    #[arg(short = 'o', long, conflicts_with = "upload_url")]
    pub output_dir: Option<PathBuf>,

    /// POST the file to this HTTP endpoint instead of writing it locally
    #[arg(short = 'u', long)]
    pub upload_url: Option<String>,

    /// Largest file that is uploaded rather than linked, e.g. `50MB`
    #[arg(long, value_parser = parse_size_arg, conflicts_with = "large")]
    pub ceiling: Option<u64>,

    /// Use the large-file upload limit (2 GB)
    #[arg(long)]
    pub large: bool,

    /// Attempts per phase before giving up (1-10)
    #[arg(short = 'r', long, value_parser = clap::value_parser!(u32).range(1..=10))]
    pub max_attempts: Option<u32>,

    /// Seconds to wait between attempts (0-600)
    #[arg(long, value_parser = clap::value_parser!(u64).range(0..=600))]
    pub retry_delay: Option<u64>,

    /// Read and write size per chunk, e.g. `4MB`
    #[arg(long, value_parser = parse_size_arg)]
    pub chunk_size: Option<u64>,

    /// JSON endpoint resolving page links, with `{url}` as placeholder
    #[arg(long)]
    pub metadata_endpoint: Option<String>,

    /// Fail instead of answering with the link when the download fails
    #[arg(long)]
    pub no_link_fallback: bool,
}

/// Classification override accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KindArg {
    Video,
    Document,
}

impl From<KindArg> for DestinationHint {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Video => Self::Video,
            KindArg::Document => Self::Document,
        }
    }
}

fn parse_size_arg(value: &str) -> Result<u64, String> {
    parse_size_text(value)
        .ok_or_else(|| format!("invalid size '{value}' (examples: 4MB, 1.5 GiB, 1048576)"))
}
