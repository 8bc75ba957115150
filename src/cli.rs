// Command-line flags

use std::path::PathBuf;

use clap::Parser;

/// Local download daemon for the quick-dl browser extension.
///
/// Probes links with yt-dlp, suggests a destination folder by keyword, and
/// downloads into the folder the extension picks.
#[derive(Parser, Debug)]
#[command(name = "quick-dl")]
#[command(author, version, about)]
pub struct Args {
    /// Config file (default: <config dir>/quick-dl/config.json)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Listen port, overriding the config file
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    /// Filter used when RUST_LOG is not set
    pub fn default_log_level(&self) -> &'static str {
        if self.quiet {
            "error"
        } else {
            match self.verbose {
                0 => "info",
                1 => "debug",
                _ => "trace",
            }
        }
    }
}
