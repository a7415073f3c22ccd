//! # Piecewise BitTorrent Client
//!
//! ## Usage
//!
//! ```bash
//! piecewise <torrent_file>
//! piecewise <torrent_file> <output_file>
//! ```
//!
//! Set `RUST_LOG=info` (or `debug`) to follow the download.

#[macro_use]
extern crate log;

use std::fs;
use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::Parser;

use piecewise::{Config, TorrentFile};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "A command-line BitTorrent client, written in Rust."
)]
struct Args {
    /// Path to the .torrent file
    torrent: PathBuf,

    /// Output filename (defaults to name from torrent)
    output: Option<PathBuf>,

    /// Port reported to trackers
    #[arg(short, long, default_value_t = piecewise::config::DEFAULT_PORT)]
    port: u16,

    /// Hide the progress bar
    #[arg(short, long)]
    quiet: bool,
}

/// Sanitize a filename to prevent path traversal.
fn sanitize_filename(filename: &str) -> String {
    let safe_name = filename.replace(['/', '\\'], "_");

    if safe_name.trim().is_empty() || safe_name == "." || safe_name == ".." {
        "download".to_string()
    } else {
        safe_name
    }
}

fn run(args: Args) -> Result<()> {
    if !args.torrent.exists() {
        return Err(anyhow!(
            "could not find torrent file: {}",
            args.torrent.display()
        ));
    }

    let torrent = TorrentFile::open(&args.torrent)?;

    let output = args
        .output
        .unwrap_or_else(|| PathBuf::from(sanitize_filename(&torrent.name)));

    let config = Config {
        listen_port: args.port,
        show_progress: !args.quiet,
        ..Config::default()
    };

    let data = torrent.download(config)?;

    fs::write(&output, &data)
        .map_err(|e| anyhow!("could not write data to file '{}': {}", output.display(), e))?;

    info!("Saved in \"{}\"", output.display());
    println!("Saved in \"{}\".", output.display());

    Ok(())
}

fn main() {
    pretty_env_logger::init_timed();

    let args = Args::parse();

    if let Err(error) = run(args) {
        error!("{:#}", error);
        eprintln!("Error: {:#}", error);
        std::process::exit(1);
    }
}
