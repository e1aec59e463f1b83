use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use std::path::PathBuf;

use afs_storage::{
    s3_store, Downloader, Manifest, ManifestEntry, PathFilter, DATA_DICTIONARY_PREFIX,
    DEFAULT_BUCKET, DEFAULT_MANIFEST,
};

/// Number of manifest paths listed before the confirmation prompt
const PREVIEW_LIMIT: usize = 10;

/// Download data dictionary files listed in the bucket manifest
#[derive(Parser)]
#[command(name = "download-data-dictionaries")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Manifest CSV listing the bucket contents
    #[arg(short, long, default_value = DEFAULT_MANIFEST)]
    manifest: PathBuf,

    /// Local directory mirroring the bucket layout
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,

    /// Source bucket
    #[arg(long, default_value = DEFAULT_BUCKET)]
    bucket: String,

    /// Key prefix to download
    #[arg(long, default_value = DATA_DICTIONARY_PREFIX)]
    prefix: String,

    /// Download without asking for confirmation
    #[arg(short, long)]
    yes: bool,

    /// Check each file against the manifest md5
    #[arg(long)]
    verify: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn preview(entries: &[ManifestEntry]) -> Vec<String> {
    let mut lines: Vec<String> = entries
        .iter()
        .take(PREVIEW_LIMIT)
        .map(|entry| format!("  - {}", entry.path))
        .collect();

    if entries.len() > PREVIEW_LIMIT {
        lines.push(format!("  ... and {} more files", entries.len() - PREVIEW_LIMIT));
    }

    lines
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("{} {}", "Ignoring unreadable .env:".yellow(), e);
        }
    }

    afs_cli::init_tracing(cli.verbose);

    if !cli.manifest.exists() {
        eprintln!("{} {} not found!", "Error:".red().bold(), cli.manifest.display());
        std::process::exit(1);
    }

    println!("Reading {}...", cli.manifest.display());
    let filter = PathFilter::new(&cli.bucket, &cli.prefix);
    let entries = Manifest::from_file(&cli.manifest)?.select(&filter);

    if entries.is_empty() {
        println!("No files to download.");
        return Ok(());
    }

    let total_size: u64 = entries.iter().map(|entry| entry.size).sum();
    println!(
        "\nFound {} files to download from {} ({})",
        entries.len().to_string().cyan(),
        cli.prefix,
        afs_cli::format_size(total_size)
    );
    println!("\nFiles to download:");
    for line in preview(&entries) {
        println!("{}", line);
    }

    if !cli.yes {
        let prompt = format!("\nDownload {} files? (y/n): ", entries.len());
        let stdin = std::io::stdin();
        let confirmed = afs_cli::confirm(&prompt, &mut stdin.lock(), &mut std::io::stdout())
            .context("Failed to read confirmation")?;
        if !confirmed {
            println!("Download cancelled.");
            return Ok(());
        }
    }

    let store = s3_store(&cli.bucket).context("Failed to configure S3 client")?;
    let downloader = Downloader::new(store, filter, &cli.output_dir).with_verify(cli.verify);

    println!("\nDownloading files...");
    let summary = downloader.download_all(&entries).await;

    println!("\n{}", "Download complete!".green().bold());
    println!("  Successfully downloaded: {} files", summary.downloaded);

    if summary.failed() > 0 {
        eprintln!("  {} {} files", "Failed:".red(), summary.failed());
        std::process::exit(1);
    }

    Ok(())
}
