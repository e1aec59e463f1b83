use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use std::path::{Path, PathBuf};

use afs_warehouse::{ConnectionParams, SnowflakeClient};

/// Audience validation - compare audience brand behavior against the baseline population
#[derive(Parser)]
#[command(name = "audience-validation")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the audience config file
    #[arg(short, long, default_value = "audiences.yml")]
    config: PathBuf,

    /// Directory for audience_validation_results.csv (default: output/ next to the config)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Directory containing dbt profiles.yml
    #[arg(long)]
    profiles_dir: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn default_output_dir(config: &Path) -> PathBuf {
    config
        .parent()
        .unwrap_or_else(|| Path::new(""))
        .join("output")
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

    let output_dir = cli
        .output_dir
        .clone()
        .unwrap_or_else(|| default_output_dir(&cli.config));

    let outcome = afs_cli::run_validation(&cli.config, &output_dir, || {
        let (params, source) = ConnectionParams::resolve(cli.profiles_dir.as_deref())?;
        tracing::info!("Using Snowflake credentials from {}", source);
        Ok(SnowflakeClient::connect(&params)?)
    })
    .await?;

    println!(
        "{} {} succeeded, {} failed",
        "Validation complete:".bold(),
        outcome.succeeded.to_string().green(),
        if outcome.failed() > 0 {
            outcome.failed().to_string().red()
        } else {
            outcome.failed().to_string().normal()
        }
    );

    for failure in &outcome.failures {
        eprintln!("  {} {} [{}]: {}", "✗".red(), failure.name, failure.audience_id, failure.error);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn output_defaults_next_to_config() {
        assert_eq!(
            default_output_dir(Path::new("analyses/audience_validation/audiences.yml")),
            PathBuf::from("analyses/audience_validation/output")
        );
        assert_eq!(default_output_dir(Path::new("audiences.yml")), PathBuf::from("output"));
    }

    #[test]
    fn flags_parse() {
        let cli = Cli::parse_from([
            "audience-validation",
            "--config",
            "conf/aud.toml",
            "--profiles-dir",
            "/etc/dbt",
            "-v",
        ]);
        assert_eq!(cli.config, PathBuf::from("conf/aud.toml"));
        assert_eq!(cli.profiles_dir, Some(PathBuf::from("/etc/dbt")));
        assert_eq!(cli.output_dir, None);
        assert!(cli.verbose);
    }
}
