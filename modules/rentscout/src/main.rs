use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use rentscout::catalog::{AreaCatalog, Strategy};
use rentscout::fetchers::SourceProvider;
use rentscout::orchestrator::ExtractionOptions;
use rentscout::pipeline::Pipeline;
use rentscout::storage::{S3ObjectStore, VersionedUploader};
use rentscout_common::{Config, ScoutSettings, Zone};

#[derive(Parser)]
#[command(
    name = "rentscout",
    about = "Extract, analyze and export Mumbai rental listings"
)]
struct Cli {
    /// Every area in the catalog
    #[arg(long, group = "selection")]
    all: bool,
    /// South Mumbai areas
    #[arg(long, group = "selection")]
    south: bool,
    /// Western suburbs
    #[arg(long, group = "selection")]
    west: bool,
    /// Eastern suburbs
    #[arg(long, group = "selection")]
    east: bool,
    /// Central Mumbai
    #[arg(long, group = "selection")]
    central: bool,
    /// Navi Mumbai
    #[arg(long, group = "selection")]
    navi: bool,
    /// Named strategy: all, high-priority, medium-priority or a zone
    #[arg(long, group = "selection")]
    strategy: Option<String>,

    /// Areas per sequential batch
    #[arg(long)]
    batch_size: Option<usize>,
    /// Areas fetched concurrently within a batch
    #[arg(long)]
    concurrency: Option<usize>,
    /// Seconds to wait between batches
    #[arg(long)]
    delay: Option<u64>,
    /// Attempts per area, including the first
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Listing source: apify or places
    #[arg(long, default_value = "apify")]
    provider: String,
    /// Base output directory; a timestamped run directory is created inside
    #[arg(long)]
    output: Option<PathBuf>,
    /// Path to a settings TOML file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Archive the run directory to S3 after export
    #[arg(long)]
    upload: bool,
}

impl Cli {
    fn strategy(&self) -> Strategy {
        let zone_flags = [
            (self.south, Zone::South),
            (self.west, Zone::West),
            (self.east, Zone::East),
            (self.central, Zone::Central),
            (self.navi, Zone::Navi),
        ];
        if self.all {
            Strategy::All
        } else if let Some((_, zone)) = zone_flags.into_iter().find(|(set, _)| *set) {
            Strategy::Zone(zone)
        } else if let Some(name) = &self.strategy {
            Strategy::parse(name)
        } else {
            Strategy::HighPriority
        }
    }

    fn extraction_options(&self, settings: &ScoutSettings) -> ExtractionOptions {
        let mut options = ExtractionOptions::from(&settings.extraction);
        if let Some(n) = self.batch_size {
            options.batch_size = n.max(1);
        }
        if let Some(n) = self.concurrency {
            options.concurrency = n.max(1);
        }
        if let Some(secs) = self.delay {
            options.batch_delay = Duration::from_secs(secs);
        }
        if let Some(n) = self.max_attempts {
            options.max_attempts = n.max(1);
        }
        options
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("rentscout=info".parse()?))
        .init();

    let cli = Cli::parse();
    info!("RentScout starting...");

    let config = Config::from_env();
    config.log_redacted();

    let settings = match &cli.config {
        Some(path) => ScoutSettings::load(path)?,
        None => ScoutSettings::default(),
    };

    let provider = SourceProvider::parse(&cli.provider)
        .with_context(|| format!("Unknown provider '{}' (expected apify or places)", cli.provider))?;
    let (fetcher, parser) = provider.build(&config)?;
    let catalog = AreaCatalog::mumbai(provider);
    let strategy = cli.strategy();

    let base = cli
        .output
        .clone()
        .unwrap_or_else(|| config.data_dir.join(&settings.export.output_dir));
    let output_dir = base.join(chrono::Utc::now().format("%Y%m%d-%H%M%S").to_string());

    let uploader = if cli.upload {
        let bucket = config
            .s3_bucket
            .clone()
            .context("--upload requires RENTSCOUT_S3_BUCKET")?;
        let store = S3ObjectStore::from_env(bucket).await;
        Some(VersionedUploader::new(
            Arc::new(store),
            config.s3_prefix.clone(),
            settings.upload.clone(),
        ))
    } else {
        None
    };

    // Ctrl-C stops new attempts; areas already in flight settle and are reported.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, cancelling remaining areas");
                cancel.cancel();
            }
        });
    }

    let pipeline = Pipeline::builder()
        .catalog(catalog)
        .fetcher(fetcher)
        .parser(parser)
        .output_dir(output_dir)
        .options(cli.extraction_options(&settings))
        .cleaning(settings.cleaning.clone())
        .top_n(settings.export.top_n)
        .uploader(uploader)
        .cancel(cancel)
        .build();

    let summary = pipeline.run(strategy).await?;
    println!("{summary}");

    if !summary.success {
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zone_flag_selects_zone_strategy() {
        let cli = Cli::parse_from(["rentscout", "--west"]);
        assert_eq!(cli.strategy(), Strategy::Zone(Zone::West));
    }

    #[test]
    fn default_strategy_is_high_priority() {
        let cli = Cli::parse_from(["rentscout"]);
        assert_eq!(cli.strategy(), Strategy::HighPriority);
        let cli = Cli::parse_from(["rentscout", "--strategy", "bogus"]);
        assert_eq!(cli.strategy(), Strategy::HighPriority);
    }

    #[test]
    fn selection_flags_are_mutually_exclusive() {
        assert!(Cli::try_parse_from(["rentscout", "--all", "--south"]).is_err());
    }

    #[test]
    fn cli_overrides_settings() {
        let cli = Cli::parse_from([
            "rentscout",
            "--batch-size",
            "2",
            "--delay",
            "0",
            "--max-attempts",
            "4",
        ]);
        let options = cli.extraction_options(&ScoutSettings::default());
        assert_eq!(options.batch_size, 2);
        assert_eq!(options.concurrency, 3);
        assert_eq!(options.batch_delay, Duration::ZERO);
        assert_eq!(options.max_attempts, 4);
    }
}
