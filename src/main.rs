use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::Parser;
use fuelsync::{
    fetch::{Announcer, HttpFetcher},
    Always, Config, DayOfMonth, Family, Synchronizer, Trigger,
};
use std::{env, io, path::PathBuf, process::ExitCode};
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(
    name = "fuelsync",
    version,
    about = "Append new ANP fuel-price snapshots to local Parquet archives"
)]
struct Cli {
    /// YAML config file. Defaults to ./fuelsync.yaml when present.
    #[arg(long, short, env = "FUELSYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Run as if today were this date (YYYY-MM-DD).
    #[arg(long)]
    date: Option<NaiveDate>,

    /// Ignore the day-of-month gate.
    #[arg(long, default_value_t = false)]
    force: bool,

    /// Only sync these families (repeatable).
    #[arg(long = "family", value_enum)]
    families: Vec<Family>,
}

fn main() -> Result<ExitCode> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::default().add_directive(log_level.parse().unwrap_or(Level::INFO.into()))
    });
    fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    // ─── 2) config ───────────────────────────────────────────────────
    let config = Config::load(cli.config.as_deref()).context("loading configuration")?;
    let today = cli.date.unwrap_or_else(|| Local::now().date_naive());
    let trigger: Box<dyn Trigger> = if cli.force {
        Box::new(Always)
    } else {
        Box::new(DayOfMonth(config.trigger_day))
    };

    // ─── 3) wire the pipeline ────────────────────────────────────────
    let client = config
        .http_settings()
        .build_client()
        .context("building HTTP client")?;
    let mut fetcher = HttpFetcher::new(client);
    if config.announce.enabled {
        fetcher = fetcher.with_announcer(Announcer::new(config.announce.url.clone()));
    }

    let mut sync = Synchronizer::from_config(fetcher, &config);
    if !cli.families.is_empty() {
        sync.retain_families(&cli.families);
    }

    // ─── 4) run ──────────────────────────────────────────────────────
    let stdout = io::stdout();
    let summary = sync.run(trigger.as_ref(), today, &mut stdout.lock())?;
    if !summary.ran {
        return Ok(ExitCode::SUCCESS);
    }

    if summary.is_success() {
        info!("all done");
        Ok(ExitCode::SUCCESS)
    } else {
        error!(
            failures = summary.failures(),
            "some families did not sync"
        );
        Ok(ExitCode::FAILURE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_flags_and_env_config() {
        let cli = Cli::try_parse_from([
            "fuelsync",
            "--config",
            "/etc/fuelsync.yaml",
            "--date",
            "2024-07-10",
            "--force",
            "--family",
            "lpg",
            "--family",
            "diesel-cng",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/etc/fuelsync.yaml")));
        assert_eq!(cli.date, NaiveDate::from_ymd_opt(2024, 7, 10));
        assert!(cli.force);
        assert_eq!(cli.families, vec![Family::Lpg, Family::DieselCng]);

        env::set_var("FUELSYNC_CONFIG", "/srv/from-env.yaml");
        let cli = Cli::try_parse_from(["fuelsync"]).unwrap();
        env::remove_var("FUELSYNC_CONFIG");
        assert_eq!(cli.config, Some(PathBuf::from("/srv/from-env.yaml")));
        assert!(!cli.force);
        assert!(cli.families.is_empty());

        assert!(Cli::try_parse_from(["fuelsync", "--family", "kerosene"]).is_err());
    }
}
