use twmarket_datahub::config::{Config, RetryPolicy};
use twmarket_datahub::scrapers::base::Transport;
use twmarket_datahub::services::data_service::{DataService, RunSummary};
use twmarket_datahub::services::digest;

use anyhow::{bail, Context};
use chrono::NaiveDate;
use chrono_tz::Asia::Taipei;
use clap::{Arg, ArgMatches, Command};
use log::{error, info};
use std::time::Duration;

fn taipei_today() -> NaiveDate {
    chrono::Utc::now().with_timezone(&Taipei).date_naive()
}

fn parse_date(matches: &ArgMatches, name: &str) -> anyhow::Result<Option<NaiveDate>> {
    matches
        .value_of(name)
        .map(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| format!("invalid --{} {}", name, s)))
        .transpose()
}

fn parse_secs(matches: &ArgMatches, name: &str) -> anyhow::Result<Option<Duration>> {
    matches
        .value_of(name)
        .map(|s| {
            s.parse::<f64>()
                .ok()
                .filter(|v| v.is_finite() && *v >= 0.0)
                .map(Duration::from_secs_f64)
                .with_context(|| format!("invalid --{} {}", name, s))
        })
        .transpose()
}

/// 由命令行参数组装配置
fn build_config(matches: &ArgMatches) -> anyhow::Result<Config> {
    let mut retry = RetryPolicy::default();
    if let Some(retries) = matches.value_of("retries") {
        retry.max_retries = retries
            .parse()
            .with_context(|| format!("invalid --retries {}", retries))?;
    }
    if let Some(min) = parse_secs(matches, "min-delay")? {
        retry.min_delay = min;
    }
    if let Some(max) = parse_secs(matches, "max-delay")? {
        retry.max_delay = max;
    }

    let mut config = Config::new().with_retry(retry);
    if let Some(dir) = matches.value_of("data-dir") {
        config = config.with_data_dir(dir);
    }
    if let Some(timeout) = parse_secs(matches, "timeout")? {
        config = config.with_request_timeout(timeout);
    }

    config.validate()?;
    Ok(config)
}

fn finish(summary: RunSummary) -> anyhow::Result<()> {
    for (dataset, outcome) in &summary.outcomes {
        println!("{:<5} {}", dataset, outcome);
    }
    if summary.has_failures() {
        bail!("one or more datasets failed to update");
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let app = Command::new("TW Market DataHub")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Taiwan market daily statistics collector")
        .arg(
            Arg::new("data-dir")
                .long("data-dir")
                .value_name("DIR")
                .help("Directory holding the dataset CSV files")
                .takes_value(true)
                .global(true),
        )
        .arg(
            Arg::new("retries")
                .long("retries")
                .value_name("N")
                .help("Attempts per request")
                .takes_value(true)
                .global(true),
        )
        .arg(
            Arg::new("min-delay")
                .long("min-delay")
                .value_name("SECONDS")
                .help("Lower bound of the random delay between requests")
                .takes_value(true)
                .global(true),
        )
        .arg(
            Arg::new("max-delay")
                .long("max-delay")
                .value_name("SECONDS")
                .help("Upper bound of the random delay between requests")
                .takes_value(true)
                .global(true),
        )
        .arg(
            Arg::new("timeout")
                .long("timeout")
                .value_name("SECONDS")
                .help("Per-request timeout")
                .takes_value(true)
                .global(true),
        )
        .subcommand(
            Command::new("update")
                .about("Fetch today's data for every dataset and merge it")
                .arg(
                    Arg::new("date")
                        .short('d')
                        .long("date")
                        .value_name("DATE")
                        .help("Trading date to fetch (YYYY-MM-DD), defaults to today in Taipei")
                        .takes_value(true),
                ),
        )
        .subcommand(
            Command::new("backfill")
                .about("Fetch institutional and index history for a date range")
                .arg(
                    Arg::new("start")
                        .short('s')
                        .long("start")
                        .value_name("DATE")
                        .help("First date (YYYY-MM-DD), defaults to January 1st of this year")
                        .takes_value(true),
                )
                .arg(
                    Arg::new("end")
                        .short('e')
                        .long("end")
                        .value_name("DATE")
                        .help("Last date (YYYY-MM-DD), defaults to today")
                        .takes_value(true),
                ),
        )
        .subcommand(Command::new("report").about("Print the daily digest from the stored datasets"));

    let matches = app.get_matches();
    let config = build_config(&matches)?;

    match matches.subcommand() {
        Some(("update", sub)) => {
            let date = parse_date(sub, "date")?.unwrap_or_else(taipei_today);
            let transport = Transport::from_config(&config)?;
            let service = DataService::new(config, transport);
            let summary = service.run_incremental(date).await?;
            finish(summary)
        }
        Some(("backfill", sub)) => {
            let today = taipei_today();
            let start = parse_date(sub, "start")?
                .or_else(|| NaiveDate::from_ymd_opt(chrono::Datelike::year(&today), 1, 1))
                .context("cannot determine backfill start")?;
            let end = parse_date(sub, "end")?.unwrap_or(today);
            info!("Backfilling {} ~ {}", start, end);
            let transport = Transport::from_config(&config)?;
            let service = DataService::new(config, transport);
            let summary = service.run_backfill(start, end).await?;
            finish(summary)
        }
        Some(("report", _)) => {
            println!("{}", digest::compile_report(&config));
            Ok(())
        }
        _ => {
            error!("No command specified. Use --help for usage information.");
            Ok(())
        }
    }
}
