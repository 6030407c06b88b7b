//! # market_news
//!
//! Collects a rolling window of financial market news (default: the last 24
//! hours) from a lazy-loading listing feed into a per-market SQLite dataset,
//! then optionally hands off to downstream stages (analysis, voice).
//!
//! ## Usage
//!
//! ```sh
//! market_news hunt --market TW
//! market_news -c config.yaml run --market US
//! ```
//!
//! ## Architecture
//!
//! 1. **Scrolling**: grow the listing in a WebDriver session until it covers the window
//! 2. **Extraction**: lift `(headline, url)` candidates out of the rendered feed
//! 3. **Verification**: fetch each candidate (bounded concurrency) for its exact publish time and body
//! 4. **Storage**: insert fresh articles once per URL, then apply the yield threshold
//! 5. **Stages**: run the configured collaborators with `--market <CODE>`
//!
//! A failed run exits with a status derived from its reason code, so a
//! scheduler can tell a broken browser from a quiet news day.

use clap::Parser;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{fmt as tfmt, EnvFilter};

mod cli;
mod config;
mod error;
mod hunt;
mod listing;
mod models;
mod render;
mod scroll;
mod stages;
mod store;
#[cfg(test)]
mod testing;
mod timeparse;
mod utils;
mod verify;

use cli::{Cli, Command, SummaryCommand};
use config::Settings;
use error::{ConfigError, HuntError, StoreError};
use hunt::Collaborators;
use models::{Market, RunContext, RunReport};
use render::webdriver::WebDriver;
use store::{ArticleStore, SqliteStore};
use utils::read_text_input;
use verify::HttpFetcher;

#[tokio::main]
async fn main() {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    let args = Cli::parse();
    debug!(?args, "Parsed CLI arguments");

    let code = match dispatch(args).await {
        Ok(()) => 0,
        Err(e) => {
            error!(reason = e.reason_code(), error = %e, "Run failed");
            e.exit_code()
        }
    };

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        exit_code = code,
        "Execution complete"
    );
    std::process::exit(code);
}

async fn dispatch(args: Cli) -> Result<(), HuntError> {
    let mut settings = Settings::load(args.config.as_deref())?;
    if let Some(database) = args.database {
        settings.database_path = database;
    }
    if let Some(webdriver_url) = args.webdriver_url {
        settings.webdriver_url = webdriver_url;
    }

    match args.command {
        Command::Hunt { market } => {
            let report = collect(&settings, market).await?;
            print_json(&report)
        }
        Command::Run { market } => {
            let report = collect(&settings, market).await?;
            stages::run_all(&settings.stages, market).await?;
            print_json(&report)
        }
        Command::Articles { market } => {
            let store = SqliteStore::open(&settings.database_path).await?;
            let articles = store.list_by_market(market).await?;
            info!(%market, count = articles.len(), "Listing stored articles");
            print_json(&articles)
        }
        Command::Summary(SummaryCommand::Show { market }) => {
            let store = SqliteStore::open(&settings.database_path).await?;
            match store.latest_summary(market).await? {
                Some(summary) => print_json(&summary),
                None => {
                    info!(%market, "No summary stored");
                    Ok(())
                }
            }
        }
        Command::Summary(SummaryCommand::Put { market, file, count }) => {
            let text = read_text_input(file.as_deref()).await.map_err(StoreError::from)?;
            let store = SqliteStore::open(&settings.database_path).await?;
            let summary = store.add_summary(market, text.trim(), count).await?;
            print_json(&summary)
        }
    }
}

/// Collect one market's window into the configured database.
#[instrument(level = "info", skip(settings))]
async fn collect(settings: &Settings, market: Market) -> Result<RunReport, HuntError> {
    let market_config = settings.market(market)?;
    let ctx = RunContext::starting_now(market, market_config.window_hours);
    info!(
        name = %market_config.display_name,
        now = %ctx.now,
        window_start = %ctx.window_start,
        "Starting collection"
    );

    let renderer = WebDriver::new(&settings.webdriver_url, &settings.user_agent).map_err(HuntError::SessionSetup)?;
    let fetcher = HttpFetcher::new(&settings.user_agent, settings.fetch_timeout()).map_err(|e| ConfigError::Invalid {
        field: "user_agent",
        reason: e.to_string(),
    })?;
    let store = SqliteStore::open(&settings.database_path).await?;

    hunt::run(
        ctx,
        market_config,
        settings,
        Collaborators {
            renderer: &renderer,
            fetcher: &fetcher,
            store: &store,
        },
    )
    .await
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), HuntError> {
    let json = serde_json::to_string_pretty(value).map_err(|e| StoreError::Io(e.into()))?;
    println!("{json}");
    Ok(())
}
