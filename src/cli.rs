//! Command-line interface definitions for market_news.
//!
//! This module defines the CLI arguments and subcommands using the `clap` crate.
//! Global options can also be provided through environment variables.

use crate::models::Market;
use clap::{Parser, Subcommand};

/// Command-line arguments for the market_news application.
///
/// # Examples
///
/// ```sh
/// # Collect the last 24 hours of Taiwan market news
/// market_news hunt --market TW
///
/// # Collect, then run the configured downstream stages
/// market_news -c config.yaml run --market US
///
/// # Dump what is stored
/// market_news articles --market US
///
/// # Record and read back a summary
/// market_news summary put --market TW --file report.txt --count 42
/// market_news summary show --market TW
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to a YAML settings file
    #[arg(short, long, env = "MARKET_NEWS_CONFIG")]
    pub config: Option<String>,

    /// SQLite database path (overrides the settings file)
    #[arg(short, long, env = "MARKET_NEWS_DB")]
    pub database: Option<String>,

    /// WebDriver endpoint (overrides the settings file)
    #[arg(long, env = "WEBDRIVER_URL")]
    pub webdriver_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Collect the market's news window into the database
    Hunt {
        #[arg(short, long, value_enum)]
        market: Market,
    },

    /// Collect, then run every configured downstream stage
    Run {
        #[arg(short, long, value_enum)]
        market: Market,
    },

    /// Print the market's stored articles as JSON, newest first
    Articles {
        #[arg(short, long, value_enum)]
        market: Market,
    },

    /// Read or write the market's summary
    #[command(subcommand)]
    Summary(SummaryCommand),
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum SummaryCommand {
    /// Print the latest summary
    Show {
        #[arg(short, long, value_enum)]
        market: Market,
    },

    /// Store a summary read from a file (or stdin)
    Put {
        #[arg(short, long, value_enum)]
        market: Market,

        /// File holding the summary text; stdin when omitted or `-`
        #[arg(short, long)]
        file: Option<String>,

        /// Number of articles the summary was written from
        #[arg(long, default_value_t = 0)]
        count: i64,
    },
}
