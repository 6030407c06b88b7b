//! Data models shared by the collection engine and the store.
//!
//! This module defines the core data structures used throughout the application:
//! - [`Market`]: The scoping key that partitions configuration and stored data
//! - [`RunContext`]: Immutable per-invocation anchor for all time arithmetic
//! - [`Candidate`]: An unverified `(headline, url)` pair lifted from a listing page
//! - [`Article`]: A verified article, ready to be written once by the store
//! - [`Summary`]: A report written back by the downstream analysis stage
//! - [`RunReport`]: Tallies produced by a structurally successful run

use chrono::{DateTime, Duration, FixedOffset, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A market whose news feed is collected.
///
/// Serialized and parsed as its upper-case code (`TW`, `US`) both on the
/// command line and in the settings file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ValueEnum)]
pub enum Market {
    /// Taiwan equities.
    #[serde(rename = "TW")]
    #[value(name = "TW", alias = "tw")]
    Tw,
    /// United States equities.
    #[serde(rename = "US")]
    #[value(name = "US", alias = "us")]
    Us,
}

impl Market {
    pub const ALL: [Market; 2] = [Market::Tw, Market::Us];

    /// The stable code used as the storage partition key.
    pub fn code(&self) -> &'static str {
        match self {
            Market::Tw => "TW",
            Market::Us => "US",
        }
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Market {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TW" => Ok(Market::Tw),
            "US" => Ok(Market::Us),
            other => Err(format!("unknown market code: {other}")),
        }
    }
}

/// The fixed time anchor of one invocation.
///
/// `now` is captured exactly once when the run starts; every relative label
/// and every window comparison in the run is computed against it, so a run
/// that takes several minutes still agrees with itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunContext {
    pub market: Market,
    pub now: DateTime<Utc>,
    pub window_start: DateTime<Utc>,
}

impl RunContext {
    /// Build a context for `market` anchored at `now` with a look-back of `window_hours`.
    pub fn new(market: Market, now: DateTime<Utc>, window_hours: u32) -> Self {
        Self {
            market,
            now,
            window_start: now - Duration::hours(i64::from(window_hours)),
        }
    }

    /// Capture the wall clock once and build the context from it.
    pub fn starting_now(market: Market, window_hours: u32) -> Self {
        Self::new(market, Utc::now(), window_hours)
    }
}

/// A listing entry that has not been verified yet. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub headline: String,
    pub url: String,
}

/// A verified article.
///
/// `publish_time` keeps the offset the source page published, while
/// `scraped_at` is the run's anchor instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub headline: String,
    /// Unique key in the store.
    pub url: String,
    pub publish_time: DateTime<FixedOffset>,
    pub content: String,
    pub market: Market,
    pub scraped_at: DateTime<Utc>,
}

impl Article {
    pub fn published_utc(&self) -> DateTime<Utc> {
        self.publish_time.with_timezone(&Utc)
    }
}

/// A market report produced by the analysis stage and read back by the voice stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub id: i64,
    pub market: Market,
    pub text: String,
    pub source_article_count: i64,
    pub created_at: DateTime<Utc>,
}

/// Tallies of a run whose scroll phase succeeded.
///
/// `inserted` is the business-facing number: articles that did not exist in
/// the store before this run wrote them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub market: Option<Market>,
    pub candidates: usize,
    pub inserted: usize,
    pub duplicates: usize,
    pub stale: usize,
    pub skipped: usize,
}
