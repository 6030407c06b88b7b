//! Turning rendered feed markup into candidates.
//!
//! Two views of the same markup are needed. While scrolling, the controller
//! only wants a [`FeedSnapshot`]: how many entries are visible and the
//! newest/oldest relative times among them. Once scrolling has succeeded,
//! [`extract`] lifts every entry into a [`Candidate`] in feed order.

use crate::config::Selectors;
use crate::error::ConfigError;
use crate::models::Candidate;
use crate::timeparse;
use chrono::{DateTime, Duration, Utc};
use itertools::Itertools;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, instrument};
use url::Url;

/// [`Selectors`] parsed once per run.
#[derive(Debug, Clone)]
pub struct ParsedSelectors {
    pub item: Selector,
    pub headline: Selector,
    pub time_label: Selector,
    pub publish_time: Selector,
    pub article: Selector,
    pub paragraph: Selector,
}

impl ParsedSelectors {
    pub fn parse(selectors: &Selectors) -> Result<Self, ConfigError> {
        Ok(Self {
            item: parse_selector("item", &selectors.item)?,
            headline: parse_selector("headline", &selectors.headline)?,
            time_label: parse_selector("time_label", &selectors.time_label)?,
            publish_time: parse_selector("publish_time", &selectors.publish_time)?,
            article: parse_selector("article", &selectors.article)?,
            paragraph: parse_selector("paragraph", &selectors.paragraph)?,
        })
    }
}

fn parse_selector(field: &'static str, css: &str) -> Result<Selector, ConfigError> {
    Selector::parse(css).map_err(|e| ConfigError::Invalid {
        field,
        reason: format!("{css:?}: {e}"),
    })
}

/// What the feed looks like after one growth step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeedSnapshot {
    /// Entries matched by the item selector, labelled or not.
    pub item_count: usize,
    /// First resolvable label from the top of the feed.
    pub newest: Option<DateTime<Utc>>,
    /// First resolvable label from the bottom of the feed.
    pub oldest: Option<DateTime<Utc>>,
}

impl FeedSnapshot {
    /// Time covered by the visible entries; zero when fewer than two labels resolve.
    pub fn span(&self) -> Duration {
        match (self.newest, self.oldest) {
            (Some(newest), Some(oldest)) if newest > oldest => newest - oldest,
            _ => Duration::zero(),
        }
    }
}

/// Summarize the visible feed, resolving labels against the run's `now`.
pub fn snapshot(markup: &str, selectors: &ParsedSelectors, now: DateTime<Utc>) -> FeedSnapshot {
    let document = Html::parse_document(markup);
    let items: Vec<ElementRef> = document.select(&selectors.item).collect();

    let labelled = || {
        items
            .iter()
            .filter(|item| item.select(&selectors.headline).next().is_some())
    };
    let newest = labelled().find_map(|item| item_time(*item, selectors, now));
    let oldest = labelled().rev().find_map(|item| item_time(*item, selectors, now));

    FeedSnapshot {
        item_count: items.len(),
        newest,
        oldest,
    }
}

fn item_time(item: ElementRef, selectors: &ParsedSelectors, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    item.select(&selectors.time_label)
        .map(|el| el.text().collect::<String>())
        .map(|text| text.trim().to_string())
        .filter(|text| timeparse::looks_relative(text))
        .find_map(|text| timeparse::resolve(&text, now))
}

/// List every feed entry with a headline link, newest first.
///
/// Relative links are resolved against `base`. Entries without a headline
/// anchor or `href`, or whose link is not http(s), are left out.
#[instrument(level = "info", skip_all, fields(base = %base))]
pub fn extract(markup: &str, base: &Url, selectors: &ParsedSelectors) -> Vec<Candidate> {
    let document = Html::parse_document(markup);
    let mut candidates = Vec::new();

    for item in document.select(&selectors.item) {
        let Some(anchor) = item.select(&selectors.headline).next() else {
            continue;
        };
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let Ok(url) = base.join(href.trim()) else {
            debug!(href, "Unresolvable headline link");
            continue;
        };
        if !matches!(url.scheme(), "http" | "https") {
            continue;
        }
        let headline = anchor.text().flat_map(str::split_whitespace).join(" ");
        candidates.push(Candidate {
            headline,
            url: url.to_string(),
        });
    }

    debug!(count = candidates.len(), "Extracted candidates");
    candidates
}
